use async_graphql::{Enum, ID, InputObject, SimpleObject};
use chrono::{DateTime, Utc};
use products_crm::{
    Deal, Outcome, RevenueForecast, Stage, StageForecast, StageHistoryEntry, StageInfo,
    WinLossReport,
};

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum DealStage {
    #[graphql(name = "LEAD")]
    Lead,
    #[graphql(name = "QUALIFIED")]
    Qualified,
    #[graphql(name = "PROPOSAL")]
    Proposal,
    #[graphql(name = "NEGOTIATION")]
    Negotiation,
}

impl From<Stage> for DealStage {
    fn from(value: Stage) -> Self {
        match value {
            Stage::Lead => DealStage::Lead,
            Stage::Qualified => DealStage::Qualified,
            Stage::Proposal => DealStage::Proposal,
            Stage::Negotiation => DealStage::Negotiation,
        }
    }
}

impl From<DealStage> for Stage {
    fn from(value: DealStage) -> Self {
        match value {
            DealStage::Lead => Stage::Lead,
            DealStage::Qualified => Stage::Qualified,
            DealStage::Proposal => Stage::Proposal,
            DealStage::Negotiation => Stage::Negotiation,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum DealOutcome {
    #[graphql(name = "OPEN")]
    Open,
    #[graphql(name = "WON")]
    Won,
    #[graphql(name = "LOST")]
    Lost,
}

impl From<Outcome> for DealOutcome {
    fn from(value: Outcome) -> Self {
        match value {
            Outcome::Open => DealOutcome::Open,
            Outcome::Won => DealOutcome::Won,
            Outcome::Lost => DealOutcome::Lost,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum DealStageAction {
    #[graphql(name = "NEXT")]
    Next,
    #[graphql(name = "WON")]
    Won,
    #[graphql(name = "LOST")]
    Lost,
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Deal")]
pub struct DealNode {
    pub id: ID,
    #[graphql(name = "ownerId")]
    pub owner_id: ID,
    pub title: String,
    #[graphql(name = "valueCents")]
    pub value_cents: i64,
    pub currency: String,
    pub stage: DealStage,
    pub outcome: DealOutcome,
    #[graphql(name = "lostReason")]
    pub lost_reason: Option<String>,
    #[graphql(name = "assignedTo")]
    pub assigned_to: Option<ID>,
    #[graphql(name = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[graphql(name = "stageChangedAt")]
    pub stage_changed_at: DateTime<Utc>,
    #[graphql(name = "closedAt")]
    pub closed_at: Option<DateTime<Utc>>,
    #[graphql(name = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<Deal> for DealNode {
    fn from(deal: Deal) -> Self {
        Self {
            id: ID::from(deal.id.to_string()),
            owner_id: ID::from(deal.owner_id.to_string()),
            title: deal.title,
            value_cents: deal.value_cents,
            currency: deal.currency,
            stage: deal.stage.into(),
            outcome: deal.outcome.into(),
            lost_reason: deal.lost_reason,
            assigned_to: deal.assigned_to.map(|id| ID::from(id.to_string())),
            created_at: deal.created_at,
            stage_changed_at: deal.stage_changed_at,
            closed_at: deal.closed_at,
            updated_at: deal.updated_at,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "DealStageHistory")]
pub struct DealStageHistoryNode {
    pub id: ID,
    #[graphql(name = "dealId")]
    pub deal_id: ID,
    #[graphql(name = "fromStage")]
    pub from_stage: DealStage,
    #[graphql(name = "toStage")]
    pub to_stage: DealStage,
    #[graphql(name = "fromOutcome")]
    pub from_outcome: DealOutcome,
    #[graphql(name = "toOutcome")]
    pub to_outcome: DealOutcome,
    pub note: Option<String>,
    #[graphql(name = "changedBy")]
    pub changed_by: ID,
    #[graphql(name = "changedAt")]
    pub changed_at: DateTime<Utc>,
}

impl From<StageHistoryEntry> for DealStageHistoryNode {
    fn from(entry: StageHistoryEntry) -> Self {
        Self {
            id: ID::from(entry.id.to_string()),
            deal_id: ID::from(entry.deal_id.to_string()),
            from_stage: entry.from_stage.into(),
            to_stage: entry.to_stage.into(),
            from_outcome: entry.from_outcome.into(),
            to_outcome: entry.to_outcome.into(),
            note: entry.note,
            changed_by: ID::from(entry.changed_by.to_string()),
            changed_at: entry.changed_at,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct PipelineStage {
    pub key: DealStage,
    #[graphql(name = "displayName")]
    pub display_name: String,
    #[graphql(name = "sortOrder")]
    pub sort_order: i32,
    pub probability: i32,
}

impl From<StageInfo> for PipelineStage {
    fn from(info: StageInfo) -> Self {
        Self {
            key: info.key.into(),
            display_name: info.display_name.to_string(),
            sort_order: i32::from(info.sort_order),
            probability: i32::from(info.probability),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct WinLossAnalysis {
    #[graphql(name = "wonCount")]
    pub won_count: i64,
    #[graphql(name = "wonValueCents")]
    pub won_value_cents: i64,
    #[graphql(name = "lostCount")]
    pub lost_count: i64,
    #[graphql(name = "lostValueCents")]
    pub lost_value_cents: i64,
    #[graphql(name = "winRate")]
    pub win_rate: f64,
}

impl From<WinLossReport> for WinLossAnalysis {
    fn from(report: WinLossReport) -> Self {
        Self {
            won_count: report.won_count,
            won_value_cents: report.won_value_cents,
            lost_count: report.lost_count,
            lost_value_cents: report.lost_value_cents,
            win_rate: report.win_rate,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct StageForecastRow {
    pub stage: DealStage,
    pub probability: i32,
    #[graphql(name = "dealCount")]
    pub deal_count: i64,
    #[graphql(name = "totalCents")]
    pub total_cents: i64,
    #[graphql(name = "weightedCents")]
    pub weighted_cents: i64,
}

impl From<StageForecast> for StageForecastRow {
    fn from(row: StageForecast) -> Self {
        Self {
            stage: row.stage.into(),
            probability: i32::from(row.probability),
            deal_count: row.deal_count,
            total_cents: row.total_cents,
            weighted_cents: row.weighted_cents,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "RevenueForecast")]
pub struct RevenueForecastNode {
    pub stages: Vec<StageForecastRow>,
    #[graphql(name = "openDealCount")]
    pub open_deal_count: i64,
    #[graphql(name = "pipelineTotalCents")]
    pub pipeline_total_cents: i64,
    #[graphql(name = "weightedTotalCents")]
    pub weighted_total_cents: i64,
}

impl From<RevenueForecast> for RevenueForecastNode {
    fn from(forecast: RevenueForecast) -> Self {
        Self {
            stages: forecast.stages.into_iter().map(Into::into).collect(),
            open_deal_count: forecast.open_deal_count,
            pipeline_total_cents: forecast.pipeline_total_cents,
            weighted_total_cents: forecast.weighted_total_cents,
        }
    }
}

#[derive(InputObject, Clone, Debug)]
pub struct OpenDealInput {
    pub title: String,
    #[graphql(name = "valueCents")]
    pub value_cents: i64,
    pub currency: String,
    pub stage: Option<DealStage>,
    #[graphql(name = "assignedTo")]
    pub assigned_to: Option<ID>,
}
