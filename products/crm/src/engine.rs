use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::analytics::{BatchForecast, OwnerFailure, OwnerForecast, RevenueForecast, WinLossReport};
use crate::deal::{Caller, DEFAULT_LOST_REASON, Deal, MAX_TITLE_LEN, NewDeal, StageHistoryEntry};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::{Outcome, Stage};
use crate::store::{DealStore, StageChange};

/// A requested pipeline transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageAction {
    Next,
    Won,
    Lost { reason: Option<String> },
}

impl StageAction {
    /// Parses the wire token (`next`, `won`, `lost`). Unknown tokens are an
    /// invalid state request rather than a silent no-op.
    pub fn parse(token: &str, lost_reason: Option<String>) -> PipelineResult<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "next" => Ok(StageAction::Next),
            "won" => Ok(StageAction::Won),
            "lost" => Ok(StageAction::Lost {
                reason: lost_reason,
            }),
            other => Err(PipelineError::InvalidState(format!(
                "unrecognized stage action `{other}`"
            ))),
        }
    }
}

/// Owns deal stage transitions, won/lost marking and pipeline analytics.
#[derive(Clone)]
pub struct PipelineEngine {
    store: Arc<dyn DealStore>,
}

impl PipelineEngine {
    pub fn new(store: Arc<dyn DealStore>) -> Self {
        Self { store }
    }

    #[instrument(name = "pipeline.open_deal", skip(self, input), fields(user_id = %caller.user_id))]
    pub async fn open_deal(&self, caller: Caller, input: NewDeal) -> PipelineResult<Deal> {
        let title = validate_title(&input.title)?;
        if input.value_cents < 0 {
            return Err(PipelineError::InvalidInput(
                "value must be non-negative".into(),
            ));
        }
        let currency = normalize_currency(&input.currency)?;
        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4(),
            owner_id: caller.user_id,
            title,
            value_cents: input.value_cents,
            currency,
            stage: input.stage.unwrap_or(Stage::Lead),
            outcome: Outcome::Open,
            lost_reason: None,
            assigned_to: input.assigned_to,
            created_at: now,
            stage_changed_at: now,
            closed_at: None,
            updated_at: now,
        };
        self.store.insert(&deal).await?;
        info!(deal_id = %deal.id, stage = %deal.stage, "deal opened");
        Ok(deal)
    }

    pub async fn get_deal(&self, caller: Caller, deal_id: Uuid) -> PipelineResult<Deal> {
        self.load_owned(caller, deal_id).await
    }

    pub async fn list_deals(&self, caller: Caller) -> PipelineResult<Vec<Deal>> {
        Ok(self.store.list_by_owner(caller.user_id).await?)
    }

    pub async fn stage_history(
        &self,
        caller: Caller,
        deal_id: Uuid,
    ) -> PipelineResult<Vec<StageHistoryEntry>> {
        self.load_owned(caller, deal_id).await?;
        Ok(self.store.history(deal_id).await?)
    }

    pub async fn apply_action(
        &self,
        caller: Caller,
        deal_id: Uuid,
        action: StageAction,
    ) -> PipelineResult<Deal> {
        match action {
            StageAction::Next => self.move_to_next_stage(caller, deal_id).await,
            StageAction::Won => self.mark_as_won(caller, deal_id).await,
            StageAction::Lost { reason } => self.mark_as_lost(caller, deal_id, reason).await,
        }
    }

    /// Advances an open deal by one stage. At the last pre-close stage the
    /// deal is returned unchanged; advancing never closes a deal.
    #[instrument(name = "pipeline.move_to_next_stage", skip(self), fields(user_id = %caller.user_id))]
    pub async fn move_to_next_stage(&self, caller: Caller, deal_id: Uuid) -> PipelineResult<Deal> {
        let deal = self.load_owned(caller, deal_id).await?;
        ensure_open(&deal)?;
        let Some(next) = deal.stage.next() else {
            debug!(stage = %deal.stage, "deal already at final stage");
            return Ok(deal);
        };
        let now = Utc::now();
        let mut updated = deal.clone();
        updated.stage = next;
        updated.stage_changed_at = now;
        updated.updated_at = now;
        self.commit(caller, &deal, updated, None, now).await
    }

    #[instrument(name = "pipeline.mark_as_won", skip(self), fields(user_id = %caller.user_id))]
    pub async fn mark_as_won(&self, caller: Caller, deal_id: Uuid) -> PipelineResult<Deal> {
        let deal = self.load_owned(caller, deal_id).await?;
        ensure_open(&deal)?;
        let now = Utc::now();
        let mut updated = deal.clone();
        updated.outcome = Outcome::Won;
        updated.closed_at = Some(now);
        updated.updated_at = now;
        self.commit(caller, &deal, updated, None, now).await
    }

    #[instrument(name = "pipeline.mark_as_lost", skip(self, reason), fields(user_id = %caller.user_id))]
    pub async fn mark_as_lost(
        &self,
        caller: Caller,
        deal_id: Uuid,
        reason: Option<String>,
    ) -> PipelineResult<Deal> {
        let deal = self.load_owned(caller, deal_id).await?;
        ensure_open(&deal)?;
        let reason = lost_reason_or_default(reason);
        let now = Utc::now();
        let mut updated = deal.clone();
        updated.outcome = Outcome::Lost;
        updated.lost_reason = Some(reason.clone());
        updated.closed_at = Some(now);
        updated.updated_at = now;
        self.commit(caller, &deal, updated, Some(reason), now).await
    }

    #[instrument(name = "pipeline.win_loss_analysis", skip(self), fields(user_id = %caller.user_id))]
    pub async fn win_loss_analysis(&self, caller: Caller) -> PipelineResult<WinLossReport> {
        let deals = self.store.list_by_owner(caller.user_id).await?;
        Ok(WinLossReport::from_deals(&deals))
    }

    #[instrument(name = "pipeline.revenue_forecast", skip(self), fields(user_id = %caller.user_id))]
    pub async fn revenue_forecast(&self, caller: Caller) -> PipelineResult<RevenueForecast> {
        let deals = self.store.list_by_owner(caller.user_id).await?;
        Ok(RevenueForecast::from_deals(&deals))
    }

    /// Forecasts every deal owner independently. One owner's failure is
    /// recorded and logged; the remaining owners still run.
    #[instrument(name = "pipeline.forecast_all", skip(self))]
    pub async fn forecast_all(&self) -> PipelineResult<BatchForecast> {
        let owners = self.store.owners().await?;
        let mut batch = BatchForecast::default();
        for owner_id in owners {
            match self.revenue_forecast(Caller::new(owner_id)).await {
                Ok(forecast) => batch.forecasts.push(OwnerForecast { owner_id, forecast }),
                Err(err) => {
                    warn!(%owner_id, error = %err, "forecast failed for owner");
                    batch.failures.push(OwnerFailure {
                        owner_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        info!(
            succeeded = batch.forecasts.len(),
            failed = batch.failures.len(),
            "batch forecast finished"
        );
        Ok(batch)
    }

    async fn load_owned(&self, caller: Caller, deal_id: Uuid) -> PipelineResult<Deal> {
        let deal = self
            .store
            .find(deal_id)
            .await?
            .ok_or(PipelineError::NotFound(deal_id))?;
        if deal.owner_id != caller.user_id {
            return Err(PipelineError::Unauthorized);
        }
        Ok(deal)
    }

    async fn commit(
        &self,
        caller: Caller,
        before: &Deal,
        after: Deal,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> PipelineResult<Deal> {
        let change = StageChange::new(before, after, note, caller.user_id, now);
        if !self.store.commit(&change).await? {
            return Err(PipelineError::Conflict(before.id));
        }
        info!(
            deal_id = %before.id,
            from_stage = %change.history.from_stage,
            to_stage = %change.history.to_stage,
            outcome = %change.history.to_outcome,
            "deal transition committed"
        );
        Ok(change.deal)
    }
}

fn ensure_open(deal: &Deal) -> PipelineResult<()> {
    if deal.outcome.is_terminal() {
        return Err(PipelineError::InvalidState(format!(
            "deal {} is already {}",
            deal.id,
            deal.outcome.as_str().to_ascii_lowercase()
        )));
    }
    Ok(())
}

fn lost_reason_or_default(reason: Option<String>) -> String {
    reason
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LOST_REASON.to_string())
}

fn validate_title(value: &str) -> PipelineResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidInput("title is required".into()));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(PipelineError::InvalidInput(format!(
            "title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_currency(value: &str) -> PipelineResult<String> {
    let trimmed = value.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PipelineError::InvalidInput(
            "currency must be a three-letter ISO code".into(),
        ));
    }
    Ok(trimmed.to_ascii_uppercase())
}
