use serde::Serialize;
use uuid::Uuid;

use crate::deal::Deal;
use crate::stage::{Outcome, Stage};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinLossReport {
    pub won_count: i64,
    pub won_value_cents: i64,
    pub lost_count: i64,
    pub lost_value_cents: i64,
    /// `won / (won + lost)`; zero when nothing has closed yet.
    pub win_rate: f64,
}

impl WinLossReport {
    pub fn from_deals(deals: &[Deal]) -> Self {
        let mut report = Self::default();
        for deal in deals {
            match deal.outcome {
                Outcome::Won => {
                    report.won_count += 1;
                    report.won_value_cents = report.won_value_cents.saturating_add(deal.value_cents);
                }
                Outcome::Lost => {
                    report.lost_count += 1;
                    report.lost_value_cents =
                        report.lost_value_cents.saturating_add(deal.value_cents);
                }
                Outcome::Open => {}
            }
        }
        let closed = report.won_count + report.lost_count;
        report.win_rate = if closed == 0 {
            0.0
        } else {
            report.won_count as f64 / closed as f64
        };
        report
    }

    pub fn closed_count(&self) -> i64 {
        self.won_count + self.lost_count
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageForecast {
    pub stage: Stage,
    pub probability: i16,
    pub deal_count: i64,
    pub total_cents: i64,
    pub weighted_cents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueForecast {
    pub stages: Vec<StageForecast>,
    pub open_deal_count: i64,
    pub pipeline_total_cents: i64,
    pub weighted_total_cents: i64,
}

impl RevenueForecast {
    /// Aggregates open deals per stage. Closed deals are ignored.
    pub fn from_deals(deals: &[Deal]) -> Self {
        let mut stages: Vec<StageForecast> = Stage::ALL
            .iter()
            .map(|stage| StageForecast {
                stage: *stage,
                probability: stage.probability(),
                deal_count: 0,
                total_cents: 0,
                weighted_cents: 0,
            })
            .collect();

        for deal in deals.iter().filter(|deal| deal.is_open()) {
            if let Some(row) = stages.iter_mut().find(|row| row.stage == deal.stage) {
                row.deal_count += 1;
                row.total_cents = row.total_cents.saturating_add(deal.value_cents);
            }
        }
        for row in stages.iter_mut() {
            row.weighted_cents = weight(row.total_cents, row.probability);
        }

        let open_deal_count = stages.iter().map(|row| row.deal_count).sum();
        let pipeline_total_cents = stages
            .iter()
            .fold(0_i64, |acc, row| acc.saturating_add(row.total_cents));
        let weighted_total_cents = stages
            .iter()
            .fold(0_i64, |acc, row| acc.saturating_add(row.weighted_cents));
        Self {
            stages,
            open_deal_count,
            pipeline_total_cents,
            weighted_total_cents,
        }
    }
}

fn weight(total_cents: i64, probability: i16) -> i64 {
    let weighted = i128::from(total_cents) * i128::from(probability) / 100;
    i64::try_from(weighted).unwrap_or(i64::MAX)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerForecast {
    pub owner_id: Uuid,
    pub forecast: RevenueForecast,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerFailure {
    pub owner_id: Uuid,
    pub error: String,
}

/// Outcome of a per-owner fan-out; failures never abort the batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchForecast {
    pub forecasts: Vec<OwnerForecast>,
    pub failures: Vec<OwnerFailure>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn deal(stage: Stage, outcome: Outcome, value_cents: i64) -> Deal {
        let now = Utc::now();
        Deal {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            title: format!("{stage} deal"),
            value_cents,
            currency: "USD".into(),
            stage,
            outcome,
            lost_reason: (outcome == Outcome::Lost).then(|| "budget".to_string()),
            assigned_to: None,
            created_at: now,
            stage_changed_at: now,
            closed_at: outcome.is_terminal().then_some(now),
            updated_at: now,
        }
    }

    #[test]
    fn win_rate_is_zero_without_closed_deals() {
        let report = WinLossReport::from_deals(&[deal(Stage::Lead, Outcome::Open, 1_000)]);
        assert_eq!(report.closed_count(), 0);
        assert_eq!(report.win_rate, 0.0);
        assert!(!report.win_rate.is_nan());
    }

    #[test]
    fn win_loss_counts_and_values() {
        let deals = vec![
            deal(Stage::Negotiation, Outcome::Won, 10_000),
            deal(Stage::Proposal, Outcome::Won, 5_000),
            deal(Stage::Lead, Outcome::Lost, 2_500),
            deal(Stage::Qualified, Outcome::Open, 99_000),
        ];
        let report = WinLossReport::from_deals(&deals);
        assert_eq!(report.won_count, 2);
        assert_eq!(report.won_value_cents, 15_000);
        assert_eq!(report.lost_count, 1);
        assert_eq!(report.lost_value_cents, 2_500);
        assert!((report.win_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn forecast_weights_open_deals_by_stage() {
        let deals = vec![
            deal(Stage::Lead, Outcome::Open, 10_000),
            deal(Stage::Proposal, Outcome::Open, 10_000),
            deal(Stage::Proposal, Outcome::Open, 4_000),
            deal(Stage::Negotiation, Outcome::Won, 50_000),
        ];
        let forecast = RevenueForecast::from_deals(&deals);
        assert_eq!(forecast.stages.len(), 4);
        assert_eq!(forecast.open_deal_count, 3);
        assert_eq!(forecast.pipeline_total_cents, 24_000);
        // 10% of 10_000 + 50% of 14_000
        assert_eq!(forecast.weighted_total_cents, 1_000 + 7_000);
        let negotiation = forecast
            .stages
            .iter()
            .find(|row| row.stage == Stage::Negotiation)
            .unwrap();
        assert_eq!(negotiation.deal_count, 0);
        assert_eq!(negotiation.total_cents, 0);
    }

    #[test]
    fn forecast_without_open_deals_is_all_zero() {
        let forecast = RevenueForecast::from_deals(&[]);
        assert_eq!(forecast.pipeline_total_cents, 0);
        assert_eq!(forecast.weighted_total_cents, 0);
        assert!(forecast.stages.iter().all(|row| row.deal_count == 0));
    }
}
