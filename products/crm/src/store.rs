use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::deal::{Deal, StageHistoryEntry};
use crate::stage::{Outcome, Stage};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deal {0} already exists")]
    Duplicate(Uuid),
    #[error("deal store failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// A deal mutation guarded by the state it was computed from.
///
/// Stores must apply `deal` and append `history` atomically, and only when
/// the persisted row still has `expected_stage` and `expected_outcome`.
#[derive(Clone, Debug)]
pub struct StageChange {
    pub expected_stage: Stage,
    pub expected_outcome: Outcome,
    pub deal: Deal,
    pub history: StageHistoryEntry,
}

impl StageChange {
    pub fn new(
        before: &Deal,
        after: Deal,
        note: Option<String>,
        changed_by: Uuid,
        changed_at: DateTime<Utc>,
    ) -> Self {
        let history = StageHistoryEntry {
            id: Uuid::new_v4(),
            deal_id: before.id,
            from_stage: before.stage,
            to_stage: after.stage,
            from_outcome: before.outcome,
            to_outcome: after.outcome,
            note,
            changed_by,
            changed_at,
        };
        Self {
            expected_stage: before.stage,
            expected_outcome: before.outcome,
            deal: after,
            history,
        }
    }
}

/// Persistence the pipeline engine runs against.
#[async_trait]
pub trait DealStore: Send + Sync {
    async fn insert(&self, deal: &Deal) -> StoreResult<()>;

    async fn find(&self, id: Uuid) -> StoreResult<Option<Deal>>;

    /// Deals owned by `owner_id`, oldest first.
    async fn list_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Deal>>;

    /// Distinct deal owners, used by batch jobs.
    async fn owners(&self) -> StoreResult<Vec<Uuid>>;

    /// Compare-and-update. Returns `false` when the guard no longer matches.
    async fn commit(&self, change: &StageChange) -> StoreResult<bool>;

    /// History entries for a deal, oldest first.
    async fn history(&self, deal_id: Uuid) -> StoreResult<Vec<StageHistoryEntry>>;
}
