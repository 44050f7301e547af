use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stage::{Outcome, Stage};

/// Stored when a deal is marked lost without an explicit reason.
pub const DEFAULT_LOST_REASON: &str = "No reason provided";

pub const MAX_TITLE_LEN: usize = 200;

/// Authenticated identity every engine operation runs on behalf of.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Caller {
    pub user_id: Uuid,
}

impl Caller {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub value_cents: i64,
    pub currency: String,
    pub stage: Stage,
    pub outcome: Outcome,
    pub lost_reason: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub stage_changed_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_open(&self) -> bool {
        self.outcome == Outcome::Open
    }
}

/// Input for opening a deal, typically on lead conversion.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeal {
    pub title: String,
    pub value_cents: i64,
    pub currency: String,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
}

/// One committed mutation of a deal's stage or outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageHistoryEntry {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub from_outcome: Outcome,
    pub to_outcome: Outcome,
    pub note: Option<String>,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
}
