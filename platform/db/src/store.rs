use async_trait::async_trait;
use chrono::Utc;
use entity::{deal_stage_history, deals};
use products_crm::{
    Deal, DealStore, Outcome, Stage, StageChange, StageHistoryEntry, StoreError, StoreResult,
};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::DbPool;

/// [`DealStore`] over the `deals` and `deal_stage_history` tables.
#[derive(Clone)]
pub struct SeaOrmDealStore {
    db: DbPool,
}

impl SeaOrmDealStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DealStore for SeaOrmDealStore {
    async fn insert(&self, deal: &Deal) -> StoreResult<()> {
        deals::Entity::insert(active_deal(deal))
            .exec_without_returning(&self.db)
            .await
            .map_err(|err| match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate(deal.id),
                _ => backend(err),
            })?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        let row = deals::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(backend)?;
        Ok(row.map(deal_from_row))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Deal>> {
        let rows = deals::Entity::find()
            .filter(deals::Column::OwnerId.eq(owner_id))
            .order_by_asc(deals::Column::CreatedAt)
            .order_by_asc(deals::Column::Id)
            .all(&self.db)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(deal_from_row).collect())
    }

    async fn owners(&self) -> StoreResult<Vec<Uuid>> {
        deals::Entity::find()
            .select_only()
            .column(deals::Column::OwnerId)
            .distinct()
            .order_by_asc(deals::Column::OwnerId)
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await
            .map_err(backend)
    }

    async fn commit(&self, change: &StageChange) -> StoreResult<bool> {
        let txn = self.db.begin().await.map_err(backend)?;

        let mut update = active_deal(&change.deal);
        update.id = NotSet;
        update.owner_id = NotSet;
        update.created_at = NotSet;
        let result = deals::Entity::update_many()
            .set(update)
            .filter(deals::Column::Id.eq(change.deal.id))
            .filter(deals::Column::Stage.eq(stage_to_row(change.expected_stage)))
            .filter(deals::Column::Outcome.eq(outcome_to_row(change.expected_outcome)))
            .exec(&txn)
            .await
            .map_err(backend)?;

        if result.rows_affected != 1 {
            debug!(deal_id = %change.deal.id, "guarded deal update matched no row");
            txn.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        // The guarded update above holds the deal row, so the count is stable.
        let existing = deal_stage_history::Entity::find()
            .filter(deal_stage_history::Column::DealId.eq(change.deal.id))
            .count(&txn)
            .await
            .map_err(backend)?;
        let seq = i32::try_from(existing + 1)
            .map_err(|err| StoreError::Backend(anyhow::Error::new(err)))?;

        deal_stage_history::Entity::insert(active_history(&change.history, seq))
            .exec_without_returning(&txn)
            .await
            .map_err(backend)?;
        txn.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn history(&self, deal_id: Uuid) -> StoreResult<Vec<StageHistoryEntry>> {
        let rows = deal_stage_history::Entity::find()
            .filter(deal_stage_history::Column::DealId.eq(deal_id))
            .order_by_asc(deal_stage_history::Column::Seq)
            .all(&self.db)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(history_from_row).collect())
    }
}

fn backend(err: DbErr) -> StoreError {
    StoreError::Backend(anyhow::Error::new(err))
}

fn active_deal(deal: &Deal) -> deals::ActiveModel {
    deals::ActiveModel {
        id: Set(deal.id),
        owner_id: Set(deal.owner_id),
        title: Set(deal.title.clone()),
        value_cents: Set(deal.value_cents),
        currency: Set(deal.currency.clone()),
        stage: Set(stage_to_row(deal.stage)),
        outcome: Set(outcome_to_row(deal.outcome)),
        lost_reason: Set(deal.lost_reason.clone()),
        assigned_to: Set(deal.assigned_to),
        created_at: Set(deal.created_at.into()),
        stage_changed_at: Set(deal.stage_changed_at.into()),
        closed_at: Set(deal.closed_at.map(Into::into)),
        updated_at: Set(deal.updated_at.into()),
    }
}

fn deal_from_row(row: deals::Model) -> Deal {
    Deal {
        id: row.id,
        owner_id: row.owner_id,
        title: row.title,
        value_cents: row.value_cents,
        currency: row.currency,
        stage: stage_from_row(row.stage),
        outcome: outcome_from_row(row.outcome),
        lost_reason: row.lost_reason,
        assigned_to: row.assigned_to,
        created_at: row.created_at.with_timezone(&Utc),
        stage_changed_at: row.stage_changed_at.with_timezone(&Utc),
        closed_at: row.closed_at.map(|at| at.with_timezone(&Utc)),
        updated_at: row.updated_at.with_timezone(&Utc),
    }
}

fn active_history(entry: &StageHistoryEntry, seq: i32) -> deal_stage_history::ActiveModel {
    deal_stage_history::ActiveModel {
        id: Set(entry.id),
        deal_id: Set(entry.deal_id),
        seq: Set(seq),
        from_stage: Set(stage_to_row(entry.from_stage)),
        to_stage: Set(stage_to_row(entry.to_stage)),
        from_outcome: Set(outcome_to_row(entry.from_outcome)),
        to_outcome: Set(outcome_to_row(entry.to_outcome)),
        note: Set(entry.note.clone()),
        changed_by: Set(entry.changed_by),
        changed_at: Set(entry.changed_at.into()),
    }
}

fn history_from_row(row: deal_stage_history::Model) -> StageHistoryEntry {
    StageHistoryEntry {
        id: row.id,
        deal_id: row.deal_id,
        from_stage: stage_from_row(row.from_stage),
        to_stage: stage_from_row(row.to_stage),
        from_outcome: outcome_from_row(row.from_outcome),
        to_outcome: outcome_from_row(row.to_outcome),
        note: row.note,
        changed_by: row.changed_by,
        changed_at: row.changed_at.with_timezone(&Utc),
    }
}

fn stage_to_row(stage: Stage) -> deals::Stage {
    match stage {
        Stage::Lead => deals::Stage::Lead,
        Stage::Qualified => deals::Stage::Qualified,
        Stage::Proposal => deals::Stage::Proposal,
        Stage::Negotiation => deals::Stage::Negotiation,
    }
}

fn stage_from_row(stage: deals::Stage) -> Stage {
    match stage {
        deals::Stage::Lead => Stage::Lead,
        deals::Stage::Qualified => Stage::Qualified,
        deals::Stage::Proposal => Stage::Proposal,
        deals::Stage::Negotiation => Stage::Negotiation,
    }
}

fn outcome_to_row(outcome: Outcome) -> deals::Outcome {
    match outcome {
        Outcome::Open => deals::Outcome::Open,
        Outcome::Won => deals::Outcome::Won,
        Outcome::Lost => deals::Outcome::Lost,
    }
}

fn outcome_from_row(outcome: deals::Outcome) -> Outcome {
    match outcome {
        deals::Outcome::Open => Outcome::Open,
        deals::Outcome::Won => Outcome::Won,
        deals::Outcome::Lost => Outcome::Lost,
    }
}
