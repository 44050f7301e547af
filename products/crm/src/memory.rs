use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::deal::{Deal, StageHistoryEntry};
use crate::store::{DealStore, StageChange, StoreError, StoreResult};

#[derive(Default)]
struct MemoryState {
    deals: HashMap<Uuid, Deal>,
    history: Vec<StageHistoryEntry>,
}

/// Process-local store for tests and `serve --memory`.
#[derive(Default)]
pub struct MemoryDealStore {
    state: RwLock<MemoryState>,
}

impl MemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DealStore for MemoryDealStore {
    async fn insert(&self, deal: &Deal) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.deals.contains_key(&deal.id) {
            return Err(StoreError::Duplicate(deal.id));
        }
        state.deals.insert(deal.id, deal.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        Ok(self.state.read().await.deals.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Deal>> {
        let state = self.state.read().await;
        let mut deals: Vec<Deal> = state
            .deals
            .values()
            .filter(|deal| deal.owner_id == owner_id)
            .cloned()
            .collect();
        deals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(deals)
    }

    async fn owners(&self) -> StoreResult<Vec<Uuid>> {
        let state = self.state.read().await;
        let owners: BTreeSet<Uuid> = state.deals.values().map(|deal| deal.owner_id).collect();
        Ok(owners.into_iter().collect())
    }

    async fn commit(&self, change: &StageChange) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(current) = state.deals.get_mut(&change.deal.id) else {
            return Ok(false);
        };
        if current.stage != change.expected_stage || current.outcome != change.expected_outcome {
            return Ok(false);
        }
        *current = change.deal.clone();
        state.history.push(change.history.clone());
        Ok(true)
    }

    async fn history(&self, deal_id: Uuid) -> StoreResult<Vec<StageHistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|entry| entry.deal_id == deal_id)
            .cloned()
            .collect())
    }
}
