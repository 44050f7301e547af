//! Shared setup for database-backed integration tests.
//!
//! Tests run against the Postgres instance named by `TEST_DATABASE_URL` and
//! skip themselves when it is unset. Every test works with freshly generated
//! owner ids, so they can share one migrated database.

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use once_cell::sync::Lazy;
use platform_db::{DatabaseSettings, DbPool, SeaOrmDealStore, connect};
use products_crm::PipelineEngine;
use tokio::sync::Mutex;

static MIGRATED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

pub struct PgContext {
    pub pool: DbPool,
    pub store: Arc<SeaOrmDealStore>,
    pub engine: PipelineEngine,
}

impl PgContext {
    pub async fn connect() -> Option<Self> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("skipping Postgres pipeline tests: TEST_DATABASE_URL not set");
                return None;
            }
        };
        let pool = connect(&DatabaseSettings::new(url)).await.ok()?;
        {
            let mut migrated = MIGRATED.lock().await;
            if !*migrated {
                Migrator::up(&pool, None).await.ok()?;
                *migrated = true;
            }
        }
        let store = Arc::new(SeaOrmDealStore::new(pool.clone()));
        let engine = PipelineEngine::new(store.clone());
        Some(Self {
            pool,
            store,
            engine,
        })
    }
}
