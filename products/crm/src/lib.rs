//! CRM deal pipeline.
//!
//! [`PipelineEngine`] moves deals through the fixed stage order, closes them
//! as won or lost, and derives win/loss and forecast reports. Persistence is
//! injected through [`DealStore`].

pub mod analytics;
pub mod deal;
pub mod engine;
pub mod error;
pub mod memory;
pub mod stage;
pub mod store;

pub use analytics::{BatchForecast, RevenueForecast, StageForecast, WinLossReport};
pub use deal::{Caller, DEFAULT_LOST_REASON, Deal, NewDeal, StageHistoryEntry};
pub use engine::{PipelineEngine, StageAction};
pub use error::{PipelineError, PipelineResult};
pub use memory::MemoryDealStore;
pub use stage::{Outcome, Stage, StageInfo, pipeline_stages};
pub use store::{DealStore, StageChange, StoreError, StoreResult};
