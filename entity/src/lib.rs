pub mod deal_stage_history;
pub mod deals;
