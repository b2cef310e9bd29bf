//! State module for tracking crawl progress
//!
//! - `RegionState`: the per-region state machine the orchestrator walks through

mod region_state;

pub use region_state::RegionState;
