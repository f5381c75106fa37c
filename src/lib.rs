//! Investment Committee Orchestrator
//!
//! Coordinates a panel of specialist analysis agents that turn a raw market
//! event into one auditable investment decision:
//! - Fans work out to independent agents and fans findings back in
//! - Bounds every agent call with a timeout, retries and a degraded fallback
//! - Applies a risk gate that may loop back for re-analysis or abort
//! - Synthesizes a decision with a replayable deliberation transcript
//!
//! DELIBERATION LOOP:
//! SEED → STAGES → RISK GATE → LOOP? | ABORT? → SYNTHESIZE → MINUTES

pub mod agent;
pub mod agents;
pub mod api;
pub mod audit;
pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod invocation;
pub mod models;
pub mod reasoning;
pub mod risk;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Result;

// Re-export common types
pub use agent::{CommitteeOutcome, Orchestrator};
pub use config::CommitteeConfig;
pub use models::*;
