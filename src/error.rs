//! Error types for Synheart Rollup

use crate::types::DayOffset;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur while running fetch cycles
#[derive(Debug, Error)]
pub enum RollupError {
    #[error("Health data authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Synthetic sample write failed for days {days:?}: {reason}")]
    WriteFailure {
        days: BTreeSet<DayOffset>,
        reason: String,
    },

    #[error("Fetch cycle ended before all metric queries reported")]
    CycleAborted,

    #[error("Invalid day window: {0}")]
    InvalidWindow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Shared state lock poisoned: {0}")]
    StatePoisoned(&'static str),
}
