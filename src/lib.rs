//! Synheart Rollup - Concurrent daily aggregation engine for wearable health metrics
//!
//! Rollup pulls several time-series metrics (steps, distance, energy, exercise time)
//! from a health data source over a trailing window of days, folds each metric into
//! one value per day, and hands the result to a consumer only once every per-metric
//! query of a fetch cycle has finished:
//! query fan-out → day-indexed aggregation → completion barrier → delivery.
//!
//! ## Modules
//!
//! - **Fetch cycle**: [`coordinator`] issues one query per metric and joins them through
//!   a [`barrier::FetchBarrier`]
//! - **Gap fallback**: [`gaps`] tracks days without real data, [`synthetic`] fills them
//!   with plausible samples when the engine is configured to do so
//! - **Pipeline**: [`pipeline`] runs cycles until the data can be delivered

pub mod barrier;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gaps;
pub mod pipeline;
pub mod retry;
pub mod schema;
pub mod source;
pub mod store;
pub mod synthetic;
pub mod telemetry;
pub mod types;
pub mod window;

pub use config::EngineConfig;
pub use coordinator::{CycleReport, MetricQueryCoordinator};
pub use error::RollupError;
pub use pipeline::{CollectingConsumer, DailyStatsPipeline, RunSummary, StatsConsumer};
pub use source::{HealthSource, MemorySource, SourceError};
pub use store::{DayIndexedStore, StatsSnapshot};
pub use types::{DayOffset, DayRecord, MetricKind};

// Schema exports
pub use schema::{QuantitySample, SampleAdapter, SCHEMA_VERSION};

/// Rollup version reported in telemetry and CLI output
pub const ROLLUP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name attached to telemetry events
pub const PRODUCER_NAME: &str = "synheart-rollup";
