//! Quantity sample record (health.quantity_sample.v1)
//!
//! A single measured or synthesized amount of one metric over a time span. These
//! are what the fallback generator writes back to a health source, and what the
//! CLI reads when seeding an in-memory source.

use crate::types::MetricKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Schema version identifier
pub const SCHEMA_VERSION: &str = "health.quantity_sample.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Amount of one metric recorded over `[start, end]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitySample {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub metric: MetricKind,
    /// Value in the metric's display unit
    pub value: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// True for samples produced by the fallback generator
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl QuantitySample {
    pub fn new(metric: MetricKind, value: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            metric,
            value,
            start,
            end,
            synthetic: false,
        }
    }

    /// Hour-long sample ending at `end`
    pub fn hourly(metric: MetricKind, value: f64, end: DateTime<Utc>) -> Self {
        Self::new(metric, value, end - Duration::hours(1), end)
    }

    /// Mark the sample as generated rather than measured
    pub fn into_synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    /// Validate the sample
    pub fn validate(&self) -> Result<(), SampleValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(SampleValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if !self.value.is_finite() || self.value < 0.0 {
            return Err(SampleValidationError::InvalidValue {
                metric: self.metric,
                value: self.value,
            });
        }

        if self.end < self.start {
            return Err(SampleValidationError::InvertedSpan {
                start: self.start,
                end: self.end,
            });
        }

        Ok(())
    }
}

/// Validation errors for quantity samples
#[derive(Debug, Clone, thiserror::Error)]
pub enum SampleValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Invalid value {value} for {metric}")]
    InvalidValue { metric: MetricKind, value: f64 },

    #[error("Sample ends ({end}) before it starts ({start})")]
    InvertedSpan {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
