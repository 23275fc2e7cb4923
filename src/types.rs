//! Core types for the Synheart Rollup engine
//!
//! This module defines the values that flow through a fetch cycle: day offsets,
//! metric kinds, per-day records, and the per-day aggregates returned by a source.

use crate::error::RollupError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Days before the window anchor. 0 is the current day, larger values go back in time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DayOffset(pub u32);

impl DayOffset {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for DayOffset {
    fn from(value: u32) -> Self {
        DayOffset(value)
    }
}

impl fmt::Display for DayOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health metric identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    StepCount,
    Distance,
    EnergyBurned,
    ExerciseTime,
}

impl MetricKind {
    /// Every supported metric, in display order
    pub const ALL: [MetricKind; 4] = [
        MetricKind::StepCount,
        MetricKind::Distance,
        MetricKind::EnergyBurned,
        MetricKind::ExerciseTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::StepCount => "step_count",
            MetricKind::Distance => "distance",
            MetricKind::EnergyBurned => "energy_burned",
            MetricKind::ExerciseTime => "exercise_time",
        }
    }

    /// Unit that aggregated values of this metric are expressed in
    pub fn unit(&self) -> MetricUnit {
        match self {
            MetricKind::StepCount => MetricUnit::Count,
            MetricKind::Distance => MetricUnit::Kilometer,
            MetricKind::EnergyBurned => MetricUnit::Kilocalorie,
            MetricKind::ExerciseTime => MetricUnit::Minute,
        }
    }

    /// Inclusive range synthetic hourly samples are drawn from
    pub fn synthetic_range(&self) -> (f64, f64) {
        // Same span for every metric; the unit gives it meaning.
        (0.0, 60.0)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "step_count" | "steps" => Ok(MetricKind::StepCount),
            "distance" => Ok(MetricKind::Distance),
            "energy_burned" | "energy" => Ok(MetricKind::EnergyBurned),
            "exercise_time" | "exercise" => Ok(MetricKind::ExerciseTime),
            other => Err(RollupError::ParseError(format!("unknown metric: {}", other))),
        }
    }
}

/// Display unit of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Count,
    Kilometer,
    Kilocalorie,
    Minute,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Count => "count",
            MetricUnit::Kilometer => "km",
            MetricUnit::Kilocalorie => "kcal",
            MetricUnit::Minute => "min",
        }
    }
}

/// Aggregated metric values for a single day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayRecord {
    values: BTreeMap<MetricKind, f64>,
}

impl DayRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a metric value, returning the value it replaced
    pub fn insert(&mut self, metric: MetricKind, value: f64) -> Option<f64> {
        self.values.insert(metric, value)
    }

    pub fn get(&self, metric: MetricKind) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    pub fn contains(&self, metric: MetricKind) -> bool {
        self.values.contains_key(&metric)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }
}

/// One day of a source's aggregate query.
///
/// `Some(0.0)` is a real zero reported by the source; `None` means the source had
/// no data for that day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub day: DayOffset,
    pub value: Option<f64>,
}

impl DailyAggregate {
    pub fn present(day: u32, value: f64) -> Self {
        Self {
            day: DayOffset(day),
            value: Some(value),
        }
    }

    pub fn absent(day: u32) -> Self {
        Self {
            day: DayOffset(day),
            value: None,
        }
    }
}
