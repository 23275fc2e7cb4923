//! Health data source abstraction
//!
//! The engine treats the platform health store as an opaque asynchronous
//! collaborator with three operations: authorize, query one metric's daily sums
//! over a window, and write a batch of samples.
//!
//! [`MemorySource`] is an in-process implementation used for simulated runs and
//! tests. It sums samples per calendar day and can be configured to misbehave.

use crate::schema::QuantitySample;
use crate::types::{DailyAggregate, DayOffset, MetricKind};
use crate::window::DayWindow;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a health source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("authorization denied: {0}")]
    Unauthorized(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("write rejected: {0}")]
    Write(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Whether repeating the same call might succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SourceError::Unauthorized(_))
    }
}

/// Asynchronous health data store
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Request read access to `read` and write access to `write`
    async fn authorize(
        &self,
        read: &BTreeSet<MetricKind>,
        write: &BTreeSet<MetricKind>,
    ) -> Result<(), SourceError>;

    /// Sum `metric` per day over the window's span.
    ///
    /// Returns one entry per day of [`DayWindow::span_days`], with `None` for days
    /// that have no data at all.
    async fn query_daily_aggregate(
        &self,
        metric: MetricKind,
        window: &DayWindow,
    ) -> Result<Vec<DailyAggregate>, SourceError>;

    /// Persist a batch of samples in one write
    async fn write_samples(&self, samples: Vec<QuantitySample>) -> Result<(), SourceError>;
}

/// Failure injection for [`MemorySource`]
#[derive(Debug, Clone, Default)]
pub struct MemorySourceBehavior {
    pub deny_authorization: bool,
    pub failing_metrics: BTreeSet<MetricKind>,
    /// Metrics whose queries never return
    pub hanging_metrics: BTreeSet<MetricKind>,
    pub fail_writes: bool,
    /// Latency added to every query
    pub query_delay: Option<Duration>,
}

/// Query issued against a [`MemorySource`], kept for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub metric: MetricKind,
    pub days: BTreeSet<DayOffset>,
}

#[derive(Debug, Default)]
struct MemoryState {
    samples: Vec<QuantitySample>,
    behavior: MemorySourceBehavior,
    queries: Vec<QueryRecord>,
    write_batches: Vec<Vec<QuantitySample>>,
}

/// In-memory health source
#[derive(Debug, Default)]
pub struct MemorySource {
    state: RwLock<MemoryState>,
}

impl MemorySource {
    /// Create an empty source, as found on a device with no sensor history
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source pre-loaded with samples
    pub fn with_samples(samples: Vec<QuantitySample>) -> Self {
        let source = Self::new();
        source.write().samples = samples;
        source
    }

    pub fn set_behavior(&self, behavior: MemorySourceBehavior) {
        self.write().behavior = behavior;
    }

    /// Add samples directly, bypassing write failure injection
    pub fn insert_samples(&self, samples: impl IntoIterator<Item = QuantitySample>) {
        self.write().samples.extend(samples);
    }

    pub fn sample_count(&self) -> usize {
        self.read().samples.len()
    }

    /// Queries received so far, in arrival order
    pub fn queries(&self) -> Vec<QueryRecord> {
        self.read().queries.clone()
    }

    /// Successful write batches, in arrival order
    pub fn write_batches(&self) -> Vec<Vec<QuantitySample>> {
        self.read().write_batches.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn aggregate(&self, metric: MetricKind, window: &DayWindow) -> Vec<DailyAggregate> {
        let state = self.read();
        let mut sums: BTreeMap<DayOffset, f64> = BTreeMap::new();
        for sample in state.samples.iter().filter(|s| s.metric == metric) {
            if let Some(day) = window.offset_of(sample.start) {
                *sums.entry(day).or_insert(0.0) += sample.value;
            }
        }

        window
            .span_days()
            .map(|day| DailyAggregate {
                day,
                value: sums.get(&day).copied(),
            })
            .collect()
    }
}

#[async_trait]
impl HealthSource for MemorySource {
    async fn authorize(
        &self,
        _read: &BTreeSet<MetricKind>,
        _write: &BTreeSet<MetricKind>,
    ) -> Result<(), SourceError> {
        if self.read().behavior.deny_authorization {
            return Err(SourceError::Unauthorized(
                "user declined health data access".to_string(),
            ));
        }
        Ok(())
    }

    async fn query_daily_aggregate(
        &self,
        metric: MetricKind,
        window: &DayWindow,
    ) -> Result<Vec<DailyAggregate>, SourceError> {
        let behavior = {
            let mut state = self.write();
            state.queries.push(QueryRecord {
                metric,
                days: window.days().clone(),
            });
            state.behavior.clone()
        };

        if let Some(delay) = behavior.query_delay {
            tokio::time::sleep(delay).await;
        }
        if behavior.hanging_metrics.contains(&metric) {
            std::future::pending::<()>().await;
        }
        if behavior.failing_metrics.contains(&metric) {
            return Err(SourceError::Query(format!("{} statistics unavailable", metric)));
        }

        Ok(self.aggregate(metric, window))
    }

    async fn write_samples(&self, samples: Vec<QuantitySample>) -> Result<(), SourceError> {
        let mut state = self.write();
        if state.behavior.fail_writes {
            return Err(SourceError::Write("health store refused samples".to_string()));
        }
        if let Some(invalid) = samples.iter().find_map(|s| s.validate().err()) {
            return Err(SourceError::Write(invalid.to_string()));
        }
        state.samples.extend(samples.iter().cloned());
        state.write_batches.push(samples);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn sample_on(day: u32, metric: MetricKind, value: f64) -> QuantitySample {
        let window = DayWindow::trailing(now(), 7).unwrap();
        let end = window.day_start(DayOffset(day)) + ChronoDuration::hours(9);
        QuantitySample::hourly(metric, value, end)
    }

    #[tokio::test]
    async fn test_sums_per_day_and_distinguishes_zero() {
        let source = MemorySource::with_samples(vec![
            sample_on(0, MetricKind::StepCount, 300.0),
            sample_on(0, MetricKind::StepCount, 200.0),
            sample_on(1, MetricKind::StepCount, 0.0),
            sample_on(2, MetricKind::Distance, 4.0),
        ]);

        let window = DayWindow::trailing(now(), 3).unwrap();
        let aggregates = source
            .query_daily_aggregate(MetricKind::StepCount, &window)
            .await
            .unwrap();

        assert_eq!(
            aggregates,
            vec![
                DailyAggregate::present(0, 500.0),
                DailyAggregate::present(1, 0.0),
                DailyAggregate::absent(2),
            ]
        );
    }

    #[tokio::test]
    async fn test_records_queries() {
        let source = MemorySource::new();
        let window = DayWindow::for_days(now(), [DayOffset(4)]).unwrap();
        source
            .query_daily_aggregate(MetricKind::Distance, &window)
            .await
            .unwrap();

        let queries = source.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].metric, MetricKind::Distance);
        assert_eq!(queries[0].days, [DayOffset(4)].into_iter().collect());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let source = MemorySource::new();
        source.set_behavior(MemorySourceBehavior {
            deny_authorization: true,
            failing_metrics: [MetricKind::EnergyBurned].into_iter().collect(),
            fail_writes: true,
            ..Default::default()
        });

        let all: BTreeSet<_> = MetricKind::ALL.into_iter().collect();
        assert!(matches!(
            source.authorize(&all, &all).await,
            Err(SourceError::Unauthorized(_))
        ));

        let window = DayWindow::trailing(now(), 1).unwrap();
        assert!(source
            .query_daily_aggregate(MetricKind::EnergyBurned, &window)
            .await
            .is_err());
        assert!(source
            .query_daily_aggregate(MetricKind::StepCount, &window)
            .await
            .is_ok());

        let batch = vec![sample_on(0, MetricKind::StepCount, 1.0)];
        assert!(source.write_samples(batch).await.is_err());
        assert_eq!(source.sample_count(), 0);
        assert!(source.write_batches().is_empty());
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_samples() {
        let source = MemorySource::new();
        let batch = vec![sample_on(0, MetricKind::StepCount, -5.0)];
        assert!(matches!(
            source.write_samples(batch).await,
            Err(SourceError::Write(_))
        ));
    }
}
