//! Fetch cycle coordination
//!
//! One cycle issues a single aggregate query per metric over a day window. Query
//! tasks run concurrently and finish in any order; each one writes its days into
//! the shared store, updates the cycle's gap tracker, and releases its barrier
//! unit. The barrier's zero crossing wakes the coordinator, which then reads a gap
//! set that reflects every finished query.

use crate::barrier::{BarrierUnit, FetchBarrier};
use crate::error::RollupError;
use crate::gaps::GapTracker;
use crate::retry::{with_retry, RetryConfig};
use crate::source::HealthSource;
use crate::store::DayIndexedStore;
use crate::types::{DailyAggregate, DayOffset, MetricKind};
use crate::window::DayWindow;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How a metric's query ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricStatus {
    /// Query returned; `days_with_data` requested days had a real value
    Reported { days_with_data: usize },
    /// Query failed after retries
    Failed { reason: String },
    /// Query did not answer before the cycle deadline
    TimedOut,
}

/// Outcome of one metric query within a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricOutcome {
    pub metric: MetricKind,
    #[serde(flatten)]
    pub status: MetricStatus,
}

/// Result of a completed fetch cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Days the cycle asked for
    pub requested: BTreeSet<DayOffset>,
    /// Requested days that no metric supplied real data for
    pub flagged: BTreeSet<DayOffset>,
    /// One entry per queried metric, in completion order
    pub outcomes: Vec<MetricOutcome>,
}

impl CycleReport {
    /// Metrics whose query failed or timed out
    pub fn failed_metrics(&self) -> Vec<MetricKind> {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.status, MetricStatus::Reported { .. }))
            .map(|o| o.metric)
            .collect()
    }

    pub fn has_gaps(&self) -> bool {
        !self.flagged.is_empty()
    }
}

/// Issues per-metric queries and joins them through a [`FetchBarrier`]
pub struct MetricQueryCoordinator {
    source: Arc<dyn HealthSource>,
    store: Arc<DayIndexedStore>,
    retry: RetryConfig,
    cycle_timeout: Duration,
    track_gaps: bool,
}

impl MetricQueryCoordinator {
    pub fn new(
        source: Arc<dyn HealthSource>,
        store: Arc<DayIndexedStore>,
        retry: RetryConfig,
        cycle_timeout: Duration,
        track_gaps: bool,
    ) -> Self {
        Self {
            source,
            store,
            retry,
            cycle_timeout,
            track_gaps,
        }
    }

    /// Run one fetch cycle for `metrics` over `window`.
    ///
    /// Returns once every metric query has reported, failed, or hit the deadline.
    /// Failed metrics degrade to gaps for their days; they do not fail the cycle.
    pub async fn fetch(
        &self,
        metrics: &BTreeSet<MetricKind>,
        window: &DayWindow,
    ) -> Result<CycleReport, RollupError> {
        let cycle_id = Uuid::new_v4();
        let gaps = Arc::new(GapTracker::new(self.track_gaps));
        if !metrics.is_empty() {
            gaps.flag_all(window.days().iter().copied());
        }

        let outcomes = Arc::new(Mutex::new(Vec::with_capacity(metrics.len())));
        let (done_tx, done_rx) = oneshot::channel();
        let barrier = Arc::new(FetchBarrier::new(move || {
            let _ = done_tx.send(());
        }));

        info!(
            %cycle_id,
            metrics = metrics.len(),
            days = window.len(),
            "starting fetch cycle"
        );

        // Every unit is counted before the first task can finish.
        barrier.arm(metrics.len());
        let deadline = Instant::now() + self.cycle_timeout;

        for &metric in metrics {
            let task = MetricQueryTask {
                unit: BarrierUnit::new(Arc::clone(&barrier)),
                source: Arc::clone(&self.source),
                store: Arc::clone(&self.store),
                gaps: Arc::clone(&gaps),
                outcomes: Arc::clone(&outcomes),
                window: window.clone(),
                retry: self.retry.clone(),
                metric,
                deadline,
            };
            let span = info_span!("metric_query", %cycle_id, %metric);
            tokio::spawn(task.run().instrument(span));
        }

        // Only the query tasks keep the barrier alive from here on. If they all
        // vanish without resolving it, the sender is dropped and the cycle aborts.
        drop(barrier);
        done_rx.await.map_err(|_| RollupError::CycleAborted)?;

        let flagged = gaps.drain();
        let outcomes = std::mem::take(
            &mut *outcomes.lock().unwrap_or_else(PoisonError::into_inner),
        );

        info!(
            %cycle_id,
            flagged = flagged.len(),
            failed = outcomes
                .iter()
                .filter(|o| !matches!(o.status, MetricStatus::Reported { .. }))
                .count(),
            "fetch cycle complete"
        );

        Ok(CycleReport {
            cycle_id,
            requested: window.days().clone(),
            flagged,
            outcomes,
        })
    }
}

/// Query for one metric, holding one barrier unit until it is dropped
struct MetricQueryTask {
    unit: BarrierUnit,
    source: Arc<dyn HealthSource>,
    store: Arc<DayIndexedStore>,
    gaps: Arc<GapTracker>,
    outcomes: Arc<Mutex<Vec<MetricOutcome>>>,
    window: DayWindow,
    retry: RetryConfig,
    metric: MetricKind,
    deadline: Instant,
}

impl MetricQueryTask {
    async fn run(self) {
        let operation = format!("{} daily aggregate query", self.metric);
        let query = with_retry(&operation, &self.retry, || {
            self.source.query_daily_aggregate(self.metric, &self.window)
        });

        let status = match timeout_at(self.deadline, query).await {
            Ok(Ok(aggregates)) => self.apply(aggregates),
            Ok(Err(e)) => {
                warn!("query failed, treating its days as gaps: {e}");
                self.mark_all_gaps();
                MetricStatus::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!("query did not answer before the cycle deadline");
                self.mark_all_gaps();
                MetricStatus::TimedOut
            }
        };

        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MetricOutcome {
                metric: self.metric,
                status,
            });

        // Releasing the unit last publishes every write above to the coordinator.
        drop(self.unit);
    }

    fn apply(&self, aggregates: Vec<DailyAggregate>) -> MetricStatus {
        let mut days_with_data = 0;
        for aggregate in aggregates {
            if !self.window.contains(aggregate.day) {
                continue;
            }
            match aggregate.value {
                Some(value) => match self.store.record(aggregate.day, self.metric, value) {
                    Ok(()) => {
                        self.gaps.resolve(aggregate.day);
                        days_with_data += 1;
                    }
                    Err(e) => {
                        warn!(day = %aggregate.day, "failed to store aggregate: {e}");
                        self.gaps.mark_gap(aggregate.day);
                    }
                },
                None => self.gaps.mark_gap(aggregate.day),
            }
        }
        debug!(days_with_data, "query applied");
        MetricStatus::Reported { days_with_data }
    }

    fn mark_all_gaps(&self) {
        for &day in self.window.days() {
            self.gaps.mark_gap(day);
        }
    }
}
