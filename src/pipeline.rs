//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Rollup.
//! It drives fetch cycles until the aggregated days can be handed to a consumer.
//!
//! Pipeline stages:
//! 1. Authorization - request read access, plus write access when fallback is on
//! 2. Fetch cycle - one concurrent query per metric, joined by the barrier
//! 3. Completion branch - gaps go to the synthetic generator, otherwise deliver
//! 4. Fallback - write synthetic samples, then re-fetch only the filled days
//!
//! The consumer is always called from the task awaiting [`DailyStatsPipeline::run`],
//! never from a query task.

use crate::config::EngineConfig;
use crate::coordinator::{CycleReport, MetricQueryCoordinator};
use crate::error::RollupError;
use crate::retry::with_retry;
use crate::source::{HealthSource, SourceError};
use crate::store::{DayIndexedStore, StatsSnapshot};
use crate::synthetic::SyntheticFallbackGenerator;
use crate::telemetry::{emit, events, TelemetryEvent, TelemetrySink, TracingTelemetry};
use crate::types::DayOffset;
use crate::window::DayWindow;
use crate::{PRODUCER_NAME, ROLLUP_VERSION};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Telemetry page name for pipeline events
const TELEMETRY_PAGE: &str = "daily_stats";

/// Receiver of aggregated stats
pub trait StatsConsumer: Send + Sync {
    /// Called once per run that completes without a pending fallback
    fn deliver(&self, snapshot: StatsSnapshot);
}

/// Consumer that keeps every delivered snapshot
#[derive(Debug, Default)]
pub struct CollectingConsumer {
    snapshots: Mutex<Vec<StatsSnapshot>>,
}

impl CollectingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<StatsSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<StatsSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn delivery_count(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl StatsConsumer for CollectingConsumer {
    fn deliver(&self, snapshot: StatsSnapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot);
    }
}

/// What a completed run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Every fetch cycle, in order
    pub cycles: Vec<CycleReport>,
    /// Days synthetic samples were written for
    pub synthesized: BTreeSet<DayOffset>,
    /// Days still without data when the snapshot was delivered
    pub unresolved: BTreeSet<DayOffset>,
}

impl RunSummary {
    pub fn fallback_passes(&self) -> usize {
        self.cycles.len().saturating_sub(1)
    }
}

/// Fetch-aggregate-deliver pipeline over one health source
pub struct DailyStatsPipeline {
    config: EngineConfig,
    source: Arc<dyn HealthSource>,
    store: Arc<DayIndexedStore>,
    coordinator: MetricQueryCoordinator,
    generator: Mutex<SyntheticFallbackGenerator>,
    telemetry: Arc<dyn TelemetrySink>,
    /// Anchor of the current session; offsets in the store are relative to it
    session_anchor: Mutex<Option<DateTime<Utc>>>,
}

impl DailyStatsPipeline {
    /// Create a pipeline with a validated configuration
    pub fn new(source: Arc<dyn HealthSource>, config: EngineConfig) -> Result<Self, RollupError> {
        config.validate()?;

        let store = Arc::new(DayIndexedStore::new());
        let coordinator = MetricQueryCoordinator::new(
            Arc::clone(&source),
            Arc::clone(&store),
            config.retry.clone(),
            config.cycle_timeout(),
            config.allow_synthetic_fallback,
        );
        let generator = SyntheticFallbackGenerator::new(
            config.write_metrics.iter().copied(),
            config.synthetic_seed,
        );

        Ok(Self {
            config,
            source,
            store,
            coordinator,
            generator: Mutex::new(generator),
            telemetry: Arc::new(TracingTelemetry),
            session_anchor: Mutex::new(None),
        })
    }

    /// Replace the default tracing telemetry sink
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Aggregated data collected so far in this session
    pub fn store(&self) -> &DayIndexedStore {
        &self.store
    }

    /// Request access to the configured metrics
    pub async fn authorize(&self) -> Result<(), RollupError> {
        let read = self.config.read_set();
        let write = self.config.write_set();

        match self.source.authorize(&read, &write).await {
            Ok(()) => {
                info!(read = read.len(), write = write.len(), "health data access granted");
                self.track(
                    TelemetryEvent::new(events::HEALTH_AUTHORIZATION)
                        .category("authorization")
                        .outcome("granted"),
                );
                Ok(())
            }
            Err(e) => {
                warn!("health data access denied: {e}");
                self.track(
                    TelemetryEvent::new(events::HEALTH_AUTHORIZATION)
                        .category("authorization")
                        .outcome("denied")
                        .error(&e),
                );
                Err(RollupError::AuthorizationDenied(e.to_string()))
            }
        }
    }

    /// Authorize, then aggregate the trailing window ending today
    pub async fn run(&self, consumer: &dyn StatsConsumer) -> Result<RunSummary, RollupError> {
        self.authorize().await?;
        self.run_at(Utc::now(), consumer).await
    }

    /// Aggregate the trailing window as seen at `now`, without authorizing.
    ///
    /// Delivers exactly one snapshot unless a synthetic write fails, in which case
    /// the consumer is not called and [`RollupError::WriteFailure`] is returned.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        consumer: &dyn StatsConsumer,
    ) -> Result<RunSummary, RollupError> {
        let metrics = self.config.metric_set();
        let mut window = DayWindow::trailing(now, self.config.window_days)?;
        self.begin_session(window.anchor())?;
        let mut cycles = Vec::new();
        let mut synthesized = BTreeSet::new();
        let mut passes = 0;

        loop {
            let report = self.coordinator.fetch(&metrics, &window).await?;
            let flagged = report.flagged.clone();
            cycles.push(report);

            if !flagged.is_empty()
                && self.config.allow_synthetic_fallback
                && passes < self.config.max_fallback_passes
            {
                let days = self.lock_generator().plan(&flagged, &synthesized);
                if !days.is_empty() {
                    passes += 1;
                    self.fill(&days, &window).await?;
                    synthesized.extend(days.iter().copied());
                    window = DayWindow::for_days(now, days)?;
                    continue;
                }
            }

            if !flagged.is_empty() {
                warn!(days = ?flagged, "delivering with unresolved days");
            }

            let snapshot = self.store.snapshot()?;
            info!(days = snapshot.len(), cycles = cycles.len(), "delivering daily stats");
            consumer.deliver(snapshot);
            self.track(
                TelemetryEvent::new(events::FETCH_CYCLE)
                    .category("fetch")
                    .outcome("delivered")
                    .with_property("cycles", cycles.len().to_string()),
            );

            return Ok(RunSummary {
                cycles,
                synthesized,
                unresolved: flagged,
            });
        }
    }

    /// Write synthetic samples for `days` as one batch
    async fn fill(&self, days: &BTreeSet<DayOffset>, window: &DayWindow) -> Result<(), RollupError> {
        let samples = self.lock_generator().generate(days, window);
        info!(days = ?days, samples = samples.len(), "writing synthetic samples");

        let result = with_retry("synthetic sample write", &self.config.retry, || {
            self.source.write_samples(samples.clone())
        })
        .await;

        match result {
            Ok(()) => {
                self.track(
                    TelemetryEvent::new(events::SYNTHETIC_FILL)
                        .category("fallback")
                        .outcome("written")
                        .with_property("days", days.len().to_string()),
                );
                Ok(())
            }
            Err(e) => {
                warn!(days = ?days, "synthetic write failed, days stay unresolved: {e}");
                self.track(
                    TelemetryEvent::new(events::SYNTHETIC_FILL)
                        .category("fallback")
                        .outcome("failed")
                        .error(&e),
                );
                self.track(
                    TelemetryEvent::new(events::FETCH_CYCLE)
                        .category("fetch")
                        .outcome("failed")
                        .error(&e),
                );
                Err(write_failure(days, e))
            }
        }
    }

    /// Clear the store when the day window has moved since the last run
    fn begin_session(&self, anchor: DateTime<Utc>) -> Result<(), RollupError> {
        let mut current = self
            .session_anchor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != Some(anchor) {
            if current.is_some() {
                info!(%anchor, "day changed, starting a new session");
            }
            self.store.clear()?;
            *current = Some(anchor);
        }
        Ok(())
    }

    fn lock_generator(&self) -> std::sync::MutexGuard<'_, SyntheticFallbackGenerator> {
        self.generator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, event: TelemetryEvent) {
        let event = event
            .page(TELEMETRY_PAGE)
            .with_property("producer", PRODUCER_NAME)
            .with_property("version", ROLLUP_VERSION);
        emit(self.telemetry.as_ref(), event);
    }
}

fn write_failure(days: &BTreeSet<DayOffset>, error: SourceError) -> RollupError {
    RollupError::WriteFailure {
        days: days.clone(),
        reason: error.to_string(),
    }
}
