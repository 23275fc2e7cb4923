//! Synthetic sample generation for days without real data
//!
//! Used when the source is known to have no sensor history (simulators, fresh
//! test devices). Every flagged day gets 24 hourly samples per write metric,
//! each drawn uniformly from the metric's plausible range. A day is filled at
//! most once per run.

use crate::schema::QuantitySample;
use crate::types::{DayOffset, MetricKind};
use crate::window::DayWindow;
use chrono::Duration;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// Hours generated for each day
pub const HOURS_PER_DAY: u32 = 24;

/// Generates randomized hourly samples for flagged days
#[derive(Debug, Clone)]
pub struct SyntheticFallbackGenerator {
    metrics: Vec<MetricKind>,
    rng: ChaCha8Rng,
}

impl SyntheticFallbackGenerator {
    /// Create a generator for `metrics`, reproducible when `seed` is set
    pub fn new(metrics: impl IntoIterator<Item = MetricKind>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut metrics: Vec<MetricKind> = metrics.into_iter().collect();
        metrics.sort();
        metrics.dedup();
        Self { metrics, rng }
    }

    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    /// Days to fill: the flagged set minus days this run has already filled
    pub fn plan(
        &self,
        flagged: &BTreeSet<DayOffset>,
        filled: &BTreeSet<DayOffset>,
    ) -> BTreeSet<DayOffset> {
        flagged.difference(filled).copied().collect()
    }

    /// Build the sample batch for `days`.
    ///
    /// Hour `h` of day `d` spans `[anchor - (24d + h + 1)h, anchor - (24d + h)h]`.
    /// Samples that would start after the window's `now` are skipped.
    pub fn generate(
        &mut self,
        days: &BTreeSet<DayOffset>,
        window: &DayWindow,
    ) -> Vec<QuantitySample> {
        let anchor = window.anchor();
        let now = window.now();
        let mut samples =
            Vec::with_capacity(days.len() * HOURS_PER_DAY as usize * self.metrics.len());

        for &day in days {
            for hour in 0..HOURS_PER_DAY {
                let hours_back = i64::from(day.0) * i64::from(HOURS_PER_DAY) + i64::from(hour);
                let Some(end) = anchor.checked_sub_signed(Duration::hours(hours_back)) else {
                    continue;
                };
                let Some(start) = end.checked_sub_signed(Duration::hours(1)) else {
                    continue;
                };
                if start > now {
                    continue;
                }

                for &metric in &self.metrics {
                    let (low, high) = metric.synthetic_range();
                    let value = self.rng.gen_range(low..=high);
                    samples.push(QuantitySample::new(metric, value, start, end).into_synthetic());
                }
            }
        }

        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn days(values: &[u32]) -> BTreeSet<DayOffset> {
        values.iter().copied().map(DayOffset).collect()
    }

    fn late_evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap()
    }

    fn generator(seed: u64) -> SyntheticFallbackGenerator {
        SyntheticFallbackGenerator::new(
            [
                MetricKind::StepCount,
                MetricKind::Distance,
                MetricKind::EnergyBurned,
            ],
            Some(seed),
        )
    }

    #[test]
    fn test_full_past_day() {
        let window = DayWindow::trailing(late_evening(), 5).unwrap();
        let samples = generator(1).generate(&days(&[4]), &window);

        assert_eq!(samples.len(), 24 * 3);
        for sample in &samples {
            assert!(sample.synthetic);
            assert!(sample.validate().is_ok());
            assert!((0.0..=60.0).contains(&sample.value));
            assert_eq!(sample.end - sample.start, Duration::hours(1));
            assert_eq!(window.offset_of(sample.start), Some(DayOffset(4)));
        }
    }

    #[test]
    fn test_samples_cover_each_hour_once() {
        let window = DayWindow::trailing(late_evening(), 3).unwrap();
        let samples = generator(2).generate(&days(&[1, 2]), &window);

        let mut per_metric: BTreeMap<MetricKind, BTreeSet<_>> = BTreeMap::new();
        for sample in &samples {
            per_metric.entry(sample.metric).or_default().insert(sample.start);
        }
        assert_eq!(per_metric.len(), 3);
        for starts in per_metric.values() {
            assert_eq!(starts.len(), 48);
        }
    }

    #[test]
    fn test_future_hours_skipped() {
        let morning = Utc.with_ymd_and_hms(2024, 1, 15, 2, 15, 0).unwrap();
        let window = DayWindow::trailing(morning, 1).unwrap();
        let samples = generator(3).generate(&days(&[0]), &window);

        // 00:00, 01:00 and 02:00 hours have started
        assert_eq!(samples.len(), 3 * 3);
        assert!(samples.iter().all(|s| s.start <= morning));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let window = DayWindow::trailing(late_evening(), 2).unwrap();
        let a = generator(42).generate(&days(&[1]), &window);
        let b = generator(42).generate(&days(&[1]), &window);
        let c = generator(43).generate(&days(&[1]), &window);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_plan_keeps_every_flagged_day() {
        let planned = generator(4).plan(&days(&[1, 2, 3]), &BTreeSet::new());
        assert_eq!(planned, days(&[1, 2, 3]));
    }

    #[test]
    fn test_plan_skips_days_filled_this_run() {
        let planned = generator(4).plan(&days(&[1, 2, 3]), &days(&[2]));
        assert_eq!(planned, days(&[1, 3]));

        let replanned = generator(4).plan(&days(&[1]), &days(&[1, 3]));
        assert!(replanned.is_empty());
    }

    #[test]
    fn test_days_outside_date_range_skipped() {
        let window = DayWindow::trailing(late_evening(), 1).unwrap();
        let samples = generator(5).generate(&days(&[u32::MAX]), &window);
        assert!(samples.is_empty());
    }

    #[test]
    fn test_duplicate_metrics_collapsed() {
        let generator =
            SyntheticFallbackGenerator::new([MetricKind::Distance, MetricKind::Distance], None);
        assert_eq!(generator.metrics(), &[MetricKind::Distance]);
    }
}
