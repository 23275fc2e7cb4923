//! Gap tracking for synthetic fallback
//!
//! A gap is a requested day for which no metric query reported a real value.
//! Once any metric resolves a day it stays resolved for the rest of the cycle, so
//! the final gap set does not depend on the order query results arrive in.

use crate::types::DayOffset;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct GapState {
    flagged: BTreeSet<DayOffset>,
    resolved: BTreeSet<DayOffset>,
}

/// Set of days that still need synthetic data
#[derive(Debug)]
pub struct GapTracker {
    enabled: bool,
    state: Mutex<GapState>,
}

impl GapTracker {
    /// Create a tracker. A disabled tracker never flags any day.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(GapState::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flag every requested day up front; queries clear them as data arrives
    pub fn flag_all(&self, days: impl IntoIterator<Item = DayOffset>) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        for day in days {
            if !state.resolved.contains(&day) {
                state.flagged.insert(day);
            }
        }
    }

    /// Record that a day has no data from one metric
    pub fn mark_gap(&self, day: DayOffset) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        if !state.resolved.contains(&day) {
            state.flagged.insert(day);
        }
    }

    /// Record that a day received a real value
    pub fn resolve(&self, day: DayOffset) {
        let mut state = self.lock();
        state.flagged.remove(&day);
        state.resolved.insert(day);
    }

    pub fn contains(&self, day: DayOffset) -> bool {
        self.lock().flagged.contains(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().flagged.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().flagged.len()
    }

    /// Copy of the currently flagged days
    pub fn flagged(&self) -> BTreeSet<DayOffset> {
        self.lock().flagged.clone()
    }

    /// Take the flagged days and reset the tracker
    pub fn drain(&self) -> BTreeSet<DayOffset> {
        let mut state = self.lock();
        state.resolved.clear();
        std::mem::take(&mut state.flagged)
    }

    fn lock(&self) -> MutexGuard<'_, GapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(values: &[u32]) -> BTreeSet<DayOffset> {
        values.iter().copied().map(DayOffset).collect()
    }

    #[test]
    fn test_resolve_clears_flag() {
        let tracker = GapTracker::new(true);
        tracker.flag_all((0..5).map(DayOffset));
        tracker.resolve(DayOffset(0));
        tracker.resolve(DayOffset(3));

        assert_eq!(tracker.flagged(), days(&[1, 2, 4]));
        assert!(tracker.contains(DayOffset(4)));
        assert!(!tracker.contains(DayOffset(3)));
    }

    #[test]
    fn test_gap_after_resolution_is_ignored() {
        let tracker = GapTracker::new(true);
        tracker.flag_all([DayOffset(1)]);
        tracker.resolve(DayOffset(1));
        tracker.mark_gap(DayOffset(1));

        assert!(tracker.is_empty());
    }

    #[test]
    fn test_order_independent() {
        let a = GapTracker::new(true);
        a.mark_gap(DayOffset(2));
        a.resolve(DayOffset(2));

        let b = GapTracker::new(true);
        b.resolve(DayOffset(2));
        b.mark_gap(DayOffset(2));

        assert_eq!(a.flagged(), b.flagged());
        assert!(a.is_empty());
    }

    #[test]
    fn test_disabled_tracker_never_flags() {
        let tracker = GapTracker::disabled();
        tracker.flag_all((0..3).map(DayOffset));
        tracker.mark_gap(DayOffset(1));

        assert!(!tracker.is_enabled());
        assert!(tracker.is_empty());
        assert!(tracker.drain().is_empty());
    }

    #[test]
    fn test_drain_resets() {
        let tracker = GapTracker::new(true);
        tracker.flag_all([DayOffset(1), DayOffset(4)]);
        tracker.resolve(DayOffset(1));

        assert_eq!(tracker.drain(), days(&[4]));
        assert!(tracker.is_empty());

        // resolution state is reset along with the flags
        tracker.mark_gap(DayOffset(1));
        assert_eq!(tracker.len(), 1);
    }
}
