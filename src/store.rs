//! Day-indexed metric store
//!
//! Holds the aggregated value of every metric per day for one pipeline session.
//! Entries are created the first time a metric writes to a day and are only
//! removed when a new session starts. Each day sits behind its own lock, so query
//! tasks writing different days only share the outer map lookup.

use crate::error::RollupError;
use crate::types::{DayOffset, DayRecord, MetricKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Shared handle to one day's record
pub type DayEntry = Arc<Mutex<DayRecord>>;

/// Sparse map from day offset to that day's metric record
#[derive(Debug, Default)]
pub struct DayIndexedStore {
    days: RwLock<BTreeMap<DayOffset, DayEntry>>,
}

impl DayIndexedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for a day, creating an empty one on first access
    pub fn get_or_create(&self, day: DayOffset) -> Result<DayEntry, RollupError> {
        {
            let days = self
                .days
                .read()
                .map_err(|_| RollupError::StatePoisoned("day store"))?;
            if let Some(entry) = days.get(&day) {
                return Ok(Arc::clone(entry));
            }
        }

        let mut days = self
            .days
            .write()
            .map_err(|_| RollupError::StatePoisoned("day store"))?;
        Ok(Arc::clone(days.entry(day).or_default()))
    }

    /// Write one metric value for a day
    pub fn record(&self, day: DayOffset, metric: MetricKind, value: f64) -> Result<(), RollupError> {
        let entry = self.get_or_create(day)?;
        let mut record = entry
            .lock()
            .map_err(|_| RollupError::StatePoisoned("day record"))?;
        record.insert(metric, value);
        Ok(())
    }

    /// Whether any metric has been stored for a day
    pub fn has_data(&self, day: DayOffset) -> Result<bool, RollupError> {
        let entry = {
            let days = self
                .days
                .read()
                .map_err(|_| RollupError::StatePoisoned("day store"))?;
            match days.get(&day) {
                Some(entry) => Arc::clone(entry),
                None => return Ok(false),
            }
        };
        let record = entry
            .lock()
            .map_err(|_| RollupError::StatePoisoned("day record"))?;
        Ok(!record.is_empty())
    }

    /// Number of days with an entry
    pub fn len(&self) -> usize {
        self.days
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, starting a new session
    pub fn clear(&self) -> Result<(), RollupError> {
        self.days
            .write()
            .map_err(|_| RollupError::StatePoisoned("day store"))?
            .clear();
        Ok(())
    }

    /// Immutable copy of every day's record
    pub fn snapshot(&self) -> Result<StatsSnapshot, RollupError> {
        let days = self
            .days
            .read()
            .map_err(|_| RollupError::StatePoisoned("day store"))?;

        let mut copy = BTreeMap::new();
        for (day, entry) in days.iter() {
            let record = entry
                .lock()
                .map_err(|_| RollupError::StatePoisoned("day record"))?;
            copy.insert(*day, record.clone());
        }

        Ok(StatsSnapshot { days: copy })
    }
}

/// Read-only view of the store handed to consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub days: BTreeMap<DayOffset, DayRecord>,
}

impl StatsSnapshot {
    pub fn get(&self, day: DayOffset) -> Option<&DayRecord> {
        self.days.get(&day)
    }

    pub fn value(&self, day: DayOffset, metric: MetricKind) -> Option<f64> {
        self.days.get(&day).and_then(|record| record.get(metric))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Serialize snapshot to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_entries_created_lazily() {
        let store = DayIndexedStore::new();
        assert!(store.is_empty());
        assert!(!store.has_data(DayOffset(2)).unwrap());

        store.record(DayOffset(2), MetricKind::StepCount, 4200.0).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.has_data(DayOffset(2)).unwrap());
        assert!(!store.has_data(DayOffset(0)).unwrap());
    }

    #[test]
    fn test_get_or_create_returns_same_entry() {
        let store = DayIndexedStore::new();
        let first = store.get_or_create(DayOffset(1)).unwrap();
        first.lock().unwrap().insert(MetricKind::Distance, 3.2);

        let second = store.get_or_create(DayOffset(1)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().unwrap().get(MetricKind::Distance), Some(3.2));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = DayIndexedStore::new();
        store.record(DayOffset(0), MetricKind::StepCount, 10.0).unwrap();

        let snapshot = store.snapshot().unwrap();
        store.record(DayOffset(0), MetricKind::StepCount, 99.0).unwrap();

        assert_eq!(snapshot.value(DayOffset(0), MetricKind::StepCount), Some(10.0));
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(DayIndexedStore::new());
        let handles: Vec<_> = MetricKind::ALL
            .into_iter()
            .map(|metric| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for day in 0..30 {
                        store.record(DayOffset(day), metric, f64::from(day)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 30);
        for (day, record) in &snapshot.days {
            assert_eq!(record.len(), MetricKind::ALL.len());
            assert_eq!(record.get(MetricKind::ExerciseTime), Some(f64::from(day.0)));
        }
    }

    #[test]
    fn test_clear_starts_empty() {
        let store = DayIndexedStore::new();
        store.record(DayOffset(0), MetricKind::StepCount, 500.0).unwrap();
        store.clear().unwrap();

        assert!(store.is_empty());
        assert!(!store.has_data(DayOffset(0)).unwrap());
    }

    #[test]
    fn test_len_survives_poisoned_lock() {
        let store = Arc::new(DayIndexedStore::new());
        store.record(DayOffset(1), MetricKind::Distance, 1.5).unwrap();

        let poisoner = Arc::clone(&store);
        let result = thread::spawn(move || {
            let _guard = poisoner.days.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(store.len(), 1);
        assert!(store.snapshot().is_err());
    }

    #[test]
    fn test_snapshot_json_keys() {
        let store = DayIndexedStore::new();
        store.record(DayOffset(3), MetricKind::EnergyBurned, 450.0).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&store.snapshot().unwrap().to_json().unwrap()).unwrap();
        assert_eq!(json["days"]["3"]["energy_burned"], 450.0);
    }
}
