//! Day windows anchored at the end of the current day
//!
//! Day `d` covers `[anchor - (d + 1) days, anchor - d days)`, where the anchor is
//! midnight at the end of the day containing `now`.

use crate::error::RollupError;
use crate::types::DayOffset;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Largest window, in days; offsets must stay below it
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Set of day offsets to query, with the instants they are measured from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayWindow {
    now: DateTime<Utc>,
    anchor: DateTime<Utc>,
    days: BTreeSet<DayOffset>,
}

impl DayWindow {
    /// Window covering offsets `[0, days)`
    pub fn trailing(now: DateTime<Utc>, days: u32) -> Result<Self, RollupError> {
        if days == 0 {
            return Err(RollupError::InvalidWindow(
                "window must cover at least one day".to_string(),
            ));
        }
        Self::for_days(now, (0..days).map(DayOffset))
    }

    /// Window covering exactly the given offsets
    pub fn for_days(
        now: DateTime<Utc>,
        days: impl IntoIterator<Item = DayOffset>,
    ) -> Result<Self, RollupError> {
        let days: BTreeSet<DayOffset> = days.into_iter().collect();
        let oldest = match days.last() {
            Some(oldest) => *oldest,
            None => return Err(RollupError::InvalidWindow("no days requested".to_string())),
        };
        if oldest.0 >= MAX_WINDOW_DAYS {
            return Err(RollupError::InvalidWindow(format!(
                "day {} is beyond the {} day limit",
                oldest, MAX_WINDOW_DAYS
            )));
        }

        let anchor = end_of_day(now)?;
        if anchor
            .checked_sub_signed(Duration::days(i64::from(oldest.0) + 1))
            .is_none()
        {
            return Err(RollupError::InvalidWindow(format!(
                "day {} starts before the earliest representable date",
                oldest
            )));
        }

        Ok(Self { now, anchor, days })
    }

    /// Instant the window was built at
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Exclusive end of day 0
    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    pub fn days(&self) -> &BTreeSet<DayOffset> {
        &self.days
    }

    pub fn contains(&self, day: DayOffset) -> bool {
        self.days.contains(&day)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn day_start(&self, day: DayOffset) -> DateTime<Utc> {
        self.anchor - Duration::days(i64::from(day.0) + 1)
    }

    pub fn day_end(&self, day: DayOffset) -> DateTime<Utc> {
        self.anchor - Duration::days(i64::from(day.0))
    }

    /// Every offset between the oldest and the newest requested day, inclusive.
    ///
    /// Sources answer over this contiguous span; days outside [`Self::days`] are
    /// dropped by the coordinator.
    pub fn span_days(&self) -> impl Iterator<Item = DayOffset> {
        let newest = self.days.first().map(|d| d.0).unwrap_or(0);
        let oldest = self.days.last().map(|d| d.0).unwrap_or(0);
        (newest..=oldest).map(DayOffset)
    }

    /// Start and end instants of the contiguous span
    pub fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let newest = self.days.first().copied().unwrap_or(DayOffset(0));
        let oldest = self.days.last().copied().unwrap_or(DayOffset(0));
        (self.day_start(oldest), self.day_end(newest))
    }

    /// Day offset an instant falls into, if it lies before the anchor
    pub fn offset_of(&self, instant: DateTime<Utc>) -> Option<DayOffset> {
        if instant >= self.anchor {
            return None;
        }
        let elapsed_ms = (self.anchor - instant).num_milliseconds();
        let day_ms = Duration::days(1).num_milliseconds();
        let offset = (elapsed_ms - 1) / day_ms;
        u32::try_from(offset).ok().map(DayOffset)
    }
}

/// Midnight following the calendar day of `now`
fn end_of_day(now: DateTime<Utc>) -> Result<DateTime<Utc>, RollupError> {
    now.date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| {
            RollupError::InvalidWindow(format!("unable to compute end of day for {}", now))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_anchor_is_end_of_current_day() {
        let window = DayWindow::trailing(noon(), 5).unwrap();
        assert_eq!(
            window.anchor(),
            Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap()
        );
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn test_day_boundaries() {
        let window = DayWindow::trailing(noon(), 3).unwrap();
        assert_eq!(
            window.day_start(DayOffset(0)),
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window.day_end(DayOffset(2)),
            Utc.with_ymd_and_hms(2024, 1, 14, 0, 0, 0).unwrap()
        );
        let (start, end) = window.span();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 13, 0, 0, 0).unwrap());
        assert_eq!(end, window.anchor());
    }

    #[test]
    fn test_offset_of() {
        let window = DayWindow::trailing(noon(), 3).unwrap();
        let today_morning = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let yesterday_late = Utc.with_ymd_and_hms(2024, 1, 14, 23, 59, 59).unwrap();

        assert_eq!(window.offset_of(today_morning), Some(DayOffset(0)));
        assert_eq!(window.offset_of(yesterday_late), Some(DayOffset(1)));
        assert_eq!(window.offset_of(window.anchor()), None);
    }

    #[test]
    fn test_sparse_window_span() {
        let window = DayWindow::for_days(noon(), [DayOffset(4), DayOffset(2)]).unwrap();
        let span: Vec<u32> = window.span_days().map(|d| d.0).collect();
        assert_eq!(span, vec![2, 3, 4]);
        assert!(!window.contains(DayOffset(3)));
    }

    #[test]
    fn test_oversized_window_rejected() {
        assert!(DayWindow::trailing(noon(), MAX_WINDOW_DAYS).is_ok());
        assert!(matches!(
            DayWindow::trailing(noon(), MAX_WINDOW_DAYS + 1),
            Err(RollupError::InvalidWindow(_))
        ));
        assert!(matches!(
            DayWindow::for_days(noon(), [DayOffset(u32::MAX)]),
            Err(RollupError::InvalidWindow(_))
        ));
        assert!(DayWindow::for_days(noon(), [DayOffset(400_000_000)]).is_err());
    }

    #[test]
    fn test_empty_window_rejected() {
        assert!(DayWindow::trailing(noon(), 0).is_err());
        assert!(DayWindow::for_days(noon(), Vec::new()).is_err());
    }
}
