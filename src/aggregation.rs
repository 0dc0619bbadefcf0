use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{WindowSummary, ZoneKey, ZoneTimeRecord, ZoneTimes};
use crate::store::ActivityRepository;

/// Window lengths offered on the dashboard
pub const DEFAULT_ALLOWED_WINDOWS: [u32; 4] = [7, 30, 90, 365];

/// Window used when the requested length is not offered
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Longest window a configuration may offer
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// A `[end - days, end]` date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryWindow {
    pub days: u32,
    pub end: DateTime<Utc>,
}

impl SummaryWindow {
    /// Window of `days` ending now
    pub fn last_days(days: u32) -> Self {
        Self::ending_at(days, Utc::now())
    }

    pub fn ending_at(days: u32, end: DateTime<Utc>) -> Self {
        Self { days, end }
    }

    /// Resolve a requested length against the allowed set, falling back to
    /// `default_days` when it is not offered
    pub fn normalized(requested: Option<u32>, allowed: &[u32], default_days: u32) -> u32 {
        match requested {
            Some(days) if allowed.contains(&days) => days,
            Some(days) => {
                tracing::debug!(
                    requested = days,
                    fallback = default_days,
                    "Requested window not offered, using default"
                );
                default_days
            }
            None => default_days,
        }
    }

    /// `end - days`, clamped to the earliest representable instant
    pub fn start(&self) -> DateTime<Utc> {
        self.end
            .checked_sub_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Inclusive on both ends
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant <= self.end
    }
}

/// Folds per-activity zone records into window totals
pub struct AggregationEngine;

impl AggregationEngine {
    /// Element-wise sum of zone seconds.
    ///
    /// `total` is recomputed as the sum of the zone buckets so partial
    /// historical records cannot skew it. Order of records is irrelevant.
    pub fn sum_times<'a, I>(records: I) -> (ZoneTimes, usize)
    where
        I: IntoIterator<Item = &'a ZoneTimeRecord>,
    {
        let mut totals = ZoneTimes::default();
        let mut count = 0;

        for record in records {
            for key in ZoneKey::ALL {
                totals.add(key, record.times.get(key));
            }
            count += 1;
        }

        (totals, count)
    }

    /// Build the summary for a window from already-selected records
    pub fn summarize<'a, I>(records: I, window: &SummaryWindow) -> WindowSummary
    where
        I: IntoIterator<Item = &'a ZoneTimeRecord>,
    {
        let (times, activity_count) = Self::sum_times(records);

        WindowSummary {
            days: window.days,
            start: window.start(),
            end: window.end,
            activity_count,
            percentages: times.percentages(),
            times,
        }
    }

    /// Select a user's records for the window from the repository and fold them
    pub fn window_summary<R>(repo: &R, user_id: &str, window: &SummaryWindow) -> Result<WindowSummary>
    where
        R: ActivityRepository + ?Sized,
    {
        let records = repo.zone_records_in_window(user_id, window.start(), window.end)?;
        let summary = Self::summarize(&records, window);

        tracing::info!(
            user_id,
            days = window.days,
            activities = summary.activity_count,
            total_seconds = summary.times.total,
            "Computed window summary"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ZoneBand, ZoneBands};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn record(zone1: u64, zone2: u64) -> ZoneTimeRecord {
        let bands = ZoneBands::from_array([
            ZoneBand::new(100, 120),
            ZoneBand::new(120, 140),
            ZoneBand::new(140, 160),
            ZoneBand::new(160, 180),
            ZoneBand::new(180, 200),
        ]);
        let mut times = ZoneTimes::default();
        times.add(ZoneKey::Zone1, zone1);
        times.add(ZoneKey::Zone2, zone2);
        ZoneTimeRecord::from_times(times, bands)
    }

    fn window() -> SummaryWindow {
        SummaryWindow::ending_at(30, Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_two_activity_summary() {
        let records = vec![record(600, 300), record(0, 900)];
        let summary = AggregationEngine::summarize(&records, &window());

        assert_eq!(summary.times.zone1, 600);
        assert_eq!(summary.times.zone2, 1200);
        assert_eq!(summary.times.total, 1800);
        assert_eq!(summary.activity_count, 2);
        assert_eq!(summary.percentages[&ZoneKey::Zone2], dec!(66.7));
        assert_eq!(summary.percentages[&ZoneKey::Zone1], dec!(33.3));
        assert_eq!(summary.days, 30);
    }

    #[test]
    fn test_empty_input_yields_zero_summary() {
        let records: Vec<ZoneTimeRecord> = Vec::new();
        let summary = AggregationEngine::summarize(&records, &window());

        assert_eq!(summary.times, ZoneTimes::default());
        assert_eq!(summary.activity_count, 0);
        assert!(summary.percentages.is_empty());
    }

    #[test]
    fn test_partial_records_are_zero_filled() {
        let partial: ZoneTimeRecord =
            serde_json::from_str(r#"{"times": {"zone3": 90, "unknown": 40}}"#).unwrap();
        let records = vec![partial, record(10, 0)];
        let summary = AggregationEngine::summarize(&records, &window());

        assert_eq!(summary.times.zone3, 90);
        assert_eq!(summary.times.zone1, 10);
        assert_eq!(summary.times.total, 100);
    }

    #[test]
    fn test_total_is_sum_of_zones() {
        // Stored total disagrees with its buckets
        let skewed: ZoneTimeRecord =
            serde_json::from_str(r#"{"times": {"zone1": 50, "total": 500}}"#).unwrap();
        let summary = AggregationEngine::summarize(std::iter::once(&skewed), &window());
        assert_eq!(summary.times.total, 50);
    }

    #[test]
    fn test_window_bounds() {
        let window = window();
        assert_eq!(window.start(), Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap());
        assert!(window.contains(window.start()));
        assert!(window.contains(window.end));
        assert!(!window.contains(window.start() - Duration::seconds(1)));
        assert!(!window.contains(window.end + Duration::seconds(1)));
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let window = SummaryWindow::last_days(200_000_000);
        assert_eq!(window.start(), DateTime::<Utc>::MIN_UTC);
        assert!(window.contains(Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap()));

        let summary = AggregationEngine::summarize(&[record(60, 0)], &window);
        assert_eq!(summary.times.total, 60);
    }

    #[test]
    fn test_overflowing_records_saturate() {
        let huge: ZoneTimeRecord =
            serde_json::from_str(r#"{"times": {"zone1": 18446744073709551615}}"#).unwrap();
        let small: ZoneTimeRecord = serde_json::from_str(r#"{"times": {"zone2": 5}}"#).unwrap();
        let summary = AggregationEngine::summarize([&huge, &small], &window());

        assert_eq!(summary.activity_count, 2);
        assert_eq!(summary.times.zone1, u64::MAX);
        assert_eq!(summary.times.zone2, 5);
        assert_eq!(summary.times.total, u64::MAX);
        assert_eq!(summary.percentages[&ZoneKey::Zone1], dec!(100.0));
    }

    #[test]
    fn test_window_normalization() {
        let allowed = DEFAULT_ALLOWED_WINDOWS;
        assert_eq!(SummaryWindow::normalized(Some(7), &allowed, 30), 7);
        assert_eq!(SummaryWindow::normalized(Some(365), &allowed, 30), 365);
        assert_eq!(SummaryWindow::normalized(Some(14), &allowed, 30), 30);
        assert_eq!(SummaryWindow::normalized(None, &allowed, 90), 90);
    }

    proptest! {
        #[test]
        fn test_aggregation_is_order_independent(
            raw in prop::collection::vec((0u64..10_000, 0u64..10_000), 0..20)
        ) {
            let records: Vec<ZoneTimeRecord> = raw.iter().map(|&(a, b)| record(a, b)).collect();
            let mut reversed = records.clone();
            reversed.reverse();
            let mut rotated = records.clone();
            if !rotated.is_empty() {
                rotated.rotate_left(1);
            }

            let expected = AggregationEngine::summarize(&records, &window());
            prop_assert_eq!(&AggregationEngine::summarize(&reversed, &window()), &expected);
            prop_assert_eq!(&AggregationEngine::summarize(&rotated, &window()), &expected);
            prop_assert_eq!(expected.times.zone_sum(), expected.times.total);
        }

        #[test]
        fn test_aggregation_is_associative(
            a in (0u64..5_000, 0u64..5_000),
            b in (0u64..5_000, 0u64..5_000),
            c in (0u64..5_000, 0u64..5_000),
        ) {
            let (ra, rb, rc) = (record(a.0, a.1), record(b.0, b.1), record(c.0, c.1));

            let (ab, _) = AggregationEngine::sum_times([&ra, &rb]);
            let left = ZoneTimeRecord { times: ab, percentages: Default::default(), zone_ranges: None };
            let (grouped_left, _) = AggregationEngine::sum_times([&left, &rc]);

            let (bc, _) = AggregationEngine::sum_times([&rb, &rc]);
            let right = ZoneTimeRecord { times: bc, percentages: Default::default(), zone_ranges: None };
            let (grouped_right, _) = AggregationEngine::sum_times([&ra, &right]);

            prop_assert_eq!(grouped_left, grouped_right);
        }
    }
}
