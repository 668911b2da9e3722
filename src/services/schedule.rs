use chrono::{DateTime, Duration, Utc};

use crate::types::models::Period;

/// Periods anchored at `start`, `start + cadence`, ... up to and including `end`.
pub fn schedule(start: DateTime<Utc>, end: DateTime<Utc>, cadence_days: u32) -> Vec<Period> {
    let cadence = Duration::days(cadence_days.max(1) as i64);
    let mut periods = Vec::new();
    let mut anchor = start;
    let mut index = 0;
    while anchor <= end {
        periods.push(Period {
            index,
            start: anchor,
            end: anchor + cadence,
        });
        anchor += cadence;
        index += 1;
    }
    periods
}

/// Lookback window that ends at the period anchor.
pub fn lookback(period: &Period, hours: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    (period.start - Duration::hours(hours as i64), period.start)
}
