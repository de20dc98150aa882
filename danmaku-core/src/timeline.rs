//! Time helpers shared by the layouts
//!
//! All timestamps are milliseconds. Scroll positions are measured from a
//! [`TimeOrigin`], which by default is the start of the current local day.

use chrono::{Local, TimeZone};

/// Instant at which the scroll sweep offset is zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TimeOrigin {
    /// Midnight of the current local day, re-evaluated on every use
    #[default]
    StartOfLocalDay,
    /// A fixed timestamp in milliseconds
    Fixed(i64),
}

impl TimeOrigin {
    /// Resolves the origin to a timestamp in milliseconds
    pub fn resolve(&self) -> i64 {
        match self {
            TimeOrigin::StartOfLocalDay => start_of_local_day_ms(Local::now().timestamp_millis()),
            TimeOrigin::Fixed(ms) => *ms,
        }
    }
}

/// Returns the timestamp of local midnight for the day containing `timestamp_ms`
pub fn start_of_local_day_ms(timestamp_ms: i64) -> i64 {
    let Some(instant) = Local.timestamp_millis_opt(timestamp_ms).earliest() else {
        return timestamp_ms;
    };
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.timestamp_millis())
        .unwrap_or(timestamp_ms)
}

/// Horizontal sweep distance covered between `origin_ms` and `time_ms`
pub fn sweep_offset(time_ms: i64, origin_ms: i64, speed: f64) -> f64 {
    (time_ms - origin_ms).abs() as f64 / 1000.0 * speed
}

/// Binary-search position that keeps `items` sorted by the key returned from `time_of`.
///
/// Equal timestamps are inserted after the existing ones so earlier submissions paint first.
pub fn insertion_index<T>(items: &[T], time: i64, time_of: impl Fn(&T) -> i64) -> usize {
    items.partition_point(|item| time_of(item) <= time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_offset_is_symmetric_around_origin() {
        assert_eq!(sweep_offset(2_000, 0, 100.0), 200.0);
        assert_eq!(sweep_offset(0, 2_000, 100.0), 200.0);
        assert_eq!(sweep_offset(1_500, 1_000, 40.0), 20.0);
    }

    #[test]
    fn test_fixed_origin_resolves_to_itself() {
        assert_eq!(TimeOrigin::Fixed(42).resolve(), 42);
    }

    #[test]
    fn test_start_of_day_is_not_after_timestamp() {
        let now = Local::now().timestamp_millis();
        let midnight = start_of_local_day_ms(now);
        assert!(midnight <= now);
        assert!(now - midnight < 25 * 60 * 60 * 1000);
    }

    #[test]
    fn test_insertion_index_keeps_order() {
        let times = [10, 20, 20, 30];
        assert_eq!(insertion_index(&times, 5, |t| *t), 0);
        assert_eq!(insertion_index(&times, 20, |t| *t), 3);
        assert_eq!(insertion_index(&times, 99, |t| *t), 4);
    }
}
