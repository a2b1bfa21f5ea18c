//! Injected time source.
//!
//! Day boundaries are always UTC midnight expressed as unix seconds.

use chrono::{DateTime, TimeZone, Utc};

pub const SECONDS_PER_DAY: i64 = 86_400;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// UTC midnight of the current day, unix seconds.
    fn start_of_today(&self) -> i64 {
        day_start(self.now().timestamp())
    }

    /// UTC midnight `days` days before today.
    fn days_ago_start(&self, days: i64) -> i64 {
        self.start_of_today() - days * SECONDS_PER_DAY
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant. Used by tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at(timestamp: i64) -> Self {
        Self(Utc.timestamp_opt(timestamp, 0).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Align a unix timestamp (seconds) down to UTC midnight.
pub fn day_start(timestamp: i64) -> i64 {
    timestamp.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
}

/// `YYYY-MM-DD` for a unix timestamp in seconds.
pub fn format_day(timestamp: i64) -> String {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_start_aligns_to_midnight() {
        // 2024-03-10T15:30:00Z
        assert_eq!(day_start(1_710_084_600), 1_710_028_800);
        assert_eq!(day_start(1_710_028_800), 1_710_028_800);
    }

    #[test]
    fn test_fixed_clock_day_helpers() {
        let clock = FixedClock::at(1_710_084_600);
        assert_eq!(clock.start_of_today(), 1_710_028_800);
        assert_eq!(clock.days_ago_start(1), 1_710_028_800 - SECONDS_PER_DAY);
    }

    #[test]
    fn test_format_day() {
        assert_eq!(format_day(1_710_028_800), "2024-03-10");
    }
}
