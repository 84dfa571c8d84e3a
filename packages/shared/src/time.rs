//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, FixedOffset, Local, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock at the given Unix timestamp (milliseconds)
    ///
    /// Out-of-range values fall back to the Unix epoch.
    pub fn from_millis(fixed_time_millis: i64) -> Self {
        Self {
            fixed_time: DateTime::from_timestamp_millis(fixed_time_millis).unwrap_or_default(),
        }
    }

    /// Create a new fixed clock at the given instant
    pub fn new(fixed_time: DateTime<Utc>) -> Self {
        Self { fixed_time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.fixed_time
    }
}

/// Format an instant as `HH:MM` in the given offset
pub fn format_clock_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%H:%M").to_string()
}

/// Offset of the machine's local timezone right now
pub fn local_offset() -> FixedOffset {
    *Local::now().offset()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_increasing_timestamps() {
        // テスト項目: SystemClock が呼び出すたびに増加するタイムスタンプを返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let t1 = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let t2 = clock.now();

        // then (期待する結果):
        assert!(t2 >= t1);
    }

    #[test]
    fn test_fixed_clock_returns_fixed_timestamp() {
        // テスト項目: FixedClock が固定されたタイムスタンプを返す
        // given (前提条件):
        let clock = FixedClock::from_millis(1672498800000);

        // when (操作):
        let t1 = clock.now();
        let t2 = clock.now();

        // then (期待する結果):
        assert_eq!(t1.timestamp_millis(), 1672498800000);
        assert_eq!(t1, t2);
    }

    #[test]
    fn test_format_clock_time_applies_offset() {
        // テスト項目: 指定したオフセットで時刻がフォーマットされる
        // given (前提条件):
        // 2022-12-31T15:00:00Z
        let at = FixedClock::from_millis(1672498800000).now();
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();

        // when (操作):
        let result = format_clock_time(at, jst);

        // then (期待する結果):
        assert_eq!(result, "00:00");
    }

    #[test]
    fn test_format_clock_time_utc() {
        // テスト項目: UTC オフセットではそのままの時刻になる
        // given (前提条件):
        let at = FixedClock::from_millis(1672498800000).now();
        let utc = FixedOffset::east_opt(0).unwrap();

        // when (操作):
        let result = format_clock_time(at, utc);

        // then (期待する結果):
        assert_eq!(result, "15:00");
    }
}
