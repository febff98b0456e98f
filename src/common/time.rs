//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get the current Unix timestamp in whole seconds
    fn now_unix(&self) -> i64;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: i64,
}

impl FixedClock {
    /// Create a new fixed clock with the given Unix timestamp in seconds
    pub fn new(fixed_time_secs: i64) -> Self {
        Self {
            fixed_time: fixed_time_secs,
        }
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.fixed_time
    }
}

/// Convert a Unix timestamp (seconds) to JST RFC 3339 format.
///
/// The comment service reports every timestamp in JST, so display follows it.
pub fn unix_to_jst_rfc3339(timestamp_secs: i64) -> String {
    let jst_offset = FixedOffset::east_opt(9 * 3600).unwrap(); // JST is UTC+9
    match jst_offset.timestamp_opt(timestamp_secs, 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => format!("(invalid time: {})", timestamp_secs),
    }
}

/// Convert a Unix timestamp (seconds) to a short JST clock time (HH:MM:SS)
pub fn unix_to_jst_clock(timestamp_secs: i64) -> String {
    let jst_offset = FixedOffset::east_opt(9 * 3600).unwrap(); // JST is UTC+9
    match jst_offset.timestamp_opt(timestamp_secs, 0).single() {
        Some(dt) => {
            let dt: DateTime<FixedOffset> = dt;
            dt.format("%H:%M:%S").to_string()
        }
        None => format!("(invalid time: {})", timestamp_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_returns_non_zero_timestamp() {
        // テスト項目: SystemClock が 0 以外のタイムスタンプを返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let timestamp = clock.now_unix();

        // then (期待する結果):
        assert!(timestamp > 0);
    }

    #[test]
    fn test_fixed_clock_returns_fixed_timestamp() {
        // テスト項目: FixedClock が固定されたタイムスタンプを返す
        // given (前提条件):
        let fixed_time = 1_416_800_000;
        let clock = FixedClock::new(fixed_time);

        // when (操作):
        let timestamp = clock.now_unix();

        // then (期待する結果):
        assert_eq!(timestamp, fixed_time);
    }

    #[test]
    fn test_fixed_clock_returns_consistent_timestamp() {
        // テスト項目: FixedClock が複数回呼び出しても同じタイムスタンプを返す
        // given (前提条件):
        let fixed_time = 1_416_800_123;
        let clock = FixedClock::new(fixed_time);

        // when (操作):
        let timestamp1 = clock.now_unix();
        let timestamp2 = clock.now_unix();

        // then (期待する結果):
        assert_eq!(timestamp1, fixed_time);
        assert_eq!(timestamp2, fixed_time);
    }

    #[test]
    fn test_unix_to_jst_rfc3339_format() {
        // テスト項目: タイムスタンプが正しく JST の RFC 3339 形式に変換される
        // given (前提条件):
        // 2023-01-01 00:00:00 JST
        let timestamp = 1_672_498_800;

        // when (操作):
        let result = unix_to_jst_rfc3339(timestamp);

        // then (期待する結果):
        assert!(result.starts_with("2023-01-01T00:00:00"));
        assert!(result.contains("+09:00"));
    }

    #[test]
    fn test_unix_to_jst_clock_format() {
        // テスト項目: タイムスタンプが JST の時刻 (HH:MM:SS) に変換される
        // given (前提条件):
        // 2023-01-01 01:02:03 JST
        let timestamp = 1_672_502_523;

        // when (操作):
        let result = unix_to_jst_clock(timestamp);

        // then (期待する結果):
        assert_eq!(result, "01:02:03");
    }
}
