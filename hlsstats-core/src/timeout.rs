//! Staleness timeout derived from the configured segment duration.
//!
//! A client re-fetches at least one segment per segment duration, so a
//! session is declared gone after roughly ten segment durations of silence.

/// Default sweep period and timeout fallback.
pub const DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS: u64 = 10_000;

/// Milliseconds of tolerated silence per second of segment duration.
pub const TIMEOUT_MULTIPLIER_MS: u64 = 10_000;

/// Compute the staleness timeout from the raw segment-duration setting (seconds).
///
/// Returns `fallback_ms` unchanged when the setting is empty or not a
/// non-negative integer. Never panics.
#[must_use]
pub fn compute_timeout_ms(raw_segment_duration: &str, fallback_ms: u64) -> u64 {
    match raw_segment_duration.trim().parse::<u64>() {
        Ok(seconds) => seconds.saturating_mul(TIMEOUT_MULTIPLIER_MS),
        Err(_) => {
            tracing::debug!(
                raw = %raw_segment_duration,
                fallback_ms,
                "Segment duration not set or not numeric, using fallback timeout"
            );
            fallback_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_setting_uses_fallback() {
        assert_eq!(
            compute_timeout_ms("", DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS),
            DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS
        );
    }

    #[test]
    fn test_numeric_setting() {
        assert_eq!(compute_timeout_ms("2", 1), 20_000);
        assert_eq!(compute_timeout_ms("1", 99), 10_000);
        assert_eq!(compute_timeout_ms(" 6 ", 99), 60_000);
    }

    #[test]
    fn test_malformed_setting_uses_fallback() {
        assert_eq!(compute_timeout_ms("abc", 1234), 1234);
        assert_eq!(compute_timeout_ms("-2", 1234), 1234);
        assert_eq!(compute_timeout_ms("2.5", 1234), 1234);
    }

    #[test]
    fn test_zero_and_huge_values() {
        assert_eq!(compute_timeout_ms("0", 1234), 0);
        assert_eq!(compute_timeout_ms(&u64::MAX.to_string(), 1), u64::MAX);
    }
}
