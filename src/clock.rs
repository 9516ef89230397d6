//! Time source used by the token lifecycle
//!
//! All lifecycle timestamps are unix seconds. Production code uses
//! [`SystemClock`]; tests drive time explicitly with `FixedClock`.

/// Supplies the current time in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Render a unix timestamp for operator-facing output.
pub fn format_timestamp(ts: i64) -> String {
    match chrono::DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.to_rfc3339(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
pub use fixed::FixedClock;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::new(1_700_000_000);
        clock.advance(60);
        assert_eq!(clock.now(), 1_700_000_060);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn test_format_timestamp_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2023-11-14, well before any machine running this test
        assert!(SystemClock.now() > 1_700_000_000);
    }
}
