//! Refresh timing policy: failure backoff and renewal window

pub const HOUR: i64 = 3600;
pub const DAY: i64 = 24 * HOUR;

/// Refresh proactively once expiry is this close.
pub const RENEWAL_WINDOW: i64 = 10 * DAY;

/// Accepted range for a remote-reported `expires_in`.
pub const MIN_LIFETIME: i64 = DAY;
pub const MAX_LIFETIME: i64 = 120 * DAY;

/// Minimum wait after the last attempt, given consecutive failures.
///
/// 0 failures → 0, then 1h, 3h, 12h, and 24h from the fourth failure on.
pub fn backoff_secs(fail_count: u32) -> i64 {
    match fail_count {
        0 => 0,
        1 => HOUR,
        2 => 3 * HOUR,
        3 => 12 * HOUR,
        _ => DAY,
    }
}

/// Seconds left before another attempt is allowed, or 0 if not backed off.
pub fn backoff_remaining(fail_count: u32, last_attempt: Option<i64>, now: i64) -> i64 {
    if fail_count == 0 {
        return 0;
    }
    match last_attempt {
        Some(last) => (backoff_secs(fail_count) - (now - last)).max(0),
        None => 0,
    }
}

/// Whether a token with this expiry should be renewed now.
pub fn is_due(expires_at: i64, now: i64) -> bool {
    expires_at <= 0 || now >= expires_at - RENEWAL_WINDOW
}

/// Validate a remote lifetime in seconds.
pub fn valid_lifetime(expires_in: i64) -> bool {
    (MIN_LIFETIME..=MAX_LIFETIME).contains(&expires_in)
}
