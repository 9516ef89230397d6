//! Instagram Graph API access: transport, media fetch and read cache

pub mod cache;
pub mod client;
pub mod media;

pub use cache::MediaCache;
pub use media::MediaFetcher;

use serde_json::Value;

/// Default number of items for a media read.
pub const DEFAULT_LIMIT: u32 = 12;
/// Largest media page the read surface will request.
pub const MAX_LIMIT: u32 = 50;

/// Clamp a caller-supplied limit to `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: i64) -> u32 {
    limit.clamp(1, MAX_LIMIT as i64) as u32
}

/// Integer from a JSON number or numeric string.
///
/// Graph API error codes and lifetimes show up in both forms.
pub(crate) fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
