//! Token state and storage

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Upper bound on any message persisted to `last_error`.
pub const MAX_ERROR_LEN: usize = 300;

/// Persisted lifecycle state for the single managed token.
///
/// Timestamps are unix seconds. `expires_at == 0` means the expiry is unknown,
/// which always counts as due for renewal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    #[serde(default)]
    pub token: String,
    pub last_update: Option<i64>,
    #[serde(default)]
    pub expires_at: i64,
    pub last_attempt: Option<i64>,
    #[serde(default)]
    pub fail_count: u32,
    pub last_error: Option<String>,
}

impl TokenState {
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Apply an operator-supplied token value.
    ///
    /// The value is trimmed. An empty value clears everything; a changed
    /// value resets all metadata and stamps `last_update`. Returns false when
    /// the value matches the stored token and nothing changed.
    pub fn set_token(&mut self, value: &str, now: i64) -> bool {
        let value = value.trim();
        if value.is_empty() {
            let changed = *self != Self::default();
            *self = Self::default();
            return changed;
        }
        if value == self.token {
            return false;
        }
        *self = Self {
            token: value.to_string(),
            last_update: Some(now),
            ..Self::default()
        };
        true
    }

    /// Record a failed attempt: bump the counter and keep the reason.
    pub fn record_failure(&mut self, message: &str) {
        self.fail_count = self.fail_count.saturating_add(1);
        self.record_error(message);
    }

    pub fn record_error(&mut self, message: &str) {
        self.last_error = Some(truncate_message(message, MAX_ERROR_LEN));
    }
}

/// Truncate to at most `max` characters, ending in `...` when shortened.
pub fn truncate_message(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Durable storage for [`TokenState`].
///
/// Implementations only load and save whole snapshots; serialising
/// read-modify-write cycles is the caller's job (see `TokenManager`).
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<TokenState>;
    fn save(&self, state: &TokenState) -> Result<()>;

    /// Operator entry point: apply [`TokenState::set_token`] and persist.
    fn set_token(&self, value: &str, now: i64) -> Result<bool> {
        let mut state = self.load()?;
        let changed = state.set_token(value, now);
        if changed {
            self.save(&state)?;
        }
        Ok(changed)
    }
}
