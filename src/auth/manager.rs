//! Token refresh decision and execution
//!
//! [`TokenManager::refresh_if_needed`] is the single entry point for both the
//! daily scheduler and reactive recovery from auth errors. Every call runs
//! under one async mutex, so at most one refresh request is ever in flight and
//! the backoff/due gates always see the result of the previous attempt.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use super::backoff::{backoff_remaining, is_due, valid_lifetime, MAX_LIFETIME, MIN_LIFETIME};
use super::tokens::{truncate_message, StateStore, TokenState, MAX_ERROR_LEN};
use super::GraphConfig;
use crate::api::client::{Transport, TransportError};
use crate::api::json_i64;
use crate::clock::{format_timestamp, Clock};

/// Result of one [`TokenManager::refresh_if_needed`] call.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// No request was made: no token, backed off, or not yet due.
    Skipped,
    /// A new token was stored.
    Refreshed,
    /// A request was made and failed; `fail_count` was incremented.
    Failed(RefreshError),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed)
    }
}

/// Why a refresh request failed.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("HTTP {status}: {snippet}")]
    HttpStatus { status: u16, snippet: String },
    #[error("response body is not a JSON object")]
    MalformedResponse,
    #[error("API error: {0}")]
    RemoteApi(String),
    #[error("response missing access_token")]
    MissingAccessToken,
}

/// Token granted by a successful refresh call.
#[derive(Debug)]
struct Grant {
    access_token: String,
    expires_in: Option<i64>,
}

/// Owns the refresh lifecycle of the single managed token.
pub struct TokenManager {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    graph: GraphConfig,
    lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn Transport>,
        graph: GraphConfig,
    ) -> Self {
        Self {
            store,
            clock,
            transport,
            graph,
            lock: Mutex::new(()),
        }
    }

    pub fn graph(&self) -> &GraphConfig {
        &self.graph
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Current stored state. Waits for any in-flight refresh.
    pub async fn state(&self) -> Result<TokenState> {
        let _guard = self.lock.lock().await;
        self.store.load()
    }

    /// Current token, empty when unset. Waits for any in-flight refresh.
    pub async fn token(&self) -> Result<String> {
        Ok(self.state().await?.token)
    }

    /// Operator update of the token value (see [`TokenState::set_token`]).
    pub async fn set_token(&self, value: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let changed = self.store.set_token(value, self.clock.now())?;
        if changed {
            tracing::info!("Token updated by operator; lifecycle metadata reset");
        }
        Ok(changed)
    }

    /// Persist a message to `last_error` without touching `fail_count`.
    pub async fn record_error(&self, message: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.store.load()?;
        state.record_error(message);
        self.store.save(&state)
    }

    /// Refresh the token if it is due, or unconditionally with `force`.
    ///
    /// Backoff after failures applies even when forced. `Err` is returned only
    /// when the state store cannot be read or written.
    pub async fn refresh_if_needed(&self, force: bool) -> Result<RefreshOutcome> {
        let _guard = self.lock.lock().await;

        let mut state = self.store.load()?;
        if !state.has_token() {
            tracing::debug!("No token configured, skipping refresh");
            return Ok(RefreshOutcome::Skipped);
        }

        let now = self.clock.now();
        let wait = backoff_remaining(state.fail_count, state.last_attempt, now);
        if wait > 0 {
            tracing::info!(
                "Refresh backed off after {} failure(s), {}s remaining",
                state.fail_count,
                wait
            );
            return Ok(RefreshOutcome::Skipped);
        }

        if !force && !is_due(state.expires_at, now) {
            tracing::debug!(
                "Token not due for refresh (expires {})",
                format_timestamp(state.expires_at)
            );
            return Ok(RefreshOutcome::Skipped);
        }

        // Counted before the request so a crash mid-call still backs off.
        state.last_attempt = Some(now);
        self.store.save(&state)?;

        tracing::info!(
            "Refreshing Instagram token (forced: {}, previous failures: {})",
            force,
            state.fail_count
        );
        let result = self.request_refresh(&state.token).await;

        let now = self.clock.now();
        match result {
            Ok(grant) => {
                state.token = grant.access_token;
                state.last_update = Some(now);
                state.fail_count = 0;
                match grant.expires_in {
                    Some(secs) if valid_lifetime(secs) => {
                        state.expires_at = now + secs;
                        state.last_error = None;
                        tracing::info!(
                            "Token refreshed, expires {}",
                            format_timestamp(state.expires_at)
                        );
                    }
                    other => {
                        let message = match other {
                            Some(secs) => format!(
                                "Token refreshed but expires_in {} is outside {}..={} seconds; expiry unknown",
                                secs, MIN_LIFETIME, MAX_LIFETIME
                            ),
                            None => {
                                "Token refreshed but response had no usable expires_in; expiry unknown"
                                    .to_string()
                            }
                        };
                        tracing::warn!("{}", message);
                        state.expires_at = 0;
                        state.record_error(&message);
                    }
                }
                self.store.save(&state)?;
                Ok(RefreshOutcome::Refreshed)
            }
            Err(err) => {
                tracing::warn!("Token refresh failed: {}", err);
                state.record_failure(&format!("Token refresh failed: {}", err));
                self.store.save(&state)?;
                Ok(RefreshOutcome::Failed(err))
            }
        }
    }

    async fn request_refresh(&self, token: &str) -> Result<Grant, RefreshError> {
        let url = self.graph.refresh_url(token);
        tracing::debug!("GET {}", url.path());

        let resp = self.transport.get(url.as_str()).await?;
        if !resp.is_success() {
            return Err(RefreshError::HttpStatus {
                status: resp.status,
                snippet: truncate_message(&resp.body, MAX_ERROR_LEN),
            });
        }

        let data = match resp.json() {
            Some(Value::Object(map)) => map,
            _ => return Err(RefreshError::MalformedResponse),
        };

        match data.get("access_token").and_then(Value::as_str) {
            Some(access_token) if !access_token.is_empty() => Ok(Grant {
                access_token: access_token.to_string(),
                expires_in: data.get("expires_in").and_then(json_i64),
            }),
            _ => match data.get("error").and_then(describe_api_error) {
                Some(message) => Err(RefreshError::RemoteApi(message)),
                None => Err(RefreshError::MissingAccessToken),
            },
        }
    }
}

/// Join the `message`, `type` and `code` of a Graph API error object.
pub(crate) fn describe_api_error(error: &Value) -> Option<String> {
    let error = error.as_object()?;
    let mut parts = Vec::new();
    if let Some(message) = error.get("message").and_then(Value::as_str) {
        parts.push(message.to_string());
    }
    if let Some(kind) = error.get("type").and_then(Value::as_str) {
        parts.push(kind.to_string());
    }
    if let Some(code) = error.get("code").and_then(json_i64) {
        parts.push(code.to_string());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}
