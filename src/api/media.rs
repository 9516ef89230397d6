//! Media endpoint (`/me/media`) with reactive token recovery
//!
//! A failed fetch whose response says the token itself is bad triggers one
//! forced refresh through the [`TokenManager`] and, if that refresh stores a
//! new token, exactly one retry. Every other failure is recorded to
//! `last_error` and yields an empty list.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use super::client::TransportError;
use super::{clamp_limit, json_i64};
use crate::auth::tokens::{truncate_message, MAX_ERROR_LEN};
use crate::auth::{RefreshOutcome, TokenManager};

/// One media entry as exposed to readers. Never carries the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub media_url: String,
    pub permalink: String,
    pub caption: String,
    pub timestamp: String,
}

/// Result of a single request to the media endpoint.
enum Attempt {
    Items(Vec<MediaItem>),
    Unreadable,
    Rejected {
        status: u16,
        snippet: String,
        auth: bool,
    },
    Unreachable(TransportError),
}

/// Fetches media with the managed token.
pub struct MediaFetcher {
    manager: Arc<TokenManager>,
}

impl MediaFetcher {
    pub fn new(manager: Arc<TokenManager>) -> Self {
        Self { manager }
    }

    /// Fetch up to `limit` items (clamped to 1..=50).
    ///
    /// Remote failures are recorded and produce an empty list; `Err` means
    /// the token state could not be read or written.
    pub async fn fetch_media(&self, limit: u32) -> Result<Vec<MediaItem>> {
        let limit = clamp_limit(limit as i64);
        let token = self.manager.token().await?;
        if token.is_empty() {
            tracing::debug!("No token configured, media fetch skipped");
            return Ok(Vec::new());
        }

        match self.attempt(&token, limit).await {
            Attempt::Items(items) => Ok(items),
            Attempt::Rejected { auth: true, .. } => self.recover(limit).await,
            Attempt::Rejected {
                status, snippet, ..
            } => {
                self.fail(format!(
                    "Media fetch failed (status {}). Body: {}",
                    status, snippet
                ))
                .await
            }
            Attempt::Unreadable => {
                self.fail("Media fetch returned an unreadable body".to_string())
                    .await
            }
            Attempt::Unreachable(e) => self.fail(format!("Media fetch request failed: {}", e)).await,
        }
    }

    /// Force a refresh after an auth-shaped failure, then retry once.
    async fn recover(&self, limit: u32) -> Result<Vec<MediaItem>> {
        tracing::warn!("Media endpoint rejected the token, forcing refresh");

        match self.manager.refresh_if_needed(true).await? {
            RefreshOutcome::Refreshed => {}
            RefreshOutcome::Skipped => {
                return self
                    .fail(
                        "Token refresh during media fetch was not performed (backoff or not needed)."
                            .to_string(),
                    )
                    .await;
            }
            RefreshOutcome::Failed(err) => {
                return self
                    .fail(format!("Token refresh during media fetch failed: {}", err))
                    .await;
            }
        }

        let token = self.manager.token().await?;
        match self.attempt(&token, limit).await {
            Attempt::Items(items) => Ok(items),
            Attempt::Rejected {
                status, snippet, ..
            } => {
                self.fail(format!(
                    "Media fetch retry failed (status {}). Body: {}",
                    status, snippet
                ))
                .await
            }
            Attempt::Unreadable => {
                self.fail("Media fetch retry returned an unreadable body".to_string())
                    .await
            }
            Attempt::Unreachable(e) => self.fail(format!("Media fetch retry failed: {}", e)).await,
        }
    }

    async fn attempt(&self, token: &str, limit: u32) -> Attempt {
        let url = self.manager.graph().media_url(token, limit);
        tracing::debug!("GET {} (limit {})", url.path(), limit);

        let resp = match self.manager.transport().get(url.as_str()).await {
            Ok(resp) => resp,
            Err(e) => return Attempt::Unreachable(e),
        };

        if resp.is_success() {
            return match parse_media(&resp.body) {
                Some(items) => Attempt::Items(items),
                None => Attempt::Unreadable,
            };
        }

        Attempt::Rejected {
            status: resp.status,
            auth: is_auth_error(resp.status, resp.json().as_ref()),
            snippet: truncate_message(&resp.body, MAX_ERROR_LEN),
        }
    }

    async fn fail(&self, message: String) -> Result<Vec<MediaItem>> {
        tracing::warn!("{}", message);
        self.manager.record_error(&message).await?;
        Ok(Vec::new())
    }
}

/// Whether a failed response says the token is invalid or expired.
///
/// Requires HTTP 400/401 and either error code 190, or an OAuth error type
/// whose message mentions an expired/invalid access token.
pub fn is_auth_error(status: u16, body: Option<&Value>) -> bool {
    if status != 400 && status != 401 {
        return false;
    }
    let Some(error) = body.and_then(|b| b.get("error")) else {
        return false;
    };

    if error.get("code").and_then(json_i64) == Some(190) {
        return true;
    }

    let lower = |key: &str| {
        error
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase()
    };
    let kind = lower("type");
    let message = lower("message");
    kind.contains("oauth")
        && ["expired", "invalid", "access token"]
            .iter()
            .any(|needle| message.contains(needle))
}

/// Parse a `{"data": [...]}` body. `None` if the body has no data array.
fn parse_media(body: &str) -> Option<Vec<MediaItem>> {
    let value: Value = serde_json::from_str(body).ok()?;
    let data = value.get("data")?.as_array()?;
    let items: Vec<MediaItem> = data
        .iter()
        .filter_map(|entry| entry.as_object().and_then(parse_item))
        .collect();
    if items.len() < data.len() {
        tracing::debug!("Skipped {} malformed media entries", data.len() - items.len());
    }
    Some(items)
}

fn parse_item(entry: &Map<String, Value>) -> Option<MediaItem> {
    let id = sanitize_text(&field(entry, "id"));
    if id.is_empty() {
        return None;
    }
    Some(MediaItem {
        id,
        media_url: sanitize_url(&field(entry, "media_url")),
        permalink: sanitize_url(&field(entry, "permalink")),
        caption: sanitize_text(&field(entry, "caption")),
        timestamp: sanitize_text(&field(entry, "timestamp")),
    })
}

fn field(entry: &Map<String, Value>, key: &str) -> String {
    match entry.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Keep only well-formed http(s) URLs, normalised and percent-encoded.
fn sanitize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
        _ => String::new(),
    }
}

/// Strip markup, fold whitespace and control characters into single spaces.
///
/// An unterminated tag swallows the rest of the text. A `<` that cannot
/// open a tag, and any stray `>`, are escaped.
fn sanitize_text(raw: &str) -> String {
    strip_tags(raw)
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_tags(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find(['<', '>']) {
        stripped.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with('>') {
            stripped.push_str("&gt;");
            rest = &tail[1..];
            continue;
        }

        let opens_tag = tail[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
        if !opens_tag {
            stripped.push_str("&lt;");
            rest = &tail[1..];
            continue;
        }

        match tail.find('>') {
            Some(close) => rest = &tail[close + 1..],
            None => return stripped,
        }
    }
    stripped.push_str(rest);
    stripped
}
