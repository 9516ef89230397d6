//! HTTP transport for Instagram Graph API calls
//!
//! Wraps reqwest::Client behind the [`Transport`] trait so the token manager
//! and media fetcher can be driven by canned responses in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Per-request timeout for remote calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum redirects followed per request.
pub const MAX_REDIRECTS: usize = 3;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// No usable response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Request(String),
}

/// Performs HTTP GET requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Production transport on a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect_policy())
            .user_agent(concat!("ig-token-manager/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

/// Follow up to [`MAX_REDIRECTS`] hops.
///
/// `previous()` includes the original URL, so `Policy::limited(n)` would
/// stop after `n - 1` hops.
fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error(format!("more than {} redirects", MAX_REDIRECTS))
        } else {
            attempt.follow()
        }
    })
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let resp = self.http.get(url).send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse::new(status, body))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        // Strip the URL: it carries the access token as a query parameter.
        TransportError::Request(e.without_url().to_string())
    }
}

#[cfg(test)]
pub use fake::FakeTransport;
