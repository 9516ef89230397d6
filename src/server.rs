//! HTTP read surface and the daily refresh scheduler
//!
//! Serves `GET /media?limit=N` from the media cache and `GET /status` with
//! the operator-visible token metadata. The raw token never leaves the
//! process through either route.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{MediaCache, DEFAULT_LIMIT};
use crate::auth::{RefreshOutcome, TokenManager, TokenState};

/// How often the scheduler asks whether a refresh is due.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TokenManager>,
    pub cache: MediaCache,
}

#[derive(Debug, Deserialize)]
struct MediaQuery {
    limit: Option<i64>,
}

/// Token metadata without the token itself.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub has_token: bool,
    pub last_update: Option<i64>,
    pub expires_at: Option<i64>,
    pub last_attempt: Option<i64>,
    pub fail_count: u32,
    pub last_error: Option<String>,
}

impl From<&TokenState> for StatusView {
    fn from(state: &TokenState) -> Self {
        Self {
            has_token: state.has_token(),
            last_update: state.last_update,
            expires_at: (state.expires_at > 0).then_some(state.expires_at),
            last_attempt: state.last_attempt,
            fail_count: state.fail_count,
            last_error: state.last_error.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/media", get(get_media))
        .route("/status", get(get_status))
        .with_state(state)
}

async fn get_media(State(state): State<AppState>, Query(query): Query<MediaQuery>) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT as i64);
    match state.cache.get_media(limit).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => {
            warn!("media read failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_status(State(state): State<AppState>) -> Response {
    match state.manager.state().await {
        Ok(token_state) => Json(StatusView::from(&token_state)).into_response(),
        Err(e) => {
            warn!("status read failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Spawn the periodic `refresh_if_needed(false)` loop.
///
/// The first check runs immediately, then once per `interval`.
pub fn spawn_refresh_task(
    manager: Arc<TokenManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match manager.refresh_if_needed(false).await {
                Ok(RefreshOutcome::Refreshed) => info!("Scheduled refresh stored a new token"),
                Ok(RefreshOutcome::Skipped) => {}
                Ok(RefreshOutcome::Failed(e)) => warn!("Scheduled refresh failed: {}", e),
                Err(e) => warn!("Scheduled refresh could not access state: {:#}", e),
            }
        }
    })
}

/// Run the HTTP surface and scheduler until the process is stopped.
pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let scheduler = spawn_refresh_task(state.manager.clone(), REFRESH_INTERVAL);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Serving media on http://{}", bind);

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("Shutting down...");
        })
        .await
        .context("HTTP server failed");

    scheduler.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::FakeTransport;
    use crate::api::MediaFetcher;
    use crate::auth::GraphConfig;
    use crate::clock::FixedClock;
    use crate::config::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const NOW: i64 = 1_700_000_000;

    fn app(state: TokenState, transport: FakeTransport) -> (Router, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let manager = Arc::new(TokenManager::new(
            Arc::new(MemoryStore::with_state(state)),
            Arc::new(FixedClock::new(NOW)),
            transport.clone(),
            GraphConfig::default(),
        ));
        let cache = MediaCache::new(Arc::new(MediaFetcher::new(manager.clone())));
        (router(AppState { manager, cache }), transport)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn secret_state() -> TokenState {
        TokenState {
            token: "super-secret".into(),
            last_update: Some(NOW - 10),
            expires_at: NOW + 1000,
            ..TokenState::default()
        }
    }

    #[tokio::test]
    async fn test_media_route_default_limit_and_shape() {
        let (router, transport) = app(
            secret_state(),
            FakeTransport::new().respond(
                200,
                r#"{"data":[{"id":"1","media_url":"https://cdn.test/1.jpg","permalink":"https://ig.test/p/1","caption":"Hi","timestamp":"2023-01-01T00:00:00Z"}]}"#,
            ),
        );
        let (status, body) = get_json(router, "/media").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!([{
                "id": "1",
                "mediaUrl": "https://cdn.test/1.jpg",
                "permalink": "https://ig.test/p/1",
                "caption": "Hi",
                "timestamp": "2023-01-01T00:00:00Z"
            }])
        );
        assert!(transport.calls()[0].contains("limit=12&"));
        assert!(!body.to_string().contains("super-secret"));
    }

    #[tokio::test]
    async fn test_media_route_clamps_limit() {
        let (router, transport) = app(
            secret_state(),
            FakeTransport::new().respond(200, r#"{"data":[]}"#),
        );
        let (status, _) = get_json(router, "/media?limit=500").await;
        assert_eq!(status, StatusCode::OK);
        assert!(transport.calls()[0].contains("limit=50&"));
    }

    #[tokio::test]
    async fn test_media_route_rejects_non_numeric_limit() {
        let (router, transport) = app(secret_state(), FakeTransport::new());
        let (status, _) = get_json(router, "/media?limit=lots").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_status_route_hides_token() {
        let (router, _) = app(secret_state(), FakeTransport::new());
        let (status, body) = get_json(router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasToken"], true);
        assert_eq!(body["expiresAt"], NOW + 1000);
        assert_eq!(body["failCount"], 0);
        assert!(!body.to_string().contains("super-secret"));
    }

    #[test]
    fn test_status_view_unknown_expiry_is_null() {
        let view = StatusView::from(&TokenState::default());
        assert!(!view.has_token);
        assert_eq!(view.expires_at, None);
    }

    #[tokio::test]
    async fn test_scheduler_runs_first_check_immediately() {
        let transport = Arc::new(
            FakeTransport::new().respond(200, r#"{"access_token":"new","expires_in":5184000}"#),
        );
        let store = Arc::new(MemoryStore::with_state(TokenState {
            token: "old".into(),
            ..TokenState::default()
        }));
        let manager = Arc::new(TokenManager::new(
            store.clone(),
            Arc::new(FixedClock::new(NOW)),
            transport.clone(),
            GraphConfig::default(),
        ));

        let handle = spawn_refresh_task(manager, REFRESH_INTERVAL);
        for _ in 0..50 {
            if store.snapshot().token == "new" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(store.snapshot().token, "new");
        assert_eq!(transport.call_count(), 1);
    }
}
