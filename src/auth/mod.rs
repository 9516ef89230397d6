//! Token lifecycle for the Instagram Graph API
//!
//! Keeps one long-lived token renewed through the `refresh_access_token`
//! endpoint, with failure backoff and a proactive renewal window.

pub mod backoff;
pub mod manager;
pub mod tokens;

pub use manager::{RefreshError, RefreshOutcome, TokenManager};
pub use tokens::{StateStore, TokenState};

use anyhow::{bail, Context};
use url::Url;

const DEFAULT_GRAPH_BASE: &str = "https://graph.instagram.com";

/// Fields requested from the media endpoint.
pub const MEDIA_FIELDS: &str = "id,caption,media_url,permalink,timestamp";

/// Remote endpoint configuration
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Base URL of the Graph API host
    base: Url,
}

impl GraphConfig {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid Graph API base URL: {}", base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("Graph API base URL must be http(s): {}", base_url);
        }
        Ok(Self { base })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, path));
        url.set_query(None);
        url
    }

    /// `GET /refresh_access_token?grant_type=ig_refresh_token&access_token=<token>`
    pub fn refresh_url(&self, token: &str) -> Url {
        let mut url = self.endpoint("/refresh_access_token");
        url.query_pairs_mut()
            .append_pair("grant_type", "ig_refresh_token")
            .append_pair("access_token", token);
        url
    }

    /// `GET /me/media?fields=...&limit=<n>&access_token=<token>`
    pub fn media_url(&self, token: &str, limit: u32) -> Url {
        let mut url = self.endpoint("/me/media");
        url.query_pairs_mut()
            .append_pair("fields", MEDIA_FIELDS)
            .append_pair("limit", &limit.to_string())
            .append_pair("access_token", token);
        url
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base: Url::parse(DEFAULT_GRAPH_BASE).expect("default Graph API URL is valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_url() {
        let url = GraphConfig::default().refresh_url("abc");
        assert_eq!(
            url.as_str(),
            "https://graph.instagram.com/refresh_access_token?grant_type=ig_refresh_token&access_token=abc"
        );
    }

    #[test]
    fn test_media_url_encodes_token() {
        let url = GraphConfig::new("http://localhost:1234/")
            .unwrap()
            .media_url("a&b", 5);
        assert_eq!(
            url.as_str(),
            "http://localhost:1234/me/media?fields=id%2Ccaption%2Cmedia_url%2Cpermalink%2Ctimestamp&limit=5&access_token=a%26b"
        );
    }

    #[test]
    fn test_base_with_path_prefix() {
        let graph = GraphConfig::new("http://proxy.local/graph/").unwrap();
        assert_eq!(
            graph.refresh_url("t").path(),
            "/graph/refresh_access_token"
        );
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(GraphConfig::new("ftp://graph.instagram.com").is_err());
        assert!(GraphConfig::new("not a url").is_err());
    }
}
