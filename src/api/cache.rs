//! Short-lived read cache for media results

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use moka::future::Cache as MokaCache;

use super::clamp_limit;
use super::media::{MediaFetcher, MediaItem};

/// How long a media result is served from memory.
pub const CACHE_TTL: Duration = Duration::from_secs(600);

/// Caches the final result of each `fetch_media` call, keyed by limit.
///
/// Only the outcome of a complete fetch is stored, so after a
/// refresh-and-retry it is the retry's result that gets cached.
#[derive(Clone)]
pub struct MediaCache {
    fetcher: Arc<MediaFetcher>,
    entries: MokaCache<u32, Vec<MediaItem>>,
}

impl MediaCache {
    pub fn new(fetcher: Arc<MediaFetcher>) -> Self {
        Self::with_ttl(fetcher, CACHE_TTL)
    }

    pub fn with_ttl(fetcher: Arc<MediaFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            entries: MokaCache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cached media for `limit` (clamped), fetching on a miss.
    ///
    /// Concurrent misses on the same limit share one fetch.
    pub async fn get_media(&self, limit: i64) -> Result<Vec<MediaItem>> {
        let limit = clamp_limit(limit);
        self.entries
            .try_get_with(limit, async {
                tracing::debug!("Media cache miss (limit {})", limit);
                self.fetcher.fetch_media(limit).await
            })
            .await
            .map_err(|e| anyhow!("{:#}", e))
    }
}

// One entry per possible limit.
const MAX_ENTRIES: u64 = super::MAX_LIMIT as u64;
