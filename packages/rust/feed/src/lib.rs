//! Upstream bill feed acquisition with a process-wide TTL cache.
//!
//! [`FeedSource`] fetches and parses the legislature's RSS feed into
//! [`FeedEntry`] values. Results are held in a [`FeedCache`] keyed by the
//! feed URL (which carries the query parameters) and expire purely by age.
//! The cache lock is held while a stale entry is refreshed, so concurrent
//! callers inside one window trigger a single upstream request.

mod parser;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use billtracker_scraper::DocumentFetcher;
use billtracker_shared::{BillTrackerError, FeedConfig, FeedEntry, Result};

// ---------------------------------------------------------------------------
// FeedCache
// ---------------------------------------------------------------------------

/// A cached feed fetch.
#[derive(Debug)]
struct CachedFeed {
    fetched_at: Instant,
    entries: Arc<Vec<FeedEntry>>,
}

/// Age-based cache of parsed feeds, shared by every [`FeedSource`] in the process.
#[derive(Debug)]
pub struct FeedCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, CachedFeed>>,
}

impl FeedCache {
    /// Create an empty cache whose entries stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the fresh entry for `key`, or run `fetch` and store its result.
    ///
    /// Failed fetches are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Arc<Vec<FeedEntry>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<FeedEntry>>>,
    {
        let mut slots = self.slots.lock().await;

        if let Some(cached) = slots.get(key) {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!(key, entries = cached.entries.len(), "feed cache hit");
                return Ok(cached.entries.clone());
            }
        }

        let entries = Arc::new(fetch().await?);
        slots.insert(
            key.to_string(),
            CachedFeed {
                fetched_at: Instant::now(),
                entries: entries.clone(),
            },
        );
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// FeedSource
// ---------------------------------------------------------------------------

/// Fetches the bill feed for one query (session year + sort option).
#[derive(Debug, Clone)]
pub struct FeedSource {
    fetcher: DocumentFetcher,
    url: String,
    session_year: String,
    cache: Arc<FeedCache>,
}

impl FeedSource {
    /// Create a source for an explicit feed URL.
    pub fn new(
        fetcher: DocumentFetcher,
        url: impl Into<String>,
        session_year: impl Into<String>,
        cache: Arc<FeedCache>,
    ) -> Self {
        Self {
            fetcher,
            url: url.into(),
            session_year: session_year.into(),
            cache,
        }
    }

    /// Create a source for the query described by the `[feed]` config section.
    pub fn from_config(fetcher: DocumentFetcher, config: &FeedConfig, cache: Arc<FeedCache>) -> Self {
        Self::new(fetcher, config.feed_url(), config.session_year.clone(), cache)
    }

    /// The feed URL this source queries.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the feed entries, served from the cache while fresh.
    ///
    /// An unparseable feed yields no entries; fetch errors propagate.
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn fetch_feed(&self) -> Result<Arc<Vec<FeedEntry>>> {
        let result = self
            .cache
            .get_or_fetch(&self.url, || self.fetch_uncached())
            .await;

        match result {
            Err(BillTrackerError::Parse { message }) => {
                warn!(error = %message, "feed could not be parsed, treating as empty");
                Ok(Arc::new(Vec::new()))
            }
            other => other,
        }
    }

    async fn fetch_uncached(&self) -> Result<Vec<FeedEntry>> {
        info!(url = %self.url, "fetching upstream feed");
        let body = self.fetcher.fetch(&self.url).await?;
        let entries = parser::parse_feed(&body, &self.session_year)?;
        info!(entries = entries.len(), "feed parsed");
        Ok(entries)
    }
}
