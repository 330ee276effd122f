//! Ingestion pipeline: feed → enrich → reconcile, plus category backfill.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use billtracker_feed::{FeedCache, FeedSource};
use billtracker_scraper::{DocumentFetcher, FetchOptions};
use billtracker_shared::{AppConfig, BillId, Result};
use billtracker_storage::Storage;

use crate::categorize::Categorizer;
use crate::enrich::BillEnricher;
use crate::reconcile::{IngestionCounts, reconcile};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each entry's enrichment outcome is gathered.
    fn entry_enriched(&self, title: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, counts: &IngestionCounts);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn entry_enriched(&self, _title: &str, _current: usize, _total: usize) {}
    fn done(&self, _counts: &IngestionCounts) {}
}

/// Owns the pipeline components and serializes runs against one store.
pub struct IngestionService {
    feed: FeedSource,
    enricher: Arc<BillEnricher>,
    categorizer: Arc<Categorizer>,
    storage: Arc<Storage>,
    run_lock: Mutex<()>,
}

impl IngestionService {
    pub fn new(
        feed: FeedSource,
        enricher: Arc<BillEnricher>,
        categorizer: Arc<Categorizer>,
        storage: Arc<Storage>,
    ) -> Self {
        Self {
            feed,
            enricher,
            categorizer,
            storage,
            run_lock: Mutex::new(()),
        }
    }

    /// Wire the pipeline from configuration. `cache` is shared process-wide.
    pub fn from_config(config: &AppConfig, storage: Arc<Storage>, cache: Arc<FeedCache>) -> Result<Self> {
        let fetcher = DocumentFetcher::new(&FetchOptions::from(&config.fetch))?;
        let categorizer = Arc::new(Categorizer::from_config(config));
        let feed = FeedSource::from_config(fetcher.clone(), &config.feed, cache);
        let enricher = Arc::new(BillEnricher::new(fetcher, categorizer.clone(), &config.fetch));
        Ok(Self::new(feed, enricher, categorizer, storage))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run one ingestion pass and report how many bills were added and updated.
    ///
    /// Entries that fail enrichment are logged and skipped. Feed fetch and
    /// storage errors fail the run with nothing committed.
    #[instrument(skip_all, fields(feed = %self.feed.url()))]
    pub async fn run_ingestion(&self, progress: &dyn ProgressReporter) -> Result<IngestionCounts> {
        let _guard = self.run_lock.lock().await;
        let start = Instant::now();

        progress.phase("Fetching feed");
        let entries = self.feed.fetch_feed().await?;
        if entries.is_empty() {
            info!("feed has no entries, nothing to do");
            let counts = IngestionCounts::default();
            progress.done(&counts);
            return Ok(counts);
        }

        progress.phase("Enriching bills");
        let outcomes = self.enricher.enrich_all(&entries, progress).await;

        let mut candidates = Vec::with_capacity(outcomes.len());
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome {
                Ok(candidate) => candidates.push(candidate),
                Err(failure) => {
                    failed += 1;
                    warn!(bill = %failure.title, reason = %failure.reason, "skipping entry that failed enrichment");
                }
            }
        }

        progress.phase("Saving bills");
        let counts = reconcile(&self.storage, candidates).await?;

        info!(
            entries = entries.len(),
            new = counts.new_count,
            updated = counts.updated_count,
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ingestion complete"
        );
        progress.done(&counts);
        Ok(counts)
    }

    /// Categorize every stored bill that has no category yet. Returns how many were set.
    #[instrument(skip_all)]
    pub async fn backfill_categories(&self) -> Result<usize> {
        let _guard = self.run_lock.lock().await;

        let pending = self.storage.list_uncategorized().await?;
        let assignments: Vec<(BillId, String)> = pending
            .iter()
            .map(|bill| {
                (
                    bill.id.clone(),
                    self.categorizer.categorize(&bill.full_text).to_string(),
                )
            })
            .collect();

        self.storage.commit_categories(&assignments).await?;
        info!(count = assignments.len(), "category backfill complete");
        Ok(assignments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use billtracker_shared::{CandidateRecord, StoredBill};
    use chrono::Utc;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn feed_xml(server: &MockServer, ids: &[Option<u32>]) -> String {
        let items: String = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let link = match id {
                    Some(id) => format!("{}/billinfo.aspx?id={id}", server.uri()),
                    None => format!("{}/billinfo.aspx", server.uri()),
                };
                format!(
                    "<item><title>HB{}</title><link>{link}</link><description>relative to bill {}</description></item>",
                    i + 1,
                    i + 1
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Bills</title><link>{}</link><description>d</description>{items}</channel></rss>"#,
            server.uri()
        )
    }

    async fn service(server: &MockServer, ids: &[Option<u32>]) -> IngestionService {
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_xml(server, ids)))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/billText.aspx"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<pre class="aaaCtype">AN ACT relative to hospital staffing.</pre>"#,
            ))
            .mount(server)
            .await;

        let mut config = AppConfig::default();
        config.feed.url_template = format!("{}/rss", server.uri());
        config.fetch.detail_url_template = format!(
            "{}/billText.aspx?sy={{session_year}}&id={{bill_id}}",
            server.uri()
        );
        config.fetch.max_attempts = 1;
        config.fetch.backoff_base_ms = 1;

        let tmp = std::env::temp_dir().join(format!("bt_test_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        let cache = Arc::new(FeedCache::new(Duration::from_secs(3600)));
        IngestionService::from_config(&config, storage, cache).unwrap()
    }

    #[tokio::test]
    async fn rerun_with_same_feed_updates_everything() {
        let server = MockServer::start().await;
        let service = service(&server, &[Some(1), Some(2), Some(3)]).await;

        let first = service.run_ingestion(&SilentProgress).await.unwrap();
        assert_eq!(first, IngestionCounts { new_count: 3, updated_count: 0 });

        let second = service.run_ingestion(&SilentProgress).await.unwrap();
        assert_eq!(second, IngestionCounts { new_count: 0, updated_count: 3 });

        let bill = service.storage().get_bill("HB2").await.unwrap().unwrap();
        assert_eq!(bill.category.as_deref(), Some("Health"));
        assert_eq!(bill.summary, "relative to bill 2");
        assert_eq!(bill.full_text, "AN ACT relative to hospital staffing.");
        assert_eq!(bill.session_year, "2024");
    }

    #[tokio::test]
    async fn failed_entry_is_skipped() {
        let server = MockServer::start().await;
        let service = service(&server, &[Some(1), Some(2), None, Some(4), Some(5)]).await;

        let counts = service.run_ingestion(&SilentProgress).await.unwrap();
        assert_eq!(counts, IngestionCounts { new_count: 4, updated_count: 0 });
        assert!(service.storage().find_bill_by_number("HB3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_feed_is_nothing_to_do() {
        let server = MockServer::start().await;
        let service = service(&server, &[]).await;

        let counts = service.run_ingestion(&SilentProgress).await.unwrap();
        assert_eq!(counts, IngestionCounts::default());
    }

    #[tokio::test]
    async fn feed_outage_fails_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = AppConfig::default();
        config.feed.url_template = format!("{}/rss", server.uri());
        config.fetch.max_attempts = 1;
        let tmp = std::env::temp_dir().join(format!("bt_test_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.unwrap());
        let cache = Arc::new(FeedCache::new(Duration::from_secs(3600)));
        let service = IngestionService::from_config(&config, storage, cache).unwrap();

        let err = service.run_ingestion(&SilentProgress).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(service.storage().count_bills().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn backfill_fills_missing_categories_once() {
        let server = MockServer::start().await;
        let service = service(&server, &[]).await;

        let mut bill = StoredBill::from_candidate(CandidateRecord {
            number: "SB10".into(),
            session_year: "2024".into(),
            summary: String::new(),
            sponsor: String::new(),
            status: "House: , Senate: ".into(),
            full_text: "AN ACT relative to zoning variances.".into(),
            html_link: String::new(),
            category: String::new(),
            last_updated: Utc::now(),
        });
        bill.category = None;
        service.storage().commit_bills(&[bill], &[]).await.unwrap();

        assert_eq!(service.backfill_categories().await.unwrap(), 1);
        let stored = service.storage().find_bill_by_number("SB10").await.unwrap().unwrap();
        assert_eq!(stored.category.as_deref(), Some("Housing"));

        assert_eq!(service.backfill_categories().await.unwrap(), 0);
    }
}
