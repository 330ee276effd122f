//! Per-entry bill enrichment: detail URL, full text, category.
//!
//! [`BillEnricher::enrich_all`] fans out one task per feed entry, bounded by
//! a semaphore, and gathers one [`EnrichOutcome`] per entry in feed order.
//! A failing entry never affects its siblings.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use billtracker_scraper::{DocumentFetcher, full_text_or_sentinel, strip_html};
use billtracker_shared::{BillTrackerError, CandidateRecord, FeedEntry, FetchConfig, Result};

use crate::categorize::Categorizer;
use crate::pipeline::ProgressReporter;

/// An entry that could not be turned into a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichFailure {
    /// Feed entry title (bill number, possibly empty).
    pub title: String,
    pub reason: String,
}

impl std::fmt::Display for EnrichFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.reason)
    }
}

/// Result of enriching one feed entry.
pub type EnrichOutcome = std::result::Result<CandidateRecord, EnrichFailure>;

/// Extract the upstream bill identifier (the `id` query parameter) from an entry link.
pub fn bill_id_from_link(link: &str) -> Result<String> {
    let url = Url::parse(link)
        .map_err(|e| BillTrackerError::validation(format!("invalid entry link {link:?}: {e}")))?;

    url.query_pairs()
        .find(|(key, value)| key == "id" && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
        .ok_or_else(|| BillTrackerError::validation(format!("entry link {link:?} has no id parameter")))
}

/// Fill the detail URL template for one bill.
pub fn detail_url(template: &str, session_year: &str, bill_id: &str) -> String {
    let encode = |v: &str| url::form_urlencoded::byte_serialize(v.as_bytes()).collect::<String>();
    template
        .replace("{session_year}", &encode(session_year))
        .replace("{bill_id}", &encode(bill_id))
}

/// Turns feed entries into candidate records.
#[derive(Debug)]
pub struct BillEnricher {
    fetcher: DocumentFetcher,
    categorizer: Arc<Categorizer>,
    detail_url_template: String,
    concurrency: usize,
    run_deadline: Option<Duration>,
}

impl BillEnricher {
    pub fn new(fetcher: DocumentFetcher, categorizer: Arc<Categorizer>, config: &FetchConfig) -> Self {
        Self {
            fetcher,
            categorizer,
            detail_url_template: config.detail_url_template.clone(),
            concurrency: config.concurrency.max(1) as usize,
            run_deadline: config.run_deadline(),
        }
    }

    /// Enrich a single entry with no deadline.
    pub async fn enrich(&self, entry: &FeedEntry) -> Result<CandidateRecord> {
        self.enrich_before(entry, None).await
    }

    /// Enrich `entry`; a detail fetch still running at `deadline` counts as failed.
    async fn enrich_before(
        &self,
        entry: &FeedEntry,
        deadline: Option<Instant>,
    ) -> Result<CandidateRecord> {
        let number = entry.title.trim();
        if number.is_empty() {
            return Err(BillTrackerError::validation("feed entry has no bill number"));
        }

        let bill_id = bill_id_from_link(&entry.link)?;
        let html_link = detail_url(&self.detail_url_template, &entry.session_year, &bill_id);

        let fetched = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.fetcher.fetch(&html_link))
                .await
                .unwrap_or_else(|_| {
                    Err(BillTrackerError::Network(format!(
                        "{html_link}: run deadline reached"
                    )))
                }),
            None => self.fetcher.fetch(&html_link).await,
        };
        if let Err(e) = &fetched {
            warn!(bill = number, error = %e, "bill text unavailable");
        }

        let full_text = full_text_or_sentinel(fetched);
        let category = self.categorizer.categorize(&full_text).to_string();
        debug!(bill = number, %category, "entry enriched");

        Ok(CandidateRecord {
            number: number.to_string(),
            session_year: entry.session_year.clone(),
            summary: strip_html(entry.summary_html()),
            sponsor: entry.sponsor().to_string(),
            status: entry.status(),
            full_text,
            html_link,
            category,
            last_updated: Utc::now(),
        })
    }

    /// Enrich every entry concurrently and return one outcome per entry, in input order.
    #[instrument(skip_all, fields(entries = entries.len(), concurrency = self.concurrency))]
    pub async fn enrich_all(
        self: &Arc<Self>,
        entries: &[FeedEntry],
        progress: &dyn ProgressReporter,
    ) -> Vec<EnrichOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let deadline = self.run_deadline.map(|d| Instant::now() + d);
        let total = entries.len();

        let mut handles = Vec::with_capacity(total);
        for entry in entries {
            let enricher = Arc::clone(self);
            let sem = semaphore.clone();
            let entry = entry.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|e| BillTrackerError::Enrichment(e.to_string()))?;
                enricher.enrich_before(&entry, deadline).await
            }));
        }

        let mut outcomes = Vec::with_capacity(total);
        for (i, (handle, entry)) in handles.into_iter().zip(entries).enumerate() {
            let outcome = match handle.await {
                Ok(Ok(candidate)) => Ok(candidate),
                Ok(Err(e)) => Err(EnrichFailure {
                    title: entry.title.clone(),
                    reason: e.to_string(),
                }),
                Err(e) => Err(EnrichFailure {
                    title: entry.title.clone(),
                    reason: format!("enrichment task failed: {e}"),
                }),
            };
            progress.entry_enriched(&entry.title, i + 1, total);
            outcomes.push(outcome);
        }
        outcomes
    }
}
