//! Periodic ingestion and category backfill.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use billtracker_shared::ScheduleConfig;

use crate::pipeline::{IngestionService, SilentProgress};

/// What a scheduler loop did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ingestion_runs: usize,
    pub backfill_runs: usize,
    pub failed_runs: usize,
}

/// Drives an [`IngestionService`] on fixed intervals.
///
/// Both jobs fire once on start, then every interval. A failed run is logged
/// and the next tick is its retry.
pub struct Scheduler {
    service: Arc<IngestionService>,
    ingest_every: Duration,
    backfill_every: Duration,
}

impl Scheduler {
    pub fn new(service: Arc<IngestionService>, schedule: &ScheduleConfig) -> Self {
        Self::with_intervals(service, schedule.ingest_interval(), schedule.backfill_interval())
    }

    pub fn with_intervals(
        service: Arc<IngestionService>,
        ingest_every: Duration,
        backfill_every: Duration,
    ) -> Self {
        Self {
            service,
            ingest_every,
            backfill_every,
        }
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> SchedulerStats {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves. A run in progress finishes first.
    pub async fn run_until<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        let mut stats = SchedulerStats::default();
        let mut ingest = interval(self.ingest_every);
        let mut backfill = interval(self.backfill_every);
        ingest.set_missed_tick_behavior(MissedTickBehavior::Delay);
        backfill.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            ingest_every_secs = self.ingest_every.as_secs(),
            backfill_every_secs = self.backfill_every.as_secs(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = ingest.tick() => {
                    match self.service.run_ingestion(&SilentProgress).await {
                        Ok(counts) => {
                            stats.ingestion_runs += 1;
                            info!(new = counts.new_count, updated = counts.updated_count, "scheduled ingestion finished");
                        }
                        Err(e) => {
                            stats.failed_runs += 1;
                            error!(error = %e, "scheduled ingestion failed");
                        }
                    }
                }
                _ = backfill.tick() => {
                    match self.service.backfill_categories().await {
                        Ok(count) => {
                            stats.backfill_runs += 1;
                            info!(count, "scheduled backfill finished");
                        }
                        Err(e) => {
                            stats.failed_runs += 1;
                            error!(error = %e, "scheduled backfill failed");
                        }
                    }
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billtracker_feed::FeedCache;
    use billtracker_shared::AppConfig;
    use billtracker_storage::Storage;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EMPTY_FEED: &str = r#"<rss version="2.0"><channel><title>t</title><link>l</link><description>d</description></channel></rss>"#;

    async fn service(server: &MockServer) -> Arc<IngestionService> {
        let mut config = AppConfig::default();
        config.feed.url_template = format!("{}/rss", server.uri());
        config.fetch.max_attempts = 1;

        let tmp = std::env::temp_dir().join(format!("bt_test_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.unwrap());
        let cache = Arc::new(FeedCache::new(Duration::from_millis(1)));
        Arc::new(IngestionService::from_config(&config, storage, cache).unwrap())
    }

    #[tokio::test]
    async fn runs_both_jobs_until_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_FEED))
            .mount(&server)
            .await;

        let scheduler = Scheduler::with_intervals(
            service(&server).await,
            Duration::from_millis(40),
            Duration::from_millis(60),
        );
        let stats = scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(200)))
            .await;

        assert!(stats.ingestion_runs >= 2);
        assert!(stats.backfill_runs >= 1);
        assert_eq!(stats.failed_runs, 0);
    }

    #[tokio::test]
    async fn failed_runs_do_not_stop_the_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let scheduler = Scheduler::with_intervals(
            service(&server).await,
            Duration::from_millis(30),
            Duration::from_secs(3600),
        );
        let stats = scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(150)))
            .await;

        assert!(stats.failed_runs >= 2);
        assert_eq!(stats.ingestion_runs, 0);
    }
}
