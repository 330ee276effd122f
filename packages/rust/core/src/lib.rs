//! Core ingestion logic for the bill tracker.
//!
//! This crate ties together the feed source, document fetcher, categorizer,
//! and storage into the ingestion workflow (`run_ingestion`), the category
//! backfill pass, and the scheduler that drives both.

pub mod categorize;
pub mod enrich;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;

pub use categorize::Categorizer;
pub use enrich::{BillEnricher, EnrichFailure, EnrichOutcome};
pub use pipeline::{IngestionService, ProgressReporter, SilentProgress};
pub use reconcile::{IngestionCounts, reconcile};
pub use scheduler::{Scheduler, SchedulerStats};
