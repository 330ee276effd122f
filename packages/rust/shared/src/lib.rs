//! Shared types, error model, and configuration for the bill tracker.
//!
//! This crate is the foundation depended on by all other bill tracker crates.
//! It provides:
//! - [`BillTrackerError`]: the unified error type
//! - Domain types ([`FeedEntry`], [`CandidateRecord`], [`StoredBill`], [`BillId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CategoryRule, FeedConfig, FetchConfig, ScheduleConfig, StorageConfig, config_dir,
    config_file_path, database_path, init_config, init_config_at, load_config, load_config_from,
    validate,
};
pub use error::{BillTrackerError, Result};
pub use types::{
    BillId, CandidateRecord, DocketEntry, FALLBACK_CATEGORY, FULL_TEXT_FETCH_FAILED,
    FULL_TEXT_NOT_AVAILABLE, FeedEntry, Hearing, StoredBill,
};
