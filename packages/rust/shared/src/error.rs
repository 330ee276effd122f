//! Failures of an ingestion run and of the query commands.
//!
//! A feed fetch, storage or config failure aborts the whole run. Failures
//! tied to one feed entry (a link without an id, a lost enrichment task) are
//! reported per entry and the run carries on. `color-eyre` takes over at the
//! CLI boundary.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BillTrackerError {
    /// Bad or missing setting in `billtracker.toml`.
    #[error("config error: {message}")]
    Config { message: String },

    /// The feed or a bill text page could not be fetched, after retries.
    #[error("fetch failed: {0}")]
    Network(String),

    /// The feed document is not RSS.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// libSQL failure, a read-only violation, or an update with no stored row.
    #[error("storage error: {0}")]
    Storage(String),

    /// A spawned enrichment task panicked or was cancelled.
    #[error("enrichment task failed: {0}")]
    Enrichment(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input the pipeline refuses, such as a bill link with no `id`.
    #[error("invalid input: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, BillTrackerError>;

impl BillTrackerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the feed or a bill page could not be fetched.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = BillTrackerError::config("feed.url_template is empty");
        assert_eq!(err.to_string(), "config error: feed.url_template is empty");

        let err = BillTrackerError::validation("link has no id parameter");
        assert_eq!(err.to_string(), "invalid input: link has no id parameter");

        let err = BillTrackerError::Network("GET https://example.com/rss: 503".into());
        assert!(err.to_string().starts_with("fetch failed:"));
    }

    #[test]
    fn only_fetch_failures_are_network() {
        assert!(BillTrackerError::Network("timeout".into()).is_network());
        assert!(!BillTrackerError::Storage("locked".into()).is_network());
        assert!(!BillTrackerError::parse("not rss").is_network());
    }
}
