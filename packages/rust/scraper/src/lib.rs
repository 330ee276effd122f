//! Bill document fetching and text extraction.
//!
//! This crate provides:
//! - [`fetcher`]: HTTP GET with bounded retries and exponential backoff
//! - [`extract`]: bill text extraction and HTML-to-text stripping

pub mod extract;
pub mod fetcher;

pub use extract::{extract_full_text, full_text_or_sentinel, strip_html};
pub use fetcher::{DocumentFetcher, FetchOptions, RetryPolicy, retry_with_backoff};
