//! Application configuration for the bill tracker.
//!
//! User config lives at `~/.billtracker/billtracker.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BillTrackerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "billtracker.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".billtracker";

/// Default database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "billtracker.db";

// ---------------------------------------------------------------------------
// Config structs (matching billtracker.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upstream feed settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Bill document fetching settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Periodic job intervals.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Ordered category table. The first matching rule wins.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            feed: FeedConfig::default(),
            fetch: FetchConfig::default(),
            schedule: ScheduleConfig::default(),
            categories: default_categories(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file. Defaults to `~/.billtracker/billtracker.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

/// `[feed]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed URL with `{session_year}` and `{sort_option}` placeholders.
    #[serde(default = "default_feed_url_template")]
    pub url_template: String,

    /// Legislative session year the feed is queried for.
    #[serde(default = "default_session_year")]
    pub session_year: String,

    /// Upstream sort option (empty means the site default).
    #[serde(default)]
    pub sort_option: String,

    /// How long a fetched feed stays fresh, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url_template: default_feed_url_template(),
            session_year: default_session_year(),
            sort_option: String::new(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl FeedConfig {
    /// Compose the concrete feed URL for the configured query.
    pub fn feed_url(&self) -> String {
        self.url_template
            .replace("{session_year}", &self.session_year)
            .replace("{sort_option}", &self.sort_option)
    }

    /// Cache TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_feed_url_template() -> String {
    "https://www.gencourt.state.nh.us/rssFeeds/rssQueryResults.aspx?&txtsessionyear={session_year}&sortoption={sort_option}".into()
}
fn default_session_year() -> String {
    "2024".into()
}
fn default_cache_ttl() -> u64 {
    3600
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Bill text URL with `{session_year}` and `{bill_id}` placeholders.
    #[serde(default = "default_detail_url_template")]
    pub detail_url_template: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per document, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Maximum concurrent bill enrichments per run.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Optional deadline for a whole enrichment run, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_secs: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            detail_url_template: default_detail_url_template(),
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            concurrency: default_concurrency(),
            run_deadline_secs: None,
        }
    }
}

impl FetchConfig {
    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff base delay as a [`Duration`].
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Run deadline as a [`Duration`], if configured.
    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

fn default_detail_url_template() -> String {
    "https://www.gencourt.state.nh.us/bill_status/legacy/bs2016/billText.aspx?sy={session_year}&id={bill_id}&txtFormat=html".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    1000
}
fn default_concurrency() -> u32 {
    8
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Hours between ingestion runs.
    #[serde(default = "default_ingest_interval")]
    pub ingest_interval_hours: u64,

    /// Hours between category backfill runs.
    #[serde(default = "default_backfill_interval")]
    pub backfill_interval_hours: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingest_interval_hours: default_ingest_interval(),
            backfill_interval_hours: default_backfill_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_hours * 3600)
    }

    pub fn backfill_interval(&self) -> Duration {
        Duration::from_secs(self.backfill_interval_hours * 3600)
    }
}

fn default_ingest_interval() -> u64 {
    6
}
fn default_backfill_interval() -> u64 {
    24
}

/// `[[categories]]` entry: a label and the keyword substrings that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category label assigned on match.
    pub label: String,
    /// Keyword substrings, matched case-insensitively.
    pub keywords: Vec<String>,
}

impl CategoryRule {
    /// Build a rule, lower-casing every keyword.
    pub fn new(label: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            label: label.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "Education",
            &["education", "school", "student", "teacher", "university", "college"],
        ),
        CategoryRule::new(
            "Health",
            &["health", "medical", "hospital", "doctor", "patient", "healthcare"],
        ),
        CategoryRule::new(
            "Transportation",
            &["transport", "road", "highway", "vehicle", "traffic", "transit"],
        ),
        CategoryRule::new(
            "Environment",
            &["environment", "climate", "pollution", "energy", "conservation"],
        ),
        CategoryRule::new(
            "Economy",
            &["economy", "tax", "budget", "finance", "business", "employment"],
        ),
        CategoryRule::new(
            "Public Safety",
            &["police", "crime", "prison", "fire", "emergency", "safety"],
        ),
        CategoryRule::new(
            "Housing",
            &["housing", "rent", "property", "zoning", "development"],
        ),
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.billtracker/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BillTrackerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.billtracker/billtracker.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: the configured one, or the default under the config dir.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.database_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BillTrackerError::io(path, e))?;

    let mut config: AppConfig = toml::from_str(&content).map_err(|e| {
        BillTrackerError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    normalize_categories(&mut config.categories);
    validate(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| BillTrackerError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BillTrackerError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| BillTrackerError::io(path, e))?;
    tracing::info!(?path, "created default config file");
    Ok(())
}

/// Lower-case keywords loaded from a user file; matching is against lower-cased text.
fn normalize_categories(rules: &mut [CategoryRule]) {
    for rule in rules {
        for keyword in &mut rule.keywords {
            *keyword = keyword.to_lowercase();
        }
    }
}

/// Reject configurations the pipeline cannot run with.
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.fetch.max_attempts == 0 {
        return Err(BillTrackerError::config("fetch.max_attempts must be at least 1"));
    }
    if config.fetch.concurrency == 0 {
        return Err(BillTrackerError::config("fetch.concurrency must be at least 1"));
    }
    if !config.fetch.detail_url_template.contains("{bill_id}") {
        return Err(BillTrackerError::config(
            "fetch.detail_url_template must contain a {bill_id} placeholder",
        ));
    }
    if config.schedule.ingest_interval_hours == 0 || config.schedule.backfill_interval_hours == 0 {
        return Err(BillTrackerError::config("schedule intervals must be at least 1 hour"));
    }
    if let Some(rule) = config.categories.iter().find(|r| r.label.trim().is_empty()) {
        return Err(BillTrackerError::config(format!(
            "category with keywords {:?} has an empty label",
            rule.keywords
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("url_template"));
        assert!(toml_str.contains("Public Safety"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.fetch.max_attempts, 3);
        assert_eq!(parsed.feed.cache_ttl_secs, 3600);
        assert_eq!(parsed.categories.len(), 7);
        assert_eq!(parsed.categories[0].label, "Education");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[feed]
session_year = "2025"

[[categories]]
label = "Agriculture"
keywords = ["farm", "Livestock"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.feed.session_year, "2025");
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.schedule.ingest_interval_hours, 6);
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.categories[0].label, "Agriculture");
    }

    #[test]
    fn load_from_file_lowercases_keywords() {
        let path = std::env::temp_dir().join(format!(
            "billtracker-config-{}.toml",
            uuid::Uuid::now_v7()
        ));
        std::fs::write(
            &path,
            "[[categories]]\nlabel = \"Agriculture\"\nkeywords = [\"Livestock\"]\n",
        )
        .unwrap();

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.categories[0].keywords, vec!["livestock".to_string()]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn feed_url_substitutes_placeholders() {
        let feed = FeedConfig {
            session_year: "2025".into(),
            sort_option: "billnumber".into(),
            ..FeedConfig::default()
        };
        let url = feed.feed_url();
        assert!(url.contains("txtsessionyear=2025"));
        assert!(url.ends_with("sortoption=billnumber"));
    }

    #[test]
    fn validation_rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.fetch.max_attempts = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn validation_requires_bill_id_placeholder() {
        let mut config = AppConfig::default();
        config.fetch.detail_url_template = "https://example.com/bill".into();
        assert!(validate(&config).is_err());
        assert!(validate(&AppConfig::default()).is_ok());
    }
}
