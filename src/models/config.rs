//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{PageSelectors, ScopeFilter};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment, first segment of every archive key
    #[serde(default)]
    pub environment: Environment,

    /// Upstream client and traversal settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Relational store replay settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Snapshot archive backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Run notifications
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Page parsing selectors
    #[serde(default)]
    pub selectors: PageSelectors,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or the defaults when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(&path) {
            Err(AppError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config not found at {:?}. Using defaults.", path.as_ref());
                Ok(Self::default())
            }
            loaded => loaded,
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.retry.max_attempts == 0 {
            return Err(AppError::validation(
                "crawler.retry.max_attempts must be > 0",
            ));
        }
        url::Url::parse(&self.crawler.base_url)?;
        if encoding_rs::Encoding::for_label(self.crawler.charset.trim().as_bytes()).is_none() {
            return Err(AppError::validation(format!(
                "crawler.charset '{}' is not a known encoding",
                self.crawler.charset
            )));
        }

        self.crawler.scope.compile()?;
        self.store.scope.compile()?;
        Regex::new(&self.selectors.bids_count_pattern)?;

        if self.store.database_path.as_os_str().is_empty() {
            return Err(AppError::validation("store.database_path is empty"));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.is_none() {
            return Err(AppError::validation(
                "storage.bucket is required for the s3 backend",
            ));
        }
        Ok(())
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Test,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Test => "test",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// Upstream client and traversal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Root of the upstream site
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay after each page in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Charset used to decode upstream pages
    #[serde(default = "defaults::charset")]
    pub charset: String,

    /// Retry policy for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Which options are traversed at each level
    #[serde(default = "defaults::crawl_scope")]
    pub scope: ScopeFilter,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            charset: defaults::charset(),
            retry: RetryConfig::default(),
            scope: defaults::crawl_scope(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            max_delay_ms: defaults::max_delay(),
        }
    }
}

/// Relational store replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "defaults::database_path")]
    pub database_path: PathBuf,

    /// `latest` or an explicit run start timestamp
    #[serde(default = "defaults::run_id")]
    pub run_id: String,

    /// Which archived regions are replayed
    #[serde(default)]
    pub scope: ScopeFilter,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: defaults::database_path(),
            run_id: defaults::run_id(),
            scope: ScopeFilter::match_all(),
        }
    }
}

/// Archive backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

/// Snapshot archive backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory of the local backend
    #[serde(default = "defaults::root_dir")]
    pub root_dir: PathBuf,

    /// Bucket of the S3 backend
    #[serde(default)]
    pub bucket: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root_dir: defaults::root_dir(),
            bucket: None,
        }
    }
}

/// Run notification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Incoming webhook receiving `{"text": ...}` messages
    #[serde(default)]
    pub webhook_url: Option<String>,
}

mod defaults {
    use std::path::PathBuf;

    use crate::models::ScopeFilter;

    // Crawler defaults
    pub fn base_url() -> String {
        "http://www.infocare.co.kr/".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/84.0.4147.135 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        500
    }
    pub fn charset() -> String {
        "euc-kr".into()
    }
    pub fn crawl_scope() -> ScopeFilter {
        ScopeFilter {
            sido: "서울".into(),
            gugun: "강남구".into(),
            dong: "개포동".into(),
            usage_category: "집합건물".into(),
            usage_subtype: "아파트".into(),
        }
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay() -> u64 {
        2_000
    }
    pub fn max_delay() -> u64 {
        10_000
    }

    // Store defaults
    pub fn database_path() -> PathBuf {
        PathBuf::from("storage/auction.db")
    }
    pub fn run_id() -> String {
        "latest".into()
    }

    // Storage defaults
    pub fn root_dir() -> PathBuf {
        PathBuf::from("storage/archive")
    }
}
