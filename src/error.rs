// src/error.rs

//! Unified error handling for the harvester and the store replay.
//!
//! Every variant is fatal to a run. The engines only add bookkeeping on the
//! way out (counter increments, logout) and then re-raise the error unchanged.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The upstream option list was empty after dropping the placeholder
    #[error("Scope discovery error: {0}")]
    ScopeDiscovery(String),

    /// An archived or fetched page is missing an expected element
    #[error("Parse error: {0}")]
    Parse(String),

    /// No discovered name matched a configured filter, or a parent id was not cached
    #[error("Scope not found: {0}")]
    ScopeNotFound(String),

    /// An expected archive prefix has no children
    #[error("Missing archive: {0}")]
    MissingArchive(String),

    /// Transient connectivity failure (retried before surfacing)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// HTTP request failed for a non-transient reason
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// Upstream answered with something other than the expected page
    #[error("Unexpected response ({status}): {message}")]
    Response { status: u16, message: String },

    /// Object storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Relational store failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Scope filter regex failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Network(err)
        } else {
            Self::Http(err)
        }
    }
}

impl AppError {
    /// Create a scope discovery error.
    pub fn scope_discovery(message: impl Into<String>) -> Self {
        Self::ScopeDiscovery(message.into())
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a scope-not-found error.
    pub fn scope_not_found(message: impl Into<String>) -> Self {
        Self::ScopeNotFound(message.into())
    }

    /// Create a missing-archive error.
    pub fn missing_archive(message: impl Into<String>) -> Self {
        Self::MissingArchive(message.into())
    }

    /// Create an object storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the retry layer may try the failed call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        assert!(!AppError::parse("no usage table").is_transient());
        assert!(!AppError::scope_discovery("empty").is_transient());
        assert!(
            !AppError::Response {
                status: 500,
                message: "boom".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn display_includes_context() {
        let err = AppError::missing_archive("local/2020/ has no children");
        assert_eq!(
            err.to_string(),
            "Missing archive: local/2020/ has no children"
        );
    }
}
