// src/models/mod.rs

//! Domain models shared by the crawler and the store replay.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod bid;
mod config;
mod counters;
mod region;
mod selectors;
mod statistics;

// Re-export all public types
pub use bid::{BidKey, BidRecord, BidRow, UsagePair};
pub use config::{
    Config, CrawlerConfig, Environment, NotifyConfig, RetryConfig, StorageBackend, StorageConfig,
    StoreConfig,
};
pub use counters::{CrawlCounters, CrawlerLog, FailureReport, RunCounters, failure_percentage_report};
pub use region::{LeafKey, RegionLevel, RegionOption, ScopeFilter, ScopeMatcher};
pub use selectors::PageSelectors;
pub use statistics::{
    AggregationLevel, LevelStatistics, SearchSummary, StatisticsSnapshot, WindowStatistics,
    levels_to_persist,
};
