//! Pipeline entry points.
//!
//! - `run_crawler`: Walk the upstream region/usage tree and archive raw pages
//! - `run_store`: Replay one archived run into the relational store

pub mod crawl;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod fixtures;

pub use crawl::{CrawlOutcome, TraversalEngine, run_crawler};
pub use reconcile::{
    ReconcileSummary, ReconciliationEngine, RegionIdCache, resolve_run_prefix, run_store,
    stale_bid_ids,
};
