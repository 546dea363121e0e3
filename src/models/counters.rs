// src/models/counters.rs

//! Crawl counters, failure report and the persisted run log.

use serde::{Deserialize, Serialize};

/// Success or failure tallies for one crawl run.
///
/// Counters only ever grow; they are read once at the end of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCounters {
    /// Neighborhood + usage category frames
    pub region_count: u64,
    /// Archived statistics pages
    pub statistics_count: u64,
    /// Archived bid-listing pages
    pub bids_count: u64,
}

/// The `total` and `failed` counter pair kept by the traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub total: CrawlCounters,
    pub failed: CrawlCounters,
}

impl RunCounters {
    pub fn report(&self) -> FailureReport {
        failure_percentage_report(&self.total, &self.failed)
    }
}

/// Per-counter `total / fail / percentage` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub region_count: String,
    pub statistics_count: String,
    pub bids_count: String,
}

impl FailureReport {
    /// Render the report as a multi-section message.
    pub fn render(&self) -> String {
        format!(
            "region_count\n{}\n\nstatistics_count\n{}\n\nbids_count\n{}",
            self.region_count, self.statistics_count, self.bids_count
        )
    }
}

/// Build the failure percentage report for every counter.
///
/// A zero total leaves the percentage line out instead of dividing by zero.
pub fn failure_percentage_report(total: &CrawlCounters, failed: &CrawlCounters) -> FailureReport {
    FailureReport {
        region_count: percentage_line(total.region_count, failed.region_count),
        statistics_count: percentage_line(total.statistics_count, failed.statistics_count),
        bids_count: percentage_line(total.bids_count, failed.bids_count),
    }
}

fn percentage_line(total: u64, failed: u64) -> String {
    if total == 0 {
        return format!("total: {total}\nfail: {failed}\n");
    }
    let percent = 100.0 * failed as f64 / total as f64;
    format!("total: {total}\nfail: {failed}\n{percent:?}%")
}

/// Run log written next to the archived pages of one crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerLog {
    /// Run start, unix seconds
    pub time_stamp: String,
    pub run_by: String,
    /// Run end, unix seconds
    pub finish_time_stamp: String,
    pub total_statistics: CrawlCounters,
}
