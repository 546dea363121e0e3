//! Relational store for replayed statistics and bid cases.
//!
//! The replay only depends on the [`RelationalStore`] contract: idempotent
//! create-or-update by natural key, an active-bid query and a bulk expiry.

mod sqlite;

use chrono::{DateTime, FixedOffset};

use crate::error::Result;
use crate::models::{AggregationLevel, BidRecord, BidRow, LevelStatistics, StatisticsSnapshot, UsagePair};

pub use sqlite::SqliteStore;

/// The single region a statistics row aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionRef {
    Sido(i64),
    Gugun(i64),
    Dong(i64),
}

impl RegionRef {
    pub fn level(self) -> AggregationLevel {
        match self {
            RegionRef::Sido(_) => AggregationLevel::Sido,
            RegionRef::Gugun(_) => AggregationLevel::Gugun,
            RegionRef::Dong(_) => AggregationLevel::Dong,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            RegionRef::Sido(id) | RegionRef::Gugun(id) | RegionRef::Dong(id) => id,
        }
    }
}

/// One statistics row, keyed by window, usage pair and region.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRow {
    pub start_date: String,
    pub end_date: String,
    pub usage: UsagePair,
    pub region: RegionRef,
    pub stats: LevelStatistics,
}

impl StatisticsRow {
    /// Row of `snapshot` at the level of `region`.
    pub fn from_snapshot(snapshot: &StatisticsSnapshot, region: RegionRef) -> Self {
        Self {
            start_date: snapshot.start_date.clone(),
            end_date: snapshot.end_date.clone(),
            usage: snapshot.usage(),
            region,
            stats: *snapshot.level(region.level()),
        }
    }
}

/// Create-or-update and query contract of the replay target.
///
/// Every mutation is its own atomic unit: committed on success, rolled back
/// and propagated on failure.
pub trait RelationalStore {
    fn upsert_sido(&mut self, name: &str) -> Result<i64>;

    fn upsert_gugun(&mut self, name: &str, sido_id: i64) -> Result<i64>;

    fn upsert_dong(&mut self, name: &str, gugun_id: i64) -> Result<i64>;

    fn upsert_statistics(&mut self, row: &StatisticsRow) -> Result<i64>;

    /// Insert a case or refresh its price fields. Never touches `expired_date`.
    fn upsert_bid(&mut self, dong_id: i64, usage: &UsagePair, bid: &BidRecord) -> Result<i64>;

    /// Cases of `dong_id` under `usage` whose `expired_date` is unset.
    fn active_bids(&self, dong_id: i64, usage: &UsagePair) -> Result<Vec<BidRow>>;

    /// Stamp `storing_date` on the given still-active cases. Returns rows changed.
    fn expire_bids(&mut self, ids: &[i64], storing_date: DateTime<FixedOffset>) -> Result<usize>;
}
