// src/models/statistics.rs

//! Parsed statistics pages.

use serde::{Deserialize, Serialize};

use crate::models::UsagePair;

/// Region level a statistics row aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationLevel {
    Sido,
    Gugun,
    Dong,
}

impl AggregationLevel {
    pub const ALL: [AggregationLevel; 3] = [
        AggregationLevel::Sido,
        AggregationLevel::Gugun,
        AggregationLevel::Dong,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregationLevel::Sido => "sido",
            AggregationLevel::Gugun => "gugun",
            AggregationLevel::Dong => "dong",
        }
    }
}

/// Averages and case count over one lookback window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    /// Average sale price relative to appraisal, percent
    pub avg_price_rate: f64,
    /// Average bidders per case
    pub avg_bid_rate: f64,
    pub bid_count: i64,
}

/// The 12/6/3-month windows for one region level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelStatistics {
    pub year: WindowStatistics,
    pub six_month: WindowStatistics,
    pub three_month: WindowStatistics,
}

/// One parsed statistics page.
///
/// `first_gugun_name` and `first_dong_name` hold index 0 of the gugun and dong
/// dropdowns, not the current selection. They are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub sido_name: String,
    pub gugun_name: String,
    pub dong_name: String,
    pub first_gugun_name: String,
    pub first_dong_name: String,
    pub usage_category: String,
    pub usage_subtype: String,
    /// Auction cases referenced by the page
    pub bids_count: u64,
    pub start_date: String,
    pub end_date: String,
    pub sido: LevelStatistics,
    pub gugun: LevelStatistics,
    pub dong: LevelStatistics,
}

impl StatisticsSnapshot {
    pub fn level(&self, level: AggregationLevel) -> &LevelStatistics {
        match level {
            AggregationLevel::Sido => &self.sido,
            AggregationLevel::Gugun => &self.gugun,
            AggregationLevel::Dong => &self.dong,
        }
    }

    pub fn usage(&self) -> UsagePair {
        UsagePair::new(&self.usage_category, &self.usage_subtype)
    }

    /// Whether the page is the first one rendered for a new `level`.
    ///
    /// A new sido shows the first gugun and the first dong; a new gugun shows
    /// its first dong. Every page carries its own dong.
    pub fn is_first_of_parent(&self, level: AggregationLevel) -> bool {
        match level {
            AggregationLevel::Sido => {
                self.gugun_name == self.first_gugun_name && self.dong_name == self.first_dong_name
            }
            AggregationLevel::Gugun => self.dong_name == self.first_dong_name,
            AggregationLevel::Dong => true,
        }
    }

    /// Levels whose rows this page must write, root first.
    pub fn levels_to_persist(&self) -> Vec<AggregationLevel> {
        AggregationLevel::ALL
            .into_iter()
            .filter(|level| self.is_first_of_parent(*level))
            .collect()
    }
}

/// Pure form of the new-level inference.
///
/// `gugun_is_first` compares the selected gugun with the first dropdown
/// entry, `dong_is_first` does the same for the dong.
pub fn levels_to_persist(gugun_is_first: bool, dong_is_first: bool) -> Vec<AggregationLevel> {
    match (gugun_is_first, dong_is_first) {
        (true, true) => AggregationLevel::ALL.to_vec(),
        (false, true) => vec![AggregationLevel::Gugun, AggregationLevel::Dong],
        (_, false) => vec![AggregationLevel::Dong],
    }
}

/// What the crawler needs from a statistics page before archiving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSummary {
    /// Number of sold cases shown on the page
    pub bids_count: u64,
    /// Window start (`YYYYMM`)
    pub term1: String,
    /// Window end (`YYYYMM`)
    pub term2: String,
    /// Upstream category code required by the bid-listing request
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(gugun: &str, first_gugun: &str, dong: &str, first_dong: &str) -> StatisticsSnapshot {
        StatisticsSnapshot {
            sido_name: "경기".into(),
            gugun_name: gugun.into(),
            dong_name: dong.into(),
            first_gugun_name: first_gugun.into(),
            first_dong_name: first_dong.into(),
            usage_category: "집합건물".into(),
            usage_subtype: "아파트".into(),
            bids_count: 0,
            start_date: "201909".into(),
            end_date: "202008".into(),
            sido: LevelStatistics::default(),
            gugun: LevelStatistics::default(),
            dong: LevelStatistics::default(),
        }
    }

    #[test]
    fn both_first_persists_every_level() {
        let s = snapshot("가평군", "가평군", "가평읍", "가평읍");
        assert_eq!(
            s.levels_to_persist(),
            vec![AggregationLevel::Sido, AggregationLevel::Gugun, AggregationLevel::Dong]
        );
    }

    #[test]
    fn first_dong_of_later_gugun_persists_gugun_and_dong() {
        let s = snapshot("고양시", "가평군", "대화동", "대화동");
        assert_eq!(
            s.levels_to_persist(),
            vec![AggregationLevel::Gugun, AggregationLevel::Dong]
        );
    }

    #[test]
    fn first_gugun_but_later_dong_persists_dong_only() {
        let s = snapshot("가평군", "가평군", "청평면", "가평읍");
        assert_eq!(s.levels_to_persist(), vec![AggregationLevel::Dong]);
        assert!(!s.is_first_of_parent(AggregationLevel::Sido));
    }

    #[test]
    fn later_gugun_and_later_dong_persists_dong_only() {
        let s = snapshot("고양시", "가평군", "행신동", "대화동");
        assert_eq!(s.levels_to_persist(), vec![AggregationLevel::Dong]);
        assert!(s.is_first_of_parent(AggregationLevel::Dong));
    }

    #[test]
    fn snapshot_inference_matches_pure_table() {
        for (gugun, dong) in [
            ("가평군", "가평읍"),
            ("고양시", "가평읍"),
            ("가평군", "청평면"),
            ("고양시", "청평면"),
        ] {
            let s = snapshot(gugun, "가평군", dong, "가평읍");
            assert_eq!(
                s.levels_to_persist(),
                levels_to_persist(gugun == "가평군", dong == "가평읍"),
                "{gugun} {dong}"
            );
        }
    }

    #[test]
    fn pure_inference_table() {
        assert_eq!(levels_to_persist(true, true).len(), 3);
        assert_eq!(levels_to_persist(false, true).len(), 2);
        assert_eq!(levels_to_persist(true, false), vec![AggregationLevel::Dong]);
        assert_eq!(levels_to_persist(false, false), vec![AggregationLevel::Dong]);
    }
}
