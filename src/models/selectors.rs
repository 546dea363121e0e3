// src/models/selectors.rs

//! CSS selectors for reading the upstream statistics and bid pages.

use serde::{Deserialize, Serialize};

use crate::models::RegionLevel;

/// CSS selectors and patterns used by the page parsers.
///
/// Every field has a default matching the live upstream pages, so a config
/// file only needs to override what changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelectors {
    /// Dropdown for provinces
    #[serde(default = "defaults::sido_select")]
    pub sido_select: String,

    /// Dropdown for districts
    #[serde(default = "defaults::gugun_select")]
    pub gugun_select: String,

    /// Dropdown for neighborhoods
    #[serde(default = "defaults::dong_select")]
    pub dong_select: String,

    /// Dropdown for usage categories
    #[serde(default = "defaults::usage_category_select")]
    pub usage_category_select: String,

    /// Dropdown for usage subtypes
    #[serde(default = "defaults::usage_subtype_select")]
    pub usage_subtype_select: String,

    /// Statistics table
    #[serde(default = "defaults::statistics_table")]
    pub statistics_table: String,

    /// Rows of the statistics table, in sido, gugun, dong order
    #[serde(default = "defaults::statistics_row")]
    pub statistics_row: String,

    /// Value cells of one statistics row (12, 6, 3 months × price rate, bid rate, count)
    #[serde(default = "defaults::statistics_cell")]
    pub statistics_cell: String,

    /// Cells holding the sold-case count text
    #[serde(default = "defaults::bids_count_cell")]
    pub bids_count_cell: String,

    /// Pattern capturing the sold-case count
    #[serde(default = "defaults::bids_count_pattern")]
    pub bids_count_pattern: String,

    /// "More" link carrying the statistics window and category code
    #[serde(default = "defaults::more_link")]
    pub more_link: String,

    /// Rows of the bid-listing table
    #[serde(default = "defaults::bid_row")]
    pub bid_row: String,

    /// Cells of one bid row
    #[serde(default = "defaults::bid_cell")]
    pub bid_cell: String,
}

impl PageSelectors {
    /// Dropdown selector for a tree level.
    pub fn select_for(&self, level: RegionLevel) -> &str {
        match level {
            RegionLevel::Sido => &self.sido_select,
            RegionLevel::Gugun => &self.gugun_select,
            RegionLevel::Dong => &self.dong_select,
            RegionLevel::UsageCategory => &self.usage_category_select,
            RegionLevel::UsageSubtype => &self.usage_subtype_select,
        }
    }
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            sido_select: defaults::sido_select(),
            gugun_select: defaults::gugun_select(),
            dong_select: defaults::dong_select(),
            usage_category_select: defaults::usage_category_select(),
            usage_subtype_select: defaults::usage_subtype_select(),
            statistics_table: defaults::statistics_table(),
            statistics_row: defaults::statistics_row(),
            statistics_cell: defaults::statistics_cell(),
            bids_count_cell: defaults::bids_count_cell(),
            bids_count_pattern: defaults::bids_count_pattern(),
            more_link: defaults::more_link(),
            bid_row: defaults::bid_row(),
            bid_cell: defaults::bid_cell(),
        }
    }
}

mod defaults {
    pub fn sido_select() -> String {
        "select[name=addr_do]".into()
    }
    pub fn gugun_select() -> String {
        "select[name=addr_si]".into()
    }
    pub fn dong_select() -> String {
        "select[name=addr_dong]".into()
    }
    pub fn usage_category_select() -> String {
        "select[name=yong_set]".into()
    }
    pub fn usage_subtype_select() -> String {
        "select[name=yong_desc]".into()
    }
    pub fn statistics_table() -> String {
        "table.nakRateRep".into()
    }
    pub fn statistics_row() -> String {
        "tr.scale".into()
    }
    pub fn statistics_cell() -> String {
        "td.val".into()
    }
    pub fn bids_count_cell() -> String {
        "td.desc".into()
    }
    pub fn bids_count_pattern() -> String {
        r"낙찰건수:\s*([\d,]+)\s*건".into()
    }
    pub fn more_link() -> String {
        "a.noprint[href]".into()
    }
    pub fn bid_row() -> String {
        "table.nakExample tbody tr".into()
    }
    pub fn bid_cell() -> String {
        "td".into()
    }
}
