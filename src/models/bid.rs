// src/models/bid.rs

//! Auction bid cases and their natural key.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// Usage category and subtype of a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePair {
    pub category: String,
    pub subtype: String,
}

impl UsagePair {
    pub fn new(category: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subtype: subtype.into(),
        }
    }
}

/// One auction case row of a bid-listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRecord {
    pub case_number: String,
    pub address: String,
    pub bid_date: NaiveDate,
    pub estimated_price: i64,
    pub lowest_price: i64,
    pub success_price: i64,
    /// Sale price relative to appraisal, percent
    pub success_bid_rate: f64,
}

impl BidRecord {
    /// Natural key of this case under the given usage pair.
    pub fn key(&self, usage: &UsagePair) -> BidKey {
        BidKey {
            case_number: self.case_number.clone(),
            address: self.address.clone(),
            bid_date: self.bid_date,
            usage: usage.clone(),
        }
    }
}

/// Identity of a bid case across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BidKey {
    pub case_number: String,
    pub address: String,
    pub bid_date: NaiveDate,
    pub usage: UsagePair,
}

/// A persisted bid case.
#[derive(Debug, Clone, PartialEq)]
pub struct BidRow {
    pub id: i64,
    pub dong_id: i64,
    pub case_number: String,
    pub address: String,
    pub bid_date: NaiveDate,
    pub usage: UsagePair,
    pub estimated_price: i64,
    pub lowest_price: i64,
    pub success_price: i64,
    pub success_bid_rate: f64,
    /// `None` while the case is still listed upstream
    pub expired_date: Option<DateTime<FixedOffset>>,
}

impl BidRow {
    pub fn key(&self) -> BidKey {
        BidKey {
            case_number: self.case_number.clone(),
            address: self.address.clone(),
            bid_date: self.bid_date,
            usage: self.usage.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.expired_date.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_includes_usage_pair() {
        let record = BidRecord {
            case_number: "2020타경1234".into(),
            address: "서울 강남구 개포동 12".into(),
            bid_date: NaiveDate::from_ymd_opt(2020, 8, 3).unwrap(),
            estimated_price: 1_000_000_000,
            lowest_price: 800_000_000,
            success_price: 950_000_000,
            success_bid_rate: 95.0,
        };
        let apartment = record.key(&UsagePair::new("집합건물", "아파트"));
        let officetel = record.key(&UsagePair::new("집합건물", "오피스텔"));

        assert_ne!(apartment, officetel);
        assert_eq!(apartment, record.key(&UsagePair::new("집합건물", "아파트")));
    }
}
