//! SQLite implementation of the relational store.

use std::path::Path;

use chrono::{DateTime, FixedOffset};
use rusqlite::{Connection, OptionalExtension, Params, Row, ToSql, params};

use crate::error::Result;
use crate::models::{
    AggregationLevel, BidRecord, BidRow, LevelStatistics, UsagePair, WindowStatistics,
};
use crate::store::{RegionRef, RelationalStore, StatisticsRow};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sido (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS gugun (
    id      INTEGER PRIMARY KEY,
    sido_id INTEGER NOT NULL REFERENCES sido(id),
    name    TEXT NOT NULL,
    UNIQUE (sido_id, name)
);

CREATE TABLE IF NOT EXISTS dong (
    id       INTEGER PRIMARY KEY,
    gugun_id INTEGER NOT NULL REFERENCES gugun(id),
    name     TEXT NOT NULL,
    UNIQUE (gugun_id, name)
);

CREATE TABLE IF NOT EXISTS statistics (
    id                          INTEGER PRIMARY KEY,
    start_date                  TEXT NOT NULL,
    end_date                    TEXT NOT NULL,
    usage_category              TEXT NOT NULL,
    usage_subtype               TEXT NOT NULL,
    region_level                TEXT NOT NULL,
    region_id                   INTEGER NOT NULL,
    sido_id                     INTEGER REFERENCES sido(id),
    gugun_id                    INTEGER REFERENCES gugun(id),
    dong_id                     INTEGER REFERENCES dong(id),
    year_avg_price_rate         REAL NOT NULL,
    year_avg_bid_rate           REAL NOT NULL,
    year_bid_count              INTEGER NOT NULL,
    six_month_avg_price_rate    REAL NOT NULL,
    six_month_avg_bid_rate      REAL NOT NULL,
    six_month_bid_count         INTEGER NOT NULL,
    three_month_avg_price_rate  REAL NOT NULL,
    three_month_avg_bid_rate    REAL NOT NULL,
    three_month_bid_count       INTEGER NOT NULL,
    UNIQUE (start_date, end_date, usage_category, usage_subtype, region_level, region_id),
    CHECK ((sido_id IS NOT NULL) + (gugun_id IS NOT NULL) + (dong_id IS NOT NULL) = 1)
);

CREATE TABLE IF NOT EXISTS bid (
    id                INTEGER PRIMARY KEY,
    dong_id           INTEGER NOT NULL REFERENCES dong(id),
    case_number       TEXT NOT NULL,
    address           TEXT NOT NULL,
    bid_date          TEXT NOT NULL,
    usage_category    TEXT NOT NULL,
    usage_subtype     TEXT NOT NULL,
    estimated_price   INTEGER NOT NULL,
    lowest_price      INTEGER NOT NULL,
    success_price     INTEGER NOT NULL,
    success_bid_rate  REAL NOT NULL,
    expired_date      TEXT,
    UNIQUE (case_number, address, bid_date, usage_category, usage_subtype)
);

CREATE INDEX IF NOT EXISTS idx_bid_active
    ON bid (dong_id, usage_category, usage_subtype)
    WHERE expired_date IS NULL;
";

const BID_COLUMNS: &str = "id, dong_id, case_number, address, bid_date, usage_category, \
     usage_subtype, estimated_price, lowest_price, success_price, success_bid_rate, expired_date";

/// SQLite-backed [`RelationalStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create missing tables and indexes.
    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Drop every table and recreate the schema.
    pub fn reset(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DROP TABLE IF EXISTS bid;
             DROP TABLE IF EXISTS statistics;
             DROP TABLE IF EXISTS dong;
             DROP TABLE IF EXISTS gugun;
             DROP TABLE IF EXISTS sido;",
        )?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;
        log::info!("Relational store schema reset");
        Ok(())
    }

    /// Number of region nodes stored at `level`.
    pub fn region_count(&self, level: AggregationLevel) -> Result<i64> {
        let sql = format!("SELECT COUNT(1) FROM {}", level.as_str());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Every statistics row with its id, in insertion order.
    pub fn statistics_rows(&self) -> Result<Vec<(i64, StatisticsRow)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_date, end_date, usage_category, usage_subtype,
                    sido_id, gugun_id, dong_id,
                    year_avg_price_rate, year_avg_bid_rate, year_bid_count,
                    six_month_avg_price_rate, six_month_avg_bid_rate, six_month_bid_count,
                    three_month_avg_price_rate, three_month_avg_bid_rate, three_month_bid_count
             FROM statistics ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let sido_id: Option<i64> = row.get(5)?;
            let gugun_id: Option<i64> = row.get(6)?;
            let dong_id: Option<i64> = row.get(7)?;
            let region = match (sido_id, gugun_id, dong_id) {
                (Some(id), _, _) => RegionRef::Sido(id),
                (_, Some(id), _) => RegionRef::Gugun(id),
                (_, _, Some(id)) => RegionRef::Dong(id),
                _ => return Err(rusqlite::Error::InvalidColumnType(
                    5,
                    "sido_id".into(),
                    rusqlite::types::Type::Null,
                )),
            };
            let window = |offset: usize| -> rusqlite::Result<WindowStatistics> {
                Ok(WindowStatistics {
                    avg_price_rate: row.get(offset)?,
                    avg_bid_rate: row.get(offset + 1)?,
                    bid_count: row.get(offset + 2)?,
                })
            };
            Ok((
                id,
                StatisticsRow {
                    start_date: row.get(1)?,
                    end_date: row.get(2)?,
                    usage: UsagePair::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?),
                    region,
                    stats: LevelStatistics {
                        year: window(8)?,
                        six_month: window(11)?,
                        three_month: window(14)?,
                    },
                },
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every case of a dong, expired or not.
    pub fn bids_for_dong(&self, dong_id: i64) -> Result<Vec<BidRow>> {
        let sql = format!("SELECT {BID_COLUMNS} FROM bid WHERE dong_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([dong_id], bid_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Upsert a region node and return its id.
    fn upsert_region<P: Params>(&mut self, sql: &str, params: P) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let id = tx.query_row(sql, params, |row| row.get(0))?;
        tx.commit()?;
        Ok(id)
    }
}

fn bid_row(row: &Row<'_>) -> rusqlite::Result<BidRow> {
    Ok(BidRow {
        id: row.get(0)?,
        dong_id: row.get(1)?,
        case_number: row.get(2)?,
        address: row.get(3)?,
        bid_date: row.get(4)?,
        usage: UsagePair::new(row.get::<_, String>(5)?, row.get::<_, String>(6)?),
        estimated_price: row.get(7)?,
        lowest_price: row.get(8)?,
        success_price: row.get(9)?,
        success_bid_rate: row.get(10)?,
        expired_date: row.get(11)?,
    })
}

impl RelationalStore for SqliteStore {
    fn upsert_sido(&mut self, name: &str) -> Result<i64> {
        self.upsert_region(
            "INSERT INTO sido (name) VALUES (?1)
             ON CONFLICT(name) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![name],
        )
    }

    fn upsert_gugun(&mut self, name: &str, sido_id: i64) -> Result<i64> {
        self.upsert_region(
            "INSERT INTO gugun (sido_id, name) VALUES (?1, ?2)
             ON CONFLICT(sido_id, name) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![sido_id, name],
        )
    }

    fn upsert_dong(&mut self, name: &str, gugun_id: i64) -> Result<i64> {
        self.upsert_region(
            "INSERT INTO dong (gugun_id, name) VALUES (?1, ?2)
             ON CONFLICT(gugun_id, name) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![gugun_id, name],
        )
    }

    fn upsert_statistics(&mut self, row: &StatisticsRow) -> Result<i64> {
        let (sido_id, gugun_id, dong_id) = match row.region {
            RegionRef::Sido(id) => (Some(id), None, None),
            RegionRef::Gugun(id) => (None, Some(id), None),
            RegionRef::Dong(id) => (None, None, Some(id)),
        };
        let s = &row.stats;

        let tx = self.conn.transaction()?;
        let id = tx.query_row(
            "INSERT INTO statistics (
               start_date, end_date, usage_category, usage_subtype,
               region_level, region_id, sido_id, gugun_id, dong_id,
               year_avg_price_rate, year_avg_bid_rate, year_bid_count,
               six_month_avg_price_rate, six_month_avg_bid_rate, six_month_bid_count,
               three_month_avg_price_rate, three_month_avg_bid_rate, three_month_bid_count
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(start_date, end_date, usage_category, usage_subtype, region_level, region_id)
             DO UPDATE SET
               year_avg_price_rate = excluded.year_avg_price_rate,
               year_avg_bid_rate = excluded.year_avg_bid_rate,
               year_bid_count = excluded.year_bid_count,
               six_month_avg_price_rate = excluded.six_month_avg_price_rate,
               six_month_avg_bid_rate = excluded.six_month_avg_bid_rate,
               six_month_bid_count = excluded.six_month_bid_count,
               three_month_avg_price_rate = excluded.three_month_avg_price_rate,
               three_month_avg_bid_rate = excluded.three_month_avg_bid_rate,
               three_month_bid_count = excluded.three_month_bid_count
             RETURNING id",
            params![
                row.start_date,
                row.end_date,
                row.usage.category,
                row.usage.subtype,
                row.region.level().as_str(),
                row.region.id(),
                sido_id,
                gugun_id,
                dong_id,
                s.year.avg_price_rate,
                s.year.avg_bid_rate,
                s.year.bid_count,
                s.six_month.avg_price_rate,
                s.six_month.avg_bid_rate,
                s.six_month.bid_count,
                s.three_month.avg_price_rate,
                s.three_month.avg_bid_rate,
                s.three_month.bid_count,
            ],
            |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn upsert_bid(&mut self, dong_id: i64, usage: &UsagePair, bid: &BidRecord) -> Result<i64> {
        let tx = self.conn.transaction()?;
        let id: Option<i64> = tx.query_row(
            "INSERT INTO bid (
               dong_id, case_number, address, bid_date, usage_category, usage_subtype,
               estimated_price, lowest_price, success_price, success_bid_rate
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(case_number, address, bid_date, usage_category, usage_subtype)
             DO UPDATE SET
               dong_id = excluded.dong_id,
               estimated_price = excluded.estimated_price,
               lowest_price = excluded.lowest_price,
               success_price = excluded.success_price,
               success_bid_rate = excluded.success_bid_rate
             WHERE bid.expired_date IS NULL
             RETURNING id",
            params![
                dong_id,
                bid.case_number,
                bid.address,
                bid.bid_date,
                usage.category,
                usage.subtype,
                bid.estimated_price,
                bid.lowest_price,
                bid.success_price,
                bid.success_bid_rate,
            ],
            |r| r.get(0),
        )
        .optional()?;

        // An expired match is left as is and returns no row.
        let id = match id {
            Some(id) => id,
            None => tx.query_row(
                "SELECT id FROM bid
                 WHERE case_number = ?1 AND address = ?2 AND bid_date = ?3
                   AND usage_category = ?4 AND usage_subtype = ?5",
                params![
                    bid.case_number,
                    bid.address,
                    bid.bid_date,
                    usage.category,
                    usage.subtype,
                ],
                |r| r.get(0),
            )?,
        };
        tx.commit()?;
        Ok(id)
    }

    fn active_bids(&self, dong_id: i64, usage: &UsagePair) -> Result<Vec<BidRow>> {
        let sql = format!(
            "SELECT {BID_COLUMNS} FROM bid
             WHERE dong_id = ?1 AND usage_category = ?2 AND usage_subtype = ?3
               AND expired_date IS NULL
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![dong_id, usage.category, usage.subtype], bid_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn expire_bids(&mut self, ids: &[i64], storing_date: DateTime<FixedOffset>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders: Vec<String> = (0..ids.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "UPDATE bid SET expired_date = ?1
             WHERE expired_date IS NULL AND id IN ({})",
            placeholders.join(", ")
        );

        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(ids.len() + 1);
        values.push(&storing_date);
        values.extend(ids.iter().map(|id| id as &dyn ToSql));

        let tx = self.conn.transaction()?;
        let changed = tx.execute(&sql, values.as_slice())?;
        tx.commit()?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::storage::kst;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.init().unwrap();
        store
    }

    fn apartment() -> UsagePair {
        UsagePair::new("집합건물", "아파트")
    }

    fn bid(case_number: &str) -> BidRecord {
        BidRecord {
            case_number: case_number.into(),
            address: format!("서울 강남구 개포동 {case_number}"),
            bid_date: NaiveDate::from_ymd_opt(2020, 8, 3).unwrap(),
            estimated_price: 1_000_000_000,
            lowest_price: 800_000_000,
            success_price: 900_000_000,
            success_bid_rate: 90.0,
        }
    }

    fn dong(store: &mut SqliteStore) -> i64 {
        let sido = store.upsert_sido("서울").unwrap();
        let gugun = store.upsert_gugun("강남구", sido).unwrap();
        store.upsert_dong("개포동", gugun).unwrap()
    }

    #[test]
    fn region_upserts_are_idempotent() {
        let mut store = store();
        let a = store.upsert_sido("서울").unwrap();
        let b = store.upsert_sido("서울").unwrap();
        assert_eq!(a, b);

        let g1 = store.upsert_gugun("중구", a).unwrap();
        let other = store.upsert_sido("부산").unwrap();
        let g2 = store.upsert_gugun("중구", other).unwrap();
        assert_ne!(g1, g2);
        assert_eq!(store.region_count(AggregationLevel::Gugun).unwrap(), 2);
    }

    #[test]
    fn statistics_upsert_updates_in_place() {
        let mut store = store();
        let sido = store.upsert_sido("경기").unwrap();
        let mut row = StatisticsRow {
            start_date: "201909".into(),
            end_date: "202008".into(),
            usage: apartment(),
            region: RegionRef::Sido(sido),
            stats: LevelStatistics::default(),
        };
        row.stats.year.bid_count = 5;

        let first = store.upsert_statistics(&row).unwrap();
        row.stats.year.bid_count = 6;
        let second = store.upsert_statistics(&row).unwrap();

        assert_eq!(first, second);
        let rows = store.statistics_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.stats.year.bid_count, 6);
        assert_eq!(rows[0].1.region, RegionRef::Sido(sido));
    }

    #[test]
    fn same_id_at_different_levels_are_distinct_rows() {
        let mut store = store();
        let sido = store.upsert_sido("경기").unwrap();
        let gugun = store.upsert_gugun("고양시", sido).unwrap();
        assert_eq!(sido, gugun);

        for region in [RegionRef::Sido(sido), RegionRef::Gugun(gugun)] {
            store
                .upsert_statistics(&StatisticsRow {
                    start_date: "201909".into(),
                    end_date: "202008".into(),
                    usage: apartment(),
                    region,
                    stats: LevelStatistics::default(),
                })
                .unwrap();
        }
        assert_eq!(store.statistics_rows().unwrap().len(), 2);
    }

    #[test]
    fn expire_only_touches_active_rows() {
        let mut store = store();
        let dong_id = dong(&mut store);
        let a = store.upsert_bid(dong_id, &apartment(), &bid("A")).unwrap();
        store.upsert_bid(dong_id, &apartment(), &bid("B")).unwrap();

        let first = kst().with_ymd_and_hms(2020, 8, 3, 9, 0, 0).unwrap();
        let later = kst().with_ymd_and_hms(2020, 9, 3, 9, 0, 0).unwrap();

        assert_eq!(store.expire_bids(&[a], first).unwrap(), 1);
        assert_eq!(store.expire_bids(&[a], later).unwrap(), 0);

        let rows = store.bids_for_dong(dong_id).unwrap();
        assert_eq!(rows[0].expired_date, Some(first));
        assert!(rows[1].is_active());
        assert_eq!(store.active_bids(dong_id, &apartment()).unwrap().len(), 1);
    }

    #[test]
    fn upsert_leaves_expired_bid_untouched() {
        let mut store = store();
        let dong_id = dong(&mut store);
        let id = store.upsert_bid(dong_id, &apartment(), &bid("A")).unwrap();
        let stamp = kst().with_ymd_and_hms(2020, 8, 3, 9, 0, 0).unwrap();
        store.expire_bids(&[id], stamp).unwrap();

        let mut again = bid("A");
        again.success_price = 910_000_000;
        assert_eq!(store.upsert_bid(dong_id, &apartment(), &again).unwrap(), id);

        let rows = store.bids_for_dong(dong_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].success_price, bid("A").success_price);
        assert_eq!(rows[0].expired_date, Some(stamp));
        assert!(!rows[0].is_active());
    }

    #[test]
    fn active_bids_are_scoped_to_usage_pair() {
        let mut store = store();
        let dong_id = dong(&mut store);
        store.upsert_bid(dong_id, &apartment(), &bid("A")).unwrap();
        store
            .upsert_bid(dong_id, &UsagePair::new("집합건물", "오피스텔"), &bid("A"))
            .unwrap();

        let active = store.active_bids(dong_id, &apartment()).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].usage, apartment());
    }

    #[test]
    fn reset_clears_rows() {
        let mut store = store();
        store.upsert_sido("서울").unwrap();
        store.reset().unwrap();
        assert_eq!(store.region_count(AggregationLevel::Sido).unwrap(), 0);
    }
}
