// src/pipeline/reconcile.rs

//! Replay of one archived run into the relational store.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::{AppError, Result};
use crate::models::{
    AggregationLevel, BidKey, BidRecord, BidRow, Config, Environment, RegionLevel, ScopeMatcher,
    StatisticsSnapshot, UsagePair,
};
use crate::services::{Notifier, StatisticsExtractor};
use crate::storage::{
    ArchiveLayout, ArchiveStorage, BID_DIR, RunSelector, child_name, data_prefix, kst, read_text,
};
use crate::store::{RegionRef, RelationalStore, SqliteStore, StatisticsRow};

const STATISTICS_SUFFIX: &str = "_statistics.html";

/// Date segments between the environment and the run prefix: year, month, day, run start.
const RUN_DEPTH: usize = 4;

/// Row counts of one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub statistics_files: u64,
    pub statistics_rows: u64,
    /// Rows left out because the level's 12-month count was zero
    pub skipped_rows: u64,
    pub bid_files: u64,
    pub bids_upserted: u64,
    pub bids_expired: u64,
}

impl ReconcileSummary {
    pub fn render(&self) -> String {
        format!(
            "statistics files: {}\nstatistics rows: {} (skipped {})\nbid files: {}\nbids upserted: {}\nbids expired: {}",
            self.statistics_files,
            self.statistics_rows,
            self.skipped_rows,
            self.bid_files,
            self.bids_upserted,
            self.bids_expired
        )
    }
}

/// Ids of the sido and gugun nodes persisted so far in this replay.
///
/// A parent is always cached before any of its children is looked up; a miss
/// means the archive did not contain the parent's first page.
#[derive(Debug, Default)]
pub struct RegionIdCache {
    sido: HashMap<String, i64>,
    gugun: HashMap<(String, String), i64>,
}

impl RegionIdCache {
    pub fn sido(&self, sido: &str) -> Result<i64> {
        self.sido
            .get(sido)
            .copied()
            .ok_or_else(|| AppError::scope_not_found(format!("sido '{sido}' was never persisted")))
    }

    pub fn gugun(&self, sido: &str, gugun: &str) -> Result<i64> {
        self.gugun
            .get(&(sido.to_string(), gugun.to_string()))
            .copied()
            .ok_or_else(|| {
                AppError::scope_not_found(format!("gugun '{sido} {gugun}' was never persisted"))
            })
    }

    fn insert_sido(&mut self, sido: &str, id: i64) {
        self.sido.insert(sido.to_string(), id);
    }

    fn insert_gugun(&mut self, sido: &str, gugun: &str, id: i64) {
        self.gugun.insert((sido.to_string(), gugun.to_string()), id);
    }
}

/// Active rows with no natural-key match in `bids`.
pub fn stale_bid_ids(active: &[BidRow], bids: &[BidRecord], usage: &UsagePair) -> Vec<i64> {
    let present: HashSet<BidKey> = bids.iter().map(|bid| bid.key(usage)).collect();
    active
        .iter()
        .filter(|row| row.is_active() && !present.contains(&row.key()))
        .map(|row| row.id)
        .collect()
}

/// Prefix of the run picked by `selector` (`{env}/YYYY/MM/DD/{ts}/`).
///
/// `Latest` descends into the greatest child at each date level.
pub async fn resolve_run_prefix(
    storage: &dyn ArchiveStorage,
    environment: Environment,
    selector: RunSelector,
) -> Result<String> {
    if let RunSelector::Explicit(timestamp) = selector {
        return Ok(ArchiveLayout::from_timestamp(environment, timestamp)?.run_prefix());
    }

    let mut prefix = format!("{}/", environment.as_str());
    for _ in 0..RUN_DEPTH {
        let listing = storage.list(&prefix).await?;
        let newest = listing
            .prefixes
            .iter()
            .max_by(|a, b| {
                let (a, b) = (child_name(&prefix, a), child_name(&prefix, b));
                match (a.parse::<i64>(), b.parse::<i64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => a.cmp(b),
                }
            })
            .cloned()
            .ok_or_else(|| AppError::missing_archive(format!("no runs under {prefix}")))?;
        prefix = newest;
    }
    Ok(prefix)
}

/// Walks an archived run and upserts what it finds.
///
/// Higher-level statistics rows are written only by the first page of each
/// sido and gugun, as told by [`StatisticsSnapshot::levels_to_persist`].
pub struct ReconciliationEngine<'a> {
    storage: &'a dyn ArchiveStorage,
    store: &'a mut dyn RelationalStore,
    extractor: StatisticsExtractor,
    scope: ScopeMatcher,
    storing_date: DateTime<FixedOffset>,
    summary: ReconcileSummary,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        config: &Config,
        storage: &'a dyn ArchiveStorage,
        store: &'a mut dyn RelationalStore,
        storing_date: DateTime<FixedOffset>,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            store,
            extractor: StatisticsExtractor::new(config.selectors.clone())?,
            scope: config.store.scope.compile()?,
            storing_date,
            summary: ReconcileSummary::default(),
        })
    }

    pub fn summary(&self) -> ReconcileSummary {
        self.summary
    }

    /// Replay every in-scope leaf under `run_prefix`.
    pub async fn reconcile(&mut self, run_prefix: &str) -> Result<ReconcileSummary> {
        let mut cache = RegionIdCache::default();
        self.visit_prefix(&data_prefix(run_prefix), RegionLevel::Sido, &mut cache)
            .await?;
        Ok(self.summary)
    }

    async fn visit_prefix(
        &mut self,
        prefix: &str,
        level: RegionLevel,
        cache: &mut RegionIdCache,
    ) -> Result<()> {
        let listing = self.storage.list(prefix).await?;
        if listing.prefixes.is_empty() {
            return Err(AppError::missing_archive(format!("no {level} entries under {prefix}")));
        }

        let mut matched = 0usize;
        for child in &listing.prefixes {
            let name = child_name(prefix, child);
            if !self.scope.matches(level, name) {
                continue;
            }
            matched += 1;

            match level.next() {
                Some(next) => Box::pin(self.visit_prefix(child, next, cache)).await?,
                None => self.visit_leaf(child, cache).await?,
            }
        }

        // Only the region levels must match something.
        if matched == 0 && level.depth() < RegionLevel::UsageCategory.depth() {
            return Err(AppError::scope_not_found(format!(
                "no {level} under {prefix} matches '{}'",
                self.scope.pattern(level)
            )));
        }
        Ok(())
    }

    async fn visit_leaf(&mut self, prefix: &str, cache: &mut RegionIdCache) -> Result<()> {
        let listing = self.storage.list(prefix).await?;
        let pages: Vec<&String> = listing
            .objects
            .iter()
            .filter(|key| key.ends_with(STATISTICS_SUFFIX))
            .collect();
        if pages.is_empty() {
            return Err(AppError::missing_archive(format!("no statistics page under {prefix}")));
        }

        let bid_prefix = format!("{prefix}{BID_DIR}");
        let has_bids = listing.prefixes.iter().any(|p| *p == bid_prefix);

        for key in pages {
            let html = read_text(self.storage, key).await?;
            let snapshot = self.extractor.snapshot(&html)?;
            self.summary.statistics_files += 1;

            let dong_id = self.persist_snapshot(&snapshot, cache)?;
            let usage = snapshot.usage();
            if has_bids {
                self.visit_bids(&bid_prefix, dong_id, &usage).await?;
            } else {
                self.reconcile_bids(dong_id, &usage, &[])?;
            }
        }
        Ok(())
    }

    /// Upsert the region nodes and statistics rows of one page. Returns the dong id.
    fn persist_snapshot(
        &mut self,
        snapshot: &StatisticsSnapshot,
        cache: &mut RegionIdCache,
    ) -> Result<i64> {
        let levels = snapshot.levels_to_persist();

        if levels.contains(&AggregationLevel::Sido) {
            let sido_id = self.store.upsert_sido(&snapshot.sido_name)?;
            self.write_statistics(snapshot, RegionRef::Sido(sido_id))?;
            cache.insert_sido(&snapshot.sido_name, sido_id);
        }

        if levels.contains(&AggregationLevel::Gugun) {
            let sido_id = cache.sido(&snapshot.sido_name)?;
            let gugun_id = self.store.upsert_gugun(&snapshot.gugun_name, sido_id)?;
            self.write_statistics(snapshot, RegionRef::Gugun(gugun_id))?;
            cache.insert_gugun(&snapshot.sido_name, &snapshot.gugun_name, gugun_id);
        }

        let gugun_id = cache.gugun(&snapshot.sido_name, &snapshot.gugun_name)?;
        let dong_id = self.store.upsert_dong(&snapshot.dong_name, gugun_id)?;
        self.write_statistics(snapshot, RegionRef::Dong(dong_id))?;

        log::debug!(
            "Persisted {} {} {} {}/{} ({:?})",
            snapshot.sido_name,
            snapshot.gugun_name,
            snapshot.dong_name,
            snapshot.usage_category,
            snapshot.usage_subtype,
            levels
        );
        Ok(dong_id)
    }

    fn write_statistics(&mut self, snapshot: &StatisticsSnapshot, region: RegionRef) -> Result<()> {
        if snapshot.level(region.level()).year.bid_count == 0 {
            self.summary.skipped_rows += 1;
            return Ok(());
        }
        self.store
            .upsert_statistics(&StatisticsRow::from_snapshot(snapshot, region))?;
        self.summary.statistics_rows += 1;
        Ok(())
    }

    async fn visit_bids(&mut self, prefix: &str, dong_id: i64, usage: &UsagePair) -> Result<()> {
        let listing = self.storage.list(prefix).await?;
        if listing.objects.is_empty() {
            return Err(AppError::missing_archive(format!("no bid pages under {prefix}")));
        }

        for key in &listing.objects {
            let html = read_text(self.storage, key).await?;
            let bids = self.extractor.bids(&html)?;
            self.summary.bid_files += 1;

            self.reconcile_bids(dong_id, usage, &bids)?;
            for bid in &bids {
                self.store.upsert_bid(dong_id, usage, bid)?;
                self.summary.bids_upserted += 1;
            }
        }
        Ok(())
    }

    /// Expire the active cases of `dong_id` and `usage` missing from `bids`.
    fn reconcile_bids(&mut self, dong_id: i64, usage: &UsagePair, bids: &[BidRecord]) -> Result<()> {
        let active = self.store.active_bids(dong_id, usage)?;
        let stale = stale_bid_ids(&active, bids, usage);
        if stale.is_empty() {
            return Ok(());
        }

        let expired = self.store.expire_bids(&stale, self.storing_date)?;
        self.summary.bids_expired += expired as u64;
        log::info!(
            "Expired {} of {} active bids (dong {}, {}/{})",
            expired,
            active.len(),
            dong_id,
            usage.category,
            usage.subtype
        );
        Ok(())
    }
}

/// Replay the selected run of `config.environment` into `store`.
///
/// The local environment starts from an empty schema.
pub async fn run_store(
    config: &Config,
    storage: &dyn ArchiveStorage,
    store: &mut SqliteStore,
    notifier: &dyn Notifier,
    selector: RunSelector,
    run_by: &str,
) -> Result<ReconcileSummary> {
    if config.environment == Environment::Local {
        store.reset()?;
    } else {
        store.init()?;
    }

    let run_prefix = resolve_run_prefix(storage, config.environment, selector).await?;
    log::info!("Replaying {}", run_prefix);
    notifier
        .send(&format!(
            "Store started ({}, {})\nRUN: {}",
            config.environment.as_str(),
            run_by,
            run_prefix
        ))
        .await?;

    let storing_date = Utc::now().with_timezone(&kst());
    let mut engine = ReconciliationEngine::new(config, storage, store, storing_date)?;
    let summary = engine.reconcile(&run_prefix).await?;

    notifier
        .send(&format!("Store complete\nRUN: {}\n\n{}", run_prefix, summary.render()))
        .await?;
    Ok(summary)
}
