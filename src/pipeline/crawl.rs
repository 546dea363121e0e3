// src/pipeline/crawl.rs

//! Region/usage tree traversal and page archival.

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{
    Config, CrawlerLog, LeafKey, RegionLevel, RunCounters, ScopeMatcher, SearchSummary,
};
use crate::services::{
    AuctionSource, Notifier, RegionCatalog, StatisticsExtractor, sanitize_statistics_page,
};
use crate::storage::{ArchiveLayout, ArchiveStorage};

const HTML: &str = "text/html";
const JSON: &str = "application/json";

/// What a completed crawl produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub run_id: String,
    pub counters: RunCounters,
    pub log_key: String,
}

/// Depth-first walk of the sido → gugun → dong → category → subtype tree.
///
/// Every level frame goes through [`TraversalEngine::visit_level`], which
/// counts the frame as a failed region before re-raising any error from that
/// level or below. The first error aborts the whole traversal.
pub struct TraversalEngine<'a> {
    source: &'a dyn AuctionSource,
    storage: &'a dyn ArchiveStorage,
    catalog: RegionCatalog,
    extractor: StatisticsExtractor,
    scope: ScopeMatcher,
    layout: ArchiveLayout,
    counters: RunCounters,
}

impl<'a> TraversalEngine<'a> {
    pub fn new(
        config: &Config,
        source: &'a dyn AuctionSource,
        storage: &'a dyn ArchiveStorage,
        layout: ArchiveLayout,
    ) -> Result<Self> {
        Ok(Self {
            source,
            storage,
            catalog: RegionCatalog::new(config.selectors.clone()),
            extractor: StatisticsExtractor::new(config.selectors.clone())?,
            scope: config.crawler.scope.compile()?,
            layout,
            counters: RunCounters::default(),
        })
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Log in, walk the tree, and log out whatever the walk returned.
    pub async fn crawl(&mut self) -> Result<()> {
        self.source.login().await?;

        let mut parents = Vec::with_capacity(RegionLevel::ALL.len());
        let walked = self.visit_level(RegionLevel::Sido, &mut parents).await;
        let logged_out = self.source.logout().await;

        match (walked, logged_out) {
            (Err(err), Err(logout_err)) => {
                log::error!("Logout after failed traversal also failed: {}", logout_err);
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(()), logged_out) => logged_out,
        }
    }

    /// Crawl, write the run log and announce start and completion.
    pub async fn run(&mut self, run_by: &str, notifier: &dyn Notifier) -> Result<CrawlOutcome> {
        let run_id = self.layout.run_id();
        notifier
            .send(&format!(
                "TIME_STAMP: {}\nCrawl started ({}, {})",
                run_id,
                self.layout.environment().as_str(),
                run_by
            ))
            .await?;

        self.crawl().await?;
        let log_key = self.write_run_log(run_by).await?;

        let report = self.counters.report();
        notifier
            .send(&format!(
                "Crawl complete\nTIME_STAMP: {}\n\nstatistics:\n{}",
                run_id,
                report.render()
            ))
            .await?;

        Ok(CrawlOutcome {
            run_id,
            counters: self.counters,
            log_key,
        })
    }

    /// Error-counting layer around one level frame.
    async fn visit_level(&mut self, level: RegionLevel, parents: &mut Vec<String>) -> Result<()> {
        let result = self.walk_level(level, parents).await;
        if let Err(err) = &result {
            self.counters.failed.region_count += 1;
            self.counters.total.region_count += 1;
            log::error!(
                "{} frame failed under [{}]: {}",
                level,
                parents.join(" / "),
                err
            );
        }
        result
    }

    async fn walk_level(&mut self, level: RegionLevel, parents: &mut Vec<String>) -> Result<()> {
        let page = self.source.fetch_options_page(level, parents).await?;
        let options = self.catalog.options(level, &page)?;

        for option in options {
            if !self.scope.matches(level, &option.name) {
                log::debug!("Skipping {} {} (out of scope)", level, option.name);
                continue;
            }

            parents.push(option.name);
            let result = match level.next() {
                Some(next) => Box::pin(self.visit_level(next, parents)).await,
                None => self.visit_leaf(parents).await,
            };
            parents.pop();
            result?;
        }

        // One region is one dong + usage category, closed once all its subtypes are done.
        if level.is_leaf() {
            self.counters.total.region_count += 1;
        }
        Ok(())
    }

    async fn visit_leaf(&mut self, path: &[String]) -> Result<()> {
        let leaf = LeafKey::from_path(path)
            .ok_or_else(|| AppError::validation(format!("incomplete leaf path {path:?}")))?;

        log::info!(
            "Crawling statistics sido={} gugun={} dong={} usage={}/{}",
            leaf.sido,
            leaf.gugun,
            leaf.dong,
            leaf.usage_category,
            leaf.usage_subtype
        );
        let page = self.source.fetch_statistics_page(&leaf).await?;
        let summary = self.extractor.summary(&page)?;

        let key = self.layout.statistics_key(&leaf);
        let clean = sanitize_statistics_page(&page);
        if let Err(err) = self.storage.write(&key, clean.as_bytes(), HTML).await {
            self.counters.failed.statistics_count += 1;
            log::error!("Archiving {} failed: {}", key, err);
            return Err(err);
        }
        self.counters.total.statistics_count += 1;

        if summary.bids_count > 0 {
            if let Err(err) = self.archive_bids(&leaf, &summary).await {
                self.counters.failed.bids_count += 1;
                log::error!("Bid list of {} failed: {}", leaf, err);
                return Err(err);
            }
            self.counters.total.bids_count += 1;
        }
        Ok(())
    }

    async fn archive_bids(&self, leaf: &LeafKey, summary: &SearchSummary) -> Result<()> {
        log::info!("Crawling {} bids of {}", summary.bids_count, leaf);
        let page = self.source.fetch_bid_page(leaf, summary).await?;
        self.storage
            .write(&self.layout.bid_key(leaf), page.as_bytes(), HTML)
            .await
    }

    async fn write_run_log(&self, run_by: &str) -> Result<String> {
        let log = CrawlerLog {
            time_stamp: self.layout.run_id(),
            run_by: run_by.to_string(),
            finish_time_stamp: Utc::now().timestamp().to_string(),
            total_statistics: self.counters.total,
        };
        let key = self.layout.crawler_log_key();
        self.storage
            .write(&key, &serde_json::to_vec_pretty(&log)?, JSON)
            .await?;
        log::info!("Run log written to {}", key);
        Ok(key)
    }
}

/// Run one crawl into `storage` with a fresh run layout.
pub async fn run_crawler(
    config: &Config,
    source: &dyn AuctionSource,
    storage: &dyn ArchiveStorage,
    notifier: &dyn Notifier,
    run_by: &str,
) -> Result<CrawlOutcome> {
    let layout = ArchiveLayout::start_now(config.environment);
    log::info!("Crawl run {} under {}", layout.run_id(), layout.run_prefix());

    let mut engine = TraversalEngine::new(config, source, storage, layout)?;
    let outcome = engine.run(run_by, notifier).await?;

    log::info!("{}", outcome.counters.report().render());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use regex::Regex;

    use super::*;
    use crate::models::{CrawlCounters, Environment, ScopeFilter};
    use crate::pipeline::fixtures::{PageState, bid_page, options_page, statistics_page};
    use crate::services::RecordingNotifier;
    use crate::storage::MemoryStorage;

    /// Serves canned pages and records every call.
    #[derive(Default)]
    struct FakeSource {
        options: HashMap<(RegionLevel, Vec<String>), String>,
        statistics: HashMap<LeafKey, String>,
        bids: HashMap<LeafKey, String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn with_options(mut self, level: RegionLevel, parents: &[&str], options: &[&str]) -> Self {
            let select = crate::models::PageSelectors::default()
                .select_for(level)
                .trim_start_matches("select[name=")
                .trim_end_matches(']')
                .to_string();
            self.options.insert(
                (level, parents.iter().map(|s| s.to_string()).collect()),
                options_page(&select, options),
            );
            self
        }
    }

    #[async_trait]
    impl AuctionSource for FakeSource {
        async fn login(&self) -> Result<()> {
            self.record("login".into());
            Ok(())
        }

        async fn logout(&self) -> Result<()> {
            self.record("logout".into());
            Ok(())
        }

        async fn fetch_options_page(&self, level: RegionLevel, parents: &[String]) -> Result<String> {
            self.record(format!("{level}:{}", parents.join("/")));
            self.options
                .get(&(level, parents.to_vec()))
                .cloned()
                .ok_or_else(|| AppError::Response {
                    status: 500,
                    message: format!("no {level} page"),
                })
        }

        async fn fetch_statistics_page(&self, leaf: &LeafKey) -> Result<String> {
            self.record(format!("statistics:{leaf}"));
            self.statistics
                .get(leaf)
                .cloned()
                .ok_or_else(|| AppError::parse("no statistics page"))
        }

        async fn fetch_bid_page(&self, leaf: &LeafKey, _summary: &SearchSummary) -> Result<String> {
            self.record(format!("bid:{leaf}"));
            self.bids
                .get(leaf)
                .cloned()
                .ok_or_else(|| AppError::parse("no bid page"))
        }
    }

    fn leaf(dong: &str, subtype: &str) -> LeafKey {
        LeafKey::from_path(&[
            "서울".into(),
            "강남구".into(),
            dong.into(),
            "집합건물".into(),
            subtype.into(),
        ])
        .unwrap()
    }

    fn stats_page(dong: &str, subtype: &str, bids_count: u64) -> String {
        statistics_page(&PageState {
            sido: "서울",
            guguns: &["강남구"],
            gugun: "강남구",
            dongs: &["개포동", "대치동"],
            dong,
            category: "집합건물",
            subtype,
            year_counts: [10, 5, 2],
            bids_count,
        })
    }

    /// 서울 / 강남구 / {개포동, 대치동} / 집합건물 / {아파트, 오피스텔}.
    fn gangnam() -> FakeSource {
        let mut source = FakeSource::default()
            .with_options(RegionLevel::Sido, &[], &["부산", "서울"])
            .with_options(RegionLevel::Gugun, &["서울"], &["강남구", "강동구"])
            .with_options(RegionLevel::Dong, &["서울", "강남구"], &["개포동", "대치동"]);
        for dong in ["개포동", "대치동"] {
            source = source
                .with_options(RegionLevel::UsageCategory, &["서울", "강남구", dong], &["집합건물", "토지"])
                .with_options(
                    RegionLevel::UsageSubtype,
                    &["서울", "강남구", dong, "집합건물"],
                    &["아파트", "오피스텔"],
                );
            for subtype in ["아파트", "오피스텔"] {
                let bids = if dong == "개포동" && subtype == "아파트" { 2 } else { 0 };
                source
                    .statistics
                    .insert(leaf(dong, subtype), stats_page(dong, subtype, bids));
            }
        }
        source.bids.insert(
            leaf("개포동", "아파트"),
            bid_page(&[("2020타경1", "개포동 1", "2020.08.03")]),
        );
        source
    }

    fn config(scope: ScopeFilter) -> Config {
        let mut config = Config::default();
        config.crawler.scope = scope;
        config
    }

    fn gangnam_scope() -> ScopeFilter {
        ScopeFilter {
            sido: "서울".into(),
            gugun: "강남".into(),
            dong: "".into(),
            usage_category: "집합".into(),
            usage_subtype: "".into(),
        }
    }

    fn layout() -> ArchiveLayout {
        ArchiveLayout::from_timestamp(Environment::Test, 1_596_384_000).unwrap()
    }

    #[tokio::test]
    async fn visits_only_matching_options() {
        let source = gangnam();
        let storage = MemoryStorage::new();
        let mut engine =
            TraversalEngine::new(&config(gangnam_scope()), &source, &storage, layout()).unwrap();

        engine.crawl().await.unwrap();

        let calls = source.calls();
        assert!(!calls.iter().any(|c| c.contains("부산") || c.contains("강동구")));
        assert!(!calls.iter().any(|c| c.contains("토지")));
        assert_eq!(calls.iter().filter(|c| c.starts_with("statistics:")).count(), 4);
        assert_eq!(calls.first().map(String::as_str), Some("login"));
        assert_eq!(calls.last().map(String::as_str), Some("logout"));
    }

    #[tokio::test]
    async fn archives_pages_and_counts_regions() {
        let source = gangnam();
        let storage = MemoryStorage::new();
        let mut engine =
            TraversalEngine::new(&config(gangnam_scope()), &source, &storage, layout()).unwrap();

        engine.crawl().await.unwrap();

        let counters = engine.counters();
        assert_eq!(counters.total.region_count, 2);
        assert_eq!(counters.total.statistics_count, 4);
        assert_eq!(counters.total.bids_count, 1);
        assert_eq!(counters.failed, CrawlCounters::default());

        let keys = storage.keys();
        assert_eq!(keys.len(), 5);
        assert!(keys.contains(&layout().bid_key(&leaf("개포동", "아파트"))));

        let archived = storage
            .read(&layout().statistics_key(&leaf("대치동", "오피스텔")))
            .await
            .unwrap();
        assert!(!String::from_utf8(archived).unwrap().contains("top.location.href"));
    }

    #[tokio::test]
    async fn subtype_filter_is_search_not_anchor() {
        let source = gangnam();
        let storage = MemoryStorage::new();
        let scope = ScopeFilter {
            dong: "포".into(),
            usage_subtype: "텔".into(),
            ..gangnam_scope()
        };
        let mut engine = TraversalEngine::new(&config(scope), &source, &storage, layout()).unwrap();

        engine.crawl().await.unwrap();

        let statistics: Vec<String> = source
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("statistics:"))
            .collect();
        assert_eq!(statistics, vec![format!("statistics:{}", leaf("개포동", "오피스텔"))]);
    }

    #[tokio::test]
    async fn failure_aborts_and_counts_every_frame() {
        let mut source = gangnam();
        source.statistics.remove(&leaf("대치동", "아파트"));
        let storage = MemoryStorage::new();
        let mut engine =
            TraversalEngine::new(&config(gangnam_scope()), &source, &storage, layout()).unwrap();

        let err = engine.crawl().await.unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));

        let counters = engine.counters();
        // 개포동 completed; the failure crossed all five level frames.
        assert_eq!(counters.failed.region_count, 5);
        assert_eq!(
            counters.total.region_count,
            counters.failed.region_count + 1
        );
        assert_eq!(counters.total.statistics_count, 2);

        let calls = source.calls();
        assert_eq!(calls.last().map(String::as_str), Some("logout"));
        assert!(!calls.contains(&format!("statistics:{}", leaf("대치동", "오피스텔"))));
    }

    #[tokio::test]
    async fn bid_failure_counts_bids() {
        let mut source = gangnam();
        source.bids.clear();
        let storage = MemoryStorage::new();
        let mut engine =
            TraversalEngine::new(&config(gangnam_scope()), &source, &storage, layout()).unwrap();

        assert!(engine.crawl().await.is_err());
        let counters = engine.counters();
        assert_eq!(counters.failed.bids_count, 1);
        assert_eq!(counters.total.bids_count, 0);
        assert_eq!(counters.total.statistics_count, 1);
    }

    #[tokio::test]
    async fn placeholder_only_list_is_scope_discovery_error() {
        let source = gangnam().with_options(RegionLevel::Gugun, &["서울"], &[]);
        let storage = MemoryStorage::new();
        let mut engine =
            TraversalEngine::new(&config(gangnam_scope()), &source, &storage, layout()).unwrap();

        let err = engine.crawl().await.unwrap_err();
        assert!(matches!(err, AppError::ScopeDiscovery(_)));
        assert_eq!(engine.counters().failed.region_count, 2);
        assert_eq!(source.calls().last().map(String::as_str), Some("logout"));
    }

    #[tokio::test]
    async fn run_writes_log_and_notifies() {
        let source = gangnam();
        let storage = MemoryStorage::new();
        let notifier = RecordingNotifier::default();
        let mut engine =
            TraversalEngine::new(&config(gangnam_scope()), &source, &storage, layout()).unwrap();

        let outcome = engine.run("SCHEDULER", &notifier).await.unwrap();

        assert_eq!(outcome.run_id, "1596384000");
        assert_eq!(
            outcome.log_key,
            "test/2020/08/03/1596384000/crawler-log/1596384000.json"
        );
        let log: CrawlerLog =
            serde_json::from_slice(&storage.read(&outcome.log_key).await.unwrap()).unwrap();
        assert_eq!(log.run_by, "SCHEDULER");
        assert_eq!(log.total_statistics.statistics_count, 4);

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("statistics_count\ntotal: 4\nfail: 0\n0.0%"));
    }

    #[tokio::test]
    async fn failed_run_sends_no_summary() {
        let mut source = gangnam();
        source.statistics.clear();
        let storage = MemoryStorage::new();
        let notifier = RecordingNotifier::default();
        let mut engine =
            TraversalEngine::new(&config(gangnam_scope()), &source, &storage, layout()).unwrap();

        assert!(engine.run("MANUAL", &notifier).await.is_err());
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
        assert!(storage.keys().is_empty());
    }

    /// Sido dropdown with or without the leading empty-value entry.
    fn sido_page(names: &[String], placeholder: bool) -> String {
        let mut html = String::from(r#"<html><body><select name="addr_do">"#);
        if placeholder {
            html.push_str(r#"<option value="">시/도</option>"#);
        }
        for name in names {
            html.push_str(&format!(r#"<option value="{name}">{name}</option>"#));
        }
        html.push_str("</select></body></html>");
        html
    }

    /// One gugun/dong/category/subtype chain under every sido in `names`.
    fn single_chain_tree(names: &[String], placeholder: bool) -> FakeSource {
        let mut source = FakeSource::default();
        source
            .options
            .insert((RegionLevel::Sido, Vec::new()), sido_page(names, placeholder));

        for sido in names {
            let sido = sido.as_str();
            source = source
                .with_options(RegionLevel::Gugun, &[sido], &["구"])
                .with_options(RegionLevel::Dong, &[sido, "구"], &["동"])
                .with_options(RegionLevel::UsageCategory, &[sido, "구", "동"], &["건물"])
                .with_options(RegionLevel::UsageSubtype, &[sido, "구", "동", "건물"], &["용도"]);
            source.statistics.insert(
                chain_leaf(sido),
                statistics_page(&PageState {
                    sido,
                    guguns: &["구"],
                    gugun: "구",
                    dongs: &["동"],
                    dong: "동",
                    category: "건물",
                    subtype: "용도",
                    year_counts: [1, 1, 1],
                    bids_count: 0,
                }),
            );
        }
        source
    }

    fn chain_leaf(sido: &str) -> LeafKey {
        LeafKey::from_path(&[
            sido.into(),
            "구".into(),
            "동".into(),
            "건물".into(),
            "용도".into(),
        ])
        .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn recurses_into_exactly_the_search_matches(
            names in prop::collection::btree_set("[가나다ab]{1,3}", 1..6),
            pattern in prop::sample::select(vec!["", "가", "^나", "다$", "a|b", "[가a]", "x"]),
            placeholder in any::<bool>(),
            break_last in any::<bool>(),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let regex = Regex::new(pattern).unwrap();
            let expected: Vec<String> =
                names.iter().filter(|name| regex.is_match(name)).cloned().collect();

            let mut source = single_chain_tree(&names, placeholder);
            if break_last {
                if let Some(last) = expected.last() {
                    source.statistics.remove(&chain_leaf(last));
                }
            }

            let scope = ScopeFilter {
                sido: pattern.to_string(),
                ..ScopeFilter::match_all()
            };
            let storage = MemoryStorage::new();
            let mut engine =
                TraversalEngine::new(&config(scope), &source, &storage, layout()).unwrap();
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = runtime.block_on(engine.crawl());

            let visited: Vec<String> = source
                .calls()
                .iter()
                .filter_map(|call| call.strip_prefix("gugun:"))
                .map(str::to_string)
                .collect();
            prop_assert!(!visited.iter().any(String::is_empty));
            prop_assert_eq!(&visited, &expected);
            prop_assert_eq!(result.is_err(), break_last && !expected.is_empty());

            let counters = engine.counters();
            prop_assert_eq!(
                counters.total.region_count,
                counters.failed.region_count + counters.total.statistics_count
            );
        }
    }
}
