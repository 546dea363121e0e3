//! Archive key layout for one crawl run.

use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeZone, Utc};

use crate::error::{AppError, Result};
use crate::models::{Environment, LeafKey};

const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Korea Standard Time, the zone run dates are taken in.
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Keys of everything archived by the run started at `run_started`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    environment: Environment,
    run_started: DateTime<FixedOffset>,
}

impl ArchiveLayout {
    pub fn new(environment: Environment, run_started: DateTime<FixedOffset>) -> Self {
        Self {
            environment,
            run_started: run_started.with_timezone(&kst()),
        }
    }

    /// Layout of a run starting now.
    pub fn start_now(environment: Environment) -> Self {
        Self::new(environment, Utc::now().with_timezone(&kst()))
    }

    /// Layout of the run that started at unix second `timestamp`.
    pub fn from_timestamp(environment: Environment, timestamp: i64) -> Result<Self> {
        let started = kst()
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(|| AppError::config(format!("invalid run timestamp {timestamp}")))?;
        Ok(Self::new(environment, started))
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn run_started(&self) -> DateTime<FixedOffset> {
        self.run_started
    }

    /// Run id: run start in unix seconds.
    pub fn run_id(&self) -> String {
        self.run_started.timestamp().to_string()
    }

    /// `{env}/{yyyy}/{mm}/{dd}/{run_id}/`
    pub fn run_prefix(&self) -> String {
        format!(
            "{}/{}/{:02}/{:02}/{}/",
            self.environment.as_str(),
            self.run_started.year(),
            self.run_started.month(),
            self.run_started.day(),
            self.run_id()
        )
    }

    pub fn data_prefix(&self) -> String {
        data_prefix(&self.run_prefix())
    }

    /// Directory of one leaf under `data/`.
    pub fn leaf_prefix(&self, leaf: &LeafKey) -> String {
        format!("{}{}/", self.data_prefix(), leaf.segments().join("/"))
    }

    pub fn statistics_key(&self, leaf: &LeafKey) -> String {
        format!(
            "{}{}_statistics.html",
            self.leaf_prefix(leaf),
            file_stem(leaf)
        )
    }

    pub fn bid_key(&self, leaf: &LeafKey) -> String {
        format!(
            "{}{}{}_bid.html",
            self.leaf_prefix(leaf),
            BID_DIR,
            file_stem(leaf)
        )
    }

    pub fn crawler_log_key(&self) -> String {
        format!("{}crawler-log/{}.json", self.run_prefix(), self.run_id())
    }
}

/// Name of the bid sub-prefix under a leaf, with its trailing slash.
pub const BID_DIR: &str = "bid/";

/// `data/` prefix under a run prefix.
pub fn data_prefix(run_prefix: &str) -> String {
    format!("{run_prefix}data/")
}

fn file_stem(leaf: &LeafKey) -> String {
    leaf.segments().join("_")
}

/// Last segment of a child key of `parent`, without the trailing slash.
pub fn child_name<'a>(parent: &str, child: &'a str) -> &'a str {
    child
        .strip_prefix(parent)
        .unwrap_or(child)
        .trim_end_matches('/')
        .trim()
}

/// Which run the store replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSelector {
    /// The newest run of the environment
    Latest,
    /// The run started at this unix second
    Explicit(i64),
}

impl RunSelector {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        value
            .parse()
            .map(Self::Explicit)
            .map_err(|_| AppError::config(format!("run id must be 'latest' or a unix timestamp, got '{value}'")))
    }
}
