// src/models/region.rs

//! Region/usage tree levels, selectable options and scope filters.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// One level of the five-level region/usage tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    /// Province (시/도)
    Sido,
    /// District (시/군/구)
    Gugun,
    /// Neighborhood (읍/면/동)
    Dong,
    /// Usage category (용도 대분류)
    UsageCategory,
    /// Usage subtype (용도 소분류), the leaf level
    UsageSubtype,
}

impl RegionLevel {
    /// All levels, root first.
    pub const ALL: [RegionLevel; 5] = [
        RegionLevel::Sido,
        RegionLevel::Gugun,
        RegionLevel::Dong,
        RegionLevel::UsageCategory,
        RegionLevel::UsageSubtype,
    ];

    /// Zero-based depth in the tree; also the number of parent keys a level needs.
    pub fn depth(self) -> usize {
        self as usize
    }

    /// Level for a given number of parent selections.
    pub fn from_depth(depth: usize) -> Option<Self> {
        Self::ALL.get(depth).copied()
    }

    /// The level below this one, `None` at the leaf.
    pub fn next(self) -> Option<Self> {
        Self::from_depth(self.depth() + 1)
    }

    pub fn is_leaf(self) -> bool {
        self == RegionLevel::UsageSubtype
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegionLevel::Sido => "sido",
            RegionLevel::Gugun => "gugun",
            RegionLevel::Dong => "dong",
            RegionLevel::UsageCategory => "usage_category",
            RegionLevel::UsageSubtype => "usage_subtype",
        }
    }
}

impl fmt::Display for RegionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable entry at a given tree level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOption {
    /// Option value, used as the name of the node
    pub name: String,
    /// Visible option text
    pub raw_label: String,
}

impl RegionOption {
    pub fn new(name: impl Into<String>, raw_label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_label: raw_label.into(),
        }
    }
}

/// Regular expressions restricting which options are traversed, one per level.
///
/// Matching uses search semantics: a name is in scope when the pattern
/// matches anywhere inside it. An empty pattern matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    #[serde(default)]
    pub sido: String,
    #[serde(default)]
    pub gugun: String,
    #[serde(default)]
    pub dong: String,
    #[serde(default)]
    pub usage_category: String,
    #[serde(default)]
    pub usage_subtype: String,
}

impl ScopeFilter {
    /// A filter that lets every option through.
    pub fn match_all() -> Self {
        Self {
            sido: String::new(),
            gugun: String::new(),
            dong: String::new(),
            usage_category: String::new(),
            usage_subtype: String::new(),
        }
    }

    pub fn pattern(&self, level: RegionLevel) -> &str {
        match level {
            RegionLevel::Sido => &self.sido,
            RegionLevel::Gugun => &self.gugun,
            RegionLevel::Dong => &self.dong,
            RegionLevel::UsageCategory => &self.usage_category,
            RegionLevel::UsageSubtype => &self.usage_subtype,
        }
    }

    /// Compile all five patterns.
    pub fn compile(&self) -> Result<ScopeMatcher> {
        let mut patterns = Vec::with_capacity(RegionLevel::ALL.len());
        for level in RegionLevel::ALL {
            let pattern = self.pattern(level);
            let regex = Regex::new(pattern).map_err(|e| {
                AppError::config(format!("invalid {level} scope pattern '{pattern}': {e}"))
            })?;
            patterns.push(regex);
        }
        Ok(ScopeMatcher { patterns })
    }
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

/// Compiled form of a [`ScopeFilter`].
#[derive(Debug, Clone)]
pub struct ScopeMatcher {
    patterns: Vec<Regex>,
}

impl ScopeMatcher {
    /// Whether `name` is in scope at `level`.
    pub fn matches(&self, level: RegionLevel, name: &str) -> bool {
        self.patterns[level.depth()].is_match(name)
    }

    /// The source text of the pattern for `level`.
    pub fn pattern(&self, level: RegionLevel) -> &str {
        self.patterns[level.depth()].as_str()
    }
}

/// A fully resolved (sido, gugun, dong, usage category, usage subtype) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafKey {
    pub sido: String,
    pub gugun: String,
    pub dong: String,
    pub usage_category: String,
    pub usage_subtype: String,
}

impl LeafKey {
    /// Build from a chain of five parent selections, root first.
    pub fn from_path(path: &[String]) -> Option<Self> {
        match path {
            [sido, gugun, dong, category, subtype] => Some(Self {
                sido: sido.clone(),
                gugun: gugun.clone(),
                dong: dong.clone(),
                usage_category: category.clone(),
                usage_subtype: subtype.clone(),
            }),
            _ => None,
        }
    }

    /// Segments in tree order.
    pub fn segments(&self) -> [&str; 5] {
        [
            &self.sido,
            &self.gugun,
            &self.dong,
            &self.usage_category,
            &self.usage_subtype,
        ]
    }
}

impl fmt::Display for LeafKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("/"))
    }
}
