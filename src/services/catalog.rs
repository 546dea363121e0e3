// src/services/catalog.rs

//! Reads the selectable options of the next traversal level from a page.

use scraper::Html;

use crate::error::{AppError, Result};
use crate::models::{PageSelectors, RegionLevel, RegionOption};
use crate::utils::html::{dropdown_options, without_placeholder};

/// Parses dropdown pages into [`RegionOption`] lists.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    selectors: PageSelectors,
}

impl RegionCatalog {
    pub fn new(selectors: PageSelectors) -> Self {
        Self { selectors }
    }

    /// Options offered for `level` on `html`.
    ///
    /// A leading option with an empty value is a placeholder and is dropped.
    /// An empty list after that is a [`AppError::ScopeDiscovery`].
    pub fn options(&self, level: RegionLevel, html: &str) -> Result<Vec<RegionOption>> {
        let document = Html::parse_document(html);
        let select = self.selectors.select_for(level);

        let raw = dropdown_options(&document, select)?
            .ok_or_else(|| AppError::parse(format!("cannot find the {level} dropdown ({select})")))?;

        let options: Vec<RegionOption> = without_placeholder(raw)
            .into_iter()
            .map(|o| RegionOption::new(o.value, o.label))
            .collect();

        if options.is_empty() {
            return Err(AppError::scope_discovery(format!(
                "cannot find a {level} list"
            )));
        }
        Ok(options)
    }
}
