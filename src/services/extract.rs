// src/services/extract.rs

//! Statistics and bid-listing page parsing.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html};

use crate::error::{AppError, Result};
use crate::models::{
    BidRecord, LevelStatistics, PageSelectors, RegionLevel, SearchSummary, StatisticsSnapshot,
    WindowStatistics,
};
use crate::utils::html::{
    dropdown_options, element_text, parse_number, parse_selector, without_placeholder,
};

/// Script line on statistics pages that bounces offline viewers to the front page.
const REDIRECT_SNIPPET: &str = "top.location.href = '/main.asp';";

/// Value cells per statistics row: 3 windows × (price rate, bid rate, count).
const CELLS_PER_ROW: usize = 9;

/// Cells per bid row.
const CELLS_PER_BID: usize = 7;

/// Parses statistics and bid-listing pages.
#[derive(Debug, Clone)]
pub struct StatisticsExtractor {
    selectors: PageSelectors,
    bids_count_re: Regex,
}

impl StatisticsExtractor {
    pub fn new(selectors: PageSelectors) -> Result<Self> {
        let bids_count_re = Regex::new(&selectors.bids_count_pattern)?;
        Ok(Self {
            selectors,
            bids_count_re,
        })
    }

    /// Read the sold-case count, window and category code of a fresh page.
    pub fn summary(&self, html: &str) -> Result<SearchSummary> {
        let document = Html::parse_document(html);
        self.require_table(&document)?;
        let bids_count = self.bids_count(&document)?;
        let (term1, term2, category) = self.more_link_terms(&document)?;

        Ok(SearchSummary {
            bids_count,
            term1,
            term2,
            category,
        })
    }

    /// Parse an archived statistics page.
    pub fn snapshot(&self, html: &str) -> Result<StatisticsSnapshot> {
        let document = Html::parse_document(html);
        let table = self.require_table(&document)?;

        let (sido_name, _) = self.selection(&document, RegionLevel::Sido)?;
        let (gugun_name, first_gugun_name) = self.selection(&document, RegionLevel::Gugun)?;
        let (dong_name, first_dong_name) = self.selection(&document, RegionLevel::Dong)?;
        let (usage_category, _) = self.selection(&document, RegionLevel::UsageCategory)?;
        let (usage_subtype, _) = self.selection(&document, RegionLevel::UsageSubtype)?;

        let levels = self.level_rows(&table)?;
        let bids_count = self.bids_count(&document)?;
        let (start_date, end_date, _) = self.more_link_terms(&document)?;

        Ok(StatisticsSnapshot {
            sido_name,
            gugun_name,
            dong_name,
            first_gugun_name,
            first_dong_name,
            usage_category,
            usage_subtype,
            bids_count,
            start_date,
            end_date,
            sido: levels[0],
            gugun: levels[1],
            dong: levels[2],
        })
    }

    /// Parse a bid-listing page into its rows, in page order.
    ///
    /// Rows without the full set of cells (e.g. a "no results" row) are skipped.
    pub fn bids(&self, html: &str) -> Result<Vec<BidRecord>> {
        let document = Html::parse_document(html);
        let row_sel = parse_selector(&self.selectors.bid_row)?;
        let cell_sel = parse_selector(&self.selectors.bid_cell)?;

        let mut bids = Vec::new();
        for row in document.select(&row_sel) {
            let cells: Vec<String> = row.select(&cell_sel).map(|c| element_text(&c)).collect();
            if cells.len() < CELLS_PER_BID || cells[0].is_empty() {
                continue;
            }

            bids.push(BidRecord {
                case_number: cells[0].clone(),
                address: cells[1].clone(),
                bid_date: parse_bid_date(&cells[2])?,
                estimated_price: parse_price(&cells[3])?,
                lowest_price: parse_price(&cells[4])?,
                success_price: parse_price(&cells[5])?,
                success_bid_rate: parse_cell(&cells[6])?,
            });
        }
        Ok(bids)
    }

    fn require_table<'a>(&self, document: &'a Html) -> Result<ElementRef<'a>> {
        let table_sel = parse_selector(&self.selectors.statistics_table)?;
        document.select(&table_sel).next().ok_or_else(|| {
            AppError::parse(format!(
                "cannot find the usage table ({})",
                self.selectors.statistics_table
            ))
        })
    }

    /// Selected option and first offered option of the dropdown for `level`.
    fn selection(&self, document: &Html, level: RegionLevel) -> Result<(String, String)> {
        let select = self.selectors.select_for(level);
        let options = dropdown_options(document, select)?
            .map(without_placeholder)
            .ok_or_else(|| AppError::parse(format!("cannot find the {level} dropdown")))?;

        let first = options
            .first()
            .map(|o| o.value.clone())
            .ok_or_else(|| AppError::parse(format!("the {level} dropdown is empty")))?;
        let selected = options
            .iter()
            .find(|o| o.selected)
            .map(|o| o.value.clone())
            .ok_or_else(|| AppError::parse(format!("no {level} is selected")))?;

        Ok((selected, first))
    }

    fn level_rows(&self, table: &ElementRef<'_>) -> Result<[LevelStatistics; 3]> {
        let row_sel = parse_selector(&self.selectors.statistics_row)?;
        let cell_sel = parse_selector(&self.selectors.statistics_cell)?;

        let rows: Vec<LevelStatistics> = table
            .select(&row_sel)
            .map(|row| {
                let values: Vec<Option<f64>> =
                    row.select(&cell_sel).map(|c| parse_number(&element_text(&c))).collect();
                level_statistics(&values)
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                AppError::parse(format!(
                    "statistics rows need {CELLS_PER_ROW} value cells"
                ))
            })?;

        match rows.as_slice() {
            [sido, gugun, dong, ..] => Ok([*sido, *gugun, *dong]),
            _ => Err(AppError::parse(format!(
                "expected sido, gugun and dong statistics rows, found {}",
                rows.len()
            ))),
        }
    }

    fn bids_count(&self, document: &Html) -> Result<u64> {
        let cell_sel = parse_selector(&self.selectors.bids_count_cell)?;
        let mut count = 0;
        for cell in document.select(&cell_sel) {
            let text = element_text(&cell);
            if let Some(caps) = self.bids_count_re.captures(&text) {
                if let Some(n) = caps.get(1).and_then(|m| parse_number(m.as_str())) {
                    count = n as u64;
                }
            }
        }
        Ok(count)
    }

    /// `(term1, term2, category)` from the trailing arguments of the "more" link.
    fn more_link_terms(&self, document: &Html) -> Result<(String, String, String)> {
        let link_sel = parse_selector(&self.selectors.more_link)?;
        let href = document
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| AppError::parse("cannot find the bid list link"))?;

        let parts: Vec<String> = href
            .split(',')
            .map(|part| {
                part.trim()
                    .trim_end_matches(';')
                    .trim_end_matches(')')
                    .trim_matches(|c| c == '\'' || c == '"')
                    .trim()
                    .to_string()
            })
            .collect();

        match parts.as_slice() {
            [.., term1, term2, category] if parts.len() >= 3 => {
                Ok((term1.clone(), term2.clone(), category.clone()))
            }
            _ => Err(AppError::parse(format!("malformed bid list link: {href}"))),
        }
    }
}

/// Remove the front-page redirect so the archived page renders standalone.
pub fn sanitize_statistics_page(html: &str) -> String {
    html.replace(REDIRECT_SNIPPET, "")
}

fn level_statistics(values: &[Option<f64>]) -> Option<LevelStatistics> {
    if values.len() < CELLS_PER_ROW {
        return None;
    }
    let window = |offset: usize| WindowStatistics {
        avg_price_rate: values[offset].unwrap_or(0.0),
        avg_bid_rate: values[offset + 1].unwrap_or(0.0),
        bid_count: values[offset + 2].unwrap_or(0.0) as i64,
    };
    Some(LevelStatistics {
        year: window(0),
        six_month: window(3),
        three_month: window(6),
    })
}

fn parse_price(text: &str) -> Result<i64> {
    Ok(parse_cell(text)? as i64)
}

/// Numeric bid cell. Blank cells and a lone `-` read as zero.
fn parse_cell(text: &str) -> Result<f64> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return Ok(0.0);
    }
    parse_number(text).ok_or_else(|| AppError::parse(format!("invalid number '{text}' in bid row")))
}

fn parse_bid_date(text: &str) -> Result<NaiveDate> {
    let normalized: String = text
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '(')
        .map(|c| if c == '.' || c == '/' { '-' } else { c })
        .collect();
    NaiveDate::parse_from_str(normalized.trim_end_matches('-'), "%Y-%m-%d")
        .map_err(|e| AppError::parse(format!("invalid bid date '{text}': {e}")))
}
