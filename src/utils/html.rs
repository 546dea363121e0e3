// src/utils/html.rs

//! Small helpers over `scraper` shared by the page parsers.

use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};

/// One `<option>` of a dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropdownOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Parse a CSS selector, mapping failures to [`AppError::Selector`].
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Collected, whitespace-normalized text of an element.
pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read every option of the first dropdown matching `select`.
///
/// Returns `None` when the page has no such dropdown.
pub fn dropdown_options(document: &Html, select: &str) -> Result<Option<Vec<DropdownOption>>> {
    let select_sel = parse_selector(select)?;
    let option_sel = parse_selector("option")?;

    let Some(dropdown) = document.select(&select_sel).next() else {
        return Ok(None);
    };

    let options = dropdown
        .select(&option_sel)
        .map(|option| DropdownOption {
            value: option.value().attr("value").unwrap_or("").trim().to_string(),
            label: element_text(&option),
            selected: option.value().attr("selected").is_some(),
        })
        .collect();
    Ok(Some(options))
}

/// Drop a leading placeholder option (one with an empty value).
pub fn without_placeholder(mut options: Vec<DropdownOption>) -> Vec<DropdownOption> {
    if options.first().is_some_and(|o| o.value.is_empty()) {
        options.remove(0);
    }
    options
}

/// Parse a number that may carry thousands separators, units or a percent sign.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse().ok()
}
