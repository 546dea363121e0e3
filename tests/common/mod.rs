//! Upstream page builders and a canned upstream source.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use auction_stats::error::{AppError, Result};
use auction_stats::models::{LeafKey, RegionLevel, SearchSummary};
use auction_stats::services::AuctionSource;

const SELECT_NAMES: [&str; 5] = ["addr_do", "addr_si", "addr_dong", "yong_set", "yong_desc"];

fn select(name: &str, options: &[&str], selected: &str) -> String {
    let mut html = format!(r#"<select name="{name}"><option value="">선택</option>"#);
    for option in options {
        let mark = if *option == selected { " selected" } else { "" };
        html.push_str(&format!(r#"<option value="{option}"{mark}>{option}</option>"#));
    }
    html.push_str("</select>");
    html
}

pub fn options_page(level: RegionLevel, options: &[&str]) -> String {
    format!(
        "<html><body><form>{}</form></body></html>",
        select(SELECT_NAMES[level.depth()], options, "")
    )
}

/// Statistics page of `path`, where `siblings[i]` are the options shown at level `i`.
pub fn statistics_page(path: &[&str; 5], siblings: &[&[&str]; 5], counts: [i64; 3], bids: u64) -> String {
    let selects: String = (0..5).map(|i| select(SELECT_NAMES[i], siblings[i], path[i])).collect();
    let rows: String = (0..3)
        .map(|i| {
            let cells: String = (0..3)
                .map(|_| {
                    format!(
                        r#"<td class="val">90.0%</td><td class="val">4.5</td><td class="val">{}</td>"#,
                        counts[i]
                    )
                })
                .collect();
            format!(r#"<tr class="scale"><th>{}</th>{cells}</tr>"#, path[i])
        })
        .collect();
    format!(
        r#"<html><head><script>top.location.href = '/main.asp';</script></head><body>
<form>{selects}</form>
<table class="nakRateRep">{rows}<tr><td class="desc">낙찰건수: {bids} 건</td></tr></table>
<a class="noprint" href="javascript:openExample('dong','201909','202008','2');">더보기</a>
</body></html>"#
    )
}

pub fn bid_page(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(case, address, date)| {
            format!(
                "<tr><td>{case}</td><td>{address}</td><td>{date}</td>\
                 <td>300,000,000</td><td>240,000,000</td><td>270,000,000</td><td>90.0%</td></tr>"
            )
        })
        .collect();
    format!(r#"<html><body><table class="nakExample"><tbody>{body}</tbody></table></body></html>"#)
}

/// Upstream source serving pages from maps.
#[derive(Default)]
pub struct CannedSource {
    pub options: HashMap<(RegionLevel, Vec<String>), String>,
    pub statistics: HashMap<LeafKey, String>,
    pub bids: HashMap<LeafKey, String>,
    pub logouts: Mutex<u32>,
}

impl CannedSource {
    pub fn add_options(&mut self, level: RegionLevel, parents: &[&str], options: &[&str]) {
        self.options.insert(
            (level, parents.iter().map(|s| s.to_string()).collect()),
            options_page(level, options),
        );
    }
}

pub fn leaf(path: &[&str; 5]) -> LeafKey {
    let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
    LeafKey::from_path(&path).unwrap()
}

#[async_trait]
impl AuctionSource for CannedSource {
    async fn login(&self) -> Result<()> {
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        *self.logouts.lock().unwrap() += 1;
        Ok(())
    }

    async fn fetch_options_page(&self, level: RegionLevel, parents: &[String]) -> Result<String> {
        self.options
            .get(&(level, parents.to_vec()))
            .cloned()
            .ok_or_else(|| AppError::parse(format!("no {level} page for {parents:?}")))
    }

    async fn fetch_statistics_page(&self, leaf: &LeafKey) -> Result<String> {
        self.statistics
            .get(leaf)
            .cloned()
            .ok_or_else(|| AppError::parse(format!("no statistics page for {leaf}")))
    }

    async fn fetch_bid_page(&self, leaf: &LeafKey, _summary: &SearchSummary) -> Result<String> {
        self.bids
            .get(leaf)
            .cloned()
            .ok_or_else(|| AppError::parse(format!("no bid page for {leaf}")))
    }
}
