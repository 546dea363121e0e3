//! HTML page builders shared by the pipeline tests.

/// Selection state and figures of one statistics page.
pub(crate) struct PageState<'a> {
    pub sido: &'a str,
    pub guguns: &'a [&'a str],
    pub gugun: &'a str,
    pub dongs: &'a [&'a str],
    pub dong: &'a str,
    pub category: &'a str,
    pub subtype: &'a str,
    /// 12-month case count of the sido, gugun and dong rows
    pub year_counts: [i64; 3],
    pub bids_count: u64,
}

fn select(name: &str, placeholder: &str, options: &[&str], selected: &str) -> String {
    let mut html = format!(r#"<select name="{name}"><option value="">{placeholder}</option>"#);
    for option in options {
        let mark = if *option == selected { " selected" } else { "" };
        html.push_str(&format!(r#"<option value="{option}"{mark}>{option}</option>"#));
    }
    html.push_str("</select>");
    html
}

/// A page offering `options` in the dropdown named `select_name`.
pub(crate) fn options_page(select_name: &str, options: &[&str]) -> String {
    format!(
        "<html><body><form>{}</form></body></html>",
        select(select_name, "선택", options, "")
    )
}

pub(crate) fn statistics_page(state: &PageState<'_>) -> String {
    let row = |name: &str, count: i64| {
        format!(
            r#"<tr class="scale"><th>{name}</th>
            <td class="val">88.5%</td><td class="val">6.2</td><td class="val">{count}</td>
            <td class="val">87.0%</td><td class="val">5.9</td><td class="val">{count}</td>
            <td class="val">86.1%</td><td class="val">5.1</td><td class="val">{count}</td></tr>"#
        )
    };
    format!(
        r#"<html><head><script>top.location.href = '/main.asp';</script></head><body>
<form>{}{}{}{}{}</form>
<table class="nakRateRep ml20">{}{}{}<tr><td class="desc">낙찰건수: {} 건</td></tr></table>
<a class="noprint" href="javascript:openExample('dong','201909','202008','2')">더보기</a>
</body></html>"#,
        select("addr_do", "시/도", &[state.sido], state.sido),
        select("addr_si", "시/군/구", state.guguns, state.gugun),
        select("addr_dong", "읍/면/동", state.dongs, state.dong),
        select("yong_set", "대분류", &[state.category], state.category),
        select("yong_desc", "소분류", &[state.subtype], state.subtype),
        row(state.sido, state.year_counts[0]),
        row(state.gugun, state.year_counts[1]),
        row(state.dong, state.year_counts[2]),
        state.bids_count,
    )
}

/// A bid listing with `(case number, address, bid date)` rows.
pub(crate) fn bid_page(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(case, address, date)| {
            format!(
                "<tr><td>{case}</td><td>{address}</td><td>{date}</td>\
                 <td>500,000,000</td><td>400,000,000</td><td>450,000,000</td><td>90.0%</td></tr>"
            )
        })
        .collect();
    format!(r#"<html><body><table class="nakExample"><tbody>{body}</tbody></table></body></html>"#)
}
