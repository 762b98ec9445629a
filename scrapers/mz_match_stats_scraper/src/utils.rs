use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

static QUERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&](pid|tid|mid)=(\d+)").expect("static regex must compile"));

pub fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// Pulls a numeric query parameter (`pid`, `tid` or `mid`) out of an href.
pub fn extract_query_id(href: &str, key: &str) -> Option<i64> {
    let href = href.replace("&amp;", "&");
    QUERY_ID_RE
        .captures_iter(&href)
        .find(|cap| &cap[1] == key)
        .and_then(|cap| cap[2].parse().ok())
}

/// Integer cell such as `3` or `90'`.
pub fn parse_count(text: &str) -> Result<i32> {
    let cleaned = text.replace('\'', "");
    let cleaned = cleaned.trim();
    cleaned
        .parse::<i32>()
        .with_context(|| format!("Invalid numeric cell: {:?}", text))
}

/// Percentage cell such as `75%`. Cells with no value (`-`, empty) yield `None`.
pub fn parse_rate(text: &str) -> Option<i32> {
    text.replace('%', "").trim().parse::<i32>().ok()
}

/// Dates in the match-list feed come as `2024-04-10 19:00`, with or without seconds.
pub fn parse_feed_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&format!("{}:00", raw), "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(&format!("{} 00:00:00", raw), "%Y-%m-%d %H:%M:%S"))
        .ok()
}

pub fn fill_template(template: &str, replacements: &[(&str, String)]) -> String {
    replacements
        .iter()
        .fold(template.to_string(), |url, (key, value)| {
            url.replace(&format!("{{{}}}", key), value)
        })
}
