use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    config::FeedConfig,
    types::{MatchMeta, UNKNOWN},
    utils::{fill_template, parse_feed_date},
};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Match list request failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("Malformed match list: {0}")]
    Malformed(#[from] quick_xml::de::DeError),
    #[error("Malformed match id {0:?} in match list")]
    InvalidMatchId(String),
}

#[derive(Debug, Default, Deserialize)]
struct MatchListDocument {
    #[serde(rename = "Match", default)]
    matches: Vec<FeedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct FeedEntry {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    match_type: Option<String>,
    #[serde(rename = "@typeId")]
    type_id: Option<String>,
    #[serde(rename = "@date")]
    date: Option<String>,
}

/// A parsed match-list payload. Ids keep the order the feed lists them in.
#[derive(Debug, Clone)]
pub struct MatchList {
    ids: Vec<i64>,
    entries: Vec<FeedEntry>,
}

impl MatchList {
    pub fn parse(xml: &str) -> Result<Self, FeedError> {
        let document: MatchListDocument = quick_xml::de::from_str(xml)?;
        let ids = document
            .matches
            .iter()
            .map(|entry| {
                entry
                    .id
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| FeedError::InvalidMatchId(entry.id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            ids,
            entries: document.matches,
        })
    }

    pub fn match_ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Declared metadata for a match. Matches the feed omits (postponed, forfeited)
    /// resolve to [`MatchMeta::unknown`].
    pub fn metadata(&self, match_id: i64) -> MatchMeta {
        let Some(entry) = self
            .ids
            .iter()
            .position(|id| *id == match_id)
            .map(|idx| &self.entries[idx])
        else {
            debug!("Match {} not present in feed, metadata unknown", match_id);
            return MatchMeta::unknown();
        };

        MatchMeta {
            match_type: entry
                .match_type
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            type_id: entry.type_id.as_deref().and_then(|t| t.trim().parse().ok()),
            date: entry.date.as_deref().and_then(parse_feed_date),
        }
    }
}

/// Anything that can produce the list of matches to process.
#[allow(async_fn_in_trait)]
pub trait MatchSource {
    async fn discover(&self) -> Result<MatchList, FeedError>;
}

pub struct MatchFeedClient {
    client: reqwest::Client,
    url: String,
}

impl MatchFeedClient {
    pub fn new(config: &FeedConfig, team_id: i64) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let url = fill_template(
            &config.url_template,
            &[
                ("team_id", team_id.to_string()),
                ("limit", config.limit.to_string()),
            ],
        );

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<MatchList, FeedError> {
        info!("Fetching match list from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }

        let body = response.text().await?;
        let list = MatchList::parse(&body)?;
        info!("Match list contains {} matches", list.len());
        Ok(list)
    }
}

impl MatchSource for MatchFeedClient {
    async fn discover(&self) -> Result<MatchList, FeedError> {
        self.fetch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ManagerZone_MatchList sport="soccer" teamId="1099103">
  <Match id="1506387316" date="2025-04-12 19:30" status="played" type="league" typeName="Liga" typeId="9134">
    <Team field="home" goals="2" teamId="1099103" teamName="Lobos FC"/>
    <Team field="away" goals="1" teamId="884211" teamName="Rival FC"/>
  </Match>
  <Match id="1506387400" status="played" type="friendly" typeId="abc"/>
</ManagerZone_MatchList>"#;

    #[test]
    fn test_parse_match_ids_in_feed_order() {
        let list = MatchList::parse(FEED).unwrap();
        assert_eq!(list.match_ids(), &[1506387316, 1506387400]);
    }

    #[test]
    fn test_metadata_lookup() {
        let list = MatchList::parse(FEED).unwrap();
        let meta = list.metadata(1506387316);
        assert_eq!(meta.match_type, "league");
        assert_eq!(meta.type_id, Some(9134));
        assert_eq!(
            meta.date,
            NaiveDate::from_ymd_opt(2025, 4, 12)
                .unwrap()
                .and_hms_opt(19, 30, 0)
        );

        let partial = list.metadata(1506387400);
        assert_eq!(partial.match_type, "friendly");
        assert_eq!(partial.type_id, None);
        assert_eq!(partial.date, None);
    }

    #[test]
    fn test_missing_match_resolves_unknown() {
        let list = MatchList::parse(FEED).unwrap();
        assert_eq!(list.metadata(1), MatchMeta::unknown());
    }

    #[test]
    fn test_missing_list_element_is_empty() {
        let list = MatchList::parse("<ManagerZone_Error message=\"no team\"/>").unwrap();
        assert!(list.is_empty());
        assert_eq!(list.metadata(1506387316), MatchMeta::unknown());
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(MatchList::parse("<ManagerZone_MatchList><Match id=\"1\"").is_err());
        assert!(matches!(
            MatchList::parse("<ManagerZone_MatchList><Match id=\"x1\"/></ManagerZone_MatchList>"),
            Err(FeedError::InvalidMatchId(_))
        ));
    }
}
