use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamConfig {
    pub team_id: i64,
    /// Heading text of the home statistics block. Resolved from the page when unset.
    pub display_label: Option<String>,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            team_id: 1099103,
            display_label: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub url_template: String,
    pub limit: u32,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url_template: "http://www.managerzone.com/xml/team_matchlist.php?sport_id=1&team_id={team_id}&match_status=1&limit={limit}".to_string(),
            limit: 50,
            user_agent: "Mozilla/5.0 (compatible; MzMatchStats/1.0)".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowserSettings {
    pub match_url_template: String,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub page_load_timeout_ms: u64,
    pub consent_timeout_ms: u64,
    pub tab_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub toggle_max_attempts: u32,
    pub match_timeout_secs: u64,
    pub sessions_per_minute: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            match_url_template: "https://www.managerzone.com/?p=match&sub=result&mid={match_id}"
                .to_string(),
            headless: true,
            window_width: 1280,
            window_height: 800,
            page_load_timeout_ms: 30_000,
            consent_timeout_ms: 10_000,
            tab_timeout_ms: 15_000,
            poll_interval_ms: 250,
            settle_delay_ms: 1_000,
            toggle_max_attempts: 10,
            match_timeout_secs: 180,
            sessions_per_minute: 6,
        }
    }
}

impl BrowserSettings {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_millis(self.consent_timeout_ms)
    }

    pub fn tab_timeout(&self) -> Duration {
        Duration::from_millis(self.tab_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_secs(self.match_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/mz_stats".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScraperConfig {
    pub team: TeamConfig,
    pub feed: FeedConfig,
    pub browser: BrowserSettings,
    pub database: DatabaseConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(team_id) = env_parse("MZ_TEAM_ID") {
            config.team.team_id = team_id;
        }
        if let Ok(label) = env::var("MZ_TEAM_LABEL") {
            if !label.trim().is_empty() {
                config.team.display_label = Some(label.trim().to_string());
            }
        }
        if let Ok(url) = env::var("MZ_FEED_URL") {
            config.feed.url_template = url;
        }
        if let Some(limit) = env_parse("MZ_FEED_LIMIT") {
            config.feed.limit = limit;
        }
        if let Ok(user_agent) = env::var("SCRAPER_USER_AGENT") {
            config.feed.user_agent = user_agent;
        }
        if let Some(timeout) = env_parse("SCRAPER_TIMEOUT_SECS") {
            config.feed.request_timeout_secs = timeout;
        }
        if let Ok(url) = env::var("MZ_MATCH_URL") {
            config.browser.match_url_template = url;
        }
        if let Some(headless) = env_parse("BROWSER_HEADLESS") {
            config.browser.headless = headless;
        }
        if let Some(attempts) = env_parse("TOGGLE_MAX_ATTEMPTS") {
            config.browser.toggle_max_attempts = attempts;
        }
        if let Some(timeout) = env_parse("MATCH_TIMEOUT_SECS") {
            config.browser.match_timeout_secs = timeout;
        }
        if let Some(rate) = env_parse("SESSIONS_PER_MINUTE") {
            config.browser.sessions_per_minute = rate;
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(max) = env_parse("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = max;
        }

        config
    }
}
