#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use chromiumoxide::error::CdpError;
use mz_match_stats_scraper::{
    browser::{BrowserDriver, BrowserError, PageSession},
    config::{BrowserSettings, TeamConfig},
    ingest::IngestPlan,
    match_feed::{FeedError, MatchList, MatchSource},
    stats_extractor::selectors,
    store::{StatsStore, StoreError},
    types::{MatchRow, MatchStatsRow, PlayerMatchStatRow, PlayerRow},
    utils::extract_query_id,
};

pub const HOME_TEAM_ID: i64 = 1099103;
pub const RIVAL_TEAM_ID: i64 = 884211;
pub const FIXTURE_MATCH_ID: i64 = 1506387316;
pub const MATCH_RESULT_HTML: &str = include_str!("../fixtures/match_result.html");

pub fn team_config() -> TeamConfig {
    TeamConfig {
        team_id: HOME_TEAM_ID,
        display_label: None,
    }
}

/// Settings with millisecond waits so scripted sessions finish quickly.
pub fn fast_settings() -> BrowserSettings {
    BrowserSettings {
        page_load_timeout_ms: 50,
        consent_timeout_ms: 20,
        tab_timeout_ms: 50,
        poll_interval_ms: 5,
        settle_delay_ms: 1,
        toggle_max_attempts: 3,
        match_timeout_secs: 5,
        sessions_per_minute: 10_000,
        ..BrowserSettings::default()
    }
}

/// A match-list payload listing `ids` in order. The first entry carries full metadata.
pub fn feed_xml(ids: &[i64]) -> String {
    let entries: Vec<String> = ids
        .iter()
        .enumerate()
        .map(|(idx, id)| {
            if idx == 0 {
                format!(
                    r#"<Match id="{}" date="2025-04-12 19:30:00" status="played" type="league" typeId="9134"/>"#,
                    id
                )
            } else {
                format!(r#"<Match id="{}" status="played" type="friendly"/>"#, id)
            }
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><ManagerZone_MatchList sport="soccer" teamId="{}">{}</ManagerZone_MatchList>"#,
        HOME_TEAM_ID,
        entries.join("")
    )
}

/// Builds result pages with the layout the statistics parser reads.
pub struct MatchPageBuilder {
    home_name: String,
    rival_name: String,
    rows: Vec<Vec<String>>,
    rival_tackles: Option<(String, String)>,
    home_block: bool,
}

impl MatchPageBuilder {
    pub fn new() -> Self {
        Self {
            home_name: "Lobos FC".to_string(),
            rival_name: "Rival FC".to_string(),
            rows: Vec::new(),
            rival_tackles: Some(("20".to_string(), "15".to_string())),
            home_block: true,
        }
    }

    pub fn rival(mut self, name: &str) -> Self {
        self.rival_name = name.to_string();
        self
    }

    pub fn player(self, pid: i64, name: &str, position: &str, minutes: i32) -> Self {
        let link = format!(r#"<a href="/?p=players&amp;pid={}">{}</a>"#, pid, name);
        self.row_with_link(link, position, &minutes.to_string())
    }

    pub fn row_with_link(mut self, link: String, position: &str, minutes: &str) -> Self {
        let mut cells = vec![link, position.to_string(), minutes.to_string()];
        cells.extend(
            [
                "0", "1", "2", "50%", "1", "50%", "", "30", "25", "5", "83%", "", "2", "4", "3",
                "1", "75%",
            ]
            .iter()
            .map(|c| c.to_string()),
        );
        self.rows.push(cells);
        self
    }

    pub fn rival_tackles(mut self, against: &str, resisted: &str) -> Self {
        self.rival_tackles = Some((against.to_string(), resisted.to_string()));
        self
    }

    pub fn without_rival_footer(mut self) -> Self {
        self.rival_tackles = None;
        self
    }

    pub fn without_home_block(mut self) -> Self {
        self.home_block = false;
        self
    }

    pub fn build(&self) -> String {
        let rows: String = self.rows.iter().map(|cells| tr(cells)).collect();
        let home = if self.home_block {
            format!(
                "<h2>{}</h2><div>{}</div>",
                self.home_name,
                table(&rows, "")
            )
        } else {
            String::new()
        };
        let rival_footer = match &self.rival_tackles {
            Some((against, resisted)) => {
                let mut cells = vec![String::new(); 20];
                cells[0] = "Total".to_string();
                let total = tr(&cells);
                cells[0] = "Opponent".to_string();
                cells[16] = against.clone();
                cells[17] = "5".to_string();
                cells[18] = resisted.clone();
                format!("{}{}", total, tr(&cells))
            }
            None => String::new(),
        };

        format!(
            r##"<html><body>
<div class="team-table"><a href="/?p=team&amp;tid={home_id}">{home}</a><a href="/?p=team&amp;tid={rival_id}">{rival}</a></div>
<a id="ui-id-3" href="#tab-stats">Stats</a>
<div id="tab-stats">{home_block}<h2>{rival}</h2><div>{rival_table}</div></div>
</body></html>"##,
            home_id = HOME_TEAM_ID,
            rival_id = RIVAL_TEAM_ID,
            home = self.home_name,
            rival = self.rival_name,
            home_block = home,
            rival_table = table("", &rival_footer),
        )
    }
}

impl Default for MatchPageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn tr(cells: &[String]) -> String {
    let tds: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
    format!("<tr>{}</tr>", tds)
}

fn table(body: &str, footer: &str) -> String {
    format!(
        r#"<table class="hitlist matchStats matchStats--detailed"><tbody>{}</tbody><tfoot>{}</tfoot></table>"#,
        body, footer
    )
}

/// Match source backed by a fixed payload.
pub struct StaticSource {
    xml: String,
}

impl StaticSource {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }

    pub fn listing(ids: &[i64]) -> Self {
        Self::new(feed_xml(ids))
    }
}

impl MatchSource for StaticSource {
    async fn discover(&self) -> Result<MatchList, FeedError> {
        MatchList::parse(&self.xml)
    }
}

#[derive(Debug, Default)]
pub struct Tables {
    pub matches: HashMap<i64, MatchRow>,
    pub players: HashMap<i64, PlayerRow>,
    pub player_stats: HashMap<(i64, i64), PlayerMatchStatRow>,
    pub match_stats: HashMap<i64, MatchStatsRow>,
}

/// In-memory store with the same key constraints as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    applies: AtomicUsize,
    failing_matches: Mutex<HashSet<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `apply` touching `match_id` fails with a database error.
    pub fn fail_writes_for(&self, match_id: i64) {
        self.failing_matches.lock().unwrap().insert(match_id);
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        f(&mut self.tables.lock().unwrap())
    }

    pub fn match_row(&self, match_id: i64) -> Option<MatchRow> {
        self.with_tables(|t| t.matches.get(&match_id).cloned())
    }

    pub fn stat_rows(&self, match_id: i64) -> usize {
        self.with_tables(|t| t.player_stats.keys().filter(|(m, _)| *m == match_id).count())
    }
}

impl StatsStore for MemoryStore {
    async fn existing_player_stats(&self, match_id: i64) -> Result<HashSet<i64>, StoreError> {
        Ok(self.with_tables(|t| {
            t.player_stats
                .keys()
                .filter(|(m, _)| *m == match_id)
                .map(|(_, p)| *p)
                .collect()
        }))
    }

    async fn has_match_stats(&self, match_id: i64) -> Result<bool, StoreError> {
        Ok(self.with_tables(|t| t.match_stats.contains_key(&match_id)))
    }

    async fn has_match(&self, match_id: i64) -> Result<bool, StoreError> {
        Ok(self.with_tables(|t| t.matches.contains_key(&match_id)))
    }

    async fn existing_players(&self, player_ids: &[i64]) -> Result<HashSet<i64>, StoreError> {
        Ok(self.with_tables(|t| {
            player_ids
                .iter()
                .filter(|id| t.players.contains_key(*id))
                .copied()
                .collect()
        }))
    }

    async fn apply(&self, plan: &IngestPlan) -> Result<(), StoreError> {
        if plan.is_empty() {
            return Ok(());
        }
        let touched: HashSet<i64> = plan
            .new_match
            .iter()
            .map(|m| m.id)
            .chain(plan.new_player_stats.iter().map(|s| s.match_id))
            .chain(plan.new_match_stats.iter().map(|s| s.match_id))
            .collect();
        if touched
            .iter()
            .any(|id| self.failing_matches.lock().unwrap().contains(id))
        {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        self.applies.fetch_add(1, Ordering::SeqCst);
        self.with_tables(|t| {
            if let Some(row) = &plan.new_match {
                t.matches.entry(row.id).or_insert_with(|| row.clone());
            }
            for row in &plan.new_players {
                t.players.entry(row.id).or_insert_with(|| row.clone());
            }
            for row in &plan.new_player_stats {
                t.player_stats
                    .entry((row.match_id, row.player_id))
                    .or_insert_with(|| row.clone());
            }
            if let Some(row) = &plan.new_match_stats {
                t.match_stats.entry(row.match_id).or_insert_with(|| row.clone());
            }
        });
        Ok(())
    }
}

/// How a scripted result page behaves.
#[derive(Debug, Clone)]
pub struct PageScript {
    pub html: String,
    pub consent_dialog: bool,
    pub stats_tab: bool,
    /// Clicks before the detailed toggle reports on. Zero means it starts on.
    pub toggle_clicks_needed: u32,
    /// The consent button is present but rejects clicks.
    pub consent_click_fails: bool,
    /// Element lookups error this many times after navigation.
    pub failing_lookups: u32,
}

impl PageScript {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            consent_dialog: true,
            stats_tab: true,
            toggle_clicks_needed: 1,
            consent_click_fails: false,
            failing_lookups: 0,
        }
    }

    pub fn unclickable_consent(mut self) -> Self {
        self.consent_click_fails = true;
        self
    }

    pub fn failing_lookups(mut self, count: u32) -> Self {
        self.failing_lookups = count;
        self
    }

    pub fn without_consent(mut self) -> Self {
        self.consent_dialog = false;
        self
    }

    pub fn without_stats_tab(mut self) -> Self {
        self.stats_tab = false;
        self
    }

    pub fn toggle_clicks(mut self, clicks: u32) -> Self {
        self.toggle_clicks_needed = clicks;
        self
    }
}

/// Browser double serving scripted pages keyed by the `mid` in the navigated URL.
#[derive(Default)]
pub struct ScriptedBrowser {
    pages: Arc<HashMap<i64, PageScript>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    navigated: Arc<Mutex<Vec<i64>>>,
}

impl ScriptedBrowser {
    pub fn new(pages: impl IntoIterator<Item = (i64, PageScript)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn navigated(&self) -> Vec<i64> {
        self.navigated.lock().unwrap().clone()
    }
}

impl BrowserDriver for ScriptedBrowser {
    type Session = ScriptedPage;

    async fn open_session(&self) -> Result<ScriptedPage, BrowserError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedPage {
            pages: self.pages.clone(),
            closed: self.closed.clone(),
            navigated: self.navigated.clone(),
            script: None,
            consent_open: false,
            tab_active: false,
            toggle_clicks: 0,
            lookups: 0,
        })
    }
}

pub struct ScriptedPage {
    pages: Arc<HashMap<i64, PageScript>>,
    closed: Arc<AtomicUsize>,
    navigated: Arc<Mutex<Vec<i64>>>,
    script: Option<PageScript>,
    consent_open: bool,
    tab_active: bool,
    toggle_clicks: u32,
    lookups: u32,
}

impl ScriptedPage {
    fn present(&self, selector: &str) -> bool {
        let Some(script) = &self.script else {
            return false;
        };
        match selector {
            selectors::STATS_TAB => script.stats_tab,
            selectors::CONSENT_DECLINE => self.consent_open,
            selectors::DETAILED_TOGGLE | selectors::DETAILED_TOGGLE_HANDLE => self.tab_active,
            selectors::DETAILED_TOGGLE_ON => {
                self.tab_active && self.toggle_clicks >= script.toggle_clicks_needed
            }
            _ => false,
        }
    }
}

impl PageSession for ScriptedPage {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let match_id = extract_query_id(url, "mid")
            .ok_or_else(|| BrowserError::ElementNotFound(format!("mid in {}", url)))?;
        self.navigated.lock().unwrap().push(match_id);
        self.script = self.pages.get(&match_id).cloned();
        self.consent_open = self.script.as_ref().is_some_and(|s| s.consent_dialog);
        self.lookups = 0;
        Ok(())
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool, BrowserError> {
        self.lookups += 1;
        let failing = self.script.as_ref().map_or(0, |s| s.failing_lookups);
        if self.lookups <= failing {
            return Err(BrowserError::Cdp(CdpError::Timeout));
        }
        Ok(self.present(selector))
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        if !self.present(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        if selector == selectors::CONSENT_DECLINE
            && self.script.as_ref().is_some_and(|s| s.consent_click_fails)
        {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        match selector {
            selectors::CONSENT_DECLINE => self.consent_open = false,
            selectors::STATS_TAB => self.tab_active = true,
            selectors::DETAILED_TOGGLE => self.toggle_clicks += 1,
            _ => {}
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &str) -> Result<(), BrowserError> {
        if self.present(selector) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        Ok(self
            .script
            .as_ref()
            .map(|s| s.html.clone())
            .unwrap_or_default())
    }

    async fn close(self) -> Result<(), BrowserError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
