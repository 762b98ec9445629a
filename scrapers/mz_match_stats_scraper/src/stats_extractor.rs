use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{fmt, num::NonZeroU32, time::Duration};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::{
    browser::{BrowserDriver, BrowserError, PageSession},
    config::{BrowserSettings, TeamConfig},
    stats_table::{StatsTableParser, TableError},
    types::ExtractionResult,
    utils::fill_template,
};

/// DOM hooks on the match result page.
pub mod selectors {
    pub const CONSENT_DECLINE: &str = "#CybotCookiebotDialogBodyButtonDecline";
    pub const STATS_TAB: &str = "#ui-id-3";
    pub const DETAILED_TOGGLE: &str = "#detailedToggle";
    pub const DETAILED_TOGGLE_HANDLE: &str = "#detailedToggle .handle";
    pub const DETAILED_TOGGLE_ON: &str = "#detailedToggle .handle.on";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    NotStarted,
    PageLoaded,
    ConsentResolved,
    StatsTabActive,
    DetailedModeOn,
    TableParsed,
    Closed,
}

impl fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionState::NotStarted => "not-started",
            ExtractionState::PageLoaded => "page-loaded",
            ExtractionState::ConsentResolved => "consent-resolved",
            ExtractionState::StatsTabActive => "stats-tab-active",
            ExtractionState::DetailedModeOn => "detailed-mode-on",
            ExtractionState::TableParsed => "table-parsed",
            ExtractionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Browser failure in state {state}: {source}")]
    Browser {
        state: ExtractionState,
        #[source]
        source: BrowserError,
    },
    #[error("Timed out after {waited:?} waiting for {selector} in state {state}")]
    WaitTimeout {
        selector: &'static str,
        state: ExtractionState,
        waited: Duration,
    },
    #[error("Detailed statistics toggle did not switch on after {attempts} attempts")]
    ToggleTimeout { attempts: u32 },
    #[error("Extraction of match {match_id} exceeded {limit:?}")]
    MatchTimeout { match_id: i64, limit: Duration },
    #[error(transparent)]
    Table(#[from] TableError),
}

impl ScrapeError {
    /// The page no longer has the row layout we read; continuing would store garbage.
    pub fn is_structural(&self) -> bool {
        matches!(self, ScrapeError::Table(TableError::MalformedRow { .. }))
    }
}

/// Polls `selector` until it exists or `limit` elapses. `Ok(false)` on timeout, or the
/// lookup error if the final poll failed.
pub async fn wait_for<S: PageSession>(
    session: &mut S,
    selector: &str,
    limit: Duration,
    poll: Duration,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + limit;
    loop {
        // Lookups can fail while the page is mid-navigation; only the last one counts
        let last_error = match session.has_element(selector).await {
            Ok(true) => return Ok(true),
            Ok(false) => None,
            Err(e) => {
                debug!("Lookup of {} failed, retrying: {}", selector, e);
                Some(e)
            }
        };
        if Instant::now() >= deadline {
            return match last_error {
                Some(e) => Err(e),
                None => Ok(false),
            };
        }
        sleep(poll).await;
    }
}

/// Drives one rendering session per match through the clicks needed to expose the
/// detailed statistics table, then parses it.
pub struct StatsExtractor<B: BrowserDriver> {
    driver: B,
    settings: BrowserSettings,
    parser: StatsTableParser,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl<B: BrowserDriver> StatsExtractor<B> {
    pub fn new(driver: B, settings: BrowserSettings, team: TeamConfig) -> Self {
        let per_minute = NonZeroU32::new(settings.sessions_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            driver,
            settings,
            parser: StatsTableParser::new(team),
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub fn driver(&self) -> &B {
        &self.driver
    }

    pub fn into_driver(self) -> B {
        self.driver
    }

    pub fn match_url(&self, match_id: i64) -> String {
        fill_template(
            &self.settings.match_url_template,
            &[("match_id", match_id.to_string())],
        )
    }

    /// Runs the whole session for `match_id`. The session is closed on every path.
    pub async fn extract(&self, match_id: i64) -> Result<ExtractionResult, ScrapeError> {
        self.rate_limiter.until_ready().await;

        let mut session = self
            .driver
            .open_session()
            .await
            .map_err(|source| ScrapeError::Browser {
                state: ExtractionState::NotStarted,
                source,
            })?;

        let limit = self.settings.match_timeout();
        let outcome = match timeout(limit, self.drive(&mut session, match_id)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ScrapeError::MatchTimeout { match_id, limit }),
        };

        match session.close().await {
            Ok(()) => debug!("Match {}: {}", match_id, ExtractionState::Closed),
            Err(e) => warn!("Match {}: failed to close session: {}", match_id, e),
        }

        outcome
    }

    async fn drive(
        &self,
        session: &mut B::Session,
        match_id: i64,
    ) -> Result<ExtractionResult, ScrapeError> {
        let mut state = ExtractionState::NotStarted;
        let poll = self.settings.poll_interval();
        let browser_err =
            |state: ExtractionState| move |source: BrowserError| ScrapeError::Browser { state, source };

        let url = self.match_url(match_id);
        info!("Match {}: loading {}", match_id, url);
        session.navigate(&url).await.map_err(browser_err(state))?;
        self.require(session, selectors::STATS_TAB, self.settings.page_load_timeout(), state)
            .await?;
        state = self.advance(match_id, ExtractionState::PageLoaded);

        let consent = wait_for(session, selectors::CONSENT_DECLINE, self.settings.consent_timeout(), poll)
            .await
            .map_err(browser_err(state))?;
        if consent {
            if let Err(e) = session.click(selectors::CONSENT_DECLINE).await {
                warn!("Match {}: consent dialog not dismissable, continuing: {}", match_id, e);
            }
        } else {
            debug!("Match {}: no consent dialog, continuing", match_id);
        }
        state = self.advance(match_id, ExtractionState::ConsentResolved);

        session
            .scroll_into_view(selectors::STATS_TAB)
            .await
            .map_err(browser_err(state))?;
        sleep(self.settings.settle_delay()).await;
        session
            .click(selectors::STATS_TAB)
            .await
            .map_err(browser_err(state))?;
        self.require(session, selectors::DETAILED_TOGGLE_HANDLE, self.settings.tab_timeout(), state)
            .await?;
        state = self.advance(match_id, ExtractionState::StatsTabActive);

        self.switch_detailed_on(session).await.map_err(|e| match e {
            ToggleFailure::Browser(source) => ScrapeError::Browser { state, source },
            ToggleFailure::Exhausted(attempts) => ScrapeError::ToggleTimeout { attempts },
        })?;
        state = self.advance(match_id, ExtractionState::DetailedModeOn);

        let html = session.content().await.map_err(browser_err(state))?;
        let result = self.parser.parse(&html)?;
        self.advance(match_id, ExtractionState::TableParsed);
        debug!(
            "Match {}: {} player rows, positions {:?}, rival {:?}, tackles {:?}",
            match_id,
            result.players.len(),
            result.positions,
            result.rival_name,
            result.opponent_tackles
        );

        Ok(result)
    }

    async fn switch_detailed_on(&self, session: &mut B::Session) -> Result<(), ToggleFailure> {
        let attempts = self.settings.toggle_max_attempts;
        for attempt in 1..=attempts {
            if session
                .has_element(selectors::DETAILED_TOGGLE_ON)
                .await
                .map_err(ToggleFailure::Browser)?
            {
                return Ok(());
            }
            debug!("Clicking detailed toggle (attempt {}/{})", attempt, attempts);
            session
                .click(selectors::DETAILED_TOGGLE)
                .await
                .map_err(ToggleFailure::Browser)?;
            sleep(self.settings.settle_delay()).await;
        }

        if session
            .has_element(selectors::DETAILED_TOGGLE_ON)
            .await
            .map_err(ToggleFailure::Browser)?
        {
            Ok(())
        } else {
            Err(ToggleFailure::Exhausted(attempts))
        }
    }

    async fn require(
        &self,
        session: &mut B::Session,
        selector: &'static str,
        limit: Duration,
        state: ExtractionState,
    ) -> Result<(), ScrapeError> {
        let found = wait_for(session, selector, limit, self.settings.poll_interval())
            .await
            .map_err(|source| ScrapeError::Browser { state, source })?;
        if found {
            Ok(())
        } else {
            Err(ScrapeError::WaitTimeout {
                selector,
                state,
                waited: limit,
            })
        }
    }

    fn advance(&self, match_id: i64, next: ExtractionState) -> ExtractionState {
        debug!("Match {}: {}", match_id, next);
        next
    }
}

enum ToggleFailure {
    Browser(BrowserError),
    Exhausted(u32),
}
