use scraper::{ElementRef, Html};
use tracing::{debug, warn};

use crate::{
    config::TeamConfig,
    types::{ExtractionResult, OpponentTackles, PlayerStatRecord, GOALKEEPER, UNKNOWN},
    utils::{extract_query_id, parse_count, parse_rate, selector},
};

/// Columns a detailed player row must have to be read.
pub const DETAILED_ROW_COLUMNS: usize = 20;
/// Outfield position codes kept for the formation.
pub const MAX_POSITIONS: usize = 11;

const COL_PLAYER: usize = 0;
const COL_POSITION: usize = 1;
const COL_MINUTES: usize = 2;
const COL_GOALS: usize = 3;
const COL_ASSISTS: usize = 4;
const COL_SHOTS_TOTAL: usize = 5;
const COL_SHOT_GOAL_RATE: usize = 6;
const COL_SHOTS_ON_TARGET: usize = 7;
const COL_SHOT_ON_TARGET_RATE: usize = 8;
const COL_PASSES_TOTAL: usize = 10;
const COL_PASSES_SUCCESSFUL: usize = 11;
const COL_PASSES_FAILED: usize = 12;
const COL_PASSES_SUCCESS_RATE: usize = 13;
const COL_INTERCEPTIONS: usize = 15;
const COL_TACKLES_TOTAL: usize = 16;
const COL_TACKLES_SUCCESSFUL: usize = 17;
const COL_TACKLES_FAILED: usize = 18;
const COL_TACKLES_SUCCESS_RATE: usize = 19;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Statistics block for {team:?} not found")]
    TeamBlockNotFound { team: String },
    #[error("Malformed statistics row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },
}

/// A team-profile link found on the result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamLink {
    pub team_id: i64,
    pub name: String,
}

/// Reads the rendered detailed-statistics view of a match result page.
#[derive(Debug, Clone)]
pub struct StatsTableParser {
    team: TeamConfig,
}

impl StatsTableParser {
    pub fn new(team: TeamConfig) -> Self {
        Self { team }
    }

    pub fn parse(&self, html: &str) -> Result<ExtractionResult, TableError> {
        let document = Html::parse_document(html);
        let links = self.team_links(&document);

        let rival_name = links
            .iter()
            .find(|link| link.team_id != self.team.team_id)
            .map(|link| link.name.clone())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let home_label = self
            .team
            .display_label
            .clone()
            .or_else(|| {
                links
                    .iter()
                    .find(|link| link.team_id == self.team.team_id)
                    .map(|link| link.name.clone())
            })
            .ok_or_else(|| TableError::TeamBlockNotFound {
                team: self.team.team_id.to_string(),
            })?;
        debug!("Home block label {:?}, rival {:?}", home_label, rival_name);

        let (home_block, rival_block) = self.team_blocks(&document, &home_label, &rival_name);
        let home_block = home_block.ok_or_else(|| TableError::TeamBlockNotFound {
            team: home_label.clone(),
        })?;

        let (players, positions) = self.parse_player_rows(home_block)?;
        let opponent_tackles = rival_block.and_then(|block| self.parse_rival_footer(block));
        if rival_block.is_none() {
            warn!("No statistics block for rival {:?}", rival_name);
        }

        Ok(ExtractionResult {
            players,
            positions,
            rival_name,
            opponent_tackles,
        })
    }

    /// Every anchor pointing at a team profile, in document order.
    pub fn team_links(&self, document: &Html) -> Vec<TeamLink> {
        let link_selector = selector("a[href*=\"p=team\"]");
        document
            .select(&link_selector)
            .filter_map(|a| {
                let team_id = extract_query_id(a.value().attr("href")?, "tid")?;
                let name = a.text().collect::<String>().trim().to_string();
                (!name.is_empty()).then_some(TeamLink { team_id, name })
            })
            .collect()
    }

    /// The containers following the home and rival `h2` headings.
    fn team_blocks<'a>(
        &self,
        document: &'a Html,
        home_label: &str,
        rival_name: &str,
    ) -> (Option<ElementRef<'a>>, Option<ElementRef<'a>>) {
        let heading_selector = selector("h2");
        let mut home_block = None;
        let mut rival_block = None;

        for heading in document.select(&heading_selector) {
            if home_block.is_some() && rival_block.is_some() {
                break;
            }
            let text = heading.text().collect::<String>();
            let text = text.trim();
            if home_block.is_none() && text == home_label {
                home_block = next_element_sibling(heading);
            } else if rival_block.is_none() && text == rival_name {
                rival_block = next_element_sibling(heading);
            }
        }

        (home_block, rival_block)
    }

    fn parse_player_rows(
        &self,
        block: ElementRef<'_>,
    ) -> Result<(Vec<PlayerStatRecord>, Vec<String>), TableError> {
        let row_selector = selector("table.matchStats--detailed tbody tr");
        let cell_selector = selector("td");
        let link_selector = selector("a");

        let mut players = Vec::new();
        let mut positions = Vec::new();

        for (row_idx, row) in block.select(&row_selector).enumerate() {
            let cells: Vec<_> = row.select(&cell_selector).collect();
            if cells.len() < DETAILED_ROW_COLUMNS {
                continue;
            }
            let malformed = |reason: String| TableError::MalformedRow {
                row: row_idx,
                reason,
            };
            let text = |idx: usize| cell_text(cells[idx]);
            let count = |idx: usize| parse_count(&text(idx)).map_err(|e| malformed(e.to_string()));

            let link = cells[COL_PLAYER]
                .select(&link_selector)
                .next()
                .ok_or_else(|| malformed("missing player link".to_string()))?;
            let player_id = link
                .value()
                .attr("href")
                .and_then(|href| extract_query_id(href, "pid"))
                .ok_or_else(|| malformed("player link without pid".to_string()))?;
            let player_name = link.text().collect::<String>().trim().to_string();
            let position = text(COL_POSITION);

            let minutes_played = count(COL_MINUTES)?;
            if minutes_played == 0 {
                continue;
            }
            if positions.len() < MAX_POSITIONS && position != GOALKEEPER {
                positions.push(position.clone());
            }

            players.push(PlayerStatRecord {
                player_id,
                player_name,
                position,
                minutes_played,
                goals: count(COL_GOALS)?,
                assists: count(COL_ASSISTS)?,
                shots_total: count(COL_SHOTS_TOTAL)?,
                shot_goal_rate: parse_rate(&text(COL_SHOT_GOAL_RATE)),
                shots_on_target: count(COL_SHOTS_ON_TARGET)?,
                shot_on_target_rate: parse_rate(&text(COL_SHOT_ON_TARGET_RATE)),
                passes_total: count(COL_PASSES_TOTAL)?,
                passes_successful: count(COL_PASSES_SUCCESSFUL)?,
                passes_failed: count(COL_PASSES_FAILED)?,
                passes_success_rate: parse_rate(&text(COL_PASSES_SUCCESS_RATE)),
                interceptions: count(COL_INTERCEPTIONS)?,
                tackles_total: count(COL_TACKLES_TOTAL)?,
                tackles_successful: count(COL_TACKLES_SUCCESSFUL)?,
                tackles_failed: count(COL_TACKLES_FAILED)?,
                tackles_success_rate: parse_rate(&text(COL_TACKLES_SUCCESS_RATE)),
            });
        }

        Ok((players, positions))
    }

    /// Second footer row of the rival's table: tackles attempted against the home
    /// team and the ones that failed, i.e. were resisted.
    fn parse_rival_footer(&self, block: ElementRef<'_>) -> Option<OpponentTackles> {
        let footer_selector = selector("table.matchStats--detailed tfoot");
        let row_selector = selector("tr");
        let cell_selector = selector("td");

        let footer = block.select(&footer_selector).next()?;
        let row = footer.select(&row_selector).nth(1)?;
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < DETAILED_ROW_COLUMNS {
            return None;
        }

        let against = parse_count(&cell_text(cells[COL_TACKLES_TOTAL])).ok()?;
        let resisted = parse_count(&cell_text(cells[COL_TACKLES_FAILED])).ok()?;
        Some(OpponentTackles::new(against, resisted))
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn next_element_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}
