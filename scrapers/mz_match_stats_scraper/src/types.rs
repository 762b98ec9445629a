use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Label stored when the feed cannot tell us what kind of match this was.
pub const UNKNOWN: &str = "unknown";

/// Position code the result page uses for the goalkeeper.
pub const GOALKEEPER: &str = "Ar";

/// Metadata the match-list feed declares for one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMeta {
    pub match_type: String,
    pub type_id: Option<i32>,
    pub date: Option<NaiveDateTime>,
}

impl MatchMeta {
    pub fn unknown() -> Self {
        Self {
            match_type: UNKNOWN.to_string(),
            type_id: None,
            date: None,
        }
    }
}

/// One row of the home team's detailed statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatRecord {
    pub player_id: i64,
    pub player_name: String,
    pub position: String,
    pub minutes_played: i32,
    pub goals: i32,
    pub assists: i32,
    pub shots_total: i32,
    pub shot_goal_rate: Option<i32>,
    pub shots_on_target: i32,
    pub shot_on_target_rate: Option<i32>,
    pub passes_total: i32,
    pub passes_successful: i32,
    pub passes_failed: i32,
    pub passes_success_rate: Option<i32>,
    pub interceptions: i32,
    pub tackles_total: i32,
    pub tackles_successful: i32,
    pub tackles_failed: i32,
    pub tackles_success_rate: Option<i32>,
}

/// Tackles the rival attempted against the home team and how many were resisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpponentTackles {
    pub tackles_against: i32,
    pub tackles_resisted: i32,
    pub percentage_tackles_resisted: f64,
}

impl OpponentTackles {
    pub fn new(tackles_against: i32, tackles_resisted: i32) -> Self {
        let percentage_tackles_resisted = if tackles_against > 0 {
            f64::from(tackles_resisted) / f64::from(tackles_against) * 100.0
        } else {
            0.0
        };
        Self {
            tackles_against,
            tackles_resisted,
            percentage_tackles_resisted,
        }
    }
}

/// Everything one scraping session produced for a match. Never persisted as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub players: Vec<PlayerStatRecord>,
    /// First eleven outfield position codes in table order.
    pub positions: Vec<String>,
    pub rival_name: String,
    pub opponent_tackles: Option<OpponentTackles>,
}

impl ExtractionResult {
    /// A forfeited or void match: the page rendered but there is nothing to store.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.positions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRow {
    pub id: i64,
    pub tactic: String,
    pub match_type: String,
    pub type_id: Option<i32>,
    pub rival: String,
    pub date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMatchStatRow {
    pub match_id: i64,
    pub player_id: i64,
    pub position: String,
    pub minutes_played: i32,
    pub goals: i32,
    pub assists: i32,
    pub shots_total: i32,
    pub shot_goal_rate: Option<i32>,
    pub shots_on_target: i32,
    pub shot_on_target_rate: Option<i32>,
    pub passes_total: i32,
    pub passes_successful: i32,
    pub passes_failed: i32,
    pub passes_success_rate: Option<i32>,
    pub interceptions: i32,
    pub tackles_total: i32,
    pub tackles_successful: i32,
    pub tackles_failed: i32,
    pub tackles_success_rate: Option<i32>,
}

impl PlayerMatchStatRow {
    /// Drops the display name (it only lives on `players`) and attaches the match.
    pub fn from_record(match_id: i64, record: &PlayerStatRecord) -> Self {
        let PlayerStatRecord {
            player_id,
            player_name: _,
            position,
            minutes_played,
            goals,
            assists,
            shots_total,
            shot_goal_rate,
            shots_on_target,
            shot_on_target_rate,
            passes_total,
            passes_successful,
            passes_failed,
            passes_success_rate,
            interceptions,
            tackles_total,
            tackles_successful,
            tackles_failed,
            tackles_success_rate,
        } = record.clone();

        Self {
            match_id,
            player_id,
            position,
            minutes_played,
            goals,
            assists,
            shots_total,
            shot_goal_rate,
            shots_on_target,
            shot_on_target_rate,
            passes_total,
            passes_successful,
            passes_failed,
            passes_success_rate,
            interceptions,
            tackles_total,
            tackles_successful,
            tackles_failed,
            tackles_success_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStatsRow {
    pub match_id: i64,
    pub tackles_against: Option<i32>,
    pub tackles_resisted: Option<i32>,
    pub percentage_tackles_resisted: Option<f64>,
}

impl MatchStatsRow {
    pub fn new(match_id: i64, tackles: Option<OpponentTackles>) -> Self {
        Self {
            match_id,
            tackles_against: tackles.map(|t| t.tackles_against),
            tackles_resisted: tackles.map(|t| t.tackles_resisted),
            percentage_tackles_resisted: tackles.map(|t| t.percentage_tackles_resisted),
        }
    }
}
