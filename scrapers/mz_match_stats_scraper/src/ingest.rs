use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

use crate::{
    store::{ProbeResult, StatsStore, StoreError},
    types::{
        ExtractionResult, MatchMeta, MatchRow, MatchStatsRow, PlayerMatchStatRow, PlayerRow,
        PlayerStatRecord,
    },
};

/// Rows missing from persistence for one match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestPlan {
    pub new_match: Option<MatchRow>,
    pub new_players: Vec<PlayerRow>,
    pub new_player_stats: Vec<PlayerMatchStatRow>,
    pub new_match_stats: Option<MatchStatsRow>,
}

impl IngestPlan {
    pub fn is_empty(&self) -> bool {
        self.new_match.is_none()
            && self.new_players.is_empty()
            && self.new_player_stats.is_empty()
            && self.new_match_stats.is_none()
    }

    pub fn report(&self) -> IngestReport {
        IngestReport {
            matches_inserted: usize::from(self.new_match.is_some()),
            players_inserted: self.new_players.len(),
            player_stats_inserted: self.new_player_stats.len(),
            match_stats_inserted: usize::from(self.new_match_stats.is_some()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub matches_inserted: usize,
    pub players_inserted: usize,
    pub player_stats_inserted: usize,
    pub match_stats_inserted: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.matches_inserted
            + self.players_inserted
            + self.player_stats_inserted
            + self.match_stats_inserted
    }
}

/// Everything the writer needs to know about one processed match.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub match_id: i64,
    pub tactic: &'a str,
    pub meta: &'a MatchMeta,
    pub extraction: &'a ExtractionResult,
    pub probe: &'a ProbeResult,
}

/// Reconciles an extraction against what is stored and inserts only what is missing.
/// Existing rows are never updated.
pub struct IngestionWriter<'s, S: StatsStore> {
    store: &'s S,
}

impl<'s, S: StatsStore> IngestionWriter<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub async fn plan(&self, ctx: MatchContext<'_>) -> Result<IngestPlan, StoreError> {
        let match_id = ctx.match_id;

        let new_match = if self.store.has_match(match_id).await? {
            None
        } else {
            Some(MatchRow {
                id: match_id,
                tactic: ctx.tactic.to_string(),
                match_type: ctx.meta.match_type.clone(),
                type_id: ctx.meta.type_id,
                rival: ctx.extraction.rival_name.clone(),
                date: ctx.meta.date,
            })
        };

        let unique = unique_players(&ctx.extraction.players);
        let player_ids: Vec<i64> = unique.keys().copied().collect();
        let known_players = self.store.existing_players(&player_ids).await?;
        let new_players = unique
            .values()
            .filter(|record| !known_players.contains(&record.player_id))
            .map(|record| PlayerRow {
                id: record.player_id,
                name: record.player_name.clone(),
            })
            .collect();

        let new_player_stats = unique
            .values()
            .filter(|record| !ctx.probe.existing_stat_players.contains(&record.player_id))
            .map(|record| PlayerMatchStatRow::from_record(match_id, record))
            .collect();

        let new_match_stats = (!ctx.probe.has_match_stats)
            .then(|| MatchStatsRow::new(match_id, ctx.extraction.opponent_tackles));

        Ok(IngestPlan {
            new_match,
            new_players,
            new_player_stats,
            new_match_stats,
        })
    }

    pub async fn write(&self, ctx: MatchContext<'_>) -> Result<IngestReport, StoreError> {
        let plan = self.plan(ctx).await?;
        let report = plan.report();

        if plan.is_empty() {
            info!("Match {}: everything already stored, nothing written", ctx.match_id);
            return Ok(report);
        }

        self.store.apply(&plan).await?;
        info!(
            "Match {}: inserted match={} players={} player_stats={} match_stats={}",
            ctx.match_id,
            report.matches_inserted,
            report.players_inserted,
            report.player_stats_inserted,
            report.match_stats_inserted
        );
        Ok(report)
    }
}

/// Player records keyed by id, keeping the first occurrence of each.
fn unique_players(records: &[PlayerStatRecord]) -> BTreeMap<i64, &PlayerStatRecord> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| seen.insert(record.player_id))
        .map(|record| (record.player_id, record))
        .collect()
}
