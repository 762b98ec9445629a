use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::{
    config::DatabaseConfig,
    ingest::IngestPlan,
    types::{MatchRow, MatchStatsRow, PlayerMatchStatRow, PlayerRow},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Keyed lookups and inserts over the four stats relations.
#[allow(async_fn_in_trait)]
pub trait StatsStore {
    /// Player ids that already have a `player_stats` row for `match_id`.
    async fn existing_player_stats(&self, match_id: i64) -> Result<HashSet<i64>, StoreError>;
    async fn has_match_stats(&self, match_id: i64) -> Result<bool, StoreError>;
    async fn has_match(&self, match_id: i64) -> Result<bool, StoreError>;
    /// The subset of `player_ids` already present in `players`.
    async fn existing_players(&self, player_ids: &[i64]) -> Result<HashSet<i64>, StoreError>;
    /// Writes every row of a non-empty plan atomically.
    async fn apply(&self, plan: &IngestPlan) -> Result<(), StoreError>;
}

/// What persistence already knows about a match before any extraction happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    pub existing_stat_players: HashSet<i64>,
    pub has_match_stats: bool,
}

impl ProbeResult {
    /// Both per-player stats and the aggregate row exist; nothing left to scrape.
    pub fn is_complete(&self) -> bool {
        !self.existing_stat_players.is_empty() && self.has_match_stats
    }
}

pub async fn probe<S: StatsStore>(store: &S, match_id: i64) -> Result<ProbeResult, StoreError> {
    let existing_stat_players = store.existing_player_stats(match_id).await?;
    let has_match_stats = store.has_match_stats(match_id).await?;
    debug!(
        "Match {}: {} player stat rows stored, aggregate row stored: {}",
        match_id,
        existing_stat_players.len(),
        has_match_stats
    );
    Ok(ProbeResult {
        existing_stat_players,
        has_match_stats,
    })
}

pub struct PgStatsStore {
    pool: PgPool,
}

impl PgStatsStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    async fn insert_match(
        tx: &mut Transaction<'_, Postgres>,
        row: &MatchRow,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO matches (id, tactic, match_type, match_type_id, rival, match_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(row.id)
        .bind(&row.tactic)
        .bind(&row.match_type)
        .bind(row.type_id)
        .bind(&row.rival)
        .bind(row.date)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_players(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[PlayerRow],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO players (id, name) ");
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.id).push_bind(row.name.clone());
        });
        builder.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn insert_player_stats(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[PlayerMatchStatRow],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"INSERT INTO player_stats (
                match_id, player_id, position, minutes_played, goals, assists,
                shots_total, shot_goal_rate, shots_on_target, shot_on_target_rate,
                passes_total, passes_successful, passes_failed, passes_success_rate,
                interceptions, tackles_total, tackles_successful, tackles_failed,
                tackles_success_rate
            ) "#,
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.match_id)
                .push_bind(row.player_id)
                .push_bind(row.position.clone())
                .push_bind(row.minutes_played)
                .push_bind(row.goals)
                .push_bind(row.assists)
                .push_bind(row.shots_total)
                .push_bind(row.shot_goal_rate)
                .push_bind(row.shots_on_target)
                .push_bind(row.shot_on_target_rate)
                .push_bind(row.passes_total)
                .push_bind(row.passes_successful)
                .push_bind(row.passes_failed)
                .push_bind(row.passes_success_rate)
                .push_bind(row.interceptions)
                .push_bind(row.tackles_total)
                .push_bind(row.tackles_successful)
                .push_bind(row.tackles_failed)
                .push_bind(row.tackles_success_rate);
        });
        builder.push(" ON CONFLICT (match_id, player_id) DO NOTHING");
        builder.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn insert_match_stats(
        tx: &mut Transaction<'_, Postgres>,
        row: &MatchStatsRow,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO match_stats (match_id, tackles_against, tackles_resisted, percentage_tackles_resisted)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(row.match_id)
        .bind(row.tackles_against)
        .bind(row.tackles_resisted)
        .bind(row.percentage_tackles_resisted)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

impl StatsStore for PgStatsStore {
    async fn existing_player_stats(&self, match_id: i64) -> Result<HashSet<i64>, StoreError> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT player_id FROM player_stats WHERE match_id = $1")
            .bind(match_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn has_match_stats(&self, match_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query_scalar::<_, i64>("SELECT match_id FROM match_stats WHERE match_id = $1 LIMIT 1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn has_match(&self, match_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query_scalar::<_, i64>("SELECT id FROM matches WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn existing_players(&self, player_ids: &[i64]) -> Result<HashSet<i64>, StoreError> {
        if player_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM players WHERE id = ANY($1)")
            .bind(player_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn apply(&self, plan: &IngestPlan) -> Result<(), StoreError> {
        if plan.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        if let Some(row) = &plan.new_match {
            Self::insert_match(&mut tx, row).await?;
        }
        Self::insert_players(&mut tx, &plan.new_players).await?;
        Self::insert_player_stats(&mut tx, &plan.new_player_stats).await?;
        if let Some(row) = &plan.new_match_stats {
            Self::insert_match_stats(&mut tx, row).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
