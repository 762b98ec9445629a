use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{info, warn};

use mz_match_stats_scraper::{
    browser::ChromeBrowser,
    config::ScraperConfig,
    match_feed::MatchFeedClient,
    pipeline::{MatchOutcome, Pipeline, RunSummary},
    stats_extractor::StatsExtractor,
    stats_table::StatsTableParser,
    store::PgStatsStore,
    tactic::infer_tactic,
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Discover, scrape and store every match not yet fully ingested
    Run {
        /// Number of matches to request from the feed
        #[arg(short, long)]
        limit: Option<u32>,
        /// Team whose matches are processed
        #[arg(short, long)]
        team_id: Option<i64>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the match ids and metadata the feed currently lists
    Discover {
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(short, long)]
        team_id: Option<i64>,
    },
    /// Parse a saved result page and print what would be stored
    ParseFile {
        /// Path to the rendered HTML file
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        team_id: Option<i64>,
    },
    /// Apply database migrations
    Migrate,
}

fn apply_overrides(config: &mut ScraperConfig, limit: Option<u32>, team_id: Option<i64>) {
    if let Some(limit) = limit {
        config.feed.limit = limit;
    }
    if let Some(team_id) = team_id {
        config.team.team_id = team_id;
    }
}

async fn run(config: ScraperConfig, json: bool) -> Result<()> {
    let source = MatchFeedClient::new(&config.feed, config.team.team_id)?;
    let store = PgStatsStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await?;

    let browser = ChromeBrowser::launch(&config.browser).await?;
    let extractor = StatsExtractor::new(browser, config.browser.clone(), config.team.clone());

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing current match");
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    let pipeline = Pipeline::new(source, extractor, store)
        .with_stop_flag(stop)
        .with_progress(!json);
    let result = pipeline.run().await;
    pipeline.into_driver().shutdown().await;

    let summary = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for result in &summary.results {
        match &result.outcome {
            MatchOutcome::AlreadyIngested => println!("{}: already ingested", result.match_id),
            MatchOutcome::Forfeit => println!("{}: no statistics (forfeit)", result.match_id),
            MatchOutcome::Ingested { report } => println!(
                "{}: inserted {} rows ({} player stats)",
                result.match_id,
                report.total(),
                report.player_stats_inserted
            ),
            MatchOutcome::Failed { error } => println!("{}: FAILED {}", result.match_id, error),
        }
    }

    let metrics = &summary.metrics;
    println!(
        "Discovered {}, ingested {}, skipped {}, forfeited {}, failed {}",
        metrics.matches_discovered,
        metrics.matches_ingested,
        metrics.matches_skipped_complete,
        metrics.matches_forfeited,
        metrics.matches_failed
    );
    println!(
        "Inserted: {} matches, {} players, {} player stats, {} match stats (avg extraction {:.0} ms)",
        metrics.matches_inserted,
        metrics.players_inserted,
        metrics.player_stats_inserted,
        metrics.match_stats_inserted,
        metrics.avg_extraction_ms
    );
    if summary.stopped_early {
        println!("Run was interrupted before every match was processed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ScraperConfig::from_env();

    match cli.command {
        Commands::Run {
            limit,
            team_id,
            json,
        } => {
            apply_overrides(&mut config, limit, team_id);
            run(config, json).await?;
        }
        Commands::Discover { limit, team_id } => {
            apply_overrides(&mut config, limit, team_id);
            let client = MatchFeedClient::new(&config.feed, config.team.team_id)?;
            let list = client.fetch().await?;
            for &match_id in list.match_ids() {
                let meta = list.metadata(match_id);
                let date = meta
                    .date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let type_id = meta
                    .type_id
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{}\t{}\t{}\t{}", match_id, meta.match_type, type_id, date);
            }
        }
        Commands::ParseFile { file, team_id } => {
            apply_overrides(&mut config, None, team_id);
            let html = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            info!("Parsing {:?}", file);
            let extraction = StatsTableParser::new(config.team.clone()).parse(&html)?;
            let tactic = infer_tactic(&extraction.positions);
            let output = serde_json::json!({
                "tactic": tactic,
                "extraction": extraction,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Migrate => {
            let store = PgStatsStore::connect(&config.database).await?;
            store.migrate().await?;
        }
    }

    Ok(())
}
