use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

use crate::{
    browser::BrowserDriver,
    ingest::{IngestReport, IngestionWriter, MatchContext},
    match_feed::{FeedError, MatchList, MatchSource},
    metrics::{MetricsCollector, RunMetrics},
    stats_extractor::{ScrapeError, StatsExtractor},
    store::{probe, StatsStore, StoreError},
    tactic::infer_tactic,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Match discovery failed: {0}")]
    Feed(#[from] FeedError),
    #[error("Match {match_id}: {source}")]
    Scrape {
        match_id: i64,
        #[source]
        source: ScrapeError,
    },
    #[error("Match {match_id}: {source}")]
    Store {
        match_id: i64,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    /// Errors meaning the remote contract changed. These abort the run.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Feed(_) => true,
            PipelineError::Scrape { source, .. } => source.is_structural(),
            PipelineError::Store { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Stats and aggregate rows were already stored; no session was opened.
    AlreadyIngested,
    /// The page had no statistics to persist.
    Forfeit,
    Ingested { report: IngestReport },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub match_id: i64,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub results: Vec<MatchResult>,
    pub stopped_early: bool,
    pub metrics: RunMetrics,
}

impl RunSummary {
    pub fn outcome(&self, match_id: i64) -> Option<&MatchOutcome> {
        self.results
            .iter()
            .find(|result| result.match_id == match_id)
            .map(|result| &result.outcome)
    }
}

/// Sequences discovery, probe, extraction, tactic inference and ingestion, one match
/// at a time in feed order.
pub struct Pipeline<F: MatchSource, B: BrowserDriver, S: StatsStore> {
    source: F,
    extractor: StatsExtractor<B>,
    store: S,
    metrics: MetricsCollector,
    stop: Option<Arc<AtomicBool>>,
    show_progress: bool,
}

impl<F: MatchSource, B: BrowserDriver, S: StatsStore> Pipeline<F, B, S> {
    pub fn new(source: F, extractor: StatsExtractor<B>, store: S) -> Self {
        Self {
            source,
            extractor,
            store,
            metrics: MetricsCollector::new(),
            stop: None,
            show_progress: true,
        }
    }

    /// Once the flag is set the run stops before the next match.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn extractor(&self) -> &StatsExtractor<B> {
        &self.extractor
    }

    pub fn into_driver(self) -> B {
        self.extractor.into_driver()
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let list = self.source.discover().await?;
        self.metrics.record_discovered(list.len());
        info!("Discovered {} matches", list.len());

        let pb = self.progress_bar(list.len());
        let mut results = Vec::with_capacity(list.len());
        let mut stopped_early = false;

        for &match_id in list.match_ids() {
            if self.stop_requested() {
                warn!("Stop requested, leaving {} matches unprocessed", list.len() - results.len());
                stopped_early = true;
                break;
            }
            pb.set_message(format!("match {}", match_id));

            let outcome = match self.process_match(&list, match_id).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    error!("Aborting run: {}", e);
                    self.metrics.record_error(e.to_string());
                    pb.abandon_with_message("aborted");
                    return Err(e);
                }
                Err(e) => {
                    error!("{}", e);
                    self.metrics.record_error(e.to_string());
                    MatchOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            results.push(MatchResult { match_id, outcome });
            pb.inc(1);
        }

        pb.finish_with_message("done");
        Ok(RunSummary {
            results,
            stopped_early,
            metrics: self.metrics.get_metrics(),
        })
    }

    pub async fn process_match(
        &self,
        list: &MatchList,
        match_id: i64,
    ) -> Result<MatchOutcome, PipelineError> {
        let store_err = |source: StoreError| PipelineError::Store { match_id, source };

        let probe = probe(&self.store, match_id).await.map_err(store_err)?;
        if probe.is_complete() {
            info!("Match {}: already ingested, skipping", match_id);
            self.metrics.record_skipped_complete();
            return Ok(MatchOutcome::AlreadyIngested);
        }

        let tracker = self.metrics.start_extraction();
        let extraction = self.extractor.extract(match_id).await;
        tracker.finish();
        let extraction = extraction.map_err(|source| PipelineError::Scrape { match_id, source })?;

        if extraction.is_empty() {
            info!("Match {}: no statistics on page, treating as forfeit", match_id);
            self.metrics.record_forfeit();
            return Ok(MatchOutcome::Forfeit);
        }

        let tactic = infer_tactic(&extraction.positions);
        let meta = list.metadata(match_id);
        info!(
            "Match {}: {} players, tactic {}, rival {}",
            match_id,
            extraction.players.len(),
            tactic,
            extraction.rival_name
        );

        let report = IngestionWriter::new(&self.store)
            .write(MatchContext {
                match_id,
                tactic: &tactic,
                meta: &meta,
                extraction: &extraction,
                probe: &probe,
            })
            .await
            .map_err(store_err)?;
        self.metrics.record_ingested(&report);

        Ok(MatchOutcome::Ingested { report })
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::SeqCst))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} matches {msg} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}
