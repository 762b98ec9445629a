use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use crate::ingest::IngestReport;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub matches_discovered: u64,
    pub matches_ingested: u64,
    pub matches_skipped_complete: u64,
    pub matches_forfeited: u64,
    pub matches_failed: u64,
    pub matches_inserted: u64,
    pub players_inserted: u64,
    pub player_stats_inserted: u64,
    pub match_stats_inserted: u64,
    pub extractions: u64,
    pub avg_extraction_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<RunMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_discovered(&self, count: usize) {
        self.lock().matches_discovered += count as u64;
    }

    pub fn start_extraction(&self) -> ExtractionTracker {
        ExtractionTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_skipped_complete(&self) {
        self.lock().matches_skipped_complete += 1;
    }

    pub fn record_forfeit(&self) {
        self.lock().matches_forfeited += 1;
    }

    pub fn record_ingested(&self, report: &IngestReport) {
        let mut metrics = self.lock();
        metrics.matches_ingested += 1;
        metrics.matches_inserted += report.matches_inserted as u64;
        metrics.players_inserted += report.players_inserted as u64;
        metrics.player_stats_inserted += report.player_stats_inserted as u64;
        metrics.match_stats_inserted += report.match_stats_inserted as u64;
    }

    pub fn record_error(&self, error: String) {
        let mut metrics = self.lock();
        metrics.last_error = Some(error);
        metrics.last_error_time = Some(Utc::now());
        metrics.matches_failed += 1;
    }

    pub fn get_metrics(&self) -> RunMetrics {
        self.lock().clone()
    }
}

pub struct ExtractionTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl ExtractionTracker {
    pub fn finish(self) {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut metrics = self.collector.lock();
        metrics.extractions += 1;

        // Exponential moving average, seeded by the first sample
        let alpha = 0.2;
        metrics.avg_extraction_ms = if metrics.extractions == 1 {
            elapsed_ms
        } else {
            metrics.avg_extraction_ms * (1.0 - alpha) + elapsed_ms * alpha
        };
    }
}
