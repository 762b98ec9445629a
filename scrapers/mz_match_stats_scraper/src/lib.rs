pub mod browser;
pub mod config;
pub mod ingest;
pub mod match_feed;
pub mod metrics;
pub mod pipeline;
pub mod stats_extractor;
pub mod stats_table;
pub mod store;
pub mod tactic;
pub mod types;
pub mod utils;
