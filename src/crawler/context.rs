//! Per-run context handed to the orchestrator

use crate::config::Config;
use crate::output::MetricsCollector;
use std::sync::Arc;

/// Everything a run reads, plus the one thing it accumulates
///
/// Created at run start and discarded at run end. The configuration is
/// read-only; `metrics` is the only mutable part.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Arc<Config>,

    /// SHA-256 of the configuration source, recorded in the run's log row
    pub config_hash: String,

    pub metrics: MetricsCollector,
}

impl RunContext {
    pub fn new(config: Config, config_hash: impl Into<String>) -> Self {
        Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            metrics: MetricsCollector::new(),
        }
    }
}
