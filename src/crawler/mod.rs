//! Crawler module for fetching and orchestrating collection phases
//!
//! This module contains the core collection logic, including:
//! - Request rate limiting
//! - HTTP fetching with retry and exponential backoff
//! - Page extraction for each page layout of the source
//! - Phase orchestration over the member list

mod context;
pub mod extract;
mod fetcher;
mod orchestrator;
mod rate_limiter;

pub use context::RunContext;
pub use fetcher::{backoff_delay, build_http_client, Document, FetchFailure, RetryingFetcher};
pub use orchestrator::{Orchestrator, PhaseOutcome, RunSummary};
pub use rate_limiter::RateLimiter;

use crate::state::RunMode;
use crate::storage::{open_storage, share};
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a complete harvest against the configured database
///
/// This is the main entry point for a run. It will:
/// 1. Open (or create) the SQLite database
/// 2. Build the orchestrator with the HTTP client
/// 3. Execute every phase of `mode`
/// 4. Clean up, whatever the outcome
///
/// # Arguments
///
/// * `ctx` - Configuration and metrics of this run
/// * `mode` - Which phases to execute
/// * `cancel` - Token tripped by an external interrupt
///
/// # Returns
///
/// * `Ok(RunSummary)` - Run completed
/// * `Err(HarvestError)` - Run failed or was interrupted
pub async fn harvest(ctx: RunContext, mode: RunMode, cancel: CancellationToken) -> Result<RunSummary> {
    let storage = open_storage(std::path::Path::new(&ctx.config.output.database_path))?;
    let mut orchestrator = Orchestrator::new(ctx, share(storage), cancel)?;
    orchestrator.run(mode).await
}
