//! Run orchestration - phase sequencing and cleanup
//!
//! This module contains the main harvest loop that coordinates:
//! - The run state machine (`Idle -> Initializing -> phases -> Cleanup -> Done/Failed`)
//! - Per-phase fetching, extraction, deduplication and batched persistence
//! - The operation log rows of the run and of each phase
//! - Cancellation and the cleanup that runs on every exit path

use crate::config::Config;
use crate::crawler::extract::{
    extract_detail, extract_entities, extract_index, extract_listing, extract_photos,
    extract_summaries, DetailExtraction, IndexEntry,
};
use crate::crawler::{build_http_client, RetryingFetcher, RunContext};
use crate::model::{DetailRecord, Entity, SummaryRecord};
use crate::output::{load_statistics, print_statistics, write_markdown_report, MetricsCollector, MetricsSummary};
use crate::state::{OperationStatus, Phase, RunMode, RunState};
use crate::storage::{lock, BatchWriter, DedupGuard, SharedStorage};
use crate::{HarvestError, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Result counts of one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub phase: Phase,
    /// Entities (members or photos) the phase iterated over
    pub entities: usize,
    /// Records or files produced
    pub records: usize,
    /// Resources skipped: already processed, already on disk, or defined skips
    pub skipped: usize,
    /// Resources whose fetch failed after all retries
    pub failures: usize,
}

impl PhaseOutcome {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            entities: 0,
            records: 0,
            skipped: 0,
            failures: 0,
        }
    }
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entities={} records={} skipped={} failures={}",
            self.entities, self.records, self.skipped, self.failures
        )
    }
}

/// What a successful run hands back to the caller
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: RunMode,
    pub outcomes: Vec<PhaseOutcome>,
    pub metrics: MetricsSummary,
    pub metrics_path: Option<PathBuf>,
}

/// Main harvest orchestrator
pub struct Orchestrator {
    ctx: RunContext,
    storage: SharedStorage,
    fetcher: RetryingFetcher,
    cancel: CancellationToken,
    base_url: Url,
    state: RunState,
    /// Entities resolved by the basic info phase of this run
    entities: Vec<Entity>,
    outcomes: Vec<PhaseOutcome>,
    run_operation: Option<i64>,
    metrics_path: Option<PathBuf>,
}

impl Orchestrator {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    ///
    /// * `ctx` - Configuration and metrics accumulator of this run
    /// * `storage` - Open storage backend
    /// * `cancel` - Token tripped by an external interrupt
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to `run`
    /// * `Err(HarvestError)` - The HTTP client or the base URL is invalid
    pub fn new(ctx: RunContext, storage: SharedStorage, cancel: CancellationToken) -> Result<Self> {
        let client = build_http_client(&ctx.config.source)?;
        let fetcher = RetryingFetcher::new(client, &ctx.config.throttle).with_cancellation(cancel.clone());
        let base_url = Url::parse(&ctx.config.source.base_url)?;

        Ok(Self {
            ctx,
            storage,
            fetcher,
            cancel,
            base_url,
            state: RunState::Idle,
            entities: Vec::new(),
            outcomes: Vec::new(),
            run_operation: None,
            metrics_path: None,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.ctx.metrics
    }

    /// Path of the metrics file written by the last cleanup
    pub fn metrics_path(&self) -> Option<&Path> {
        self.metrics_path.as_deref()
    }

    pub fn outcomes(&self) -> &[PhaseOutcome] {
        &self.outcomes
    }

    /// Runs every phase of `mode` in order
    ///
    /// Cleanup runs on every exit path. A successful run ends in `Done`; a
    /// failed or interrupted one ends in `Failed` and returns the error.
    pub async fn run(&mut self, mode: RunMode) -> Result<RunSummary> {
        self.transition(RunState::Initializing)?;
        self.ctx.metrics.start_session();
        tracing::info!("Starting {} run", mode);

        let result = self.execute(mode).await;

        let status = match &result {
            Ok(()) => OperationStatus::Completed,
            Err(HarvestError::Interrupted) => OperationStatus::Interrupted,
            Err(_) => OperationStatus::Failed,
        };
        if let Err(e) = &result {
            self.ctx.metrics.record_error(e, Some("run"));
            match e {
                HarvestError::Interrupted => tracing::warn!("Run interrupted, cleaning up"),
                _ => tracing::error!("Run failed: {}", e),
            }
        }

        let cleanup = self.cleanup(status, result.as_ref().err()).await;

        match (result, cleanup) {
            (Ok(()), Ok(())) => {
                self.transition(RunState::Done)?;
                tracing::info!("Run completed");
                Ok(RunSummary {
                    mode,
                    outcomes: self.outcomes.clone(),
                    metrics: self.ctx.metrics.summary(),
                    metrics_path: self.metrics_path.clone(),
                })
            }
            (Ok(()), Err(cleanup_err)) => {
                self.state = RunState::Failed;
                Err(cleanup_err)
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    tracing::error!("Cleanup after failure also failed: {}", cleanup_err);
                }
                self.state = RunState::Failed;
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("State {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    async fn execute(&mut self, mode: RunMode) -> Result<()> {
        let details = format!("config_hash={}", self.ctx.config_hash);
        let run_id = lock(&self.storage)?.begin_operation(&format!("run:{}", mode), Some(&details))?;
        self.run_operation = Some(run_id);

        for &phase in mode.phases() {
            self.check_cancelled()?;
            self.transition(RunState::Active(phase))?;
            self.run_phase(phase).await?;
        }
        Ok(())
    }

    async fn run_phase(&mut self, phase: Phase) -> Result<()> {
        tracing::info!("=== Phase: {} ===", phase);
        let op_id = lock(&self.storage)?.begin_operation(phase.name(), None)?;
        let started = Instant::now();
        let requests_before = self.fetcher.requests_sent();

        let mut outcome = PhaseOutcome::new(phase);
        let result = match phase {
            Phase::BasicInfo => self.collect_basic_info(&mut outcome).await,
            Phase::Images => self.collect_images(&mut outcome).await,
            Phase::Summaries => self.collect_summaries(&mut outcome).await,
            Phase::Detailed => self.collect_detailed(&mut outcome).await,
            Phase::Report => self.report(&mut outcome),
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.ctx
            .metrics
            .add_requests(self.fetcher.requests_sent() - requests_before);
        self.ctx
            .metrics
            .record_operation(phase.name(), elapsed, result.is_ok());

        let (status, error_message) = match &result {
            Ok(()) => (OperationStatus::Completed, None),
            Err(HarvestError::Interrupted) => (OperationStatus::Interrupted, None),
            Err(e) => (OperationStatus::Failed, Some(e.to_string())),
        };
        lock(&self.storage)?.finish_operation(
            op_id,
            status,
            Some(&outcome.to_string()),
            error_message.as_deref(),
        )?;

        tracing::info!("Phase {} finished in {:.1}s: {}", phase, elapsed, outcome);
        self.outcomes.push(outcome);
        result
    }

    async fn cleanup(&mut self, status: OperationStatus, error: Option<&HarvestError>) -> Result<()> {
        self.transition(RunState::Cleanup)?;
        self.ctx.metrics.end_session();

        let mut first_error: Option<HarvestError> = None;

        if let Some(run_id) = self.run_operation.take() {
            let summary = format!("phases={}", self.outcomes.len());
            let message = error.map(|e| e.to_string());
            let finished = lock(&self.storage).and_then(|mut storage| {
                storage.finish_operation(run_id, status, Some(&summary), message.as_deref())
            });
            if let Err(e) = finished {
                tracing::error!("Failed to finalize run log: {}", e);
                first_error.get_or_insert(e.into());
            }
        }

        match self.ctx.metrics.save_to_file(Path::new(&self.ctx.config.output.metrics_dir)) {
            Ok(path) => {
                tracing::info!("Metrics written to {}", path.display());
                self.metrics_path = Some(path);
            }
            Err(e) => {
                tracing::error!("Failed to write metrics: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = lock(&self.storage).and_then(|mut storage| storage.release()) {
            tracing::error!("Failed to release storage: {}", e);
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ===== Phases =====

    async fn collect_basic_info(&mut self, outcome: &mut PhaseOutcome) -> Result<()> {
        let config = Arc::clone(&self.ctx.config);
        let url = self.base_url.join(&config.source.members_path)?;

        let document = match self.fetcher.fetch(&url).await {
            Ok(document) => document,
            Err(failure) => {
                self.check_cancelled()?;
                outcome.failures += 1;
                self.ctx.metrics.record_error(&failure, Some("basic_info"));
                return Err(HarvestError::Precondition {
                    phase: Phase::BasicInfo,
                    message: format!("members page unavailable: {}", failure),
                });
            }
        };

        tracing::debug!(url = %document.url, bytes = document.body().len(), "Fetched members page");
        let entities = extract_entities(&document.parse(), &self.base_url);
        if entities.is_empty() {
            return Err(HarvestError::Precondition {
                phase: Phase::BasicInfo,
                message: "no entities found on the members page".to_string(),
            });
        }

        let mut writer: BatchWriter<Entity> =
            BatchWriter::new(Arc::clone(&self.storage), config.collection.flush_threshold);
        for entity in &entities {
            writer.add(entity.clone())?;
        }
        writer.flush()?;

        outcome.entities = entities.len();
        outcome.records = writer.written();
        self.ctx.metrics.set_data_collected("entities", entities.len() as u64);
        tracing::info!("Collected {} council members", entities.len());

        self.entities = entities;
        Ok(())
    }

    async fn collect_images(&mut self, outcome: &mut PhaseOutcome) -> Result<()> {
        let config = Arc::clone(&self.ctx.config);
        let url = self.base_url.join(&config.source.members_path)?;

        let document = match self.fetcher.fetch(&url).await {
            Ok(document) => document,
            Err(failure) => {
                self.check_cancelled()?;
                tracing::warn!("Skipping images: {}", failure);
                outcome.failures += 1;
                self.ctx.metrics.record_error(&failure, Some("images"));
                return Ok(());
            }
        };
        let photos = extract_photos(&document.parse(), &self.base_url);

        let image_dir = Path::new(&config.output.image_dir);
        tokio::fs::create_dir_all(image_dir).await?;

        for photo in &photos {
            self.check_cancelled()?;
            outcome.entities += 1;

            let path = image_dir.join(format!("{}.jpg", file_stem(&photo.name)));
            if tokio::fs::try_exists(&path).await? {
                tracing::debug!(entity = %photo.name, "Image already on disk");
                outcome.skipped += 1;
                continue;
            }

            match self.fetcher.fetch_bytes(&photo.url).await {
                Ok(bytes) => {
                    tokio::fs::write(&path, bytes).await?;
                    outcome.records += 1;
                }
                Err(failure) => {
                    self.check_cancelled()?;
                    tracing::warn!(entity = %photo.name, "Image download failed: {}", failure);
                    outcome.failures += 1;
                    self.ctx.metrics.record_error(&failure, Some(photo.name.as_str()));
                }
            }

            self.pause(config.throttle.batch_delay()).await?;
        }

        self.ctx.metrics.set_data_collected("images", outcome.records as u64);
        Ok(())
    }

    async fn collect_summaries(&mut self, outcome: &mut PhaseOutcome) -> Result<()> {
        let config = Arc::clone(&self.ctx.config);
        let entities = self.resolve_entities(Phase::Summaries)?;

        let mut writer: BatchWriter<SummaryRecord> =
            BatchWriter::new(Arc::clone(&self.storage), config.collection.flush_threshold);

        let looped = self
            .summaries_loop(&config, &entities, &mut writer, outcome)
            .await;
        let flushed = writer.flush();
        looped?;
        flushed?;

        outcome.records = writer.written();
        self.ctx
            .metrics
            .set_data_collected("summary_records", writer.written() as u64);
        Ok(())
    }

    async fn summaries_loop(
        &mut self,
        config: &Config,
        entities: &[Entity],
        writer: &mut BatchWriter<SummaryRecord>,
        outcome: &mut PhaseOutcome,
    ) -> Result<()> {
        for entity in entities {
            self.check_cancelled()?;
            outcome.entities += 1;

            let Some(link) = entity.profile_link.as_deref() else {
                tracing::warn!(entity = %entity.name, "No profile link, skipping");
                outcome.skipped += 1;
                continue;
            };
            let url = match self.base_url.join(link) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(entity = %entity.name, "Bad profile link '{}': {}", link, e);
                    outcome.skipped += 1;
                    continue;
                }
            };

            match self.fetcher.fetch(&url).await {
                Ok(document) => {
                    let records = extract_summaries(&document.parse(), &entity.name);
                    tracing::info!(entity = %entity.name, "Collected {} summary rows", records.len());
                    for record in records {
                        writer.add(record)?;
                    }
                }
                Err(failure) => {
                    self.check_cancelled()?;
                    tracing::warn!(entity = %entity.name, "Skipping summaries: {}", failure);
                    outcome.failures += 1;
                    self.ctx.metrics.record_error(&failure, Some(entity.name.as_str()));
                }
            }

            self.pause(config.throttle.batch_delay()).await?;
        }
        Ok(())
    }

    async fn collect_detailed(&mut self, outcome: &mut PhaseOutcome) -> Result<()> {
        let config = Arc::clone(&self.ctx.config);
        let url = self.base_url.join(&config.source.index_path)?;

        let entries = match self.fetcher.fetch(&url).await {
            Ok(document) => extract_index(
                &document.parse(),
                &self.base_url,
                config.collection.skip_inactive,
            ),
            Err(failure) => {
                self.check_cancelled()?;
                tracing::warn!("Skipping detailed records: {}", failure);
                outcome.failures += 1;
                self.ctx.metrics.record_error(&failure, Some("detailed"));
                return Ok(());
            }
        };
        if entries.is_empty() {
            tracing::warn!("Detail index lists no members");
            return Ok(());
        }

        let mut dedup = DedupGuard::new(Arc::clone(&self.storage));
        let mut writer: BatchWriter<DetailRecord> =
            BatchWriter::new(Arc::clone(&self.storage), config.collection.flush_threshold);

        let looped = self
            .detailed_loop(&config, &entries, &mut dedup, &mut writer, outcome)
            .await;
        let flushed = writer.flush();
        looped?;
        flushed?;

        outcome.records = writer.written();
        let stats = dedup.stats();
        self.ctx
            .metrics
            .set_data_collected("detail_records", writer.written() as u64);
        self.ctx
            .metrics
            .set_data_collected("links_already_processed", stats.already_processed);
        Ok(())
    }

    async fn detailed_loop(
        &mut self,
        config: &Config,
        entries: &[IndexEntry],
        dedup: &mut DedupGuard,
        writer: &mut BatchWriter<DetailRecord>,
        outcome: &mut PhaseOutcome,
    ) -> Result<()> {
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for entry in entries {
            self.check_cancelled()?;
            outcome.entities += 1;
            tracing::info!(entity = %entry.name, "Collecting detailed records");

            let items = match self.fetcher.fetch(&entry.listing_url).await {
                Ok(document) => extract_listing(&document.parse(), &self.base_url),
                Err(failure) => {
                    self.check_cancelled()?;
                    tracing::warn!(entity = %entry.name, "Skipping listing: {}", failure);
                    outcome.failures += 1;
                    self.ctx.metrics.record_error(&failure, Some(entry.name.as_str()));
                    self.pause(config.throttle.batch_delay()).await?;
                    continue;
                }
            };

            let mut collected = 0;
            for item in items {
                self.check_cancelled()?;

                let link = item.url.as_str();
                if !seen.insert((entry.name.clone(), link.to_string())) {
                    continue;
                }
                if dedup.is_processed(&entry.name, link)? {
                    tracing::debug!(entity = %entry.name, url = %link, "Already processed");
                    outcome.skipped += 1;
                    continue;
                }

                match self.fetcher.fetch(&item.url).await {
                    Ok(document) => {
                        let extraction = extract_detail(
                            &document.parse(),
                            &entry.name,
                            &item.category,
                            &item.url,
                            config.collection.min_year,
                        );
                        match extraction {
                            DetailExtraction::Record(record) => {
                                writer.add(record)?;
                                collected += 1;
                            }
                            DetailExtraction::Skip(reason) => {
                                tracing::debug!(entity = %entry.name, url = %link, "Skipped: {}", reason);
                                dedup.mark_processed(&entry.name, link)?;
                                outcome.skipped += 1;
                            }
                        }
                    }
                    Err(failure) => {
                        self.check_cancelled()?;
                        tracing::warn!(entity = %entry.name, "Document fetch failed: {}", failure);
                        outcome.failures += 1;
                        self.ctx.metrics.record_error(&failure, Some(entry.name.as_str()));
                    }
                }

                self.pause(config.throttle.document_delay()).await?;
            }

            writer.flush()?;
            tracing::info!(entity = %entry.name, "Stored {} detailed records", collected);

            self.pause(config.throttle.batch_delay()).await?;
        }
        Ok(())
    }

    fn report(&mut self, outcome: &mut PhaseOutcome) -> Result<()> {
        let top_n = self.ctx.config.collection.top_n;
        let stats = load_statistics(&*lock(&self.storage)?, top_n)?;

        print_statistics(&stats);

        if let Some(path) = self.ctx.config.output.report_path() {
            write_markdown_report(&stats, Some(&self.ctx.metrics.summary()), &path)?;
            tracing::info!("Report written to {}", path.display());
            outcome.records = 1;
        }

        outcome.entities = stats.entities as usize;
        Ok(())
    }

    // ===== Helpers =====

    /// Entities for a phase: this run's basic info output, else storage
    fn resolve_entities(&self, phase: Phase) -> Result<Vec<Entity>> {
        let entities = if self.entities.is_empty() {
            lock(&self.storage)?.load_entities()?
        } else {
            self.entities.clone()
        };

        if entities.is_empty() && phase.requires_entities() {
            return Err(HarvestError::Precondition {
                phase,
                message: "no entities available; run the basic info phase first".to_string(),
            });
        }
        Ok(entities)
    }

    /// A backoff cut short by cancellation comes back from the fetcher as an
    /// ordinary failure, so failure arms call this before absorbing one
    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HarvestError::Interrupted);
        }
        Ok(())
    }

    /// Sleeps unless the run is cancelled first
    async fn pause(&self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return self.check_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(HarvestError::Interrupted),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Member name usable as a file name
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}
