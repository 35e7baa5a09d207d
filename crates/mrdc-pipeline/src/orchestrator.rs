//! Runs every table's pipeline as an independent task.
//!
//! Within a table the stages are strictly sequential: the fetch completes
//! (all raw batches collected), then every batch is normalized, then the
//! table is validated as one unit and handed to the sink. Tables share only
//! the read-only catalog and the sink.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use arrow_array::RecordBatch;
use mrdc_core::catalog::{SchemaCatalog, TableDefinition};
use mrdc_core::retry::RetryPolicy;
use mrdc_core::spec::PipelineSpec;
use mrdc_core::{CanonicalTable, Message, Sink, Source, SourceError};
use mrdc_tx::{FieldIssueCounts, Normalizer, PrimaryKeyValidator};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::error::PipelineError;
use crate::integrity::audit_foreign_keys;
use crate::report::{RunReport, TableReport};
use crate::state::PipelineState;

/// Bounded channel capacity between a source and its collector
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

pub const DEFAULT_MAX_DROP_RATIO: f64 = 0.5;

struct TableSource {
    table: String,
    source: Box<dyn Source>,
    retry: RetryPolicy,
}

/// Sequences source → normalizer → validator → sink for each table
pub struct Orchestrator {
    catalog: Arc<SchemaCatalog>,
    sink: Arc<dyn Sink>,
    sources: Vec<TableSource>,
    max_drop_ratio: f64,
    concurrency: Option<usize>,
    channel_capacity: usize,
}

impl Orchestrator {
    pub fn new(catalog: SchemaCatalog, sink: Arc<dyn Sink>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            sink,
            sources: Vec::new(),
            max_drop_ratio: DEFAULT_MAX_DROP_RATIO,
            concurrency: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Build sources, sink and catalog from a pipeline file
    ///
    /// `only` restricts the run to the named tables.
    pub fn from_spec(spec: &PipelineSpec, only: &[String]) -> Result<Self, PipelineError> {
        let catalog = SchemaCatalog::builtin().with_overrides(spec.catalog.clone())?;
        for name in only {
            catalog.table(name)?;
        }
        let mut orchestrator = Self::new(catalog, mrdc_io::build_sink(&spec.sink))
            .with_max_drop_ratio(spec.max_drop_ratio);
        if let Some(n) = spec.concurrency {
            orchestrator = orchestrator.with_concurrency(n);
        }
        for source_spec in &spec.sources {
            if !only.is_empty() && !only.contains(&source_spec.table) {
                continue;
            }
            let source = mrdc_io::build_source(source_spec).map_err(|e| PipelineError::Config {
                table: source_spec.table.clone(),
                message: format!("{e:#}"),
            })?;
            orchestrator.add_source(&source_spec.table, source, source_spec.retry.clone())?;
        }
        Ok(orchestrator)
    }

    pub fn with_max_drop_ratio(mut self, ratio: f64) -> Self {
        self.max_drop_ratio = ratio;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n.max(1));
        self
    }

    pub fn with_channel_capacity(mut self, n: usize) -> Self {
        self.channel_capacity = n.max(1);
        self
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Register the source feeding `table`; one source per table
    pub fn add_source(
        &mut self,
        table: &str,
        source: Box<dyn Source>,
        retry: RetryPolicy,
    ) -> Result<(), PipelineError> {
        self.catalog.table(table)?;
        if self.sources.iter().any(|s| s.table == table) {
            return Err(PipelineError::Config {
                table: table.to_string(),
                message: "more than one source configured".to_string(),
            });
        }
        self.sources.push(TableSource {
            table: table.to_string(),
            source,
            retry,
        });
        Ok(())
    }

    pub fn tables(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.table.as_str()).collect()
    }

    /// Start every table pipeline; each gets a child of `cancel`
    pub fn spawn(self, cancel: CancellationToken) -> RunHandle {
        let permits = self.concurrency.unwrap_or(self.sources.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        info!(tables = self.sources.len(), concurrency = permits, "starting run");

        let mut tasks = Vec::with_capacity(self.sources.len());
        for TableSource { table, source, retry } in self.sources {
            let Ok(definition) = self.catalog.table(&table).cloned() else {
                continue;
            };
            let token = cancel.child_token();
            let pipeline = TablePipeline {
                definition,
                source,
                retry,
                sink: self.sink.clone(),
                semaphore: semaphore.clone(),
                max_drop_ratio: self.max_drop_ratio,
                channel_capacity: self.channel_capacity,
                cancel: token.clone(),
                report: TableReport::new(table.clone()),
            };
            let span = info_span!("table", table = %table);
            let handle = tokio::spawn(pipeline.run().instrument(span));
            tasks.push(TableTask { table, cancel: token, handle });
        }
        RunHandle {
            catalog: self.catalog,
            tasks,
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> RunReport {
        self.spawn(cancel).join().await
    }
}

struct TableTask {
    table: String,
    cancel: CancellationToken,
    handle: JoinHandle<(TableReport, Option<CanonicalTable>)>,
}

/// A run in progress
pub struct RunHandle {
    catalog: Arc<SchemaCatalog>,
    tasks: Vec<TableTask>,
}

impl RunHandle {
    pub fn tables(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.table.as_str()).collect()
    }

    /// Cancel one table's pipeline; the others keep running
    pub fn cancel_table(&self, table: &str) -> bool {
        match self.tasks.iter().find(|t| t.table == table) {
            Some(task) => {
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for every table, then audit foreign keys across the loaded ones
    pub async fn join(self) -> RunReport {
        let mut reports = Vec::with_capacity(self.tasks.len());
        let mut loaded: HashMap<String, CanonicalTable> = HashMap::new();
        for task in self.tasks {
            match task.handle.await {
                Ok((report, table)) => {
                    if let Some(table) = table.filter(|_| report.is_loaded()) {
                        loaded.insert(report.table.clone(), table);
                    }
                    reports.push(report);
                }
                Err(e) => {
                    error!(table = %task.table, error = %e, "table task aborted");
                    let mut report = TableReport::new(task.table.clone());
                    report.state = PipelineState::Failed;
                    report.error = Some(
                        PipelineError::Aborted {
                            table: task.table,
                            reason: e.to_string(),
                        }
                        .to_string(),
                    );
                    reports.push(report);
                }
            }
        }

        let foreign_keys = match audit_foreign_keys(&self.catalog, &loaded) {
            Ok(audits) => audits,
            Err(e) => {
                error!(error = %e, "foreign key audit failed");
                Vec::new()
            }
        };
        let report = RunReport {
            tables: reports,
            foreign_keys,
        };
        info!(ready = report.ready(), failed = report.failed(), "run finished");
        report
    }
}

/// Everything one table's task owns
struct TablePipeline {
    definition: Arc<TableDefinition>,
    source: Box<dyn Source>,
    retry: RetryPolicy,
    sink: Arc<dyn Sink>,
    semaphore: Arc<Semaphore>,
    max_drop_ratio: f64,
    channel_capacity: usize,
    cancel: CancellationToken,
    report: TableReport,
}

impl TablePipeline {
    async fn run(mut self) -> (TableReport, Option<CanonicalTable>) {
        let started = Instant::now();
        let outcome = self.execute().await;
        let table = match outcome {
            Ok(table) => Some(table),
            Err(e) => {
                if e.is_cancelled() {
                    warn!(error = %e, "table pipeline cancelled");
                } else {
                    error!(error = %e, "table pipeline failed");
                }
                self.transition(PipelineState::Failed);
                self.report.error = Some(e.to_string());
                None
            }
        };
        self.report.elapsed_ms = started.elapsed().as_millis() as u64;
        (self.report, table)
    }

    fn transition(&mut self, next: PipelineState) {
        let from = self.report.state;
        debug_assert!(from.can_transition(next), "{from} -> {next}");
        info!(from = %from, to = %next, "state transition");
        self.report.state = next;
    }

    fn cancelled(&self) -> PipelineError {
        PipelineError::Cancelled(self.definition.name.clone())
    }

    async fn execute(&mut self) -> Result<CanonicalTable, PipelineError> {
        let semaphore = self.semaphore.clone();
        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(self.cancelled()),
            permit = semaphore.acquire_owned() => permit.map_err(|_| self.cancelled())?,
        };

        self.transition(PipelineState::Fetching);
        let raw = self.fetch_with_retry().await?;
        self.report.fetched = raw.iter().map(|b| b.num_rows() as u64).sum();
        info!(batches = raw.len(), rows = self.report.fetched, "fetch complete");

        self.transition(PipelineState::Normalizing);
        let normalized = self.normalize(&raw)?;

        self.transition(PipelineState::Validating);
        let table = self.validate(&normalized)?;

        self.transition(PipelineState::Ready);
        self.load(table.clone()).await;
        Ok(table)
    }

    async fn fetch_with_retry(&mut self) -> Result<Vec<RecordBatch>, PipelineError> {
        let attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.report.attempts = attempt;
            let err = match self.fetch_once().await {
                Ok(batches) => return Ok(batches),
                Err(FetchError::Cancelled) => return Err(self.cancelled()),
                Err(FetchError::Source(e)) => e,
            };
            if !err.is_transient() || attempt >= attempts {
                return Err(PipelineError::Source {
                    table: self.definition.name.clone(),
                    attempts: attempt,
                    source: err,
                });
            }
            let backoff = self.retry.backoff_for(attempt);
            warn!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "source unavailable, retrying"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// One complete fetch; batches from a failed attempt are discarded
    async fn fetch_once(&mut self) -> Result<Vec<RecordBatch>, FetchError> {
        let (tx, mut rx) = mpsc::channel::<Message>(self.channel_capacity);
        let cancel = self.cancel.clone();
        let collect = async move {
            let mut batches = Vec::new();
            while let Some(msg) = rx.recv().await {
                match msg {
                    Message::Batch(b) => batches.push(b),
                    Message::Eos => return (batches, true),
                }
            }
            (batches, false)
        };
        let fetch = async { tokio::join!(self.source.run(tx, cancel.child_token()), collect) };

        let (result, (batches, eos)) = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            done = fetch => done,
        };
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        result.map_err(FetchError::Source)?;
        if !eos {
            return Err(FetchError::Source(SourceError::Format(
                "source finished without end of stream".to_string(),
            )));
        }
        Ok(batches)
    }

    fn normalize(&mut self, raw: &[RecordBatch]) -> Result<Vec<RecordBatch>, PipelineError> {
        let normalizer = Normalizer::new(self.definition.clone());
        let mut issues = FieldIssueCounts::default();
        let mut out = Vec::with_capacity(raw.len());
        for batch in raw {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }
            let normalized = normalizer.normalize(batch)?;
            issues.merge(&normalized.issues);
            out.push(normalized.batch);
        }
        self.report.normalized = out.iter().map(|b| b.num_rows() as u64).sum();
        for (column, tally) in issues.iter() {
            warn!(
                column,
                unparseable = tally.unparseable,
                ambiguous = tally.ambiguous,
                "fields nulled during normalization"
            );
        }
        self.report.field_issues = issues;
        Ok(out)
    }

    fn validate(&mut self, normalized: &[RecordBatch]) -> Result<CanonicalTable, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        let validator = PrimaryKeyValidator::new(self.definition.clone())?;
        let outcome = validator.validate(normalized)?;
        let dropped = outcome.dropped.total();
        self.report.dropped_for_key = outcome.dropped;

        let normalized = self.report.normalized;
        if normalized > 0 && dropped as f64 / normalized as f64 > self.max_drop_ratio {
            return Err(PipelineError::PrimaryKeyDropRateExceeded {
                table: self.definition.name.clone(),
                dropped,
                normalized,
                max_ratio: self.max_drop_ratio,
            });
        }
        Ok(outcome.table)
    }

    /// Hand the table to the sink; a rejection is recorded, never retried
    async fn load(&mut self, table: CanonicalTable) {
        match self.sink.load(table).await {
            Ok(rows) => {
                self.report.loaded = rows;
                info!(sink = self.sink.name(), rows, "table loaded");
            }
            Err(e) => {
                error!(sink = self.sink.name(), error = %e, "load rejected");
                self.report.load_error = Some(e.to_string());
            }
        }
    }
}

enum FetchError {
    Cancelled,
    Source(SourceError),
}

/// Tables named by the catalog that no source feeds
pub fn unsourced_tables(catalog: &SchemaCatalog, sourced: &[&str]) -> Vec<String> {
    let sourced: HashSet<&str> = sourced.iter().copied().collect();
    catalog
        .names()
        .into_iter()
        .filter(|n| !sourced.contains(n))
        .map(String::from)
        .collect()
}
