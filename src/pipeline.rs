use crate::cluster::{cluster_batch, merge_sets, BatchId, ClusterParams, ClusterSet, ClusterStore};
use crate::config::{ClusterConfig, ConfigError, FailurePolicy, ReductionShape};
use crate::report::ClusterReport;
use crate::source::{LineSource, RawLine, SourceError, VecSource};
use crate::tokenizer::Tokenizer;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read batch {batch}: {source}")]
    Source {
        batch: BatchId,
        #[source]
        source: SourceError,
    },
    #[error("batch {batch} failed: {reason}")]
    Batch { batch: BatchId, reason: BatchFailure },
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Why one batch could not be clustered.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchFailure {
    #[error("line at offset {offset} has {tokens} tokens, limit is {limit}")]
    Oversized { offset: u64, tokens: usize, limit: usize },
    #[error("worker panicked: {message}")]
    Panicked { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBatch {
    pub batch: BatchId,
    pub records: usize,
    pub reason: BatchFailure,
}

/// Shared flag checked between waves; set it to stop reading new batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub clusters: ClusterSet,
    /// Lines read from batches that completed.
    pub total_records: usize,
    pub batches: usize,
    pub failed_batches: Vec<FailedBatch>,
    pub cancelled: bool,
    pub reduction: ReductionShape,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// Runs one batch body, turning a panic into a batch failure.
fn isolate<F>(body: F) -> Result<ClusterSet, BatchFailure>
where
    F: FnOnce() -> Result<ClusterSet, BatchFailure>,
{
    panic::catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(BatchFailure::Panicked { message: panic_message(payload) }))
}

// Applies the failure policy to one batch result. `Ok(None)` means the batch
// was recorded as failed and the run goes on.
fn settle(
    policy: FailurePolicy,
    batch: BatchId,
    records: usize,
    result: Result<ClusterSet, BatchFailure>,
    failed: &mut Vec<FailedBatch>,
) -> Result<Option<ClusterSet>, PipelineError> {
    match result {
        Ok(set) => Ok(Some(set)),
        Err(reason) => match policy {
            FailurePolicy::Abort => Err(PipelineError::Batch { batch, reason }),
            FailurePolicy::Skip => {
                warn!(batch, records, %reason, "batch skipped");
                failed.push(FailedBatch { batch, records, reason });
                Ok(None)
            }
        },
    }
}

/// Merges partial sets in batch order with the given tree shape.
///
/// `Balanced` pairs neighbours level by level (odd tail carried up) and
/// merges each level in parallel; `Sequential` left-folds. Either shape is
/// deterministic for a fixed input order, but the two can disagree because
/// merging is not associative.
pub fn reduce(partials: Vec<ClusterSet>, shape: ReductionShape, params: &ClusterParams) -> ClusterSet {
    match shape {
        ReductionShape::Sequential => partials
            .into_iter()
            .fold(ClusterSet::new(), |acc, next| merge_sets(acc, next, params)),
        ReductionShape::Balanced => {
            let mut level = partials;
            let mut depth = 0usize;
            while level.len() > 1 {
                let mut pairs = Vec::with_capacity((level.len() + 1) / 2);
                let mut it = level.into_iter();
                while let Some(left) = it.next() {
                    pairs.push((left, it.next()));
                }
                // collect() is the barrier: the next level starts once every pair is merged
                level = pairs
                    .into_par_iter()
                    .map(|(left, right)| match right {
                        Some(right) => merge_sets(left, right, params),
                        None => left,
                    })
                    .collect();
                depth += 1;
                debug!(depth, sets = level.len(), "reduction level merged");
            }
            level.pop().unwrap_or_default()
        }
    }
}

/// Runs the batch phase and the reduction for one job.
pub struct Coordinator {
    config: ClusterConfig,
    tokenizer: Tokenizer,
    params: ClusterParams,
    pool: rayon::ThreadPool,
    cancel: CancelFlag,
}

impl Coordinator {
    pub fn new(config: ClusterConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let tokenizer = Tokenizer::from_config(&config)?;
        let params = ClusterParams::from_config(&config);
        let threads = if config.threads == 0 { num_cpus::get() } else { config.threads };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("logmine-worker-{i}"))
            .build()?;
        Ok(Self { config, tokenizer, params, pool, cancel: CancelFlag::default() })
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Tokenizes and clusters one batch. Raw lines are dropped on return.
    pub fn run_batch(&self, batch: BatchId, lines: Vec<RawLine>) -> Result<ClusterSet, BatchFailure> {
        let limit = self.config.max_tokens;
        isolate(|| {
            let mut store = ClusterStore::new(batch, self.params);
            for line in &lines {
                let record = self.tokenizer.record(line.id, &line.text);
                if limit > 0 && record.tokens.len() > limit {
                    return Err(BatchFailure::Oversized {
                        offset: line.id,
                        tokens: record.tokens.len(),
                        limit,
                    });
                }
                store.insert(&record);
            }
            Ok(store.finish())
        })
    }

    // Reads up to `parallelism` batches. Returns the wave and whether the
    // source is exhausted.
    fn read_wave<S: LineSource + ?Sized>(
        &self,
        source: &mut S,
        next_batch: &mut BatchId,
    ) -> Result<(Vec<(BatchId, Vec<RawLine>)>, bool), PipelineError> {
        let mut wave = Vec::with_capacity(self.config.parallelism);
        while wave.len() < self.config.parallelism {
            let batch = *next_batch;
            match source.next_batch(self.config.batch_size) {
                Ok(Some(lines)) => {
                    wave.push((batch, lines));
                    *next_batch += 1;
                }
                Ok(None) => return Ok((wave, true)),
                Err(err) => return Err(PipelineError::Source { batch, source: err }),
            }
        }
        Ok((wave, false))
    }

    pub fn run<S: LineSource + ?Sized>(&self, source: &mut S) -> Result<JobOutcome, PipelineError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        info!(
            batch_size = self.config.batch_size,
            assign_threshold = self.config.assign_threshold,
            merge_threshold = self.config.merge_threshold,
            reduction = ?self.config.reduction,
            "clustering started"
        );

        let mut partials: Vec<ClusterSet> = Vec::new();
        let mut failed_batches = Vec::new();
        let mut total_records = 0usize;
        let mut next_batch: BatchId = 0;
        let mut cancelled = false;

        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                warn!(batches_read = next_batch, "cancelled; reducing completed batches");
                break;
            }
            let (wave, exhausted) = self.read_wave(source, &mut next_batch)?;
            if wave.is_empty() {
                break;
            }

            let results: Vec<(BatchId, usize, Result<ClusterSet, BatchFailure>)> = self.pool.install(|| {
                wave.into_par_iter()
                    .map(|(batch, lines)| {
                        let n = lines.len();
                        (batch, n, self.run_batch(batch, lines))
                    })
                    .collect()
            });

            for (batch, records, result) in results {
                if let Some(set) = settle(self.config.failure_policy, batch, records, result, &mut failed_batches)? {
                    debug!(batch, records, clusters = set.len(), skipped = set.skipped(), "batch clustered");
                    total_records += records;
                    partials.push(set);
                }
            }
            if exhausted {
                break;
            }
        }

        let batches = partials.len();
        let clusters = self
            .pool
            .install(|| reduce(partials, self.config.reduction, &self.params));
        let elapsed = timer.elapsed();
        info!(
            records = total_records,
            batches,
            failed = failed_batches.len(),
            clusters = clusters.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "clustering finished"
        );

        Ok(JobOutcome {
            clusters,
            total_records,
            batches,
            failed_batches,
            cancelled,
            reduction: self.config.reduction,
            started_at,
            elapsed,
        })
    }

    pub fn run_to_report<S: LineSource + ?Sized>(&self, source: &mut S) -> Result<ClusterReport, PipelineError> {
        let outcome = self.run(source)?;
        Ok(ClusterReport::from_outcome(outcome, self.config.min_members))
    }
}

/// Clusters in-memory lines in one call.
pub fn cluster_lines(lines: &[&str], config: ClusterConfig) -> Result<ClusterReport, PipelineError> {
    let coordinator = Coordinator::new(config)?;
    let mut source = VecSource::new(lines.iter().copied());
    coordinator.run_to_report(&mut source)
}

/// Single-threaded reference path: one store over every line, no batching.
pub fn cluster_single_pass(lines: &[&str], config: &ClusterConfig) -> Result<ClusterSet, PipelineError> {
    config.validate()?;
    let tokenizer = Tokenizer::from_config(config)?;
    let records: Vec<_> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| tokenizer.record(i as u64, l))
        .collect();
    Ok(cluster_batch(0, &records, ClusterParams::from_config(config)))
}
