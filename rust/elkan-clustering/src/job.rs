// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! The centroid distance matrix job.
//!
//! Every input part file is one split, processed by one task. A task attempt
//! behaves like an independent worker: it loads the prior round's models,
//! refreshes the clustering policy, then computes the distance vector of each
//! record of its split, in order. There is no reduce phase.
//!
//! Output is staged in `<output>/_temporary/<job-id>/` and only moved into
//! `<output>/` once every task has succeeded. `_SUCCESS` is written last and
//! lists the committed part files.
//! A failed or cancelled job leaves neither part files nor `_SUCCESS`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use object_store::path::Path;
use rand::Rng;
use snafu::location;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use elkan_core::io::ObjectStore;
use elkan_core::utils::backoff::{retry_with_backoff, Backoff};
use elkan_core::{Error, Result, SUCCESS_MARKER, TEMPORARY_DIR};
use elkan_linalg::{DistanceMeasure, DistanceMeasureRegistry};

use crate::compute::CentroidDistanceComputer;
use crate::context::WorkerContext;
use crate::output::{encode_distance_rows, CommitManifest};
use crate::params::DistanceStepParams;
use crate::snapshot::{list_part_files, part_file_name, read_part};

/// What a successful task did.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TaskReport {
    task: usize,
    attempts: u32,
    k: usize,
    dimension: usize,
    num_records: usize,
}

/// Outcome of a committed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub job_id: String,
    pub num_tasks: usize,
    pub num_records: usize,
    /// Number of prior cluster models, and length of every distance vector.
    pub k: usize,
    pub dimension: usize,
    /// Task attempts beyond the first one.
    pub num_retries: u32,
}

/// Storage locations resolved once per job.
#[derive(Debug, Clone)]
struct JobLocations {
    input_store: ObjectStore,
    input: Path,
    output_store: ObjectStore,
    output: Path,
    prior_store: ObjectStore,
    prior: Path,
}

/// Computes the distances between the centers of the input records and the
/// prior round's cluster models.
#[derive(Debug, Clone)]
pub struct DistanceMatrixJob {
    input: String,
    output: String,
    params: DistanceStepParams,
    registry: DistanceMeasureRegistry,
    cancel: CancellationToken,
    stores: Option<(ObjectStore, ObjectStore, ObjectStore)>,
}

impl DistanceMatrixJob {
    pub fn new(
        input: impl Into<String>,
        output: impl Into<String>,
        params: DistanceStepParams,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            params,
            registry: DistanceMeasureRegistry::default(),
            cancel: CancellationToken::new(),
            stores: None,
        }
    }

    /// Resolve measure names through `registry` instead of the built-ins.
    pub fn with_registry(mut self, registry: DistanceMeasureRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Abort the job when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Use the given stores for the input, output and prior locations,
    /// which are then interpreted as paths inside them.
    pub fn with_stores(mut self, input: ObjectStore, output: ObjectStore, prior: ObjectStore) -> Self {
        self.stores = Some((input, output, prior));
        self
    }

    pub fn params(&self) -> &DistanceStepParams {
        &self.params
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn locations(&self) -> Result<JobLocations> {
        match &self.stores {
            Some((input_store, output_store, prior_store)) => Ok(JobLocations {
                input_store: input_store.clone(),
                input: Path::parse(&self.input)?,
                output_store: output_store.clone(),
                output: Path::parse(&self.output)?,
                prior_store: prior_store.clone(),
                prior: Path::parse(&self.params.prior_path)?,
            }),
            None => {
                let (input_store, input) = ObjectStore::from_uri(&self.input)?;
                let (output_store, output) = ObjectStore::from_uri(&self.output)?;
                let (prior_store, prior) = ObjectStore::from_uri(&self.params.prior_path)?;
                Ok(JobLocations {
                    input_store,
                    input,
                    output_store,
                    output,
                    prior_store,
                    prior,
                })
            }
        }
    }

    /// Run the job and commit its output.
    ///
    /// On error nothing is committed and staged output is removed.
    #[instrument(level = "info", skip(self), fields(input = %self.input, output = %self.output))]
    pub async fn execute(&self) -> Result<JobSummary> {
        self.params.validate()?;
        let measure = self.registry.resolve(&self.params.distance_measure)?;
        let locations = self.locations()?;
        self.check_output(&locations).await?;
        let splits = list_part_files(&locations.input_store, &locations.input).await?;

        let job_id = format!("{:016x}", rand::thread_rng().gen::<u64>());
        let temporary = locations.output.child(TEMPORARY_DIR);
        let staging = temporary.child(job_id.as_str());
        info!(
            "Starting centroid distance job {}: {} splits, measure={}, parallelism={}, max_task_attempts={}",
            job_id,
            splits.len(),
            measure.name(),
            self.params.parallelism,
            self.params.max_task_attempts
        );

        let result = self
            .run_tasks(&locations, splits, measure, &staging)
            .await
            .and_then(check_reports);
        let result = match result {
            Ok(reports) => self
                .commit(&locations, &staging, &job_id, &reports)
                .await
                .map(|()| reports),
            Err(e) => Err(e),
        };
        if let Err(e) = locations.output_store.remove_dir_all(&temporary).await {
            warn!("Failed to clean up staged output {}: {}", temporary, e);
        }

        let reports = result?;
        let summary = JobSummary {
            job_id,
            num_tasks: reports.len(),
            num_records: reports.iter().map(|r| r.num_records).sum(),
            k: reports.first().map_or(0, |r| r.k),
            dimension: reports.first().map_or(0, |r| r.dimension),
            num_retries: reports.iter().map(|r| r.attempts - 1).sum(),
        };
        info!(
            "Committed centroid distance job {}: {} records in {} tasks, K={}, D={}, {} retries",
            summary.job_id,
            summary.num_records,
            summary.num_tasks,
            summary.k,
            summary.dimension,
            summary.num_retries
        );
        Ok(summary)
    }

    /// Refuse to write into an output location that already holds files,
    /// committed or not, unless asked to overwrite it.
    async fn check_output(&self, locations: &JobLocations) -> Result<()> {
        let existing = locations
            .output_store
            .list_files(&locations.output)
            .await?;
        let Some(first) = existing.first() else {
            return Ok(());
        };
        if !self.params.overwrite {
            return Err(Error::invalid_input(
                format!(
                    "output location {} is not empty ({} files, first {})",
                    locations.output,
                    existing.len(),
                    first.location
                ),
                location!(),
            ));
        }
        info!(
            "Overwriting {} existing files at {}",
            existing.len(),
            locations.output
        );
        locations
            .output_store
            .remove_dir_all(&locations.output)
            .await
    }

    async fn run_tasks(
        &self,
        locations: &JobLocations,
        splits: Vec<Path>,
        measure: Arc<dyn DistanceMeasure>,
        staging: &Path,
    ) -> Result<Vec<TaskReport>> {
        let tasks = stream::iter(splits.into_iter().enumerate())
            .map(|(task, split)| {
                let measure = measure.clone();
                async move {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => Err(Error::Cancelled {
                            location: location!(),
                        }),
                        report = self.run_task(locations, task, &split, measure, staging) => report,
                    }
                }
            })
            .buffer_unordered(self.params.parallelism.max(1))
            .try_collect::<Vec<_>>();
        let mut reports = tasks.await?;
        reports.sort_by_key(|r| r.task);
        Ok(reports)
    }

    /// Run one task, re-executing it until it succeeds or its attempts run
    /// out.
    async fn run_task(
        &self,
        locations: &JobLocations,
        task: usize,
        split: &Path,
        measure: Arc<dyn DistanceMeasure>,
        staging: &Path,
    ) -> Result<TaskReport> {
        let attempts = AtomicU32::new(0);
        retry_with_backoff(
            &format!("task {task} ({split})"),
            self.params.max_task_attempts,
            Backoff::default(),
            |attempt| {
                attempts.store(attempt, Ordering::Relaxed);
                self.run_task_attempt(locations, task, attempt, split, measure.clone(), staging)
            },
        )
        .await
        .map_err(|e| {
            let attempts = attempts.load(Ordering::Relaxed);
            error!("Task {} failed after {} attempt(s): {}", task, attempts, e);
            Error::TaskFailed {
                task,
                attempts,
                source: Box::new(e),
            }
        })
    }

    #[instrument(level = "debug", skip(self, locations, measure, staging))]
    async fn run_task_attempt(
        &self,
        locations: &JobLocations,
        task: usize,
        attempt: u32,
        split: &Path,
        measure: Arc<dyn DistanceMeasure>,
        staging: &Path,
    ) -> Result<TaskReport> {
        let context = WorkerContext::load(
            &locations.prior_store,
            &locations.prior,
            measure,
            self.params.snapshot_load_retries,
        )
        .await?;
        let records = read_part(&locations.input_store, split).await?;
        let num_records = records.len();
        let k = context.models().k();
        let dimension = context.models().dimension();

        let worker = context.clone();
        let rows = tokio::task::spawn_blocking(move || {
            records
                .iter()
                .map(|record| CentroidDistanceComputer::compute_record(record, &worker))
                .collect::<Result<Vec<_>>>()
        })
        .await??;

        let data = encode_distance_rows(&rows, k)?;
        let path = staging.child(part_file_name(task));
        locations.output_store.put(&path, data).await?;
        debug!(
            "Task {} attempt {} wrote {} distance vectors to {}",
            task, attempt, num_records, path
        );
        Ok(TaskReport {
            task,
            attempts: attempt,
            k,
            dimension,
            num_records,
        })
    }

    /// Move staged part files into the output location, then mark it as
    /// committed.
    ///
    /// If any step fails, the part files already moved are deleted again.
    async fn commit(
        &self,
        locations: &JobLocations,
        staging: &Path,
        job_id: &str,
        reports: &[TaskReport],
    ) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                location: location!(),
            });
        }
        let mut moved = Vec::with_capacity(reports.len());
        let result = self
            .publish(locations, staging, job_id, reports, &mut moved)
            .await;
        if result.is_err() {
            for path in moved {
                if let Err(e) = locations.output_store.delete(&path).await {
                    warn!("Failed to roll back committed part file {}: {}", path, e);
                }
            }
        }
        result
    }

    async fn publish(
        &self,
        locations: &JobLocations,
        staging: &Path,
        job_id: &str,
        reports: &[TaskReport],
        moved: &mut Vec<Path>,
    ) -> Result<()> {
        let store = &locations.output_store;
        let mut parts = Vec::with_capacity(reports.len());
        for report in reports {
            let name = part_file_name(report.task);
            let target = locations.output.child(name.as_str());
            store.rename(&staging.child(name.as_str()), &target).await?;
            moved.push(target);
            parts.push(name);
        }
        let manifest = CommitManifest {
            job_id: job_id.to_string(),
            parts,
        };
        store
            .put(&locations.output.child(SUCCESS_MARKER), manifest.to_bytes()?)
            .await
    }
}

/// Every task must have seen the same model set.
fn check_reports(reports: Vec<TaskReport>) -> Result<Vec<TaskReport>> {
    if let Some(first) = reports.first() {
        if let Some(other) = reports
            .iter()
            .find(|r| r.k != first.k || r.dimension != first.dimension)
        {
            return Err(Error::InconsistentModelSet {
                message: format!(
                    "task {} loaded K={} D={} but task {} loaded K={} D={}; the snapshot changed during the job",
                    first.task, first.k, first.dimension, other.task, other.k, other.dimension
                ),
                location: location!(),
            });
        }
    }
    Ok(reports)
}

/// Run the job from an async context.
///
/// Returns `0` once the whole output has been committed, `1` otherwise.
pub async fn run_async(input: &str, output: &str, config: &HashMap<String, String>) -> i32 {
    let params = match DistanceStepParams::from_options(config) {
        Ok(params) => params,
        Err(e) => {
            error!("Invalid centroid distance job configuration: {}", e);
            return 1;
        }
    };
    match DistanceMatrixJob::new(input, output, params).execute().await {
        Ok(_) => 0,
        Err(e) => {
            error!("Centroid distance job failed: {}", e);
            1
        }
    }
}

/// Run the job to completion on a dedicated runtime.
///
/// Returns `0` once the whole output has been committed, `1` otherwise.
/// Must not be called from within an async runtime; use [`run_async`] there.
pub fn run(input: &str, output: &str, config: &HashMap<String, String>) -> i32 {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start the job runtime: {}", e);
            return 1;
        }
    };
    runtime.block_on(run_async(input, output, config))
}
