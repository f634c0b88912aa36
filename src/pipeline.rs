// src/pipeline.rs
//! The job state machine: `queued -> processing -> {completed, failed}`.
//! Groups are processed strictly sequentially and the job document is
//! persisted after every group, so the UI's polled snapshot stays valid
//! across a crash. A bad group is logged and counted, never retried, and
//! never aborts the batch; only pipeline-level failures (unreadable file,
//! repository breakage) take the whole job down.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDateTime, Utc};
use log::{debug, info, warn};

use crate::catalog::ReferenceCatalogs;
use crate::config::ImportConfig;
use crate::grouping::group_rows;
use crate::models::{ImportErrorEntry, ImportJob, ImportJobId, InvoiceGroup, JobStatus, SourceRow};
use crate::reconstruct::{reconstruct, ReconstructContext};
use crate::repo::{
    BlindIndexer, CatalogRepository, CustomerDirectory, InvoiceRepository, JobRepository,
};
use crate::sheet;

/// Injected collaborators for one pipeline run. Each job gets its own set;
/// no state is shared between concurrently running jobs except the store
/// behind these traits.
pub struct PipelineDeps<'a> {
    pub jobs: &'a dyn JobRepository,
    pub catalogs: &'a dyn CatalogRepository,
    pub customers: &'a dyn CustomerDirectory,
    pub invoices: &'a dyn InvoiceRepository,
    pub blind_indexer: &'a dyn BlindIndexer,
    pub config: &'a ImportConfig,
}

/// Final per-job accounting. `processed + failed == total` always holds at
/// a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Drives one import job to a terminal state.
///
/// The temp input file is removed once the job terminates, success or
/// failure. Returns the final accounting on completion; a pipeline-level
/// failure is persisted to the job record and then propagated.
pub async fn run_import_job(
    deps: &PipelineDeps<'_>,
    job_id: &ImportJobId,
    file_path: &Path,
) -> Result<JobOutcome> {
    let mut job = deps
        .jobs
        .find(job_id)
        .await
        .context("failed to load import job")?
        .ok_or_else(|| anyhow!("import job '{}' does not exist", job_id.0))?;

    info!(
        "Starting import job '{}' for tenant '{}' from '{}'",
        job.id.0,
        job.tenant_id.0,
        file_path.display()
    );
    job.status = JobStatus::Processing;
    job.updated_at = now();
    deps.jobs
        .update(&job)
        .await
        .context("failed to mark import job as processing")?;

    let result = match sheet::read_rows(file_path) {
        Ok(rows) => run_batch(&mut job, deps, rows).await,
        Err(e) => Err(e),
    };

    cleanup_input_file(file_path);
    finalize(&mut job, deps, result).await
}

/// Groups the rows, fixes `progress.total`, then processes every group in
/// order with per-group progress persistence.
async fn run_batch(
    job: &mut ImportJob,
    deps: &PipelineDeps<'_>,
    rows: Vec<SourceRow>,
) -> Result<()> {
    // Catalogs are loaded once and amortized across all groups.
    let tenant_id = job.tenant_id.clone();
    let catalogs = ReferenceCatalogs::load(deps.catalogs, &tenant_id).await?;

    let groups = group_rows(&job.id, rows);
    job.progress.total = groups.len();
    job.updated_at = now();
    deps.jobs
        .update(job)
        .await
        .context("failed to persist job after grouping")?;
    info!(
        "Job '{}': {} rows partitioned into {} invoice groups",
        job.id.0,
        groups.iter().map(|g| g.rows.len()).sum::<usize>(),
        groups.len()
    );

    let ctx = ReconstructContext {
        tenant_id: &tenant_id,
        catalogs: &catalogs,
        customers: deps.customers,
        blind_indexer: deps.blind_indexer,
        fuzzy_suggestion_threshold: deps.config.fuzzy_suggestion_threshold,
    };

    for group in &groups {
        match reconstruct(group, &ctx).await {
            Ok(invoice) => match deps.invoices.insert(&invoice).await {
                Ok(invoice_id) => {
                    debug!(
                        "Job '{}': group '{}' imported as invoice {}",
                        job.id.0,
                        group.group_key.as_str(),
                        invoice_id
                    );
                    job.record_success();
                }
                Err(e) => {
                    // Insert failures are group-local too: log, count, move on.
                    warn!(
                        "Job '{}': failed to persist invoice for group '{}': {:#}",
                        job.id.0,
                        group.group_key.as_str(),
                        e
                    );
                    job.record_failure(error_entry(
                        group,
                        format!("failed to persist invoice: {:#}", e),
                    ));
                }
            },
            Err(group_error) => {
                info!(
                    "Job '{}': group '{}' skipped: {}",
                    job.id.0,
                    group.group_key.as_str(),
                    group_error.message
                );
                job.record_failure(error_entry(group, group_error.message));
            }
        }

        job.updated_at = now();
        deps.jobs
            .update(job)
            .await
            .context("failed to persist job progress")?;
    }

    Ok(())
}

/// Sets the single terminal status and report message, persists the job,
/// and converts the run into a `JobOutcome`.
async fn finalize(
    job: &mut ImportJob,
    deps: &PipelineDeps<'_>,
    result: Result<()>,
) -> Result<JobOutcome> {
    let outcome = JobOutcome {
        total: job.progress.total,
        processed: job.progress.processed,
        failed: job.progress.failed,
    };

    match result {
        Ok(()) => {
            job.status = JobStatus::Completed;
            job.report_message = Some(format!(
                "Import completed: {} of {} invoice groups imported, {} failed.",
                outcome.processed, outcome.total, outcome.failed
            ));
            job.updated_at = now();
            deps.jobs
                .update(job)
                .await
                .context("failed to persist completed job")?;
            info!(
                "Job '{}' completed: {} imported, {} failed of {} groups",
                job.id.0, outcome.processed, outcome.failed, outcome.total
            );
            Ok(outcome)
        }
        Err(e) => {
            job.status = JobStatus::Failed;
            job.report_message = Some(format!("Import failed: {:#}", e));
            job.updated_at = now();
            if let Err(update_err) = deps.jobs.update(job).await {
                warn!(
                    "Job '{}': could not persist failed status: {:#}",
                    job.id.0, update_err
                );
            }
            Err(e)
        }
    }
}

fn error_entry(group: &InvoiceGroup, message: String) -> ImportErrorEntry {
    ImportErrorEntry {
        group_key: group.group_key.as_str().to_string(),
        message,
        raw_rows: serde_json::to_value(&group.rows).unwrap_or(serde_json::Value::Null),
    }
}

/// Guaranteed-cleanup step: the temp upload is removed after either
/// terminal state. Best effort only.
fn cleanup_input_file(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed temp import file '{}'", path.display()),
        Err(e) => warn!(
            "Failed to remove temp import file '{}': {}",
            path.display(),
            e
        ),
    }
}
