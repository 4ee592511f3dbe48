//! The core application logic that runs every job of the table.
//!
//! Jobs run concurrently on the runtime's pool and are joined before `run`
//! returns. A failing job never stops the others; every row of the job table
//! yields exactly one result, in table order.

use crate::application::runtime::RuntimeContext;
use crate::application::worker::ExtractionWorker;
use crate::domain::entities::{ExtractionResult, JobStatus, SinkReport, WorkerState};
use crate::domain::errors::{ExtractError, Result};
use crate::infrastructure::csv_jobs::{JobRow, RejectedJob};
use log::{error, info, warn};
use rayon::prelude::*;
use serde_json::json;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Runs the jobs of one job table.
pub struct JobOrchestrator {
    worker: ExtractionWorker,
    runtime: RuntimeContext,
    report_dir: Option<PathBuf>,
}

impl JobOrchestrator {
    pub fn new(worker: ExtractionWorker, runtime: RuntimeContext, report_dir: Option<PathBuf>) -> Self {
        Self {
            worker,
            runtime,
            report_dir,
        }
    }

    /// Entry point for running every job.
    ///
    /// Rows rejected by the loader become `Failed` results without running a
    /// worker. The report, when configured, is written after the join.
    pub fn run(&self, rows: Vec<JobRow>) -> Vec<ExtractionResult> {
        let start_time = Instant::now();
        info!(
            "Running {} job(s) on {} thread(s)",
            rows.len(),
            self.runtime.num_threads
        );

        let results: Vec<ExtractionResult> = self.runtime.pool.install(|| {
            rows.into_par_iter()
                .map(|row| match row {
                    Ok(job) => self.worker.run(&job),
                    Err(rejected) => self.rejected(rejected),
                })
                .collect()
        });

        let duration = start_time.elapsed().as_secs_f64();
        log_summary(&results, duration);

        if let Some(dir) = &self.report_dir {
            match write_report(dir, &results, duration) {
                Ok(path) => info!("Report written to {}", path.display()),
                Err(e) => error!("Failed to write report: {}", e),
            }
        }

        results
    }

    fn rejected(&self, rejected: RejectedJob) -> ExtractionResult {
        ExtractionResult::failure(
            rejected.label,
            WorkerState::Init,
            &rejected.error,
            0,
            self.worker
                .sink_names()
                .into_iter()
                .map(SinkReport::new)
                .collect(),
            0.0,
        )
    }
}

fn log_summary(results: &[ExtractionResult], duration_secs: f64) {
    for r in results {
        let counts: Vec<String> = r
            .sinks
            .iter()
            .map(|s| format!("{}={}/{}", s.sink, s.written, s.written + s.failed))
            .collect();
        match r.status {
            JobStatus::Succeeded => info!(
                "{}: SUCCEEDED, {} read, {}",
                r.job,
                r.features_read,
                counts.join(" ")
            ),
            JobStatus::PartiallySucceeded => warn!(
                "{}: PARTIALLY_SUCCEEDED, {} read, {}",
                r.job,
                r.features_read,
                counts.join(" ")
            ),
            JobStatus::Failed => error!(
                "{}: FAILED in {} ({})",
                r.job,
                r.failed_at.map(|s| s.to_string()).unwrap_or_default(),
                r.error.as_deref().unwrap_or_default()
            ),
        }
    }
    let failed = results.iter().filter(|r| r.is_failed()).count();
    info!(
        "{} job(s) finished in {:.2}s, {} failed",
        results.len(),
        duration_secs,
        failed
    );
}

/// Writes `report_<timestamp>.json` into `dir` and returns its path.
pub fn write_report(dir: &Path, results: &[ExtractionResult], duration_secs: f64) -> Result<PathBuf> {
    let count = |status: JobStatus| results.iter().filter(|r| r.status == status).count();
    let features_read: u64 = results.iter().map(|r| r.features_read).sum();

    let report = json!({
        "summary": {
            "total_jobs": results.len(),
            "succeeded": count(JobStatus::Succeeded),
            "partially_succeeded": count(JobStatus::PartiallySucceeded),
            "failed": count(JobStatus::Failed),
            "features_read": features_read,
            "total_duration_seconds": duration_secs,
        },
        "details": results
    });

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let report_path = dir.join(format!("report_{}.json", timestamp));

    std::fs::create_dir_all(dir)?;
    let file = File::create(&report_path)?;
    serde_json::to_writer_pretty(file, &report)
        .map_err(|e| ExtractError::IoError(e.into()))?;

    Ok(report_path)
}
