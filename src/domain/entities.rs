//! # Domain Entities
//!
//! Entities are the "Nouns" of the pipeline: the job a worker is asked to
//! run, the stages it moves through, and the report card it hands back.

use crate::domain::errors::{ErrorKind, ExtractError};
use crate::domain::features::BoundingBox;
use crate::domain::filter::AttributeFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Maximum identifier length accepted by PostgreSQL.
pub const MAX_JOB_NAME_LEN: usize = 63;

/// Username/password pair. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Returns `None` when both parts are blank, so anonymous services and
    /// trusted database logins need no special casing downstream.
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() && password.is_empty() {
            None
        } else {
            Some(Self {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where the database copy of a job is written.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseTarget {
    /// `host` or `host:port`.
    pub server: String,
    pub database: String,
    pub credentials: Option<Credentials>,
}

/// `JobConfig` is one row of the job table: everything a worker needs to
/// extract one layer and write it twice.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// Used verbatim as the output file stem and the database table name.
    pub name: String,
    pub url: String,
    pub service_credentials: Option<Credentials>,
    pub layer: String,
    /// Free-form SQL clause column. Carried through but not interpreted.
    pub sql_clause: String,
    pub attribute_filter: Option<AttributeFilter>,
    pub bbox: BoundingBox,
    pub output_path: PathBuf,
    pub database: DatabaseTarget,
}

impl JobConfig {
    /// A job name must be usable unquoted as a file stem and as an SQL identifier.
    pub fn is_safe_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        name.len() <= MAX_JOB_NAME_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    /// Path of a per-job artifact inside the output directory, e.g. `parks.geojson`.
    pub fn output_file(&self, extension: &str) -> PathBuf {
        Path::new(&self.output_path).join(format!("{}.{}", self.name, extension))
    }
}

/// Stages of an extraction worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Connected,
    LayerResolved,
    Filtered,
    SchemaMapped,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal status of one job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Every feature reached every sink.
    Succeeded,
    /// The job completed but some feature writes were skipped.
    PartiallySucceeded,
    Failed,
}

/// Per-sink write counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SinkReport {
    pub sink: String,
    pub written: u64,
    pub failed: u64,
}

impl SinkReport {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            written: 0,
            failed: 0,
        }
    }

    /// Features were offered and none made it.
    pub fn rejected_all(&self) -> bool {
        self.written == 0 && self.failed > 0
    }
}

/// `ExtractionResult` is the "Report Card" for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub job: String,
    pub status: JobStatus,
    /// Terminal stage: `Done` or `Failed`.
    pub state: WorkerState,
    /// The stage the job was in when it failed.
    pub failed_at: Option<WorkerState>,
    pub features_read: u64,
    pub sinks: Vec<SinkReport>,
    /// Kind and message of the first error, fatal or skipped.
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Non-fatal spatial index failures.
    pub index_errors: Vec<String>,
    /// Seconds from worker start to completion.
    pub duration: f64,
}

impl ExtractionResult {
    /// Helper to create the result of a job that ran every stage.
    ///
    /// The status is derived from the sink counters. A sink that rejected
    /// every feature it was given fails the job in `Writing`.
    pub fn completed(
        job: String,
        features_read: u64,
        sinks: Vec<SinkReport>,
        first_error: Option<&ExtractError>,
        index_errors: Vec<String>,
        duration: f64,
    ) -> Self {
        let (status, state, failed_at) = if sinks.iter().any(SinkReport::rejected_all) {
            (JobStatus::Failed, WorkerState::Failed, Some(WorkerState::Writing))
        } else if sinks.iter().any(|s| s.failed > 0) {
            (JobStatus::PartiallySucceeded, WorkerState::Done, None)
        } else {
            (JobStatus::Succeeded, WorkerState::Done, None)
        };
        Self {
            job,
            status,
            state,
            failed_at,
            features_read,
            sinks,
            error_kind: first_error.map(ExtractError::kind),
            error: first_error.map(ToString::to_string),
            index_errors,
            duration,
        }
    }

    /// Helper to create a failure result, keeping whatever was counted so far.
    pub fn failure(
        job: String,
        failed_at: WorkerState,
        error: &ExtractError,
        features_read: u64,
        sinks: Vec<SinkReport>,
        duration: f64,
    ) -> Self {
        Self {
            job,
            status: JobStatus::Failed,
            state: WorkerState::Failed,
            failed_at: Some(failed_at),
            features_read,
            sinks,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            index_errors: Vec::new(),
            duration,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    pub fn written(&self, sink: &str) -> Option<u64> {
        self.sinks.iter().find(|s| s.sink == sink).map(|s| s.written)
    }
}
