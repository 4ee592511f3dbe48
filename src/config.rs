//! Process-wide settings.
//!
//! Per-job parameters come from the CSV job table (see
//! `infrastructure::csv_jobs`). This module only covers what is shared by
//! every job: protocol options for the feature service, output behaviour and
//! the parallelism cap. Every field has a default, so running without a
//! settings file is the common case.

use crate::domain::errors::{ExtractError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::time::Duration;

pub const DEFAULT_JOBS_FILE: &str = "config.csv";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub jobs_file: String,
    pub source: SourceOptions,
    pub output: OutputConfig,
    /// Caps the number of jobs running at once. `None` runs every job at once.
    pub max_parallel_jobs: Option<usize>,
    /// Directory for the JSON run report. No report when unset.
    pub report_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jobs_file: DEFAULT_JOBS_FILE.to_string(),
            source: SourceOptions::default(),
            output: OutputConfig::default(),
            max_parallel_jobs: None,
            report_dir: None,
        }
    }
}

/// Fixed protocol options for the feature service. Built once before any job
/// starts and handed to the source adapter by value.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SourceOptions {
    pub paging_enabled: bool,
    pub page_size: u32,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// Merge schemas of all layers on capability load. Off: only the requested
    /// layer is described.
    pub load_multiple_layer_defn: bool,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Honour `HTTP_PROXY` / `HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            paging_enabled: true,
            page_size: 10_000,
            accept_invalid_certs: true,
            load_multiple_layer_defn: false,
            connect_timeout_secs: 30,
            request_timeout_secs: 300,
            use_system_proxy: true,
        }
    }
}

impl SourceOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub build_file_index: bool,
    pub build_database_index: bool,
    /// Used when a job's `db-server` has no explicit port.
    pub database_port: u16,
    pub database_connect_timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            build_file_index: true,
            build_database_index: false,
            database_port: 5432,
            database_connect_timeout_secs: 30,
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the settings file (YAML or JSON)
    #[arg(short, long)]
    pub settings: Option<String>,

    /// Path to the CSV job table
    #[arg(short, long, env = "WFS_EXTRACT_JOBS")]
    pub jobs: Option<String>,

    #[arg(long)]
    pub report_dir: Option<String>,

    #[arg(long)]
    pub max_parallel_jobs: Option<usize>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ExtractError::ConfigLoadError(format!("{}: {}", path, e)))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: AppConfig = if path.ends_with(".json") {
            serde_json::from_str(&contents)
                .map_err(|e| ExtractError::ConfigLoadError(format!("{}: {}", path, e)))?
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| ExtractError::ConfigLoadError(format!("{}: {}", path, e)))?
        };

        Ok(config)
    }

    pub fn merge_cli(&mut self, args: &CliArgs) {
        if let Some(j) = &args.jobs {
            self.jobs_file = j.clone();
        }
        if let Some(r) = &args.report_dir {
            self.report_dir = Some(r.clone());
        }
        if let Some(m) = args.max_parallel_jobs {
            self.max_parallel_jobs = Some(m);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs_file.trim().is_empty() {
            return Err(ExtractError::ConfigLoadError("jobs_file is empty".into()));
        }
        if self.source.page_size == 0 {
            return Err(ExtractError::ConfigLoadError(
                "source.page_size must be greater than zero".into(),
            ));
        }
        if self.source.connect_timeout_secs == 0 || self.source.request_timeout_secs == 0 {
            return Err(ExtractError::ConfigLoadError(
                "source timeouts must be greater than zero".into(),
            ));
        }
        if self.max_parallel_jobs == Some(0) {
            return Err(ExtractError::ConfigLoadError(
                "max_parallel_jobs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
