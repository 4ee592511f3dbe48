//! # WFS Extract
//!
//! Pulls vector features from OGC Web Feature Services and writes each layer
//! twice: to a GeoJSON file and to a PostGIS table. Every row of the CSV job
//! table is one independent job; jobs run concurrently.
//!
//! This application follows the **Hexagonal Architecture** (Ports and Adapters)
//! to keep the extraction logic apart from the protocol and storage details.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use crate::application::orchestrator::JobOrchestrator;
use crate::application::runtime::RuntimeContext;
use crate::application::worker::ExtractionWorker;
use crate::config::{AppConfig, CliArgs};
use crate::infrastructure::csv_jobs::load_jobs;
use crate::infrastructure::geojson::geojson_sink_adapter::GeoJsonSinkAdapter;
use crate::infrastructure::postgis::postgis_sink_adapter::PostGisSinkAdapter;
use crate::infrastructure::wfs::wfs_source_adapter::WfsSourceAdapter;
use crate::ports::feature_sink_port::FeatureSinkPort;
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

fn main() {
    // 1. Initialize Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Parse Arguments
    let args = CliArgs::parse();

    // 3. Load Config
    let mut config = match &args.settings {
        Some(path) => match AppConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    config.merge_cli(&args);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    // 4. Read the job table
    let rows = match load_jobs(Path::new(&config.jobs_file)) {
        Ok(rows) => rows,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    let runnable = rows.iter().filter(|r| r.is_ok()).count();

    // 5. Runtime: worker pool and cancellation
    let runtime = match RuntimeContext::init(&config, runnable) {
        Ok(r) => r,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    if let Err(e) = runtime.install_signal_handler() {
        warn!("{}; jobs cannot be interrupted cleanly", e);
    }

    // 6. Initialize Hexagonal Components
    let source = Arc::new(WfsSourceAdapter::new(config.source.clone()));
    let sinks: Vec<Arc<dyn FeatureSinkPort>> = vec![
        Arc::new(GeoJsonSinkAdapter::new(config.output.build_file_index)),
        Arc::new(PostGisSinkAdapter::new(&config.output)),
    ];
    let worker = ExtractionWorker::new(
        source,
        sinks,
        runtime.cancel.clone(),
        config.source.paging_enabled,
    );

    // 7. Run Orchestrator
    let orchestrator =
        JobOrchestrator::new(worker, runtime, config.report_dir.as_ref().map(PathBuf::from));
    let results = orchestrator.run(rows);

    let failed = results.iter().filter(|r| r.is_failed()).count();
    info!(
        "Extraction finished. {}/{} jobs completed.",
        results.len() - failed,
        results.len()
    );
    if failed > 0 {
        process::exit(1);
    }
}
