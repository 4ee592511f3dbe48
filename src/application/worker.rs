//! # Extraction Worker
//!
//! Runs one job through its stages:
//!
//! `Init → Connected → LayerResolved → Filtered → SchemaMapped → Writing → Done`
//!
//! Any fatal error moves the job to `Failed` and is turned into an
//! `ExtractionResult` right here; nothing escapes to the caller or to sibling
//! jobs. Per-feature write errors are counted, not fatal, unless they are
//! systemic and the sink has stopped making progress.

use crate::application::runtime::CancellationToken;
use crate::domain::descriptor::RequestDescriptor;
use crate::domain::entities::{ExtractionResult, JobConfig, SinkReport, WorkerState};
use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::LayerDefinition;
use crate::ports::feature_sink_port::{FeatureSink, FeatureSinkPort};
use crate::ports::feature_source_port::{FeatureLayer, FeatureSourcePort};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Counters and stage of a running job, kept outside the fallible path so a
/// failure still reports how far the job got.
struct Progress {
    state: WorkerState,
    features_read: u64,
    sinks: Vec<SinkReport>,
    /// First skipped-feature error; fatal errors are reported on their own.
    first_error: Option<ExtractError>,
}

impl Progress {
    fn advance(&mut self, job: &str, next: WorkerState) {
        debug!("[{}] {} -> {}", job, self.state, next);
        self.state = next;
    }
}

/// An open sink and the port it came from.
struct OpenSink {
    name: String,
    sink: Box<dyn FeatureSink>,
}

/// Executes jobs against a source port and a fixed set of sink ports.
/// Shared by every thread of the pool; all per-job state lives on the stack.
pub struct ExtractionWorker {
    source: Arc<dyn FeatureSourcePort>,
    sinks: Vec<Arc<dyn FeatureSinkPort>>,
    cancel: CancellationToken,
    paging: bool,
}

impl ExtractionWorker {
    pub fn new(
        source: Arc<dyn FeatureSourcePort>,
        sinks: Vec<Arc<dyn FeatureSinkPort>>,
        cancel: CancellationToken,
        paging: bool,
    ) -> Self {
        Self {
            source,
            sinks,
            cancel,
            paging,
        }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Runs `job` to completion. Never panics on job errors and never returns
    /// an `Err`: the outcome is in the result.
    pub fn run(&self, job: &JobConfig) -> ExtractionResult {
        let start = Instant::now();
        info!("[{}] Starting extraction of layer '{}'", job.name, job.layer);

        let mut progress = Progress {
            state: WorkerState::Init,
            features_read: 0,
            sinks: self.sink_names().into_iter().map(SinkReport::new).collect(),
            first_error: None,
        };

        match self.execute(job, &mut progress) {
            Ok(index_errors) => {
                let result = ExtractionResult::completed(
                    job.name.clone(),
                    progress.features_read,
                    progress.sinks,
                    progress.first_error.as_ref(),
                    index_errors,
                    start.elapsed().as_secs_f64(),
                );
                if result.is_failed() {
                    error!(
                        "[{}] A sink rejected every feature: {}",
                        job.name,
                        result.error.as_deref().unwrap_or_default()
                    );
                    return result;
                }
                info!(
                    "[{}] {:?}: {} feature(s) read in {:.2}s",
                    job.name, result.status, result.features_read, result.duration
                );
                result
            }
            Err(e) => {
                let failed_at = progress.state;
                error!("[{}] Failed in state {}: {}", job.name, failed_at, e);
                progress.advance(&job.name, WorkerState::Failed);
                ExtractionResult::failure(
                    job.name.clone(),
                    failed_at,
                    &e,
                    progress.features_read,
                    progress.sinks,
                    start.elapsed().as_secs_f64(),
                )
            }
        }
    }

    fn execute(&self, job: &JobConfig, progress: &mut Progress) -> Result<Vec<String>> {
        // Init -> Connected
        self.cancel.check()?;
        std::fs::create_dir_all(&job.output_path)?;
        let descriptor_path = job.output_file("xml");
        RequestDescriptor::from_job(job, self.paging).write_to(&descriptor_path)?;
        let opened = self.source.open(&descriptor_path);
        if let Err(e) = std::fs::remove_file(&descriptor_path) {
            warn!(
                "[{}] Could not remove request descriptor {}: {}",
                job.name,
                descriptor_path.display(),
                e
            );
        }
        let source = opened?;
        debug!(
            "[{}] Service offers {} layer(s)",
            job.name,
            source.list_layers().len()
        );
        progress.advance(&job.name, WorkerState::Connected);

        // Connected -> LayerResolved
        self.cancel.check()?;
        let mut layer = source.layer(&job.layer)?;
        progress.advance(&job.name, WorkerState::LayerResolved);

        // LayerResolved -> Filtered
        self.cancel.check()?;
        layer.set_spatial_filter(job.bbox);
        if let Some(filter) = &job.attribute_filter {
            debug!("[{}] Attribute filter: {}", job.name, filter);
        }
        layer.set_attribute_filter(job.attribute_filter.clone())?;
        progress.advance(&job.name, WorkerState::Filtered);

        // Filtered -> SchemaMapped
        self.cancel.check()?;
        let defn = layer.definition().clone();
        let mut sinks = self.open_sinks(job, &defn)?;
        progress.advance(&job.name, WorkerState::SchemaMapped);

        // SchemaMapped -> Writing -> Done
        match self.write_all(job, layer.as_mut(), &mut sinks, progress) {
            Ok(()) => {}
            Err(e) => {
                discard_all(&job.name, sinks);
                return Err(e);
            }
        }

        let mut index_errors = Vec::new();
        for open in &mut sinks {
            if let Err(e) = open.sink.build_spatial_index() {
                warn!("[{}] {}", job.name, e);
                index_errors.push(e.to_string());
            }
        }
        progress.advance(&job.name, WorkerState::Done);
        Ok(index_errors)
    }

    /// Creates every sink with the source schema and checks each one applied
    /// it unchanged. Sinks already created are discarded if a later one fails.
    fn open_sinks(&self, job: &JobConfig, defn: &LayerDefinition) -> Result<Vec<OpenSink>> {
        let mut opened: Vec<OpenSink> = Vec::with_capacity(self.sinks.len());
        for port in &self.sinks {
            let created = port.create_or_replace(job, defn).and_then(|sink| {
                if sink.layer_definition() == defn {
                    Ok(sink)
                } else {
                    let _ = sink.discard();
                    Err(ExtractError::SchemaError {
                        sink: port.name().to_string(),
                        reason: "applied layer definition differs from the source".into(),
                    })
                }
            });
            match created {
                Ok(sink) => opened.push(OpenSink {
                    name: port.name().to_string(),
                    sink,
                }),
                Err(e) => {
                    discard_all(&job.name, opened);
                    return Err(e);
                }
            }
        }
        Ok(opened)
    }

    fn write_all(
        &self,
        job: &JobConfig,
        layer: &mut dyn FeatureLayer,
        sinks: &mut [OpenSink],
        progress: &mut Progress,
    ) -> Result<()> {
        progress.advance(&job.name, WorkerState::Writing);

        for item in layer.features() {
            self.cancel.check()?;
            let feature = item?;
            progress.features_read += 1;

            for (open, report) in sinks.iter_mut().zip(progress.sinks.iter_mut()) {
                // Each sink gets its own copy, geometry included.
                match open.sink.write_feature(feature.clone()) {
                    Ok(()) => report.written += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            "[{}] Skipping feature {} on {}: {}",
                            job.name,
                            feature.fid.as_deref().unwrap_or("?"),
                            open.name,
                            e
                        );
                        if e.is_systemic() && report.failed >= report.written {
                            return Err(e);
                        }
                        if progress.first_error.is_none() {
                            progress.first_error = Some(e);
                        }
                    }
                }
            }
        }

        self.cancel.check()?;
        for open in sinks.iter_mut() {
            open.sink.finish()?;
        }
        Ok(())
    }
}

fn discard_all(job: &str, sinks: Vec<OpenSink>) {
    for open in sinks {
        let name = open.name;
        match open.sink.discard() {
            Ok(()) => debug!("[{}] Discarded partial output on {}", job, name),
            Err(e) => warn!("[{}] Could not discard output on {}: {}", job, name, e),
        }
    }
}
