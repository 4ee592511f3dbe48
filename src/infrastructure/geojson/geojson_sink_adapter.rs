//! Infrastructure adapter writing one layer to a single-file GeoJSON dataset.
//!
//! For a job named `parks` the adapter owns two files in the job's output
//! directory:
//! - `parks.geojson`: the FeatureCollection, streamed feature by feature. The
//!   layer's spatial reference travels in its `crs` member.
//! - `parks.idx.json`: feature envelopes sorted by min-x (optional).
//!
//! Both are removed before a run starts, so a second run never appends to
//! the first.

use crate::domain::entities::JobConfig;
use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::{Feature, FieldValue, Geometry, LayerDefinition};
use crate::ports::feature_sink_port::{FeatureSink, FeatureSinkPort};
use log::debug;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SINK_NAME: &str = "geojson";

/// Concrete implementation of `FeatureSinkPort` for local GeoJSON files.
pub struct GeoJsonSinkAdapter {
    build_index: bool,
}

impl GeoJsonSinkAdapter {
    pub fn new(build_index: bool) -> Self {
        Self { build_index }
    }
}

/// Output files of one job.
#[derive(Debug, Clone)]
struct OutputFiles {
    data: PathBuf,
    index: PathBuf,
}

impl OutputFiles {
    fn for_job(job: &JobConfig) -> Self {
        Self {
            data: job.output_file("geojson"),
            index: job.output_file("idx.json"),
        }
    }

    fn all(&self) -> [&Path; 2] {
        [&self.data, &self.index]
    }

    fn remove_all(&self) -> io::Result<()> {
        for path in self.all() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// GeoJSON property names are free-form, but they must be non-empty and
/// unique to survive a round trip through a JSON object.
fn check_schema(layer: &LayerDefinition) -> Result<()> {
    let mut seen = HashSet::new();
    for field in &layer.fields {
        if field.name.is_empty() {
            return Err(ExtractError::SchemaError {
                sink: SINK_NAME.into(),
                reason: "field with an empty name".into(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ExtractError::SchemaError {
                sink: SINK_NAME.into(),
                reason: format!("duplicate field '{}'", field.name),
            });
        }
    }
    Ok(())
}

impl FeatureSinkPort for GeoJsonSinkAdapter {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn create_or_replace(
        &self,
        job: &JobConfig,
        layer: &LayerDefinition,
    ) -> Result<Box<dyn FeatureSink>> {
        check_schema(layer)?;

        let files = OutputFiles::for_job(job);
        fs::create_dir_all(&job.output_path)?;
        files.remove_all()?;

        let mut writer = BufWriter::new(File::create(&files.data)?);
        writer.write_all(collection_header(layer).as_bytes())?;
        debug!("Created {}", files.data.display());

        Ok(Box::new(GeoJsonSink {
            layer: layer.clone(),
            files,
            writer: Some(writer),
            written: 0,
            envelopes: Vec::new(),
            build_index: self.build_index,
        }))
    }
}

/// Everything before the first feature.
fn collection_header(layer: &LayerDefinition) -> String {
    let mut header = json!({
        "type": "FeatureCollection",
        "name": layer.name,
    });
    if let Some(srs) = &layer.srs {
        header["crs"] = json!({ "type": "name", "properties": { "name": srs } });
    }
    // Reopen the object so features can be streamed into it.
    let mut text = header.to_string();
    text.pop();
    text.push_str(",\"features\":[\n");
    text
}

#[derive(Serialize)]
struct FeatureRecord<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    geometry: Option<&'a Geometry>,
    properties: Properties<'a>,
}

/// Properties in schema order.
struct Properties<'a> {
    layer: &'a LayerDefinition,
    values: &'a [FieldValue],
}

impl Serialize for Properties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.layer.fields.iter().zip(self.values) {
            map.serialize_entry(&field.name, &value.to_json())?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct IndexEntry {
    /// Zero-based position of the feature in the collection.
    feature: u64,
    bbox: [f64; 4],
}

struct GeoJsonSink {
    layer: LayerDefinition,
    files: OutputFiles,
    writer: Option<BufWriter<File>>,
    written: u64,
    envelopes: Vec<IndexEntry>,
    build_index: bool,
}

impl GeoJsonSink {
    fn write_error(&self, reason: String) -> ExtractError {
        ExtractError::WriteError {
            sink: SINK_NAME.into(),
            reason,
            systemic: false,
        }
    }
}

impl FeatureSink for GeoJsonSink {
    fn layer_definition(&self) -> &LayerDefinition {
        &self.layer
    }

    fn write_feature(&mut self, feature: Feature) -> Result<()> {
        if feature.values.len() != self.layer.fields.len() {
            return Err(self.write_error(format!(
                "feature has {} values, layer has {} fields",
                feature.values.len(),
                self.layer.fields.len()
            )));
        }

        let record = FeatureRecord {
            kind: "Feature",
            id: feature.fid.as_deref(),
            geometry: feature.geometry.as_ref(),
            properties: Properties {
                layer: &self.layer,
                values: &feature.values,
            },
        };
        let mut text = serde_json::to_string(&record)
            .map_err(|e| self.write_error(format!("cannot encode feature: {}", e)))?;
        if self.written > 0 {
            text.insert_str(0, ",\n");
        }

        let writer = self.writer.as_mut().ok_or_else(|| ExtractError::WriteError {
            sink: SINK_NAME.into(),
            reason: "dataset already closed".into(),
            systemic: true,
        })?;
        writer
            .write_all(text.as_bytes())
            .map_err(|e| ExtractError::write_io(SINK_NAME, &e))?;

        if let Some(env) = feature.geometry.as_ref().and_then(Geometry::envelope) {
            self.envelopes.push(IndexEntry {
                feature: self.written,
                bbox: [env.min_x, env.min_y, env.max_x, env.max_y],
            });
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .write_all(b"\n]}\n")
                .and_then(|_| writer.flush())
                .map_err(|e| ExtractError::write_io(SINK_NAME, &e))?;
        }
        debug!(
            "Closed {} ({} features)",
            self.files.data.display(),
            self.written
        );
        Ok(())
    }

    fn build_spatial_index(&mut self) -> Result<()> {
        if !self.build_index {
            return Ok(());
        }
        self.envelopes
            .sort_by(|a, b| a.bbox[0].total_cmp(&b.bbox[0]));
        let doc = json!({
            "layer": self.layer.name,
            "count": self.envelopes.len(),
            "entries": self.envelopes,
        });
        let text = serde_json::to_string(&doc).map_err(|e| ExtractError::IndexError {
            sink: SINK_NAME.into(),
            reason: e.to_string(),
        })?;
        fs::write(&self.files.index, text).map_err(|e| ExtractError::IndexError {
            sink: SINK_NAME.into(),
            reason: format!("{}: {}", self.files.index.display(), e),
        })
    }

    fn discard(mut self: Box<Self>) -> Result<()> {
        drop(self.writer.take());
        self.files.remove_all()?;
        debug!("Discarded {}", self.files.data.display());
        Ok(())
    }
}
