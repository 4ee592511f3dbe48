//! In-memory ports for worker and orchestrator tests.

use crate::application::runtime::CancellationToken;
use crate::domain::descriptor::RequestDescriptor;
use crate::domain::entities::{DatabaseTarget, JobConfig};
use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::{
    BoundingBox, Feature, FieldDefn, FieldType, FieldValue, Geometry, GeometryType,
    LayerDefinition,
};
use crate::domain::filter::AttributeFilter;
use crate::ports::feature_sink_port::{FeatureSink, FeatureSinkPort};
use crate::ports::feature_source_port::{
    check_filter_field, find_layer, FeatureLayer, FeatureSource, FeatureSourcePort,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub fn parks_layer() -> LayerDefinition {
    LayerDefinition {
        name: "parks".into(),
        fields: vec![
            FieldDefn::new("park_id", FieldType::Integer),
            FieldDefn::new("name", FieldType::String),
            FieldDefn::new("status", FieldType::String),
        ],
        geometry_type: GeometryType::Point,
        srs: Some("EPSG:27700".into()),
    }
}

fn park(id: i64, x: f64, status: &str) -> Feature {
    Feature {
        fid: Some(format!("parks.{}", id)),
        geometry: Some(Geometry::Point(vec![x, x])),
        values: vec![
            FieldValue::Integer(id),
            FieldValue::String(format!("Park {}", id)),
            FieldValue::String(status.into()),
        ],
    }
}

/// Two of these fall inside `(0,0)-(100,100)` and are `active`.
pub fn parks_features() -> Vec<Feature> {
    vec![
        park(1, 10.0, "active"),
        park(2, 20.0, "closed"),
        park(3, 55.0, "active"),
        park(4, 500.0, "active"),
    ]
}

pub fn job(name: &str, layer: &str, dir: &Path) -> JobConfig {
    JobConfig {
        name: name.into(),
        url: "https://example.org/wfs".into(),
        service_credentials: None,
        layer: layer.into(),
        sql_clause: String::new(),
        attribute_filter: AttributeFilter::parse("status", "=", "active").unwrap(),
        bbox: BoundingBox::new(0.0, 0.0, 100.0, 100.0),
        output_path: dir.to_path_buf(),
        database: DatabaseTarget {
            server: "localhost".into(),
            database: "gis".into(),
            credentials: None,
        },
    }
}

#[derive(Default)]
pub struct MockSourcePort {
    pub layers: Vec<(LayerDefinition, Vec<Feature>)>,
    pub fail_open: bool,
    /// Yield a read error after this many features.
    pub read_error_after: Option<usize>,
    /// Service URLs of every descriptor opened.
    pub opened: Mutex<Vec<String>>,
}

impl MockSourcePort {
    pub fn parks() -> Self {
        Self {
            layers: vec![(parks_layer(), parks_features())],
            ..Self::default()
        }
    }
}

impl FeatureSourcePort for MockSourcePort {
    fn open(&self, descriptor: &Path) -> Result<Box<dyn FeatureSource>> {
        let descriptor = RequestDescriptor::read_from(descriptor)?;
        self.opened.lock().unwrap().push(descriptor.url.clone());
        if self.fail_open {
            return Err(ExtractError::ConnectionError("connection refused".into()));
        }
        Ok(Box::new(MockSource {
            layers: self.layers.clone(),
            read_error_after: self.read_error_after,
        }))
    }
}

struct MockSource {
    layers: Vec<(LayerDefinition, Vec<Feature>)>,
    read_error_after: Option<usize>,
}

impl FeatureSource for MockSource {
    fn list_layers(&self) -> Vec<String> {
        self.layers.iter().map(|(d, _)| d.name.clone()).collect()
    }

    fn layer(&self, name: &str) -> Result<Box<dyn FeatureLayer>> {
        let (defn, features) = find_layer(&self.layers, name, |(d, _)| d.name.as_str())?;
        Ok(Box::new(MockLayer {
            defn: defn.clone(),
            features: features.clone(),
            bbox: None,
            filter: None,
            read_error_after: self.read_error_after,
        }))
    }
}

struct MockLayer {
    defn: LayerDefinition,
    features: Vec<Feature>,
    bbox: Option<BoundingBox>,
    filter: Option<(AttributeFilter, usize)>,
    read_error_after: Option<usize>,
}

impl FeatureLayer for MockLayer {
    fn definition(&self) -> &LayerDefinition {
        &self.defn
    }

    fn set_spatial_filter(&mut self, bbox: BoundingBox) {
        self.bbox = Some(bbox);
    }

    fn set_attribute_filter(&mut self, filter: Option<AttributeFilter>) -> Result<()> {
        self.filter = match filter {
            Some(f) => Some((f.clone(), check_filter_field(&self.defn, &f)?)),
            None => None,
        };
        Ok(())
    }

    fn features(&mut self) -> Box<dyn Iterator<Item = Result<Feature>> + '_> {
        let bbox = self.bbox;
        let filter = self.filter.clone();
        let selected = self.features.iter().filter(move |f| {
            let in_bbox = match (&bbox, f.geometry.as_ref().and_then(Geometry::envelope)) {
                (Some(b), Some(env)) => env.intersects(b),
                (Some(_), None) => false,
                (None, _) => true,
            };
            let matches = match &filter {
                Some((clause, idx)) => clause.matches(&f.values[*idx]),
                None => true,
            };
            in_bbox && matches
        });
        let limit = self.read_error_after;
        Box::new(selected.enumerate().map(move |(i, f)| match limit {
            Some(n) if i >= n => Err(ExtractError::ConnectionError("connection reset".into())),
            _ => Ok(f.clone()),
        }))
    }
}

/// What a mock sink saw for one job.
#[derive(Debug, Default, Clone)]
pub struct SinkRecord {
    pub defn: Option<LayerDefinition>,
    pub features: Vec<Feature>,
    pub finished: bool,
    pub indexed: bool,
    pub discarded: bool,
}

#[derive(Default, Clone)]
pub struct SinkBehaviour {
    /// Features with this fid fail with a recoverable error.
    pub reject_fid: Option<String>,
    /// Every feature fails with a recoverable error.
    pub reject_all: bool,
    /// After this many successful writes every write fails systemically.
    pub systemic_after: Option<u64>,
    /// Applies a different schema than requested.
    pub alter_schema: bool,
    pub fail_index: bool,
    /// Raised after the first successful write.
    pub cancel_after_first: Option<CancellationToken>,
}

pub struct MockSinkPort {
    pub name: String,
    pub behaviour: SinkBehaviour,
    pub records: Arc<Mutex<HashMap<String, SinkRecord>>>,
}

impl MockSinkPort {
    pub fn new(name: &str) -> Self {
        Self::with(name, SinkBehaviour::default())
    }

    pub fn with(name: &str, behaviour: SinkBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn record(&self, job: &str) -> SinkRecord {
        self.records
            .lock()
            .unwrap()
            .get(job)
            .cloned()
            .unwrap_or_default()
    }
}

impl FeatureSinkPort for MockSinkPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_or_replace(
        &self,
        job: &JobConfig,
        layer: &LayerDefinition,
    ) -> Result<Box<dyn FeatureSink>> {
        let mut defn = layer.clone();
        if self.behaviour.alter_schema {
            defn.fields.reverse();
        }
        self.records.lock().unwrap().insert(
            job.name.clone(),
            SinkRecord {
                defn: Some(defn.clone()),
                ..SinkRecord::default()
            },
        );
        Ok(Box::new(MockSink {
            name: self.name.clone(),
            job: job.name.clone(),
            defn,
            written: 0,
            behaviour: self.behaviour.clone(),
            records: self.records.clone(),
        }))
    }
}

struct MockSink {
    name: String,
    job: String,
    defn: LayerDefinition,
    written: u64,
    behaviour: SinkBehaviour,
    records: Arc<Mutex<HashMap<String, SinkRecord>>>,
}

impl MockSink {
    fn update(&self, f: impl FnOnce(&mut SinkRecord)) {
        let mut records = self.records.lock().unwrap();
        f(records.entry(self.job.clone()).or_default());
    }
}

impl FeatureSink for MockSink {
    fn layer_definition(&self) -> &LayerDefinition {
        &self.defn
    }

    fn write_feature(&mut self, feature: Feature) -> Result<()> {
        if let Some(limit) = self.behaviour.systemic_after {
            if self.written >= limit {
                return Err(ExtractError::WriteError {
                    sink: self.name.clone(),
                    reason: "no space left on device".into(),
                    systemic: true,
                });
            }
        }
        if self.behaviour.reject_all
            || (feature.fid.is_some() && feature.fid == self.behaviour.reject_fid)
        {
            return Err(ExtractError::WriteError {
                sink: self.name.clone(),
                reason: "value out of range".into(),
                systemic: false,
            });
        }
        self.written += 1;
        self.update(|r| r.features.push(feature));
        if let Some(token) = &self.behaviour.cancel_after_first {
            token.cancel();
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.update(|r| r.finished = true);
        Ok(())
    }

    fn build_spatial_index(&mut self) -> Result<()> {
        if self.behaviour.fail_index {
            return Err(ExtractError::IndexError {
                sink: self.name.clone(),
                reason: "index build failed".into(),
            });
        }
        self.update(|r| r.indexed = true);
        Ok(())
    }

    fn discard(self: Box<Self>) -> Result<()> {
        self.update(|r| {
            r.features.clear();
            r.discarded = true;
        });
        Ok(())
    }
}
