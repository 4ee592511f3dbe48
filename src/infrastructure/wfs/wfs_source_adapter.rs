//! Concrete implementation of `FeatureSourcePort` for WFS 1.1.0 services.
//!
//! The adapter speaks plain key-value-pair requests:
//! 1. **GetCapabilities** when the source is opened, to list layers and their SRS.
//! 2. **DescribeFeatureType** when a layer is resolved, to learn field order and types.
//! 3. **GetFeature** (GeoJSON output) page by page while the worker iterates.
//!
//! The bounding box travels with every GetFeature request. The attribute
//! clause is evaluated here, client-side, and the bbox is re-checked against
//! each feature's envelope.

use crate::config::SourceOptions;
use crate::domain::descriptor::RequestDescriptor;
use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::{BoundingBox, Feature, FieldValue, Geometry, LayerDefinition};
use crate::domain::filter::AttributeFilter;
use crate::infrastructure::diagnostics::{self, Severity};
use crate::infrastructure::wfs::capabilities::{self, FeatureTypeInfo};
use crate::ports::feature_source_port::{
    check_filter_field, find_layer, FeatureLayer, FeatureSource, FeatureSourcePort,
};
use log::{debug, info};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;

const OUTPUT_FORMAT: &str = "application/json";

/// Opens WFS connections from request descriptor files.
pub struct WfsSourceAdapter {
    options: SourceOptions,
}

impl WfsSourceAdapter {
    pub fn new(options: SourceOptions) -> Self {
        Self { options }
    }
}

impl FeatureSourcePort for WfsSourceAdapter {
    fn open(&self, descriptor: &Path) -> Result<Box<dyn FeatureSource>> {
        let descriptor = RequestDescriptor::read_from(descriptor)?;
        let conn = WfsConnection::new(&descriptor, &self.options)?;

        let body = conn.get("GetCapabilities", &[])?;
        let layers = capabilities::parse_capabilities(&body).map_err(|e| {
            ExtractError::ConnectionError(format!(
                "Invalid capabilities document from {}: {}",
                conn.endpoint, e
            ))
        })?;
        info!("Connected to {} ({} layers)", conn.endpoint, layers.len());

        Ok(Box::new(WfsSource {
            conn,
            layers,
            paging: descriptor.paging_enabled() && self.options.paging_enabled,
            options: self.options.clone(),
        }))
    }
}

/// HTTP client plus everything needed to address one service. Each job gets
/// its own, so connection pools are never shared between jobs.
#[derive(Clone)]
struct WfsConnection {
    client: Client,
    endpoint: String,
    version: String,
    credentials: Option<(String, String)>,
}

impl WfsConnection {
    fn new(descriptor: &RequestDescriptor, options: &SourceOptions) -> Result<Self> {
        let mut builder = Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .connect_timeout(options.connect_timeout())
            .timeout(options.request_timeout());
        if !options.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(|e| {
            ExtractError::ConnectionError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: descriptor.url.clone(),
            version: descriptor.version.clone(),
            credentials: descriptor.credentials(),
        })
    }

    /// Issues one KVP request and returns the body. HTTP errors and OGC
    /// exception reports both become `ConnectionError`.
    fn get(&self, request: &str, params: &[(&'static str, String)]) -> Result<String> {
        let mut query: Vec<(&str, String)> = vec![
            ("service", "WFS".to_string()),
            ("version", self.version.clone()),
            ("request", request.to_string()),
        ];
        query.extend(params.iter().cloned());

        let mut req = self.client.get(&self.endpoint).query(&query);
        if let Some((user, pass)) = &self.credentials {
            req = req.basic_auth(user, Some(pass));
        }

        let resp = req.send().map_err(|e| {
            ExtractError::ConnectionError(format!("{} to {} failed: {}", request, self.endpoint, e))
        })?;
        let status = resp.status();
        let body = resp.text().map_err(|e| {
            ExtractError::ConnectionError(format!("{} response unreadable: {}", request, e))
        })?;

        if let Some(message) = capabilities::parse_exception(&body) {
            diagnostics::emit(Severity::Failure, i32::from(status.as_u16()), &message);
            return Err(ExtractError::ConnectionError(format!(
                "{} rejected by service: {}",
                request, message
            )));
        }
        if !status.is_success() {
            return Err(ExtractError::ConnectionError(format!(
                "{} to {} returned HTTP {}",
                request, self.endpoint, status
            )));
        }
        Ok(body)
    }
}

struct WfsSource {
    conn: WfsConnection,
    layers: Vec<FeatureTypeInfo>,
    paging: bool,
    options: SourceOptions,
}

impl FeatureSource for WfsSource {
    fn list_layers(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name.clone()).collect()
    }

    fn layer(&self, name: &str) -> Result<Box<dyn FeatureLayer>> {
        let info = find_layer(&self.layers, name, |l| l.name.as_str())?;

        let mut params = Vec::new();
        if !self.options.load_multiple_layer_defn {
            params.push(("typeName", name.to_string()));
        }
        let body = self.conn.get("DescribeFeatureType", &params)?;
        let described = capabilities::parse_feature_type_schema(&body, name).map_err(|e| {
            ExtractError::ConnectionError(format!("Invalid schema for layer '{}': {}", name, e))
        })?;
        debug!(
            "Layer {}: {} field(s), geometry {:?} in '{}'",
            name,
            described.fields.len(),
            described.geometry_type,
            described.geometry_field.as_deref().unwrap_or("-")
        );

        Ok(Box::new(WfsLayer {
            conn: self.conn.clone(),
            paging: self.paging,
            page_size: self.options.page_size as usize,
            definition: LayerDefinition {
                name: name.to_string(),
                fields: described.fields,
                geometry_type: described.geometry_type,
                srs: info.srs.clone(),
            },
            bbox: None,
            filter: None,
        }))
    }
}

struct WfsLayer {
    conn: WfsConnection,
    paging: bool,
    page_size: usize,
    definition: LayerDefinition,
    bbox: Option<BoundingBox>,
    /// The clause and the position of its field.
    filter: Option<(AttributeFilter, usize)>,
}

impl WfsLayer {
    fn fetch_page(&self, start_index: usize) -> Result<Vec<Feature>> {
        let params = get_feature_params(
            &self.definition,
            &self.conn.version,
            self.bbox.as_ref(),
            self.paging.then_some((self.page_size, start_index)),
        );
        let body = self.conn.get("GetFeature", &params)?;
        decode_page(&body, &self.definition).map_err(|e| {
            ExtractError::ConnectionError(format!(
                "Invalid GetFeature response for '{}': {}",
                self.definition.name, e
            ))
        })
    }

    fn accepts(&self, feature: &Feature) -> bool {
        if let Some(bbox) = &self.bbox {
            match feature.geometry.as_ref().and_then(Geometry::envelope) {
                Some(env) if env.intersects(bbox) => {}
                _ => return false,
            }
        }
        match &self.filter {
            Some((clause, idx)) => feature
                .values
                .get(*idx)
                .is_some_and(|value| clause.matches(value)),
            None => true,
        }
    }
}

impl FeatureLayer for WfsLayer {
    fn definition(&self) -> &LayerDefinition {
        &self.definition
    }

    fn set_spatial_filter(&mut self, bbox: BoundingBox) {
        self.bbox = Some(bbox);
    }

    fn set_attribute_filter(&mut self, filter: Option<AttributeFilter>) -> Result<()> {
        self.filter = match filter {
            Some(f) => {
                let idx = check_filter_field(&self.definition, &f)?;
                Some((f, idx))
            }
            None => None,
        };
        Ok(())
    }

    fn features(&mut self) -> Box<dyn Iterator<Item = Result<Feature>> + '_> {
        Box::new(PageCursor {
            layer: self,
            start_index: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Lazily walks GetFeature pages. A page shorter than the page size ends the
/// stream; a failed request ends it after yielding the error.
struct PageCursor<'a> {
    layer: &'a WfsLayer,
    start_index: usize,
    buffer: VecDeque<Feature>,
    exhausted: bool,
}

impl Iterator for PageCursor<'_> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(feature) = self.buffer.pop_front() {
                return Some(Ok(feature));
            }
            if self.exhausted {
                return None;
            }

            let page = match self.layer.fetch_page(self.start_index) {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            };
            let fetched = page.len();
            debug!(
                "{}: page at {} returned {} feature(s)",
                self.layer.definition.name, self.start_index, fetched
            );
            self.start_index += fetched;
            if !self.layer.paging || fetched == 0 || fetched < self.layer.page_size {
                self.exhausted = true;
            }
            self.buffer
                .extend(page.into_iter().filter(|f| self.layer.accepts(f)));
        }
    }
}

/// Geographic EPSG codes whose authority axis order is latitude first.
const LAT_LON_EPSG: &[i32] = &[4148, 4230, 4258, 4267, 4269, 4283, 4326, 4612, 4617, 4674];

/// WFS 1.1.0 reads coordinates tagged with an `urn:ogc:def:crs` identifier in
/// the CRS's own axis order. Short `EPSG:n` codes stay x/y.
fn swaps_axes(version: &str, defn: &LayerDefinition) -> bool {
    let urn = defn
        .srs
        .as_deref()
        .is_some_and(|srs| srs.to_ascii_lowercase().starts_with("urn:ogc:def:crs:epsg:"));
    version.starts_with("1.1")
        && urn
        && defn.epsg_code().is_some_and(|code| LAT_LON_EPSG.contains(&code))
}

/// Query parameters of a GetFeature request. `paging` is `(page size, start index)`.
///
/// The bbox is given in x/y; it is sent in lat/lon order when the service
/// version and the layer SRS call for it.
pub fn get_feature_params(
    defn: &LayerDefinition,
    version: &str,
    bbox: Option<&BoundingBox>,
    paging: Option<(usize, usize)>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("typeName", defn.name.clone()),
        ("outputFormat", OUTPUT_FORMAT.to_string()),
    ];
    if let Some(b) = bbox {
        let mut value = if swaps_axes(version, defn) {
            format!("{},{},{},{}", b.min_y, b.min_x, b.max_y, b.max_x)
        } else {
            format!("{},{},{},{}", b.min_x, b.min_y, b.max_x, b.max_y)
        };
        if let Some(srs) = &defn.srs {
            value.push(',');
            value.push_str(srs);
        }
        params.push(("bbox", value));
    }
    if let Some((page_size, start_index)) = paging {
        params.push(("maxFeatures", page_size.to_string()));
        params.push(("startIndex", start_index.to_string()));
    }
    params
}

/// Decodes a GeoJSON FeatureCollection into features aligned with `defn`.
pub fn decode_page(body: &str, defn: &LayerDefinition) -> std::result::Result<Vec<Feature>, String> {
    let doc: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let features = doc
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| "response has no 'features' array".to_string())?;
    Ok(features.iter().map(|f| decode_feature(f, defn)).collect())
}

fn decode_feature(raw: &Value, defn: &LayerDefinition) -> Feature {
    let fid = match raw.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let geometry = match raw.get("geometry") {
        None | Some(Value::Null) => None,
        Some(g) => match serde_json::from_value::<Geometry>(g.clone()) {
            Ok(geom) => Some(geom),
            Err(e) => {
                diagnostics::emit(
                    Severity::Warning,
                    0,
                    &format!(
                        "{}: dropping unsupported geometry of feature {}: {}",
                        defn.name,
                        fid.as_deref().unwrap_or("?"),
                        e
                    ),
                );
                None
            }
        },
    };

    let properties = raw.get("properties").and_then(Value::as_object);
    let values = defn
        .fields
        .iter()
        .map(|field| {
            properties
                .and_then(|p| p.get(&field.name))
                .map(|v| FieldValue::from_json(v, field.field_type))
                .unwrap_or(FieldValue::Null)
        })
        .collect();

    Feature {
        fid,
        geometry,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::{FieldDefn, FieldType, GeometryType};
    use crate::infrastructure::wfs::fixtures::{parks_page, CAPABILITIES, SCHEMA};
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    const AUTH: &str = "Basic YWxpY2U6c2VjcmV0";

    fn parks_defn() -> LayerDefinition {
        LayerDefinition {
            name: "city:parks".into(),
            fields: vec![
                FieldDefn::new("park_id", FieldType::Integer),
                FieldDefn::new("name", FieldType::String),
                FieldDefn::new("area", FieldType::Real),
                FieldDefn::new("status", FieldType::String),
                FieldDefn::new("opened", FieldType::Date),
            ],
            geometry_type: GeometryType::MultiPolygon,
            srs: Some("urn:ogc:def:crs:EPSG::27700".into()),
        }
    }

    fn query_value(target: &str, key: &str) -> Option<String> {
        let query = target.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then(|| v.to_string())
        })
    }

    /// Minimal HTTP/1.1 server answering WFS requests from the fixtures.
    /// Returns the endpoint URL and the log of request targets.
    fn serve_parks() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut authorized = false;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    let lower = line.to_lowercase();
                    if lower.starts_with("authorization:") && line.contains(AUTH) {
                        authorized = true;
                    }
                }
                let target = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                seen.lock().unwrap().push(target.clone());

                let (status, body) = if !authorized {
                    (401, "unauthorized".to_string())
                } else {
                    match query_value(&target, "request").as_deref() {
                        Some("GetCapabilities") => (200, CAPABILITIES.to_string()),
                        Some("DescribeFeatureType") => (200, SCHEMA.to_string()),
                        Some("GetFeature") => {
                            let start = query_value(&target, "startIndex")
                                .and_then(|s| s.parse().ok())
                                .unwrap_or(0);
                            (200, parks_page(start))
                        }
                        _ => (400, "bad request".to_string()),
                    }
                };
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        (format!("http://{}/wfs", addr), log)
    }

    fn descriptor_file(dir: &Path, url: &str, user_pwd: Option<&str>) -> std::path::PathBuf {
        let descriptor = RequestDescriptor {
            url: url.to_string(),
            user_pwd: user_pwd.map(str::to_string),
            http_auth: "BASIC".into(),
            version: "1.1.0".into(),
            paging_allowed: "ON".into(),
        };
        let path = dir.join("parks.xml");
        descriptor.write_to(&path).unwrap();
        path
    }

    fn options(page_size: u32) -> SourceOptions {
        SourceOptions {
            page_size,
            use_system_proxy: false,
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            ..SourceOptions::default()
        }
    }

    #[test]
    fn test_get_feature_params() {
        let defn = parks_defn();
        let bbox = BoundingBox::new(0.0, 0.0, 100.5, 100.0);
        let params = get_feature_params(&defn, "1.1.0", Some(&bbox), Some((2, 4)));
        assert_eq!(
            params,
            vec![
                ("typeName", "city:parks".to_string()),
                ("outputFormat", "application/json".to_string()),
                (
                    "bbox",
                    "0,0,100.5,100,urn:ogc:def:crs:EPSG::27700".to_string()
                ),
                ("maxFeatures", "2".to_string()),
                ("startIndex", "4".to_string()),
            ]
        );
        assert_eq!(get_feature_params(&defn, "1.1.0", None, None).len(), 2);
    }

    fn bbox_param(params: &[(&'static str, String)]) -> String {
        params
            .iter()
            .find(|(k, _)| *k == "bbox")
            .map(|(_, v)| v.clone())
            .unwrap()
    }

    #[test]
    fn test_geographic_urn_bbox_is_sent_lat_lon() {
        let trees = capabilities::parse_capabilities(CAPABILITIES)
            .unwrap()
            .into_iter()
            .find(|t| t.name == "city:trees")
            .unwrap();
        let mut defn = LayerDefinition {
            name: trees.name,
            fields: vec![FieldDefn::new("species", FieldType::String)],
            geometry_type: GeometryType::Point,
            srs: trees.srs,
        };
        let bbox = BoundingBox::new(-10.0, 50.0, 2.0, 60.0);

        let params = get_feature_params(&defn, "1.1.0", Some(&bbox), None);
        assert_eq!(bbox_param(&params), "50,-10,60,2,urn:ogc:def:crs:EPSG::4326");

        // WFS 1.0.0 is always x/y
        let params = get_feature_params(&defn, "1.0.0", Some(&bbox), None);
        assert_eq!(bbox_param(&params), "-10,50,2,60,urn:ogc:def:crs:EPSG::4326");

        // so is the short form of the same code
        defn.srs = Some("EPSG:4326".into());
        let params = get_feature_params(&defn, "1.1.0", Some(&bbox), None);
        assert_eq!(bbox_param(&params), "-10,50,2,60,EPSG:4326");
    }

    #[test]
    fn test_decode_page_aligns_values_with_schema() {
        let defn = parks_defn();
        let features = decode_page(&parks_page(1), &defn).unwrap();
        assert_eq!(features.len(), 2);

        let south = &features[0];
        assert_eq!(south.fid.as_deref(), Some("parks.2"));
        assert_eq!(south.values[0], FieldValue::Integer(2));
        assert_eq!(south.values[4], FieldValue::Null);

        // "3" arrives as a string and is coerced; "opened" is missing entirely
        let east = &features[1];
        assert_eq!(east.values[0], FieldValue::Integer(3));
        assert_eq!(east.values[2], FieldValue::Real(7.0));
        assert_eq!(east.values[4], FieldValue::Null);
        assert!(matches!(east.geometry, Some(Geometry::Polygon(_))));

        assert!(decode_page("{\"type\":\"Feature\"}", &defn).is_err());
    }

    #[test]
    fn test_unsupported_geometry_is_dropped() {
        let body = r#"{"features":[{"type":"Feature","geometry":{"type":"GeometryCollection","geometries":[]},"properties":{}}]}"#;
        let features = decode_page(body, &parks_defn()).unwrap();
        assert!(features[0].geometry.is_none());
        assert_eq!(features[0].values.len(), 5);
    }

    #[test]
    fn test_open_filter_and_page_through_service() {
        let (url, log) = serve_parks();
        let dir = tempfile::tempdir().unwrap();
        let path = descriptor_file(dir.path(), &url, Some("alice:secret"));

        let adapter = WfsSourceAdapter::new(options(2));
        let source = adapter.open(&path).unwrap();
        assert_eq!(source.list_layers(), vec!["city:parks", "city:trees"]);

        let mut layer = source.layer("city:parks").unwrap();
        assert_eq!(layer.definition().fields.len(), 5);
        assert_eq!(layer.definition().epsg_code(), Some(27700));

        layer.set_spatial_filter(BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        layer
            .set_attribute_filter(AttributeFilter::parse("status", "=", "active").unwrap())
            .unwrap();

        let ids: Vec<String> = layer
            .features()
            .map(|f| f.unwrap().fid.unwrap())
            .collect();
        // parks.2 fails the clause, parks.4 lies outside the bbox
        assert_eq!(ids, vec!["parks.1", "parks.3"]);

        let requests = log.lock().unwrap().clone();
        let pages: Vec<_> = requests
            .iter()
            .filter(|t| t.contains("request=GetFeature"))
            .map(|t| query_value(t, "startIndex").unwrap())
            .collect();
        assert_eq!(pages, vec!["0", "2", "4"]);
        assert!(requests
            .iter()
            .all(|t| !t.contains("secret") && !t.contains("alice")));
    }

    #[test]
    fn test_missing_layer_and_bad_filter_field() {
        let (url, _) = serve_parks();
        let dir = tempfile::tempdir().unwrap();
        let path = descriptor_file(dir.path(), &url, Some("alice:secret"));
        let source = WfsSourceAdapter::new(options(10)).open(&path).unwrap();

        let err = source.layer("city:roads").err().unwrap();
        assert!(matches!(err, ExtractError::LayerNotFoundError { .. }));
        // exact, case-sensitive match
        assert!(source.layer("CITY:PARKS").is_err());

        let mut layer = source.layer("city:parks").unwrap();
        let err = layer
            .set_attribute_filter(AttributeFilter::parse("colour", "=", "red").unwrap())
            .unwrap_err();
        assert!(matches!(err, ExtractError::FilterError(_)));
    }

    #[test]
    fn test_bad_credentials_fail_to_connect() {
        let (url, _) = serve_parks();
        let dir = tempfile::tempdir().unwrap();
        let path = descriptor_file(dir.path(), &url, Some("alice:wrong"));
        let err = WfsSourceAdapter::new(options(10)).open(&path).err().unwrap();
        assert!(matches!(err, ExtractError::ConnectionError(_)));
        assert!(err.to_string().contains("401"));
    }
}
