// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Feature Model
//!
//! The geospatial "Nouns": layer schemas, field values, geometries and the
//! features that carry them between a source and its sinks.
//!
//! Geometries follow the GeoJSON layout (`{"type": ..., "coordinates": ...}`)
//! so they can be read from a WFS JSON response and written back out without
//! an intermediate representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Logical type of an attribute field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    String,
    Boolean,
    Date,
    DateTime,
}

/// One attribute column of a layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDefn {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDefn {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Declared geometry type of a layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GeometryType {
    #[default]
    Unknown,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryType::Unknown => write!(f, "Geometry"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// `LayerDefinition` is the blueprint shared by a source layer and every sink
/// layer created from it: field order, field types and spatial reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerDefinition {
    pub name: String,
    pub fields: Vec<FieldDefn>,
    pub geometry_type: GeometryType,
    /// Spatial reference identifier as advertised by the service
    /// (e.g. `urn:ogc:def:crs:EPSG::27700`).
    pub srs: Option<String>,
}

impl LayerDefinition {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Extracts the numeric EPSG code from the spatial reference, if any.
    pub fn epsg_code(&self) -> Option<i32> {
        let srs = self.srs.as_deref()?;
        srs.rsplit(|c: char| c == ':' || c == '#' || c == '/')
            .find(|part| !part.is_empty())
            .and_then(|code| code.parse().ok())
    }
}

/// A single attribute value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    String(String),
    Boolean(bool),
    Date(String),
    DateTime(String),
}

impl FieldValue {
    /// Coerces a JSON property into the declared field type.
    ///
    /// Values that do not fit the declared type are kept as strings so the
    /// sink, not the reader, decides whether to reject them.
    pub fn from_json(value: &Value, field_type: FieldType) -> Self {
        match (value, field_type) {
            (Value::Null, _) => FieldValue::Null,
            (Value::Number(n), FieldType::Integer) if n.as_i64().is_some() => {
                FieldValue::Integer(n.as_i64().unwrap_or_default())
            }
            (Value::String(s), FieldType::Integer) if s.trim().parse::<i64>().is_ok() => {
                FieldValue::Integer(s.trim().parse().unwrap_or_default())
            }
            (Value::Number(n), FieldType::Real) => FieldValue::Real(n.as_f64().unwrap_or_default()),
            (Value::String(s), FieldType::Real) if s.trim().parse::<f64>().is_ok() => {
                FieldValue::Real(s.trim().parse().unwrap_or_default())
            }
            (Value::Bool(b), FieldType::Boolean) => FieldValue::Boolean(*b),
            (Value::String(s), FieldType::Boolean) => match s.as_str() {
                "true" | "1" => FieldValue::Boolean(true),
                "false" | "0" => FieldValue::Boolean(false),
                _ => FieldValue::String(s.clone()),
            },
            (Value::String(s), FieldType::Date) => FieldValue::Date(s.clone()),
            (Value::String(s), FieldType::DateTime) => FieldValue::DateTime(s.clone()),
            (Value::String(s), _) => FieldValue::String(s.clone()),
            (other, _) => FieldValue::String(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Real(r) => Value::from(*r),
            FieldValue::String(s) | FieldValue::Date(s) | FieldValue::DateTime(s) => {
                Value::String(s.clone())
            }
            FieldValue::Boolean(b) => Value::Bool(*b),
        }
    }
}

/// A GeoJSON position: `[x, y]` or `[x, y, z]`.
pub type Position = Vec<f64>;

/// Geometry value, serialized exactly like a GeoJSON geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
        }
    }

    fn positions(&self) -> Box<dyn Iterator<Item = &Position> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => Box::new(ps.iter()),
            Geometry::MultiLineString(rings) | Geometry::Polygon(rings) => {
                Box::new(rings.iter().flatten())
            }
            Geometry::MultiPolygon(polys) => Box::new(polys.iter().flatten().flatten()),
        }
    }

    /// Axis-aligned envelope of all positions, `None` for an empty geometry.
    pub fn envelope(&self) -> Option<BoundingBox> {
        let mut iter = self.positions().filter(|p| p.len() >= 2);
        let first = iter.next()?;
        let mut bbox = BoundingBox::new(first[0], first[1], first[0], first[1]);
        for p in iter {
            bbox.min_x = bbox.min_x.min(p[0]);
            bbox.min_y = bbox.min_y.min(p[1]);
            bbox.max_x = bbox.max_x.max(p[0]);
            bbox.max_y = bbox.max_y.max(p[1]);
        }
        Some(bbox)
    }
}

/// Rectangular spatial filter (minX, minY, maxX, maxY).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Closed-interval intersection: touching edges count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

/// One spatial record. `values` is positional and aligned with the fields of
/// the `LayerDefinition` it was read with.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub fid: Option<String>,
    pub geometry: Option<Geometry>,
    pub values: Vec<FieldValue>,
}

impl Feature {
    pub fn value<'a>(&'a self, defn: &LayerDefinition, name: &str) -> Option<&'a FieldValue> {
        defn.field_index(name).and_then(|i| self.values.get(i))
    }
}
