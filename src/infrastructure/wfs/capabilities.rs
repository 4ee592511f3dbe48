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

//! Readers for the XML documents a WFS server returns: capabilities,
//! feature type schemas (XSD) and OGC exception reports.
//!
//! Only the handful of elements the extractor needs are looked at; everything
//! else is skipped. Element names are matched on their local part so the
//! namespace prefixes chosen by a particular server do not matter.

use crate::domain::features::{FieldDefn, FieldType, GeometryType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// A layer advertised in the capabilities document.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTypeInfo {
    pub name: String,
    pub srs: Option<String>,
}

/// The parts of a feature type schema the extractor uses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescribedType {
    pub fields: Vec<FieldDefn>,
    pub geometry_field: Option<String>,
    pub geometry_type: GeometryType,
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn local(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

/// Lists the feature types of a `GetCapabilities` response in document order.
pub fn parse_capabilities(xml: &str) -> Result<Vec<FeatureTypeInfo>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut types = Vec::new();
    let mut current: Option<FeatureTypeInfo> = None;
    let mut text_target: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"FeatureType" => {
                    current = Some(FeatureTypeInfo {
                        name: String::new(),
                        srs: None,
                    })
                }
                b"Name" if current.is_some() => text_target = Some("name"),
                b"DefaultSRS" | b"DefaultCRS" | b"SRS" if current.is_some() => {
                    text_target = Some("srs")
                }
                _ => text_target = None,
            },
            Ok(Event::Text(t)) => {
                if let (Some(target), Some(ft)) = (text_target, current.as_mut()) {
                    let value = t.unescape().map_err(|e| e.to_string())?.trim().to_string();
                    match target {
                        "name" if ft.name.is_empty() => ft.name = value,
                        "srs" if ft.srs.is_none() => ft.srs = Some(value),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"FeatureType" {
                    if let Some(ft) = current.take() {
                        if !ft.name.is_empty() {
                            types.push(ft);
                        }
                    }
                }
                text_target = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("at byte {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
    }

    Ok(types)
}

enum Classified {
    Field(FieldType),
    Geometry(GeometryType),
}

/// Maps an XSD type reference to a field type, or to a geometry type when it
/// names a GML property type.
fn classify(type_ref: &str) -> Classified {
    let t = local(type_ref);
    if let Some(gml) = t.strip_suffix("PropertyType") {
        return Classified::Geometry(match gml {
            "Point" => GeometryType::Point,
            "LineString" | "Curve" => GeometryType::LineString,
            "Polygon" | "Surface" => GeometryType::Polygon,
            "MultiPoint" => GeometryType::MultiPoint,
            "MultiLineString" | "MultiCurve" => GeometryType::MultiLineString,
            "MultiPolygon" | "MultiSurface" => GeometryType::MultiPolygon,
            _ => GeometryType::Unknown,
        });
    }
    Classified::Field(match t {
        "int" | "integer" | "long" | "short" | "byte" | "nonNegativeInteger"
        | "positiveInteger" | "unsignedInt" | "unsignedLong" | "unsignedShort" => {
            FieldType::Integer
        }
        "double" | "float" | "decimal" => FieldType::Real,
        "boolean" => FieldType::Boolean,
        "date" => FieldType::Date,
        "dateTime" => FieldType::DateTime,
        _ => FieldType::String,
    })
}

/// Reads a `DescribeFeatureType` schema and returns the type of `type_name`.
///
/// The schema may describe one or several feature types. The top-level
/// element whose name matches the local part of `type_name` selects the
/// complex type; a schema with a single complex type is used as is.
pub fn parse_feature_type_schema(xml: &str, type_name: &str) -> Result<DescribedType, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut complex_types: HashMap<String, Vec<(String, String)>> = HashMap::new();
    let mut complex_order: Vec<String> = Vec::new();
    let mut top_elements: HashMap<String, String> = HashMap::new();

    let mut depth = 0usize;
    let mut current_type: Option<String> = None;
    let mut in_sequence = 0usize;
    // Element without a `type` attribute, waiting for a nested restriction base.
    let mut pending: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_start = matches!(event, Event::Start(_));
                match e.local_name().as_ref() {
                    b"complexType" => {
                        if let Some(name) = attr(e, b"name") {
                            complex_order.push(name.clone());
                            complex_types.entry(name.clone()).or_default();
                            if is_start {
                                current_type = Some(name);
                            }
                        }
                    }
                    b"sequence" if is_start => in_sequence += 1,
                    b"element" => {
                        let name = attr(e, b"name");
                        let type_ref = attr(e, b"type");
                        if in_sequence > 0 {
                            if let (Some(ct), Some(name)) = (&current_type, name) {
                                match type_ref {
                                    Some(t) => complex_types
                                        .entry(ct.clone())
                                        .or_default()
                                        .push((name, t)),
                                    None if is_start => pending = Some(name),
                                    None => {}
                                }
                            }
                        } else if depth == 1 {
                            if let (Some(name), Some(t)) = (name, type_ref) {
                                top_elements.insert(name, t);
                            }
                        }
                    }
                    b"restriction" => {
                        if let (Some(name), Some(base), Some(ct)) =
                            (pending.take(), attr(e, b"base"), &current_type)
                        {
                            complex_types
                                .entry(ct.clone())
                                .or_default()
                                .push((name, base));
                        }
                    }
                    _ => {}
                }
                if is_start {
                    depth += 1;
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"sequence" => in_sequence = in_sequence.saturating_sub(1),
                    b"complexType" if in_sequence == 0 => current_type = None,
                    b"element" => pending = None,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let wanted = local(type_name);
    let selected = top_elements
        .get(wanted)
        .map(|t| local(t).to_string())
        .filter(|t| complex_types.contains_key(t))
        .or_else(|| {
            let guess = format!("{}Type", wanted);
            complex_types.contains_key(&guess).then_some(guess)
        })
        .or_else(|| (complex_order.len() == 1).then(|| complex_order[0].clone()))
        .ok_or_else(|| format!("no schema found for feature type '{}'", type_name))?;

    let mut described = DescribedType::default();
    for (name, type_ref) in complex_types.remove(&selected).unwrap_or_default() {
        match classify(&type_ref) {
            Classified::Field(field_type) => {
                described.fields.push(FieldDefn::new(name, field_type))
            }
            Classified::Geometry(geometry_type) => {
                if described.geometry_field.is_none() {
                    described.geometry_field = Some(name);
                    described.geometry_type = geometry_type;
                }
            }
        }
    }
    Ok(described)
}

/// Returns the message of an OGC `ExceptionReport` / `ServiceExceptionReport`,
/// or `None` when the document is something else.
pub fn parse_exception(body: &str) -> Option<String> {
    if !body.trim_start().starts_with('<') {
        return None;
    }
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut is_report = false;
    let mut messages = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if !is_report => {
                let name = e.local_name();
                if name.as_ref() == b"ExceptionReport" || name.as_ref() == b"ServiceExceptionReport"
                {
                    is_report = true;
                } else {
                    return None;
                }
            }
            Ok(Event::Text(t)) if is_report => {
                if let Ok(text) = t.unescape() {
                    let text = text.trim();
                    if !text.is_empty() {
                        messages.push(text.to_string());
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    if is_report {
        Some(if messages.is_empty() {
            "service returned an empty exception report".to_string()
        } else {
            messages.join("; ")
        })
    } else {
        None
    }
}
