//! Utility functions for generating PostGIS SQL statements.
//!
//! Every identifier is quoted. Values are never inlined: inserts bind each
//! attribute as text and cast it on the server side.

use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::{FieldType, FieldValue, GeometryType, LayerDefinition};
use std::collections::HashSet;

pub const FID_COLUMN: &str = "ogc_fid";
pub const GML_ID_COLUMN: &str = "gml_id";
pub const GEOMETRY_COLUMN: &str = "wkb_geometry";

const MAX_IDENTIFIER_LEN: usize = 63;

/// Quotes an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "BIGINT",
        FieldType::Real => "DOUBLE PRECISION",
        FieldType::String => "VARCHAR",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Date => "DATE",
        FieldType::DateTime => "TIMESTAMP",
    }
}

/// `geometry(MultiPolygon,27700)`; an unknown type becomes the generic
/// `Geometry` and a missing SRID is left out.
pub fn geometry_column_type(geometry_type: GeometryType, srid: Option<i32>) -> String {
    match srid {
        Some(srid) => format!("geometry({},{})", geometry_type, srid),
        None => format!("geometry({})", geometry_type),
    }
}

/// Rejects schemas the table cannot hold: empty, overlong or duplicate
/// names, and names taken by the fixed columns in any case. Columns are
/// always quoted, so `Name` and `name` are distinct.
pub fn check_columns(sink: &str, layer: &LayerDefinition) -> Result<()> {
    let reserved = [FID_COLUMN, GML_ID_COLUMN, GEOMETRY_COLUMN];
    let mut seen = HashSet::new();
    for field in &layer.fields {
        let reason = if field.name.is_empty() {
            Some("field with an empty name".to_string())
        } else if field.name.len() > MAX_IDENTIFIER_LEN {
            Some(format!(
                "field '{}' is longer than {} bytes",
                field.name, MAX_IDENTIFIER_LEN
            ))
        } else if reserved.contains(&field.name.to_lowercase().as_str()) {
            Some(format!("field '{}' clashes with a fixed column", field.name))
        } else if !seen.insert(field.name.as_str()) {
            Some(format!("duplicate field '{}'", field.name))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ExtractError::SchemaError {
                sink: sink.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

pub fn create_table_sql(table: &str, layer: &LayerDefinition) -> String {
    let mut columns = vec![
        format!("{} SERIAL PRIMARY KEY", quote_ident(FID_COLUMN)),
        format!("{} VARCHAR", quote_ident(GML_ID_COLUMN)),
    ];
    for field in &layer.fields {
        columns.push(format!(
            "{} {}",
            quote_ident(&field.name),
            column_type(field.field_type)
        ));
    }
    columns.push(format!(
        "{} {}",
        quote_ident(GEOMETRY_COLUMN),
        geometry_column_type(layer.geometry_type, layer.epsg_code())
    ));
    format!("CREATE TABLE {} (\n  {}\n)", quote_ident(table), columns.join(",\n  "))
}

/// Server-side expression turning the text parameter `$n` into the column type.
fn value_expr(n: usize, field_type: FieldType) -> String {
    match field_type {
        FieldType::String => format!("${}::text", n),
        other => format!("${}::text::{}", n, column_type(other)),
    }
}

fn geometry_expr(n: usize, layer: &LayerDefinition) -> String {
    let mut expr = format!("ST_GeomFromGeoJSON(${}::text)", n);
    if let Some(srid) = layer.epsg_code() {
        expr = format!("ST_SetSRID({}, {})", expr, srid);
    }
    if matches!(
        layer.geometry_type,
        GeometryType::MultiPoint | GeometryType::MultiLineString | GeometryType::MultiPolygon
    ) {
        expr = format!("ST_Multi({})", expr);
    }
    expr
}

/// Parameters: `$1` the feature id, `$2..` the fields in order, then the
/// geometry as GeoJSON.
pub fn insert_sql(table: &str, layer: &LayerDefinition) -> String {
    let mut columns = vec![quote_ident(GML_ID_COLUMN)];
    let mut values = vec!["$1::text".to_string()];
    for (i, field) in layer.fields.iter().enumerate() {
        columns.push(quote_ident(&field.name));
        values.push(value_expr(i + 2, field.field_type));
    }
    columns.push(quote_ident(GEOMETRY_COLUMN));
    values.push(geometry_expr(layer.fields.len() + 2, layer));

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        values.join(", ")
    )
}

pub fn spatial_index_sql(table: &str) -> String {
    format!(
        "CREATE INDEX {} ON {} USING GIST ({})",
        quote_ident(&format!("{}_geom_idx", table)),
        quote_ident(table),
        quote_ident(GEOMETRY_COLUMN)
    )
}

/// Text form of a value for binding; `None` binds NULL.
pub fn to_param(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Real(r) => Some(r.to_string()),
        FieldValue::String(s) | FieldValue::Date(s) | FieldValue::DateTime(s) => Some(s.clone()),
        FieldValue::Boolean(b) => Some(b.to_string()),
    }
}
