//! # Job Table Loader
//!
//! Reads the CSV job table. The header row is skipped and columns are read by
//! position:
//!
//! `name, url, service-username, service-password, layer, sql-clause,
//! sql-field, sql-operator, sql-attribute, minX, minY, maxX, maxY,
//! output-path, db-server, db-name, db-username, db-password`
//!
//! A file that cannot be opened is fatal for the whole run. A row that cannot
//! be parsed only rejects that row.

use crate::domain::entities::{Credentials, DatabaseTarget, JobConfig};
use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::BoundingBox;
use crate::domain::filter::AttributeFilter;
use csv::{ReaderBuilder, StringRecord};
use log::{info, warn};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const COLUMN_COUNT: usize = 18;

const COL_NAME: usize = 0;
const COL_URL: usize = 1;
const COL_WFS_USER: usize = 2;
const COL_WFS_PASS: usize = 3;
const COL_LAYER: usize = 4;
const COL_SQL_CLAUSE: usize = 5;
const COL_SQL_FIELD: usize = 6;
const COL_SQL_OPERATOR: usize = 7;
const COL_SQL_ATTRIBUTE: usize = 8;
const COL_MIN_X: usize = 9;
const COL_MIN_Y: usize = 10;
const COL_MAX_X: usize = 11;
const COL_MAX_Y: usize = 12;
const COL_OUTPUT_PATH: usize = 13;
const COL_DB_SERVER: usize = 14;
const COL_DB_NAME: usize = 15;
const COL_DB_USER: usize = 16;
const COL_DB_PASS: usize = 17;

/// A row that could not become a `JobConfig`.
#[derive(Debug)]
pub struct RejectedJob {
    /// The row's name column, or `row <n>` when even that is missing.
    pub label: String,
    pub error: ExtractError,
}

pub type JobRow = std::result::Result<JobConfig, RejectedJob>;

/// Opens and reads the job table at `path`.
pub fn load_jobs(path: &Path) -> Result<Vec<JobRow>> {
    let file = std::fs::File::open(path).map_err(|e| {
        ExtractError::ConfigLoadError(format!("Cannot open job table {}: {}", path.display(), e))
    })?;
    let rows = read_jobs(file)?;
    info!(
        "Loaded {} job row(s) from {} ({} rejected)",
        rows.len(),
        path.display(),
        rows.iter().filter(|r| r.is_err()).count()
    );
    Ok(rows)
}

/// Parses every data row. Duplicate job names are rejected after the first
/// occurrence, since two jobs would overwrite each other's outputs.
pub fn read_jobs<R: Read>(reader: R) -> Result<Vec<JobRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    rdr.headers()
        .map_err(|e| ExtractError::ConfigLoadError(format!("Cannot read header row: {}", e)))?;

    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        // 1-based, counting the header.
        let row = i + 2;
        let parsed = match record {
            Ok(rec) => parse_row(row, &rec).map_err(|error| RejectedJob {
                label: rec
                    .get(COL_NAME)
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("row {}", row)),
                error,
            }),
            Err(e) => Err(RejectedJob {
                label: format!("row {}", row),
                error: ExtractError::ConfigError {
                    row,
                    reason: e.to_string(),
                },
            }),
        };

        let parsed = match parsed {
            Ok(job) if !seen.insert(job.name.clone()) => Err(RejectedJob {
                label: job.name.clone(),
                error: ExtractError::ConfigError {
                    row,
                    reason: format!("duplicate job name '{}'", job.name),
                },
            }),
            other => other,
        };

        if let Err(rejected) = &parsed {
            warn!("Rejecting job '{}': {}", rejected.label, rejected.error);
        }
        rows.push(parsed);
    }

    Ok(rows)
}

fn parse_row(row: usize, rec: &StringRecord) -> Result<JobConfig> {
    let invalid = |reason: String| ExtractError::ConfigError { row, reason };

    if rec.len() != COLUMN_COUNT {
        return Err(invalid(format!(
            "expected {} columns, found {}",
            COLUMN_COUNT,
            rec.len()
        )));
    }

    let text = |col: usize| rec.get(col).unwrap_or_default().trim();
    // Passwords are taken verbatim.
    let raw = |col: usize| rec.get(col).unwrap_or_default();
    let number = |col: usize, label: &str| -> Result<f64> {
        text(col)
            .parse::<f64>()
            .map_err(|_| invalid(format!("{} '{}' is not a number", label, text(col))))
    };

    let name = text(COL_NAME);
    if !JobConfig::is_safe_name(name) {
        return Err(invalid(format!(
            "job name '{}' must be a letter or underscore followed by letters, digits or underscores",
            name
        )));
    }

    let url = text(COL_URL);
    if url.is_empty() {
        return Err(invalid("url is empty".into()));
    }
    let layer = text(COL_LAYER);
    if layer.is_empty() {
        return Err(invalid("layer is empty".into()));
    }

    let bbox = BoundingBox::new(
        number(COL_MIN_X, "minX")?,
        number(COL_MIN_Y, "minY")?,
        number(COL_MAX_X, "maxX")?,
        number(COL_MAX_Y, "maxY")?,
    );
    if !bbox.is_valid() {
        return Err(invalid(format!(
            "bounding box ({}, {}, {}, {}) is inverted or not finite",
            bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
        )));
    }

    let attribute_filter = AttributeFilter::parse(
        text(COL_SQL_FIELD),
        text(COL_SQL_OPERATOR),
        raw(COL_SQL_ATTRIBUTE),
    )
    .map_err(|e| invalid(e.to_string()))?;

    let output_path = text(COL_OUTPUT_PATH);
    if output_path.is_empty() {
        return Err(invalid("output-path is empty".into()));
    }

    Ok(JobConfig {
        name: name.to_string(),
        url: url.to_string(),
        service_credentials: Credentials::from_parts(text(COL_WFS_USER), raw(COL_WFS_PASS)),
        layer: layer.to_string(),
        sql_clause: text(COL_SQL_CLAUSE).to_string(),
        attribute_filter,
        bbox,
        output_path: PathBuf::from(output_path),
        database: DatabaseTarget {
            server: text(COL_DB_SERVER).to_string(),
            database: text(COL_DB_NAME).to_string(),
            credentials: Credentials::from_parts(text(COL_DB_USER), raw(COL_DB_PASS)),
        },
    })
}
