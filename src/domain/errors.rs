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

//! Core error definitions for the WFS extractor.
//!
//! This module provides a centralized `ExtractError` enum and a `Result` type
//! used throughout the application. Every variant belongs to exactly one
//! [`ErrorKind`], which is what ends up in the per-job report.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types encountered while loading configuration or running a job.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// No job configuration could be read at all. Fatal to the whole process.
    #[error("Failed to load job configuration: {0}")]
    ConfigLoadError(String),

    /// A single configuration row was malformed. Fatal to that row's job only.
    #[error("Invalid job configuration (row {row}): {reason}")]
    ConfigError { row: usize, reason: String },

    #[error("Connection to feature service failed: {0}")]
    ConnectionError(String),

    #[error("Layer '{layer}' not found in service (available: {available})")]
    LayerNotFoundError { layer: String, available: String },

    #[error("Invalid attribute filter: {0}")]
    FilterError(String),

    #[error("Sink '{sink}' rejected schema: {reason}")]
    SchemaError { sink: String, reason: String },

    /// Per-feature write failure. `systemic` marks conditions that will not go
    /// away on the next feature (disk full, dropped connection).
    #[error("Write to '{sink}' failed: {reason}")]
    WriteError {
        sink: String,
        reason: String,
        systemic: bool,
    },

    #[error("Spatial index on '{sink}' failed: {reason}")]
    IndexError { sink: String, reason: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Stable, serializable classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigLoadError,
    ConfigError,
    ConnectionError,
    LayerNotFoundError,
    FilterError,
    SchemaError,
    WriteError,
    IndexError,
    Cancelled,
    IoError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::ConfigLoadError(_) => ErrorKind::ConfigLoadError,
            ExtractError::ConfigError { .. } => ErrorKind::ConfigError,
            ExtractError::ConnectionError(_) => ErrorKind::ConnectionError,
            ExtractError::LayerNotFoundError { .. } => ErrorKind::LayerNotFoundError,
            ExtractError::FilterError(_) => ErrorKind::FilterError,
            ExtractError::SchemaError { .. } => ErrorKind::SchemaError,
            ExtractError::WriteError { .. } => ErrorKind::WriteError,
            ExtractError::IndexError { .. } => ErrorKind::IndexError,
            ExtractError::Cancelled => ErrorKind::Cancelled,
            ExtractError::IoError(_) => ErrorKind::IoError,
        }
    }

    /// Builds a `WriteError` from an I/O failure, classifying out-of-space and
    /// broken-pipe conditions as systemic.
    pub fn write_io(sink: &str, e: &std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let systemic = matches!(
            e.kind(),
            Io::StorageFull | Io::BrokenPipe | Io::PermissionDenied | Io::ReadOnlyFilesystem
        );
        ExtractError::WriteError {
            sink: sink.to_string(),
            reason: e.to_string(),
            systemic,
        }
    }

    pub fn is_systemic(&self) -> bool {
        matches!(self, ExtractError::WriteError { systemic: true, .. })
    }
}

/// A specialized Result type for the WFS extractor.
pub type Result<T> = std::result::Result<T, ExtractError>;
