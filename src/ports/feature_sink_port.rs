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

//! # Feature Sink Port
//!
//! The contract for a destination that persists one layer: a file on disk,
//! a database table, or a mock in tests.

use crate::domain::entities::JobConfig;
use crate::domain::errors::Result;
use crate::domain::features::{Feature, LayerDefinition};

/// Creates sink layers. Shared by all workers.
pub trait FeatureSinkPort: Send + Sync {
    /// Short label used in results and logs, e.g. `geojson`.
    fn name(&self) -> &str;

    /// Creates the destination for `job`, replacing any previous output, and
    /// applies `layer` to it. Fails with `SchemaError` when a field cannot be
    /// represented.
    fn create_or_replace(&self, job: &JobConfig, layer: &LayerDefinition)
        -> Result<Box<dyn FeatureSink>>;
}

/// One open destination layer, owned by a single worker.
pub trait FeatureSink: Send {
    /// The schema as the sink applied it.
    fn layer_definition(&self) -> &LayerDefinition;

    /// Takes ownership: every sink gets its own copy of each feature.
    fn write_feature(&mut self, feature: Feature) -> Result<()>;

    /// Flushes and closes the destination.
    fn finish(&mut self) -> Result<()>;

    /// Called after `finish`. Failure is reported but not fatal.
    fn build_spatial_index(&mut self) -> Result<()>;

    /// Removes whatever was written so far.
    fn discard(self: Box<Self>) -> Result<()>;
}
