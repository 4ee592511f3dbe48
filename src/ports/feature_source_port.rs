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

//! # Feature Source Port
//!
//! This Port defines what it means to "read features" from a remote service.
//! It doesn't care IF the service is a WFS endpoint or an in-memory mock;
//! anything implementing `FeatureSourcePort` can feed an extraction worker.

use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::{BoundingBox, Feature, LayerDefinition};
use crate::domain::filter::AttributeFilter;
use std::path::Path;

/// Opens connections. One instance is shared by every worker, so it must be
/// `Send + Sync`; the connections it hands out belong to a single job.
pub trait FeatureSourcePort: Send + Sync {
    /// Connects using the request descriptor document at `descriptor`.
    fn open(&self, descriptor: &Path) -> Result<Box<dyn FeatureSource>>;
}

/// An open connection to a feature service.
pub trait FeatureSource: Send {
    fn list_layers(&self) -> Vec<String>;

    /// Case-sensitive exact lookup.
    fn layer(&self, name: &str) -> Result<Box<dyn FeatureLayer>>;
}

/// A resolved layer with its filters.
pub trait FeatureLayer: Send {
    fn definition(&self) -> &LayerDefinition;

    /// Pushed to the service where supported.
    fn set_spatial_filter(&mut self, bbox: BoundingBox);

    /// Rejects clauses naming a field the layer does not have.
    fn set_attribute_filter(&mut self, filter: Option<AttributeFilter>) -> Result<()>;

    /// Forward-only cursor over the filtered features. Not restartable.
    fn features(&mut self) -> Box<dyn Iterator<Item = Result<Feature>> + '_>;
}

/// Shared check for `set_attribute_filter` implementations.
pub fn check_filter_field(defn: &LayerDefinition, filter: &AttributeFilter) -> Result<usize> {
    defn.field_index(&filter.field).ok_or_else(|| {
        ExtractError::FilterError(format!(
            "field '{}' does not exist on layer '{}'",
            filter.field, defn.name
        ))
    })
}

/// Shared layer lookup producing a `LayerNotFoundError` that lists the
/// available names.
pub fn find_layer<'a, T>(
    layers: &'a [T],
    name: &str,
    layer_name: impl Fn(&T) -> &str,
) -> Result<&'a T> {
    layers
        .iter()
        .find(|l| layer_name(l) == name)
        .ok_or_else(|| ExtractError::LayerNotFoundError {
            layer: name.to_string(),
            available: layers
                .iter()
                .map(|l| layer_name(l))
                .collect::<Vec<_>>()
                .join(", "),
        })
}
