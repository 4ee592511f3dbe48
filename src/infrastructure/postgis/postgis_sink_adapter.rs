//! Concrete implementation of `FeatureSinkPort` for a PostGIS table.
//!
//! The table is named after the job and dropped and recreated on every run.
//! Rows are inserted one statement at a time outside a transaction, so a
//! rejected feature costs exactly one row.

use crate::config::OutputConfig;
use crate::domain::entities::JobConfig;
use crate::domain::errors::{ExtractError, Result};
use crate::domain::features::{Feature, LayerDefinition};
use crate::infrastructure::postgis::connection::PgConnectionParams;
use crate::infrastructure::postgis::sql_utils;
use crate::ports::feature_sink_port::{FeatureSink, FeatureSinkPort};
use log::{debug, info};
use postgres::types::ToSql;
use postgres::{Client, Statement};
use std::time::Duration;

pub const SINK_NAME: &str = "postgis";

pub struct PostGisSinkAdapter {
    default_port: u16,
    connect_timeout: Duration,
    build_index: bool,
}

impl PostGisSinkAdapter {
    pub fn new(output: &OutputConfig) -> Self {
        Self {
            default_port: output.database_port,
            connect_timeout: Duration::from_secs(output.database_connect_timeout_secs),
            build_index: output.build_database_index,
        }
    }
}

fn schema_error(e: postgres::Error) -> ExtractError {
    ExtractError::SchemaError {
        sink: SINK_NAME.into(),
        reason: e.to_string(),
    }
}

impl FeatureSinkPort for PostGisSinkAdapter {
    fn name(&self) -> &str {
        SINK_NAME
    }

    fn create_or_replace(
        &self,
        job: &JobConfig,
        layer: &LayerDefinition,
    ) -> Result<Box<dyn FeatureSink>> {
        sql_utils::check_columns(SINK_NAME, layer)?;

        let params =
            PgConnectionParams::from_target(&job.database, self.default_port, self.connect_timeout)?;
        let mut client = params.connect()?;

        let ddl = format!(
            "{};\n{};",
            sql_utils::drop_table_sql(&job.name),
            sql_utils::create_table_sql(&job.name, layer)
        );
        debug!("{}", ddl);
        client.batch_execute(&ddl).map_err(schema_error)?;
        let insert = client
            .prepare(&sql_utils::insert_sql(&job.name, layer))
            .map_err(schema_error)?;
        info!(
            "Created table {} in {} on {}",
            job.name, params.dbname, params.host
        );

        Ok(Box::new(PostGisSink {
            client,
            table: job.name.clone(),
            layer: layer.clone(),
            insert,
            build_index: self.build_index,
        }))
    }
}

struct PostGisSink {
    client: Client,
    table: String,
    layer: LayerDefinition,
    insert: Statement,
    build_index: bool,
}

impl FeatureSink for PostGisSink {
    fn layer_definition(&self) -> &LayerDefinition {
        &self.layer
    }

    fn write_feature(&mut self, feature: Feature) -> Result<()> {
        if feature.values.len() != self.layer.fields.len() {
            return Err(ExtractError::WriteError {
                sink: SINK_NAME.into(),
                reason: format!(
                    "feature has {} values, table has {} columns",
                    feature.values.len(),
                    self.layer.fields.len()
                ),
                systemic: false,
            });
        }

        let mut params: Vec<Option<String>> = Vec::with_capacity(feature.values.len() + 2);
        params.push(feature.fid);
        params.extend(feature.values.iter().map(sql_utils::to_param));
        params.push(
            feature
                .geometry
                .as_ref()
                .and_then(|g| serde_json::to_string(g).ok()),
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        self.client
            .execute(&self.insert, &refs)
            .map(|_| ())
            .map_err(|e| ExtractError::WriteError {
                sink: SINK_NAME.into(),
                reason: e.to_string(),
                systemic: self.client.is_closed(),
            })
    }

    fn finish(&mut self) -> Result<()> {
        debug!("Finished loading table {}", self.table);
        Ok(())
    }

    fn build_spatial_index(&mut self) -> Result<()> {
        if !self.build_index {
            return Ok(());
        }
        self.client
            .batch_execute(&sql_utils::spatial_index_sql(&self.table))
            .map_err(|e| ExtractError::IndexError {
                sink: SINK_NAME.into(),
                reason: e.to_string(),
            })
    }

    fn discard(mut self: Box<Self>) -> Result<()> {
        self.client
            .batch_execute(&sql_utils::drop_table_sql(&self.table))
            .map_err(|e| ExtractError::WriteError {
                sink: SINK_NAME.into(),
                reason: format!("cannot drop table {}: {}", self.table, e),
                systemic: false,
            })?;
        debug!("Dropped table {}", self.table);
        Ok(())
    }
}
