//! Adapters: the job table reader, the WFS source, the GeoJSON and PostGIS
//! sinks, and the diagnostics handler they share.

pub mod csv_jobs;
pub mod diagnostics;
pub mod geojson;
pub mod postgis;
pub mod wfs;
