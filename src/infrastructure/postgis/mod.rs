pub mod connection;
pub mod postgis_sink_adapter;
pub mod sql_utils;
