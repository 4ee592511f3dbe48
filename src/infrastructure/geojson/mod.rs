pub mod geojson_sink_adapter;
