//! Ports: the contracts the extraction worker depends on. Adapters under
//! `infrastructure` implement them; tests implement them with mocks.

pub mod feature_sink_port;
pub mod feature_source_port;
