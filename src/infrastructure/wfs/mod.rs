pub mod capabilities;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod wfs_source_adapter;
