pub mod orchestrator;
pub mod runtime;
#[cfg(test)]
pub(crate) mod test_support;
pub mod worker;
