//! Pure domain model: jobs, features, filters, results and errors.
//! Nothing in here performs I/O except the descriptor file helpers.

pub mod descriptor;
pub mod entities;
pub mod errors;
pub mod features;
pub mod filter;
