//! Service implementations
//!
//! Production implementations of the backend and store traits. Both talk
//! HTTP through reqwest; the status cache lives in `core`.

pub mod http_backend;
pub mod report_store;

#[cfg(test)]
mod tests;

pub use http_backend::HttpComputeBackend;
pub use report_store::HttpReportStore;
