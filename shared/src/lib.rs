//! Shared types for the policy calculation system
//!
//! Holds the calculation identity, metadata and status records observed by
//! every consumer, plus the settings, errors and logging used by both the
//! library and the binary.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::{BackendConfig, CalcSettings};
pub use errors::*;
pub use types::*;
