#![forbid(unsafe_code)]

//! Line-delimited JSON worker that fingerprints web technologies.

pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod protocol;
pub mod worker;

pub use config::WorkerConfig;
pub use errors::{AppError, Result};
