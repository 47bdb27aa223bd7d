//! Worker process loop and exit statuses.

pub mod runner;

pub use runner::{process_record, run_worker, StreamLimits, StreamSummary};

/// Exit status when startup fails (configuration, dataset, logging, runtime).
pub const EXIT_STARTUP_FAILURE: u8 = 1;

/// Exit status when the loop stops on a stream-fatal condition.
pub const EXIT_STREAM_FATAL: u8 = 2;
