//! Error types shared across the worker.

use std::fmt::{Display, Formatter};

/// Shared worker result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Worker error enumeration covering all failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Read or write failure on a protocol stream.
    Io(String),
    /// An input record exceeded the configured size bound.
    Framing(String),
    /// A record could not be decoded into a request.
    Decode(String),
    /// A response could not be serialized.
    Encode(String),
    /// Signature dataset loading or compilation failure.
    Signature(String),
}

impl AppError {
    /// Whether this error ends the processing loop.
    ///
    /// Oversize records and stream I/O failures are stream-fatal; every
    /// other variant is confined to the record that produced it.
    #[must_use]
    pub fn is_stream_fatal(&self) -> bool {
        matches!(self, Self::Framing(_) | Self::Io(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Framing(msg) => write!(f, "framing: {msg}"),
            Self::Decode(msg) => write!(f, "invalid json: {msg}"),
            Self::Encode(msg) => write!(f, "encode: {msg}"),
            Self::Signature(msg) => write!(f, "signature: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
