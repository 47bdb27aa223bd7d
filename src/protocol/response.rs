//! Outbound response records.
//!
//! A [`Response`] pairs the request `id` with an [`Outcome`]. On the wire it
//! is flattened to one JSON object per line:
//!
//! ```json
//! {"id":"r1","technologies":["PHP","WordPress"]}
//! {"id":"","technologies":[],"error":"invalid json: EOF while parsing an object at line 1 column 19"}
//! ```
//!
//! `technologies` is always present and `error` only appears on failure.

use serde::{Serialize, Serializer};

use crate::fingerprint::TechnologySet;
use crate::{AppError, Result};

/// Result of processing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The request was fingerprinted; the set may be empty.
    Detected(TechnologySet),
    /// The record could not be processed.
    Failed(String),
}

/// One response record, produced for exactly one input record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Echo of the request `id`, empty when it could not be recovered.
    pub id: String,
    /// Success or failure of this record.
    pub outcome: Outcome,
}

impl Response {
    /// Successful response carrying the detected technologies.
    #[must_use]
    pub fn detected(id: impl Into<String>, technologies: TechnologySet) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Detected(technologies),
        }
    }

    /// Failed response carrying an error message.
    #[must_use]
    pub fn failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Failed(message.into()),
        }
    }

    /// Error message, if this response reports a failure.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self.outcome {
            Outcome::Failed(ref message) => Some(message),
            Outcome::Detected(_) => None,
        }
    }
}

/// Wire shape of a [`Response`].
#[derive(Serialize)]
struct WireResponse<'a> {
    id: &'a str,
    technologies: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self.outcome {
            Outcome::Detected(ref technologies) => WireResponse {
                id: &self.id,
                technologies: technologies.iter().map(String::as_str).collect(),
                error: None,
            },
            Outcome::Failed(ref message) => WireResponse {
                id: &self.id,
                technologies: Vec::new(),
                error: Some(message),
            },
        };
        wire.serialize(serializer)
    }
}

/// Serialize `response` as a single `\n`-terminated JSON line.
///
/// # Errors
///
/// Returns [`AppError::Encode`] if serialization fails.
pub fn encode_line(response: &Response) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(response)
        .map_err(|err| AppError::Encode(format!("failed to serialise response: {err}")))?;
    line.push(b'\n');
    Ok(line)
}

/// Minimal error line standing in for a response that failed to encode.
///
/// # Errors
///
/// Returns [`AppError::Encode`] if even the fallback cannot be serialized.
pub fn fallback_line(id: &str, cause: &AppError) -> Result<Vec<u8>> {
    encode_line(&Response::failed(id, cause.to_string()))
}
