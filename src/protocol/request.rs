//! Inbound request records.
//!
//! One request arrives per input record as a JSON object:
//!
//! | Field      | Type                        | Notes                                  |
//! |------------|-----------------------------|----------------------------------------|
//! | `id`       | string                      | echoed back on the response            |
//! | `headers`  | object of string → [string] | may be absent or `null`                |
//! | `body`     | string                      | literal body                           |
//! | `body_b64` | string                      | base64 body, supersedes `body` if valid |
//!
//! Unknown fields are ignored and `null` is treated as an absent field.

use std::borrow::Cow;
use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{AppError, Result};

/// Header mapping as supplied by the caller: name → ordered values.
///
/// Header names are not case-normalized at this layer.
pub type HeaderMap = HashMap<String, Vec<String>>;

/// Header mapping as it may appear on the wire, with `null` lists and
/// `null` values.
type WireHeaderMap = HashMap<String, Option<Vec<Option<String>>>>;

/// A decoded fingerprinting request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Caller-supplied correlation token, may be empty.
    pub id: String,
    /// Response headers of the fingerprinted page; `None` when never supplied.
    pub headers: Option<HeaderMap>,
    /// Literal body payload.
    pub body: String,
    /// Standard base64 encoding of the body; empty when not supplied.
    pub body_b64: String,
}

impl Request {
    /// Header mapping to pass to the fingerprinting engine.
    ///
    /// An absent mapping becomes an empty one; the request itself is left
    /// untouched.
    #[must_use]
    pub fn normalized_headers(&self) -> Cow<'_, HeaderMap> {
        match self.headers {
            Some(ref headers) => Cow::Borrowed(headers),
            None => Cow::Owned(HeaderMap::new()),
        }
    }

    /// Body bytes to fingerprint.
    ///
    /// A non-empty `body_b64` that decodes as standard base64 wins. If it is
    /// empty or fails to decode, the literal `body` is used; a decode failure
    /// is logged at `DEBUG` and is not reported to the caller.
    #[must_use]
    pub fn effective_body(&self) -> Cow<'_, [u8]> {
        if !self.body_b64.is_empty() {
            match decode_body_b64(&self.body_b64) {
                Ok(decoded) => return Cow::Owned(decoded),
                Err(err) => {
                    debug!(
                        id = %self.id,
                        error = %err,
                        "body_b64 is not valid base64, using literal body"
                    );
                }
            }
        }
        Cow::Borrowed(self.body.as_bytes())
    }
}

/// Decode one raw record into a [`Request`].
///
/// Decoding is lenient in the same places a typical JSON object decoder is:
///
/// - byte sequences that are not valid UTF-8 are replaced with U+FFFD;
/// - when a key repeats, the last occurrence wins;
/// - field names match case-insensitively, an exact match taking priority;
/// - `null` stands for an absent field, an empty header list or an empty
///   header value;
/// - a top-level `null` is an empty request.
///
/// # Errors
///
/// Returns [`AppError::Decode`] when the record is not valid JSON (including
/// empty records), is not an object, or a known field has the wrong type.
pub fn decode_record(record: &[u8]) -> Result<Request> {
    let mut object = match parse_value(record)? {
        Value::Object(object) => object,
        Value::Null => return Ok(Request::default()),
        other => {
            return Err(AppError::Decode(format!(
                "expected a JSON object, found {}",
                kind(&other)
            )))
        }
    };

    let headers: Option<HeaderMap> = field::<WireHeaderMap>(&mut object, "headers")?.map(|headers| {
        headers
            .into_iter()
            .map(|(name, values)| {
                let values: Vec<String> = values
                    .unwrap_or_default()
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect();
                (name, values)
            })
            .collect()
    });

    Ok(Request {
        id: field(&mut object, "id")?.unwrap_or_default(),
        headers,
        body: field(&mut object, "body")?.unwrap_or_default(),
        body_b64: field(&mut object, "body_b64")?.unwrap_or_default(),
    })
}

/// Best-effort extraction of the `id` from a record that failed to decode.
///
/// Succeeds only when the record is syntactically valid JSON with a string
/// `id` at the top level, e.g. when another field had the wrong type.
/// Returns an empty string otherwise.
#[must_use]
pub fn salvage_id(record: &[u8]) -> String {
    match parse_value(record) {
        Ok(Value::Object(mut object)) => match take_field(&mut object, "id") {
            Some(Value::String(id)) => id,
            _ => String::new(),
        },
        _ => String::new(),
    }
}

fn parse_value(record: &[u8]) -> Result<Value> {
    let parsed = match std::str::from_utf8(record) {
        Ok(text) => serde_json::from_str(text),
        Err(_) => serde_json::from_str(&String::from_utf8_lossy(record)),
    };
    parsed.map_err(|err| AppError::Decode(err.to_string()))
}

/// Remove the value for `name`, preferring an exact key over a
/// case-insensitive one.
fn take_field(object: &mut Map<String, Value>, name: &str) -> Option<Value> {
    if let Some(value) = object.remove(name) {
        return Some(value);
    }
    let key = object
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))?
        .clone();
    object.remove(&key)
}

fn field<T>(object: &mut Map<String, Value>, name: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    match take_field(object, name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|err| AppError::Decode(format!("field `{name}`: {err}"))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode standard padded base64, ignoring embedded line breaks.
fn decode_body_b64(encoded: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    if encoded.contains(['\r', '\n']) {
        let compact: String = encoded
            .chars()
            .filter(|c| !matches!(c, '\r' | '\n'))
            .collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(encoded)
    }
}
