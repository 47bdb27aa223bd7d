//! Line-delimited JSON protocol spoken on stdin/stdout.
//!
//! - `codec`: byte-record framing with a configurable size bound.
//! - `request`: request decoding, body resolution and header normalization.
//! - `response`: the response sum type and its single-line encoding.

pub mod codec;
pub mod request;
pub mod response;

pub use request::{HeaderMap, Request};
pub use response::{Outcome, Response};
