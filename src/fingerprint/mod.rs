//! Technology fingerprinting capability.
//!
//! The worker loop only depends on the [`Fingerprinter`] trait. The bundled
//! implementation, [`SignatureEngine`], matches Wappalyzer-style signatures
//! loaded from the embedded dataset and an optional override file.

pub mod engine;
pub mod signatures;

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::debug;

use crate::protocol::{HeaderMap, Request};

pub use engine::SignatureEngine;
pub use signatures::SignatureDataset;

/// Set of technology identifiers such as `WordPress` or `Nginx:1.25.3`.
///
/// Ordered for stable output; consumers must still treat it as a set.
pub type TechnologySet = BTreeSet<String>;

/// Identifies technologies from HTTP response headers and body content.
///
/// Implementations are shared read-only across every record and must not
/// keep per-request state.
pub trait Fingerprinter {
    /// Return the technologies evidenced by `headers` and `body`.
    fn fingerprint(&self, headers: &HeaderMap, body: &[u8]) -> TechnologySet;
}

/// Run `engine` against a decoded request.
///
/// Normalizes the header mapping, resolves the effective body and blocks
/// until the engine returns. There is no timeout.
pub fn invoke<F>(engine: &F, request: &Request) -> TechnologySet
where
    F: Fingerprinter + ?Sized,
{
    let headers = request.normalized_headers();
    let body = request.effective_body();

    let started = Instant::now();
    let technologies = engine.fingerprint(&headers, &body);
    debug!(
        id = %request.id,
        body_bytes = body.len(),
        detected = technologies.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "fingerprint complete"
    );

    technologies
}
