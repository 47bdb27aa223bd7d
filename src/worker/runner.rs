//! The streaming protocol loop.
//!
//! Reads records from `input` through [`RecordCodec`], turns each into
//! exactly one [`Response`] and writes it to `output` before reading the
//! next record. Failures are handled in three tiers:
//!
//! | Failure                          | Effect                                         |
//! |----------------------------------|------------------------------------------------|
//! | record is not a valid request    | error response, loop continues                 |
//! | response cannot be serialised    | logged, fallback error response, loop continues |
//! | oversize record, stream I/O error | logged once, loop stops with the error        |

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::fingerprint::{self, Fingerprinter};
use crate::protocol::codec::{RecordCodec, DEFAULT_INITIAL_BUFFER_BYTES, DEFAULT_MAX_RECORD_BYTES};
use crate::protocol::request::{decode_record, salvage_id};
use crate::protocol::response::{encode_line, fallback_line, Response};
use crate::{AppError, Result};

/// Size bounds for the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Largest accepted record, excluding its line terminator.
    pub max_record_bytes: usize,
    /// Initial read buffer capacity; the buffer grows on demand.
    pub initial_buffer_bytes: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            initial_buffer_bytes: DEFAULT_INITIAL_BUFFER_BYTES,
        }
    }
}

/// Counters reported when the input is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Records read from the input.
    pub records_read: u64,
    /// Response lines written to the output.
    pub responses_written: u64,
    /// Records answered with a decode error.
    pub decode_failures: u64,
    /// Responses that could not be serialised.
    pub encode_failures: u64,
}

/// Run the protocol loop until `input` is exhausted.
///
/// `engine` is shared read-only by every record. Each record is fully
/// processed and its response flushed before the next record is read.
///
/// # Errors
///
/// - [`AppError::Framing`] if a record exceeds `limits.max_record_bytes`.
/// - [`AppError::Io`] if reading `input` or writing `output` fails.
///
/// Both are stream-fatal and already logged when returned.
pub async fn run_worker<F, R, W>(
    engine: &F,
    input: R,
    mut output: W,
    limits: StreamLimits,
) -> Result<StreamSummary>
where
    F: Fingerprinter + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let codec = RecordCodec::with_max_record_bytes(limits.max_record_bytes);
    let capacity = limits.initial_buffer_bytes.min(limits.max_record_bytes);
    let mut records = FramedRead::with_capacity(input, codec, capacity);
    let mut summary = StreamSummary::default();

    while let Some(item) = records.next().await {
        let record = match item {
            Ok(record) => record,
            Err(err) => {
                report_stream_fatal(&err, &summary);
                return Err(err);
            }
        };
        summary.records_read += 1;

        let span = info_span!("record", seq = summary.records_read);
        let response = span.in_scope(|| process_record(engine, &record));
        if response.error().is_some() {
            summary.decode_failures += 1;
        }

        if let Err(err) = emit(&mut output, &response, &mut summary)
            .instrument(span)
            .await
        {
            report_stream_fatal(&err, &summary);
            return Err(err);
        }
    }

    debug!(
        records = summary.records_read,
        responses = summary.responses_written,
        "input exhausted"
    );
    Ok(summary)
}

/// Turn one raw record into its response.
///
/// Never fails: a record that does not decode yields an error response
/// carrying whatever `id` could be salvaged.
pub fn process_record<F>(engine: &F, record: &[u8]) -> Response
where
    F: Fingerprinter + ?Sized,
{
    match decode_record(record) {
        Ok(request) => {
            let technologies = fingerprint::invoke(engine, &request);
            Response::detected(request.id, technologies)
        }
        Err(err) => {
            let id = salvage_id(record);
            warn!(id = %id, record_bytes = record.len(), error = %err, "rejecting malformed record");
            Response::failed(id, err.to_string())
        }
    }
}

/// Encode and write one response line.
///
/// A serialisation failure is logged and replaced by a fallback error line
/// for the same `id`; if that fails too the response is dropped. Only
/// output stream failures are returned.
async fn emit<W>(output: &mut W, response: &Response, summary: &mut StreamSummary) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    emit_with(output, response, summary, encode_line).await
}

async fn emit_with<W, E>(
    output: &mut W,
    response: &Response,
    summary: &mut StreamSummary,
    encode: E,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    E: FnOnce(&Response) -> Result<Vec<u8>>,
{
    let line = match encode(response) {
        Ok(line) => line,
        Err(err) => {
            summary.encode_failures += 1;
            error!(id = %response.id, error = %err, "failed to encode response");
            match fallback_line(&response.id, &err) {
                Ok(line) => line,
                Err(fallback_err) => {
                    error!(
                        id = %response.id,
                        error = %fallback_err,
                        "failed to encode fallback response, dropping"
                    );
                    return Ok(());
                }
            }
        }
    };

    output
        .write_all(&line)
        .await
        .map_err(|err| AppError::Io(format!("write failed: {err}")))?;
    output
        .flush()
        .await
        .map_err(|err| AppError::Io(format!("flush failed: {err}")))?;

    summary.responses_written += 1;
    Ok(())
}

fn report_stream_fatal(err: &AppError, summary: &StreamSummary) {
    error!(
        error = %err,
        records = summary.records_read,
        responses = summary.responses_written,
        "stream failure, stopping"
    );
}
