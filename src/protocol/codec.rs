//! Record framing for the worker's input stream.
//!
//! [`RecordCodec`] splits a byte stream into newline-terminated records with
//! a configurable upper bound on record size. Unlike
//! [`tokio_util::codec::LinesCodec`] it yields raw bytes, so a record that is
//! not valid UTF-8 still reaches the request decoder, which repairs it,
//! instead of breaking the stream.
//!
//! # Usage
//!
//! Drive the codec with [`tokio_util::codec::FramedRead::with_capacity`],
//! seeding the read buffer well below the bound so the maximum is only
//! allocated when a record actually needs it.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use fingerprint_worker::protocol::codec::{RecordCodec, DEFAULT_INITIAL_BUFFER_BYTES};
//!
//! let records = FramedRead::with_capacity(stdin, RecordCodec::new(), DEFAULT_INITIAL_BUFFER_BYTES);
//! ```

use std::cmp;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Default maximum record size: 50 MiB.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 50 * 1024 * 1024;

/// Default initial capacity of the read buffer: 1 MiB.
pub const DEFAULT_INITIAL_BUFFER_BYTES: usize = 1024 * 1024;

/// Newline-delimited byte record decoder.
///
/// # Decoder
///
/// - Records are terminated by `\n`; a `\r` directly before it is dropped.
/// - The bound applies to the record content, not its terminator, so a
///   record of exactly `max_record_bytes` is accepted.
/// - A record longer than the bound returns [`AppError::Framing`]. Framing
///   errors are stream-fatal: the caller stops reading.
/// - At EOF, trailing bytes without a terminator form a final record.
#[derive(Debug)]
pub struct RecordCodec {
    max_record_bytes: usize,
    /// Offset already scanned for a newline in the current buffer.
    next_index: usize,
}

impl RecordCodec {
    /// Create a codec with the default [`DEFAULT_MAX_RECORD_BYTES`] bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_record_bytes(DEFAULT_MAX_RECORD_BYTES)
    }

    /// Create a codec that rejects records longer than `max_record_bytes`.
    #[must_use]
    pub fn with_max_record_bytes(max_record_bytes: usize) -> Self {
        Self {
            max_record_bytes,
            next_index: 0,
        }
    }

    /// The configured record size bound in bytes.
    #[must_use]
    pub fn max_record_bytes(&self) -> usize {
        self.max_record_bytes
    }

    fn finish(&self, mut record: BytesMut) -> Result<Bytes> {
        if record.last() == Some(&b'\r') {
            record.truncate(record.len() - 1);
        }
        if record.len() > self.max_record_bytes {
            return Err(self.too_large());
        }
        Ok(record.freeze())
    }

    fn too_large(&self) -> AppError {
        AppError::Framing(format!(
            "record too long: exceeded {} bytes",
            self.max_record_bytes
        ))
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RecordCodec {
    type Item = Bytes;
    type Error = AppError;

    /// Decode the next complete record from `src`.
    ///
    /// Returns `Ok(None)` while the record is still buffering. Only the
    /// first `max_record_bytes + 2` bytes (content, `\r`, `\n`) are scanned,
    /// so an unterminated oversize record fails as soon as it is buffered.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let scan_limit = self.max_record_bytes.saturating_add(2);
        let read_to = cmp::min(scan_limit, src.len());
        let newline = src[self.next_index..read_to]
            .iter()
            .position(|byte| *byte == b'\n');

        match newline {
            Some(offset) => {
                let newline_index = self.next_index + offset;
                self.next_index = 0;
                let mut record = src.split_to(newline_index + 1);
                record.truncate(newline_index);
                self.finish(record).map(Some)
            }
            None if src.len() >= scan_limit => {
                self.next_index = 0;
                Err(self.too_large())
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    /// Decode the final record when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(record) = self.decode(src)? {
            return Ok(Some(record));
        }
        if src.is_empty() {
            return Ok(None);
        }

        self.next_index = 0;
        let record = src.split_to(src.len());
        self.finish(record).map(Some)
    }
}
