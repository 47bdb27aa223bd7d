//! Unit tests for `RecordCodec` framing.
//!
//! Covers terminator handling, partial delivery, the size bound at and one
//! byte over the limit, and the final unterminated record at EOF.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use fingerprint_worker::protocol::codec::{RecordCodec, DEFAULT_MAX_RECORD_BYTES};
use fingerprint_worker::AppError;

#[test]
fn default_bound_is_fifty_mebibytes() {
    let codec = RecordCodec::default();
    assert_eq!(codec.max_record_bytes(), DEFAULT_MAX_RECORD_BYTES);
    assert_eq!(DEFAULT_MAX_RECORD_BYTES, 52_428_800);
}

#[test]
fn single_record_is_returned_without_terminator() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("{\"id\":\"r1\"}\n");

    let record = codec
        .decode(&mut buf)
        .expect("decode must succeed")
        .expect("a complete record must be returned");

    assert_eq!(&record[..], b"{\"id\":\"r1\"}");
    assert!(buf.is_empty(), "the terminator must be consumed");
}

#[test]
fn batched_records_are_each_returned() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("first\nsecond\n");

    let first = codec.decode(&mut buf).expect("first decode").expect("first record");
    let second = codec.decode(&mut buf).expect("second decode").expect("second record");
    let third = codec.decode(&mut buf).expect("third decode");

    assert_eq!(&first[..], b"first");
    assert_eq!(&second[..], b"second");
    assert!(third.is_none(), "no further records must be present");
}

#[test]
fn partial_record_is_buffered_until_newline() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("{\"id\":");

    let pending = codec.decode(&mut buf).expect("partial decode must not error");
    assert!(pending.is_none(), "partial record must not be emitted");

    buf.extend_from_slice(b"\"r1\"}\n");
    let record = codec
        .decode(&mut buf)
        .expect("decode after newline")
        .expect("complete record");
    assert_eq!(&record[..], b"{\"id\":\"r1\"}");
}

#[test]
fn carriage_return_before_newline_is_dropped() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("windows\r\nunix\n");

    let first = codec.decode(&mut buf).expect("decode").expect("record");
    let second = codec.decode(&mut buf).expect("decode").expect("record");

    assert_eq!(&first[..], b"windows");
    assert_eq!(&second[..], b"unix");
}

#[test]
fn empty_line_is_an_empty_record() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("\n");

    let record = codec.decode(&mut buf).expect("decode").expect("record");
    assert!(record.is_empty());
}

#[test]
fn record_of_exactly_the_bound_is_accepted() {
    let mut codec = RecordCodec::with_max_record_bytes(8);
    let mut buf = BytesMut::from("12345678\n");

    let record = codec.decode(&mut buf).expect("bound-sized record must decode");
    assert_eq!(record.as_deref(), Some(&b"12345678"[..]));
}

#[test]
fn bound_sized_record_with_crlf_is_accepted() {
    let mut codec = RecordCodec::with_max_record_bytes(8);
    let mut buf = BytesMut::from("12345678\r\n");

    let record = codec.decode(&mut buf).expect("terminator is not counted");
    assert_eq!(record.as_deref(), Some(&b"12345678"[..]));
}

#[test]
fn record_one_byte_over_the_bound_is_rejected() {
    let mut codec = RecordCodec::with_max_record_bytes(8);
    let mut buf = BytesMut::from("123456789\n");

    match codec.decode(&mut buf) {
        Err(AppError::Framing(msg)) => assert!(
            msg.contains("record too long"),
            "error must mention 'record too long', got: {msg}"
        ),
        other => panic!("expected Err(AppError::Framing), got: {other:?}"),
    }
}

#[test]
fn unterminated_oversize_record_fails_before_newline_arrives() {
    let mut codec = RecordCodec::with_max_record_bytes(8);

    let mut buf = BytesMut::from("123456789");
    let pending = codec.decode(&mut buf).expect("could still end in \\r\\n");
    assert!(pending.is_none());

    buf.extend_from_slice(b"0");
    let result = codec.decode(&mut buf);
    assert!(
        matches!(result, Err(AppError::Framing(_))),
        "oversize record must fail without waiting for a newline, got: {result:?}"
    );
}

#[test]
fn final_record_without_newline_is_returned_at_eof() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from("done\nlast");

    let first = codec.decode_eof(&mut buf).expect("decode_eof").expect("record");
    let last = codec.decode_eof(&mut buf).expect("decode_eof").expect("record");
    let end = codec.decode_eof(&mut buf).expect("decode_eof");

    assert_eq!(&first[..], b"done");
    assert_eq!(&last[..], b"last");
    assert!(end.is_none(), "empty buffer at EOF must end the stream");
}

#[test]
fn oversize_final_record_is_rejected_at_eof() {
    let mut codec = RecordCodec::with_max_record_bytes(4);
    let mut buf = BytesMut::from("12345");

    let result = codec.decode_eof(&mut buf);
    assert!(matches!(result, Err(AppError::Framing(_))), "got: {result:?}");
}

#[test]
fn invalid_utf8_is_passed_through_as_bytes() {
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::from(&[0xff_u8, 0xfe, b'\n'][..]);

    let record = codec
        .decode(&mut buf)
        .expect("framing must not validate UTF-8")
        .expect("record");
    assert_eq!(&record[..], &[0xff, 0xfe]);
}
