//! Streaming RESP2 decoder.
//!
//! [`decode`] frames exactly one complete value from the front of a read
//! buffer. Incomplete input consumes nothing, so the caller can keep
//! appending socket reads and retrying without losing partial frames
//! across read boundaries.

use std::io::Cursor;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use super::Value;

/// Framing failure. `Incomplete` is internal backpressure, surfaced by
/// [`decode`] as `Ok(None)`; everything else loses stream position and is
/// fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("incomplete frame")]
    Incomplete,

    #[error("invalid protocol: {0}")]
    Invalid(String),
}

/// Arrays nested past this depth are treated as malformed.
const MAX_DEPTH: usize = 64;

/// Decode one complete value from the front of `buf`.
///
/// Returns the value together with the raw bytes it was framed from (the
/// session inspects those for the command blocklist). `Ok(None)` means
/// more bytes are needed; `buf` is only advanced on success.
pub fn decode(buf: &mut BytesMut) -> Result<Option<(Value, Bytes)>, FrameError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(&buf[..]);
    match parse_value(&mut cursor, 0) {
        Ok(value) => {
            let len = cursor.position() as usize;
            let raw = buf.split_to(len).freeze();
            Ok(Some((value, raw)))
        }
        Err(FrameError::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_value(cursor: &mut Cursor<&[u8]>, depth: usize) -> Result<Value, FrameError> {
    if depth > MAX_DEPTH {
        return Err(FrameError::Invalid(format!(
            "nesting deeper than {MAX_DEPTH}"
        )));
    }

    match peek_u8(cursor)? {
        b'+' => {
            cursor.advance(1);
            let line = read_line(cursor)?;
            Ok(Value::Simple(Bytes::copy_from_slice(line)))
        }
        b'-' => {
            cursor.advance(1);
            let line = read_line(cursor)?;
            Ok(Value::Error(Bytes::copy_from_slice(line)))
        }
        b':' => {
            cursor.advance(1);
            let n = read_decimal(cursor)?;
            Ok(Value::Integer(n))
        }
        b'$' => {
            cursor.advance(1);
            let len = read_decimal(cursor)?;
            if len == -1 {
                return Ok(Value::Bulk(None));
            }
            if len < -1 {
                return Err(FrameError::Invalid(format!("bulk length {len}")));
            }
            let payload = Bytes::copy_from_slice(read_exact(cursor, len as usize)?);
            eat_line_ending(cursor)?;
            Ok(Value::Bulk(Some(payload)))
        }
        b'*' => {
            cursor.advance(1);
            let count = read_decimal(cursor)?;
            if count == -1 {
                return Ok(Value::Array(None));
            }
            if count < -1 {
                return Err(FrameError::Invalid(format!("array length {count}")));
            }
            // Capacity hint only; the declared count is untrusted input.
            let mut items = Vec::with_capacity((count as usize).min(1024));
            for _ in 0..count {
                items.push(parse_value(cursor, depth + 1)?);
            }
            Ok(Value::Array(Some(items)))
        }
        _ => parse_inline(cursor),
    }
}

/// Unknown-sigil escape: consume one whole line verbatim, terminator
/// included, so it can be forwarded byte-identical.
fn parse_inline(cursor: &mut Cursor<&[u8]>) -> Result<Value, FrameError> {
    let start = cursor.position() as usize;
    let buf = cursor.get_ref();
    for i in start..buf.len() {
        if buf[i] == b'\n' {
            let value = Value::Inline(Bytes::copy_from_slice(&buf[start..=i]));
            cursor.set_position((i + 1) as u64);
            return Ok(value);
        }
    }
    Err(FrameError::Incomplete)
}

#[inline]
fn peek_u8(cursor: &Cursor<&[u8]>) -> Result<u8, FrameError> {
    let pos = cursor.position() as usize;
    cursor
        .get_ref()
        .get(pos)
        .copied()
        .ok_or(FrameError::Incomplete)
}

/// Read through the next line terminator, returning the line content.
/// Accepts a bare `\n` from lenient peers; the terminator is consumed
/// either way.
#[inline]
fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], FrameError> {
    let start = cursor.position() as usize;
    let buf: &'a [u8] = cursor.get_ref();
    for i in start..buf.len() {
        if buf[i] == b'\n' {
            cursor.set_position((i + 1) as u64);
            let end = if i > start && buf[i - 1] == b'\r' { i - 1 } else { i };
            return Ok(&buf[start..end]);
        }
    }
    Err(FrameError::Incomplete)
}

#[inline]
fn read_decimal(cursor: &mut Cursor<&[u8]>) -> Result<i64, FrameError> {
    let line = read_line(cursor)?;
    let s = std::str::from_utf8(line)
        .map_err(|_| FrameError::Invalid("non-ASCII length line".to_string()))?;
    s.parse()
        .map_err(|_| FrameError::Invalid(format!("bad decimal {s:?}")))
}

#[inline]
fn read_exact<'a>(cursor: &mut Cursor<&'a [u8]>, n: usize) -> Result<&'a [u8], FrameError> {
    let start = cursor.position() as usize;
    let buf: &'a [u8] = cursor.get_ref();
    if start + n > buf.len() {
        return Err(FrameError::Incomplete);
    }
    cursor.set_position((start + n) as u64);
    Ok(&buf[start..start + n])
}

/// Consume the terminator after a bulk payload: `\r\n`, or a bare `\n`.
#[inline]
fn eat_line_ending(cursor: &mut Cursor<&[u8]>) -> Result<(), FrameError> {
    match peek_u8(cursor)? {
        b'\r' => {
            cursor.advance(1);
            match peek_u8(cursor)? {
                b'\n' => {
                    cursor.advance(1);
                    Ok(())
                }
                other => Err(FrameError::Invalid(format!(
                    "expected LF after CR, got 0x{other:02x}"
                ))),
            }
        }
        b'\n' => {
            cursor.advance(1);
            Ok(())
        }
        other => Err(FrameError::Invalid(format!(
            "expected terminator after bulk payload, got 0x{other:02x}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::encode_to_bytes;

    fn decode_one(input: &[u8]) -> (Value, Bytes) {
        let mut buf = BytesMut::from(input);
        let frame = decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty(), "expected the whole input to be consumed");
        frame
    }

    #[test]
    fn parses_simple_string() {
        let (value, raw) = decode_one(b"+OK\r\n");
        assert_eq!(value, Value::Simple(Bytes::from("OK")));
        assert_eq!(&raw[..], b"+OK\r\n");
    }

    #[test]
    fn parses_error() {
        let (value, _) = decode_one(b"-ERR unknown command\r\n");
        assert_eq!(value, Value::Error(Bytes::from("ERR unknown command")));
    }

    #[test]
    fn parses_integer() {
        assert_eq!(decode_one(b":1000\r\n").0, Value::Integer(1000));
        assert_eq!(decode_one(b":-500\r\n").0, Value::Integer(-500));
    }

    #[test]
    fn parses_bulk_string() {
        assert_eq!(decode_one(b"$5\r\nhello\r\n").0, Value::bulk("hello"));
        assert_eq!(decode_one(b"$0\r\n\r\n").0, Value::bulk(""));
        assert_eq!(decode_one(b"$-1\r\n").0, Value::null_bulk());
    }

    #[test]
    fn bulk_payload_is_binary_safe() {
        let (value, _) = decode_one(b"$7\r\na\r\nb\x00c\r\n");
        assert_eq!(value, Value::bulk(&b"a\r\nb\x00c"[..]));
    }

    #[test]
    fn parses_array() {
        let (value, _) = decode_one(b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(
            value,
            Value::array(vec![Value::bulk("foo"), Value::bulk("bar")])
        );
        assert_eq!(decode_one(b"*0\r\n").0, Value::array(vec![]));
        assert_eq!(decode_one(b"*-1\r\n").0, Value::null_array());
    }

    #[test]
    fn parses_nested_array() {
        let (value, _) = decode_one(b"*2\r\n*2\r\n+a\r\n+b\r\n*1\r\n:42\r\n");
        assert_eq!(
            value,
            Value::array(vec![
                Value::array(vec![
                    Value::Simple(Bytes::from("a")),
                    Value::Simple(Bytes::from("b")),
                ]),
                Value::array(vec![Value::Integer(42)]),
            ])
        );
    }

    #[test]
    fn incomplete_input_consumes_nothing() {
        for input in [
            &b"+OK"[..],
            b"$5\r\nhel",
            b"$5\r\nhello",
            b"*2\r\n$3\r\nfoo\r\n",
            b"*2",
        ] {
            let mut buf = BytesMut::from(input);
            assert_eq!(decode(&mut buf).unwrap(), None, "input {input:?}");
            assert_eq!(&buf[..], input, "buffer must be untouched");
        }
    }

    #[test]
    fn resumes_across_read_boundaries() {
        let mut buf = BytesMut::from(&b"*3\r\n$3\r\nSET\r\n$3\r\nk"[..]);
        assert_eq!(decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"ey\r\n$5\r\nvalue\r\n");
        let (value, _) = decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            value,
            Value::array(vec![
                Value::bulk("SET"),
                Value::bulk("key"),
                Value::bulk("value"),
            ])
        );
    }

    #[test]
    fn decodes_pipelined_frames_in_order() {
        let mut buf = BytesMut::from(&b"+OK\r\n:42\r\n"[..]);
        assert_eq!(
            decode(&mut buf).unwrap().unwrap().0,
            Value::Simple(Bytes::from("OK"))
        );
        assert_eq!(decode(&mut buf).unwrap().unwrap().0, Value::Integer(42));
        assert!(buf.is_empty());
    }

    #[test]
    fn accepts_bare_lf_line_endings() {
        assert_eq!(decode_one(b"+OK\n").0, Value::Simple(Bytes::from("OK")));
        assert_eq!(decode_one(b":7\n").0, Value::Integer(7));
        assert_eq!(decode_one(b"$3\nabc\n").0, Value::bulk("abc"));
        let (value, _) = decode_one(b"*1\n$2\nhi\n");
        assert_eq!(value, Value::array(vec![Value::bulk("hi")]));
    }

    #[test]
    fn normalizes_lenient_input_on_reserialize() {
        let (value, _) = decode_one(b"*1\n$4\nPING\n");
        assert_eq!(&encode_to_bytes(&value)[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn inline_line_passes_through_verbatim() {
        let (value, raw) = decode_one(b"PING\r\n");
        assert_eq!(value, Value::Inline(Bytes::from("PING\r\n")));
        assert_eq!(&encode_to_bytes(&value)[..], &raw[..]);

        // A bare-LF inline line keeps its bare LF.
        let (value, _) = decode_one(b"hello there\n");
        assert_eq!(&encode_to_bytes(&value)[..], b"hello there\n");
    }

    #[test]
    fn inline_then_framed_resp() {
        let mut buf = BytesMut::from(&b"negotiate\r\n*1\r\n$4\r\nPING\r\n"[..]);
        let (first, _) = decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, Value::Inline(Bytes::from("negotiate\r\n")));
        let (second, _) = decode(&mut buf).unwrap().unwrap();
        assert_eq!(second, Value::array(vec![Value::bulk("PING")]));
    }

    #[test]
    fn inline_without_newline_is_incomplete() {
        let mut buf = BytesMut::from(&b"PIN"[..]);
        assert_eq!(decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lengths() {
        for input in [&b"$abc\r\n"[..], b"*-2\r\n", b"$-2\r\n", b"*x\r\n"] {
            let mut buf = BytesMut::from(input);
            assert!(decode(&mut buf).is_err(), "input {input:?}");
        }
    }

    #[test]
    fn rejects_missing_bulk_terminator() {
        let mut buf = BytesMut::from(&b"$3\r\nabcXY"[..]);
        assert!(decode(&mut buf).is_err());
    }

    #[test]
    fn rejects_over_deep_nesting() {
        let mut input = Vec::new();
        for _ in 0..(MAX_DEPTH + 2) {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b"+x\r\n");
        let mut buf = BytesMut::from(&input[..]);
        assert!(decode(&mut buf).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
                let mut buf = BytesMut::from(&data[..]);
                let _ = decode(&mut buf);
            }

            #[test]
            fn bulk_roundtrip(s in "[a-zA-Z0-9:]{0,100}") {
                let encoded = format!("${}\r\n{}\r\n", s.len(), s);
                let mut buf = BytesMut::from(encoded.as_str());
                let (value, raw) = decode(&mut buf).unwrap().unwrap();
                prop_assert_eq!(&raw[..], encoded.as_bytes());
                prop_assert_eq!(&encode_to_bytes(&value)[..], encoded.as_bytes());
            }

            #[test]
            fn integer_roundtrip(n in any::<i64>()) {
                let encoded = format!(":{n}\r\n");
                let mut buf = BytesMut::from(encoded.as_str());
                let (value, _) = decode(&mut buf).unwrap().unwrap();
                prop_assert_eq!(value, Value::Integer(n));
            }
        }
    }
}
