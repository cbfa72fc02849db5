//! Canonical RESP2 serialization.

use bytes::{BufMut, BytesMut};

use super::Value;

/// Encode a value into the buffer. Output is always `\r\n`-terminated with
/// minimal length headers; [`Value::Inline`] bytes are emitted verbatim.
pub fn encode(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Simple(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s);
            buf.put_slice(b"\r\n");
        }
        Value::Error(s) => {
            buf.put_u8(b'-');
            buf.put_slice(s);
            buf.put_slice(b"\r\n");
        }
        Value::Integer(n) => {
            buf.put_u8(b':');
            buf.put_slice(n.to_string().as_bytes());
            buf.put_slice(b"\r\n");
        }
        Value::Bulk(None) => {
            buf.put_slice(b"$-1\r\n");
        }
        Value::Bulk(Some(data)) => {
            buf.put_u8(b'$');
            buf.put_slice(data.len().to_string().as_bytes());
            buf.put_slice(b"\r\n");
            buf.put_slice(data);
            buf.put_slice(b"\r\n");
        }
        Value::Array(None) => {
            buf.put_slice(b"*-1\r\n");
        }
        Value::Array(Some(items)) => {
            buf.put_u8(b'*');
            buf.put_slice(items.len().to_string().as_bytes());
            buf.put_slice(b"\r\n");
            for item in items {
                encode(item, buf);
            }
        }
        Value::Inline(raw) => {
            buf.put_slice(raw);
        }
    }
}

/// Encode a value into a fresh buffer.
pub fn encode_to_bytes(value: &Value) -> BytesMut {
    let mut buf = BytesMut::new();
    encode(value, &mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn encodes_simple_string() {
        let encoded = encode_to_bytes(&Value::Simple(Bytes::from("OK")));
        assert_eq!(&encoded[..], b"+OK\r\n");
    }

    #[test]
    fn encodes_error() {
        let encoded = encode_to_bytes(&Value::Error(Bytes::from("ERR bad")));
        assert_eq!(&encoded[..], b"-ERR bad\r\n");
    }

    #[test]
    fn encodes_integer() {
        assert_eq!(&encode_to_bytes(&Value::Integer(1000))[..], b":1000\r\n");
        assert_eq!(&encode_to_bytes(&Value::Integer(-500))[..], b":-500\r\n");
    }

    #[test]
    fn encodes_bulk_variants() {
        assert_eq!(&encode_to_bytes(&Value::bulk("hello"))[..], b"$5\r\nhello\r\n");
        assert_eq!(&encode_to_bytes(&Value::bulk(""))[..], b"$0\r\n\r\n");
        assert_eq!(&encode_to_bytes(&Value::null_bulk())[..], b"$-1\r\n");
    }

    #[test]
    fn encodes_array_variants() {
        let encoded = encode_to_bytes(&Value::array(vec![
            Value::bulk("foo"),
            Value::bulk("bar"),
        ]));
        assert_eq!(&encoded[..], b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        assert_eq!(&encode_to_bytes(&Value::array(vec![]))[..], b"*0\r\n");
        assert_eq!(&encode_to_bytes(&Value::null_array())[..], b"*-1\r\n");
    }

    #[test]
    fn encodes_mixed_array() {
        let encoded = encode_to_bytes(&Value::array(vec![
            Value::Simple(Bytes::from("OK")),
            Value::Integer(42),
            Value::bulk("hello"),
            Value::null_bulk(),
        ]));
        assert_eq!(&encoded[..], b"*4\r\n+OK\r\n:42\r\n$5\r\nhello\r\n$-1\r\n");
    }

    #[test]
    fn inline_bytes_are_verbatim() {
        let encoded = encode_to_bytes(&Value::Inline(Bytes::from("SUBSCRIBE x\n")));
        assert_eq!(&encoded[..], b"SUBSCRIBE x\n");
    }
}
