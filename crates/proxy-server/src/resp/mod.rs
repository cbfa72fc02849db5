//! RESP2 wire protocol support.
//!
//! This module implements the framing layer both forwarding directions run
//! on: a streaming, resumable decoder over a [`bytes::BytesMut`] read
//! buffer and a canonical encoder. Values re-serialize with `\r\n`
//! terminators regardless of how leniently the peer framed them.

mod encoder;
mod parser;

pub use encoder::{encode, encode_to_bytes};
pub use parser::{decode, FrameError};

use bytes::Bytes;

/// One decoded RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+...\r\n`, payload without the sigil or terminator.
    Simple(Bytes),
    /// `-...\r\n`, payload without the sigil or terminator.
    Error(Bytes),
    /// `:<n>\r\n`.
    Integer(i64),
    /// `$<len>\r\n<payload>\r\n`; `None` is the null bulk (`$-1\r\n`).
    Bulk(Option<Bytes>),
    /// `*<count>\r\n` followed by `count` values; `None` is `*-1\r\n`.
    Array(Option<Vec<Value>>),
    /// Bytes that did not start with a RESP sigil, kept verbatim.
    ///
    /// Some clients negotiate with inline text before switching to framed
    /// RESP; these lines pass through byte-identical and are never
    /// classified as commands.
    Inline(Bytes),
}

impl Value {
    pub fn bulk(data: impl Into<Bytes>) -> Value {
        Value::Bulk(Some(data.into()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Some(items))
    }

    pub const fn null_bulk() -> Value {
        Value::Bulk(None)
    }

    pub const fn null_array() -> Value {
        Value::Array(None)
    }

    /// The payload of a non-null bulk string, if that is what this is.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Value::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }
}
