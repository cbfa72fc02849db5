//! Key rewriting and reply filtering.
//!
//! The rewriter prepends the session prefix to the key positions a
//! command's [`KeyPattern`] names; bulk length headers are recomputed at
//! serialization time. The reply filter narrows `SCAN` responses to the
//! session's namespace.

use bytes::BytesMut;

use crate::commands::KeyPattern;
use crate::resp::Value;

/// Rewrite the key arguments of a client command array.
///
/// Arguments that are not non-null bulk strings are left alone. A command
/// whose `numkeys` argument is malformed or names more keys than are
/// present forwards unchanged rather than half-rewritten.
pub fn rewrite_command(mut items: Vec<Value>, pattern: KeyPattern, prefix: &[u8]) -> Vec<Value> {
    match pattern {
        KeyPattern::Single(index) => {
            prefix_at(&mut items, index, prefix);
        }
        KeyPattern::AllFrom(start) => {
            for index in start..items.len() {
                prefix_at(&mut items, index, prefix);
            }
        }
        KeyPattern::ZStore => {
            let Some(numkeys) = numkeys_in_range(&items, 2) else {
                return items;
            };
            prefix_at(&mut items, 1, prefix);
            for index in 3..3 + numkeys {
                prefix_at(&mut items, index, prefix);
            }
        }
        KeyPattern::Eval => {
            let Some(numkeys) = numkeys_in_range(&items, 2) else {
                return items;
            };
            for index in 3..3 + numkeys {
                prefix_at(&mut items, index, prefix);
            }
        }
        KeyPattern::XRead => {
            let Some(streams) = items.iter().position(is_streams_keyword) else {
                return items;
            };
            let rest = items.len() - streams - 1;
            if rest == 0 || rest % 2 != 0 {
                return items;
            }
            for index in streams + 1..streams + 1 + rest / 2 {
                prefix_at(&mut items, index, prefix);
            }
        }
    }
    items
}

/// Filter a `SCAN` reply down to keys inside the namespace.
///
/// The expected shape is `[cursor-bulk, array-of-key-bulks]`; anything
/// else (an error, a differently shaped array) is returned unchanged.
/// Surviving keys keep their prefix: stripping it would make a follow-up
/// `GET` double-qualify the key on its way back through the rewriter.
pub fn filter_scan_reply(reply: Value, prefix: &[u8]) -> Value {
    match reply {
        Value::Array(Some(mut items)) => {
            let scan_shape = items.len() == 2
                && matches!(items[0], Value::Bulk(Some(_)))
                && matches!(items[1], Value::Array(Some(_)));
            if scan_shape {
                if let Value::Array(Some(keys)) = &mut items[1] {
                    keys.retain(|key| {
                        key.as_bulk().is_some_and(|data| data.starts_with(prefix))
                    });
                }
            }
            Value::Array(Some(items))
        }
        other => other,
    }
}

fn prefix_at(items: &mut [Value], index: usize, prefix: &[u8]) {
    if let Some(Value::Bulk(Some(key))) = items.get_mut(index) {
        let mut joined = BytesMut::with_capacity(prefix.len() + key.len());
        joined.extend_from_slice(prefix);
        joined.extend_from_slice(key);
        *key = joined.freeze();
    }
}

/// The `numkeys` argument at `index`, when it is a positive decimal that
/// fits the arguments actually present.
fn numkeys_in_range(items: &[Value], index: usize) -> Option<usize> {
    let raw = items.get(index)?.as_bulk()?;
    let numkeys = std::str::from_utf8(raw).ok()?.parse::<i64>().ok()?;
    if numkeys <= 0 {
        return None;
    }
    let numkeys = numkeys as usize;
    if index + 1 + numkeys > items.len() {
        return None;
    }
    Some(numkeys)
}

fn is_streams_keyword(value: &Value) -> bool {
    value
        .as_bulk()
        .is_some_and(|data| data.eq_ignore_ascii_case(b"STREAMS"))
}
