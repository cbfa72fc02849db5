//! Static classification of Redis commands.
//!
//! Every data-plane command the proxy knows declares where its key
//! arguments sit, so the rewriter can namespace them without understanding
//! the command itself. Commands outside the table forward untouched: a
//! permissive default that keeps new Redis releases working through the
//! proxy at the cost of leaving their keys un-namespaced.

use crate::resp::Value;

/// Where the key arguments of a command live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPattern {
    /// One key at this argument index.
    Single(usize),
    /// Every argument at or after this index is a key.
    AllFrom(usize),
    /// Destination at index 1, `numkeys` at index 2, keys after it
    /// (ZINTERSTORE / ZUNIONSTORE).
    ZStore,
    /// `numkeys` at index 2, keys after it (EVAL / EVALSHA).
    Eval,
    /// Keys are the first half of the arguments after the `STREAMS`
    /// keyword (XREAD / XREADGROUP).
    XRead,
}

/// Outcome of looking a command up in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Recognized control-plane command, forwarded without rewriting.
    Unprefixed,
    /// Key-bearing command with the given rewrite pattern.
    Keys(KeyPattern),
    /// Not in the table; forwarded verbatim.
    Unknown,
}

/// Synthesized reply for refused commands.
pub const BLOCKED_COMMAND_REPLY: &[u8] = b"-ERR Command not allowed\r\n";

const BLOCKED_TOKEN: &[u8] = b"flush";

/// Whether raw inbound bytes trip the destructive-command blocklist.
///
/// The match is a case-insensitive substring scan over the framed bytes,
/// before any command parsing: FLUSHDB and FLUSHALL in any argument
/// position are caught, and so is a key that merely embeds the token.
/// That breadth is intentional policy, not an accident.
pub fn contains_blocked_token(raw: &[u8]) -> bool {
    raw.windows(BLOCKED_TOKEN.len())
        .any(|window| window.eq_ignore_ascii_case(BLOCKED_TOKEN))
}

/// Uppercased command name of a client array, if it has one.
pub fn command_name(items: &[Value]) -> Option<String> {
    let first = items.first()?.as_bulk()?;
    Some(String::from_utf8_lossy(first).to_ascii_uppercase())
}

/// Classify an (uppercased) command name.
pub fn classify(name: &str) -> CommandClass {
    use CommandClass::{Keys, Unknown, Unprefixed};
    use KeyPattern::{AllFrom, Eval, Single, XRead, ZStore};

    match name {
        // Control plane and connection-scoped commands.
        "AUTH" | "PING" | "ECHO" | "SELECT" | "INFO" | "CONFIG" | "CLIENT" | "SLOWLOG"
        | "MONITOR" | "SYNC" | "PSYNC" | "REPLCONF" | "MULTI" | "EXEC" | "DISCARD"
        | "UNWATCH" | "SCRIPT" | "PUBSUB" | "RANDOMKEY" => Unprefixed,

        // Strings.
        "GET" | "SET" | "SETEX" | "SETNX" | "GETSET" | "PSETEX" | "INCR" | "DECR"
        | "INCRBY" | "DECRBY" | "INCRBYFLOAT" | "APPEND" | "STRLEN" | "GETRANGE"
        | "SETRANGE" => Keys(Single(1)),

        // Hashes.
        "HGET" | "HSET" | "HSETNX" | "HMSET" | "HMGET" | "HGETALL" | "HDEL" | "HEXISTS"
        | "HLEN" | "HKEYS" | "HVALS" | "HINCRBY" | "HINCRBYFLOAT" | "HSCAN" => Keys(Single(1)),

        // Lists.
        "LPUSH" | "RPUSH" | "LPOP" | "RPOP" | "LLEN" | "LINDEX" | "LSET" | "LRANGE"
        | "LTRIM" | "LREM" | "LPUSHX" | "RPUSHX" | "LINSERT" => Keys(Single(1)),

        // Sets. SMOVE's second key keeps the legacy single-key treatment.
        "SADD" | "SREM" | "SMEMBERS" | "SISMEMBER" | "SCARD" | "SPOP" | "SRANDMEMBER"
        | "SSCAN" | "SMOVE" => Keys(Single(1)),

        // Sorted sets.
        "ZADD" | "ZREM" | "ZSCORE" | "ZINCRBY" | "ZCARD" | "ZRANGE" | "ZREVRANGE"
        | "ZRANGEBYSCORE" | "ZREVRANGEBYSCORE" | "ZCOUNT" | "ZRANK" | "ZREVRANK"
        | "ZREMRANGEBYRANK" | "ZREMRANGEBYSCORE" | "ZRANGEBYLEX" | "ZREVRANGEBYLEX"
        | "ZREMRANGEBYLEX" | "ZLEXCOUNT" | "ZSCAN" => Keys(Single(1)),

        // Key space.
        "EXPIRE" | "EXPIREAT" | "TTL" | "PERSIST" | "PEXPIRE" | "PEXPIREAT" | "PTTL"
        | "TYPE" | "DUMP" | "RESTORE" | "MOVE" | "OBJECT" => Keys(Single(1)),

        // Streams.
        "XADD" | "XRANGE" | "XREVRANGE" | "XLEN" | "XDEL" | "XTRIM" | "XACK" | "XCLAIM"
        | "XPENDING" | "XGROUP" | "XINFO" => Keys(Single(1)),

        // HyperLogLog, bitmaps, geo.
        "PFADD" | "PFCOUNT" | "SETBIT" | "GETBIT" | "BITCOUNT" | "BITPOS" | "BITFIELD"
        | "GEOADD" | "GEOPOS" | "GEODIST" | "GEORADIUS" | "GEORADIUSBYMEMBER"
        | "GEOHASH" => Keys(Single(1)),

        // Pub/sub channels are namespaced like keys on the way in.
        "PUBLISH" | "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE" | "PUNSUBSCRIBE" => {
            Keys(Single(1))
        }

        // Transactions.
        "WATCH" => Keys(Single(1)),

        // Variadic key lists.
        "DEL" | "EXISTS" | "MSET" | "MGET" | "MSETNX" | "SINTER" | "SUNION" | "SDIFF"
        | "SINTERSTORE" | "SUNIONSTORE" | "SDIFFSTORE" | "PFMERGE" | "RPOPLPUSH"
        | "BLPOP" | "BRPOP" | "BRPOPLPUSH" | "RENAME" | "RENAMENX" => Keys(AllFrom(1)),

        // BITOP's argument 1 is the operation literal, not a key.
        "BITOP" => Keys(AllFrom(2)),

        "ZINTERSTORE" | "ZUNIONSTORE" => Keys(ZStore),

        "EVAL" | "EVALSHA" => Keys(Eval),

        "XREAD" | "XREADGROUP" => Keys(XRead),

        _ => Unknown,
    }
}
