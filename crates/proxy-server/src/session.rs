//! Per-connection orchestration.
//!
//! Each accepted client gets a dedicated backend connection and two
//! forwarding directions running concurrently. The directions share
//! nothing mutable except the namespace prefix and the last client
//! command, both held in lock-free `arc-swap` cells: the client→backend
//! direction is the only writer, the backend→client direction only reads.
//! A stale read either skips one `SCAN` filter or applies it to a reply
//! whose shape will not match; neither corrupts the stream.

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::commands::{self, CommandClass};
use crate::metrics::ProxyStats;
use crate::proxy::ProxyState;
use crate::resp::{self, Value};
use crate::rewrite;

/// State shared between the two forwarding directions.
struct Shared {
    /// Namespace prefix, always `:`-terminated. Replaced on AUTH.
    prefix: ArcSwap<String>,
    /// Uppercased name of the most recent client command.
    last_command: ArcSwapOption<String>,
}

/// Run one client connection to completion.
pub(crate) async fn handle_session(client: TcpStream, peer: SocketAddr, state: Arc<ProxyState>) {
    let backend = match TcpStream::connect(&state.config.backend_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            // The client observes a plain disconnect, never an error reply.
            tracing::warn!(
                error = %e,
                backend = %state.config.backend_addr,
                peer = %peer,
                "backend dial failed, dropping client"
            );
            return;
        }
    };

    let prefix = state.config.session_prefix(&peer);
    tracing::debug!(peer = %peer, prefix = %prefix, "session opened");

    let shared = Arc::new(Shared {
        prefix: ArcSwap::from_pointee(prefix),
        last_command: ArcSwapOption::empty(),
    });

    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend.into_split();
    // Both directions write to the client: replies on one side,
    // synthesized blocklist errors on the other.
    let client_write = Arc::new(Mutex::new(client_write));

    tokio::select! {
        _ = client_to_backend(
            client_read,
            backend_write,
            Arc::clone(&client_write),
            Arc::clone(&shared),
            Arc::clone(&state),
        ) => {}
        _ = backend_to_client(backend_read, client_write, shared, state) => {}
    }

    tracing::debug!(peer = %peer, "session closed");
}

async fn client_to_backend(
    mut client_read: OwnedReadHalf,
    mut backend_write: OwnedWriteHalf,
    client_write: Arc<Mutex<OwnedWriteHalf>>,
    shared: Arc<Shared>,
    state: Arc<ProxyState>,
) {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        match client_read.read_buf(&mut buf).await {
            Ok(0) => {
                flush_trailing(&mut buf, &mut backend_write).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "client read error");
                return;
            }
        }

        loop {
            let (value, raw) = match resp::decode(&mut buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "client protocol error, closing session");
                    return;
                }
            };

            // Blocklist runs on the raw framed bytes before any command
            // parsing, so FLUSHDB, FLUSHALL, and anything embedding the
            // token are refused alike.
            if commands::contains_blocked_token(&raw) {
                state.stats.command_blocked();
                tracing::warn!("blocked command refused");
                let mut writer = client_write.lock().await;
                if let Err(e) = writer.write_all(commands::BLOCKED_COMMAND_REPLY).await {
                    tracing::debug!(error = %e, "client write error");
                    return;
                }
                continue;
            }

            let out = process_command(value, &shared, &state.stats);
            state.stats.command_forwarded();
            if let Err(e) = backend_write.write_all(&out).await {
                tracing::debug!(error = %e, "backend write error");
                return;
            }
        }
    }
}

async fn backend_to_client(
    mut backend_read: OwnedReadHalf,
    client_write: Arc<Mutex<OwnedWriteHalf>>,
    shared: Arc<Shared>,
    state: Arc<ProxyState>,
) {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        match backend_read.read_buf(&mut buf).await {
            Ok(0) => {
                let mut writer = client_write.lock().await;
                flush_trailing(&mut buf, &mut *writer).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "backend read error");
                return;
            }
        }

        loop {
            let (value, _raw) = match resp::decode(&mut buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "backend protocol error, closing session");
                    return;
                }
            };

            let awaiting_scan = shared
                .last_command
                .load()
                .as_deref()
                .is_some_and(|cmd| cmd.as_str() == "SCAN");

            let out = if awaiting_scan {
                let prefix = shared.prefix.load();
                state.stats.scan_reply_filtered();
                resp::encode_to_bytes(&rewrite::filter_scan_reply(value, prefix.as_bytes()))
            } else {
                resp::encode_to_bytes(&value)
            };

            let mut writer = client_write.lock().await;
            if let Err(e) = writer.write_all(&out).await {
                tracing::debug!(error = %e, "client write error");
                return;
            }
        }
    }
}

/// Turn one client value into the bytes forwarded to the backend,
/// updating session state on the way.
fn process_command(value: Value, shared: &Shared, stats: &ProxyStats) -> BytesMut {
    let items = match value {
        Value::Array(Some(items)) if !items.is_empty() => items,
        other => return resp::encode_to_bytes(&other),
    };

    let Some(name) = commands::command_name(&items) else {
        return resp::encode_to_bytes(&Value::Array(Some(items)));
    };
    shared.last_command.store(Some(Arc::new(name.clone())));

    if name == "AUTH" {
        // Both AUTH forms put the tenant identity at argument 1: the
        // username in `AUTH user pass`, the bare password otherwise.
        // The backend still sees the command and gets the final word.
        if let Some(tenant) = auth_tenant(&items) {
            tracing::debug!(prefix = %tenant, "prefix replaced by AUTH");
            shared.prefix.store(Arc::new(tenant));
        }
        return resp::encode_to_bytes(&Value::Array(Some(items)));
    }

    let items = match commands::classify(&name) {
        CommandClass::Keys(pattern) => {
            let prefix = shared.prefix.load();
            stats.command_rewritten();
            rewrite::rewrite_command(items, pattern, prefix.as_bytes())
        }
        CommandClass::Unprefixed | CommandClass::Unknown => items,
    };
    resp::encode_to_bytes(&Value::Array(Some(items)))
}

fn auth_tenant(items: &[Value]) -> Option<String> {
    if items.len() < 2 {
        return None;
    }
    let identity = items[1].as_bulk()?;
    if identity.is_empty() {
        return None;
    }
    let mut tenant = String::from_utf8_lossy(identity).into_owned();
    tenant.push(':');
    Some(tenant)
}

/// Unframed inline bytes may still be buffered when the peer closes;
/// forward them verbatim instead of dropping the tail. A half-received
/// RESP frame, by contrast, is undeliverable.
async fn flush_trailing<W: AsyncWrite + Unpin>(buf: &mut BytesMut, writer: &mut W) {
    if buf.is_empty() || matches!(buf[0], b'+' | b'-' | b':' | b'$' | b'*') {
        return;
    }
    if let Err(e) = writer.write_all(buf).await {
        tracing::debug!(error = %e, "trailing write error");
    }
}
