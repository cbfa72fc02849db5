//! Listener: accept clients and hand each one a session.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::metrics::ProxyStats;
use crate::session;

/// Process-wide shared state: the configuration snapshot plus counters.
/// Everything per-connection lives in the session that owns it.
pub struct ProxyState {
    pub config: Config,
    pub stats: ProxyStats,
}

impl ProxyState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stats: ProxyStats::default(),
        }
    }
}

/// Accept clients until the shutdown token fires.
///
/// Shutdown only stops new accepts; in-flight sessions run until one of
/// their sockets errors or closes. Accept errors are logged and do not
/// stop the loop.
pub async fn run_proxy(listener: TcpListener, state: Arc<ProxyState>, shutdown: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(
            addr = %addr,
            backend = %state.config.backend_addr,
            "proxy listening"
        );
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("proxy shutting down");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            state.stats.session_opened();
                            tracing::debug!(peer = %peer, "client connected");
                            session::handle_session(stream, peer, Arc::clone(&state)).await;
                            state.stats.session_closed();
                            tracing::debug!(peer = %peer, "client disconnected");
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept error");
                    }
                }
            }
        }
    }
}
