use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use proxy_server::metrics::admin_router;
use proxy_server::{run_proxy, Config, ProxyState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = Config::from_env();

    // Install Prometheus metrics recorder
    let prom_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder");

    let state = Arc::new(ProxyState::new(config));
    let shutdown = CancellationToken::new();

    let bind_addr = state.config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind proxy to {bind_addr}: {e}"));

    tracing::info!(
        proxy = %bind_addr,
        backend = %state.config.backend_addr,
        metrics = %state.config.metrics_addr,
        default_prefix = %state.config.default_prefix,
        "namespace proxy starting"
    );

    // Admin/metrics server on its own port, if enabled
    if !state.config.metrics_addr.is_empty() {
        let metrics_addr = state.config.metrics_addr.clone();
        let metrics_listener = TcpListener::bind(&metrics_addr)
            .await
            .unwrap_or_else(|e| panic!("failed to bind metrics to {metrics_addr}: {e}"));
        let router = admin_router(Arc::clone(&state), prom_handle);
        let metrics_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, router)
                .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "metrics server error");
            }
        });
    }

    // Shutdown signal handler
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_shutdown).await;
    });

    run_proxy(listener, state, shutdown).await;

    tracing::info!("namespace proxy shut down");
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    tracing::info!("shutdown signal received, draining sessions...");
    token.cancel();
}
