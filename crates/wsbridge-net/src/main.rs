//! wsbridge echo server.
//!
//! Loads `wsbridge.yaml` (or the path given as the first argument), listens
//! on `server.listen` / `server.path` and echoes every message back with its
//! original kind.

use tracing_subscriber::{fmt, EnvFilter};

use wsbridge_net::{config, HandlerSet, Listener};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "wsbridge.yaml".to_string());
    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "config load failed");
            std::process::exit(2);
        }
    };

    let handlers = HandlerSet::new(())
        .on_ready(|conn, _| tracing::info!(conn_id = %conn.id(), peer = ?conn.peer_addr(), "client ready"))
        .on_message(|conn, msg, _| {
            if let Err(e) = conn.send_message(msg) {
                tracing::debug!(conn_id = %conn.id(), error = %e, "echo dropped");
            }
        })
        .on_close(|conn, _| tracing::info!(conn_id = %conn.id(), "client closed"));

    let listener = match Listener::from_config(&cfg, handlers).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "listener failed to start");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %listener.local_addr(), path = listener.path(), "wsbridge-echo running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "signal handler failed");
    }
    listener.stop();
}
