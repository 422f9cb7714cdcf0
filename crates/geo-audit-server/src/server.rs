use crate::config::ServerConfig;
use crate::context::AppContext;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

pub struct Server;

impl Server {
    pub async fn run(cfg: ServerConfig) -> Result<()> {
        let ctx = Arc::new(AppContext::from_config(cfg)?);
        let bind = ctx.cfg.bind.clone();
        let app = crate::router(ctx);

        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("binding {bind}"))?;
        tracing::info!(event = "server_listening", bind = %bind);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!(event = "server_stop");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("failed to install Ctrl+C handler");
        tracing::info!(event = "shutdown", signal = "ctrl_c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        tracing::info!(event = "shutdown", signal = "sigterm");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
