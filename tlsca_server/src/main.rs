// SPDX-License-Identifier: MIT OR Apache-2.0
//! TLSCA server binary entry point.

use tlsca_server::{init_metrics, ServerConfig, TlscaServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tlsca_server=info".parse()?),
        )
        .init();

    // Load configuration from environment or defaults
    let config = ServerConfig::from_env()?;
    let metrics_handle = config.metrics.as_ref().map(init_metrics).transpose()?;

    let mut server = TlscaServer::bootstrap(config)?;
    if let Some(ref handle) = metrics_handle {
        server = server.with_metrics(std::sync::Arc::clone(handle.metrics()));
    }

    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    if let Some(handle) = metrics_handle {
        handle.shutdown()?;
    }

    Ok(())
}
