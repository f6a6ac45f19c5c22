//! # Stubd entry point
//!
//! Drives the application lifecycle:
//!
//! 1. **Initialization**: parses command-line arguments and sets up tracing.
//! 2. **Loading**: builds the gRPC and HTTP branches from the stub directories;
//!    any malformed file aborts startup before the listener opens.
//! 3. **Serving**: binds the listener and serves until interrupted.
mod cli;
mod tls;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use stubd_core::server::StubServer;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut builder = StubServer::builder();
    if let Some(proto) = &args.proto {
        builder = builder
            .with_proto(proto, args.stubs.as_deref())
            .context("failed to initialize gRPC stub server")?;
    }
    if let Some(http) = &args.http {
        builder = builder
            .with_http(http)
            .context("failed to initialize HTTP stub handler")?;
    }
    let server = builder.build();

    let tls = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => {
            Some(tls::load(cert, key).context("failed to load TLS config")?)
        }
        _ => None,
    };

    let listener = TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("failed to bind '{}'", args.address))?;
    tracing::info!(address = %args.address, "listening");

    server
        .serve_with_shutdown(listener, tls, shutdown_signal())
        .await
        .context("server stopped")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
