//! codemate-server: session coordination server for the codemate agent.
//!
//! Accepts WebSocket connections from the terminal client, gives each one a
//! session, and drives the backend while delegating tool calls back to the
//! client that owns the files.

mod connection;
mod dispatcher;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use codemate_ai::{GeminiClient, GeminiConfig, RateScheduler, SchedulerConfig, SessionDeps, SessionSettings};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::dispatcher::Dispatcher;

#[derive(Parser)]
#[command(name = "codemate-server", about = "Session server for the codemate coding agent")]
struct Args {
    /// Port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind (overrides the config file).
    #[arg(long)]
    host: Option<String>,

    /// Path to the TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `codemate=debug`. `RUST_LOG` takes precedence.
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Tracing is not up yet, so config errors go to stderr.
    let mut config = match codemate_config::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("codemate-server: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    init_tracing(args.log_level.as_deref().unwrap_or(config.logging.level.as_str()));

    let backend = match GeminiConfig::from_backend_config(&config.backend).and_then(GeminiClient::new) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to set up backend");
            std::process::exit(1);
        }
    };
    tracing::info!(model = backend.model(), "backend ready");

    let scheduler = RateScheduler::new(SchedulerConfig::from(&config.rate_limit));
    let dispatcher = Dispatcher::new(
        SessionDeps {
            backend: Arc::new(backend),
            scheduler: Arc::new(scheduler),
        },
        SessionSettings::from(&config),
    );

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("codemate-server listening on {}", addr);

    // Accept loop.
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, dispatcher).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
