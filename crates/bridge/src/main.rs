//! debug-bridge: a stdio MCP server that drives Python debugging through
//! debugpy over the Debug Adapter Protocol.

mod handler;
mod logging;
mod protocol;
mod server;
mod tools;

use debugger::{EventBus, SessionRegistry};
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use crate::handler::BridgeHandler;
use crate::server::McpServer;

#[tokio::main]
async fn main() {
    // stdout is the protocol channel; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "fatal");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    let bus = EventBus::new();
    let registry = SessionRegistry::new(bus.clone());

    tokio::spawn(logging::run_formatter(bus.subscribe()));

    let mut server = McpServer::new(BridgeHandler::new(registry.clone()));

    tokio::select! {
        result = server.run() => {
            result.wrap_err("serving stdio")?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    // Take every adapter subprocess down before exiting cleanly.
    registry.shutdown_all().await;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("install SIGTERM handler");

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}
