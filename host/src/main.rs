//! Main entry point for the stub engine host
//!
//! Serves the engine endpoint and answers every request with its own payload,
//! which is enough to exercise clients end to end.

use clap::Parser;
use std::net::IpAddr;
use std::time::Duration;
use tokio::signal;

use host::{EchoHandler, HostError, HostResult, Server};
use shared::{link_debug, link_info, logging, Component, ServerConfig};

/// Echo engine host
#[derive(Parser)]
#[command(name = "engine-host")]
#[command(about = "Serve an engine endpoint that echoes every request")]
pub struct Args {
    /// Port to listen on (overrides ENGINE_LINK_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (overrides ENGINE_LINK_BIND_ADDRESS)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Close sockets that stay silent this many seconds
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    logging::init_tracing(Component::Host, Some(&args.log_level));
    logging::log_startup(Component::Host, "echo engine host");

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(bind) = args.bind {
        config = config.with_bind_address(bind);
    }
    if let Some(secs) = args.idle_timeout_secs {
        config = config.with_idle_timeout(Some(Duration::from_secs(secs)));
    }

    let server: Server<Vec<u8>, Vec<u8>> = Server::new()?;
    if let Err(e) = server.listen(config).await {
        logging::log_error(Component::Host, "Listen", &e);
        return Err(e.into());
    }

    tokio::select! {
        result = serve(&server) => {
            if let Err(e) = result {
                logging::log_error(Component::Host, "Serving", &e);
            }
        }
        _ = signal::ctrl_c() => {
            link_info!(Component::Host, "Received Ctrl+C");
        }
    }

    server.shutdown().await?;
    logging::log_shutdown(Component::Host, "signal received");
    Ok(())
}

async fn serve(server: &Server<Vec<u8>, Vec<u8>>) -> HostResult<()> {
    let handler = EchoHandler;
    loop {
        match server.handle_next(&handler, Duration::from_secs(1)).await {
            Ok(client) => link_debug!(Component::Host, "Echoed a request for client {}", client),
            Err(HostError::RequestTimeout { .. }) => {}
            Err(HostError::ClientNotFound { client_id }) => {
                link_debug!(Component::Host, "Client {} left before its response", client_id);
            }
            Err(e) => return Err(e),
        }
    }
}
