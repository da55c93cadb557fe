//! Main entry point for the engine probe
//!
//! Connects to an engine endpoint, sends each payload and prints what came
//! back as a JSON summary.

use clap::Parser;
use serde::Serialize;
use std::time::{Duration, Instant};

use client::{ClientError, Connection};
use shared::{link_info, link_warn, logging, Component, ConnectConfig, TimeoutPolicy};

/// Probe an engine endpoint with raw payloads
#[derive(Parser)]
#[command(name = "engine-probe")]
#[command(about = "Send payloads to an engine endpoint and report the responses")]
pub struct Args {
    /// Engine address
    #[arg(long, default_value = "127.0.0.1")]
    pub address: String,

    /// Engine port
    #[arg(long, default_value = "8167")]
    pub port: u16,

    /// Payload to send (repeatable)
    #[arg(long = "payload", default_value = "ping")]
    pub payloads: Vec<String>,

    /// Per-response timeout in milliseconds
    #[arg(long, default_value = "5000")]
    pub timeout_ms: u64,

    /// Pair responses by correlation id instead of arrival order
    #[arg(long)]
    pub correlated: bool,

    /// Log every message at info level
    #[arg(long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Serialize)]
struct Exchange {
    sent: String,
    received: Option<String>,
    elapsed_ms: u128,
    error: Option<String>,
}

#[derive(Serialize)]
struct Summary {
    endpoint: String,
    exchanges: Vec<Exchange>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    logging::init_tracing(Component::Client, Some(&args.log_level));
    logging::log_startup(Component::Client, "engine probe");

    // A failed probe should report, not tear down the link for the next payload
    let config = ConnectConfig::from_env()?.with_timeout_policy(TimeoutPolicy::FailCall);
    let endpoint = client::endpoint_url(&args.address, args.port, &config.path)?;
    let timeout = Duration::from_millis(args.timeout_ms);

    let mut connection: Connection<Vec<u8>, Vec<u8>> = Connection::new(config);
    connection.set_closed_callback(|| {
        link_warn!(Component::Client, "Engine closed the connection");
    }).await;

    if let Err(e) = connection.connect(&args.address, args.port, args.verbose).await {
        logging::log_error(Component::Client, "Connect", &e);
        return Err(e.into());
    }

    let mut exchanges = Vec::with_capacity(args.payloads.len());
    for payload in &args.payloads {
        let started = Instant::now();
        let result = send_one(&connection, payload.as_bytes().to_vec(), timeout, args.correlated).await;
        let elapsed_ms = started.elapsed().as_millis();

        exchanges.push(match result {
            Ok(body) => Exchange {
                sent: payload.clone(),
                received: Some(String::from_utf8_lossy(&body).into_owned()),
                elapsed_ms,
                error: None,
            },
            Err(e) => Exchange {
                sent: payload.clone(),
                received: None,
                elapsed_ms,
                error: Some(e.to_string()),
            },
        });
    }

    let summary = Summary {
        endpoint: endpoint.to_string(),
        exchanges,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    connection.disconnect();
    logging::log_shutdown(Component::Client, "probe complete");
    Ok(())
}

async fn send_one(
    connection: &Connection<Vec<u8>, Vec<u8>>,
    payload: Vec<u8>,
    timeout: Duration,
    correlated: bool,
) -> Result<Vec<u8>, ClientError> {
    if correlated {
        return connection.request(&payload, timeout).await;
    }

    match connection.send(&payload)? {
        Some(id) => {
            link_info!(Component::Client, "Sent payload as {}", id);
            connection.receive(timeout).await
        }
        None => Err(ClientError::NotConnected {
            state: connection.state(),
        }),
    }
}
