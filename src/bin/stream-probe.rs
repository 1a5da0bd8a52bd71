//! Stream Probe - manual broker smoke test
//!
//! Boots a sandboxed Router against a broker, connects, subscribes to a
//! topic, and prints every bridge event as a JSON line until ctrl-c.

use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use stream_router::bridge::Event;
use stream_router::config::HostConfig;
use stream_router::lifecycle::{on_load, on_unload};
use stream_router::observability::logging::{init_default_logging, TracingLoggerFactory};
use tokio::signal;
use tracing::{error, info};

/// Probe a broker through the sandboxed stream Router
#[derive(Parser)]
#[command(name = "stream-probe")]
#[command(about = "Connect a sandboxed stream Router to a broker and watch its events")]
#[command(version)]
struct Args {
    /// Broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Broker port
    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Use TLS
    #[arg(long)]
    ssl: bool,

    /// Protocol-level client id (must be unique per broker)
    #[arg(long, default_value = "stream-probe")]
    client_id: String,

    /// Log correlation id
    #[arg(long, default_value = "probe")]
    log_id: String,

    /// Topic to subscribe to after connecting
    #[arg(long, default_value = "video/probe")]
    topic: String,

    /// Optional message to publish after connecting
    #[arg(long)]
    publish: Option<String>,

    /// Connect deadline in milliseconds
    #[arg(long, default_value_t = 10_000)]
    connection_timeout_ms: u64,

    /// Publish deadline in milliseconds
    #[arg(long, default_value_t = 5_000)]
    publish_timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    init_default_logging();
    let args = Args::parse();

    let config = HostConfig {
        log_id: args.log_id.clone(),
        client_id: args.client_id.clone(),
        host: args.host,
        port: args.port,
        use_ssl: args.ssl,
        connection_timeout_ms: args.connection_timeout_ms,
        keep_alive_interval_secs: 60,
        publish_timeout_ms: args.publish_timeout_ms,
        reconnect_delay_ms: 500,
    };

    let (mut channels, handle) = on_load(
        &args.log_id,
        &args.client_id,
        config,
        Arc::new(TracingLoggerFactory),
    );
    if handle.is_none() {
        error!("router creation failed; see CREATE_FAILURE event");
    }

    let _ = channels.command_tx.send(json!({"command": "CONNECT"}));

    info!("probe running; ctrl-c to stop");
    let mut published = false;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            event = channels.event_rx.recv() => match event {
                Some(event) => {
                    // Subscribe only once the session is up; a command issued
                    // while still connecting is rejected. Re-subscribe after
                    // every reconnect since the broker forgets subscriptions.
                    if event == Event::ConnectSuccess {
                        let _ = channels
                            .command_tx
                            .send(json!({"command": "SUBSCRIBE", "args": [args.topic.clone()]}));
                        if let Some(message) = &args.publish {
                            if !published {
                                published = true;
                                let _ = channels.command_tx.send(
                                    json!({"command": "PUBLISH", "args": [args.topic.clone(), message]}),
                                );
                            }
                        }
                    }
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => error!("failed to serialize event: {e}"),
                    }
                }
                None => break,
            }
        }
    }

    on_unload(&args.log_id, &args.client_id, handle).await;
}
