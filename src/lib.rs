//! Stream Router - sandboxed MQTT transport core for a video-streaming client
//!
//! Each video stream gets its own Router instance inside its own sandbox (a
//! spawned, isolated task), so a crash or hang affecting one stream's
//! transport cannot corrupt another stream's transport or the host's state.
//! The host talks to the sandbox only through the message bridge: commands
//! in, events out.
//!
//! # Overview
//!
//! - [`router::Router`]: connection state machine, timeout-governed
//!   pending-operation bookkeeping, command surface
//! - [`transport`]: the broker seam - an async trait plus the rumqttc-backed
//!   [`transport::mqtt::MqttAdapter`]
//! - [`bridge`]: closed command/event taxonomies and the dispatch path that
//!   never lets an error escape the sandbox
//! - [`lifecycle`]: `on_load`/`on_unload`, invoked in lock-step with the
//!   sandbox's own lifecycle
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stream_router::bridge::Event;
//! use stream_router::config::HostConfig;
//! use stream_router::lifecycle::{on_load, on_unload};
//! use stream_router::observability::logging::TracingLoggerFactory;
//! use serde_json::json;
//!
//! # async fn run() {
//! let config = HostConfig {
//!     log_id: "stream-1".to_string(),
//!     client_id: "viewer-42-stream-1".to_string(),
//!     host: "broker.example.com".to_string(),
//!     port: 8883,
//!     use_ssl: true,
//!     connection_timeout_ms: 10_000,
//!     keep_alive_interval_secs: 60,
//!     publish_timeout_ms: 5_000,
//!     reconnect_delay_ms: 500,
//! };
//!
//! let (mut channels, handle) =
//!     on_load("stream-1", "viewer-42-stream-1", config, Arc::new(TracingLoggerFactory));
//!
//! let _ = channels.command_tx.send(json!({"command": "CONNECT"}));
//!
//! while let Some(event) = channels.event_rx.recv().await {
//!     // Commands issued before the session is up are rejected, so
//!     // subscribe only once the connect settles
//!     if event == Event::ConnectSuccess {
//!         let _ = channels
//!             .command_tx
//!             .send(json!({"command": "SUBSCRIBE", "args": ["video/stream-1"]}));
//!     }
//!     println!("{event:?}");
//! }
//!
//! on_unload("stream-1", "viewer-42-stream-1", handle).await;
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod router;
pub mod testing;
pub mod transport;

pub use bridge::{Command, Event, EventSink, InboundMessage};
pub use config::{ConfigError, HostConfig, RouterConfig};
pub use error::{RouterError, RouterResult, REASON_CANCELLED, REASON_TIMEOUT};
pub use lifecycle::{on_load, on_unload, RouterHandle, SandboxChannels};
pub use router::{Router, RouterState};
pub use transport::mqtt::MqttAdapter;
pub use transport::{Transport, TransportError, TransportNotification};
