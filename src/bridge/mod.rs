//! Sandbox bridge: the message-passing contract between sandbox and host
//!
//! Inbound, the host sends `{command, args}` JSON objects; they are parsed
//! into the closed [`Command`] enum and dispatched onto Router methods.
//! Anything that fails along that path - malformed JSON, unknown command
//! name, bad arguments - produces a single `WINDOW_MESSAGE_FAIL` event and
//! never an escaped panic, because nothing thrown inside the message handler
//! is observable to the host.
//!
//! Outbound, every Router [`Event`] is serialized as `{event: NAME, ...}` and
//! posted through the [`EventSink`]. Delivery is fire-and-forget, at most
//! once: a host that has torn the sandbox down simply stops receiving.

use crate::router::Router;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Inbound command message as received from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub command: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// Closed command taxonomy. Unknown names fail parsing; there is no open
/// string-keyed dispatch table to miss silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Publish { topic: String, message: String },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

impl Command {
    /// Look up the command name and extract its positional arguments.
    /// `SEND` is a host-side convenience alias for `PUBLISH`.
    pub fn parse(msg: &InboundMessage) -> Result<Self, String> {
        fn string_arg(msg: &InboundMessage, index: usize, name: &str) -> Result<String, String> {
            msg.args
                .get(index)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    format!(
                        "`{}` requires a string `{name}` argument at position {index}",
                        msg.command
                    )
                })
        }

        match msg.command.as_str() {
            "CONNECT" => Ok(Command::Connect),
            "DISCONNECT" => Ok(Command::Disconnect),
            "PUBLISH" | "SEND" => Ok(Command::Publish {
                topic: string_arg(msg, 0, "topic")?,
                message: string_arg(msg, 1, "message")?,
            }),
            "SUBSCRIBE" => Ok(Command::Subscribe {
                topic: string_arg(msg, 0, "topic")?,
            }),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe {
                topic: string_arg(msg, 0, "topic")?,
            }),
            other => Err(format!("unknown command `{other}`")),
        }
    }
}

/// Closed event taxonomy emitted by the Router, one-shot per occurrence.
/// Serializes as `{"event": "CONNECT_SUCCESS", ...payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all_fields = "camelCase")]
pub enum Event {
    Created { log_id: String },
    CreateFailure { reason: String },
    ConnectSuccess,
    ConnectFailure { reason: String },
    ConnectionLost { cause: String },
    DisconnectSuccess,
    DisconnectFailure { reason: String },
    PublishSuccess { topic: String, message_id: u64 },
    PublishFailure { topic: String, message_id: u64, reason: String },
    SubscribeFailure { topic: String, reason: String },
    UnsubscribeSuccess { topic: String },
    UnsubscribeFailure { topic: String, reason: String },
    MessageArrived { topic: String, payload: Vec<u8> },
    WindowMessageFail { command: String, reason: String },
}

/// Outbound half of the bridge. Cloneable; posting to a host that is gone is
/// a dropped delivery, never an error.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    /// Create a sink and its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Fire-and-forget, at-most-once delivery
    pub fn post(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event dropped: host side of the bridge is closed");
        }
    }
}

/// Handle one raw inbound message from the host.
///
/// Every failure path ends in a `WINDOW_MESSAGE_FAIL` event; Router methods
/// emit their own operation failure events, so their `Err` returns are only
/// debug-logged here.
pub async fn dispatch_message<T: Transport>(router: &mut Router<T>, raw: serde_json::Value) {
    let msg: InboundMessage = match serde_json::from_value(raw.clone()) {
        Ok(msg) => msg,
        Err(e) => {
            let command = raw
                .get("command")
                .and_then(|v| v.as_str())
                .unwrap_or("<malformed>")
                .to_string();
            router.events().post(Event::WindowMessageFail {
                command,
                reason: format!("malformed command message: {e}"),
            });
            return;
        }
    };

    let command = match Command::parse(&msg) {
        Ok(command) => command,
        Err(reason) => {
            router.events().post(Event::WindowMessageFail {
                command: msg.command,
                reason,
            });
            return;
        }
    };

    let result = match command {
        Command::Connect => router.connect().await,
        Command::Disconnect => router.disconnect().await,
        Command::Publish { topic, message } => {
            router.publish(&topic, message.into_bytes()).await.map(|_| ())
        }
        Command::Subscribe { topic } => router.subscribe(&topic).await,
        Command::Unsubscribe { topic } => router.unsubscribe(&topic).await,
    };

    if let Err(e) = result {
        debug!(command = %msg.command, "command completed with error: {e}");
    }
}
