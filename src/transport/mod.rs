//! Transport layer for the stream Router
//!
//! This module provides the transport abstraction and its MQTT
//! implementation. The trait is the seam the Router is tested through: the
//! production [`MqttAdapter`](mqtt::MqttAdapter) wraps rumqttc, while tests
//! inject a recording mock.
//!
//! Asynchronous signals from the broker (connection established/lost,
//! message arrived, operation acknowledgments) flow back through a
//! notification channel rather than callbacks; the Router drains it from its
//! sandbox pump loop.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;

pub mod mqtt;

/// Correlation token for an in-flight publish.
///
/// The Router mints the `message_id` (monotonic per Router) and keys its
/// pending-operation table with `(topic, message_id)`; the adapter echoes the
/// token back in the delivery acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryToken {
    pub topic: String,
    pub message_id: u64,
}

/// Asynchronous signals from the transport to the Router
#[derive(Debug, Clone)]
pub enum TransportNotification {
    /// Broker acknowledged the connection (ConnAck)
    Connected,
    /// Connection attempt failed before it was ever established
    ConnectFailed { reason: String },
    /// Established connection was lost unexpectedly
    ConnectionLost { cause: String },
    /// Broker acknowledged delivery of a published message
    PublishAcked { token: DeliveryToken },
    /// Broker confirmed a subscription
    SubscribeAcked { topic: String },
    /// Broker rejected a subscription
    SubscribeRejected { topic: String, reason: String },
    /// Broker confirmed an unsubscription
    UnsubscribeAcked { topic: String },
    /// A message arrived on a subscribed topic
    MessageArrived { topic: String, payload: Bytes },
}

/// Transport errors, reported at operation issue time.
///
/// These describe the act of handing an operation to the client library;
/// settlement outcomes arrive later as notifications.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport client construction failed: {0}")]
    ClientInit(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("disconnect failed: {0}")]
    DisconnectFailed(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("unsubscribe failed: {0}")]
    UnsubscribeFailed(String),
}

/// Transport trait for broker communication
///
/// Operations are issue-and-settle: the async method reports whether the
/// operation was handed to the client, and the terminal outcome (ack,
/// rejection, loss) arrives on the notification channel.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Open the broker connection with the given keep-alive interval.
    /// Callable again after a connection loss.
    async fn connect(&mut self, keep_alive: Duration) -> Result<(), TransportError>;

    /// Close the broker connection
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Publish a payload; the ack notification echoes `token`
    async fn publish(&mut self, token: DeliveryToken, payload: Vec<u8>)
        -> Result<(), TransportError>;

    /// Subscribe to a topic
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Unsubscribe from a topic
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Take the notification receiver. Yields `Some` exactly once.
    fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<TransportNotification>>;
}
