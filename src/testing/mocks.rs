//! Mock implementations for testing
//!
//! Provides a recording mock Transport so the Router state machine can be
//! exercised without a broker. Clones share their recording state, so a test
//! can keep one copy while the Router owns another, and broker behavior is
//! simulated by injecting notifications through [`MockTransport::notifier`].

use crate::transport::{DeliveryToken, Transport, TransportError, TransportNotification};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

/// Which mock operations should fail at issue time
#[derive(Debug, Clone, Copy, Default)]
pub struct MockFailures {
    pub connect: bool,
    pub disconnect: bool,
    pub publish: bool,
    pub subscribe: bool,
    pub unsubscribe: bool,
}

/// Mock transport for testing
#[derive(Clone)]
pub struct MockTransport {
    pub connect_calls: Arc<Mutex<Vec<Duration>>>,
    pub disconnect_calls: Arc<Mutex<u32>>,
    pub published: Arc<Mutex<Vec<(DeliveryToken, Vec<u8>)>>>,
    pub subscribed: Arc<Mutex<Vec<String>>>,
    pub unsubscribed: Arc<Mutex<Vec<String>>>,
    failures: MockFailures,
    notif_tx: mpsc::UnboundedSender<TransportNotification>,
    notif_rx: Arc<std::sync::Mutex<Option<mpsc::UnboundedReceiver<TransportNotification>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_failures(MockFailures::default())
    }

    /// Mock whose every operation fails at issue time
    pub fn with_failure() -> Self {
        Self::with_failures(MockFailures {
            connect: true,
            disconnect: true,
            publish: true,
            subscribe: true,
            unsubscribe: true,
        })
    }

    pub fn with_failures(failures: MockFailures) -> Self {
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();
        Self {
            connect_calls: Arc::new(Mutex::new(Vec::new())),
            disconnect_calls: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
            subscribed: Arc::new(Mutex::new(Vec::new())),
            unsubscribed: Arc::new(Mutex::new(Vec::new())),
            failures,
            notif_tx,
            notif_rx: Arc::new(std::sync::Mutex::new(Some(notif_rx))),
        }
    }

    /// Handle for injecting simulated broker notifications
    pub fn notifier(&self) -> mpsc::UnboundedSender<TransportNotification> {
        self.notif_tx.clone()
    }

    pub async fn connect_count(&self) -> usize {
        self.connect_calls.lock().await.len()
    }

    pub async fn published_topics(&self) -> Vec<String> {
        self.published
            .lock()
            .await
            .iter()
            .map(|(token, _)| token.topic.clone())
            .collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, keep_alive: Duration) -> Result<(), TransportError> {
        if self.failures.connect {
            return Err(TransportError::ConnectFailed(
                "mock connect failure".to_string(),
            ));
        }
        self.connect_calls.lock().await.push(keep_alive);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.failures.disconnect {
            return Err(TransportError::DisconnectFailed(
                "mock disconnect failure".to_string(),
            ));
        }
        *self.disconnect_calls.lock().await += 1;
        Ok(())
    }

    async fn publish(
        &mut self,
        token: DeliveryToken,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.failures.publish {
            return Err(TransportError::PublishFailed(
                "mock publish failure".to_string(),
            ));
        }
        self.published.lock().await.push((token, payload));
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.failures.subscribe {
            return Err(TransportError::SubscribeFailed(
                "mock subscribe failure".to_string(),
            ));
        }
        self.subscribed.lock().await.push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.failures.unsubscribe {
            return Err(TransportError::UnsubscribeFailed(
                "mock unsubscribe failure".to_string(),
            ));
        }
        self.unsubscribed.lock().await.push(topic.to_string());
        Ok(())
    }

    fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<TransportNotification>> {
        self.notif_rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
    }
}
