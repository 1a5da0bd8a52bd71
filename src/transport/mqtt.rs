//! MQTT implementation of the transport seam
//!
//! Thin façade over the rumqttc v5 client. Construction only prepares
//! connection options - no network I/O happens until `connect()` spawns the
//! polling task. Each `connect()` builds a fresh client/event-loop pair, so
//! the Router can drive reconnection by simply calling `connect()` again
//! after a loss.
//!
//! rumqttc does not return packet ids from `publish`/`subscribe` calls, so
//! acknowledgments are correlated by pairing the `Outgoing::*(pkid)` events
//! observed on the event loop (emitted in issue order) with a FIFO of issued
//! operations, then matching the ack's pkid against that assignment.

use super::{DeliveryToken, Transport, TransportError, TransportNotification};
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::{Outgoing, Transport as RumqttcTransport};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Pairs issued operations with the packet ids rumqttc assigns to them
#[derive(Default)]
struct InflightTable {
    queued_publishes: VecDeque<DeliveryToken>,
    inflight_publishes: HashMap<u16, DeliveryToken>,
    queued_subscribes: VecDeque<String>,
    inflight_subscribes: HashMap<u16, String>,
    queued_unsubscribes: VecDeque<String>,
    inflight_unsubscribes: HashMap<u16, String>,
}

impl InflightTable {
    fn clear(&mut self) {
        self.queued_publishes.clear();
        self.inflight_publishes.clear();
        self.queued_subscribes.clear();
        self.inflight_subscribes.clear();
        self.queued_unsubscribes.clear();
        self.inflight_unsubscribes.clear();
    }
}

/// MQTT transport adapter owned exclusively by one Router
pub struct MqttAdapter {
    client_id: String,
    options: MqttOptions,
    client: Option<AsyncClient>,
    notif_tx: mpsc::UnboundedSender<TransportNotification>,
    notif_rx: Option<mpsc::UnboundedReceiver<TransportNotification>>,
    inflight: Arc<Mutex<InflightTable>>,
    loop_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl MqttAdapter {
    /// Build the adapter from connection parameters. Performs no I/O.
    pub fn new(
        client_id: &str,
        host: &str,
        port: u16,
        use_ssl: bool,
    ) -> Result<Self, TransportError> {
        if client_id.is_empty() {
            return Err(TransportError::ClientInit(
                "client id must not be empty".to_string(),
            ));
        }
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(TransportError::ClientInit(format!(
                "invalid broker host: {host:?}"
            )));
        }

        let mut options = MqttOptions::new(client_id, host, port);
        if use_ssl {
            options.set_transport(RumqttcTransport::tls_with_default_config());
        }
        // Raise the packet ceiling; stream payloads exceed the 10KB broker
        // default
        options.set_max_packet_size(Some(256 * 1024));

        let (notif_tx, notif_rx) = mpsc::unbounded_channel();

        Ok(Self {
            client_id: client_id.to_string(),
            options,
            client: None,
            notif_tx,
            notif_rx: Some(notif_rx),
            inflight: Arc::new(Mutex::new(InflightTable::default())),
            loop_handle: None,
            shutdown_tx: None,
        })
    }

    /// Tear down any previous polling task before a fresh connect
    fn stop_event_loop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.loop_handle.take() {
            handle.abort();
        }
        self.client = None;
    }

    /// Route one event-loop item into notifications. Returns false when the
    /// polling task should stop.
    async fn route_event(
        event: Event,
        saw_connack: &mut bool,
        inflight: &Arc<Mutex<InflightTable>>,
        notif_tx: &mpsc::UnboundedSender<TransportNotification>,
    ) -> bool {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    *saw_connack = true;
                    let _ = notif_tx.send(TransportNotification::Connected);
                    true
                } else {
                    let _ = notif_tx.send(TransportNotification::ConnectFailed {
                        reason: format!("broker refused connection: {:?}", ack.code),
                    });
                    false
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let _ = notif_tx.send(TransportNotification::MessageArrived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                });
                true
            }
            Event::Incoming(Packet::PubAck(puback)) => {
                let token = inflight.lock().await.inflight_publishes.remove(&puback.pkid);
                match token {
                    Some(token) => {
                        let _ = notif_tx.send(TransportNotification::PublishAcked { token });
                    }
                    None => debug!(pkid = puback.pkid, "puback for unknown publish"),
                }
                true
            }
            Event::Incoming(Packet::SubAck(suback)) => {
                let topic = inflight.lock().await.inflight_subscribes.remove(&suback.pkid);
                if let Some(topic) = topic {
                    let _ = notif_tx.send(TransportNotification::SubscribeAcked { topic });
                }
                true
            }
            Event::Incoming(Packet::UnsubAck(unsuback)) => {
                let topic = inflight
                    .lock()
                    .await
                    .inflight_unsubscribes
                    .remove(&unsuback.pkid);
                if let Some(topic) = topic {
                    let _ = notif_tx.send(TransportNotification::UnsubscribeAcked { topic });
                }
                true
            }
            Event::Incoming(Packet::Disconnect(_)) => {
                let _ = notif_tx.send(TransportNotification::ConnectionLost {
                    cause: "broker sent disconnect".to_string(),
                });
                false
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                let mut table = inflight.lock().await;
                if let Some(token) = table.queued_publishes.pop_front() {
                    table.inflight_publishes.insert(pkid, token);
                }
                true
            }
            Event::Outgoing(Outgoing::Subscribe(pkid)) => {
                let mut table = inflight.lock().await;
                if let Some(topic) = table.queued_subscribes.pop_front() {
                    table.inflight_subscribes.insert(pkid, topic);
                }
                true
            }
            Event::Outgoing(Outgoing::Unsubscribe(pkid)) => {
                let mut table = inflight.lock().await;
                if let Some(topic) = table.queued_unsubscribes.pop_front() {
                    table.inflight_unsubscribes.insert(pkid, topic);
                }
                true
            }
            other => {
                debug!(target: "mqtt_transport", "mqtt event: {other:?}");
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for MqttAdapter {
    async fn connect(&mut self, keep_alive: Duration) -> Result<(), TransportError> {
        self.stop_event_loop();
        self.inflight.lock().await.clear();

        let mut options = self.options.clone();
        options.set_keep_alive(keep_alive);

        let (client, event_loop) = AsyncClient::new(options, 10);
        self.client = Some(client);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let notif_tx = self.notif_tx.clone();
        let inflight = self.inflight.clone();
        let client_id = self.client_id.clone();

        self.loop_handle = Some(tokio::spawn(async move {
            run_event_loop(event_loop, shutdown_rx, notif_tx, inflight, client_id).await;
        }));

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let result = match &self.client {
            Some(client) => client
                .disconnect()
                .await
                .map_err(|e| TransportError::DisconnectFailed(e.to_string())),
            None => Ok(()),
        };
        self.stop_event_loop();
        result
    }

    async fn publish(
        &mut self,
        token: DeliveryToken,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::PublishFailed("no active connection".to_string()))?;

        self.inflight
            .lock()
            .await
            .queued_publishes
            .push_back(token.clone());

        if let Err(e) = client
            .publish(&token.topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            // Roll the queued token back so a later pkid does not pair with
            // a publish that was never issued
            self.inflight.lock().await.queued_publishes.pop_back();
            return Err(TransportError::PublishFailed(e.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::SubscribeFailed("no active connection".to_string()))?;

        self.inflight
            .lock()
            .await
            .queued_subscribes
            .push_back(topic.to_string());

        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::UnsubscribeFailed("no active connection".to_string()))?;

        self.inflight
            .lock()
            .await
            .queued_unsubscribes
            .push_back(topic.to_string());

        client
            .unsubscribe(topic)
            .await
            .map_err(|e| TransportError::UnsubscribeFailed(e.to_string()))
    }

    fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<TransportNotification>> {
        self.notif_rx.take()
    }
}

/// Poll the rumqttc event loop until shutdown, a terminal packet, or a
/// network error. Reconnection is the Router's decision, not the adapter's:
/// on loss this task reports and stops, and the next `connect()` builds a
/// fresh client.
async fn run_event_loop(
    mut event_loop: EventLoop,
    mut shutdown_rx: watch::Receiver<bool>,
    notif_tx: mpsc::UnboundedSender<TransportNotification>,
    inflight: Arc<Mutex<InflightTable>>,
    client_id: String,
) {
    debug!(client_id = %client_id, "mqtt event loop started");
    let mut saw_connack = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!(client_id = %client_id, "mqtt event loop shutting down");
                    break;
                }
            }
            event = event_loop.poll() => {
                match event {
                    Ok(event) => {
                        if !MqttAdapter::route_event(event, &mut saw_connack, &inflight, &notif_tx)
                            .await
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        if saw_connack {
                            warn!(client_id = %client_id, "mqtt connection lost: {e}");
                            let _ = notif_tx.send(TransportNotification::ConnectionLost {
                                cause: e.to_string(),
                            });
                        } else {
                            let _ = notif_tx.send(TransportNotification::ConnectFailed {
                                reason: e.to_string(),
                            });
                        }
                        break;
                    }
                }
            }
        }
    }
    debug!(client_id = %client_id, "mqtt event loop stopped");
}

impl Drop for MqttAdapter {
    fn drop(&mut self) {
        // Stop the polling task; disconnect() is the graceful path
        self.stop_event_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_performs_no_io() {
        let adapter = MqttAdapter::new("stream-client-1", "broker.example.com", 1883, false);
        let adapter = adapter.unwrap();
        assert!(adapter.client.is_none());
        assert!(adapter.loop_handle.is_none());
    }

    #[test]
    fn test_construction_rejects_empty_client_id() {
        let result = MqttAdapter::new("", "broker.example.com", 1883, false);
        assert!(matches!(result, Err(TransportError::ClientInit(_))));
    }

    #[test]
    fn test_construction_rejects_malformed_host() {
        let result = MqttAdapter::new("client", "not a host", 1883, false);
        assert!(matches!(result, Err(TransportError::ClientInit(_))));

        let result = MqttAdapter::new("client", "", 1883, false);
        assert!(matches!(result, Err(TransportError::ClientInit(_))));
    }

    #[test]
    fn test_notifications_taken_once() {
        let mut adapter =
            MqttAdapter::new("stream-client-2", "broker.example.com", 8883, true).unwrap();
        assert!(adapter.take_notifications().is_some());
        assert!(adapter.take_notifications().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_connection_fails() {
        let mut adapter =
            MqttAdapter::new("stream-client-3", "broker.example.com", 1883, false).unwrap();
        let token = DeliveryToken {
            topic: "video/stream-3".to_string(),
            message_id: 1,
        };

        let result = adapter.publish(token, b"frame".to_vec()).await;
        assert!(matches!(result, Err(TransportError::PublishFailed(_))));
    }

    #[tokio::test]
    async fn test_inflight_pairing_by_issue_order() {
        let inflight = Arc::new(Mutex::new(InflightTable::default()));
        let (notif_tx, mut notif_rx) = mpsc::unbounded_channel();

        let first = DeliveryToken {
            topic: "video/a".to_string(),
            message_id: 1,
        };
        let second = DeliveryToken {
            topic: "video/b".to_string(),
            message_id: 2,
        };
        {
            let mut table = inflight.lock().await;
            table.queued_publishes.push_back(first.clone());
            table.queued_publishes.push_back(second.clone());
        }

        let mut saw_connack = true;
        // rumqttc assigns pkids in issue order
        MqttAdapter::route_event(
            Event::Outgoing(Outgoing::Publish(10)),
            &mut saw_connack,
            &inflight,
            &notif_tx,
        )
        .await;
        MqttAdapter::route_event(
            Event::Outgoing(Outgoing::Publish(11)),
            &mut saw_connack,
            &inflight,
            &notif_tx,
        )
        .await;

        // Acks may settle out of order
        let table = inflight.lock().await;
        assert_eq!(table.inflight_publishes.get(&10), Some(&first));
        assert_eq!(table.inflight_publishes.get(&11), Some(&second));
        assert!(notif_rx.try_recv().is_err());
    }
}
