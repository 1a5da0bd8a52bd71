//! Router: the protocol client owning one transport session
//!
//! One Router per sandbox. It owns the connection state machine, the
//! pending-operation table, its injected logger, and exactly one transport
//! instance; nothing is shared across sandboxes. All outcomes reach the host
//! as [`Event`]s through the bridge - a Router never lets an error escape
//! toward the sandbox boundary.

use crate::bridge::{Event, EventSink};
use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult, REASON_CANCELLED, REASON_TIMEOUT};
use crate::observability::logging::Logger;
use crate::transport::mqtt::MqttAdapter;
use crate::transport::{DeliveryToken, Transport, TransportNotification};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub mod pending;

pub use pending::{CorrelationId, OperationKind, PendingTable};

/// Connection state machine
///
/// `Idle → Connecting → Connected → Disconnecting → Idle`, with
/// `Connected → Reconnecting → Connecting` on unexpected loss and a terminal
/// `Destroyed` reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Reconnecting,
    Destroyed,
}

/// Internal messages delivered to the Router by its own timers
#[derive(Debug, Clone)]
pub enum RouterMsg {
    /// A pending operation exceeded its deadline
    OperationTimedOut(CorrelationId),
    /// The scheduled reconnection attempt is due
    ReconnectDue,
}

/// Protocol client for one stream's broker session
pub struct Router<T: Transport> {
    config: RouterConfig,
    state: RouterState,
    transport: T,
    logger: Box<dyn Logger>,
    pending: PendingTable,
    active_reconnect: Option<JoinHandle<()>>,
    next_message_id: u64,
    events: EventSink,
    internal_tx: mpsc::UnboundedSender<RouterMsg>,
    internal_rx: Option<mpsc::UnboundedReceiver<RouterMsg>>,
}

impl Router<MqttAdapter> {
    /// Build a Router over the production MQTT adapter.
    ///
    /// Validates the configuration, builds the logger and the transport
    /// client. No network I/O occurs here; `connect()` must be invoked
    /// explicitly.
    pub fn factory(config: RouterConfig, events: EventSink) -> RouterResult<Self> {
        config.validate()?;
        let logger = build_logger(&config)?;
        let transport =
            MqttAdapter::new(&config.client_id, &config.host, config.port, config.use_ssl)
                .map_err(|e| RouterError::dependency_init("transport client", e))?;
        Ok(Self::assemble(config, transport, logger, events))
    }
}

impl<T: Transport> Router<T> {
    /// Build a Router over an injected transport (test seam)
    pub fn with_transport(config: RouterConfig, transport: T, events: EventSink) -> RouterResult<Self> {
        config.validate()?;
        let logger = build_logger(&config)?;
        Ok(Self::assemble(config, transport, logger, events))
    }

    fn assemble(config: RouterConfig, transport: T, logger: Box<dyn Logger>, events: EventSink) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            config,
            state: RouterState::Idle,
            transport,
            logger,
            pending: PendingTable::new(),
            active_reconnect: None,
            next_message_id: 0,
            events,
            internal_tx,
            internal_rx: Some(internal_rx),
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Number of operations currently awaiting settlement
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a reconnection attempt is currently scheduled
    pub fn has_active_reconnect(&self) -> bool {
        self.active_reconnect.is_some()
    }

    /// Take the internal timer-message receiver for the sandbox pump.
    /// Yields `Some` exactly once.
    pub fn take_internal_rx(&mut self) -> Option<mpsc::UnboundedReceiver<RouterMsg>> {
        self.internal_rx.take()
    }

    /// Take the transport notification receiver for the sandbox pump
    pub fn take_transport_notifications(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<TransportNotification>> {
        self.transport.take_notifications()
    }

    /// Open the broker connection.
    ///
    /// Valid from `Idle` or `Reconnecting`. The attempt settles later via a
    /// transport notification or the connection timeout.
    pub async fn connect(&mut self) -> RouterResult<()> {
        match self.state {
            RouterState::Idle | RouterState::Reconnecting => {}
            state => {
                let err = RouterError::InvalidState {
                    op: "connect",
                    state,
                };
                self.logger.warn(&err.to_string());
                self.events.post(Event::ConnectFailure {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        }

        self.state = RouterState::Connecting;
        self.open_pending(
            CorrelationId::Connect,
            OperationKind::Connect,
            self.config.connection_timeout_ms,
        );
        self.logger.info(&format!(
            "connecting to {}:{} (ssl: {})",
            self.config.host, self.config.port, self.config.use_ssl
        ));

        let keep_alive = Duration::from_secs(self.config.keep_alive_interval_secs);
        if let Err(e) = self.transport.connect(keep_alive).await {
            self.pending.settle(&CorrelationId::Connect);
            self.state = RouterState::Idle;
            let reason = e.to_string();
            self.logger.error(&format!("connect failed: {reason}"));
            self.events.post(Event::ConnectFailure {
                reason: reason.clone(),
            });
            return Err(RouterError::Connection(reason));
        }
        Ok(())
    }

    /// Close the broker connection. Valid only from `Connected`; a failed
    /// disconnect does not change connectivity.
    pub async fn disconnect(&mut self) -> RouterResult<()> {
        if self.state != RouterState::Connected {
            let err = RouterError::InvalidState {
                op: "disconnect",
                state: self.state,
            };
            self.logger.warn(&err.to_string());
            self.events.post(Event::DisconnectFailure {
                reason: err.to_string(),
            });
            return Err(err);
        }

        self.state = RouterState::Disconnecting;
        match self.transport.disconnect().await {
            Ok(()) => {
                self.state = RouterState::Idle;
                self.logger.info("disconnected");
                self.events.post(Event::DisconnectSuccess);
                Ok(())
            }
            Err(e) => {
                self.state = RouterState::Connected;
                let reason = e.to_string();
                self.logger.error(&format!("disconnect failed: {reason}"));
                self.events.post(Event::DisconnectFailure { reason });
                Err(e.into())
            }
        }
    }

    /// Publish a payload, returning the minted message id.
    ///
    /// Gates on the Router's own state before touching the adapter: the
    /// underlying client libraries report "not connected" and "already
    /// connected" with the same error code, so that code is never consulted
    /// for connectivity decisions.
    pub async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> RouterResult<u64> {
        self.next_message_id += 1;
        let message_id = self.next_message_id;

        if self.state != RouterState::Connected {
            let err = RouterError::InvalidState {
                op: "publish",
                state: self.state,
            };
            self.logger.warn(&err.to_string());
            self.events.post(Event::PublishFailure {
                topic: topic.to_string(),
                message_id,
                reason: err.to_string(),
            });
            return Err(err);
        }

        let corr = CorrelationId::Publish {
            topic: topic.to_string(),
            message_id,
        };
        self.open_pending(corr.clone(), OperationKind::Publish, self.config.publish_timeout_ms);

        let token = DeliveryToken {
            topic: topic.to_string(),
            message_id,
        };
        if let Err(e) = self.transport.publish(token, payload).await {
            self.pending.settle(&corr);
            let reason = e.to_string();
            self.logger.error(&format!("publish {message_id} failed: {reason}"));
            self.events.post(Event::PublishFailure {
                topic: topic.to_string(),
                message_id,
                reason,
            });
            return Err(e.into());
        }

        self.logger
            .silly(&format!("publish {message_id} issued on {topic}"));
        Ok(message_id)
    }

    /// Subscribe to a topic. Requires `Connected`; only failures are
    /// surfaced as events.
    pub async fn subscribe(&mut self, topic: &str) -> RouterResult<()> {
        if self.state != RouterState::Connected {
            let err = RouterError::InvalidState {
                op: "subscribe",
                state: self.state,
            };
            self.logger.warn(&err.to_string());
            self.events.post(Event::SubscribeFailure {
                topic: topic.to_string(),
                reason: err.to_string(),
            });
            return Err(err);
        }

        let corr = CorrelationId::Subscribe {
            topic: topic.to_string(),
        };
        self.open_pending(corr.clone(), OperationKind::Subscribe, self.config.publish_timeout_ms);

        if let Err(e) = self.transport.subscribe(topic).await {
            self.pending.settle(&corr);
            let reason = e.to_string();
            self.logger.error(&format!("subscribe to {topic} failed: {reason}"));
            self.events.post(Event::SubscribeFailure {
                topic: topic.to_string(),
                reason,
            });
            return Err(e.into());
        }

        self.logger.debug(&format!("subscribe issued for {topic}"));
        Ok(())
    }

    /// Unsubscribe from a topic. Requires `Connected`; acknowledgment emits
    /// `UNSUBSCRIBE_SUCCESS`.
    pub async fn unsubscribe(&mut self, topic: &str) -> RouterResult<()> {
        if self.state != RouterState::Connected {
            let err = RouterError::InvalidState {
                op: "unsubscribe",
                state: self.state,
            };
            self.logger.warn(&err.to_string());
            self.events.post(Event::UnsubscribeFailure {
                topic: topic.to_string(),
                reason: err.to_string(),
            });
            return Err(err);
        }

        let corr = CorrelationId::Unsubscribe {
            topic: topic.to_string(),
        };
        self.open_pending(corr.clone(), OperationKind::Unsubscribe, self.config.publish_timeout_ms);

        if let Err(e) = self.transport.unsubscribe(topic).await {
            self.pending.settle(&corr);
            let reason = e.to_string();
            self.logger
                .error(&format!("unsubscribe from {topic} failed: {reason}"));
            self.events.post(Event::UnsubscribeFailure {
                topic: topic.to_string(),
                reason,
            });
            return Err(e.into());
        }

        self.logger.debug(&format!("unsubscribe issued for {topic}"));
        Ok(())
    }

    /// Handle an asynchronous transport notification
    pub async fn handle_transport(&mut self, notification: TransportNotification) {
        match notification {
            TransportNotification::Connected => {
                if self.pending.settle(&CorrelationId::Connect).is_none() {
                    self.logger.debug("late connect acknowledgment discarded");
                    return;
                }
                self.state = RouterState::Connected;
                self.logger.info("connected");
                self.events.post(Event::ConnectSuccess);
            }
            TransportNotification::ConnectFailed { reason } => {
                if self.pending.settle(&CorrelationId::Connect).is_none() {
                    self.logger.debug("late connect failure discarded");
                    return;
                }
                self.state = RouterState::Idle;
                self.logger.error(&format!("connect failed: {reason}"));
                self.events.post(Event::ConnectFailure { reason });
            }
            TransportNotification::ConnectionLost { cause } => {
                self.handle_connection_lost(cause);
            }
            TransportNotification::PublishAcked { token } => {
                let corr = CorrelationId::Publish {
                    topic: token.topic.clone(),
                    message_id: token.message_id,
                };
                match self.pending.settle(&corr) {
                    Some(op) => {
                        self.logger.silly(&format!(
                            "publish {} acknowledged after {}ms",
                            token.message_id,
                            op.elapsed_ms()
                        ));
                        self.events.post(Event::PublishSuccess {
                            topic: token.topic,
                            message_id: token.message_id,
                        });
                    }
                    None => {
                        // Already settled (timed out or cancelled); at most
                        // one terminal event per operation
                        self.logger.debug(&format!(
                            "late acknowledgment for publish {} discarded",
                            token.message_id
                        ));
                    }
                }
            }
            TransportNotification::SubscribeAcked { topic } => {
                let corr = CorrelationId::Subscribe {
                    topic: topic.clone(),
                };
                if self.pending.settle(&corr).is_some() {
                    self.logger.debug(&format!("subscribed to {topic}"));
                } else {
                    self.logger
                        .debug(&format!("late subscribe ack for {topic} discarded"));
                }
            }
            TransportNotification::SubscribeRejected { topic, reason } => {
                let corr = CorrelationId::Subscribe {
                    topic: topic.clone(),
                };
                if self.pending.settle(&corr).is_some() {
                    self.logger
                        .warn(&format!("subscribe to {topic} rejected: {reason}"));
                    self.events.post(Event::SubscribeFailure { topic, reason });
                }
            }
            TransportNotification::UnsubscribeAcked { topic } => {
                let corr = CorrelationId::Unsubscribe {
                    topic: topic.clone(),
                };
                if self.pending.settle(&corr).is_some() {
                    self.logger.debug(&format!("unsubscribed from {topic}"));
                    self.events.post(Event::UnsubscribeSuccess { topic });
                }
            }
            TransportNotification::MessageArrived { topic, payload } => {
                if self.state != RouterState::Connected {
                    self.logger
                        .debug(&format!("message on {topic} dropped (not connected)"));
                    return;
                }
                // Fan-out: delivered regardless of which command requested
                // the subscription. Payload bytes pass through untouched;
                // media segments are not text.
                self.events.post(Event::MessageArrived {
                    topic,
                    payload: payload.to_vec(),
                });
            }
        }
    }

    /// Handle an internal timer message
    pub async fn handle_internal(&mut self, msg: RouterMsg) {
        match msg {
            RouterMsg::OperationTimedOut(corr) => self.handle_timeout(corr),
            RouterMsg::ReconnectDue => {
                self.active_reconnect = None;
                if self.state != RouterState::Reconnecting {
                    return;
                }
                self.logger.info("reconnection attempt due");
                if let Err(e) = self.connect().await {
                    self.logger.warn(&format!("reconnection attempt failed: {e}"));
                }
            }
        }
    }

    fn handle_timeout(&mut self, corr: CorrelationId) {
        let Some(op) = self.pending.settle(&corr) else {
            // Timer fired after settlement won the race; nothing to do
            return;
        };
        self.logger.warn(&format!(
            "{:?} operation timed out after {}ms",
            op.kind,
            op.elapsed_ms()
        ));

        match corr {
            CorrelationId::Connect => {
                if self.state == RouterState::Connecting {
                    self.state = RouterState::Idle;
                }
                self.events.post(Event::ConnectFailure {
                    reason: REASON_TIMEOUT.to_string(),
                });
            }
            CorrelationId::Publish { topic, message_id } => {
                self.events.post(Event::PublishFailure {
                    topic,
                    message_id,
                    reason: REASON_TIMEOUT.to_string(),
                });
            }
            CorrelationId::Subscribe { topic } => {
                self.events.post(Event::SubscribeFailure {
                    topic,
                    reason: REASON_TIMEOUT.to_string(),
                });
            }
            CorrelationId::Unsubscribe { topic } => {
                self.events.post(Event::UnsubscribeFailure {
                    topic,
                    reason: REASON_TIMEOUT.to_string(),
                });
            }
        }
    }

    fn handle_connection_lost(&mut self, cause: String) {
        if self.state != RouterState::Connected {
            self.logger
                .debug(&format!("connection-lost signal ignored in state {:?}", self.state));
            return;
        }
        self.state = RouterState::Reconnecting;
        self.logger.warn(&format!("connection lost: {cause}"));
        self.events.post(Event::ConnectionLost { cause });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        // A new schedule replaces any existing one; repeated losses never
        // stack timers
        if let Some(handle) = self.active_reconnect.take() {
            handle.abort();
        }
        let tx = self.internal_tx.clone();
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
        self.active_reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RouterMsg::ReconnectDue);
        }));
    }

    fn open_pending(&mut self, corr: CorrelationId, kind: OperationKind, timeout_ms: u64) {
        let tx = self.internal_tx.clone();
        let deadline_corr = corr.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            let _ = tx.send(RouterMsg::OperationTimedOut(deadline_corr));
        });
        self.pending.open(corr, kind, timer);
    }

    /// Tear the Router down. Idempotent; cleanup always completes.
    ///
    /// Cancels the reconnection timer, settles every outstanding operation
    /// as cancelled so no caller hangs, then attempts a best-effort
    /// disconnect. Only that disconnect failure is reported to the caller.
    pub async fn destroy(&mut self) -> RouterResult<()> {
        if self.state == RouterState::Destroyed {
            self.logger.debug("destroy called on already-destroyed router");
            return Ok(());
        }

        if let Some(handle) = self.active_reconnect.take() {
            handle.abort();
        }

        for (corr, _op) in self.pending.drain() {
            match corr {
                CorrelationId::Connect => self.events.post(Event::ConnectFailure {
                    reason: REASON_CANCELLED.to_string(),
                }),
                CorrelationId::Publish { topic, message_id } => {
                    self.events.post(Event::PublishFailure {
                        topic,
                        message_id,
                        reason: REASON_CANCELLED.to_string(),
                    })
                }
                CorrelationId::Subscribe { topic } => self.events.post(Event::SubscribeFailure {
                    topic,
                    reason: REASON_CANCELLED.to_string(),
                }),
                CorrelationId::Unsubscribe { topic } => {
                    self.events.post(Event::UnsubscribeFailure {
                        topic,
                        reason: REASON_CANCELLED.to_string(),
                    })
                }
            }
        }

        let was = std::mem::replace(&mut self.state, RouterState::Destroyed);
        let result = match was {
            RouterState::Connecting
            | RouterState::Connected
            | RouterState::Disconnecting
            | RouterState::Reconnecting => self.transport.disconnect().await,
            RouterState::Idle | RouterState::Destroyed => Ok(()),
        };

        self.logger.info("router destroyed");
        result.map_err(RouterError::Transport)
    }
}

fn build_logger(config: &RouterConfig) -> RouterResult<Box<dyn Logger>> {
    config.logger.create(&config.log_id).map_err(|e| {
        // The logger itself is unavailable, so the diagnostic console is the
        // only place the underlying cause can go
        eprintln!(
            "logger construction failed for `{}`: {e}",
            config.log_id
        );
        RouterError::dependency_init("logger", e)
    })
}
