//! Sandbox lifecycle bootstrap
//!
//! The two entry points invoked in lock-step with the sandbox's own
//! lifecycle. `on_load` constructs the Router, wires the bridge, spawns the
//! pump task and announces the outcome to the host; `on_unload` destroys the
//! Router. Neither entry point panics or returns an error: the callers are
//! the sandbox's own load/unload hooks, where an escaped failure would be
//! unrecoverable, so every failure is logged and announced as an event
//! instead.

use crate::bridge::{self, Event, EventSink};
use crate::config::{HostConfig, RouterConfig};
use crate::observability::logging::LoggerFactory;
use crate::router::{Router, RouterState};
use crate::transport::mqtt::MqttAdapter;
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The host's two ends of the sandbox bridge
pub struct SandboxChannels {
    /// Host → sandbox: raw `{command, args}` JSON messages
    pub command_tx: mpsc::UnboundedSender<serde_json::Value>,
    /// Sandbox → host: Router events, at-most-once
    pub event_rx: mpsc::UnboundedReceiver<Event>,
}

/// Handle to a live sandboxed Router
pub struct RouterHandle<T: Transport = MqttAdapter> {
    router: Arc<Mutex<Router<T>>>,
    pump: JoinHandle<()>,
}

impl<T: Transport> RouterHandle<T> {
    /// Shared access to the Router (the pump task holds the other clone)
    pub fn router(&self) -> Arc<Mutex<Router<T>>> {
        self.router.clone()
    }

    /// Whether the pump task has stopped
    pub fn is_finished(&self) -> bool {
        self.pump.is_finished()
    }
}

/// Construct-and-announce: sandbox load entry point.
///
/// Returns the host's bridge channels regardless of outcome, so a
/// construction failure is still observable as a `CREATE_FAILURE` event; the
/// handle is `None` in that case.
pub fn on_load(
    log_id: &str,
    client_id: &str,
    config: HostConfig,
    logger: Arc<dyn LoggerFactory>,
) -> (SandboxChannels, Option<RouterHandle<MqttAdapter>>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (sink, event_rx) = EventSink::channel();
    let channels = SandboxChannels {
        command_tx,
        event_rx,
    };

    let router_config = RouterConfig::from_host(config, logger);
    match Router::factory(router_config, sink.clone()) {
        Ok(router) => {
            let handle = spawn_router(router, command_rx);
            sink.post(Event::Created {
                log_id: log_id.to_string(),
            });
            info!(log_id = %log_id, client_id = %client_id, "router created");
            (channels, Some(handle))
        }
        Err(e) => {
            error!(log_id = %log_id, client_id = %client_id, "router creation failed: {e}");
            sink.post(Event::CreateFailure {
                reason: e.to_string(),
            });
            (channels, None)
        }
    }
}

/// Destroy-and-announce: sandbox unload entry point.
///
/// Tolerates a sandbox that was torn down before a Router ever existed, and
/// swallows destroy failures after logging them through the Router's own
/// logger.
pub async fn on_unload<T: Transport>(
    log_id: &str,
    client_id: &str,
    handle: Option<RouterHandle<T>>,
) {
    let Some(handle) = handle else {
        warn!(log_id = %log_id, client_id = %client_id,
            "unload before a router existed; nothing to destroy");
        return;
    };

    info!(log_id = %log_id, client_id = %client_id, "destroying router");
    {
        let mut router = handle.router.lock().await;
        if let Err(e) = router.destroy().await {
            router.logger().error(&format!("error during destroy: {e}"));
        }
    }
    handle.pump.abort();
    info!(log_id = %log_id, "router destroyed");
}

/// Wire a Router into its sandbox pump task.
///
/// The pump serializes all Router mutation onto one task: inbound host
/// commands, transport notifications, and internal timer messages are
/// handled in arrival order, one at a time.
pub fn spawn_router<T: Transport>(
    mut router: Router<T>,
    command_rx: mpsc::UnboundedReceiver<serde_json::Value>,
) -> RouterHandle<T> {
    let notif_rx = router.take_transport_notifications().unwrap_or_else(closed_channel);
    let internal_rx = router.take_internal_rx().unwrap_or_else(closed_channel);

    let router = Arc::new(Mutex::new(router));
    let pump = tokio::spawn(pump_loop(
        router.clone(),
        command_rx,
        notif_rx,
        internal_rx,
    ));

    RouterHandle { router, pump }
}

fn closed_channel<M>() -> mpsc::UnboundedReceiver<M> {
    let (_tx, rx) = mpsc::unbounded_channel();
    rx
}

async fn pump_loop<T: Transport>(
    router: Arc<Mutex<Router<T>>>,
    mut command_rx: mpsc::UnboundedReceiver<serde_json::Value>,
    mut notif_rx: mpsc::UnboundedReceiver<crate::transport::TransportNotification>,
    mut internal_rx: mpsc::UnboundedReceiver<crate::router::RouterMsg>,
) {
    loop {
        let destroyed = tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(raw) => {
                    let mut router = router.lock().await;
                    bridge::dispatch_message(&mut router, raw).await;
                    router.state() == RouterState::Destroyed
                }
                // Host dropped its end of the bridge; the sandbox is going
                // away
                None => true,
            },
            Some(notification) = notif_rx.recv() => {
                let mut router = router.lock().await;
                router.handle_transport(notification).await;
                router.state() == RouterState::Destroyed
            }
            Some(msg) = internal_rx.recv() => {
                let mut router = router.lock().await;
                router.handle_internal(msg).await;
                router.state() == RouterState::Destroyed
            }
            else => true,
        };

        if destroyed {
            break;
        }
    }
}
