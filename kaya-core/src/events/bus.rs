//! Event bus for Kaya orchestrator coordination.
//!
//! Provides pub/sub messaging over a Tokio broadcast channel, with
//! sinks (console, NDJSON file, optional WebSocket) that fan out every
//! published event outside the process.

use super::sinks::{self, DropCounter};
use super::types::KayaEvent;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Channel capacity for the broadcast sender. Sized generously so that a
/// momentarily slow sink lags rather than blocking publishers.
const CHANNEL_CAPACITY: usize = 1024;

/// Wall-clock budget for sinks to flush and exit on shutdown.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event channel closed")]
    ChannelClosed,
}

pub type EventBusResult<T> = Result<T, EventBusError>;

pub type SharedEventBus = Arc<EventBus>;

/// Which sinks to start alongside the bus.
#[derive(Debug, Clone, Default)]
pub struct SinkConfig {
    pub console: bool,
    pub file_path: Option<PathBuf>,
    #[cfg(feature = "ws-sink")]
    pub ws_addr: Option<std::net::SocketAddr>,
}

pub struct EventBus {
    sender: broadcast::Sender<KayaEvent>,
    drops: Arc<DropCounter>,
    cancel: CancellationToken,
    sink_handles: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus with no sinks attached. Useful for unit tests.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            drops: Arc::new(DropCounter::new()),
            cancel: CancellationToken::new(),
            sink_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a bus and start the sinks named in `config`.
    pub fn with_sinks(config: SinkConfig) -> Self {
        let bus = Self::new();
        let mut handles = Vec::new();

        if config.console {
            handles.push(sinks::spawn_console_sink(
                bus.subscribe(),
                bus.cancel.clone(),
                bus.drops.clone(),
            ));
        }
        if let Some(path) = config.file_path {
            handles.push(sinks::spawn_file_sink(
                bus.subscribe(),
                path,
                bus.cancel.clone(),
                bus.drops.clone(),
            ));
        }
        #[cfg(feature = "ws-sink")]
        if let Some(addr) = config.ws_addr {
            handles.push(sinks::ws::spawn_ws_sink(
                bus.sender.clone(),
                addr,
                bus.cancel.clone(),
            ));
        }

        *bus.sink_handles.lock().unwrap() = handles;
        bus
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Never blocks; a lagging
    /// subscriber loses its oldest buffered events rather than stalling
    /// the publisher.
    pub fn publish(&self, event: KayaEvent) -> EventBusResult<()> {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "event published");
                Ok(())
            }
            Err(_) => {
                debug!(event_type, "event published (no receivers)");
                Ok(())
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KayaEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    /// Total events dropped across all sinks due to lag.
    pub fn dropped_count(&self) -> u64 {
        self.drops.get()
    }

    /// Signal every sink to stop and wait up to [`SHUTDOWN_GRACE`] for them
    /// to flush and exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.sink_handles.lock().unwrap());
        let join_all = futures::future::join_all(handles);
        if tokio::time::timeout(SHUTDOWN_GRACE, join_all).await.is_err() {
            warn!("event bus sinks did not shut down within grace period");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Selective subscription filter.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub session_id: Option<crate::clock::SessionId>,
    pub task_id: Option<crate::clock::TaskId>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, session_id: crate::clock::SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn task(mut self, task_id: crate::clock::TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &KayaEvent) -> bool {
        if let Some(sid) = self.session_id {
            if event.session_id().is_some_and(|s| s != sid) {
                return false;
            }
        }
        if let Some(tid) = self.task_id {
            if event.task_id().is_some_and(|t| t != tid) {
                return false;
            }
        }
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}

/// Receiver that only yields events matching its [`EventFilter`].
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<KayaEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<KayaEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    pub async fn recv(&mut self) -> Result<KayaEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TaskId;
    use chrono::Utc;

    fn sample_event() -> KayaEvent {
        KayaEvent::AgentStarted {
            task_id: TaskId::new(),
            worker: "scribe".to_string(),
            model: "cheap-tier".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let event = sample_event();
        bus.publish(event.clone()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "agent_started");
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(sample_event()).unwrap();
        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[test]
    fn filter_matches_task_id() {
        let task_id = TaskId::new();
        let filter = EventFilter::new().task(task_id);
        let matching = KayaEvent::AgentStarted {
            task_id,
            worker: "scribe".to_string(),
            model: "cheap-tier".to_string(),
            timestamp: Utc::now(),
        };
        let non_matching = sample_event();
        assert!(filter.matches(&matching));
        assert!(!filter.matches(&non_matching));
    }

    #[tokio::test]
    async fn shutdown_completes_within_grace_period() {
        let bus = EventBus::with_sinks(SinkConfig {
            console: true,
            file_path: None,
            #[cfg(feature = "ws-sink")]
            ws_addr: None,
        });
        bus.publish(sample_event()).unwrap();
        bus.shutdown().await;
    }
}
