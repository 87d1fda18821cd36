//! Event sinks — console, NDJSON file, and (optional) WebSocket fan-out.

use super::types::KayaEvent;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared counter for events dropped because a sink's subscriber channel
/// lagged behind the broadcast sender.
#[derive(Debug, Default)]
pub struct DropCounter(AtomicU64);

impl DropCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn record(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Prints a one-line summary of every event to stdout via `tracing`.
pub fn spawn_console_sink(
    mut rx: broadcast::Receiver<KayaEvent>,
    cancel: CancellationToken,
    drops: Arc<DropCounter>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        info!(event_type = event.event_type(), task_id = ?event.task_id(), "event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        drops.record(n);
                        warn!(dropped = n, "console sink lagged, dropping oldest events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

/// Appends every event as one NDJSON line to `path`, flushing after each
/// write so a crash never loses more than the in-flight line.
pub fn spawn_file_sink(
    mut rx: broadcast::Receiver<KayaEvent>,
    path: PathBuf,
    cancel: CancellationToken,
    drops: Arc<DropCounter>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open event log file");
                return;
            }
        };
        let mut writer = tokio::io::BufWriter::new(file);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        let envelope = event.to_envelope();
                        if let Ok(mut line) = serde_json::to_vec(&envelope) {
                            line.push(b'\n');
                            if writer.write_all(&line).await.is_ok() {
                                let _ = writer.flush().await;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        drops.record(n);
                        warn!(dropped = n, "file sink lagged, dropping oldest events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        let _ = writer.flush().await;
    })
}

/// Broadcasts the JSON envelope of every event to any connected WebSocket
/// clients. Only compiled when the `ws-sink` feature is enabled.
#[cfg(feature = "ws-sink")]
pub mod ws {
    use super::*;
    use axum::{
        extract::ws::{Message, WebSocket, WebSocketUpgrade},
        extract::State,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::net::SocketAddr;

    #[derive(Clone)]
    struct WsState {
        tx: broadcast::Sender<KayaEvent>,
    }

    async fn ws_handler(
        ws: WebSocketUpgrade,
        State(state): State<WsState>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| handle_socket(socket, state.tx.subscribe()))
    }

    async fn handle_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<KayaEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let envelope = event.to_envelope();
                    if let Ok(text) = serde_json::to_string(&envelope) {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Serves `GET /events` as a WebSocket upgrade, fanning out every
    /// published event. Runs until `cancel` fires.
    pub fn spawn_ws_sink(
        tx: broadcast::Sender<KayaEvent>,
        addr: SocketAddr,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let state = WsState { tx };
        let app = Router::new()
            .route("/events", get(ws_handler))
            .with_state(state);

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    warn!(%addr, error = %e, "failed to bind websocket event sink");
                    return;
                }
            };
            info!(%addr, "websocket event sink listening");
            let serve = axum::serve(listener, app.into_make_service());
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = serve => {
                    if let Err(e) = result {
                        warn!(error = %e, "websocket event sink exited");
                    }
                }
            }
        })
    }
}
