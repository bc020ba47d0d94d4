//! SketchSync shared log service.
//!
//! Keeps an append-only, ordered stroke log per project and pushes full
//! snapshots to subscribers over WebSocket.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "subscribe", "subscription": 1, "project": "alpha" }
//! { "type": "unsubscribe", "subscription": 1 }
//! { "type": "append", "request_id": 2, "project": "alpha", "record": { "type": "freehand", ... } }
//! ```
//! Replies are `snapshot`, `appended` and `error` messages.

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::{delete, get},
};
use dashmap::DashMap;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use sketchsync_core::protocol::{ClientMessage, ErrorCode, ServerMessage};
use sketchsync_core::shared_log::{LogError, validate_record};
use sketchsync_core::stroke::{ProjectId, Stroke, StrokeRecord, StrokeSnapshot};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:3030";
/// Default per-project broadcast capacity.
pub const CHANNEL_CAPACITY: usize = 256;
/// Snapshots queued per connection before subscriptions start coalescing.
pub const OUTBOX_CAPACITY: usize = 16;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// Read `SKETCHSYNC_ADDR`, falling back to the default address.
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        let addr = std::env::var("SKETCHSYNC_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        Ok(Self {
            addr: addr.parse()?,
            channel_capacity: CHANNEL_CAPACITY,
        })
    }
}

/// One project's log
struct ProjectLog {
    strokes: Vec<Stroke>,
    /// Last order handed out; never reset.
    last_order: u64,
    /// Full snapshots after every change
    tx: broadcast::Sender<StrokeSnapshot>,
}

impl ProjectLog {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            strokes: Vec::new(),
            last_order: 0,
            tx,
        }
    }

    fn snapshot(&self, project: &ProjectId) -> StrokeSnapshot {
        StrokeSnapshot::new(project.clone(), self.strokes.clone())
    }

    fn publish(&self, project: &ProjectId) {
        // No receivers is fine.
        let _ = self.tx.send(self.snapshot(project));
    }
}

/// Shared application state
pub struct AppState {
    projects: DashMap<ProjectId, ProjectLog>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            projects: DashMap::new(),
            channel_capacity,
        }
    }

    /// Validate and append a record, returning the committed stroke.
    pub fn append(&self, project: &ProjectId, record: StrokeRecord) -> Result<Stroke, LogError> {
        validate_record(&record)?;
        let mut log = self
            .projects
            .entry(project.clone())
            .or_insert_with(|| ProjectLog::new(self.channel_capacity));
        log.last_order += 1;
        let stroke = Stroke::new(Uuid::new_v4(), log.last_order, record);
        log.strokes.push(stroke.clone());
        log.publish(project);
        Ok(stroke)
    }

    /// Current snapshot plus a receiver for every later one.
    pub fn subscribe(&self, project: &ProjectId) -> (StrokeSnapshot, broadcast::Receiver<StrokeSnapshot>) {
        let log = self
            .projects
            .entry(project.clone())
            .or_insert_with(|| ProjectLog::new(self.channel_capacity));
        (log.snapshot(project), log.tx.subscribe())
    }

    /// Current snapshot of a project.
    pub fn snapshot(&self, project: &ProjectId) -> StrokeSnapshot {
        self.projects
            .get(project)
            .map(|log| log.snapshot(project))
            .unwrap_or_else(|| StrokeSnapshot::empty(project.clone()))
    }

    /// Delete every stroke of a project and broadcast the empty snapshot.
    /// Returns the number of strokes removed.
    pub fn purge(&self, project: &ProjectId) -> usize {
        let Some(mut log) = self.projects.get_mut(project) else {
            return 0;
        };
        let removed = log.strokes.len();
        log.strokes.clear();
        log.publish(project);
        removed
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/admin/projects/{project}/strokes", delete(purge_project))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "SketchSync Log Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct PurgeResponse {
    project: ProjectId,
    removed: usize,
}

/// Administrative purge. Destructive: the strokes are gone for every client.
async fn purge_project(Path(project): Path<String>, State(state): State<Arc<AppState>>) -> Json<PurgeResponse> {
    let project = ProjectId::from(project);
    let removed = state.purge(&project);
    warn!("Purged {} strokes from project {}", removed, project);
    Json(PurgeResponse { project, removed })
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode reply: {}", e);
            None
        }
    }
}

fn snapshot_message(subscription: u64, project: &ProjectId, snapshot: &StrokeSnapshot) -> ServerMessage {
    ServerMessage::Snapshot {
        subscription,
        project: project.clone(),
        strokes: snapshot.strokes().to_vec(),
    }
}

/// Forward a project's snapshots to one subscription until aborted.
///
/// The broadcast is drained eagerly. While the connection's outbox is full
/// only the newest snapshot is held back; older ones are replaced.
fn spawn_subscription(
    state: &AppState,
    subscription: u64,
    project: ProjectId,
    out: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    let (current, mut rx) = state.subscribe(&project);
    tokio::spawn(async move {
        let mut pending = Some(current);
        loop {
            tokio::select! {
                biased;

                received = rx.recv() => match received {
                    Ok(snapshot) => {
                        if pending.replace(snapshot).is_some() {
                            debug!("Subscription {} coalesced a snapshot", subscription);
                        }
                    }
                    // Snapshots are complete, so skipping stale ones loses nothing.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Subscription {} skipped {} snapshots", subscription, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                permit = out.reserve(), if pending.is_some() => {
                    let Ok(permit) = permit else {
                        break;
                    };
                    if let Some(snapshot) = pending.take() {
                        permit.send(snapshot_message(subscription, &project, &snapshot));
                    }
                }
            }
        }
    })
}

/// Encode and send one message. Encoding failures are logged and skipped.
async fn send_message(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> Result<(), axum::Error> {
    match encode(msg) {
        Some(frame) => sender.send(frame).await,
        None => Ok(()),
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);
    let mut subscriptions: HashMap<u64, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Subscribe { subscription, project }) => {
                            info!("Peer {} subscribed to {} ({})", peer_id, project, subscription);
                            let task = spawn_subscription(&state, subscription, project, out_tx.clone());
                            if let Some(previous) = subscriptions.insert(subscription, task) {
                                previous.abort();
                            }
                            None
                        }
                        Ok(ClientMessage::Unsubscribe { subscription }) => {
                            if let Some(task) = subscriptions.remove(&subscription) {
                                task.abort();
                                debug!("Peer {} unsubscribed {}", peer_id, subscription);
                            }
                            None
                        }
                        Ok(ClientMessage::Append { request_id, project, record }) => Some(match state.append(&project, record) {
                            Ok(stroke) => {
                                debug!("Appended {} at order {} to {}", stroke.id, stroke.order, project);
                                ServerMessage::Appended { request_id, stroke }
                            }
                            Err(e) => {
                                warn!("Rejected append from {}: {}", peer_id, e);
                                ServerMessage::error(Some(request_id), &e)
                            }
                        }),
                        Err(e) => {
                            warn!("Invalid message from {}: {}", peer_id, e);
                            Some(ServerMessage::Error {
                                request_id: None,
                                code: ErrorCode::BadRequest,
                                message: format!("Invalid message: {}", e),
                            })
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => None, // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                };
                // Replies go straight to the socket; only snapshots use the outbox.
                if let Some(reply) = reply {
                    if send_message(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
            }

            // Snapshots queued for this client
            Some(msg) = out_rx.recv() => {
                if send_message(&mut sender, &msg).await.is_err() {
                    break;
                }
            }
        }
    }

    // Cleanup on disconnect
    for (_, task) in subscriptions.drain() {
        task.abort();
    }
    info!("Connection closed: {}", peer_id);
}
