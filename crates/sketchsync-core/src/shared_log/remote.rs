//! Shared log reached over a WebSocket connection to the log service.
//!
//! A background thread owns the socket. Appends wait on a oneshot that the
//! thread resolves when the matching reply arrives; snapshots are routed to
//! the subscription they were requested for.

use super::{BoxFuture, LogError, LogResult, SharedLog, Subscription};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::stroke::{ProjectId, Stroke, StrokeRecord, StrokeSnapshot};
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::channel::oneshot;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

type PendingAppend = oneshot::Sender<LogResult<Stroke>>;

/// Where replies go.
#[derive(Default)]
struct Routes {
    pending: HashMap<u64, PendingAppend>,
    subscriptions: HashMap<u64, (ProjectId, UnboundedSender<StrokeSnapshot>)>,
    /// Set once the connection is gone; no new routes are accepted.
    closed: bool,
}

impl Routes {
    fn dispatch(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Snapshot {
                subscription,
                project,
                strokes,
            } => {
                let Some((scope, tx)) = self.subscriptions.get(&subscription) else {
                    log::debug!("Snapshot for unknown subscription {}", subscription);
                    return;
                };
                if scope != &project {
                    log::warn!(
                        "Subscription {} is scoped to {}, got snapshot for {}",
                        subscription,
                        scope,
                        project
                    );
                    return;
                }
                if tx.unbounded_send(StrokeSnapshot::new(project, strokes)).is_err() {
                    self.subscriptions.remove(&subscription);
                }
            }
            ServerMessage::Appended { request_id, stroke } => match self.pending.remove(&request_id) {
                Some(tx) => {
                    let _ = tx.send(Ok(stroke));
                }
                None => log::debug!("Reply for unknown append {}", request_id),
            },
            ServerMessage::Error {
                request_id: Some(request_id),
                code,
                message,
            } => match self.pending.remove(&request_id) {
                Some(tx) => {
                    let _ = tx.send(Err(code.into_log_error(message)));
                }
                None => log::debug!("Error for unknown append {}: {}", request_id, message),
            },
            ServerMessage::Error {
                request_id: None,
                message,
                ..
            } => log::warn!("Log service error: {}", message),
        }
    }

    /// Resolve every pending append with `error` and end all subscriptions.
    fn fail_all(&mut self, error: LogError) {
        self.closed = true;
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(error.clone()));
        }
        self.subscriptions.clear();
    }
}

struct Shared {
    routes: Mutex<Routes>,
    state: Mutex<ConnectionState>,
}

impl Shared {
    fn routes(&self) -> LogResult<MutexGuard<'_, Routes>> {
        self.routes
            .lock()
            .map_err(|e| LogError::Unavailable(format!("Lock error: {}", e)))
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn shutdown(&self, state: ConnectionState, reason: &str) {
        self.set_state(state);
        // A panic elsewhere may have poisoned the lock; the routes are still valid.
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.fail_all(LogError::Unavailable(reason.to_string()));
    }
}

/// Fails every route when the connection thread exits, even by unwinding.
struct ShutdownGuard<'a> {
    shared: &'a Shared,
}

impl Drop for ShutdownGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("WebSocket thread panicked");
            self.shared.shutdown(ConnectionState::Error, "connection thread failed");
        } else {
            self.shared.shutdown(ConnectionState::Disconnected, "connection lost");
        }
    }
}

/// First 100 characters of an outgoing message, for logging.
fn preview(msg: &str) -> &str {
    msg.char_indices().nth(100).map_or(msg, |(i, _)| &msg[..i])
}

/// Shared log client for the log service.
///
/// Requests issued before the connection is established are queued.
pub struct RemoteLog {
    shared: Arc<Shared>,
    cmd_tx: Sender<WsCommand>,
    next_id: AtomicU64,
    _thread: JoinHandle<()>,
}

impl RemoteLog {
    /// Connect to a log service at a `ws://` or `wss://` URL.
    pub fn connect(url: &str) -> LogResult<Self> {
        let parsed_url = Url::parse(url).map_err(|e| LogError::Unavailable(format!("Invalid URL: {}", e)))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(LogError::Unavailable(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        let shared = Arc::new(Shared {
            routes: Mutex::new(Routes::default()),
            state: Mutex::new(ConnectionState::Connecting),
        });
        let (cmd_tx, cmd_rx) = channel::<WsCommand>();

        let url = url.to_string();
        let thread_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || run_connection(&url, &thread_shared, cmd_rx));

        Ok(Self {
            shared,
            cmd_tx,
            next_id: AtomicU64::new(1),
            _thread: handle,
        })
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared
            .state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Error)
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, msg: &ClientMessage) -> LogResult<()> {
        let text = serde_json::to_string(msg).map_err(|e| LogError::Protocol(e.to_string()))?;
        self.cmd_tx
            .send(WsCommand::Send(text))
            .map_err(|_| LogError::Unavailable("connection closed".to_string()))
    }
}

impl SharedLog for RemoteLog {
    fn append(&self, project: &ProjectId, record: StrokeRecord) -> BoxFuture<LogResult<Stroke>> {
        let request_id = self.next_id();
        let (tx, rx) = oneshot::channel();

        let registered = self.shared.routes().and_then(|mut routes| {
            if routes.closed {
                return Err(LogError::Unavailable("connection closed".to_string()));
            }
            routes.pending.insert(request_id, tx);
            Ok(())
        });
        let sent = registered.and_then(|()| {
            self.send(&ClientMessage::Append {
                request_id,
                project: project.clone(),
                record,
            })
        });
        if let Err(e) = sent {
            if let Ok(mut routes) = self.shared.routes() {
                routes.pending.remove(&request_id);
            }
            return Box::pin(async move { Err(e) });
        }

        Box::pin(async move { rx.await.unwrap_or(Err(LogError::Closed)) })
    }

    fn subscribe(&self, project: &ProjectId) -> LogResult<Subscription> {
        let subscription = self.next_id();
        let (tx, rx) = unbounded();
        {
            let mut routes = self.shared.routes()?;
            if routes.closed {
                return Err(LogError::Unavailable("connection closed".to_string()));
            }
            routes.subscriptions.insert(subscription, (project.clone(), tx));
        }
        if let Err(e) = self.send(&ClientMessage::Subscribe {
            subscription,
            project: project.clone(),
        }) {
            if let Ok(mut routes) = self.shared.routes() {
                routes.subscriptions.remove(&subscription);
            }
            return Err(e);
        }

        let shared = Arc::clone(&self.shared);
        let cmd_tx = self.cmd_tx.clone();
        Ok(Subscription::new(project.clone(), rx, move || {
            if let Ok(mut routes) = shared.routes() {
                routes.subscriptions.remove(&subscription);
            }
            if let Ok(text) = serde_json::to_string(&ClientMessage::Unsubscribe { subscription }) {
                let _ = cmd_tx.send(WsCommand::Send(text));
            }
        }))
    }
}

impl Drop for RemoteLog {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

fn run_connection(url: &str, shared: &Shared, cmd_rx: Receiver<WsCommand>) {
    log::info!("WebSocket thread: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            shared.shutdown(ConnectionState::Error, &format!("Connection failed: {}", e));
            return;
        }
    };
    let _guard = ShutdownGuard { shared };
    log::info!("WebSocket connected, status: {}", response.status());
    shared.set_state(ConnectionState::Connected);

    // A short read timeout keeps the loop responsive to commands.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("WebSocket sending: {}", preview(&msg));
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("WebSocket send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("WebSocket command channel disconnected");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(msg) => {
                    if let Ok(mut routes) = shared.routes.lock() {
                        routes.dispatch(msg);
                    }
                }
                Err(e) => log::warn!("Failed to parse server message: {} ({})", txt, e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::protocol::ErrorCode;
    use crate::stroke::{Draft, SerializableColor};
    use futures::executor::block_on;
    use kurbo::Point;
    use std::net::TcpListener;
    use uuid::Uuid;

    fn record() -> StrokeRecord {
        Draft::freehand(Point::new(1.0, 1.0), SerializableColor::black(), 4.0)
            .into_record(&Identity::new("user-1", "Ada"))
    }

    #[test]
    fn test_dispatch_resolves_pending_append() {
        let mut routes = Routes::default();
        let (tx, mut rx) = oneshot::channel();
        routes.pending.insert(7, tx);

        let stroke = Stroke::new(Uuid::new_v4(), 1, record());
        routes.dispatch(ServerMessage::Appended {
            request_id: 7,
            stroke: stroke.clone(),
        });
        assert!(routes.pending.is_empty());
        assert_eq!(rx.try_recv().unwrap(), Some(Ok(stroke)));
    }

    #[test]
    fn test_dispatch_maps_error_reply() {
        let mut routes = Routes::default();
        let (tx, mut rx) = oneshot::channel();
        routes.pending.insert(1, tx);
        routes.dispatch(ServerMessage::Error {
            request_id: Some(1),
            code: ErrorCode::PermissionDenied,
            message: "no author".to_string(),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            Some(Err(LogError::PermissionDenied(_)))
        ));
    }

    #[test]
    fn test_dispatch_routes_snapshot_by_subscription() {
        let mut routes = Routes::default();
        let (tx_a, mut rx_a) = unbounded();
        let (tx_b, mut rx_b) = unbounded();
        routes.subscriptions.insert(1, (ProjectId::from("a"), tx_a));
        routes.subscriptions.insert(2, (ProjectId::from("b"), tx_b));

        routes.dispatch(ServerMessage::Snapshot {
            subscription: 2,
            project: ProjectId::from("b"),
            strokes: vec![Stroke::new(Uuid::new_v4(), 1, record())],
        });
        // Mismatched scope is dropped.
        routes.dispatch(ServerMessage::Snapshot {
            subscription: 1,
            project: ProjectId::from("b"),
            strokes: Vec::new(),
        });

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().len(), 1);
    }

    #[test]
    fn test_fail_all_rejects_everything() {
        let mut routes = Routes::default();
        let (tx, mut rx) = oneshot::channel();
        let (sub_tx, mut sub_rx) = unbounded();
        routes.pending.insert(1, tx);
        routes.subscriptions.insert(2, (ProjectId::from("a"), sub_tx));

        routes.fail_all(LogError::Unavailable("gone".to_string()));
        assert!(routes.closed);
        assert!(matches!(rx.try_recv().unwrap(), Some(Err(LogError::Unavailable(_)))));
        assert!(block_on(futures::StreamExt::next(&mut sub_rx)).is_none());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(RemoteLog::connect("http://localhost:3030").is_err());
        assert!(RemoteLog::connect("not a url").is_err());
    }

    #[test]
    fn test_unreachable_service_fails_appends() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let log = RemoteLog::connect(&format!("ws://127.0.0.1:{}/ws", port)).unwrap();
        let result = block_on(log.append(&ProjectId::from("alpha"), record()));
        assert!(matches!(result, Err(LogError::Unavailable(_))));
    }

    /// A minimal log service on a background thread. Stops on unsubscribe or close.
    fn spawn_log_service(listener: TcpListener) -> JoinHandle<()> {
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            let mut order = 0;
            loop {
                let Ok(Message::Text(txt)) = socket.read() else {
                    break;
                };
                let reply = match serde_json::from_str::<ClientMessage>(&txt).unwrap() {
                    ClientMessage::Append {
                        request_id, record, ..
                    } => {
                        order += 1;
                        ServerMessage::Appended {
                            request_id,
                            stroke: Stroke::new(Uuid::new_v4(), order, record),
                        }
                    }
                    ClientMessage::Subscribe { subscription, project } => ServerMessage::Snapshot {
                        subscription,
                        project,
                        strokes: Vec::new(),
                    },
                    ClientMessage::Unsubscribe { .. } => break,
                };
                socket
                    .send(Message::Text(serde_json::to_string(&reply).unwrap()))
                    .unwrap();
            }
        })
    }

    #[test]
    fn test_round_trip_against_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = spawn_log_service(listener);

        let log = RemoteLog::connect(&format!("ws://127.0.0.1:{}/ws", port)).unwrap();
        let project = ProjectId::from("alpha");
        let first = block_on(log.append(&project, record())).unwrap();
        let second = block_on(log.append(&project, record())).unwrap();
        assert_eq!(first.order, 1);
        assert_eq!(second.order, 2);
        assert!(log.is_connected());

        let mut sub = log.subscribe(&project).unwrap();
        let snapshot = block_on(futures::StreamExt::next(&mut sub)).unwrap();
        assert!(snapshot.is_empty());
        sub.cancel();

        server.join().unwrap();
    }

    #[test]
    fn test_preview_keeps_char_boundaries() {
        let accented = "é".repeat(60);
        assert_eq!(preview(&accented), accented);

        let long = format!("{}{}", "a".repeat(99), "é".repeat(10));
        assert_eq!(preview(&long), format!("{}é", "a".repeat(99)));
        assert_eq!(preview(&"x".repeat(250)).len(), 100);
    }

    #[test]
    fn test_non_ascii_project_with_debug_logging() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
        log::set_max_level(log::LevelFilter::Debug);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = spawn_log_service(listener);

        let log = RemoteLog::connect(&format!("ws://127.0.0.1:{}/ws", port)).unwrap();
        let project = ProjectId::new("é".repeat(60));
        let stroke = block_on(log.append(&project, record())).unwrap();
        assert_eq!(stroke.order, 1);
        assert!(log.is_connected());

        drop(log);
        server.join().unwrap();
    }

    #[test]
    fn test_thread_panic_still_fails_pending_appends() {
        let shared = Shared {
            routes: Mutex::new(Routes::default()),
            state: Mutex::new(ConnectionState::Connected),
        };
        let (tx, mut rx) = oneshot::channel();
        shared.routes().unwrap().pending.insert(1, tx);

        let outcome = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = ShutdownGuard { shared: &shared };
                    let _routes = shared.routes.lock().unwrap();
                    panic!("connection thread failure");
                })
                .join()
        });
        assert!(outcome.is_err());

        assert_eq!(*shared.state.lock().unwrap(), ConnectionState::Error);
        assert!(matches!(rx.try_recv().unwrap(), Some(Err(LogError::Unavailable(_)))));
        assert!(shared.routes.lock().unwrap_or_else(PoisonError::into_inner).closed);
    }
}
