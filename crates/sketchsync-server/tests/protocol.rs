//! End-to-end protocol tests against a live server.

use futures_util::{SinkExt, StreamExt};
use kurbo::Point;
use sketchsync_core::identity::Identity;
use sketchsync_core::protocol::{ClientMessage, ErrorCode, ServerMessage};
use sketchsync_core::stroke::{Draft, ProjectId, SerializableColor, StrokeRecord};
use sketchsync_server::{AppState, CHANNEL_CAPACITY, router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(AppState::new(CHANNEL_CAPACITY)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut Client, msg: &ClientMessage) {
    ws.send(Message::text(serde_json::to_string(msg).unwrap()))
        .await
        .unwrap();
}

async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for server")
            .unwrap()
            .unwrap();
        if let Message::Text(txt) = msg {
            return serde_json::from_str(txt.as_str()).unwrap();
        }
    }
}

fn record(author: &str) -> StrokeRecord {
    Draft::freehand(Point::new(5.0, 5.0), SerializableColor::black(), 4.0)
        .into_record(&Identity::new(author, "Ada"))
}

fn append(request_id: u64, project: &str, author: &str) -> ClientMessage {
    ClientMessage::Append {
        request_id,
        project: ProjectId::from(project),
        record: record(author),
    }
}

fn subscribe(subscription: u64, project: &str) -> ClientMessage {
    ClientMessage::Subscribe {
        subscription,
        project: ProjectId::from(project),
    }
}

fn snapshot_len(msg: ServerMessage) -> usize {
    match msg {
        ServerMessage::Snapshot { strokes, .. } => strokes.len(),
        other => panic!("Expected snapshot, got {:?}", other),
    }
}

#[tokio::test]
async fn test_append_then_subscribe() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, &append(1, "alpha", "user-1")).await;
    match recv(&mut ws).await {
        ServerMessage::Appended { request_id, stroke } => {
            assert_eq!(request_id, 1);
            assert_eq!(stroke.order, 1);
            assert_eq!(stroke.author_id(), "user-1");
        }
        other => panic!("Expected appended, got {:?}", other),
    }

    send(&mut ws, &subscribe(7, "alpha")).await;
    match recv(&mut ws).await {
        ServerMessage::Snapshot {
            subscription,
            project,
            strokes,
        } => {
            assert_eq!(subscription, 7);
            assert_eq!(project.as_str(), "alpha");
            assert_eq!(strokes.len(), 1);
        }
        other => panic!("Expected snapshot, got {:?}", other),
    }
}

#[tokio::test]
async fn test_strokes_reach_other_clients() {
    let addr = start_server().await;
    let mut viewer = connect(addr).await;
    let mut author = connect(addr).await;

    send(&mut viewer, &subscribe(1, "alpha")).await;
    assert_eq!(snapshot_len(recv(&mut viewer).await), 0);

    send(&mut author, &append(1, "alpha", "user-2")).await;
    assert!(matches!(recv(&mut author).await, ServerMessage::Appended { .. }));
    send(&mut author, &append(2, "beta", "user-2")).await;
    assert!(matches!(recv(&mut author).await, ServerMessage::Appended { .. }));

    match recv(&mut viewer).await {
        ServerMessage::Snapshot { project, strokes, .. } => {
            assert_eq!(project.as_str(), "alpha");
            assert_eq!(strokes.len(), 1);
            assert_eq!(strokes[0].author_id(), "user-2");
        }
        other => panic!("Expected snapshot, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_append_reports_request() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, &append(5, "alpha", "")).await;
    match recv(&mut ws).await {
        ServerMessage::Error { request_id, code, .. } => {
            assert_eq!(request_id, Some(5));
            assert_eq!(code, ErrorCode::PermissionDenied);
        }
        other => panic!("Expected error, got {:?}", other),
    }

    ws.send(Message::text("{\"type\":\"draw\"}")).await.unwrap();
    match recv(&mut ws).await {
        ServerMessage::Error { request_id, code, .. } => {
            assert_eq!(request_id, None);
            assert_eq!(code, ErrorCode::BadRequest);
        }
        other => panic!("Expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unsubscribe_stops_snapshots() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, &subscribe(3, "alpha")).await;
    assert_eq!(snapshot_len(recv(&mut ws).await), 0);
    send(&mut ws, &ClientMessage::Unsubscribe { subscription: 3 }).await;

    send(&mut ws, &append(1, "alpha", "user-1")).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Appended { .. }));

    let extra = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(extra.is_err(), "unexpected message after unsubscribe: {:?}", extra);
}

#[tokio::test]
async fn test_admin_purge() {
    let addr = start_server().await;
    let mut ws = connect(addr).await;

    send(&mut ws, &append(1, "alpha", "user-1")).await;
    recv(&mut ws).await;
    send(&mut ws, &subscribe(1, "alpha")).await;
    assert_eq!(snapshot_len(recv(&mut ws).await), 1);

    let mut http = TcpStream::connect(addr).await.unwrap();
    http.write_all(b"DELETE /admin/projects/alpha/strokes HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    http.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains("\"removed\":1"), "{}", response);

    assert_eq!(snapshot_len(recv(&mut ws).await), 0);

    send(&mut ws, &append(2, "alpha", "user-1")).await;
    loop {
        match recv(&mut ws).await {
            ServerMessage::Appended { stroke, .. } => {
                assert_eq!(stroke.order, 2);
                break;
            }
            ServerMessage::Snapshot { .. } => continue,
            other => panic!("Unexpected {:?}", other),
        }
    }
}
