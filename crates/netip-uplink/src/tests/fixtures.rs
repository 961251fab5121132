//! Test fixtures: a mock control plane and a mock stream endpoint

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use netip_types::HostInfo;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Backoff, Timeouts, UplinkConfig};
use crate::protocol::{HANDSHAKE_ROUTE, Identity};

pub const TEST_KEY: &str = "k-test";
pub const TEST_SERVICE: &str = "netip-test";

/// How the mock stream endpoint treats a connection after acknowledging it
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Record text frames and answer pings
    Responsive,
    /// Stop reading, so pings are never answered
    Silent,
    /// Push these frames, then behave like `Responsive`
    Push(Vec<String>),
}

#[derive(Default)]
struct Recorded {
    frames: Vec<(usize, String)>,
    hosts: Vec<String>,
}

/// Local websocket server standing in for the stream endpoint
pub struct MockStream {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockStream {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let counter = Arc::clone(&connections);
        let log = Arc::clone(&recorded);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve(tcp, id, behavior.clone(), Arc::clone(&log)));
            }
        });

        Self {
            addr,
            connections,
            recorded,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Accepted TCP connections so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Text frames received on connection `id` (1-based), in arrival order
    pub fn frames(&self, id: usize) -> Vec<String> {
        self.recorded
            .lock()
            .unwrap()
            .frames
            .iter()
            .filter(|(conn, _)| *conn == id)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// `Host` header of every upgrade request
    pub fn hosts(&self) -> Vec<String> {
        self.recorded.lock().unwrap().hosts.clone()
    }
}

async fn serve(tcp: TcpStream, id: usize, behavior: Behavior, log: Arc<Mutex<Recorded>>) {
    let mut host = String::new();
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        host = req
            .headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(resp)
    };
    let Ok(mut ws) = accept_hdr_async(tcp, callback).await else {
        return;
    };
    log.lock().unwrap().hosts.push(host);

    let Some(Ok(Message::Text(first))) = ws.next().await else {
        return;
    };
    log.lock().unwrap().frames.push((id, first.as_str().to_string()));

    if ws.send(Message::Text(r#"{"ok":true}"#.to_string().into())).await.is_err() {
        return;
    }

    match behavior {
        Behavior::Silent => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
        Behavior::Push(frames) => {
            for frame in frames {
                if ws.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
        }
        Behavior::Responsive => {}
    }

    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) => log
                .lock()
                .unwrap()
                .frames
                .push((id, text.as_str().to_string())),
            Message::Ping(payload) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Answer every handshake with a ticket for `endpoint_path`
pub async fn mount_handshake(server: &MockServer, endpoint_path: &str, endpoint_ip: &str) {
    Mock::given(method("POST"))
        .and(path(HANDSHAKE_ROUTE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "message": "",
            "endpointIP": endpoint_ip,
            "endpointPath": endpoint_path,
            "handshakeKey": TEST_KEY,
        })))
        .mount(server)
        .await;
}

pub async fn handshake_requests(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

/// Config pointing at `endpoint` with fast transient retries
pub fn test_config(endpoint: &str) -> UplinkConfig {
    UplinkConfig {
        endpoint: endpoint.to_string(),
        connect_key: "secret".to_string(),
        version: "2.3.0".to_string(),
        version_hash: "abc123".to_string(),
        timeouts: Timeouts::default(),
        backoff: Backoff {
            transient: Duration::from_millis(100),
            quota: Duration::from_secs(60),
        },
        ..Default::default()
    }
}

pub fn test_identity() -> Identity {
    Identity::new(TEST_SERVICE, HostInfo::default())
}

/// Poll `cond` until it holds or `within` elapses
pub async fn wait_for(mut cond: impl FnMut() -> bool, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
