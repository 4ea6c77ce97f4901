//! Mock gateway
//!
//! Serves the gateway side of both forward transports on one port: the
//! `/all` WebSocket channel and the HTTP command routes. Tests script it
//! through [`MockGateway`] to hold replies, push events or drop sockets.

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Commands answered even without a session key
const SESSIONLESS_COMMANDS: &[&str] = &["about"];

#[derive(Debug, Clone)]
enum Control {
    /// Flush held replies, newest first
    Release,
    /// Push an unsolicited event frame
    Push(Value),
    /// Close every open socket
    Close,
}

/// A command the gateway received, with the session key stripped
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub transport: &'static str,
    pub command: String,
    pub content: Value,
}

struct GatewayState {
    account: u64,
    verify_key: String,
    issued: AtomicUsize,
    verifies: AtomicUsize,
    sockets: AtomicUsize,
    sessions: Mutex<HashSet<String>>,
    queue: Mutex<Vec<Value>>,
    held_commands: Mutex<HashSet<String>>,
    held: Mutex<Vec<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    control: broadcast::Sender<Control>,
}

impl GatewayState {
    fn issue_session(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let key = format!("session-{n}");
        self.sessions.lock().insert(key.clone());
        key
    }

    fn session_valid(&self, key: Option<&str>) -> bool {
        key.is_some_and(|key| self.sessions.lock().contains(key))
    }

    /// Reply body for one command, in the gateway's `{code, msg, data}` shape
    fn answer(&self, transport: &'static str, command: &str, content: &Value) -> Value {
        let key = content.get("sessionKey").and_then(Value::as_str);
        let sessionless = SESSIONLESS_COMMANDS.contains(&command) && key.is_none();
        if !sessionless && !self.session_valid(key) {
            return json!({ "code": 3, "msg": "invalid session" });
        }

        let mut echo = content.clone();
        if let Value::Object(map) = &mut echo {
            map.remove("sessionKey");
        }
        self.calls.lock().push(RecordedCall {
            transport,
            command: command.to_string(),
            content: echo.clone(),
        });

        json!({
            "code": 0,
            "msg": "",
            "data": { "command": command, "echo": echo },
        })
    }
}

/// Handle to a running mock gateway
pub struct MockGateway {
    pub addr: SocketAddr,
    state: Arc<GatewayState>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start(account: u64, verify_key: &str) -> Result<Self> {
        let (control, _) = broadcast::channel(64);
        let state = Arc::new(GatewayState {
            account,
            verify_key: verify_key.to_string(),
            issued: AtomicUsize::new(0),
            verifies: AtomicUsize::new(0),
            sockets: AtomicUsize::new(0),
            sessions: Mutex::new(HashSet::new()),
            queue: Mutex::new(Vec::new()),
            held_commands: Mutex::new(HashSet::new()),
            held: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            control,
        });

        let app = Router::new()
            .route("/all", get(ws_handler))
            .route("/verify", post(verify_handler))
            .route("/bind", post(bind_handler))
            .route("/fetchMessage", get(fetch_handler))
            .route("/file/upload", post(upload_handler))
            .route("/:command", get(query_command).post(json_command))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    pub fn ws_host(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn http_host(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop answering `command` on sockets until [`MockGateway::release`]
    pub fn hold(&self, command: &str) {
        self.state.held_commands.lock().insert(command.to_string());
    }

    pub fn held_count(&self) -> usize {
        self.state.held.lock().len()
    }

    /// Send every held reply in reverse arrival order
    pub fn release(&self) {
        self.state.held_commands.lock().clear();
        let _ = self.state.control.send(Control::Release);
    }

    pub fn push_event(&self, event: Value) {
        let _ = self.state.control.send(Control::Push(event));
    }

    pub fn drop_sockets(&self) {
        let _ = self.state.control.send(Control::Close);
    }

    /// Queue an event for the next `fetchMessage`
    pub fn queue_event(&self, event: Value) {
        self.state.queue.lock().push(event);
    }

    /// Forget every issued session key
    pub fn expire_sessions(&self) {
        self.state.sessions.lock().clear();
    }

    pub fn verify_count(&self) -> usize {
        self.state.verifies.load(Ordering::SeqCst)
    }

    /// Sockets that completed the handshake so far
    pub fn socket_count(&self) -> usize {
        self.state.sockets.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }
}

async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let account = state.account.to_string();
    let authorized = params.get("verifyKey") == Some(&state.verify_key)
        && params.get("qq") == Some(&account);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: Arc<GatewayState>, socket: WebSocket) {
    let mut control = state.control.subscribe();
    let (mut sink, mut stream) = socket.split();

    let session = state.issue_session();
    let handshake = json!({ "syncId": "", "data": { "code": 0, "session": session } });
    if sink.send(Message::Text(handshake.to_string())).await.is_err() {
        return;
    }
    state.sockets.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };

                let command = frame["command"].as_str().unwrap_or_default().to_string();
                let data = state.answer("ws", &command, &frame["content"]);
                let reply = json!({ "syncId": frame["syncId"], "data": data }).to_string();

                if state.held_commands.lock().contains(&command) {
                    state.held.lock().push(reply);
                    continue;
                }
                if sink.send(Message::Text(reply)).await.is_err() {
                    break;
                }
            }

            signal = control.recv() => match signal {
                Ok(Control::Release) => {
                    let held = std::mem::take(&mut *state.held.lock());
                    for reply in held.into_iter().rev() {
                        let _ = sink.send(Message::Text(reply)).await;
                    }
                }
                Ok(Control::Push(event)) => {
                    let frame = json!({ "syncId": "-1", "data": event });
                    let _ = sink.send(Message::Text(frame.to_string())).await;
                }
                Ok(Control::Close) | Err(_) => {
                    state.held.lock().clear();
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}

async fn verify_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.verifies.fetch_add(1, Ordering::SeqCst);
    if body["verifyKey"].as_str() != Some(state.verify_key.as_str()) {
        return Json(json!({ "code": 1, "msg": "invalid verify key" }));
    }
    Json(json!({ "code": 0, "session": state.issue_session() }))
}

async fn bind_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if !state.session_valid(body["sessionKey"].as_str()) {
        return Json(json!({ "code": 3, "msg": "invalid session" }));
    }
    if body["qq"].as_u64() != Some(state.account) {
        return Json(json!({ "code": 2, "msg": "account not found" }));
    }
    Json(json!({ "code": 0, "msg": "success" }))
}

async fn fetch_handler(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if !state.session_valid(params.get("sessionKey").map(String::as_str)) {
        return Json(json!({ "code": 3, "msg": "invalid session" }));
    }
    let count = params
        .get("count")
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(10);

    let mut queue = state.queue.lock();
    let take = count.min(queue.len());
    let events: Vec<Value> = queue.drain(..take).collect();
    Json(json!({ "code": 0, "msg": "", "data": events }))
}

async fn query_command(
    State(state): State<Arc<GatewayState>>,
    Path(command): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let content: Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Json(state.answer("http", &command, &Value::Object(content)))
}

async fn json_command(
    State(state): State<Arc<GatewayState>>,
    Path(command): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    Json(state.answer("http", &command, &body))
}

async fn upload_handler(
    State(state): State<Arc<GatewayState>>,
    mut multipart: Multipart,
) -> Json<Value> {
    let mut fields = Map::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let Ok(bytes) = field.bytes().await else {
            break;
        };
        let value = match file_name {
            Some(file_name) => json!({ "fileName": file_name, "size": bytes.len() }),
            None => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        };
        fields.insert(name, value);
    }
    Json(state.answer("http", "file_upload", &Value::Object(fields)))
}
