//! Forward HTTP connection
//!
//! Every call is one request/response exchange; no correlation table is
//! involved. A background loop polls `fetchMessage` and feeds the results to
//! the dispatcher. Authentication is `verify` then `bind`.
//!
//! When hooked as another connection's fallback, this connection stops
//! owning authentication: calls wait for the shared session to be connected
//! and the poll loop is not started.

use async_trait::async_trait;
use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{
    validate_response, AccountId, CallKind, CallRequest, ConnectionVariant, ForwardHttpConfig,
    FormPart,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::backoff::BackoffState;
use super::phase::{ConnectionPhase, PhaseCell};
use super::settings::ConnectionSettings;
use super::shutdown::ShutdownSignal;
use super::transport::{Connection, ConnectionContext};
use crate::broadcast::{EventDispatcher, LifecycleBus, LifecycleEvent};
use crate::protocol::{BIND, FETCH_MESSAGE, VERIFY};
use crate::session::SessionState;

pub struct ForwardHttpConnection {
    id: String,
    account: AccountId,
    verify_key: String,
    host: String,
    client: Client,
    session: Arc<SessionState>,
    dispatcher: Arc<EventDispatcher>,
    lifecycle: LifecycleBus,
    settings: ConnectionSettings,
    poll_interval: Duration,
    fetch_count: u32,
    hooked: AtomicBool,
    /// Serializes authentication so concurrent callers share one handshake
    auth_lock: Mutex<()>,
    phase: PhaseCell,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for ForwardHttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardHttpConnection")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("host", &self.host)
            .field("hooked", &self.is_hooked())
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl ForwardHttpConnection {
    pub fn new(
        account: AccountId,
        verify_key: impl Into<String>,
        config: ForwardHttpConfig,
        context: ConnectionContext,
    ) -> Self {
        let poll_interval = config
            .poll_interval_ms
            .map_or(context.settings.poll_interval, Duration::from_millis);
        let fetch_count = config.fetch_count.unwrap_or(context.settings.fetch_count);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account,
            verify_key: verify_key.into(),
            host: config.host.trim_end_matches('/').to_string(),
            client: Client::new(),
            session: context.session,
            dispatcher: context.dispatcher,
            lifecycle: context.lifecycle,
            settings: context.settings,
            poll_interval,
            fetch_count,
            hooked: AtomicBool::new(false),
            auth_lock: Mutex::new(()),
            phase: PhaseCell::default(),
            shutdown: ShutdownSignal::default(),
        }
    }

    pub fn is_hooked(&self) -> bool {
        self.hooked.load(Ordering::SeqCst)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path)
    }

    /// Send a request and classify its JSON body
    async fn send(&self, builder: RequestBuilder) -> BridgeResult<Value> {
        let response = builder.send().await.map_err(BridgeError::transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(BridgeError::transport)?;

        let value: Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) if status.is_success() => {
                return Err(BridgeError::protocol(format!("response is not JSON: {e}")));
            }
            Err(_) => return Err(BridgeError::transport(format!("HTTP {status}"))),
        };

        Ok(validate_response(value)?)
    }

    /// Verify and bind a new session, unless another caller just did
    async fn authenticate(&self) -> BridgeResult<String> {
        let _guard = self.auth_lock.lock().await;
        if let Some(key) = self.session.session_key() {
            return Ok(key);
        }

        if !self.is_hooked() {
            self.phase.set(ConnectionPhase::Authenticating);
        }

        let verified = self
            .send(
                self.client
                    .post(self.url(VERIFY))
                    .json(&json!({ "verifyKey": self.verify_key })),
            )
            .await?;
        let key = verified
            .get("session")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::protocol("verify reply carries no session"))?
            .to_string();

        self.send(
            self.client
                .post(self.url(BIND))
                .json(&json!({ "sessionKey": key, "qq": self.account })),
        )
        .await?;

        self.session.set_session_key(Some(key.clone()));
        self.session.set_alive(true);
        tracing::info!(account = %self.account, connection = %self.id, "HTTP session bound");
        Ok(key)
    }

    async fn session_key(&self) -> BridgeResult<String> {
        if self.is_hooked() {
            self.session.wait_for_connected().await;
        }
        match self.session.session_key() {
            Some(key) => Ok(key),
            None => self.authenticate().await,
        }
    }

    async fn perform(&self, request: &CallRequest) -> BridgeResult<Value> {
        let key = if request.in_session {
            Some(self.session_key().await?)
        } else {
            None
        };
        let url = self.url(&request.http_path());

        let builder = match request.kind {
            CallKind::Get | CallKind::RestGet => {
                let mut query = request.form_fields();
                if let Some(key) = &key {
                    query.push(("sessionKey".to_string(), key.clone()));
                }
                self.client.get(url).query(&query)
            }
            CallKind::Post | CallKind::RestUpdate => {
                let mut body = request.params.clone();
                if let (Some(key), Value::Object(map)) = (&key, &mut body) {
                    map.insert("sessionKey".to_string(), Value::String(key.clone()));
                }
                self.client.post(url).json(&body)
            }
            CallKind::Multipart => self.client.post(url).multipart(multipart_form(request, key.as_deref())?),
        };

        tracing::debug!(
            account = %self.account,
            command = %request.command,
            kind = %request.kind,
            "HTTP call"
        );

        let result = self.send(builder).await;
        if let Err(e) = &result {
            if e.is_session_error() {
                self.session.set_session_key(None);
            }
        }
        result
    }

    /// One fetch cycle; returns how many events were dispatched
    async fn poll_once(&self) -> BridgeResult<usize> {
        let key = match self.session.session_key() {
            Some(key) => key,
            None => self.authenticate().await?,
        };

        let query = [
            ("sessionKey", key),
            ("count", self.fetch_count.to_string()),
        ];
        let data = self
            .send(self.client.get(self.url(FETCH_MESSAGE)).query(&query))
            .await?;
        self.session.set_alive(true);

        let Value::Array(events) = data else {
            return Err(BridgeError::protocol("fetchMessage reply is not an array"));
        };

        let count = events.len();
        for event in events {
            self.dispatcher.emit_raw(event);
        }
        Ok(count)
    }

    async fn poll_loop(&self) {
        let mut backoff = BackoffState::new(self.settings.backoff.clone());

        while !self.shutdown.is_triggered() {
            let cycle = tokio::time::timeout(self.settings.call_timeout, self.poll_once())
                .await
                .unwrap_or(Err(BridgeError::Timeout(self.settings.call_timeout)));

            let delay = match cycle {
                Ok(count) => {
                    if count > 0 {
                        tracing::trace!(account = %self.account, count, "Fetched events");
                    }
                    backoff.record_success();
                    self.phase.set(ConnectionPhase::Available);
                    self.poll_interval
                }
                Err(e) => {
                    self.session.set_session_key(None);
                    self.session.set_alive(false);
                    self.phase.set(ConnectionPhase::Degraded);
                    self.lifecycle.publish(LifecycleEvent::AccountConnectionFail {
                        account: self.account,
                        connection: ConnectionVariant::ForwardHttp,
                        reason: e.to_string(),
                    });

                    let delay = backoff
                        .record_failure()
                        .unwrap_or(self.settings.backoff.max_delay);
                    tracing::warn!(
                        account = %self.account,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Event poll failed"
                    );
                    delay
                }
            };

            tokio::select! {
                () = self.shutdown.wait() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Params as text fields, then explicit parts
fn multipart_form(request: &CallRequest, key: Option<&str>) -> BridgeResult<Form> {
    let mut form = Form::new();
    for (name, value) in request.form_fields() {
        form = form.text(name, value);
    }
    if let Some(key) = key {
        form = form.text("sessionKey", key.to_string());
    }

    for part in &request.parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                bytes,
                filename,
                content_type,
            } => {
                let mut file = Part::bytes(bytes.clone());
                if let Some(filename) = filename {
                    file = file.file_name(filename.clone());
                }
                if let Some(mime) = content_type {
                    file = file.mime_str(mime).map_err(|e| {
                        BridgeError::configuration(format!("invalid content type `{mime}`: {e}"))
                    })?;
                }
                form.part(name.clone(), file)
            }
        };
    }

    Ok(form)
}

#[async_trait]
impl Connection for ForwardHttpConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn variant(&self) -> ConnectionVariant {
        ConnectionVariant::ForwardHttp
    }

    fn account(&self) -> AccountId {
        self.account
    }

    fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    fn phase(&self) -> ConnectionPhase {
        self.phase.get()
    }

    async fn call(&self, request: CallRequest) -> BridgeResult<Value> {
        if self.phase.get().is_terminal() {
            return Err(BridgeError::ConnectionClosed);
        }
        let timeout = request.timeout.unwrap_or(self.settings.call_timeout);
        tokio::select! {
            () = self.shutdown.wait() => Err(BridgeError::ConnectionClosed),
            result = tokio::time::timeout(timeout, self.perform(&request)) => {
                result.map_err(|_| BridgeError::Timeout(timeout))?
            }
        }
    }

    async fn run(self: Arc<Self>) -> BridgeResult<()> {
        if self.is_hooked() {
            tracing::debug!(account = %self.account, "Fallback HTTP connection, no poll loop");
            self.shutdown.wait().await;
        } else {
            self.poll_loop().await;
        }

        self.phase.set(ConnectionPhase::Stopped);
        tracing::info!(account = %self.account, connection = %self.id, "Forward HTTP stopped");
        Ok(())
    }

    fn stop(&self) {
        self.shutdown.trigger();
        self.phase.set(ConnectionPhase::Stopped);
    }

    fn hook_as_fallback(&self) -> BridgeResult<()> {
        if self.hooked.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::configuration(format!(
                "HTTP connection {} is already a fallback",
                self.id
            )));
        }
        Ok(())
    }
}
