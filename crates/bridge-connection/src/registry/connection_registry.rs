//! Connection registry
//!
//! Materializes connections from descriptors, wires fallbacks, fronts
//! `call` and event listeners per account, and drives launch and shutdown.

use axum::Router;
use bridge_common::{AppConfig, BridgeError, BridgeResult, BridgeSettings, ServerConfig};
use bridge_core::{
    AccountId, CallKind, CallRequest, ConnectionDescriptor, ConnectionVariant, EventRegistry,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::broadcast::{EventCallback, EventDispatcher, LifecycleBus, LifecycleEvent};
use crate::connection::{
    materialize, ComposedConnection, Connection, ConnectionContext, ConnectionPhase,
    ConnectionSettings,
};
use crate::server::{create_app, ReverseServer};
use crate::session::SessionState;

struct AccountEntry {
    connection: Arc<ComposedConnection>,
    dispatcher: Arc<EventDispatcher>,
}

/// Owner of every configured connection, keyed by account
pub struct ConnectionRegistry {
    settings: ConnectionSettings,
    server_config: ServerConfig,
    shutdown_timeout: Duration,
    event_registry: Arc<EventRegistry>,
    accounts: DashMap<AccountId, AccountEntry>,
    /// Reverse route path -> owning account
    routes: DashMap<String, AccountId>,
    lifecycle: LifecycleBus,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    server: Mutex<Option<ReverseServer>>,
    local_addr: Mutex<Option<SocketAddr>>,
    launched: AtomicBool,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("accounts", &self.accounts.len())
            .field("routes", &self.routes.len())
            .field("launched", &self.launched.load(Ordering::SeqCst))
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new(settings: &BridgeSettings, server_config: ServerConfig) -> Self {
        Self {
            settings: ConnectionSettings::from(settings),
            server_config,
            shutdown_timeout: settings.shutdown_timeout(),
            event_registry: Arc::new(
                EventRegistry::with_builtin_tags().accept_unknown(settings.accept_unknown_events),
            ),
            accounts: DashMap::new(),
            routes: DashMap::new(),
            lifecycle: LifecycleBus::new(),
            tasks: Mutex::new(Vec::new()),
            server: Mutex::new(None),
            local_addr: Mutex::new(None),
            launched: AtomicBool::new(false),
        }
    }

    /// Build a registry and register every configured account
    pub fn from_config(config: &AppConfig) -> BridgeResult<Self> {
        let registry = Self::new(&config.bridge, config.server.clone());
        registry.register_config(config)?;
        Ok(registry)
    }

    /// Replace the event decoders used by accounts registered afterwards
    pub fn with_event_registry(mut self, registry: EventRegistry) -> Self {
        self.event_registry = Arc::new(registry);
        self
    }

    /// Override connection tuning for accounts registered afterwards
    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn register_config(&self, config: &AppConfig) -> BridgeResult<()> {
        for account in &config.accounts {
            self.register(account.account, account.descriptors())?;
        }
        Ok(())
    }

    /// Materialize one account's connections.
    ///
    /// Descriptors are ordered so forward HTTP comes last; the first
    /// descriptor becomes the primary and a later forward HTTP descriptor
    /// becomes its fallback. Any other combination is rejected.
    pub fn register(
        &self,
        account: AccountId,
        mut descriptors: Vec<ConnectionDescriptor>,
    ) -> BridgeResult<()> {
        if self.launched.load(Ordering::SeqCst) {
            return Err(BridgeError::configuration(
                "cannot register accounts after launch",
            ));
        }
        if descriptors.is_empty() {
            return Err(BridgeError::configuration(format!(
                "account {account} has no connection descriptors"
            )));
        }
        if let Some(stray) = descriptors.iter().find(|d| d.account != account) {
            return Err(BridgeError::configuration(format!(
                "descriptor for account {} registered under account {account}",
                stray.account
            )));
        }
        self.check_descriptors(&descriptors)?;

        descriptors.sort_by_key(|d| d.variant() == ConnectionVariant::ForwardHttp);

        let dispatcher = EventDispatcher::shared(account, self.event_registry.clone());
        let context = ConnectionContext {
            session: SessionState::shared(),
            dispatcher: dispatcher.clone(),
            lifecycle: self.lifecycle.clone(),
            settings: self.settings.clone(),
        };

        let paths: Vec<String> = descriptors
            .iter()
            .filter_map(|d| d.transport.reverse_path().map(str::to_string))
            .collect();

        let mut descriptors = descriptors.into_iter();
        let Some(first) = descriptors.next() else {
            return Err(BridgeError::configuration("no descriptors"));
        };
        let composed = ComposedConnection::new(materialize(first, context.clone()));

        for descriptor in descriptors {
            let variant = descriptor.variant();
            if variant != ConnectionVariant::ForwardHttp
                || composed.variant() == ConnectionVariant::ForwardHttp
            {
                return Err(BridgeError::configuration(format!(
                    "account {account}: {variant} connection conflicts with {} connection",
                    composed.variant()
                )));
            }
            composed.attach(materialize(descriptor, context.clone()))?;
        }

        let Entry::Vacant(slot) = self.accounts.entry(account) else {
            return Err(BridgeError::configuration(format!(
                "account {account} is already registered"
            )));
        };
        self.claim_routes(account, &paths)?;

        tracing::info!(
            account = %account,
            primary = %composed.variant(),
            fallback = ?composed.fallback().map(|f| f.variant()),
            "Account registered"
        );
        slot.insert(AccountEntry {
            connection: Arc::new(composed),
            dispatcher,
        });
        Ok(())
    }

    /// Take every path or none of them
    fn claim_routes(&self, account: AccountId, paths: &[String]) -> BridgeResult<()> {
        for (claimed, path) in paths.iter().enumerate() {
            match self.routes.entry(path.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(account);
                }
                Entry::Occupied(_) => {
                    for taken in &paths[..claimed] {
                        self.routes.remove(taken);
                    }
                    return Err(BridgeError::configuration(format!(
                        "reverse path `{path}` is already served"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Forward hosts must be set and reverse paths must be routable and unique
    fn check_descriptors(&self, descriptors: &[ConnectionDescriptor]) -> BridgeResult<()> {
        let mut seen = HashSet::new();
        for descriptor in descriptors {
            if descriptor.transport.host().is_some_and(|h| h.trim().is_empty()) {
                return Err(BridgeError::configuration(format!(
                    "{} connection for account {} has an empty host",
                    descriptor.variant(),
                    descriptor.account
                )));
            }

            let Some(path) = descriptor.transport.reverse_path() else {
                continue;
            };
            if !path.starts_with('/') || path == "/health" {
                return Err(BridgeError::configuration(format!(
                    "invalid reverse path `{path}`"
                )));
            }
            if !seen.insert(path) || self.routes.contains_key(path) {
                return Err(BridgeError::configuration(format!(
                    "reverse path `{path}` is already served"
                )));
            }
        }
        Ok(())
    }

    fn entry(&self, account: AccountId) -> BridgeResult<(Arc<ComposedConnection>, Arc<EventDispatcher>)> {
        self.accounts
            .get(&account)
            .map(|e| (e.connection.clone(), e.dispatcher.clone()))
            .ok_or(BridgeError::UnknownAccount(account))
    }

    /// Invoke a remote command through the account's connection
    pub async fn call(&self, account: AccountId, request: CallRequest) -> BridgeResult<Value> {
        let (connection, _) = self.entry(account)?;
        connection.call(request).await
    }

    /// Shorthand for [`ConnectionRegistry::call`] with plain params
    pub async fn call_method(
        &self,
        account: AccountId,
        command: &str,
        kind: CallKind,
        params: Value,
    ) -> BridgeResult<Value> {
        self.call(account, CallRequest::new(command, kind).with_params(params))
            .await
    }

    pub fn add_event_listener(&self, account: AccountId, callback: EventCallback) -> BridgeResult<()> {
        let (_, dispatcher) = self.entry(account)?;
        dispatcher.add_listener(callback);
        Ok(())
    }

    pub fn listen<F, Fut>(&self, account: AccountId, callback: F) -> BridgeResult<()>
    where
        F: Fn(bridge_core::Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (_, dispatcher) = self.entry(account)?;
        dispatcher.listen(callback);
        Ok(())
    }

    pub fn connection(&self, account: AccountId) -> Option<Arc<ComposedConnection>> {
        self.accounts.get(&account).map(|e| e.connection.clone())
    }

    pub fn session(&self, account: AccountId) -> Option<Arc<SessionState>> {
        self.accounts
            .get(&account)
            .map(|e| e.connection.session().clone())
    }

    pub fn phase(&self, account: AccountId) -> Option<ConnectionPhase> {
        self.accounts.get(&account).map(|e| e.connection.phase())
    }

    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.accounts.iter().map(|e| *e.key()).collect();
        accounts.sort();
        accounts
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Every reverse route, unwrapped; `None` when nothing is reverse
    fn reverse_routes(&self) -> Option<Router> {
        self.accounts
            .iter()
            .filter_map(|e| e.connection.clone().routes())
            .reduce(|routes, other| routes.merge(other))
    }

    /// Full reverse endpoint app, for embedding in another server
    pub fn router(&self) -> Router {
        create_app(self.reverse_routes().unwrap_or_default())
    }

    /// Address the reverse endpoint server is bound to, once launched
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Start every dispatcher and connection loop, and the reverse server
    /// when any reverse connection is registered
    pub async fn launch_all(&self) -> BridgeResult<()> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::configuration("registry already launched"));
        }

        if let Some(routes) = self.reverse_routes() {
            let address = self.server_config.address();
            let server = match ReverseServer::bind(&address, routes).await {
                Ok(server) => server,
                Err(e) => {
                    self.launched.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            };
            *self.local_addr.lock() = Some(server.local_addr());
            *self.server.lock() = Some(server);
        }

        let entries: Vec<(AccountId, Arc<ComposedConnection>, Arc<EventDispatcher>)> = self
            .accounts
            .iter()
            .map(|e| (*e.key(), e.connection.clone(), e.dispatcher.clone()))
            .collect();

        let mut tasks = Vec::with_capacity(entries.len() * 2);
        for (account, connection, dispatcher) in entries {
            if let Some(handle) = dispatcher.start() {
                tasks.push(handle);
            }

            tasks.push(tokio::spawn(async move {
                if let Err(e) = connection.run().await {
                    tracing::error!(account = %account, error = %e, "Connection loop ended with error");
                }
            }));

            self.lifecycle.publish(LifecycleEvent::AccountLaunch(account));
            tracing::info!(account = %account, "Account launched");
        }
        self.tasks.lock().extend(tasks);

        Ok(())
    }

    /// Stop every connection and wait, bounded by the shutdown timeout,
    /// for background tasks to finish. Stragglers are aborted.
    pub async fn stop_all(&self) {
        let accounts = self.accounts();
        for entry in &self.accounts {
            entry.connection.stop();
            entry.dispatcher.stop();
        }

        let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let server = self.server.lock().take();
        if let Some(server) = server {
            handles.push(server.shutdown());
        }

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(self.shutdown_timeout, join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "Shutdown timed out, aborting remaining tasks"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        for account in accounts {
            self.lifecycle.publish(LifecycleEvent::AccountShutdown(account));
        }
        tracing::info!("All connections stopped");
    }
}
