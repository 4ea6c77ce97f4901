//! Event dispatcher
//!
//! Receives raw payloads from an account's connections, decodes them through
//! the [`EventRegistry`] and fans each event out to every listener.
//!
//! Events are queued and handled one at a time by a single worker task, so
//! listeners observe them in wire order. Listeners for one event run
//! concurrently; a panicking listener does not affect the others.

use bridge_core::{AccountId, Event, EventRegistry};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Listener callback
pub type EventCallback = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-account event dispatcher
pub struct EventDispatcher {
    account: AccountId,
    registry: Arc<EventRegistry>,
    listeners: RwLock<Vec<EventCallback>>,
    queue: mpsc::UnboundedSender<Event>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    /// Count of events handed to listeners
    delivered: AtomicU64,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("account", &self.account)
            .field("listeners", &self.listeners.read().len())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(account: AccountId, registry: Arc<EventRegistry>) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            account,
            registry,
            listeners: RwLock::new(Vec::new()),
            queue,
            receiver: Mutex::new(Some(receiver)),
            running: AtomicBool::new(false),
            shutdown,
            delivered: AtomicU64::new(0),
        }
    }

    pub fn shared(account: AccountId, registry: Arc<EventRegistry>) -> Arc<Self> {
        Arc::new(Self::new(account, registry))
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Register a type-erased listener
    pub fn add_listener(&self, callback: EventCallback) {
        self.listeners.write().push(callback);
    }

    /// Register an async closure as a listener
    pub fn listen<F, Fut>(&self, callback: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add_listener(Arc::new(move |event| callback(event).boxed()));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Decode a raw payload and queue it. Undecodable payloads are dropped.
    pub fn emit_raw(&self, raw: Value) {
        match self.registry.decode(raw) {
            Ok(event) => self.emit(event),
            Err(e) => {
                tracing::warn!(account = %self.account, error = %e, "Dropping undecodable event");
            }
        }
    }

    /// Queue an already-decoded event
    pub fn emit(&self, event: Event) {
        tracing::trace!(account = %self.account, event_type = %event.type_tag, "Event queued");
        if self.queue.send(event).is_err() {
            tracing::debug!(account = %self.account, "Event queue closed, dropping event");
        }
    }

    /// Start the worker task. Returns `None` if it was already started.
    pub fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!(account = %self.account, "Event dispatcher is already running");
            return None;
        }

        let Some(receiver) = self.receiver.lock().take() else {
            tracing::warn!(account = %self.account, "Event dispatcher cannot be restarted");
            return None;
        };

        let dispatcher = self.clone();
        let handle = tokio::spawn(async move {
            dispatcher.run(receiver).await;
        });

        tracing::info!(account = %self.account, "Event dispatcher started");
        Some(handle)
    }

    /// Stop the worker after the event it is currently handling
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        tracing::info!(account = %self.account, "Event dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self, mut receiver: mpsc::UnboundedReceiver<Event>) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.changed() => continue,

                event = receiver.recv() => match event {
                    Some(event) => self.deliver(event).await,
                    None => break,
                },
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::debug!(account = %self.account, "Event dispatcher loop ended");
    }

    async fn deliver(&self, event: Event) {
        let listeners: Vec<EventCallback> = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }

        let tasks = listeners
            .into_iter()
            .map(|listener| tokio::spawn(listener(event.clone())));

        for result in join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(
                    account = %self.account,
                    event_type = %event.type_tag,
                    error = %e,
                    "Event listener failed"
                );
            }
        }

        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}
