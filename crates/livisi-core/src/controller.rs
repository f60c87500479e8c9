// ── Controller facade ──
//
// Lifecycle of one SHC session: login, initial reconcile, the event stream
// task (or a plain refresh loop), commands, and shutdown. Consumers talk
// to this and never to the pieces behind it.

use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use livisi_api::{SessionConfig, ShcClient, TlsMode, TransportConfig};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, TopologyLoader};
use crate::command::{Ack, Command, CommandDispatcher};
use crate::config::{ControllerConfig, TlsVerification};
use crate::error::CoreError;
use crate::events::{EventStreamClient, ShcLink, StreamConfig, StreamState};
use crate::model::{Capability, CapabilityId, CapabilityState, Device, PropertyValue};
use crate::store::{StateStore, StoreChange, Subscription};

/// Handle to one controller session.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Reads go straight to the
/// [`StateStore`]; writes go through the [`CommandDispatcher`].
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    store: Arc<StateStore>,
    stream_state: Arc<watch::Sender<StreamState>>,
    cancel: CancellationToken,
    /// Cancelled on disconnect, replaced on the next connect.
    cancel_child: Mutex<CancellationToken>,
    client: Mutex<Option<Arc<ShcClient>>>,
    dispatcher: Mutex<Option<Arc<CommandDispatcher>>>,
    /// Wakes the stream task for an immediate reload, when it runs.
    refresh_now: Mutex<Option<Arc<Notify>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller. Does NOT connect; call [`connect()`](Self::connect).
    pub fn new(config: ControllerConfig) -> Self {
        let (stream_state, _) = watch::channel(StreamState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                store: Arc::new(StateStore::new()),
                stream_state: Arc::new(stream_state),
                cancel,
                cancel_child: Mutex::new(cancel_child),
                client: Mutex::new(None),
                dispatcher: Mutex::new(None),
                refresh_now: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Log in, load topology and values, and start background work.
    ///
    /// Fails on a wrong password or an unreachable controller; nothing is
    /// started in that case. Calling it again while connected first shuts
    /// the running session down, so only one task ever writes the store.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.inner.client.lock().await.is_some() {
            debug!("already connected, replacing the session");
            self.disconnect().await;
        }

        let config = &self.inner.config;
        let transport = build_transport(config);
        let session = SessionConfig {
            refresh_margin: config.token_refresh_margin,
            ..SessionConfig::default()
        };

        let client = Arc::new(ShcClient::new(config.url.clone(), &transport, session)?);
        info!(url = %config.url, "logging in to controller");
        client.login(&config.password).await?;

        let snapshot = TopologyLoader::new(&client).reconcile().await?;
        let generation = snapshot.catalog.generation();
        info!(?generation, "controller topology loaded");
        self.inner.store.install_snapshot(snapshot);

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let mut handles = self.inner.task_handles.lock().await;

        if config.event_stream_enabled {
            let link = ShcLink::new(
                Arc::clone(&client),
                config.password.clone(),
                transport,
                config.ping_interval,
                generation,
            );
            let stream = EventStreamClient::new(
                link,
                Arc::clone(&self.inner.store),
                stream_config(config),
                Arc::clone(&self.inner.stream_state),
            );
            *self.inner.refresh_now.lock().await = Some(stream.refresh_handle());
            handles.push(tokio::spawn(stream.run(child)));
        } else if !config.refresh_interval.is_zero() {
            let controller = self.clone();
            let period = config.refresh_interval;
            handles.push(tokio::spawn(refresh_task(controller, period, child)));
        }

        *self.inner.dispatcher.lock().await = Some(Arc::new(CommandDispatcher::new(
            Arc::clone(&client),
            Arc::clone(&self.inner.store),
            config.optimistic_updates,
        )));
        *self.inner.client.lock().await = Some(client);

        debug!(tasks = handles.len(), "controller connected");
        Ok(())
    }

    /// Stop background tasks and drop the session.
    ///
    /// The store keeps its last values; a later `connect` replaces them.
    pub async fn disconnect(&self) {
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Some(client) = self.inner.client.lock().await.take() {
            client.session().logout();
        }
        *self.inner.dispatcher.lock().await = None;
        *self.inner.refresh_now.lock().await = None;
        debug!("disconnected");
    }

    /// Reload topology and values now.
    ///
    /// With the event stream running the reload happens inside its task
    /// and this returns once it is requested.
    pub async fn full_refresh(&self) -> Result<(), CoreError> {
        if let Some(notify) = self.inner.refresh_now.lock().await.as_ref() {
            notify.notify_one();
            return Ok(());
        }

        let client = self.client().await?;
        let snapshot = TopologyLoader::new(&client).reconcile().await?;
        self.inner.store.install_snapshot(snapshot);
        Ok(())
    }

    /// Connect, run `f`, disconnect.
    ///
    /// Runs without the event stream or periodic refresh: one reconcile,
    /// then whatever `f` does.
    pub async fn oneshot<F, Fut, T>(config: ControllerConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.event_stream_enabled = false;
        cfg.refresh_interval = Duration::ZERO;

        let controller = Controller::new(cfg);
        controller.connect().await?;
        let result = f(controller.clone()).await;
        controller.disconnect().await;
        result
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Write the primary value of a capability.
    pub async fn set(&self, capability_id: &str, value: PropertyValue) -> Result<Ack, CoreError> {
        self.dispatcher().await?.set(capability_id, value).await
    }

    /// Write and wait for the controller to report the capability's state.
    pub async fn set_and_confirm(
        &self,
        capability_id: &str,
        value: PropertyValue,
        timeout: Duration,
    ) -> Result<Arc<CapabilityState>, CoreError> {
        self.dispatcher()
            .await?
            .set_and_confirm(capability_id, value, timeout)
            .await
    }

    pub async fn execute(&self, command: Command) -> Result<Ack, CoreError> {
        self.dispatcher().await?.execute(command).await
    }

    // ── State observation ────────────────────────────────────────────

    pub fn stream_state(&self) -> watch::Receiver<StreamState> {
        self.inner.stream_state.subscribe()
    }

    /// Register a listener called synchronously on every store change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(listener)
    }

    pub fn changes(&self) -> tokio::sync::broadcast::Receiver<StoreChange> {
        self.inner.store.changes()
    }

    pub fn change_stream(&self) -> impl Stream<Item = StoreChange> + Send + Unpin + 'static {
        self.inner.store.change_stream()
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn catalog(&self) -> Arc<Catalog> {
        self.inner.store.catalog()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.catalog().devices().cloned().collect()
    }

    pub fn capabilities(&self) -> Vec<Arc<Capability>> {
        self.catalog().capabilities().cloned().collect()
    }

    /// Current value of a capability, pending writes included.
    pub fn get(&self, capability_id: &str) -> Option<Arc<CapabilityState>> {
        self.inner.store.get(capability_id)
    }

    pub fn is_available(&self, device_id: &str) -> Option<bool> {
        self.inner.store.is_available(device_id)
    }

    /// Map a legacy per-device unique id onto a capability id.
    pub fn migrate_unique_id(&self, legacy: &str) -> Option<CapabilityId> {
        self.catalog().migrate_unique_id(legacy)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn client(&self) -> Result<Arc<ShcClient>, CoreError> {
        self.inner
            .client
            .lock()
            .await
            .clone()
            .ok_or(CoreError::ControllerDisconnected)
    }

    async fn dispatcher(&self) -> Result<Arc<CommandDispatcher>, CoreError> {
        self.inner
            .dispatcher
            .lock()
            .await
            .clone()
            .ok_or(CoreError::ControllerDisconnected)
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodic reload for sessions without an event stream.
async fn refresh_task(controller: Controller, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = controller.full_refresh().await {
                    warn!(error = %e, "periodic refresh failed");
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn stream_config(config: &ControllerConfig) -> StreamConfig {
    StreamConfig {
        reconnect: config.reconnect.clone(),
        idle_timeout: config.idle_timeout,
        refresh_interval: (!config.refresh_interval.is_zero()).then_some(config.refresh_interval),
        degraded_after_attempts: config.degraded_after_attempts,
    }
}

/// Build a [`TransportConfig`] from the controller configuration.
fn build_transport(config: &ControllerConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::AcceptSelfSigned => TlsMode::AcceptSelfSigned,
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
