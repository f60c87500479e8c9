// ── Event stream client ──
//
// One long-lived task per session. It keeps the event socket open, decodes
// frames into the state store, reconnects with backoff, and reconciles the
// full state after every reconnect and on the periodic refresh. It is the
// only writer of controller-sourced state.

mod decode;
mod link;

use std::sync::Arc;
use std::time::Duration;

use livisi_api::websocket::{Frame, ReconnectConfig, calculate_backoff, parse_frame};
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::store::StateStore;

pub use link::{ControllerLink, EventChannel, ShcLink};

/// Consecutive undecodable frames that count as a broken connection.
const MAX_BAD_FRAMES: u32 = 10;

// ── StreamState ──────────────────────────────────────────────────────

/// Event stream state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Terminal: the task was shut down.
    Stopped,
}

impl StreamState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Tuning for the stream task.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub reconnect: ReconnectConfig,
    /// No frame (data or heartbeat) for this long is a lost connection.
    pub idle_timeout: Duration,
    /// Periodic full reload while connected.
    pub refresh_interval: Option<Duration>,
    /// Failed reconnects before every device is flagged unavailable.
    pub degraded_after_attempts: u32,
}

/// Why a connected session ended.
enum Ended {
    Cancelled,
    Lost(String),
}

// ── EventStreamClient ────────────────────────────────────────────────

/// Drives the event channel for one controller session.
pub struct EventStreamClient<L: ControllerLink> {
    link: L,
    store: Arc<StateStore>,
    config: StreamConfig,
    state: Arc<watch::Sender<StreamState>>,
    refresh_now: Arc<Notify>,
}

impl<L: ControllerLink> EventStreamClient<L> {
    pub fn new(
        link: L,
        store: Arc<StateStore>,
        config: StreamConfig,
        state: Arc<watch::Sender<StreamState>>,
    ) -> Self {
        Self {
            link,
            store,
            config,
            state,
            refresh_now: Arc::new(Notify::new()),
        }
    }

    /// Handle that triggers an immediate full reload inside the task.
    pub fn refresh_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.refresh_now)
    }

    /// Run until `cancel` fires.
    ///
    /// Assumes the store already holds a fresh snapshot, so the first
    /// connection does not reload. Every later one does, before
    /// `Connected` is published.
    pub async fn run(self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        let mut failures: u32 = 0;
        let mut need_reload = false;

        loop {
            self.publish(StreamState::Connecting);

            let established = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                res = self.establish(need_reload) => res,
            };

            match established {
                Ok(mut channel) => {
                    failures = 0;
                    self.publish(StreamState::Connected);
                    info!(reloaded = need_reload, "event stream connected");

                    let connected_at = Instant::now();
                    match self.read(&mut channel, &cancel).await {
                        Ended::Cancelled => break,
                        Ended::Lost(reason) => {
                            warn!(%reason, "event stream lost");
                        }
                    }
                    if connected_at.elapsed() >= self.config.reconnect.stable_after {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, attempt, failures, "event stream connect failed");
                    if failures == self.config.degraded_after_attempts {
                        warn!(failures, "controller unreachable, flagging all devices unavailable");
                        self.store.mark_all_unavailable();
                    }
                }
            }

            need_reload = true;
            attempt = attempt.saturating_add(1);
            self.publish(StreamState::Reconnecting { attempt });

            let delay = calculate_backoff(attempt - 1, &self.config.reconnect);
            info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "waiting before reconnect"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.publish(StreamState::Stopped);
        debug!("event stream task exiting");
    }

    /// Open the channel and, after an outage, reconcile before reading.
    ///
    /// The channel opens first so events raised during the reload queue up
    /// on it instead of being lost.
    async fn establish(&self, reload: bool) -> Result<L::Channel, CoreError> {
        let channel = self.link.open().await?;
        if reload {
            let snapshot = self.link.reload().await?;
            self.store.install_snapshot(snapshot);
        }
        Ok(channel)
    }

    async fn read(&self, channel: &mut L::Channel, cancel: &CancellationToken) -> Ended {
        let idle = self.config.idle_timeout;
        let mut idle_deadline = Instant::now() + idle;
        let mut bad_frames: u32 = 0;
        let mut refresh = self.config.refresh_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ended::Cancelled,
                () = tokio::time::sleep_until(idle_deadline) => {
                    return Ended::Lost(format!("no frame for {}s", idle.as_secs()));
                }
                () = tick(refresh.as_mut()) => {
                    if self.reload_in_place().await {
                        idle_deadline = Instant::now() + idle;
                    }
                }
                () = self.refresh_now.notified() => {
                    if self.reload_in_place().await {
                        idle_deadline = Instant::now() + idle;
                    }
                }
                frame = channel.next_frame() => match frame {
                    Ok(Some(Frame::Heartbeat)) => {
                        idle_deadline = Instant::now() + idle;
                    }
                    Ok(Some(Frame::Text(text))) => {
                        idle_deadline = Instant::now() + idle;
                        match parse_frame(&text) {
                            Ok(Some(raw)) => {
                                bad_frames = 0;
                                let catalog = self.store.catalog();
                                for event in decode::decode(&raw, &catalog) {
                                    self.store.apply(&event);
                                }
                            }
                            Ok(None) => bad_frames = 0,
                            Err(e) => {
                                bad_frames += 1;
                                warn!(error = %e, bad_frames, "dropping undecodable frame");
                                if bad_frames >= MAX_BAD_FRAMES {
                                    return Ended::Lost(format!("{bad_frames} undecodable frames in a row"));
                                }
                            }
                        }
                    }
                    Ok(None) => return Ended::Lost("closed by controller".into()),
                    Err(e) => return Ended::Lost(e.to_string()),
                },
            }
        }
    }

    /// Periodic or requested reload while connected. Failures are logged;
    /// a dead link shows up on the socket soon enough.
    ///
    /// Frames are not read while this runs. A successful reload proves the
    /// controller is reachable, so the caller restarts the idle window.
    async fn reload_in_place(&self) -> bool {
        match self.link.reload().await {
            Ok(snapshot) => {
                self.store.install_snapshot(snapshot);
                true
            }
            Err(e) => {
                warn!(error = %e, "state refresh failed");
                false
            }
        }
    }

    fn publish(&self, state: StreamState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use crate::catalog::tests::fixture;
    use crate::catalog::{Catalog, Snapshot};
    use crate::model::{CapabilityId, CapabilityState, PropertyValue, parse_timestamp};
    use crate::store::StoreChange;

    type FrameResult = Result<Option<Frame>, livisi_api::Error>;

    struct FakeChannel {
        rx: mpsc::UnboundedReceiver<FrameResult>,
    }

    impl EventChannel for FakeChannel {
        async fn next_frame(&mut self) -> FrameResult {
            self.rx.recv().await.unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct FakeLink {
        opens: Mutex<VecDeque<Result<FakeChannel, CoreError>>>,
        open_delay: Mutex<Duration>,
        reloads: AtomicUsize,
        reload_delay: Mutex<Duration>,
        reload_dim_level: Mutex<f64>,
    }

    impl FakeLink {
        fn push_channel(&self) -> mpsc::UnboundedSender<FrameResult> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.opens.lock().unwrap().push_back(Ok(FakeChannel { rx }));
            tx
        }

        fn push_failure(&self, error: CoreError) {
            self.opens.lock().unwrap().push_back(Err(error));
        }
    }

    impl ControllerLink for Arc<FakeLink> {
        type Channel = FakeChannel;

        async fn open(&self) -> Result<FakeChannel, CoreError> {
            let delay = *self.open_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            self.opens
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(CoreError::ConnectionFailed {
                        url: "ws://shc".into(),
                        reason: "refused".into(),
                    })
                })
        }

        async fn reload(&self) -> Result<Snapshot, CoreError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            let delay = *self.reload_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            let level = *self.reload_dim_level.lock().unwrap();
            Ok(snapshot_with_dim(level, "2026-03-01T10:05:00.000Z"))
        }
    }

    fn snapshot_with_dim(level: f64, at: &str) -> Snapshot {
        let mut properties = BTreeMap::new();
        properties.insert("dimLevel".to_owned(), PropertyValue::Number(level));
        Snapshot {
            catalog: Catalog::build(&fixture()),
            states: vec![(
                CapabilityId::new("dimmer-17"),
                CapabilityState::new(properties, parse_timestamp(at).unwrap()),
            )],
        }
    }

    fn dim_frame(level: u32, at: &str) -> FrameResult {
        Ok(Some(Frame::Text(
            serde_json::json!({
                "type": "StateChanged",
                "source": "/capability/dimmer-17",
                "timestamp": at,
                "properties": { "dimLevel": level }
            })
            .to_string(),
        )))
    }

    fn dim_level(store: &StateStore) -> Option<PropertyValue> {
        store.get("dimmer-17").and_then(|s| s.get("dimLevel").cloned())
    }

    fn config() -> StreamConfig {
        StreamConfig {
            reconnect: ReconnectConfig::default(),
            idle_timeout: Duration::from_secs(600),
            refresh_interval: None,
            degraded_after_attempts: 3,
        }
    }

    struct Harness {
        link: Arc<FakeLink>,
        store: Arc<StateStore>,
        state: watch::Receiver<StreamState>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(link: Arc<FakeLink>) -> Harness {
        start_with(link, config())
    }

    fn start_with(link: Arc<FakeLink>, config: StreamConfig) -> Harness {
        let store = Arc::new(StateStore::new());
        store.install_snapshot(snapshot_with_dim(10.0, "2026-03-01T09:00:00.000Z"));

        let (tx, state) = watch::channel(StreamState::Disconnected);
        let client = EventStreamClient::new(Arc::clone(&link), Arc::clone(&store), config, Arc::new(tx));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(client.run(cancel.clone()));
        Harness {
            link,
            store,
            state,
            cancel,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_reconciles_before_connected() {
        let link = Arc::new(FakeLink::default());
        *link.reload_dim_level.lock().unwrap() = 55.0;
        let first = link.push_channel();
        let _second = link.push_channel();
        let mut h = start(Arc::clone(&link));

        // Record the stream state at the moment each reload lands.
        let seen_state = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen_state);
        let state_at_reload = h.state.clone();
        let _sub = h.store.subscribe(move |change| {
            if matches!(change, StoreChange::Reloaded { .. }) {
                sink.lock().unwrap().push(*state_at_reload.borrow());
            }
        });

        h.state.wait_for(|s| s.is_connected()).await.unwrap();
        first.send(dim_frame(20, "2026-03-01T10:00:00.000Z")).unwrap();
        drop(first);

        h.state
            .wait_for(|s| matches!(s, StreamState::Reconnecting { .. }))
            .await
            .unwrap();
        assert_eq!(dim_level(&h.store), Some(PropertyValue::Number(20.0)));

        h.state.wait_for(|s| s.is_connected()).await.unwrap();
        assert_eq!(h.link.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(*seen_state.lock().unwrap(), vec![StreamState::Connecting]);
        assert_eq!(dim_level(&h.store), Some(PropertyValue::Number(55.0)));

        h.cancel.cancel();
        h.task.await.unwrap();
        assert_eq!(*h.state.borrow(), StreamState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_flag_devices_unavailable() {
        let link = Arc::new(FakeLink::default());
        let first = link.push_channel();
        let mut h = start(link);

        h.state.wait_for(|s| s.is_connected()).await.unwrap();
        assert_eq!(h.store.is_available("dev-dim"), Some(true));
        drop(first);

        // Lost connection, then three refused reconnects.
        h.state
            .wait_for(|s| matches!(s, StreamState::Reconnecting { attempt } if *attempt >= 4))
            .await
            .unwrap();
        assert_eq!(h.store.is_available("dev-dim"), Some(false));

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_dropped_until_too_many() {
        let link = Arc::new(FakeLink::default());
        let tx = link.push_channel();
        let mut h = start(link);
        h.state.wait_for(|s| s.is_connected()).await.unwrap();

        tx.send(Ok(Some(Frame::Text("{not json".into())))).unwrap();
        tx.send(dim_frame(30, "2026-03-01T10:00:00.000Z")).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(dim_level(&h.store), Some(PropertyValue::Number(30.0)));
        assert!(h.state.borrow().is_connected());

        for _ in 0..MAX_BAD_FRAMES {
            tx.send(Ok(Some(Frame::Text("garbage".into())))).unwrap();
        }
        h.state
            .wait_for(|s| matches!(s, StreamState::Reconnecting { .. }))
            .await
            .unwrap();

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_channel_counts_as_lost() {
        let link = Arc::new(FakeLink::default());
        let _tx = link.push_channel();
        let mut h = start(link);
        h.state.wait_for(|s| s.is_connected()).await.unwrap();

        // Nothing arrives; paused time skips ahead to the idle deadline.
        h.state
            .wait_for(|s| matches!(s, StreamState::Reconnecting { .. }))
            .await
            .unwrap();

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_resets_after_a_stable_connection() {
        let link = Arc::new(FakeLink::default());
        link.push_failure(CoreError::ConnectionFailed {
            url: "ws://shc".into(),
            reason: "refused".into(),
        });
        let tx = link.push_channel();
        let mut h = start(link);

        h.state
            .wait_for(|s| matches!(s, StreamState::Reconnecting { attempt: 1 }))
            .await
            .unwrap();
        h.state.wait_for(|s| s.is_connected()).await.unwrap();

        // Stay up past `stable_after`, then drop.
        tokio::time::sleep(ReconnectConfig::default().stable_after + Duration::from_secs(1)).await;
        drop(tx);

        let state = *h
            .state
            .wait_for(|s| matches!(s, StreamState::Reconnecting { .. }))
            .await
            .unwrap();
        assert_eq!(state, StreamState::Reconnecting { attempt: 1 });

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_opens_count_as_failed_attempts() {
        let link = Arc::new(FakeLink::default());
        let first = link.push_channel();
        for _ in 0..3 {
            link.push_failure(CoreError::Timeout { timeout_secs: 10 });
        }
        let mut h = start(Arc::clone(&link));
        h.state.wait_for(|s| s.is_connected()).await.unwrap();

        // Every handshake from here on stalls until its deadline.
        *link.open_delay.lock().unwrap() = Duration::from_secs(10);
        drop(first);

        h.state
            .wait_for(|s| matches!(s, StreamState::Reconnecting { attempt } if *attempt >= 4))
            .await
            .unwrap();
        assert_eq!(h.store.is_available("dev-dim"), Some(false));

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_refresh_does_not_trip_idle_timeout() {
        let link = Arc::new(FakeLink::default());
        *link.reload_delay.lock().unwrap() = Duration::from_secs(50);
        let _tx = link.push_channel();
        let tuned = StreamConfig {
            idle_timeout: Duration::from_secs(60),
            refresh_interval: Some(Duration::from_secs(30)),
            ..config()
        };
        let mut h = start_with(Arc::clone(&link), tuned);
        h.state.wait_for(|s| s.is_connected()).await.unwrap();

        // The refresh at 30s runs until 80s, past the original idle deadline.
        tokio::time::sleep(Duration::from_secs(85)).await;
        assert_eq!(link.reloads.load(Ordering::SeqCst), 1);
        assert!(h.state.borrow().is_connected());

        h.cancel.cancel();
        h.task.await.unwrap();
    }
}
