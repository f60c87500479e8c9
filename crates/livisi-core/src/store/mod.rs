// ── Live state store ──
//
// Current values of every capability, device availability, and the catalog
// they belong to. Reads are lock-free; the event stream task is the only
// writer of controller-sourced state. Every change is pushed to inline
// listeners and to a broadcast channel.

mod listeners;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_core::Stream;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace};

use crate::catalog::{Catalog, DEFAULT_MOTION_DURATION, Snapshot};
use crate::model::{CapabilityId, CapabilityState, DeviceId, Event, PropertyValue, TriggerKind};

pub use listeners::Subscription;
use listeners::ListenerSet;

const CHANGE_CHANNEL_SIZE: usize = 256;

// ── Change notifications ─────────────────────────────────────────────

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Reported by the controller (event or reload).
    Controller,
    /// Written by this client, not yet confirmed.
    Optimistic,
    /// Held locally, never sent to the controller.
    Local,
}

/// One change to the store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StoreChange {
    Value {
        capability_id: CapabilityId,
        state: Arc<CapabilityState>,
        source: ValueSource,
    },
    Availability {
        device_id: DeviceId,
        available: bool,
    },
    Trigger {
        device_id: DeviceId,
        capability_id: CapabilityId,
        kind: TriggerKind,
        timestamp: DateTime<Utc>,
    },
    Reloaded {
        devices: usize,
        capabilities: usize,
    },
}

impl StoreChange {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Value { .. } => "value",
            Self::Availability { .. } => "availability",
            Self::Trigger { .. } => "trigger",
            Self::Reloaded { .. } => "reloaded",
        }
    }
}

/// Result of [`StateStore::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The store changed and listeners were notified.
    Applied,
    /// Nothing new: same values, no pending write to resolve.
    Unchanged,
    /// Older than what the store holds; dropped.
    Stale,
    /// Refers to a capability or device not in the catalog.
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct Availability {
    available: bool,
    since: Option<DateTime<Utc>>,
}

// ── StateStore ───────────────────────────────────────────────────────

/// Reactive store of capability values for one controller session.
pub struct StateStore {
    catalog: ArcSwap<Catalog>,
    values: DashMap<CapabilityId, Arc<CapabilityState>>,
    /// Optimistic writes awaiting confirmation, layered over `values`.
    pending: DashMap<CapabilityId, Arc<CapabilityState>>,
    availability: DashMap<DeviceId, Availability>,
    listeners: ListenerSet,
    changes: broadcast::Sender<StoreChange>,
    last_event: watch::Sender<Option<DateTime<Utc>>>,
    last_reload: watch::Sender<Option<DateTime<Utc>>>,
}

impl StateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        let (last_event, _) = watch::channel(None);
        let (last_reload, _) = watch::channel(None);
        Self {
            catalog: ArcSwap::from_pointee(Catalog::empty()),
            values: DashMap::new(),
            pending: DashMap::new(),
            availability: DashMap::new(),
            listeners: ListenerSet::default(),
            changes,
            last_event,
            last_reload,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The current catalog.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.load_full()
    }

    /// Effective value: a pending optimistic write if there is one, else
    /// the last value the controller reported.
    pub fn get(&self, capability_id: &str) -> Option<Arc<CapabilityState>> {
        self.pending
            .get(capability_id)
            .map(|s| Arc::clone(s.value()))
            .or_else(|| self.get_confirmed(capability_id))
    }

    /// Last value the controller reported, ignoring pending writes.
    pub fn get_confirmed(&self, capability_id: &str) -> Option<Arc<CapabilityState>> {
        self.values.get(capability_id).map(|s| Arc::clone(s.value()))
    }

    /// Whether a write to this capability is still unconfirmed.
    pub fn is_pending(&self, capability_id: &str) -> bool {
        self.pending.contains_key(capability_id)
    }

    /// Device availability, `None` for devices not in the catalog.
    pub fn is_available(&self, device_id: &str) -> Option<bool> {
        self.availability.get(device_id).map(|a| a.available)
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.last_event.borrow()
    }

    pub fn last_reload(&self) -> Option<DateTime<Utc>> {
        *self.last_reload.borrow()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Register a listener called synchronously, before `apply` returns,
    /// for every change. Keep the returned handle alive to stay subscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Receive changes asynchronously. Slow receivers lose the oldest.
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// [`changes`](Self::changes) as a `Stream`, skipping lag gaps.
    pub fn change_stream(&self) -> impl Stream<Item = StoreChange> + Send + Unpin + 'static {
        BroadcastStream::new(self.changes.subscribe()).filter_map(Result::ok)
    }

    // ── Event application ────────────────────────────────────────────

    /// Apply one controller event.
    ///
    /// Events older than what the store holds for the same capability or
    /// device are dropped. Listeners run before this returns.
    pub fn apply(&self, event: &Event) -> ApplyOutcome {
        let outcome = match event {
            Event::PropertyChanged {
                capability_id,
                properties,
                timestamp,
            } => self.apply_properties(capability_id, properties, *timestamp),
            Event::DeviceAvailability {
                device_id,
                available,
                timestamp,
            } => self.apply_availability(device_id, *available, *timestamp),
            Event::Trigger {
                device_id,
                capability_id,
                kind,
                timestamp,
            } => {
                if self.catalog.load().capability(capability_id.as_str()).is_none() {
                    ApplyOutcome::Unknown
                } else {
                    self.emit(StoreChange::Trigger {
                        device_id: device_id.clone(),
                        capability_id: capability_id.clone(),
                        kind: *kind,
                        timestamp: *timestamp,
                    });
                    ApplyOutcome::Applied
                }
            }
        };

        if outcome != ApplyOutcome::Unknown {
            self.last_event.send_replace(Some(event.timestamp()));
        }
        trace!(?outcome, "event applied");
        outcome
    }

    fn apply_properties(
        &self,
        capability_id: &CapabilityId,
        properties: &BTreeMap<String, PropertyValue>,
        timestamp: DateTime<Utc>,
    ) -> ApplyOutcome {
        if self.catalog.load().capability(capability_id.as_str()).is_none() {
            return ApplyOutcome::Unknown;
        }

        // The entry guard holds a shard lock; it must be gone before
        // listeners run.
        let (state, changed) = match self.values.entry(capability_id.clone()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                if current.is_newer_than(timestamp) {
                    debug!(%capability_id, "dropping stale event");
                    return ApplyOutcome::Stale;
                }
                let mut merged = current.properties.clone();
                merged.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
                let changed = merged != current.properties;
                let state = Arc::new(CapabilityState::new(merged, timestamp));
                slot.insert(Arc::clone(&state));
                (state, changed)
            }
            Entry::Vacant(slot) => {
                let state = Arc::new(CapabilityState::new(properties.clone(), timestamp));
                slot.insert(Arc::clone(&state));
                (state, true)
            }
        };

        let confirmed_pending = self.pending.remove(capability_id).is_some();
        if !changed && !confirmed_pending {
            return ApplyOutcome::Unchanged;
        }

        self.emit(StoreChange::Value {
            capability_id: capability_id.clone(),
            state,
            source: ValueSource::Controller,
        });
        ApplyOutcome::Applied
    }

    fn apply_availability(
        &self,
        device_id: &DeviceId,
        available: bool,
        timestamp: DateTime<Utc>,
    ) -> ApplyOutcome {
        let changed = {
            let Some(mut slot) = self.availability.get_mut(device_id.as_str()) else {
                return ApplyOutcome::Unknown;
            };
            if slot.since.is_some_and(|since| timestamp < since) {
                return ApplyOutcome::Stale;
            }
            let changed = slot.available != available;
            *slot = Availability {
                available,
                since: Some(timestamp),
            };
            changed
        };

        if !changed {
            return ApplyOutcome::Unchanged;
        }
        debug!(%device_id, available, "device availability changed");
        self.emit(StoreChange::Availability {
            device_id: device_id.clone(),
            available,
        });
        ApplyOutcome::Applied
    }

    // ── Bulk updates ─────────────────────────────────────────────────

    /// Install a freshly reconciled catalog and its values.
    ///
    /// The catalog is swapped whole. Fetched values replace stored ones
    /// regardless of timestamps, values of capabilities that disappeared
    /// are dropped, and pending writes are discarded. Local values survive.
    pub fn install_snapshot(&self, snapshot: Snapshot) {
        let Snapshot { catalog, states } = snapshot;
        let catalog = Arc::new(catalog);
        self.catalog.store(Arc::clone(&catalog));

        self.values
            .retain(|id, _| catalog.capability(id.as_str()).is_some());
        // Listeners last saw these overlays; each gets the confirmed value
        // even when it did not change.
        let mut overlaid: HashSet<CapabilityId> =
            self.pending.iter().map(|e| e.key().clone()).collect();
        self.pending.clear();

        let now = Utc::now();
        let mut changes = Vec::new();

        for (id, state) in states {
            let state = Arc::new(state);
            let previous = self.values.insert(id.clone(), Arc::clone(&state));
            let was_overlaid = overlaid.remove(&id);
            if was_overlaid || previous.is_none_or(|p| p.properties != state.properties) {
                changes.push(StoreChange::Value {
                    capability_id: id,
                    state,
                    source: ValueSource::Controller,
                });
            }
        }
        for id in overlaid {
            if let Some(state) = self.get_confirmed(id.as_str()) {
                changes.push(StoreChange::Value {
                    capability_id: id,
                    state,
                    source: ValueSource::Controller,
                });
            }
        }

        for id in catalog.duration_capabilities() {
            if !self.values.contains_key(id) {
                let mut properties = BTreeMap::new();
                properties.insert(
                    "duration".to_owned(),
                    PropertyValue::Number(DEFAULT_MOTION_DURATION),
                );
                let state = Arc::new(CapabilityState::stamped_locally(properties, now));
                self.values.insert(id.clone(), Arc::clone(&state));
                changes.push(StoreChange::Value {
                    capability_id: id.clone(),
                    state,
                    source: ValueSource::Local,
                });
            }
        }

        self.availability
            .retain(|id, _| catalog.device(id.as_str()).is_some());
        for device in catalog.devices() {
            let available = catalog.initially_available(device.id.as_str());
            let previous = self.availability.insert(
                device.id.clone(),
                Availability {
                    available,
                    since: None,
                },
            );
            if previous.is_none_or(|p| p.available != available) {
                changes.push(StoreChange::Availability {
                    device_id: device.id.clone(),
                    available,
                });
            }
        }

        self.last_reload.send_replace(Some(now));
        changes.push(StoreChange::Reloaded {
            devices: catalog.device_count(),
            capabilities: catalog.capability_count(),
        });

        for change in &changes {
            self.emit_ref(change);
        }
    }

    /// Flag every device unavailable. Used when the controller has been
    /// unreachable for a while; the next snapshot restores availability.
    pub fn mark_all_unavailable(&self) {
        let mut changed = Vec::new();
        for mut slot in self.availability.iter_mut() {
            if slot.available {
                slot.available = false;
                changed.push(slot.key().clone());
            }
        }
        debug!(devices = changed.len(), "marked devices unavailable");
        for device_id in changed {
            self.emit(StoreChange::Availability {
                device_id,
                available: false,
            });
        }
    }

    /// Layer an unconfirmed write over the confirmed value.
    ///
    /// Call this before the write is sent: the next controller value for
    /// the capability, even one that arrives before the write is
    /// acknowledged, replaces the overlay. The returned state identifies
    /// the overlay for [`discard_pending`](Self::discard_pending).
    pub fn record_pending(
        &self,
        capability_id: &CapabilityId,
        property: &str,
        value: PropertyValue,
    ) -> Arc<CapabilityState> {
        let mut properties = self
            .get(capability_id.as_str())
            .map(|s| s.properties.clone())
            .unwrap_or_default();
        properties.insert(property.to_owned(), value);
        let state = Arc::new(CapabilityState::new(properties, Utc::now()));
        self.pending.insert(capability_id.clone(), Arc::clone(&state));
        self.emit(StoreChange::Value {
            capability_id: capability_id.clone(),
            state: Arc::clone(&state),
            source: ValueSource::Optimistic,
        });
        state
    }

    /// Drop an overlay whose write failed, if it is still in place, and
    /// republish the confirmed value.
    pub fn discard_pending(&self, capability_id: &CapabilityId, overlay: &Arc<CapabilityState>) {
        let removed = self
            .pending
            .remove_if(capability_id, |_, current| Arc::ptr_eq(current, overlay))
            .is_some();
        if !removed {
            return;
        }
        debug!(%capability_id, "discarded unconfirmed write");
        if let Some(state) = self.get_confirmed(capability_id.as_str()) {
            self.emit(StoreChange::Value {
                capability_id: capability_id.clone(),
                state,
                source: ValueSource::Controller,
            });
        }
    }

    /// Set a locally held property (never sent to the controller).
    pub fn apply_local(&self, capability_id: &CapabilityId, property: &str, value: PropertyValue) {
        let state = {
            let mut slot = self.values.entry(capability_id.clone()).or_insert_with(|| {
                Arc::new(CapabilityState::stamped_locally(BTreeMap::new(), Utc::now()))
            });
            let mut properties = slot.properties.clone();
            properties.insert(property.to_owned(), value);
            let state = Arc::new(CapabilityState::stamped_locally(properties, Utc::now()));
            *slot = Arc::clone(&state);
            state
        };
        self.emit(StoreChange::Value {
            capability_id: capability_id.clone(),
            state,
            source: ValueSource::Local,
        });
    }

    // ── Notification ─────────────────────────────────────────────────

    fn emit(&self, change: StoreChange) {
        self.emit_ref(&change);
    }

    fn emit_ref(&self, change: &StoreChange) {
        self.listeners.notify(change);
        // No receivers is fine.
        let _ = self.changes.send(change.clone());
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
