// ── Topology loader ──
//
// Pulls the raw topology and current values from the controller. Building
// the catalog from what was fetched is `Catalog::build`; this module only
// does I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use livisi_api::{
    RawCapability, RawDevice, RawLocation, RawMessage, RawState, ShcClient, ShcStatus,
};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::Catalog;
use crate::error::CoreError;
use crate::model::{CONTROLLER_DEVICE_TYPES, CapabilityId, CapabilityState, PropertyValue, parse_timestamp};

/// Everything the controller reported in one topology pass, unjoined.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub status: ShcStatus,
    pub devices: Vec<RawDevice>,
    pub capabilities: Vec<RawCapability>,
    pub locations: Vec<RawLocation>,
    pub messages: Vec<RawMessage>,
    /// State of the controller's own device, if it could be read.
    pub controller_state: Option<Map<String, Value>>,
    pub fetched_at: DateTime<Utc>,
}

/// A catalog plus the values fetched right after it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub catalog: Catalog,
    pub states: Vec<(CapabilityId, CapabilityState)>,
}

/// Loads topology and values through an authenticated client.
pub struct TopologyLoader<'a> {
    client: &'a ShcClient,
}

impl<'a> TopologyLoader<'a> {
    pub fn new(client: &'a ShcClient) -> Self {
        Self { client }
    }

    /// Fetch the raw topology.
    ///
    /// Messages go first: that request also refreshes a stale token, so the
    /// parallel requests after it do not race each other into a refresh.
    pub async fn load_snapshot(&self) -> Result<TopologySnapshot, CoreError> {
        let messages = self.client.list_messages().await?;

        let (devices, capabilities, locations, status) = tokio::try_join!(
            self.client.list_devices(),
            self.client.list_capabilities(),
            self.client.list_locations(),
            self.client.get_status(),
        )?;

        let controller_state = match devices
            .iter()
            .find(|d| CONTROLLER_DEVICE_TYPES.contains(&d.device_type.as_str()))
        {
            Some(shc) => match self.client.get_device_state(&shc.id).await {
                Ok(state) => Some(state),
                Err(e) if e.is_transient() || e.is_auth_expired() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "could not read controller state");
                    None
                }
            },
            None => None,
        };

        debug!(
            devices = devices.len(),
            capabilities = capabilities.len(),
            locations = locations.len(),
            messages = messages.len(),
            "topology fetched"
        );

        Ok(TopologySnapshot {
            status,
            devices,
            capabilities,
            locations,
            messages,
            controller_state,
            fetched_at: Utc::now(),
        })
    }

    /// Fetch and build a catalog.
    pub async fn load(&self) -> Result<Catalog, CoreError> {
        let snapshot = self.load_snapshot().await?;
        Ok(Catalog::build(&snapshot))
    }

    /// Fetch the current value of every controller-backed capability.
    ///
    /// Requests run with the concurrency the controller generation allows.
    /// A capability whose state cannot be read is skipped; a lost
    /// connection or session aborts the whole fetch.
    pub async fn fetch_states(
        &self,
        catalog: &Catalog,
    ) -> Result<Vec<(CapabilityId, CapabilityState)>, CoreError> {
        let concurrency = catalog.generation().request_concurrency();
        let targets: Vec<CapabilityId> = catalog
            .capabilities()
            .filter(|c| c.kind.is_supported() && !c.kind.is_synthetic())
            .map(|c| c.id.clone())
            .collect();

        let mut results = stream::iter(targets)
            .map(|id| async move {
                let res = self.client.get_capability_state(id.as_str()).await;
                (id, res)
            })
            .buffer_unordered(concurrency);

        let mut states = Vec::new();
        while let Some((id, res)) = results.next().await {
            match res {
                Ok(raw) => {
                    if let Some(state) = state_from_raw(&raw, Utc::now()) {
                        states.push((id, state));
                    }
                }
                Err(e) if is_fatal(&e) => return Err(e.into()),
                Err(e) => {
                    warn!(capability_id = %id, error = %e, "skipping capability state");
                }
            }
        }
        Ok(states)
    }

    /// Full reload: topology, then every value.
    pub async fn reconcile(&self) -> Result<Snapshot, CoreError> {
        let topology = self.load_snapshot().await?;
        let catalog = Catalog::build(&topology);
        let mut states = self.fetch_states(&catalog).await?;
        states.extend(catalog.synthetic_states(&topology));

        info!(
            devices = catalog.device_count(),
            capabilities = catalog.capability_count(),
            values = states.len(),
            "controller state reconciled"
        );
        Ok(Snapshot { catalog, states })
    }
}

fn is_fatal(err: &livisi_api::Error) -> bool {
    err.is_transient()
        || err.is_auth_expired()
        || matches!(err, livisi_api::Error::Authentication { .. })
}

/// Turn a state response into a `CapabilityState`, stamped with the newest
/// `lastChanged` among its properties (or, locally, `fetched_at`). Properties without
/// a usable value are dropped; a state with none left yields `None`.
pub(crate) fn state_from_raw(raw: &RawState, fetched_at: DateTime<Utc>) -> Option<CapabilityState> {
    let mut properties = BTreeMap::new();
    let mut newest: Option<DateTime<Utc>> = None;

    for (name, prop) in raw {
        let Some(value) = PropertyValue::from_json(&prop.value) else {
            continue;
        };
        if let Some(ts) = prop.last_changed.as_deref().and_then(parse_timestamp) {
            newest = Some(newest.map_or(ts, |n| n.max(ts)));
        }
        properties.insert(name.clone(), value);
    }

    if properties.is_empty() {
        return None;
    }
    Some(match newest {
        Some(at) => CapabilityState::new(properties, at),
        None => CapabilityState::stamped_locally(properties, fetched_at),
    })
}
