// ── Command dispatcher ──
//
// Validates a write against the catalog, turns it into an SHC action, and
// reports the controller's verdict. Never retries: a failed write is the
// caller's to repeat.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use livisi_api::rest::actions::{
    ACTION_RESTART, ACTION_SET_STATE, ACTION_START_RAMP, ACTION_STOP_RAMP, NAMESPACE_COSIP,
    NAMESPACE_CORE,
};
use livisi_api::{ActionParam, ActionRequest, ShcClient};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use super::{Ack, Command, RampDirection};
use crate::error::CoreError;
use crate::model::{
    Capability, CapabilityKind, CapabilityState, PropertyValue, ValueShape, WriteSpec,
};
use crate::store::{StateStore, StoreChange, ValueSource};

/// Sends commands for one controller session.
pub struct CommandDispatcher {
    client: Arc<ShcClient>,
    store: Arc<StateStore>,
    optimistic: bool,
}

impl CommandDispatcher {
    /// `optimistic` layers each accepted value into the store until the
    /// controller confirms or replaces it.
    pub fn new(client: Arc<ShcClient>, store: Arc<StateStore>, optimistic: bool) -> Self {
        Self {
            client,
            store,
            optimistic,
        }
    }

    /// Write `value` to the primary property of a capability.
    pub async fn set(&self, capability_id: &str, value: PropertyValue) -> Result<Ack, CoreError> {
        let (capability, spec) = self.writable(capability_id)?;
        let shape = effective_shape(&capability, &spec);
        shape
            .check(&value)
            .map_err(|reason| incompatible(&capability, reason))?;

        let target = capability.id.link();

        if spec.local {
            debug!(capability_id = %capability.id, property = spec.property, %value, "local write");
            self.store.apply_local(&capability.id, spec.property, value);
            return Ok(Ack {
                target,
                action: "local".into(),
                property: Some(spec.property.to_owned()),
                pending: false,
            });
        }

        let mut params = BTreeMap::new();
        params.insert(spec.property.to_owned(), ActionParam::constant(value.to_json()));
        let action = ActionRequest::for_capability(
            capability.id.as_str(),
            ACTION_SET_STATE,
            spec.namespace,
            params,
        );
        // Overlay first: a confirming event may beat the response.
        let overlay = self
            .optimistic
            .then(|| self.store.record_pending(&capability.id, spec.property, value));
        if let Err(e) = self.send(&action).await {
            if let Some(overlay) = &overlay {
                self.store.discard_pending(&capability.id, overlay);
            }
            return Err(e);
        }

        Ok(Ack {
            target,
            action: ACTION_SET_STATE.into(),
            property: Some(spec.property.to_owned()),
            pending: self.optimistic,
        })
    }

    /// Write `value` and wait until the controller reports the capability's
    /// state, returning what it reported.
    ///
    /// Local values are confirmed immediately.
    pub async fn set_and_confirm(
        &self,
        capability_id: &str,
        value: PropertyValue,
        timeout: Duration,
    ) -> Result<Arc<CapabilityState>, CoreError> {
        // Subscribe first so a fast confirmation cannot slip past.
        let mut changes = self.store.changes();
        let ack = self.set(capability_id, value).await?;

        if ack.action == "local" {
            return self
                .store
                .get(capability_id)
                .ok_or_else(|| CoreError::Internal(format!("local value for {capability_id} vanished")));
        }

        let wait = async {
            loop {
                match changes.recv().await {
                    Ok(StoreChange::Value {
                        capability_id: id,
                        state,
                        source: ValueSource::Controller,
                    }) if id.as_str() == capability_id => return Ok(state),
                    Ok(StoreChange::Reloaded { .. }) => {
                        if let Some(state) = self.store.get_confirmed(capability_id) {
                            if !self.store.is_pending(capability_id) {
                                return Ok(state);
                            }
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return Err(CoreError::ControllerDisconnected),
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| CoreError::Timeout {
                timeout_secs: timeout.as_secs(),
            })?
    }

    /// Execute any [`Command`].
    pub async fn execute(&self, command: Command) -> Result<Ack, CoreError> {
        match command {
            Command::Set {
                capability_id,
                value,
            } => self.set(capability_id.as_str(), value).await,
            Command::SetOperationMode {
                capability_id,
                auto,
            } => {
                let thermostat = self.thermostat_for(capability_id.as_str())?;
                let mode = if auto { "Auto" } else { "Manu" };
                self.set(&thermostat, PropertyValue::Text(mode.into())).await
            }
            Command::StartRamp {
                capability_id,
                direction,
            } => self.ramp(capability_id.as_str(), Some(direction)).await,
            Command::StopRamp { capability_id } => self.ramp(capability_id.as_str(), None).await,
            Command::RestartController => self.restart().await,
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Look up a capability and how it is written.
    ///
    /// Unsupported kinds fail before read-only ones so the caller learns
    /// the capability is not modelled at all.
    fn writable(&self, capability_id: &str) -> Result<(Arc<Capability>, WriteSpec), CoreError> {
        let catalog = self.store.catalog();
        let capability = catalog
            .capability(capability_id)
            .cloned()
            .ok_or_else(|| CoreError::CapabilityNotFound {
                identifier: capability_id.to_owned(),
            })?;

        if let CapabilityKind::Unsupported(raw_kind) = &capability.kind {
            return Err(CoreError::UnsupportedCapability {
                capability_id: capability_id.to_owned(),
                raw_kind: raw_kind.clone(),
            });
        }

        let spec = capability
            .kind
            .write_spec(catalog.generation())
            .ok_or_else(|| incompatible(&capability, "read-only".into()))?;
        Ok((capability, spec))
    }

    /// The thermostat actuator behind `capability_id`.
    fn thermostat_for(&self, capability_id: &str) -> Result<String, CoreError> {
        let catalog = self.store.catalog();
        let capability = catalog
            .capability(capability_id)
            .ok_or_else(|| CoreError::CapabilityNotFound {
                identifier: capability_id.to_owned(),
            })?;

        match capability.kind {
            CapabilityKind::Thermostat => Ok(capability.id.as_str().to_owned()),
            CapabilityKind::ThermostatSetpoint => catalog
                .linked_thermostat(capability_id)
                .map(|t| t.id.as_str().to_owned())
                .ok_or_else(|| incompatible(capability, "no linked thermostat".into())),
            _ => Err(incompatible(capability, "not a thermostat".into())),
        }
    }

    async fn ramp(
        &self,
        capability_id: &str,
        direction: Option<RampDirection>,
    ) -> Result<Ack, CoreError> {
        let capability = self
            .store
            .catalog()
            .capability(capability_id)
            .cloned()
            .ok_or_else(|| CoreError::CapabilityNotFound {
                identifier: capability_id.to_owned(),
            })?;
        if capability.kind != CapabilityKind::Cover {
            return Err(incompatible(&capability, "only covers can ramp".into()));
        }

        let (action_type, params) = match direction {
            Some(direction) => {
                let mut params = BTreeMap::new();
                params.insert(
                    "rampDirection".to_owned(),
                    ActionParam::constant(direction.as_param()),
                );
                (ACTION_START_RAMP, params)
            }
            None => (ACTION_STOP_RAMP, BTreeMap::new()),
        };

        let action =
            ActionRequest::for_capability(capability_id, action_type, NAMESPACE_COSIP, params);
        self.send(&action).await?;
        Ok(Ack {
            target: action.target,
            action: action_type.into(),
            property: None,
            pending: false,
        })
    }

    async fn restart(&self) -> Result<Ack, CoreError> {
        let device_id = self
            .store
            .catalog()
            .controller()
            .device_id
            .clone()
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: "controller".into(),
            })?;

        let action = ActionRequest::for_device(device_id.as_str(), ACTION_RESTART, NAMESPACE_CORE);
        match self.send(&action).await {
            Ok(()) => info!(%device_id, "controller restart requested"),
            // The controller may go down before answering.
            Err(CoreError::ConnectionFailed { reason, .. }) => {
                info!(%device_id, %reason, "connection dropped during restart, assuming accepted");
            }
            Err(e) => return Err(e),
        }
        Ok(Ack {
            target: action.target,
            action: ACTION_RESTART.into(),
            property: None,
            pending: false,
        })
    }

    async fn send(&self, action: &ActionRequest) -> Result<(), CoreError> {
        let response = self.client.send_action(action).await?;
        if response.is_success() {
            debug!(target = %action.target, action = %action.action_type, "action accepted");
            Ok(())
        } else {
            Err(CoreError::CommandRejected {
                target: action.target.clone(),
                result: response
                    .result_code
                    .unwrap_or_else(|| "no result code".into()),
            })
        }
    }
}

/// Setpoints honour per-capability temperature bounds.
fn effective_shape(capability: &Capability, spec: &WriteSpec) -> ValueShape {
    if capability.kind == CapabilityKind::ThermostatSetpoint {
        let (min, max) = capability.setpoint_range();
        ValueShape::Number { min, max }
    } else {
        spec.shape
    }
}

fn incompatible(capability: &Capability, reason: String) -> CoreError {
    CoreError::IncompatibleCapability {
        capability_id: capability.id.as_str().to_owned(),
        kind: capability.kind.slug().to_owned(),
        reason,
    }
}
