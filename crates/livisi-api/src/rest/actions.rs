// Action endpoint
//
// Every write on the SHC is an action posted to `/action`, addressed to a
// capability (`/capability/{id}`) or a device (`/device/{id}`).

use std::collections::BTreeMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Error;
use crate::rest::client::ShcClient;
use crate::rest::models::{ActionParam, ActionRequest, ActionResponse};

/// Namespace for most actions.
pub const NAMESPACE_CORE: &str = "core.RWE";

/// Namespace for roller shutter actions.
pub const NAMESPACE_COSIP: &str = "CosipDevices.RWE";

pub const ACTION_SET_STATE: &str = "SetState";
pub const ACTION_START_RAMP: &str = "StartRamp";
pub const ACTION_STOP_RAMP: &str = "StopRamp";
pub const ACTION_RESTART: &str = "Restart";

impl ActionRequest {
    /// Build an action with a fresh request id.
    pub fn new(
        action_type: &str,
        namespace: &str,
        target: String,
        params: BTreeMap<String, ActionParam>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            action_type: action_type.into(),
            namespace: namespace.into(),
            target,
            params,
        }
    }

    pub fn for_capability(
        capability_id: &str,
        action_type: &str,
        namespace: &str,
        params: BTreeMap<String, ActionParam>,
    ) -> Self {
        Self::new(
            action_type,
            namespace,
            format!("/capability/{capability_id}"),
            params,
        )
    }

    pub fn for_device(device_id: &str, action_type: &str, namespace: &str) -> Self {
        Self::new(
            action_type,
            namespace,
            format!("/device/{device_id}"),
            BTreeMap::new(),
        )
    }
}

impl ShcClient {
    /// Post an action.
    ///
    /// `POST /action`. A `Restart` drops the connection before answering;
    /// that counts as accepted.
    pub async fn send_action(&self, action: &ActionRequest) -> Result<ActionResponse, Error> {
        debug!(
            action = %action.action_type,
            target = %action.target,
            id = %action.id,
            "sending action"
        );

        match self.post::<ActionResponse>("action", action).await {
            Err(Error::Transport(e)) if action.action_type == ACTION_RESTART => {
                info!(error = %e, "controller dropped the connection while restarting");
                Ok(ActionResponse {
                    result_code: Some("Success".into()),
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    #[test]
    fn set_state_body_shape() {
        let mut params = BTreeMap::new();
        params.insert("dimLevel".to_string(), ActionParam::constant(42));
        let mut action =
            ActionRequest::for_capability("c0ffee", ACTION_SET_STATE, NAMESPACE_CORE, params);
        assert_eq!(action.id.len(), 32);
        action.id = "fixed".into();

        assert_json_snapshot!(action, @r###"
        {
          "id": "fixed",
          "type": "SetState",
          "namespace": "core.RWE",
          "target": "/capability/c0ffee",
          "params": {
            "dimLevel": {
              "type": "Constant",
              "value": 42
            }
          }
        }
        "###);
    }

    #[test]
    fn device_action_has_no_params() {
        let action = ActionRequest::for_device("shc1", ACTION_RESTART, NAMESPACE_CORE);
        assert_eq!(action.target, "/device/shc1");
        assert!(action.params.is_empty());
    }
}
