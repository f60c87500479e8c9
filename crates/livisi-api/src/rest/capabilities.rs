// Capability endpoints

use crate::error::Error;
use crate::rest::client::ShcClient;
use crate::rest::models::{RawCapability, RawState};

impl ShcClient {
    /// List all capabilities of all devices.
    ///
    /// `GET /capability`
    pub async fn list_capabilities(&self) -> Result<Vec<RawCapability>, Error> {
        self.get("capability").await
    }

    /// Current property values of one capability.
    ///
    /// `GET /capability/{id}/state` returns `{prop: {value, lastChanged}}`.
    pub async fn get_capability_state(&self, capability_id: &str) -> Result<RawState, Error> {
        self.get(&format!("capability/{capability_id}/state")).await
    }
}
