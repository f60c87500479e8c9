// Device endpoints

use serde_json::{Map, Value};

use crate::error::Error;
use crate::rest::client::ShcClient;
use crate::rest::models::RawDevice;

impl ShcClient {
    /// List all devices paired with the controller, the controller included.
    ///
    /// `GET /device`
    pub async fn list_devices(&self) -> Result<Vec<RawDevice>, Error> {
        self.get("device").await
    }

    /// Raw state of a device.
    ///
    /// `GET /device/{id}/state`. Classic controllers wrap the properties in
    /// a `state` object; this unwraps it so both generations look alike.
    pub async fn get_device_state(&self, device_id: &str) -> Result<Map<String, Value>, Error> {
        let mut body: Map<String, Value> = self.get(&format!("device/{device_id}/state")).await?;
        match body.remove("state") {
            Some(Value::Object(inner)) => Ok(inner),
            Some(other) => {
                body.insert("state".into(), other);
                Ok(body)
            }
            None => Ok(body),
        }
    }
}
