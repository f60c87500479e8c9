// Controller status endpoint

use tracing::debug;

use crate::error::Error;
use crate::rest::client::ShcClient;
use crate::rest::models::ShcStatus;

impl ShcClient {
    /// Controller type, serial number and OS version.
    ///
    /// `GET /status`
    pub async fn get_status(&self) -> Result<ShcStatus, Error> {
        let status: ShcStatus = self.get("status").await?;
        debug!(
            controller_type = status.controller_type.as_deref().unwrap_or("-"),
            os_version = status.os_version.as_deref().unwrap_or("-"),
            "controller status"
        );
        Ok(status)
    }
}
