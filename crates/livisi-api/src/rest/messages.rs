// Controller messages (battery warnings, updates, unreachable devices)

use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::rest::client::ShcClient;
use crate::rest::models::RawMessage;

impl ShcClient {
    /// List pending controller messages.
    ///
    /// `GET /message`. Entries that are not message objects are skipped.
    pub async fn list_messages(&self) -> Result<Vec<RawMessage>, Error> {
        let raw: Vec<Value> = self.get("message").await?;
        Ok(raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(error = %e, "skipping invalid controller message");
                    None
                }
            })
            .collect())
    }
}
