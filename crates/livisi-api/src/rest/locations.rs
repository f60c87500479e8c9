use crate::error::Error;
use crate::rest::client::ShcClient;
use crate::rest::models::RawLocation;

impl ShcClient {
    /// List all rooms.
    ///
    /// `GET /location`
    pub async fn list_locations(&self) -> Result<Vec<RawLocation>, Error> {
        self.get("location").await
    }
}
