// ── Controller link ──
//
// What the event stream needs from the outside world: a way to open the
// socket and a way to reconcile. The production link talks to the SHC;
// tests substitute their own.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use livisi_api::websocket::{EventSocket, Frame, event_url};
use livisi_api::{ControllerGeneration, ShcClient, Token, TransportConfig};
use secrecy::SecretString;
use tracing::{debug, info};

use crate::catalog::{Snapshot, TopologyLoader};
use crate::error::CoreError;

/// A source of frames.
pub trait EventChannel: Send {
    /// Next frame; `Ok(None)` once the peer closed. Must be cancel-safe.
    fn next_frame(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, livisi_api::Error>> + Send;
}

impl EventChannel for EventSocket {
    fn next_frame(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, livisi_api::Error>> + Send {
        EventSocket::next_frame(self)
    }
}

/// Opens event channels and reconciles state for the stream task.
pub trait ControllerLink: Send + Sync + 'static {
    type Channel: EventChannel;

    /// Open a fresh event channel, re-authenticating if needed.
    fn open(&self) -> impl Future<Output = Result<Self::Channel, CoreError>> + Send;

    /// Reload topology and values.
    fn reload(&self) -> impl Future<Output = Result<Snapshot, CoreError>> + Send;
}

// ── ShcLink ──────────────────────────────────────────────────────────

/// [`ControllerLink`] backed by a live SHC client.
pub struct ShcLink {
    client: Arc<ShcClient>,
    password: SecretString,
    transport: TransportConfig,
    ping_interval: Duration,
    generation: Mutex<ControllerGeneration>,
}

impl ShcLink {
    pub fn new(
        client: Arc<ShcClient>,
        password: SecretString,
        transport: TransportConfig,
        ping_interval: Duration,
        generation: ControllerGeneration,
    ) -> Self {
        Self {
            client,
            password,
            transport,
            ping_interval,
            generation: Mutex::new(generation),
        }
    }

    fn generation(&self) -> ControllerGeneration {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_generation(&self, generation: ControllerGeneration) {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner) = generation;
    }

    /// A valid token, logging in again if the session gave up.
    async fn token(&self) -> Result<Arc<Token>, CoreError> {
        match self.client.session().ensure_valid().await {
            Ok(token) => Ok(token),
            Err(livisi_api::Error::SessionExpired { reason }) => {
                info!(%reason, "session expired, logging in again");
                Ok(self.client.session().login(&self.password).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl ControllerLink for ShcLink {
    type Channel = EventSocket;

    async fn open(&self) -> Result<EventSocket, CoreError> {
        let token = self.token().await?;

        if self.generation() == ControllerGeneration::Unknown {
            let status = self.client.get_status().await?;
            self.set_generation(status.generation());
        }

        let url = event_url(self.client.base_url(), self.generation(), &token)?;
        debug!(generation = ?self.generation(), "opening event socket");
        Ok(EventSocket::connect(&url, &self.transport, self.ping_interval).await?)
    }

    async fn reload(&self) -> Result<Snapshot, CoreError> {
        // Make sure an expired session is re-established first.
        self.token().await?;
        let snapshot = TopologyLoader::new(&self.client).reconcile().await?;
        self.set_generation(snapshot.catalog.generation());
        Ok(snapshot)
    }
}
