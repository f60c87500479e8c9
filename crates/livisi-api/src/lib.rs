// livisi-api: Async Rust client for the Livisi / innogy SmartHome Controller local API

pub mod error;
pub mod rest;
pub mod session;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use rest::ShcClient;
pub use rest::models::{
    ActionParam, ActionRequest, ActionResponse, ControllerGeneration, RawCapability, RawDevice,
    RawLocation, RawMessage, RawPropertyState, RawState, ShcStatus,
};
pub use session::{SessionConfig, SessionManager, Token};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{EventSocket, Frame, RawEvent, ReconnectConfig};
