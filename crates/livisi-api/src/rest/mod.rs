// SHC REST surface: client mechanics plus one module per endpoint group.

pub mod actions;
pub mod capabilities;
pub mod client;
pub mod devices;
pub mod locations;
pub mod messages;
pub mod models;
pub mod status;

pub use client::ShcClient;
