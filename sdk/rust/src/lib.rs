//! Client for the gateway registry HTTP API.

pub mod client;

pub use client::{ClientError, PublishedSdl, RegistryClient};
