//! HTTP surface of the registry.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, operation and schema handlers)
//!     → request.rs (request ID, trace span)
//!     → registry::Registry / sync::SchemaBroadcast
//!     → response.rs ({success, error} envelope, status mapping)
//!     → websocket.rs (live schema stream)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use response::{ApiError, ApiResponse};
pub use server::{AppState, HttpServer, X_SCHEMA_SEQUENCE};
