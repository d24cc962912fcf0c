//! Gateway registry: the control plane of a federated query gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!   operators     │                     GATEWAY REGISTRY                      │
//!   ──────────────┼─▶ http ──▶ registry (serializer slot)                     │
//!   POST /api/v1  │              │ fetch → patch → validation → policy stage  │
//!                 │              ▼                                            │
//!                 │          repository ──▶ storage (fs | object | memory)    │
//!                 │              │ commit            ▲                        │
//!                 │              ▼                   │ attachments            │
//!                 │            sync: feed ──▶ pipeline ──▶ broadcast          │
//!   gateways      │                                        │                  │
//!   ◀─────────────┼── GET /api/v1/schema, websocket ◀──────┘                  │
//!                 │                                                           │
//!                 │  config · observability · resilience · lifecycle · admin  │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod error;
pub mod policy;
pub mod registry;
pub mod repository;
pub mod resources;
pub mod storage;
pub mod sync;
pub mod validation;

// Surfaces
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::RegistryConfig;
pub use error::RegistryError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::Registry;
