//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build store → repository → compiler → registry → schema broadcast
//!     → spawn change feed, sync pipeline, reconciliation loop → serve HTTP
//!
//! Shutdown (shutdown.rs):
//!     Trigger → feed and reconciliation stop → server drains → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Dependencies are built once and passed down; no globals

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_components, run, Components, StartupError};
