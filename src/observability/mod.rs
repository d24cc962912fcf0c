//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`version`, `namespace`, `name`, `filename`, `sequence`) over formatted strings
//! - Request ID flows through the HTTP trace span
//! - Client secrets never reach a log line

pub mod logging;
pub mod metrics;
