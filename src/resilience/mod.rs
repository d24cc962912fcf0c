//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Registry::update
//!     → commit loses the compare-and-set (VersionConflict)
//!     → backoff.rs (delay grows with the attempt, jittered, capped)
//!     → the full fetch → validate → stage → commit cycle runs again
//!     → after `retries.max_attempts` the conflict reaches the caller
//! ```
//!
//! # Design Decisions
//! - Only version conflicts are retried; every other error is final
//! - Store and compiler timeouts belong to their clients, not to this module

pub mod backoff;
