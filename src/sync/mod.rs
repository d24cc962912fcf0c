//! Schema sync subsystem.
//!
//! # Data Flow
//! ```text
//! repository commits ─┐
//! poll fetch_latest ──┼─→ feed.rs (ChangeFeed, newer versions only)
//! file watch (fs) ────┘        │ mpsc<ChangeSnapshot>
//!                              ▼
//!                    pipeline.rs (fragments → merge → canonical SDL)
//!                              │ publish (dedupe on text)
//!                              ▼
//!                    broadcast.rs (latest value + live channel)
//!                              │
//!                              ▼
//!           HTTP GET /api/v1/schema, websocket subscribers
//! ```
//!
//! # Design Decisions
//! - The pipeline merges with the same routine the validator uses
//! - Backpressure is resolved by replacing the value, never by queuing

pub mod broadcast;
pub mod feed;
pub mod pipeline;

pub use broadcast::{PublishedSchema, SchemaBroadcast, SchemaSubscription};
pub use feed::ChangeFeed;
pub use pipeline::{SchemaSyncPipeline, SyncOutcome};
