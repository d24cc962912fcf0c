//! Policy attachment subsystem.
//!
//! # Data Flow
//! ```text
//! update cycle (inside the serializer slot):
//!     attachments.rs stage(previous, next)
//!         → compiler.rs compile(metadata, source) → ScratchArea
//!     repository commit
//!     attachments.rs persist()  (saves, then deletes)
//!     attachments.rs cleanup()  (always)
//!
//! periodic / on demand:
//!     reconcile.rs sweep → regenerate missing, remove orphaned
//! ```
//!
//! # Design Decisions
//! - Compilers are looked up by policy type; a type without a compiler has no attachment
//! - Persistence is at-least-once; the reconciliation sweep closes the crash gap

pub mod attachments;
pub mod compiler;
pub mod reconcile;

pub use attachments::{AttachmentBatch, AttachmentState, GeneratedAttachment, PolicyAttachmentManager, StagedDelete};
pub use compiler::{CompilerError, OpaCompiler, PolicyCompiler, ScratchArea};
pub use reconcile::{reconcile_attachments, ReconcileReport};
