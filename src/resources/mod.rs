//! Resource model subsystem.
//!
//! # Data Flow
//! ```text
//! request input (JSON)
//!     → types.rs (Schema, Upstream, UpstreamClientCredentials, Policy)
//!     → patch.rs (upserts + removals applied to the latest aggregate)
//!     → candidate ResourceGroup
//!     → validation → repository commit
//! ```
//!
//! # Design Decisions
//! - The aggregate is a value: every update builds a new one
//! - Identity is `ResourceMetadata {namespace, name}` per category

pub mod patch;
pub mod types;

pub use patch::{ResourceGroupPatch, ResourceRemovals};
pub use types::{
    ActiveDirectoryAuth, ActiveDirectoryCredentials, AuthType, ClientCredentials, GraphqlQuery,
    Policy, PolicyArgs, PolicyQuery, PolicyReference, PolicyType, Resource, ResourceCategory,
    ResourceGroup, ResourceMetadata, Schema, Upstream, UpstreamAuth, UpstreamClientCredentials,
};
