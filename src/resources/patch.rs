//! Patches: the requested change applied to the latest committed aggregate.
//!
//! # Responsibilities
//! - Build a new candidate aggregate from the previous one (never in place)
//! - Replace items with matching metadata, append new ones
//! - Drop removed keys, rejecting removal of keys that do not exist
//!
//! # Design Decisions
//! - Duplicate keys inside one request are carried into the candidate so the
//!   validator reports them instead of the last one silently winning

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, ValidationError};
use crate::resources::types::{Resource, ResourceGroup, ResourceMetadata};

/// Keys to remove, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceRemovals {
    pub schemas: Vec<ResourceMetadata>,
    pub upstreams: Vec<ResourceMetadata>,
    pub upstream_client_credentials: Vec<ResourceMetadata>,
    pub policies: Vec<ResourceMetadata>,
}

impl ResourceRemovals {
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.upstreams.is_empty()
            && self.upstream_client_credentials.is_empty()
            && self.policies.is_empty()
    }
}

/// A requested change: items to upsert plus keys to remove.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceGroupPatch {
    pub upserts: ResourceGroup,
    pub removals: ResourceRemovals,
}

impl ResourceGroupPatch {
    pub fn upsert(group: ResourceGroup) -> Self {
        Self {
            upserts: group,
            removals: ResourceRemovals::default(),
        }
    }

    pub fn remove(removals: ResourceRemovals) -> Self {
        Self {
            upserts: ResourceGroup::default(),
            removals,
        }
    }

    /// Produce the candidate aggregate `current + self`.
    pub fn apply(&self, current: &ResourceGroup) -> Result<ResourceGroup, RegistryError> {
        let mut problems = Vec::new();

        let candidate = ResourceGroup {
            schemas: apply_category(
                &current.schemas,
                &self.upserts.schemas,
                &self.removals.schemas,
                &mut problems,
            ),
            upstreams: apply_category(
                &current.upstreams,
                &self.upserts.upstreams,
                &self.removals.upstreams,
                &mut problems,
            ),
            upstream_client_credentials: apply_category(
                &current.upstream_client_credentials,
                &self.upserts.upstream_client_credentials,
                &self.removals.upstream_client_credentials,
                &mut problems,
            ),
            policies: apply_category(
                &current.policies,
                &self.upserts.policies,
                &self.removals.policies,
                &mut problems,
            ),
        };

        if problems.is_empty() {
            Ok(candidate)
        } else {
            Err(RegistryError::Validation(problems))
        }
    }
}

fn apply_category<T: Resource + Clone>(
    current: &[T],
    upserts: &[T],
    removals: &[ResourceMetadata],
    problems: &mut Vec<ValidationError>,
) -> Vec<T> {
    for key in removals {
        if !current.iter().any(|item| item.metadata() == key) {
            problems.push(ValidationError::new(T::CATEGORY, key, "cannot delete: no such resource"));
        }
        if upserts.iter().any(|item| item.metadata() == key) {
            problems.push(ValidationError::new(
                T::CATEGORY,
                key,
                "cannot update and delete the same resource in one request",
            ));
        }
    }

    current
        .iter()
        .filter(|item| {
            let key = item.metadata();
            !removals.contains(key) && !upserts.iter().any(|u| u.metadata() == key)
        })
        .chain(upserts.iter())
        .cloned()
        .collect()
}
