//! Validation subsystem.
//!
//! # Data Flow
//! ```text
//! candidate ResourceGroup
//!     → structural checks   (duplicate keys, metadata charset, required fields)
//!     → referential checks  (policy query targets, upstream credential authorities)
//!     → schema merge        (sdl.rs parse → merge.rs union → print.rs)
//!     → Ok(()) | RegistryError::{Validation, Schema}
//! ```
//!
//! # Design Decisions
//! - Structural and referential problems are collected, not short-circuited
//! - The schema merge runs only on a structurally valid candidate
//! - The sync pipeline calls the same `merge_and_print`, so what validates
//!   is exactly what gets published

use std::collections::{HashMap, HashSet};

use crate::error::{RegistryError, ValidationError};
use crate::resources::{
    ClientCredentials, Policy, PolicyQuery, Resource, ResourceGroup, ResourceMetadata, Upstream,
    UpstreamAuth, UpstreamClientCredentials,
};

pub mod merge;
pub mod print;
pub mod sdl;

pub use merge::{merge_and_print, merge_fragments};

/// Validate a candidate aggregate. Returns every structural problem at once.
pub fn validate_resource_group(candidate: &ResourceGroup) -> Result<(), RegistryError> {
    let mut errors = Vec::new();

    check_keys(&candidate.schemas, &mut errors);
    check_keys(&candidate.upstreams, &mut errors);
    check_keys(&candidate.upstream_client_credentials, &mut errors);
    check_keys(&candidate.policies, &mut errors);

    for upstream in &candidate.upstreams {
        check_upstream(upstream, candidate, &mut errors);
    }
    for credentials in &candidate.upstream_client_credentials {
        let ClientCredentials::ActiveDirectory { active_directory } = &credentials.credentials;
        let missing: Vec<&str> = [
            ("authority", &active_directory.authority),
            ("clientId", &active_directory.client_id),
            ("clientSecret", &active_directory.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            errors.push(ValidationError::new(
                UpstreamClientCredentials::CATEGORY,
                &credentials.metadata,
                format!("missing {}", missing.join(", ")),
            ));
        }
    }
    for policy in &candidate.policies {
        check_policy(policy, candidate, &mut errors);
    }

    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), "Candidate rejected by structural validation");
        return Err(RegistryError::Validation(errors));
    }

    merge_and_print(&candidate.schema_fragments())?;
    Ok(())
}

/// Metadata parts name attachment files, so they are restricted to `[A-Za-z0-9_-]+`.
pub fn is_valid_identifier(part: &str) -> bool {
    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn check_keys<R: Resource>(items: &[R], errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for item in items {
        let key = item.metadata();
        for (label, part) in [("namespace", &key.namespace), ("name", &key.name)] {
            if !is_valid_identifier(part) {
                errors.push(ValidationError::new(
                    R::CATEGORY,
                    key,
                    format!("{} must be non-empty and contain only ASCII letters, digits, '_' or '-'", label),
                ));
            }
        }
        if !seen.insert(key) && reported.insert(key) {
            errors.push(ValidationError::new(R::CATEGORY, key, "duplicate key"));
        }
    }
}

fn check_upstream(upstream: &Upstream, candidate: &ResourceGroup, errors: &mut Vec<ValidationError>) {
    let host = upstream.host.trim();
    if host.is_empty() || upstream.host.chars().any(char::is_whitespace) {
        errors.push(ValidationError::new(
            Upstream::CATEGORY,
            &upstream.metadata,
            "host must be non-empty and contain no whitespace",
        ));
    }

    let UpstreamAuth::ActiveDirectory { active_directory } = &upstream.auth;
    if active_directory.authority.trim().is_empty() || active_directory.resource.trim().is_empty() {
        errors.push(ValidationError::new(
            Upstream::CATEGORY,
            &upstream.metadata,
            "activeDirectory authority and resource are required",
        ));
        return;
    }

    let authority = upstream.auth.authority();
    let has_credentials = candidate
        .upstream_client_credentials
        .iter()
        .any(|c| c.credentials.auth_type() == upstream.auth.auth_type() && c.credentials.authority() == authority);
    if !has_credentials {
        errors.push(ValidationError::new(
            Upstream::CATEGORY,
            &upstream.metadata,
            format!("no upstream client credentials for authority `{}`", authority),
        ));
    }
}

fn check_policy(policy: &Policy, candidate: &ResourceGroup, errors: &mut Vec<ValidationError>) {
    if policy.code.trim().is_empty() {
        errors.push(ValidationError::new(Policy::CATEGORY, &policy.metadata, "code is empty"));
    }

    let Some(queries) = &policy.queries else {
        return;
    };

    let mut param_names: HashMap<&str, usize> = HashMap::new();
    for query in queries {
        *param_names.entry(query.param_name()).or_default() += 1;

        match query {
            PolicyQuery::Graphql { graphql, .. } if graphql.query.trim().is_empty() => {
                errors.push(ValidationError::new(
                    Policy::CATEGORY,
                    &policy.metadata,
                    format!("graphql query `{}` is empty", query.param_name()),
                ));
            }
            PolicyQuery::Policy { policy: reference, .. } => {
                let target = ResourceMetadata::new(policy.metadata.namespace.clone(), reference.policy_name.clone());
                if !candidate.policies.iter().any(|p| p.metadata == target) {
                    errors.push(ValidationError::new(
                        Policy::CATEGORY,
                        &policy.metadata,
                        format!("query `{}` references unknown policy `{}`", query.param_name(), target),
                    ));
                }
            }
            PolicyQuery::Graphql { .. } => {}
        }
    }

    if param_names.contains_key("") {
        errors.push(ValidationError::new(Policy::CATEGORY, &policy.metadata, "query paramName is empty"));
    }
    let mut duplicated: Vec<&str> = param_names
        .into_iter()
        .filter(|(name, count)| !name.is_empty() && *count > 1)
        .map(|(name, _)| name)
        .collect();
    duplicated.sort_unstable();
    for name in duplicated {
        errors.push(ValidationError::new(
            Policy::CATEGORY,
            &policy.metadata,
            format!("query paramName `{}` is used more than once", name),
        ));
    }
}
