//! Resource definitions.
//!
//! All types derive Serde traits with camelCase field names so the stored
//! aggregate and the HTTP inputs share one wire shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity key of a resource, unique within its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub namespace: String,
    pub name: String,
}

impl ResourceMetadata {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The four resource categories of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceCategory {
    Schema,
    Upstream,
    UpstreamClientCredentials,
    Policy,
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceCategory::Schema => "schema",
            ResourceCategory::Upstream => "upstream",
            ResourceCategory::UpstreamClientCredentials => "upstream client credentials",
            ResourceCategory::Policy => "policy",
        };
        f.write_str(label)
    }
}

/// Common access to the identity of a resource.
pub trait Resource {
    const CATEGORY: ResourceCategory;

    fn metadata(&self) -> &ResourceMetadata;
}

/// A schema fragment contributed by one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub metadata: ResourceMetadata,
    pub schema: String,
}

impl Resource for Schema {
    const CATEGORY: ResourceCategory = ResourceCategory::Schema;

    fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }
}

/// Supported upstream authentication types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    ActiveDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDirectoryAuth {
    pub authority: String,
    pub resource: String,
}

/// How the gateway authenticates against an upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamAuth {
    ActiveDirectory {
        #[serde(rename = "activeDirectory")]
        active_directory: ActiveDirectoryAuth,
    },
}

impl UpstreamAuth {
    pub fn auth_type(&self) -> AuthType {
        match self {
            UpstreamAuth::ActiveDirectory { .. } => AuthType::ActiveDirectory,
        }
    }

    pub fn authority(&self) -> &str {
        match self {
            UpstreamAuth::ActiveDirectory { active_directory } => &active_directory.authority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub metadata: ResourceMetadata,
    pub host: String,
    pub auth: UpstreamAuth,
}

impl Resource for Upstream {
    const CATEGORY: ResourceCategory = ResourceCategory::Upstream;

    fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDirectoryCredentials {
    pub authority: String,
    pub client_id: String,
    pub client_secret: String,
}

// Keeps the secret out of every `{:?}` in logs and error chains.
impl fmt::Debug for ActiveDirectoryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveDirectoryCredentials")
            .field("authority", &self.authority)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Credential material, discriminated by `authType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "authType")]
pub enum ClientCredentials {
    ActiveDirectory {
        #[serde(rename = "activeDirectory")]
        active_directory: ActiveDirectoryCredentials,
    },
}

impl ClientCredentials {
    pub fn auth_type(&self) -> AuthType {
        match self {
            ClientCredentials::ActiveDirectory { .. } => AuthType::ActiveDirectory,
        }
    }

    pub fn authority(&self) -> &str {
        match self {
            ClientCredentials::ActiveDirectory { active_directory } => &active_directory.authority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamClientCredentials {
    pub metadata: ResourceMetadata,
    #[serde(flatten)]
    pub credentials: ClientCredentials,
}

impl Resource for UpstreamClientCredentials {
    const CATEGORY: ResourceCategory = ResourceCategory::UpstreamClientCredentials;

    fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }
}

/// Policy engines known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Opa,
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyType::Opa => f.write_str("opa"),
        }
    }
}

pub type PolicyArgs = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlQuery {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReference {
    pub policy_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<PolicyArgs>,
}

/// An auxiliary query whose result is exposed to the policy under `paramName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PolicyQuery {
    Graphql {
        #[serde(rename = "paramName")]
        param_name: String,
        graphql: GraphqlQuery,
    },
    Policy {
        #[serde(rename = "paramName")]
        param_name: String,
        policy: PolicyReference,
    },
}

impl PolicyQuery {
    pub fn param_name(&self) -> &str {
        match self {
            PolicyQuery::Graphql { param_name, .. } | PolicyQuery::Policy { param_name, .. } => {
                param_name
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub metadata: ResourceMetadata,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<PolicyArgs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<PolicyQuery>>,
}

impl Resource for Policy {
    const CATEGORY: ResourceCategory = ResourceCategory::Policy;

    fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }
}

/// The versioned configuration aggregate ("resource group").
///
/// Also used as the upsert half of a patch: a missing category means
/// "no change" for that category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceGroup {
    pub schemas: Vec<Schema>,
    pub upstreams: Vec<Upstream>,
    pub upstream_client_credentials: Vec<UpstreamClientCredentials>,
    pub policies: Vec<Policy>,
}

impl ResourceGroup {
    /// Per-source schema fragments keyed by `namespace/name`.
    ///
    /// The map is ordered, which fixes the merge order of fragments.
    pub fn schema_fragments(&self) -> BTreeMap<String, String> {
        self.schemas
            .iter()
            .map(|s| (s.metadata.to_string(), s.schema.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.upstreams.is_empty()
            && self.upstream_client_credentials.is_empty()
            && self.policies.is_empty()
    }
}
