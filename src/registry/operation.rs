//! Operation names and input decoding.
//!
//! Names follow `<verb><Category>`: `validateSchemas`, `updateResourceGroup`,
//! `deletePolicies`, and so on.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::resources::{
    Policy, ResourceGroup, ResourceGroupPatch, ResourceMetadata, ResourceRemovals, Schema, Upstream,
    UpstreamClientCredentials,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Validate,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    ResourceGroup,
    Schemas,
    Upstreams,
    UpstreamClientCredentials,
    Policies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    pub verb: Verb,
    pub target: Target,
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("unknown operation `{0}`")]
    Unknown(String),

    #[error("invalid input for `{operation}`: {source}")]
    InvalidInput {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },
}

const VERBS: [(&str, Verb); 3] = [
    ("validate", Verb::Validate),
    ("update", Verb::Update),
    ("delete", Verb::Delete),
];

const TARGETS: [(&str, Target); 5] = [
    ("ResourceGroup", Target::ResourceGroup),
    ("Schemas", Target::Schemas),
    ("Upstreams", Target::Upstreams),
    ("UpstreamClientCredentials", Target::UpstreamClientCredentials),
    ("Policies", Target::Policies),
];

impl Operation {
    pub fn new(verb: Verb, target: Target) -> Self {
        Self { verb, target }
    }

    /// Mutating operations go through the update serializer.
    pub fn is_mutation(&self) -> bool {
        self.verb != Verb::Validate
    }

    /// Decode the `input` of a request into a patch.
    pub fn parse_input(&self, input: Value) -> Result<ResourceGroupPatch, OperationError> {
        let patch = match self.verb {
            Verb::Validate | Verb::Update => ResourceGroupPatch::upsert(self.decode_upserts(input)?),
            Verb::Delete => ResourceGroupPatch::remove(self.decode_removals(input)?),
        };
        Ok(patch)
    }

    fn decode<T: DeserializeOwned>(&self, input: Value) -> Result<T, OperationError> {
        serde_json::from_value(input).map_err(|source| OperationError::InvalidInput {
            operation: *self,
            source,
        })
    }

    fn decode_upserts(&self, input: Value) -> Result<ResourceGroup, OperationError> {
        let mut group = ResourceGroup::default();
        match self.target {
            Target::ResourceGroup => group = self.decode(input)?,
            Target::Schemas => group.schemas = self.decode::<Vec<Schema>>(input)?,
            Target::Upstreams => group.upstreams = self.decode::<Vec<Upstream>>(input)?,
            Target::UpstreamClientCredentials => {
                group.upstream_client_credentials = self.decode::<Vec<UpstreamClientCredentials>>(input)?
            }
            Target::Policies => group.policies = self.decode::<Vec<Policy>>(input)?,
        }
        Ok(group)
    }

    fn decode_removals(&self, input: Value) -> Result<ResourceRemovals, OperationError> {
        let mut removals = ResourceRemovals::default();
        match self.target {
            Target::ResourceGroup => removals = self.decode(input)?,
            Target::Schemas => removals.schemas = self.decode::<Vec<ResourceMetadata>>(input)?,
            Target::Upstreams => removals.upstreams = self.decode::<Vec<ResourceMetadata>>(input)?,
            Target::UpstreamClientCredentials => {
                removals.upstream_client_credentials = self.decode::<Vec<ResourceMetadata>>(input)?
            }
            Target::Policies => removals.policies = self.decode::<Vec<ResourceMetadata>>(input)?,
        }
        Ok(removals)
    }
}

impl FromStr for Operation {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VERBS
            .iter()
            .find_map(|(prefix, verb)| {
                let rest = s.strip_prefix(prefix)?;
                TARGETS
                    .iter()
                    .find(|(name, _)| *name == rest)
                    .map(|(_, target)| Operation::new(*verb, *target))
            })
            .ok_or_else(|| OperationError::Unknown(s.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = VERBS.iter().find(|(_, v)| *v == self.verb).map(|(n, _)| *n).unwrap_or_default();
        let target = TARGETS
            .iter()
            .find(|(_, t)| *t == self.target)
            .map(|(n, _)| *n)
            .unwrap_or_default();
        write!(f, "{}{}", verb, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_round_trip() {
        for (verb_name, verb) in VERBS {
            for (target_name, target) in TARGETS {
                let name = format!("{}{}", verb_name, target_name);
                let op: Operation = name.parse().unwrap();
                assert_eq!(op, Operation::new(verb, target));
                assert_eq!(op.to_string(), name);
            }
        }
        assert!("updateNothing".parse::<Operation>().is_err());
        assert!("UpdateSchemas".parse::<Operation>().is_err());
    }

    #[test]
    fn test_parse_category_input() {
        let op: Operation = "updateSchemas".parse().unwrap();
        let patch = op
            .parse_input(json!([{ "metadata": { "namespace": "a", "name": "s" }, "schema": "type Query { a: Int }" }]))
            .unwrap();
        assert_eq!(patch.upserts.schemas.len(), 1);
        assert!(patch.removals.is_empty());
    }

    #[test]
    fn test_parse_delete_input() {
        let op: Operation = "deletePolicies".parse().unwrap();
        let patch = op
            .parse_input(json!([{ "namespace": "ns", "name": "p" }]))
            .unwrap();
        assert_eq!(patch.removals.policies, vec![ResourceMetadata::new("ns", "p")]);
        assert!(op.is_mutation());

        let op: Operation = "deleteResourceGroup".parse().unwrap();
        let patch = op
            .parse_input(json!({ "schemas": [{ "namespace": "ns", "name": "s" }] }))
            .unwrap();
        assert_eq!(patch.removals.schemas.len(), 1);
    }

    #[test]
    fn test_invalid_input() {
        let op: Operation = "validatePolicies".parse().unwrap();
        let err = op.parse_input(json!({ "not": "a list" })).unwrap_err();
        assert!(matches!(err, OperationError::InvalidInput { .. }));
        assert!(!op.is_mutation());
    }
}
