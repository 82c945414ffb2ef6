//! Deployment model
//!
//! Descriptors identify what is deployed and where; the remaining types are
//! the values exchanged between the pipeline stages of one region run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of the deployable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub version: String,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Deployment environment (e.g. stage, prod)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub name: String,

    /// Stack definition used for every region without its own override
    pub stack_definition: Option<PathBuf>,

    /// Per-region stack definition overrides
    pub region_stack_definitions: BTreeMap<String, PathBuf>,

    /// Secrets file staged next to the service payload
    pub secrets_path: Option<PathBuf>,
}

impl EnvironmentDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Override template for `region`, if any.
    ///
    /// A region-specific definition wins over the environment-wide one.
    pub fn stack_definition_path(&self, region: &str) -> Option<&Path> {
        self.region_stack_definitions
            .get(region)
            .or(self.stack_definition.as_ref())
            .map(PathBuf::as_path)
    }
}

/// Target region of one provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDescriptor {
    pub name: String,

    /// Destination bucket for payloads, secrets and templates
    pub bucket: String,

    /// KMS key used for server-side encryption of the template
    pub sse_kms_key_id: Option<String>,
}

impl RegionDescriptor {
    pub fn new(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
            sse_kms_key_id: None,
        }
    }

    pub fn with_sse_kms_key(mut self, key_id: impl Into<String>) -> Self {
        self.sse_kms_key_id = Some(key_id.into());
        self
    }
}

/// Opaque identifier returned by the provisioning API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackId(String);

impl StackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a create/update call needs to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOperationInput {
    pub environment: String,
    pub region: String,
    pub secrets_key: String,
    pub secrets_location: String,
    pub template_url: String,
}

/// Caller-owned record, written only when a region run succeeds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionProvisioningResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<StackId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_override_wins() {
        let mut env = EnvironmentDescriptor::new("prod");
        env.stack_definition = Some(PathBuf::from("stack.json"));
        env.region_stack_definitions
            .insert("us-west-2".to_string(), PathBuf::from("stack-usw2.json"));

        assert_eq!(
            env.stack_definition_path("us-west-2"),
            Some(Path::new("stack-usw2.json"))
        );
        assert_eq!(
            env.stack_definition_path("us-east-1"),
            Some(Path::new("stack.json"))
        );
    }

    #[test]
    fn test_no_override() {
        let env = EnvironmentDescriptor::new("stage");
        assert!(env.stack_definition_path("us-east-1").is_none());
    }

    #[test]
    fn test_result_serializes_stack_id_only_when_set() {
        let empty = RegionProvisioningResult::default();
        assert_eq!(serde_json::to_string(&empty).unwrap(), "{}");

        let done = RegionProvisioningResult {
            stack_id: Some(StackId::new("stack-123")),
        };
        assert_eq!(
            serde_json::to_string(&done).unwrap(),
            r#"{"stack_id":"stack-123"}"#
        );
    }
}
