//! Storage key scheme
//!
//! ```text
//! <prefix>/<service>/<environment>/<version>/<digest>[.ext]
//! ```
//!
//! `<prefix>` is chosen by [`KeyClass`], so a key always belongs to exactly
//! one namespace.

use crate::digest::Digest;
use crate::model::ServiceDescriptor;
use std::fmt;

/// Namespace class of a staged object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    /// Serialized CloudFormation templates
    Template,
    /// Service payloads and the secrets staged next to them
    Deployment,
}

impl KeyClass {
    pub fn prefix(self) -> &'static str {
        match self {
            KeyClass::Template => "porter-template",
            KeyClass::Deployment => "porter-deployment",
        }
    }
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Key root shared by every object of one service/environment/version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageNamespace {
    class: KeyClass,
    service_name: String,
    environment: String,
    service_version: String,
}

impl StorageNamespace {
    pub fn new(
        class: KeyClass,
        service: &ServiceDescriptor,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            class,
            service_name: service.name.clone(),
            environment: environment.into(),
            service_version: service.version.clone(),
        }
    }

    pub fn class(&self) -> KeyClass {
        self.class
    }

    /// `<prefix>/<service>/<environment>/<version>`
    pub fn root(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.class.prefix(),
            self.service_name,
            self.environment,
            self.service_version
        )
    }

    /// Content-addressed key for `digest`, with an optional extension
    pub fn key_for(&self, digest: &Digest, extension: Option<&str>) -> StorageKey {
        match extension {
            Some(ext) => StorageKey(format!("{}/{}.{}", self.root(), digest, ext)),
            None => StorageKey(format!("{}/{}", self.root(), digest)),
        }
    }
}

/// Fully derived object key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
