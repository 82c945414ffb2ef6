//! Provider traits
//!
//! The pipeline talks to blob storage, the provisioning API and the secrets
//! subsystem only through these traits. `porter-cloud-aws` implements them on
//! top of S3 and CloudFormation.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use porter_core::{Digest, StackId, StackOperationInput};
use thiserror::Error;

/// Durable blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the provider name (e.g., "s3")
    fn name(&self) -> &str;

    /// Look up the object at `key` without fetching it
    async fn probe(&self, bucket: &str, key: &str) -> std::result::Result<ProbeOutcome, ProbeError>;

    /// Store `request.body` at `request.key`, overwriting whatever is there
    async fn upload(&self, request: UploadRequest<'_>) -> Result<()>;

    /// URL the provisioning API can fetch the object from
    fn object_url(&self, bucket: &str, key: &str) -> String;
}

/// What a successful probe found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Present { content_length: u64 },
    NotFound,
}

/// A probe that could not tell whether the object exists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Other(String),
}

/// Per-object upload settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectOptions {
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub storage_class: Option<String>,

    /// Encrypt with SSE-KMS using this key
    pub sse_kms_key_id: Option<String>,
}

impl ObjectOptions {
    /// Gzipped tarball of the service, rarely read after the first boot
    pub fn payload() -> Self {
        Self {
            content_type: "application/x-tar".to_string(),
            content_encoding: Some("gzip".to_string()),
            storage_class: Some("STANDARD_IA".to_string()),
            sse_kms_key_id: None,
        }
    }

    pub fn template(sse_kms_key_id: Option<String>) -> Self {
        Self {
            content_type: "application/json".to_string(),
            sse_kms_key_id,
            ..Default::default()
        }
    }

    pub fn secrets(sse_kms_key_id: Option<String>) -> Self {
        Self {
            content_type: "application/octet-stream".to_string(),
            sse_kms_key_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub body: Bytes,
    pub options: &'a ObjectOptions,
}

/// Stack create/update API
#[async_trait]
pub trait StackApi: Send + Sync {
    async fn create_stack(&self, input: &StackOperationInput) -> Result<StackId>;

    async fn update_stack(&self, input: &StackOperationInput) -> Result<StackId>;
}

/// Where the secrets for a run were staged; both fields are empty when the
/// environment has no secrets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedSecrets {
    pub key: String,
    pub location: String,
}

/// Secrets upload subsystem
#[async_trait]
pub trait SecretsStager: Send + Sync {
    /// Stage the secrets that belong to the payload with `payload_digest`
    async fn stage_secrets(&self, payload_digest: &Digest) -> Result<StagedSecrets>;
}
