//! Secrets staging
//!
//! Secrets are staged next to the payload they belong to:
//! `porter-deployment/<service>/<environment>/<version>/<payload digest>.secrets`.
//! Unlike payloads they are keyed by the payload digest, not their own
//! content, so they are always uploaded.

use crate::error::{CloudError, Result};
use crate::provider::{BlobStore, ObjectOptions, SecretsStager, StagedSecrets, UploadRequest};
use async_trait::async_trait;
use bytes::Bytes;
use porter_core::{Digest, KeyClass, RegionDescriptor, ServiceDescriptor, StorageNamespace};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

const SECRETS_EXTENSION: &str = "secrets";

/// Stages a local secrets file into the region's bucket
pub struct BlobSecretsStager {
    store: Arc<dyn BlobStore>,
    source: Option<PathBuf>,
    namespace: StorageNamespace,
    bucket: String,
    options: ObjectOptions,
}

impl BlobSecretsStager {
    pub fn new(
        store: Arc<dyn BlobStore>,
        source: Option<PathBuf>,
        service: &ServiceDescriptor,
        environment: &str,
        region: &RegionDescriptor,
    ) -> Self {
        Self {
            store,
            source,
            namespace: StorageNamespace::new(KeyClass::Deployment, service, environment),
            bucket: region.bucket.clone(),
            options: ObjectOptions::secrets(region.sse_kms_key_id.clone()),
        }
    }
}

#[async_trait]
impl SecretsStager for BlobSecretsStager {
    async fn stage_secrets(&self, payload_digest: &Digest) -> Result<StagedSecrets> {
        let Some(source) = &self.source else {
            debug!("No secrets configured");
            return Ok(StagedSecrets::default());
        };

        let body = tokio::fs::read(source).await.map_err(|e| {
            error!(path = %source.display(), error = %e, "Failed to read secrets");
            CloudError::Secrets(format!("{}: {}", source.display(), e))
        })?;

        let key = self
            .namespace
            .key_for(payload_digest, Some(SECRETS_EXTENSION));
        info!(bucket = %self.bucket, key = %key, "Uploading secrets");

        self.store
            .upload(UploadRequest {
                bucket: &self.bucket,
                key: key.as_str(),
                body: Bytes::from(body),
                options: &self.options,
            })
            .await
            .map_err(|e| {
                error!(bucket = %self.bucket, key = %key, error = %e, "Secrets upload failure");
                CloudError::Secrets(e.to_string())
            })?;

        Ok(StagedSecrets {
            key: key.to_string(),
            location: self.bucket.clone(),
        })
    }
}
