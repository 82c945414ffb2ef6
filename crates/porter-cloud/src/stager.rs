//! Content-addressed staging
//!
//! A blob is stored under a key derived from its own digest, so staging the
//! same bytes twice uploads them once.

use crate::error::{CloudError, Result};
use crate::provider::{BlobStore, ObjectOptions, ProbeError, ProbeOutcome, UploadRequest};
use bytes::Bytes;
use porter_core::{Digest, StorageKey, StorageNamespace};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of staging one blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    pub key: StorageKey,
    pub digest: Digest,

    /// False when an identical object was already present
    pub uploaded: bool,
}

pub struct ContentAddressedStager {
    store: Arc<dyn BlobStore>,
}

impl ContentAddressedStager {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub async fn stage(
        &self,
        body: Bytes,
        bucket: &str,
        namespace: &StorageNamespace,
        extension: Option<&str>,
        options: &ObjectOptions,
    ) -> Result<StagedObject> {
        let digest = Digest::of(&body);
        self.stage_digested(body, digest, bucket, namespace, extension, options)
            .await
    }

    /// Stage `body` whose digest the caller already computed while reading it
    pub async fn stage_digested(
        &self,
        body: Bytes,
        digest: Digest,
        bucket: &str,
        namespace: &StorageNamespace,
        extension: Option<&str>,
        options: &ObjectOptions,
    ) -> Result<StagedObject> {
        let key = namespace.key_for(&digest, extension);

        match self.store.probe(bucket, key.as_str()).await {
            Ok(ProbeOutcome::Present { content_length }) if content_length > 0 => {
                info!(bucket, key = %key, "Object already staged");
                return Ok(StagedObject {
                    key,
                    digest,
                    uploaded: false,
                });
            }
            Ok(ProbeOutcome::Present { .. }) => {
                debug!(bucket, key = %key, "Existing object is empty, uploading again");
            }
            Ok(ProbeOutcome::NotFound) => {
                debug!(bucket, key = %key, "Object not staged yet");
            }
            Err(ProbeError::Forbidden(message)) => {
                error!(bucket, key = %key, error = %message, "Probe denied");
                return Err(CloudError::PermissionDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message,
                });
            }
            Err(ProbeError::Other(message)) => {
                error!(bucket, key = %key, error = %message, "Probe failed");
                return Err(CloudError::ProbeFailed {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message,
                });
            }
        }

        info!(
            bucket,
            key = %key,
            bytes = body.len(),
            store = self.store.name(),
            "Uploading"
        );
        let request = UploadRequest {
            bucket,
            key: key.as_str(),
            body,
            options,
        };
        if let Err(e) = self.store.upload(request).await {
            error!(bucket, key = %key, error = %e, "Upload failure");
            return Err(CloudError::UploadFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            });
        }

        Ok(StagedObject {
            key,
            digest,
            uploaded: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBlobStore;
    use porter_core::{KeyClass, ServiceDescriptor};

    fn namespace() -> StorageNamespace {
        StorageNamespace::new(
            KeyClass::Deployment,
            &ServiceDescriptor::new("svc", "1.0"),
            "prod",
        )
    }

    async fn stage(stager: &ContentAddressedStager, body: &'static [u8]) -> Result<StagedObject> {
        stager
            .stage(
                Bytes::from_static(body),
                "bucket",
                &namespace(),
                Some("tar"),
                &ObjectOptions::payload(),
            )
            .await
    }

    #[tokio::test]
    async fn test_scenario_key_and_idempotence() {
        let store = Arc::new(MemoryBlobStore::new());
        let stager = ContentAddressedStager::new(store.clone());

        let first = stage(&stager, b"b").await.unwrap();
        let expected = format!("porter-deployment/svc/prod/1.0/{}.tar", Digest::of(b"b"));
        assert_eq!(first.key.as_str(), expected);
        assert!(first.uploaded);
        assert_eq!(store.upload_count(), 1);

        let second = stage(&stager, b"b").await.unwrap();
        assert_eq!(second.key, first.key);
        assert!(!second.uploaded);
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_key_independent_of_prior_state() {
        let warm = Arc::new(MemoryBlobStore::new());
        let warm_stager = ContentAddressedStager::new(warm.clone());
        stage(&warm_stager, b"other").await.unwrap();
        let warm_key = stage(&warm_stager, b"payload").await.unwrap().key;

        let cold_stager = ContentAddressedStager::new(Arc::new(MemoryBlobStore::new()));
        let cold_key = stage(&cold_stager, b"payload").await.unwrap().key;

        assert_eq!(warm_key, cold_key);
    }

    #[tokio::test]
    async fn test_not_found_uploads() {
        let store = Arc::new(MemoryBlobStore::new());
        let stager = ContentAddressedStager::new(store.clone());
        stage(&stager, b"payload").await.unwrap();
        assert_eq!(store.upload_count(), 1);
        assert_eq!(store.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_fails_without_upload() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_probes_with(ProbeError::Forbidden("403".to_string()));
        let stager = ContentAddressedStager::new(store.clone());

        let err = stage(&stager, b"payload").await.unwrap_err();
        assert!(matches!(err, CloudError::PermissionDenied { .. }));
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_other_probe_failure_is_not_permission_error() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_probes_with(ProbeError::Other("500".to_string()));
        let stager = ContentAddressedStager::new(store.clone());

        let err = stage(&stager, b"payload").await.unwrap_err();
        assert!(matches!(err, CloudError::ProbeFailed { .. }));
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_object_is_uploaded_again() {
        let store = Arc::new(MemoryBlobStore::new());
        let key = namespace().key_for(&Digest::of(b"payload"), Some("tar"));
        store.insert("bucket", key.as_str(), Bytes::new());
        let stager = ContentAddressedStager::new(store.clone());

        let staged = stage(&stager, b"payload").await.unwrap();
        assert!(staged.uploaded);
        assert_eq!(store.get("bucket", key.as_str()).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_uploads();
        let stager = ContentAddressedStager::new(store.clone());

        let err = stage(&stager, b"payload").await.unwrap_err();
        assert!(matches!(err, CloudError::UploadFailed { .. }));
    }
}
