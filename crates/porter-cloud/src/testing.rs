//! In-memory providers for unit tests

use crate::dispatch::StackOperation;
use crate::error::{CloudError, Result};
use crate::provider::{
    BlobStore, ProbeError, ProbeOutcome, SecretsStager, StackApi, StagedSecrets, UploadRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use porter_core::{Digest, StackId, StackOperationInput};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    uploads: Mutex<Vec<(String, String, crate::provider::ObjectOptions)>>,
    probes: AtomicUsize,
    probe_error: Mutex<Option<ProbeError>>,
    fail_uploads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, body: Bytes) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn fail_probes_with(&self, error: ProbeError) {
        *self.probe_error.lock().unwrap() = Some(error);
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// (bucket, key, options) of every upload, in order
    pub fn uploads(&self) -> Vec<(String, String, crate::provider::ObjectOptions)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn probe(
        &self,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<ProbeOutcome, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.probe_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(
            match self
                .objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
            {
                Some(body) => ProbeOutcome::Present {
                    content_length: body.len() as u64,
                },
                None => ProbeOutcome::NotFound,
            },
        )
    }

    async fn upload(&self, request: UploadRequest<'_>) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(CloudError::ApiError("connection reset".to_string()));
        }
        self.uploads.lock().unwrap().push((
            request.bucket.to_string(),
            request.key.to_string(),
            request.options.clone(),
        ));
        self.insert(request.bucket, request.key, request.body);
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("mem://{}/{}", bucket, key)
    }
}

pub struct RecordingStackApi {
    outcome: std::result::Result<String, String>,
    calls: Mutex<Vec<(StackOperation, StackOperationInput)>>,
}

impl RecordingStackApi {
    pub fn returning(stack_id: &str) -> Self {
        Self {
            outcome: Ok(stack_id.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(StackOperation, StackOperationInput)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: StackOperation, input: &StackOperationInput) -> Result<StackId> {
        self.calls.lock().unwrap().push((operation, input.clone()));
        match &self.outcome {
            Ok(id) => Ok(StackId::new(id.clone())),
            Err(message) => Err(CloudError::ApiError(message.clone())),
        }
    }
}

#[async_trait]
impl StackApi for RecordingStackApi {
    async fn create_stack(&self, input: &StackOperationInput) -> Result<StackId> {
        self.record(StackOperation::Create, input)
    }

    async fn update_stack(&self, input: &StackOperationInput) -> Result<StackId> {
        self.record(StackOperation::Update, input)
    }
}

/// Secrets stager that records the digests it was asked about
#[derive(Default)]
pub struct RecordingSecrets {
    pub digests: Mutex<Vec<Digest>>,
    pub fail: bool,
}

#[async_trait]
impl SecretsStager for RecordingSecrets {
    async fn stage_secrets(&self, payload_digest: &Digest) -> Result<StagedSecrets> {
        self.digests.lock().unwrap().push(payload_digest.clone());
        if self.fail {
            return Err(CloudError::Secrets("kms unavailable".to_string()));
        }
        Ok(StagedSecrets {
            key: format!("secrets/{}", payload_digest),
            location: "bucket".to_string(),
        })
    }
}
