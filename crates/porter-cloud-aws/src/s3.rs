//! S3 blob store

use crate::error::{AwsError, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ServerSideEncryption, StorageClass,
};
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream};
use porter_cloud::{BlobStore, ProbeError, ProbeOutcome, UploadRequest};
use std::ops::Range;
use tracing::{debug, warn};

/// Objects at or below this size go up in a single PutObject
const SINGLE_PUT_LIMIT: usize = 16 * 1024 * 1024;

/// Multipart part size; S3 requires at least 5 MiB for all but the last part
const PART_SIZE: usize = 8 * 1024 * 1024;

pub struct S3BlobStore {
    client: Client,
    concurrency: usize,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            client,
            concurrency,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn put(&self, request: UploadRequest<'_>) -> Result<()> {
        let options = request.options;
        let mut put = self
            .client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .content_type(&options.content_type)
            .set_content_encoding(options.content_encoding.clone())
            .set_storage_class(options.storage_class.as_deref().map(StorageClass::from))
            .body(ByteStream::from(request.body));
        if let Some(key_id) = &options.sse_kms_key_id {
            put = put
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(key_id);
        }

        put.send()
            .await
            .map_err(|e| AwsError::sdk("PutObject", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn put_multipart(&self, request: UploadRequest<'_>) -> Result<()> {
        let options = request.options;
        let mut create = self
            .client
            .create_multipart_upload()
            .bucket(request.bucket)
            .key(request.key)
            .content_type(&options.content_type)
            .set_content_encoding(options.content_encoding.clone())
            .set_storage_class(options.storage_class.as_deref().map(StorageClass::from));
        if let Some(key_id) = &options.sse_kms_key_id {
            create = create
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(key_id);
        }

        let created = create
            .send()
            .await
            .map_err(|e| AwsError::sdk("CreateMultipartUpload", DisplayErrorContext(e)))?;
        let upload_id = created
            .upload_id()
            .ok_or(AwsError::MissingField {
                operation: "CreateMultipartUpload",
                field: "UploadId",
            })?
            .to_string();

        let result = self
            .upload_parts(request.bucket, request.key, &upload_id, &request.body)
            .await;

        if result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(request.bucket)
                .key(request.key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(
                    key = request.key,
                    error = %DisplayErrorContext(e),
                    "Failed to abort multipart upload"
                );
            }
        }
        result
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        body: &Bytes,
    ) -> Result<()> {
        let ranges = part_ranges(body.len(), PART_SIZE);
        debug!(key, parts = ranges.len(), concurrency = self.concurrency, "Uploading parts");

        let mut parts: Vec<CompletedPart> = stream::iter(ranges.into_iter().enumerate())
            .map(|(index, range)| {
                let part_number = index as i32 + 1;
                let chunk = body.slice(range);
                async move {
                    let output = self
                        .client
                        .upload_part()
                        .bucket(bucket)
                        .key(key)
                        .upload_id(upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk))
                        .send()
                        .await
                        .map_err(|e| AwsError::sdk("UploadPart", DisplayErrorContext(e)))?;
                    Ok::<_, AwsError>(
                        CompletedPart::builder()
                            .set_e_tag(output.e_tag().map(str::to_string))
                            .part_number(part_number)
                            .build(),
                    )
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;
        parts.sort_by_key(|part| part.part_number());

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| AwsError::sdk("CompleteMultipartUpload", DisplayErrorContext(e)))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn probe(
        &self,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<ProbeOutcome, ProbeError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(ProbeOutcome::Present {
                content_length: output.content_length().unwrap_or(0).max(0) as u64,
            }),
            Err(err) => {
                let status = match &err {
                    SdkError::ServiceError(_) => err.raw_response().map(|r| r.status().as_u16()),
                    _ => None,
                };
                classify_head_failure(status, || DisplayErrorContext(err).to_string())
            }
        }
    }

    async fn upload(&self, request: UploadRequest<'_>) -> porter_cloud::Result<()> {
        if request.body.len() <= SINGLE_PUT_LIMIT {
            self.put(request).await?;
        } else {
            self.put_multipart(request).await?;
        }
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        object_url(bucket, key)
    }
}

/// Path-style URL, which CloudFormation accepts for a TemplateURL
pub fn object_url(bucket: &str, key: &str) -> String {
    format!("https://s3.amazonaws.com/{}/{}", bucket, key)
}

/// HeadObject carries no error body, so the HTTP status is all there is to go on.
/// `status` is `None` when the request never got a response.
fn classify_head_failure(
    status: Option<u16>,
    message: impl FnOnce() -> String,
) -> std::result::Result<ProbeOutcome, ProbeError> {
    match status {
        Some(404) => Ok(ProbeOutcome::NotFound),
        Some(403) => Err(ProbeError::Forbidden(message())),
        _ => Err(ProbeError::Other(message())),
    }
}

/// Split `len` bytes into consecutive parts of at most `part_size`
fn part_ranges(len: usize, part_size: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(part_size)
        .map(|start| start..(start + part_size).min(len))
        .collect()
}
