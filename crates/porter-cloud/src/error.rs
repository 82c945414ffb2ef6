//! Provisioning error types

use crate::dispatch::StackOperation;
use porter_core::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the provisioning pipeline and its providers
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Local IO error on {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Access denied probing s3://{bucket}/{key} (s3:GetObject and s3:ListBucket are needed): {message}"
    )]
    PermissionDenied {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Probe failed for s3://{bucket}/{key}: {message}")]
    ProbeFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Upload failed for s3://{bucket}/{key}: {message}")]
    UploadFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Secrets staging failed: {0}")]
    Secrets(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Stack {operation} failed: {message}")]
    Dispatch {
        operation: StackOperation,
        message: String,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CloudError::LocalIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
