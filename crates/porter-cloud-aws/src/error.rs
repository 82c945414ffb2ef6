//! AWS provider error types

use porter_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("{operation} failed: {message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Invalid request: {0}")]
    Build(String),
}

impl AwsError {
    pub(crate) fn sdk(operation: &'static str, err: impl std::fmt::Display) -> Self {
        AwsError::Sdk {
            operation,
            message: err.to_string(),
        }
    }
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        CloudError::ApiError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
