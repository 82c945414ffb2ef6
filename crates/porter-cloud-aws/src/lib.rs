//! AWS providers for Porter
//!
//! - [`S3BlobStore`]: probe and upload staged objects in S3
//! - [`CloudFormationStackApi`]: create and update stacks from a staged template
//!
//! Credentials come from the standard AWS provider chain.

pub mod cloudformation;
pub mod error;
pub mod s3;

pub use cloudformation::CloudFormationStackApi;
pub use error::{AwsError, Result};
pub use s3::S3BlobStore;

use aws_config::{BehaviorVersion, Region};

/// SDK clients bound to one region
#[derive(Clone)]
pub struct AwsClients {
    pub s3: aws_sdk_s3::Client,
    pub cloudformation: aws_sdk_cloudformation::Client,
}

/// Load shared configuration for `region` and build both clients
pub async fn aws_clients(region: &str) -> AwsClients {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    tracing::debug!(region, "Loaded AWS configuration");

    AwsClients {
        s3: aws_sdk_s3::Client::new(&config),
        cloudformation: aws_sdk_cloudformation::Client::new(&config),
    }
}
