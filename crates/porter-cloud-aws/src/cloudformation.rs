//! CloudFormation stack API

use crate::error::{AwsError, Result};
use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, Tag};
use porter_cloud::StackApi;
use porter_core::{StackId, StackOperationInput};
use tracing::debug;

const TAG_ENVIRONMENT: &str = "porter:environment";
const TAG_REGION: &str = "porter:region";
const TAG_SECRETS_KEY: &str = "porter:secrets-key";
const TAG_SECRETS_LOCATION: &str = "porter:secrets-location";

/// Creates or updates one named stack.
///
/// For updates `stack_name` may be the stack id returned by an earlier create.
pub struct CloudFormationStackApi {
    client: Client,
    stack_name: String,
}

impl CloudFormationStackApi {
    pub fn new(client: Client, stack_name: impl Into<String>) -> Self {
        Self {
            client,
            stack_name: stack_name.into(),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }
}

#[async_trait]
impl StackApi for CloudFormationStackApi {
    async fn create_stack(&self, input: &StackOperationInput) -> porter_cloud::Result<StackId> {
        debug!(stack = %self.stack_name, "CreateStack");
        let output = self
            .client
            .create_stack()
            .stack_name(&self.stack_name)
            .template_url(&input.template_url)
            .capabilities(Capability::CapabilityIam)
            .set_tags(Some(stack_tags(input)?))
            .send()
            .await
            .map_err(|e| AwsError::sdk("CreateStack", DisplayErrorContext(e)))?;

        Ok(stack_id("CreateStack", output.stack_id())?)
    }

    async fn update_stack(&self, input: &StackOperationInput) -> porter_cloud::Result<StackId> {
        debug!(stack = %self.stack_name, "UpdateStack");
        let output = self
            .client
            .update_stack()
            .stack_name(&self.stack_name)
            .template_url(&input.template_url)
            .capabilities(Capability::CapabilityIam)
            .set_tags(Some(stack_tags(input)?))
            .send()
            .await
            .map_err(|e| AwsError::sdk("UpdateStack", DisplayErrorContext(e)))?;

        Ok(stack_id("UpdateStack", output.stack_id())?)
    }
}

fn stack_id(operation: &'static str, id: Option<&str>) -> Result<StackId> {
    id.map(StackId::new).ok_or(AwsError::MissingField {
        operation,
        field: "StackId",
    })
}

/// Tag pairs attached to the stack; empty values are left off
fn tag_pairs(input: &StackOperationInput) -> Vec<(&'static str, &str)> {
    [
        (TAG_ENVIRONMENT, input.environment.as_str()),
        (TAG_REGION, input.region.as_str()),
        (TAG_SECRETS_KEY, input.secrets_key.as_str()),
        (TAG_SECRETS_LOCATION, input.secrets_location.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .collect()
}

fn stack_tags(input: &StackOperationInput) -> Result<Vec<Tag>> {
    tag_pairs(input)
        .into_iter()
        .map(|(key, value)| {
            Ok(Tag::builder().key(key).value(value).build())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(secrets_key: &str) -> StackOperationInput {
        StackOperationInput {
            environment: "prod".to_string(),
            region: "us-west-2".to_string(),
            secrets_key: secrets_key.to_string(),
            secrets_location: if secrets_key.is_empty() {
                String::new()
            } else {
                "bucket".to_string()
            },
            template_url: "https://s3.amazonaws.com/bucket/t".to_string(),
        }
    }

    #[test]
    fn test_tags_without_secrets() {
        assert_eq!(
            tag_pairs(&input("")),
            vec![(TAG_ENVIRONMENT, "prod"), (TAG_REGION, "us-west-2")]
        );
    }

    #[test]
    fn test_tags_with_secrets() {
        let tags = stack_tags(&input("porter-deployment/svc/prod/1.0/abc.secrets")).unwrap();
        assert_eq!(tags.len(), 4);
        assert_eq!(tags[2].key().unwrap(), TAG_SECRETS_KEY);
        assert_eq!(tags[2].value().unwrap(), "porter-deployment/svc/prod/1.0/abc.secrets");
        assert_eq!(tags[3].value().unwrap(), "bucket");
    }

    #[test]
    fn test_missing_stack_id() {
        assert!(matches!(
            stack_id("CreateStack", None),
            Err(AwsError::MissingField { field: "StackId", .. })
        ));
        assert_eq!(stack_id("CreateStack", Some("arn:stack")).unwrap().as_str(), "arn:stack");
    }
}
