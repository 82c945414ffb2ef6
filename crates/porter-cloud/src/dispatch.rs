//! Stack create/update dispatch

use crate::error::{CloudError, Result};
use crate::provider::StackApi;
use porter_core::{StackId, StackOperationInput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Which provisioning call a run makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOperation {
    Create,
    Update,
}

impl std::fmt::Display for StackOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackOperation::Create => write!(f, "create"),
            StackOperation::Update => write!(f, "update"),
        }
    }
}

pub struct StackDispatcher {
    api: Arc<dyn StackApi>,
    operation: StackOperation,
}

impl StackDispatcher {
    pub fn new(api: Arc<dyn StackApi>, operation: StackOperation) -> Self {
        Self { api, operation }
    }

    pub fn operation(&self) -> StackOperation {
        self.operation
    }

    /// Run the configured operation once. Retries are up to the caller.
    pub async fn dispatch(&self, input: &StackOperationInput) -> Result<StackId> {
        info!(
            operation = %self.operation,
            environment = %input.environment,
            region = %input.region,
            template_url = %input.template_url,
            "Dispatching stack operation"
        );

        let result = match self.operation {
            StackOperation::Create => self.api.create_stack(input).await,
            StackOperation::Update => self.api.update_stack(input).await,
        };

        match result {
            Ok(stack_id) => {
                info!(operation = %self.operation, stack_id = %stack_id, "Stack operation accepted");
                Ok(stack_id)
            }
            Err(e) => {
                error!(operation = %self.operation, error = %e, "Stack operation failed");
                Err(CloudError::Dispatch {
                    operation: self.operation,
                    message: e.to_string(),
                })
            }
        }
    }
}
