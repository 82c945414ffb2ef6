//! Porter cloud pipeline
//!
//! Drives one region run end to end: stage the payload, stage secrets,
//! assemble and mutate the template, stage it, then create or update the
//! stack.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   porter CLI                     │
//! │          (porter provision / template)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 porter-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │           RegionProvisioner              │   │
//! │  │  stager ─ secrets ─ mutator ─ dispatcher │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ BlobStore /  │  │  State Mgmt  │            │
//! │  │ StackApi     │  │              │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼──────────────┐
//! │   porter-cloud-aws   │
//! │ S3 + CloudFormation  │
//! └──────────────────────┘
//! ```

pub mod dispatch;
pub mod error;
pub mod provider;
pub mod provision;
pub mod secrets;
pub mod stager;
pub mod state;

#[cfg(test)]
mod testing;

// Re-exports
pub use dispatch::{StackDispatcher, StackOperation};
pub use error::{CloudError, Result};
pub use provider::{
    BlobStore, ObjectOptions, ProbeError, ProbeOutcome, SecretsStager, StackApi, StagedSecrets,
    UploadRequest,
};
pub use provision::{
    PAYLOAD_EXTENSION, ProvisionPaths, RegionProvisioner, ScratchFile, build_template,
};
pub use secrets::BlobSecretsStager;
pub use stager::{ContentAddressedStager, StagedObject};
pub use state::{ProvisionState, RegionState, StateLock, StateManager};
