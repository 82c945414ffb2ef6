//! Porter core
//!
//! Shared building blocks for provisioning a single CloudFormation stack into
//! one region: the deployment model, content digests and the storage key
//! scheme, and the template assembly/mutation stages.
//!
//! Nothing in this crate performs network I/O. Staging and dispatch live in
//! `porter-cloud`, which drives these types through its provider traits.

pub mod digest;
pub mod error;
pub mod key;
pub mod model;
pub mod mutate;
pub mod template;

pub use digest::{Digest, DigestHasher};
pub use error::{Result, TemplateError};
pub use key::{KeyClass, StorageKey, StorageNamespace};
pub use model::{
    EnvironmentDescriptor, RegionDescriptor, RegionProvisioningResult, ServiceDescriptor, StackId,
    StackOperationInput,
};
pub use mutate::{MapResource, MutationContext, ResourceTransforms, TemplateMutator};
pub use template::{Resource, Template, TemplateAssembler};

/// Version marker written into every template description
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
