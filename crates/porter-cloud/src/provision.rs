//! Region provisioning pipeline
//!
//! ```text
//! payload ─▶ stage ─▶ secrets ─▶ assemble ─▶ mutate ─▶ mirror ─▶ stage ─▶ dispatch
//! ```
//!
//! Every step gates the next. The first failure ends the run; staged objects
//! are left in place since they are content-addressed and reusable.

use crate::dispatch::StackDispatcher;
use crate::error::{CloudError, Result};
use crate::provider::{BlobStore, ObjectOptions, SecretsStager};
use crate::stager::{ContentAddressedStager, StagedObject};
use bytes::{Bytes, BytesMut};
use porter_core::{
    Digest, DigestHasher, EnvironmentDescriptor, KeyClass, MutationContext, RegionDescriptor,
    RegionProvisioningResult, ServiceDescriptor, StackOperationInput, StorageKey,
    StorageNamespace, Template, TemplateAssembler, TemplateMutator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

/// Extension of staged payload keys
pub const PAYLOAD_EXTENSION: &str = "tar";

/// Local scratch locations used by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPaths {
    /// Pre-built service payload, removed after it has been read
    pub payload: PathBuf,

    /// Copy of the staged template, kept for audit
    pub template_mirror: PathBuf,
}

impl Default for ProvisionPaths {
    fn default() -> Self {
        Self::under(".porter-tmp")
    }
}

impl ProvisionPaths {
    pub fn under(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            payload: dir.join("payload.tar"),
            template_mirror: dir.join("CloudFormationTemplate.json"),
        }
    }
}

/// Scoped ownership of a scratch file; the file is removed on drop
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file, hashing each chunk as it arrives
    pub async fn read_digested(&self) -> Result<(Bytes, Digest)> {
        let io_err = |e| CloudError::local_io(&self.path, e);
        let mut file = tokio::fs::File::open(&self.path).await.map_err(io_err)?;
        let capacity = file.metadata().await.map_err(io_err)?.len() as usize;

        let mut body = BytesMut::with_capacity(capacity);
        let mut hasher = DigestHasher::new();
        loop {
            let start = body.len();
            if file.read_buf(&mut body).await.map_err(io_err)? == 0 {
                break;
            }
            hasher.update(&body[start..]);
        }
        Ok((body.freeze(), hasher.finish()))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file")
            }
        }
    }
}

/// Assemble and mutate the template for one region
pub fn build_template(
    service: &ServiceDescriptor,
    environment: &EnvironmentDescriptor,
    region: &RegionDescriptor,
    mutator: &TemplateMutator,
    payload_key: &StorageKey,
    payload_digest: &Digest,
) -> Result<Template> {
    let mut template = TemplateAssembler::assemble_with(
        environment.stack_definition_path(&region.name),
        &mutator.mandatory_names(),
    )?;

    let ctx = MutationContext {
        service,
        environment: &environment.name,
        region: &region.name,
        payload_key,
        payload_digest,
    };
    mutator.mutate(&mut template, &ctx)?;
    Ok(template)
}

/// Provisions one stack into one region
pub struct RegionProvisioner {
    service: ServiceDescriptor,
    environment: EnvironmentDescriptor,
    region: RegionDescriptor,
    store: Arc<dyn BlobStore>,
    stager: ContentAddressedStager,
    secrets: Arc<dyn SecretsStager>,
    dispatcher: StackDispatcher,
    mutator: TemplateMutator,
    paths: ProvisionPaths,
}

impl RegionProvisioner {
    pub fn new(
        service: ServiceDescriptor,
        environment: EnvironmentDescriptor,
        region: RegionDescriptor,
        store: Arc<dyn BlobStore>,
        secrets: Arc<dyn SecretsStager>,
        dispatcher: StackDispatcher,
    ) -> Self {
        Self {
            service,
            environment,
            region,
            stager: ContentAddressedStager::new(store.clone()),
            store,
            secrets,
            dispatcher,
            mutator: TemplateMutator::default(),
            paths: ProvisionPaths::default(),
        }
    }

    pub fn with_paths(mut self, paths: ProvisionPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_mutator(mut self, mutator: TemplateMutator) -> Self {
        self.mutator = mutator;
        self
    }

    /// Run the pipeline; `result` is only written when every step succeeds
    #[tracing::instrument(
        skip_all,
        fields(
            service = %self.service.name,
            environment = %self.environment.name,
            region = %self.region.name,
            operation = %self.dispatcher.operation(),
        )
    )]
    pub async fn provision(&self, result: &mut RegionProvisioningResult) -> Result<()> {
        let payload = self.stage_payload().await?;

        let secrets = self
            .secrets
            .stage_secrets(&payload.digest)
            .await
            .inspect_err(|e| error!(error = %e, "Secrets staging failed"))?;

        let template_bytes = self.render_template(&payload)?;
        self.write_mirror(&template_bytes).await?;
        let template = self.stage_template(template_bytes).await?;

        let input = StackOperationInput {
            environment: self.environment.name.clone(),
            region: self.region.name.clone(),
            secrets_key: secrets.key,
            secrets_location: secrets.location,
            template_url: self
                .store
                .object_url(&self.region.bucket, template.key.as_str()),
        };

        let stack_id = self.dispatcher.dispatch(&input).await?;
        info!(stack_id = %stack_id, "Region provisioned");
        result.stack_id = Some(stack_id);
        Ok(())
    }

    async fn stage_payload(&self) -> Result<StagedObject> {
        let scratch = ScratchFile::new(&self.paths.payload);
        let (body, digest) = scratch.read_digested().await.inspect_err(|e| {
            error!(error = %e, "Failed to read service payload");
        })?;

        let namespace =
            StorageNamespace::new(KeyClass::Deployment, &self.service, &self.environment.name);
        self.stager
            .stage_digested(
                body,
                digest,
                &self.region.bucket,
                &namespace,
                Some(PAYLOAD_EXTENSION),
                &ObjectOptions::payload(),
            )
            .await
    }

    /// Assemble, mutate and serialize; the only serialization of the run
    fn render_template(&self, payload: &StagedObject) -> Result<Vec<u8>> {
        let template = build_template(
            &self.service,
            &self.environment,
            &self.region,
            &self.mutator,
            &payload.key,
            &payload.digest,
        )?;
        template.to_bytes().map_err(|e| {
            error!(error = %e, "Failed to serialize template");
            CloudError::from(e)
        })
    }

    async fn write_mirror(&self, template_bytes: &[u8]) -> Result<()> {
        let path = &self.paths.template_mirror;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CloudError::local_io(parent, e))?;
        }
        tokio::fs::write(path, template_bytes)
            .await
            .map_err(|e| CloudError::local_io(path, e))
            .inspect_err(|e| error!(error = %e, "Unable to write template mirror"))?;
        debug!(path = %path.display(), "Wrote template mirror");
        Ok(())
    }

    async fn stage_template(&self, template_bytes: Vec<u8>) -> Result<StagedObject> {
        let namespace =
            StorageNamespace::new(KeyClass::Template, &self.service, &self.environment.name);
        self.stager
            .stage(
                Bytes::from(template_bytes),
                &self.region.bucket,
                &namespace,
                None,
                &ObjectOptions::template(self.region.sse_kms_key_id.clone()),
            )
            .await
    }
}
