use super::load_config;
use anyhow::Context;
use porter_cloud::{PAYLOAD_EXTENSION, build_template};
use porter_core::{Digest, KeyClass, StorageNamespace, TemplateMutator};
use std::path::Path;

/// Print the template `provision` would stage, using the local payload's digest
pub fn handle(
    environment: &str,
    region: &str,
    service_version: Option<&str>,
    payload: &Path,
) -> anyhow::Result<()> {
    let config = load_config()?;
    let service = config.service(service_version)?;
    let environment = config.environment_descriptor(environment)?;
    let region = config.environment(&environment.name)?.region_descriptor(region)?;

    let digest = std::fs::File::open(payload)
        .and_then(Digest::from_reader)
        .with_context(|| format!("failed to read payload {}", payload.display()))?;
    let payload_key = StorageNamespace::new(KeyClass::Deployment, &service, &environment.name)
        .key_for(&digest, Some(PAYLOAD_EXTENSION));
    tracing::debug!(key = %payload_key, "Rendering template");

    let template = build_template(
        &service,
        &environment,
        &region,
        &TemplateMutator::default(),
        &payload_key,
        &digest,
    )?;
    println!("{}", serde_json::to_string_pretty(&template)?);
    Ok(())
}
