use super::load_config;
use anyhow::{Context, anyhow};
use colored::Colorize;
use porter_cloud::{
    BlobSecretsStager, BlobStore, ProvisionPaths, RegionProvisioner, StackDispatcher,
    StackOperation, StateManager,
};
use porter_cloud_aws::{CloudFormationStackApi, S3BlobStore, aws_clients};
use porter_core::RegionProvisioningResult;
use std::path::PathBuf;
use std::sync::Arc;

pub struct ProvisionArgs {
    pub environment: String,
    pub region: String,
    pub update: bool,
    pub service_version: Option<String>,
    pub payload: PathBuf,
}

pub async fn handle(args: ProvisionArgs) -> anyhow::Result<()> {
    let config = load_config()?;
    let service = config.service(args.service_version.as_deref())?;
    let environment = config.environment_descriptor(&args.environment)?;
    let region = config
        .environment(&args.environment)?
        .region_descriptor(&args.region)?;

    let state_manager = StateManager::new(&config.project_root);
    let state = state_manager.load().await?;

    let (operation, stack_name) = if args.update {
        let stack_id = state
            .stack_id(&environment.name, &region.name)
            .ok_or_else(|| {
                anyhow!(
                    "no stack recorded for {}/{}; provision without --update first",
                    environment.name,
                    region.name
                )
            })?;
        (StackOperation::Update, stack_id.to_string())
    } else {
        (
            StackOperation::Create,
            format!(
                "{}-{}-{}",
                service.name,
                environment.name,
                chrono::Utc::now().timestamp()
            ),
        )
    };

    println!(
        "{} {} {} ({} {})",
        "Provisioning".blue().bold(),
        format!("{} {}", service.name, service.version).cyan(),
        format!("{}/{}", environment.name, region.name).cyan(),
        operation,
        stack_name
    );

    let clients = aws_clients(&region.name).await;
    let store: Arc<dyn BlobStore> = Arc::new(S3BlobStore::new(clients.s3));
    let secrets = Arc::new(BlobSecretsStager::new(
        store.clone(),
        environment.secrets_path.clone(),
        &service,
        &environment.name,
        &region,
    ));
    let dispatcher = StackDispatcher::new(
        Arc::new(CloudFormationStackApi::new(clients.cloudformation, stack_name)),
        operation,
    );
    let paths = ProvisionPaths {
        payload: args.payload,
        ..ProvisionPaths::default()
    };

    let env_name = environment.name.clone();
    let region_name = region.name.clone();
    let provisioner =
        RegionProvisioner::new(service, environment, region, store, secrets, dispatcher)
            .with_paths(paths);

    let mut result = RegionProvisioningResult::default();
    if let Err(e) = provisioner.provision(&mut result).await {
        eprintln!("{}", "✗ provisioning failed".red().bold());
        return Err(e).context("provisioning failed");
    }

    state_manager
        .record(&env_name, &region_name, &result)
        .await
        .context("stack accepted but provision state was not updated")?;

    if let Some(stack_id) = &result.stack_id {
        println!("{} {}", "✓ Stack operation accepted:".green().bold(), stack_id);
    }
    Ok(())
}
