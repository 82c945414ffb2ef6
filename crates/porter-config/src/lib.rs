pub mod error;

pub use error::*;

use porter_core::{EnvironmentDescriptor, RegionDescriptor, ServiceDescriptor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Directory holding project-local Porter files
pub const PORTER_DIR: &str = ".porter";

const CONFIG_PATH_ENV: &str = "PORTER_CONFIG_PATH";

/// Locate the project's config file
///
/// Search order:
/// 1. `PORTER_CONFIG_PATH` (direct path)
/// 2. current directory: `.porter/config.yaml`, `.porter/config.yml`, `porter.yaml`, `porter.yml`
/// 3. `~/.config/porter/config.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;
    let candidates = [
        Path::new(PORTER_DIR).join("config.yaml"),
        Path::new(PORTER_DIR).join("config.yml"),
        PathBuf::from("porter.yaml"),
        PathBuf::from("porter.yml"),
    ];

    for candidate in &candidates {
        let path = current_dir.join(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("porter").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Project root for a config file: the parent of `.porter/`, or the file's directory
pub fn project_root(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    if dir.file_name().is_some_and(|name| name == PORTER_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PorterConfig {
    pub service_name: String,

    #[serde(default)]
    pub service_version: Option<String>,

    #[serde(default)]
    pub environments: Vec<Environment>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub project_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Environment {
    pub name: String,

    #[serde(default)]
    pub stack_definition: Option<PathBuf>,

    #[serde(default)]
    pub region_stack_definitions: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub secrets_path: Option<PathBuf>,

    #[serde(default)]
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub name: String,
    pub s3_bucket: String,

    #[serde(default)]
    pub sse_kms_key_id: Option<String>,
}

impl PorterConfig {
    /// Parse and validate the config at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: PorterConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.project_root = project_root(path);
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            environments = config.environments.len(),
            "Loaded config"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::Invalid("service_name must not be empty".into()));
        }
        check_name("service_name", &self.service_name)?;
        if let Some(version) = &self.service_version {
            check_version(version)?;
        }

        let mut env_names = HashSet::new();
        for env in &self.environments {
            check_name("environment name", &env.name)?;
            if !env_names.insert(env.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "environment '{}' is defined more than once",
                    env.name
                )));
            }

            let mut region_names = HashSet::new();
            for region in &env.regions {
                if !region_names.insert(region.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "region '{}' is defined more than once in environment '{}'",
                        region.name, env.name
                    )));
                }
                if region.s3_bucket.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "region '{}' in environment '{}' has no s3_bucket",
                        region.name, env.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn environment(&self, name: &str) -> Result<&Environment> {
        self.environments
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ConfigError::EnvironmentNotFound(name.to_string()))
    }

    /// Service identity; `version` overrides the configured one
    pub fn service(&self, version: Option<&str>) -> Result<ServiceDescriptor> {
        let version = version
            .map(str::to_string)
            .or_else(|| self.service_version.clone())
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "service_version is not configured and was not given on the command line"
                        .into(),
                )
            })?;
        check_version(&version)?;
        Ok(ServiceDescriptor::new(&self.service_name, version))
    }

    /// Environment descriptor with paths resolved against the project root
    pub fn environment_descriptor(&self, name: &str) -> Result<EnvironmentDescriptor> {
        let env = self.environment(name)?;
        Ok(EnvironmentDescriptor {
            name: env.name.clone(),
            stack_definition: env.stack_definition.as_deref().map(|p| self.resolve(p)),
            region_stack_definitions: env
                .region_stack_definitions
                .iter()
                .map(|(region, p)| (region.clone(), self.resolve(p)))
                .collect(),
            secrets_path: env.secrets_path.as_deref().map(|p| self.resolve(p)),
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

impl Environment {
    pub fn region(&self, name: &str) -> Result<&Region> {
        self.regions
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ConfigError::RegionNotFound {
                environment: self.name.clone(),
                region: name.to_string(),
            })
    }

    pub fn region_descriptor(&self, name: &str) -> Result<RegionDescriptor> {
        let region = self.region(name)?;
        let descriptor = RegionDescriptor::new(&region.name, &region.s3_bucket);
        Ok(match &region.sse_kms_key_id {
            Some(key) => descriptor.with_sse_kms_key(key),
            None => descriptor,
        })
    }
}

/// Names end up in storage keys and stack names: a leading ASCII letter,
/// then letters, digits or `-`
fn check_name(field: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} '{name}' must start with a letter and contain only letters, digits and '-'"
        )))
    }
}

fn check_version(version: &str) -> Result<()> {
    if version.trim().is_empty() || version.contains('/') {
        return Err(ConfigError::Invalid(format!(
            "service_version '{version}' must be non-empty and must not contain '/'"
        )));
    }
    Ok(())
}
