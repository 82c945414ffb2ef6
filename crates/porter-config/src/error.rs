use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Config file not found. Looked in:\n\
        - PORTER_CONFIG_PATH\n\
        - current directory: .porter/config.yaml, .porter/config.yml, porter.yaml, porter.yml\n\
        - ~/.config/porter/config.yaml"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("Region '{region}' is not configured for environment '{environment}'")]
    RegionNotFound { environment: String, region: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
