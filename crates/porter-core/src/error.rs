use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling, resolving or mutating a template
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to open stack definition {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse stack definition {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("resource '{resource}' could not be resolved: {message}")]
    Resolution { resource: String, message: String },

    #[error("{step} failed in rule '{rule}' on resource '{resource}': {message}")]
    Mutation {
        step: &'static str,
        rule: String,
        resource: String,
        message: String,
    },

    #[error("failed to serialize template: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;
