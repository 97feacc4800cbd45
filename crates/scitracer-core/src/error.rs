//! Error types for scitracer

use crate::manifest::RunManifest;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unknown storage type: {0}")]
    UnknownStorageType(String),

    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("no {role} backend registered under '{name}'")]
    PluginNotFound { role: String, name: String },

    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Storage payload was written but its metadata or index entry was not.
    #[error("inconsistent data {uri}: {message}")]
    Inconsistent { uri: String, message: String },

    #[error("processor error: {func} - {message}")]
    Processor { func: String, message: String },

    /// A run aborted; the manifest records how far each job got.
    #[error("run {} failed: {source}", .manifest.run_id)]
    RunFailed {
        manifest: Box<RunManifest>,
        source: Box<Error>,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn plugin_not_found(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::PluginNotFound {
            role: role.into(),
            name: name.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn inconsistent(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inconsistent {
            uri: uri.into(),
            message: message.into(),
        }
    }

    pub fn processor(func: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processor {
            func: func.into(),
            message: message.into(),
        }
    }

    pub fn run_failed(manifest: RunManifest, source: Error) -> Self {
        Self::RunFailed {
            manifest: Box::new(manifest),
            source: Box::new(source),
        }
    }

    /// The error that aborted a run, or `self` for any other error.
    pub fn cause(&self) -> &Error {
        match self {
            Self::RunFailed { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Manifest of the aborted run, if this error ended one.
    pub fn manifest(&self) -> Option<&RunManifest> {
        match self {
            Self::RunFailed { manifest, .. } => Some(manifest),
            _ => None,
        }
    }
}
