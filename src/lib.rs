//! scitracer - provenance-tracking data catalog for scientific pipelines
//!
//! Wires a YAML configuration to concrete backends and hands back a
//! ready [`Session`] plus the configured runner.

pub use scitracer_catalog as catalog;
pub use scitracer_core as core;
pub use scitracer_runtime as runtime;

use scitracer_catalog::BackendRegistry;
use scitracer_core::config::{render_template, ROLE_RUNNER};
use scitracer_core::{Annotations, Config, DataInfo, Dataset, Error, Result, Runner, Scalar, Uri};
use scitracer_runtime::{LocalRunner, Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A session and runner bound from one configuration.
pub struct Workspace {
    pub session: Session,
    pub runner: Arc<dyn Runner>,
}

impl Workspace {
    /// Bind every role with the built-in backends.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with(&BackendRegistry::with_builtin(), config)
    }

    pub fn open_with(registry: &BackendRegistry, config: &Config) -> Result<Self> {
        let backends = registry.build(config)?;
        let session = Session::new(backends.catalog, backends.storage, backends.metadata);
        let runner = runner_for(config, &session)?;
        Ok(Self { session, runner })
    }

    /// Discover and load the config file, then bind it.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let path = Config::discover(explicit)?;
        Self::open(&Config::load(&path)?)
    }
}

/// Runner bound to the `runner` section. `local` is the only runner.
pub fn runner_for(config: &Config, session: &Session) -> Result<Arc<dyn Runner>> {
    match config.value(ROLE_RUNNER)? {
        "local" => Ok(Arc::new(LocalRunner::new(session.clone()))),
        other => Err(Error::plugin_not_found(ROLE_RUNNER, other)),
    }
}

/// Write a config file for `workspace`.
///
/// With a template, `${workspace_dir}` is substituted; otherwise the default
/// local-filesystem config is written.
pub fn create_config(path: &Path, workspace: &Path, template: Option<&str>) -> Result<PathBuf> {
    let content = match template {
        Some(template) => render_template(template, workspace),
        None => Config::sample(workspace).to_yaml()?,
    };
    Config::parse(&content)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(workspace)?;
    std::fs::write(path, content)?;
    tracing::info!("config written to {}", path.display());
    Ok(path.to_path_buf())
}

/// Parse `key=value` filters into an annotation query.
pub fn parse_filters<S: AsRef<str>>(filters: &[S]) -> Result<Annotations> {
    filters
        .iter()
        .map(|f| {
            let f = f.as_ref();
            let (key, value) = f
                .split_once('=')
                .ok_or_else(|| Error::InvalidQuery(format!("expected key=value, got '{}'", f)))?;
            Ok((key.trim().to_string(), Scalar::parse(value.trim())))
        })
        .collect()
}

/// Find a data item of a dataset by uri.
pub async fn find_data(session: &Session, dataset: &Dataset, uri: &Uri) -> Result<DataInfo> {
    session
        .catalog()
        .data_items(dataset)
        .await?
        .into_iter()
        .find(|d| &d.uri == uri)
        .ok_or_else(|| Error::not_found("data", uri.as_str()))
}
