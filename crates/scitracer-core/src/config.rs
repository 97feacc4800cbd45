//! Backend configuration.
//!
//! A YAML file with one section per backend role (`index`, `storage`,
//! `metadata`, `runner`). Every section names the backend to bind with `name`;
//! the remaining keys are handed to that backend untouched.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.yml";
pub const CONFIG_ENV_VAR: &str = "SCITRACER_CONFIG";
pub const WORKSPACE_PLACEHOLDER: &str = "${workspace_dir}";

pub const ROLE_INDEX: &str = "index";
pub const ROLE_STORAGE: &str = "storage";
pub const ROLE_METADATA: &str = "metadata";
pub const ROLE_RUNNER: &str = "runner";

/// One backend role: which backend, and its connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendSection {
    pub name: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

impl BackendSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// String parameter, required.
    pub fn param_str(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| {
                Error::Config(format!(
                    "backend '{}' requires a string parameter '{}'",
                    self.name, key
                ))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    #[serde(flatten)]
    sections: BTreeMap<String, BackendSection>,
    #[serde(skip)]
    file: Option<PathBuf>,
}

impl Config {
    /// Find the config file: explicit path, `$SCITRACER_CONFIG`, `./config.yml`,
    /// then the user config directory.
    pub fn discover(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(Error::ConfigurationMissing(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let mut candidates = Vec::new();
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            candidates.push(PathBuf::from(env_path));
        }
        candidates.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("scitracer").join(CONFIG_FILE_NAME));
        }
        candidates
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| Error::ConfigurationMissing("cannot find the configuration file".into()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.file = Some(path.to_path_buf());
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, serde_yaml::Value>> =
            serde_yaml::from_str(content)?;
        let mut sections = BTreeMap::new();
        for (role, mut params) in raw {
            let name = match params.remove("name") {
                Some(serde_yaml::Value::String(name)) => name,
                _ => {
                    return Err(Error::Config(format!(
                        "section '{}' has no backend name",
                        role
                    )))
                }
            };
            sections.insert(role, BackendSection { name, params });
        }
        Ok(Self {
            sections,
            file: None,
        })
    }

    /// Path the config was loaded from, if any.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn section(&self, role: &str) -> Result<&BackendSection> {
        self.sections
            .get(role)
            .ok_or_else(|| Error::Config(format!("cannot find the section {} in the config", role)))
    }

    pub fn set_section(&mut self, role: &str, section: BackendSection) {
        self.sections.insert(role.into(), section);
    }

    /// Backend name bound to a role.
    pub fn value(&self, role: &str) -> Result<&str> {
        Ok(self.section(role)?.name.as_str())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Default local-filesystem configuration rooted at `workspace`.
    pub fn sample(workspace: &Path) -> Self {
        let ws = workspace.display().to_string();
        let mut config = Self::default();
        for role in [ROLE_INDEX, ROLE_STORAGE, ROLE_METADATA] {
            config.set_section(
                role,
                BackendSection::new("local").with_param("workspace", ws.as_str()),
            );
        }
        config.set_section(ROLE_RUNNER, BackendSection::new("local"));
        config
    }
}

/// Substitute the workspace placeholder in a config template.
pub fn render_template(template: &str, workspace: &Path) -> String {
    template.replace(WORKSPACE_PLACEHOLDER, &workspace.display().to_string())
}
