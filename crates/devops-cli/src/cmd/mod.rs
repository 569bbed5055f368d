pub mod area;
pub mod completions;
pub mod config;
pub mod search;
pub mod set_state;
pub mod tree;
pub mod validate;
pub mod wiql;

use anyhow::{Result, bail};
use devops_core::config::{Settings, default_config_path};
use devops_core::error::DevOpsError;
use devops_core::fetch::CancelToken;
use devops_core::wiql::parse_state_list;
use devops_core::{AzureDevOpsClient, HierarchyService};
use std::path::PathBuf;
use tracing::debug;

use crate::output::OutputMode;

/// Per-invocation state shared by every command handler.
#[derive(Debug)]
pub struct Context {
    /// `--config` override; `None` means the platform default path.
    pub config_path: Option<PathBuf>,
    pub output: OutputMode,
    pub cancel: CancelToken,
}

impl Context {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(default_config_path().map_err(DevOpsError::from)?),
        }
    }

    /// Settings from the config file with `ADO_*` overrides applied.
    pub fn settings(&self) -> Result<Settings> {
        let path = self.config_path()?;
        debug!(path = %path.display(), "loading settings");
        let settings = Settings::load(&path).map_err(DevOpsError::from)?;
        Ok(settings.with_env_overrides())
    }
}

/// A service bound to the configured organization and project.
pub fn connect(settings: &Settings) -> Result<HierarchyService<AzureDevOpsClient>> {
    let client = AzureDevOpsClient::new(&settings.connection, &settings.fetch)?;
    debug!(base = client.base_uri(), "connected");
    Ok(HierarchyService::new(client, &settings.fetch))
}

/// `--area` if given, otherwise `defaults.area_path`.
pub fn resolve_area(flag: Option<&str>, settings: &Settings) -> Result<String> {
    match flag.or(settings.defaults.area_path.as_deref()) {
        Some(area) if !area.trim().is_empty() => Ok(area.to_string()),
        _ => bail!("no area path given: pass --area or run `dva config set defaults.area_path <path>`"),
    }
}

/// `--states` (comma-separated) if given, otherwise `defaults.states`.
pub fn resolve_states(flag: Option<&str>, settings: &Settings) -> Vec<String> {
    flag.map_or_else(|| settings.defaults.states.clone(), parse_state_list)
}
