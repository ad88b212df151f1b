//! Infrastructure implementation of the `ConfigStore` port.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::application::ports::ConfigStore;
use crate::domain::config::DeployerConfig;

/// Production implementation of `ConfigStore` that reads a YAML file on disk.
pub struct YamlConfigStore;

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<DeployerConfig> {
        let path = self.path()?;
        load_from(&path)
    }

    fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var("MICRODEPLOY_CONFIG") {
            return Ok(PathBuf::from(val));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(home.join(".microdeploy").join("config.yaml"))
    }
}

fn load_from(path: &std::path::Path) -> Result<DeployerConfig> {
    if !path.exists() {
        return Ok(DeployerConfig::default());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
}
