//! `keel.yaml` — engine cache modes and pipeline post-processing options.
//!
//! ```yaml
//! engine:
//!   environmentCache: unbounded
//!   programCache:
//!     bounded: 500
//! render:
//!   enableValidation: true
//!   resourceLabels:
//!     team: payments
//! ```
//!
//! Lookup order: `--config <path>` (must exist), `./keel.yaml`, then
//! `<user config dir>/keel/config.yaml`. No file means all defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use keel_pipeline::RenderOptions;
use keel_renderer::EngineOptions;

const LOCAL_CONFIG: &str = "keel.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeelConfig {
    pub engine: EngineOptions,
    pub render: RenderOptions,
}

/// Resolve and load the config file, or defaults when none exists.
pub fn load(explicit: Option<&Path>) -> Result<KeelConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => discover(),
    };
    match path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            load_from(&path)
        }
        None => Ok(KeelConfig::default()),
    }
}

fn discover() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("keel").join("config.yaml"))
        .filter(|p| p.is_file())
}

fn load_from(path: &Path) -> Result<KeelConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(KeelConfig::default());
    }
    serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use keel_renderer::CacheMode;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = TempDir::new().expect("tmp");
        let path = dir.path().join("keel.yaml");
        std::fs::write(
            &path,
            "engine:\n  programCache:\n    bounded: 500\nrender:\n  enableValidation: false\n",
        )
        .expect("write");

        let config = load(Some(&path)).expect("load");
        assert_eq!(config.engine.program_cache, CacheMode::Bounded(500));
        assert_eq!(config.engine.environment_cache, CacheMode::Unbounded);
        assert!(!config.render.enable_validation);
        assert!(config.render.resource_labels.is_empty());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let dir = TempDir::new().expect("tmp");
        let path = dir.path().join("keel.yaml");
        std::fs::write(&path, "").expect("write");
        assert_eq!(load(Some(&path)).expect("load"), KeelConfig::default());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = TempDir::new().expect("tmp");
        let err = load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
