//! Configuration for the tdm binary.
//!
//! Defaults are overlaid with optional TOML patch files: an explicit path
//! (flag or `TDM_CONFIG`) wins outright; otherwise a global user config and
//! a per-root `tdm.toml` are merged in that order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TdmError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path, relative to the model root.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("tdm.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default structural model document.
    pub default_model: PathBuf,
    /// Directory of `<plugin-key>.toml` contribution documents.
    pub contrib_dir: PathBuf,
    /// Optional rule table backing the rule resolver.
    pub rules_file: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: PathBuf::from("model/technical-debt.toml"),
            contrib_dir: PathBuf::from("model/contrib"),
            rules_file: None,
        }
    }
}

impl Config {
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("TDM_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&root.join("tdm.toml"))? {
                config.merge_patch(project);
            }
        }

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("tdm/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| TdmError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| TdmError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(db_path) = storage.db_path {
                self.storage.db_path = db_path;
            }
        }
        if let Some(model) = patch.model {
            if let Some(default_model) = model.default_model {
                self.model.default_model = default_model;
            }
            if let Some(contrib_dir) = model.contrib_dir {
                self.model.contrib_dir = contrib_dir;
            }
            if let Some(rules_file) = model.rules_file {
                self.model.rules_file = Some(rules_file);
            }
        }
    }

    /// Resolve a configured path against the model root.
    #[must_use]
    pub fn resolve(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    model: Option<ModelPatch>,
}

#[derive(Debug, Deserialize)]
struct StoragePatch {
    db_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ModelPatch {
    default_model: Option<PathBuf>,
    contrib_dir: Option<PathBuf>,
    rules_file: Option<PathBuf>,
}
