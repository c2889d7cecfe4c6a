//! Model document providers.
//!
//! A [`ModelProvider`] enumerates the currently contributing plugin keys and
//! hands out each one's raw document, plus the built-in default model under
//! [`DEFAULT_MODEL_KEY`]. The engine never touches the filesystem directly.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Result, TdmError};

/// Reserved key for the built-in structural model.
pub const DEFAULT_MODEL_KEY: &str = "technical-debt";

/// Source of model documents, keyed by contribution identifier.
pub trait ModelProvider {
    /// Plugin keys currently contributing a model document. Order is not
    /// significant; the engine sorts before processing.
    fn contributing_plugins(&self) -> Result<Vec<String>>;

    /// Raw document for a plugin key, or for [`DEFAULT_MODEL_KEY`].
    fn read_document(&self, key: &str) -> Result<String>;
}

/// Provider backed by a directory layout: one default-model file plus a
/// contributions directory of `<plugin-key>.toml` files.
#[derive(Debug, Clone)]
pub struct DirModelProvider {
    default_model: PathBuf,
    contrib_dir: Option<PathBuf>,
}

impl DirModelProvider {
    #[must_use]
    pub fn new(default_model: PathBuf, contrib_dir: Option<PathBuf>) -> Self {
        Self {
            default_model,
            contrib_dir,
        }
    }
}

impl ModelProvider for DirModelProvider {
    fn contributing_plugins(&self) -> Result<Vec<String>> {
        let Some(dir) = &self.contrib_dir else {
            return Ok(Vec::new());
        };
        if !dir.exists() {
            debug!("contributions directory {:?} does not exist", dir);
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    // The default-model key is reserved; a contribution file
                    // with that stem would shadow the structural document.
                    if stem == DEFAULT_MODEL_KEY {
                        warn!(
                            "ignoring contribution file {:?}: '{DEFAULT_MODEL_KEY}' is reserved \
                             for the default model",
                            path
                        );
                        continue;
                    }
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn read_document(&self, key: &str) -> Result<String> {
        let path = if key == DEFAULT_MODEL_KEY {
            self.default_model.clone()
        } else {
            self.contrib_dir
                .as_ref()
                .ok_or_else(|| {
                    TdmError::NotFound(format!("no contributions directory for plugin '{key}'"))
                })?
                .join(format!("{key}.toml"))
        };
        std::fs::read_to_string(&path)
            .map_err(|err| TdmError::NotFound(format!("model document {}: {err}", path.display())))
    }
}

/// In-memory provider over a fixed key→document map. Used by tests and
/// embedders that assemble documents themselves.
#[derive(Debug, Default, Clone)]
pub struct MapModelProvider {
    documents: BTreeMap<String, String>,
}

impl MapModelProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, document: &str) {
        self.documents.insert(key.to_string(), document.to_string());
    }

    #[must_use]
    pub fn with(mut self, key: &str, document: &str) -> Self {
        self.insert(key, document);
        self
    }
}

impl ModelProvider for MapModelProvider {
    fn contributing_plugins(&self) -> Result<Vec<String>> {
        Ok(self
            .documents
            .keys()
            .filter(|k| k.as_str() != DEFAULT_MODEL_KEY)
            .cloned()
            .collect())
    }

    fn read_document(&self, key: &str) -> Result<String> {
        self.documents
            .get(key)
            .cloned()
            .ok_or_else(|| TdmError::NotFound(format!("model document '{key}'")))
    }
}
