//! BaseData Catalog
//!
//! Static mapping from a short base dataset key to its display label, loaded
//! once at startup from `BASE_DATA.json`:
//!
//! ```json
//! { "plain": "Empty database - upload own data", "pancake": "Pancake dataset" }
//! ```
//!
//! Every key except [`BLANK_KEY`] names a seed file `<key>.db` in the data
//! directory that new private stores are copied from. Entries keep file
//! order; the first one is the default selection of the consent dialog.

use crate::error::{AppError, AppResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Sentinel key for "start with an empty store".
pub const BLANK_KEY: &str = "plain";

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("key pattern is valid"));

/// One selectable base dataset.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BaseDataEntry {
    pub key: String,
    pub label: String,
}

/// Read-only catalog of base datasets.
#[derive(Debug, Clone, Default)]
pub struct BaseDataCatalog {
    entries: Vec<BaseDataEntry>,
}

impl BaseDataCatalog {
    /// Build a catalog from key/label pairs, validating every key.
    pub fn from_entries<I, K, V>(entries: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut catalog = Self::default();
        for (key, label) in entries {
            let key = key.into();
            if !KEY_PATTERN.is_match(&key) {
                return Err(AppError::InvalidCatalog(format!(
                    "key '{key}' is not a plain file stem"
                )));
            }
            if catalog.contains(&key) {
                return Err(AppError::InvalidCatalog(format!("duplicate key '{key}'")));
            }
            catalog.entries.push(BaseDataEntry {
                key,
                label: label.into(),
            });
        }
        Ok(catalog)
    }

    /// Parse the JSON catalog text.
    pub fn from_json(json: &str) -> AppResult<Self> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut pairs = Vec::with_capacity(raw.len());
        for (key, label) in raw {
            match label {
                serde_json::Value::String(label) => pairs.push((key, label)),
                other => {
                    return Err(AppError::InvalidCatalog(format!(
                        "label of '{key}' must be a string, got {other}"
                    )))
                }
            }
        }
        Self::from_entries(pairs)
    }

    /// Load the catalog file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&contents)?;
        tracing::info!(path = %path.display(), entries = catalog.len(), "base_data_catalog_loaded");
        Ok(catalog)
    }

    /// Check that each non-blank key has its seed file in `data_dir`.
    pub fn validate_seed_files(&self, data_dir: &Path) -> AppResult<()> {
        for entry in self.entries.iter().filter(|e| !is_blank(&e.key)) {
            let path = seed_path(data_dir, &entry.key);
            if !path.is_file() {
                return Err(AppError::MissingSeedFile {
                    key: entry.key.clone(),
                    path,
                });
            }
        }
        Ok(())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.label.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Preselected dataset: the first entry of the file.
    pub fn default_key(&self) -> Option<&str> {
        self.entries.first().map(|e| e.key.as_str())
    }

    /// Entries in file order.
    pub fn entries(&self) -> Vec<BaseDataEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `key` is the empty-store sentinel.
pub fn is_blank(key: &str) -> bool {
    key == BLANK_KEY
}

/// Seed file backing a base dataset key.
pub fn seed_path(data_dir: &Path, key: &str) -> PathBuf {
    data_dir.join(format!("{key}.db"))
}
