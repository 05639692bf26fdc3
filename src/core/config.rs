//! Catalog configuration
//!
//! Loaded from `filing.json` in the workspace root. Every field has a default,
//! so a partial file (or no file) is valid. Defaults for `label_source`,
//! `split` and `confidence_floor` are applied here rather than relying on
//! column defaults, so behavior does not depend on the store.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::labels::{LabelSource, Split};
use crate::search::model::{EncoderModel, DEFAULT_MINILM_MODEL, DEFAULT_MPNET_MODEL};

pub const CONFIG_FILE: &str = "filing.json";
pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub labels: LabelDefaults,

    #[serde(default)]
    pub taxonomy: TaxonomyConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub index: IndexConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database path, relative to the workspace root unless absolute
    #[serde(default = "default_db_path")]
    pub path: String,

    /// How long a store call waits on a lock before failing as retryable
    #[serde(default = "default_timeout_ms", rename = "timeoutMs")]
    pub timeout_ms: u64,
}

fn default_db_path() -> String {
    "filing.db".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LabelDefaults {
    #[serde(default)]
    pub source: LabelSource,

    #[serde(default)]
    pub split: Split,
}

impl Default for LabelDefaults {
    fn default() -> Self {
        Self {
            source: LabelSource::Human,
            split: Split::Train,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default = "default_confidence_floor", rename = "defaultConfidenceFloor")]
    pub default_confidence_floor: f32,

    /// Seconds before a cached taxonomy snapshot is reloaded
    #[serde(default = "default_refresh_secs", rename = "refreshSecs")]
    pub refresh_secs: u64,
}

fn default_confidence_floor() -> f32 {
    DEFAULT_CONFIDENCE_FLOOR
}

fn default_refresh_secs() -> u64 {
    300
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            default_confidence_floor: default_confidence_floor(),
            refresh_secs: default_refresh_secs(),
        }
    }
}

/// Model identifiers recorded next to each stored vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_minilm")]
    pub minilm: String,

    #[serde(default = "default_mpnet")]
    pub mpnet: String,
}

fn default_minilm() -> String {
    DEFAULT_MINILM_MODEL.to_string()
}

fn default_mpnet() -> String {
    DEFAULT_MPNET_MODEL.to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            minilm: default_minilm(),
            mpnet: default_mpnet(),
        }
    }
}

impl ModelsConfig {
    pub fn model_id(&self, model: EncoderModel) -> &str {
        match model {
            EncoderModel::Minilm => &self.minilm,
            EncoderModel::Mpnet => &self.mpnet,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Sub-cluster centroids per tag (k of the prototype k-means)
    #[serde(default = "default_one", rename = "prototypeClusters")]
    pub prototype_clusters: usize,

    #[serde(default = "default_iterations", rename = "maxIterations")]
    pub max_iterations: usize,

    /// How many classified tags `label_file` assigns as primary
    #[serde(default = "default_one", rename = "maxPrimaryLabels")]
    pub max_primary_labels: usize,

    /// Restrict prototype training data to one split (None = all splits)
    #[serde(default, rename = "prototypeSplit")]
    pub prototype_split: Option<Split>,
}

fn default_one() -> usize {
    1
}

fn default_iterations() -> usize {
    25
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            prototype_clusters: 1,
            max_iterations: default_iterations(),
            max_primary_labels: 1,
            prototype_split: None,
        }
    }
}

/// Inverted-file index parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_lists")]
    pub lists: usize,

    #[serde(default = "default_probes")]
    pub probes: usize,
}

fn default_lists() -> usize {
    100
}

fn default_probes() -> usize {
    10
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            lists: default_lists(),
            probes: default_probes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            store: StoreConfig::default(),
            labels: LabelDefaults::default(),
            taxonomy: TaxonomyConfig::default(),
            models: ModelsConfig::default(),
            classifier: ClassifierConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the workspace root, falling back to defaults.
    pub fn load(root: &Path) -> Self {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => {
                if config.version > CONFIG_VERSION {
                    tracing::warn!(
                        version = config.version,
                        supported = CONFIG_VERSION,
                        "config version is newer than supported"
                    );
                }
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(root.join(CONFIG_FILE), content)?;
        Ok(())
    }

    /// Database path resolved against the workspace root
    pub fn db_path(&self, root: &Path) -> PathBuf {
        let path = Path::new(&self.store.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, 1);
        assert_eq!(config.taxonomy.default_confidence_floor, 0.60);
        assert_eq!(config.labels.source, LabelSource::Human);
        assert_eq!(config.labels.split, Split::Train);
        assert_eq!(config.classifier.prototype_clusters, 1);
    }

    #[test]
    fn test_parse_partial_config() {
        let json = r#"{"labels": {"split": "val"}, "store": {"timeoutMs": 250}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.labels.split, Split::Val);
        assert_eq!(config.labels.source, LabelSource::Human);
        assert_eq!(config.store.timeout(), Duration::from_millis(250));
        assert_eq!(config.store.path, "filing.db");
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).index.lists, 100);

        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert_eq!(Config::load(dir.path()).index.probes, 10);
    }

    #[test]
    fn test_save_roundtrip_and_db_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.classifier.prototype_clusters = 3;
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path());
        assert_eq!(loaded.classifier.prototype_clusters, 3);
        assert_eq!(loaded.db_path(dir.path()), dir.path().join("filing.db"));
    }
}
