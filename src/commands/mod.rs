//! CLI command implementations

pub mod classify;
pub mod embed;
pub mod files;
pub mod index;
pub mod init;
pub mod labels;
pub mod prototypes;
pub mod search;
pub mod status;
pub mod tags;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filing_tags::core::paths::get_workspace_root;
use filing_tags::core::Config;
use filing_tags::search::EncoderModel;
use filing_tags::store::Store;
use filing_tags::tags::{Taxonomy, TaxonomyCache};

/// Everything a command needs: root, config and an open catalog
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub store: Store,
    cache: TaxonomyCache,
}

impl Workspace {
    pub fn open() -> Result<Self> {
        let root = get_workspace_root();
        let config = Config::load(&root);
        let db_path = config.db_path(&root);
        let store = Store::open(&db_path, config.store.timeout())
            .with_context(|| format!("failed to open catalog at {}", db_path.display()))?;
        let cache = TaxonomyCache::new(
            Duration::from_secs(config.taxonomy.refresh_secs),
            config.taxonomy.default_confidence_floor,
        );
        Ok(Self {
            root,
            config,
            store,
            cache,
        })
    }

    pub fn taxonomy(&self) -> Result<Arc<Taxonomy>> {
        self.cache
            .get(&self.store)
            .context("failed to load taxonomy")
    }

    /// Location of the IVF snapshot for a model
    pub fn ivf_path(&self, model: EncoderModel) -> PathBuf {
        self.root.join("index").join(format!("{}.ivf", model))
    }
}

pub fn parse_model(name: &str) -> Result<EncoderModel> {
    Ok(name.parse::<EncoderModel>()?)
}

/// Read a vector stored as a JSON array of numbers.
pub fn read_vector(path: &Path) -> Result<Vec<f32>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read vector file {}", path.display()))?;
    let vector: Vec<f32> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?;
    Ok(vector)
}
