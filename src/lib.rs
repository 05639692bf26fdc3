//! Hierarchical filing tags with embedding-based retrieval and classification
//!
//! # Components
//!
//! - `tags`: taxonomy of filing tags (parent links, confidence floors, ranks)
//! - `labels`: per-file primary labels with ancestor propagation
//! - `search`: per-model file embeddings and nearest-neighbor search
//! - `classify`: tag prototypes (centroids) and floor-gated classification
//! - `store`: the SQLite catalog the above share

pub mod classify;
pub mod core;
pub mod error;
pub mod labels;
pub mod search;
pub mod store;
pub mod tags;

pub use error::{Error, Result};
