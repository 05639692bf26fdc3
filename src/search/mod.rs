//! Embedding storage and similarity search
//!
//! Exact search goes through `EmbeddingIndex`; `IvfIndex` is an optional
//! approximate snapshot for large catalogs.

pub mod encoder;
pub mod ivf;
pub mod model;
pub mod vectordb;

pub use encoder::Encoder;
pub use ivf::IvfIndex;
pub use model::EncoderModel;
pub use vectordb::{EmbeddingIndex, FileEmbedding, IndexStats, Neighbor};
