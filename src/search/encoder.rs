//! Text encoder abstraction
//!
//! The encoders themselves (sentence-transformers models) live outside this
//! crate. Anything that can turn text into a vector for a model slot can be
//! plugged into the index through this trait.

use super::model::EncoderModel;

pub trait Encoder: Send + Sync {
    /// Encode `text` with the given model; the vector length must equal
    /// `model.dimension()`.
    fn encode(&self, text: &str, model: EncoderModel) -> anyhow::Result<Vec<f32>>;

    /// Model identifier recorded next to stored vectors, if it differs from
    /// the configured one.
    fn model_id(&self, _model: EncoderModel) -> Option<&str> {
        None
    }
}
