//! Encoder model slots
//!
//! `file_embeddings` carries one column pair per model (`minilm_*`, `mpnet_*`),
//! so the set of models is closed and each has a fixed dimensionality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Short-text MiniLM model dimension
pub const MINILM_DIM: usize = 384;
/// MPNet model dimension
pub const MPNET_DIM: usize = 768;

pub const DEFAULT_MINILM_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_MPNET_MODEL: &str = "all-mpnet-base-v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderModel {
    Minilm,
    Mpnet,
}

impl EncoderModel {
    pub const ALL: [EncoderModel; 2] = [EncoderModel::Minilm, EncoderModel::Mpnet];

    pub fn dimension(self) -> usize {
        match self {
            EncoderModel::Minilm => MINILM_DIM,
            EncoderModel::Mpnet => MPNET_DIM,
        }
    }

    /// Name stored in `tag_prototypes.model_name` and used as column prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            EncoderModel::Minilm => "minilm",
            EncoderModel::Mpnet => "mpnet",
        }
    }

    pub(crate) fn model_column(self) -> &'static str {
        match self {
            EncoderModel::Minilm => "minilm_model",
            EncoderModel::Mpnet => "mpnet_model",
        }
    }

    pub(crate) fn embedding_column(self) -> &'static str {
        match self {
            EncoderModel::Minilm => "minilm_emb",
            EncoderModel::Mpnet => "mpnet_emb",
        }
    }

    pub fn other(self) -> EncoderModel {
        match self {
            EncoderModel::Minilm => EncoderModel::Mpnet,
            EncoderModel::Mpnet => EncoderModel::Minilm,
        }
    }

    /// Reject vectors of the wrong length or with NaN/inf components.
    pub fn check_vector(self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                model: self,
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteVector);
        }
        Ok(())
    }
}

impl fmt::Display for EncoderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncoderModel {
    type Err = Error;

    /// Accepts slot names as well as the sentence-transformers model ids.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "minilm" | "all-minilm-l6-v2" => Ok(EncoderModel::Minilm),
            "mpnet" | "all-mpnet-base-v2" => Ok(EncoderModel::Mpnet),
            _ => Err(Error::UnknownModel(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_names() {
        assert_eq!("minilm".parse::<EncoderModel>().unwrap(), EncoderModel::Minilm);
        assert_eq!(
            "all-mpnet-base-v2".parse::<EncoderModel>().unwrap(),
            EncoderModel::Mpnet
        );
        assert!(matches!(
            "gist".parse::<EncoderModel>(),
            Err(Error::UnknownModel(_))
        ));
    }

    #[test]
    fn test_check_vector() {
        assert!(EncoderModel::Minilm.check_vector(&vec![0.0; 384]).is_ok());

        let err = EncoderModel::Mpnet.check_vector(&vec![0.0; 384]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 768,
                actual: 384,
                ..
            }
        ));

        let mut bad = vec![0.0; 384];
        bad[3] = f32::NAN;
        assert!(matches!(
            EncoderModel::Minilm.check_vector(&bad),
            Err(Error::NonFiniteVector)
        ));
    }
}
