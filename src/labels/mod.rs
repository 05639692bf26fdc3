//! File/tag label associations (`file_tag_labels`)

mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use store::{FileLabel, LabelStore};
pub(crate) use store::rederive_ancestors;

/// Who produced a label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSource {
    #[default]
    Human,
    Rule,
    Model,
}

impl LabelSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelSource::Human => "human",
            LabelSource::Rule => "rule",
            LabelSource::Model => "model",
        }
    }
}

impl fmt::Display for LabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(LabelSource::Human),
            "rule" => Ok(LabelSource::Rule),
            "model" => Ok(LabelSource::Model),
            other => Err(Error::InvalidValue {
                field: "label_source",
                value: other.to_string(),
            }),
        }
    }
}

/// Dataset partition a labeled file belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Train,
    Test,
    Val,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
            Split::Val => "val",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            "val" => Ok(Split::Val),
            other => Err(Error::InvalidValue {
                field: "split",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_and_split() {
        assert_eq!("rule".parse::<LabelSource>().unwrap(), LabelSource::Rule);
        assert_eq!("val".parse::<Split>().unwrap(), Split::Val);
        assert!(matches!(
            "validation".parse::<Split>(),
            Err(Error::InvalidValue { field: "split", .. })
        ));
        assert_eq!(LabelSource::default(), LabelSource::Human);
        assert_eq!(Split::default().to_string(), "train");
    }
}
