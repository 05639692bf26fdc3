//! In-memory filing-tag hierarchy
//!
//! Held as label -> tag (with parent) plus a children index. All walks are
//! iterative, so deep hierarchies cannot exhaust the stack.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::config::DEFAULT_CONFIDENCE_FLOOR;
use crate::error::{Error, Result};

/// A filing tag (`filing_tags` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub parent_label: Option<String>,
    pub description: Option<String>,
    /// Lower rank wins classification ties
    pub importance_rank: Option<i32>,
    pub confidence_floor: Option<f32>,
}

impl Tag {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parent_label: None,
            description: None,
            importance_rank: None,
            confidence_floor: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_label = Some(parent.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rank(mut self, rank: i32) -> Self {
        self.importance_rank = Some(rank);
        self
    }

    pub fn with_floor(mut self, floor: f32) -> Self {
        self.confidence_floor = Some(floor);
        self
    }

    /// "label - description", the form used in filing-code lists
    pub fn display_label(&self) -> String {
        match &self.description {
            Some(d) => format!("{} - {}", self.label, d),
            None => self.label.clone(),
        }
    }
}

/// Tag forest with ancestor/descendant queries
#[derive(Debug, Clone)]
pub struct Taxonomy {
    tags: BTreeMap<String, Tag>,
    children: BTreeMap<String, BTreeSet<String>>,
    default_floor: f32,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_FLOOR)
    }
}

impl Taxonomy {
    pub fn new(default_floor: f32) -> Self {
        Self {
            tags: BTreeMap::new(),
            children: BTreeMap::new(),
            default_floor,
        }
    }

    /// Build from stored rows in any order, rejecting dangling parents and cycles.
    pub fn from_tags(tags: Vec<Tag>, default_floor: f32) -> Result<Self> {
        let mut taxonomy = Self::new(default_floor);
        for tag in tags {
            if let Some(parent) = &tag.parent_label {
                taxonomy
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .insert(tag.label.clone());
            }
            taxonomy.tags.insert(tag.label.clone(), tag);
        }

        for tag in taxonomy.tags.values() {
            if let Some(parent) = &tag.parent_label {
                if !taxonomy.tags.contains_key(parent) {
                    return Err(Error::UnknownTag(parent.clone()));
                }
            }
            // A walk longer than the tag count has revisited a tag
            let mut current = tag.parent_label.as_deref();
            let mut steps = 0;
            while let Some(label) = current {
                steps += 1;
                if label == tag.label || steps > taxonomy.tags.len() {
                    return Err(Error::Cycle {
                        label: tag.label.clone(),
                        parent: tag.parent_label.clone().unwrap_or_default(),
                    });
                }
                current = taxonomy.tags.get(label).and_then(|t| t.parent_label.as_deref());
            }
        }

        Ok(taxonomy)
    }

    pub fn default_floor(&self) -> f32 {
        self.default_floor
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.tags.contains_key(label)
    }

    pub fn get(&self, label: &str) -> Option<&Tag> {
        self.tags.get(label)
    }

    /// Tags in label order
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    fn require(&self, label: &str) -> Result<&Tag> {
        self.tags
            .get(label)
            .ok_or_else(|| Error::UnknownTag(label.to_string()))
    }

    /// Validate a tag against the current hierarchy without changing it.
    ///
    /// Used for both inserts and updates: the new parent's chain to the root
    /// must not pass through the tag itself.
    pub fn check(&self, tag: &Tag) -> Result<()> {
        if let Some(floor) = tag.confidence_floor {
            if !(0.0..=1.0).contains(&floor) {
                return Err(Error::InvalidConfidenceFloor {
                    label: tag.label.clone(),
                    floor,
                });
            }
        }

        let Some(parent) = &tag.parent_label else {
            return Ok(());
        };
        let cycle = || Error::Cycle {
            label: tag.label.clone(),
            parent: parent.clone(),
        };
        if parent == &tag.label {
            return Err(cycle());
        }
        self.require(parent)?;

        let mut current = Some(parent.as_str());
        while let Some(label) = current {
            if label == tag.label {
                return Err(cycle());
            }
            current = self.tags.get(label).and_then(|t| t.parent_label.as_deref());
        }
        Ok(())
    }

    /// Insert a new tag.
    pub fn add_tag(&mut self, tag: Tag) -> Result<()> {
        if self.tags.contains_key(&tag.label) {
            return Err(Error::DuplicateTag(tag.label));
        }
        self.check(&tag)?;
        self.link(&tag);
        self.tags.insert(tag.label.clone(), tag);
        Ok(())
    }

    /// Replace an existing tag (re-parenting allowed), returning the old one.
    pub fn update_tag(&mut self, tag: Tag) -> Result<Tag> {
        self.require(&tag.label)?;
        self.check(&tag)?;

        let previous = self
            .tags
            .insert(tag.label.clone(), tag.clone())
            .ok_or_else(|| Error::UnknownTag(tag.label.clone()))?;
        self.unlink(&previous);
        self.link(&tag);
        Ok(previous)
    }

    /// Remove a tag that has no children.
    pub fn remove_tag(&mut self, label: &str) -> Result<Tag> {
        self.require(label)?;
        let children = self.children.get(label).map_or(0, |c| c.len());
        if children > 0 {
            return Err(Error::TagInUse {
                label: label.to_string(),
                children,
                labels: 0,
            });
        }

        let tag = self
            .tags
            .remove(label)
            .ok_or_else(|| Error::UnknownTag(label.to_string()))?;
        self.unlink(&tag);
        self.children.remove(label);
        Ok(tag)
    }

    fn link(&mut self, tag: &Tag) {
        if let Some(parent) = &tag.parent_label {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(tag.label.clone());
        }
    }

    fn unlink(&mut self, tag: &Tag) {
        if let Some(parent) = &tag.parent_label {
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.remove(&tag.label);
                if siblings.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }

    /// Immediate parent first, root last. Empty for a root tag.
    pub fn ancestors_of(&self, label: &str) -> Result<Vec<String>> {
        let tag = self.require(label)?;
        let mut ancestors = Vec::new();
        let mut current = tag.parent_label.as_deref();
        while let Some(parent) = current {
            ancestors.push(parent.to_string());
            current = self.tags.get(parent).and_then(|t| t.parent_label.as_deref());
        }
        Ok(ancestors)
    }

    /// Every tag below `label`, excluding the tag itself.
    pub fn descendants_of(&self, label: &str) -> Result<BTreeSet<String>> {
        self.require(label)?;
        let mut descendants = BTreeSet::new();
        let mut stack = vec![label];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.children.get(current) {
                for child in children {
                    if descendants.insert(child.clone()) {
                        stack.push(child.as_str());
                    }
                }
            }
        }
        Ok(descendants)
    }

    pub fn children_of(&self, label: &str) -> Result<Vec<&str>> {
        self.require(label)?;
        Ok(self
            .children
            .get(label)
            .map(|c| c.iter().map(String::as_str).collect())
            .unwrap_or_default())
    }

    /// The tag's floor, or the configured default when unset.
    pub fn confidence_floor(&self, label: &str) -> Result<f32> {
        Ok(self
            .require(label)?
            .confidence_floor
            .unwrap_or(self.default_floor))
    }

    pub fn importance_rank(&self, label: &str) -> Result<Option<i32>> {
        Ok(self.require(label)?.importance_rank)
    }

    /// Leaf tags are the only ones a classifier may assign as primary.
    pub fn is_leaf(&self, label: &str) -> Result<bool> {
        self.require(label)?;
        Ok(!self.children.contains_key(label))
    }

    pub fn leaves(&self) -> Vec<&str> {
        self.tags
            .keys()
            .filter(|l| !self.children.contains_key(l.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn roots(&self) -> Vec<&str> {
        self.tags
            .values()
            .filter(|t| t.parent_label.is_none())
            .map(|t| t.label.as_str())
            .collect()
    }

    /// Depth-first (label order) listing with depth, for tree rendering.
    pub fn walk(&self) -> Vec<(usize, &Tag)> {
        let mut out = Vec::with_capacity(self.tags.len());
        let mut stack: Vec<(usize, &str)> = self.roots().into_iter().rev().map(|r| (0, r)).collect();
        while let Some((depth, label)) = stack.pop() {
            if let Some(tag) = self.tags.get(label) {
                out.push((depth, tag));
            }
            if let Some(children) = self.children.get(label) {
                for child in children.iter().rev() {
                    stack.push((depth + 1, child.as_str()));
                }
            }
        }
        out
    }
}
