// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Semantic tags and the class-name → tag lookup table.

use serde::{Deserialize, Serialize};
use std::{
    borrow::Borrow,
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// A semantic category label attached to ground-truth objects, such as
/// `"Chair"` or `"Door"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Tag(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag(s.to_string())
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Tag(s)
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Translates class names reported by a perception system (an external
/// ontology) into ground-truth tags.
///
/// Resolution checks the explicit mappings first, then accepts the class
/// name itself when it is a tag of the vocabulary. Anything else is not
/// resolvable; callers skip such detections instead of scoring them.
///
/// # Examples
///
/// ```rust
/// use vhome_eval::{ClassMatching, Tag};
///
/// let classes = ClassMatching::new()
///     .with_vocabulary(["Chair", "Couch", "Table"])
///     .with_mapping("sofa", "Couch");
///
/// assert_eq!(classes.resolve("sofa"), Some(&Tag::new("Couch")));
/// assert_eq!(classes.resolve("Chair"), Some(&Tag::new("Chair")));
/// assert_eq!(classes.resolve("Lamp"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMatching {
    /// Class name in the external ontology → tag.
    #[serde(default)]
    mappings: BTreeMap<String, Tag>,
    /// Every valid tag.
    #[serde(default)]
    vocabulary: BTreeSet<Tag>,
}

impl ClassMatching {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tags to the vocabulary.
    pub fn with_vocabulary<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        self.vocabulary.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Maps an ontology class name onto a tag, adding the tag to the
    /// vocabulary.
    pub fn with_mapping(mut self, class: impl Into<String>, tag: impl Into<Tag>) -> Self {
        let tag = tag.into();
        self.vocabulary.insert(tag.clone());
        self.mappings.insert(class.into(), tag);
        self
    }

    /// Resolves a class name to its tag.
    pub fn resolve(&self, class: &str) -> Option<&Tag> {
        self.mappings
            .get(class)
            .or_else(|| self.vocabulary.get(class))
    }

    pub fn vocabulary(&self) -> impl Iterator<Item = &Tag> {
        self.vocabulary.iter()
    }

    pub fn mappings(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.mappings.iter().map(|(class, tag)| (class.as_str(), tag))
    }

    pub fn is_vocabulary_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }
}
