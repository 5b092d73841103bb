use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// An ordered set of permission tags (`view`, `query`, `update`, ...).
///
/// Tags keep the order in which they were first seen. A missing tag always
/// means "not permitted"; there is no wildcard tag. Equality compares the
/// sets and ignores order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Flags(Vec<String>);

impl Flags {
    /// The empty set (no permission at all).
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns `true` if `tag` is present.
    pub fn has(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    /// Set union. Tags of `self` come first, followed by tags only present in
    /// `other`, each in first-seen order.
    pub fn union(&self, other: &Flags) -> Flags {
        let mut out = self.clone();
        for tag in &other.0 {
            out.insert(tag);
        }
        out
    }

    /// Set intersection, in the order of `self`.
    pub fn intersection(&self, other: &Flags) -> Flags {
        Flags(self.0.iter().filter(|t| other.has(t)).cloned().collect())
    }

    /// Add a tag unless already present. Returns `true` if it was added.
    pub fn insert(&mut self, tag: &str) -> bool {
        if self.has(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl PartialEq for Flags {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|t| other.has(t))
    }
}

impl Eq for Flags {}

impl<S: AsRef<str>> FromIterator<S> for Flags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut flags = Flags::new();
        for tag in iter {
            flags.insert(tag.as_ref());
        }
        flags
    }
}

impl<const N: usize> From<[&str; N]> for Flags {
    fn from(tags: [&str; N]) -> Self {
        tags.into_iter().collect()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

// Duplicates in a settings file collapse instead of failing the load.
impl<'de> Deserialize<'de> for Flags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Vec::<String>::deserialize(deserializer)?;
        Ok(tags.into_iter().collect())
    }
}
