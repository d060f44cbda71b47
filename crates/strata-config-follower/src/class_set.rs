//! Configuration class filter.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use strata_constants::follower::MAX_CONFIG_CLASSES;

/// A set of configuration class names.
///
/// Requests carry one to restrict which class-scoped knobs the responder
/// returns. Membership is exact byte equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigClassSet {
    classes: BTreeSet<Vec<u8>>,
}

impl ConfigClassSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class. Returns false if it was already present or the set is
    /// full.
    pub fn insert(&mut self, class: impl Into<Vec<u8>>) -> bool {
        if self.classes.len() >= MAX_CONFIG_CLASSES as usize {
            return false;
        }
        self.classes.insert(class.into())
    }

    /// Pure membership test.
    pub fn contains(&self, class: &[u8]) -> bool {
        self.classes.contains(class)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.classes.iter().map(Vec::as_slice)
    }
}

impl<C: Into<Vec<u8>>> FromIterator<C> for ConfigClassSet {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        let mut set = Self::new();
        for class in iter {
            set.insert(class);
        }
        set
    }
}
