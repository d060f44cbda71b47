//! Plain data types shared by stores, transactions and the follower protocol.

use serde::Deserialize;
use serde::Serialize;
use strata_layer::Subspace;
use strata_layer::strinc;

/// Commit version. Versions start at 0 (empty store) and strictly increase.
pub type Version = u64;

/// A single write in a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Set `key` to `value`.
    Set { key: Vec<u8>, value: Vec<u8> },
    /// Remove `key`.
    Clear { key: Vec<u8> },
}

impl Mutation {
    /// The key this mutation writes.
    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Set { key, .. } | Mutation::Clear { key } => key,
        }
    }
}

/// All mutations committed at one version, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedMutations {
    pub version: Version,
    pub mutations: Vec<Mutation>,
}

/// A key with its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Half-open key range `[begin, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub begin: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Range from explicit bounds.
    pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// Range containing exactly `key`.
    pub fn single(key: &[u8]) -> Self {
        let mut end = key.to_vec();
        end.push(0x00);
        Self {
            begin: key.to_vec(),
            end,
        }
    }

    /// Every key starting with `prefix`.
    ///
    /// A prefix of only `0xFF` bytes (or an empty prefix) extends to the end
    /// of the keyspace, represented by an end of `[0xFF; prefix.len() + 1]`.
    pub fn prefix(prefix: &[u8]) -> Self {
        let end = strinc(prefix).unwrap_or_else(|| vec![0xFF; prefix.len() + 1]);
        Self {
            begin: prefix.to_vec(),
            end,
        }
    }

    /// Every key in a subspace, including raw suffixes.
    pub fn subspace(subspace: &Subspace) -> Self {
        let (begin, end) = subspace.raw_range();
        Self { begin, end }
    }

    /// True when `begin <= key < end`.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && key < self.end.as_slice()
    }

    /// True when the range holds no keys.
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}
