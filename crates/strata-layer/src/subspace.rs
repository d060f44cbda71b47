//! Key namespaces built from a raw byte prefix.

use snafu::ResultExt;
use snafu::Snafu;

use crate::tuple::Tuple;
use crate::tuple::TupleError;

/// Errors from subspace key operations.
#[derive(Debug, Snafu)]
pub enum SubspaceError {
    /// Key does not start with the subspace prefix.
    #[snafu(display("key is not in subspace (prefix length {prefix_len})"))]
    KeyNotInSubspace {
        /// Length of the subspace prefix.
        prefix_len: usize,
    },

    /// Suffix after the prefix is not a valid packed tuple.
    #[snafu(display("failed to unpack key suffix: {source}"))]
    UnpackSuffix {
        /// Underlying tuple error.
        source: TupleError,
    },
}

/// A keyspace namespace identified by a raw byte prefix.
///
/// Keys inside a subspace are either packed tuples (`pack`/`unpack`) or raw
/// byte suffixes (`key`/`strip`), depending on the container built on top.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    /// Subspace whose prefix is the packed form of `tuple`.
    pub fn new(tuple: Tuple) -> Self {
        Self { prefix: tuple.pack() }
    }

    /// Subspace over an arbitrary byte prefix.
    pub fn from_bytes(prefix: impl Into<Vec<u8>>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// The raw prefix bytes.
    pub fn raw_prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Child subspace whose prefix is this prefix followed by `suffix` verbatim.
    pub fn with_suffix(&self, suffix: &[u8]) -> Subspace {
        let mut prefix = Vec::with_capacity(self.prefix.len() + suffix.len());
        prefix.extend_from_slice(&self.prefix);
        prefix.extend_from_slice(suffix);
        Subspace { prefix }
    }

    /// Child subspace whose prefix is this prefix followed by a packed tuple.
    pub fn subspace(&self, tuple: &Tuple) -> Subspace {
        Subspace { prefix: self.pack(tuple) }
    }

    /// Prefix followed by the packed tuple.
    pub fn pack(&self, tuple: &Tuple) -> Vec<u8> {
        let mut key = self.prefix.clone();
        tuple.pack_into(&mut key);
        key
    }

    /// Decode the tuple that follows the prefix.
    pub fn unpack(&self, key: &[u8]) -> Result<Tuple, SubspaceError> {
        let suffix = self.strip(key)?;
        Tuple::unpack(suffix).context(UnpackSuffixSnafu)
    }

    /// Prefix followed by raw bytes.
    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + suffix.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(suffix);
        key
    }

    /// The bytes of `key` after the prefix.
    pub fn strip<'a>(&self, key: &'a [u8]) -> Result<&'a [u8], SubspaceError> {
        key.strip_prefix(self.prefix.as_slice()).ok_or(SubspaceError::KeyNotInSubspace {
            prefix_len: self.prefix.len(),
        })
    }

    /// True when `key` starts with the prefix.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Range `[prefix ++ 0x00, prefix ++ 0xFF)` covering every packed tuple key.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let mut start = self.prefix.clone();
        start.push(0x00);
        let mut end = self.prefix.clone();
        end.push(0xFF);
        (start, end)
    }

    /// Range `[prefix, strinc(prefix))` covering every key with this prefix,
    /// including the prefix itself and raw suffixes.
    ///
    /// A prefix made only of `0xFF` bytes has no successor; the end is then
    /// the prefix followed by `0xFF`, which still covers all packed tuples.
    pub fn raw_range(&self) -> (Vec<u8>, Vec<u8>) {
        let end = strinc(&self.prefix).unwrap_or_else(|| {
            let mut end = self.prefix.clone();
            end.push(0xFF);
            end
        });
        (self.prefix.clone(), end)
    }
}

/// Smallest byte string greater than every string that starts with `key`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is
/// incremented. Returns `None` when `key` is empty or all `0xFF`.
pub fn strinc(key: &[u8]) -> Option<Vec<u8>> {
    let last = key.iter().rposition(|&b| b != 0xFF)?;
    let mut out = key[..=last].to_vec();
    out[last] += 1;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let sub = Subspace::from_bytes(b"\xff/tenant/tombstones/".to_vec());
        let key = sub.pack(&Tuple::new().push(42i64));
        assert!(key.starts_with(b"\xff/tenant/tombstones/"));
        assert_eq!(sub.unpack(&key).unwrap(), Tuple::new().push(42i64));
    }

    #[test]
    fn test_unpack_foreign_key() {
        let sub = Subspace::from_bytes(b"a/".to_vec());
        let err = sub.unpack(b"b/x").unwrap_err();
        assert!(matches!(err, SubspaceError::KeyNotInSubspace { prefix_len: 2 }));
    }

    #[test]
    fn test_raw_key_and_strip() {
        let sub = Subspace::from_bytes(b"\xff/").with_suffix(b"tenantMap/");
        let key = sub.key(b"alpha");
        assert_eq!(key, b"\xff/tenantMap/alpha".to_vec());
        assert_eq!(sub.strip(&key).unwrap(), b"alpha");
    }

    #[test]
    fn test_nested_subspace() {
        let root = Subspace::new(Tuple::new().push("root"));
        let child = root.subspace(&Tuple::new().push(1i64));
        let key = child.pack(&Tuple::new().push("k"));
        assert!(root.contains(&key));
        assert!(child.contains(&key));
        assert_eq!(root.unpack(&key).unwrap(), Tuple::new().push(1i64).push("k"));
    }

    #[test]
    fn test_ranges() {
        let sub = Subspace::from_bytes(b"p/".to_vec());
        let (start, end) = sub.range();
        let key = sub.pack(&Tuple::new().push("x"));
        assert!(start <= key && key < end);

        let (raw_start, raw_end) = sub.raw_range();
        assert_eq!(raw_start, b"p/".to_vec());
        assert_eq!(raw_end, b"p0".to_vec());
        assert!(sub.key(b"\xff\xff") < raw_end);
    }

    #[test]
    fn test_strinc() {
        assert_eq!(strinc(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(strinc(b"a\xff\xff"), Some(b"b".to_vec()));
        assert_eq!(strinc(b"\xff\xff"), None);
        assert_eq!(strinc(b""), None);
    }

    #[test]
    fn test_raw_range_all_ff_prefix() {
        let sub = Subspace::from_bytes(vec![0xFF]);
        let (start, end) = sub.raw_range();
        assert_eq!(start, vec![0xFF]);
        assert_eq!(end, vec![0xFF, 0xFF]);
    }
}
