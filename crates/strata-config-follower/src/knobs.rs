//! Knob keyspace and class filtering.
//!
//! Knobs live under [`KNOB_SUBSPACE`] keyed by the tuple `(class, name)`,
//! where `class` is null for global knobs. Values are postcard-encoded
//! [`KnobValue`]s.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use strata_constants::follower::KNOB_SUBSPACE;
use strata_kv::ChangeSink;
use strata_kv::Mutation;
use strata_kv::Transaction;
use strata_kv::Version;
use strata_kv::VersionedMutations;
use strata_kv::VersionedStore;
use strata_layer::Element;
use strata_layer::Subspace;
use strata_layer::Tuple;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::warn;

use crate::class_set::ConfigClassSet;
use crate::error::FollowerError;

/// A typed knob value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KnobValue {
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl KnobValue {
    pub fn encode(&self) -> Result<Vec<u8>, FollowerError> {
        postcard::to_allocvec(self).map_err(|e| FollowerError::Codec {
            reason: format!("knob value: {e}"),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FollowerError> {
        postcard::from_bytes(bytes).map_err(|e| FollowerError::Codec {
            reason: format!("knob value: {e}"),
        })
    }
}

/// Identity of one knob: optional class scope plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KnobKey {
    /// `None` for global knobs.
    pub config_class: Option<Vec<u8>>,
    pub name: String,
}

impl KnobKey {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            config_class: None,
            name: name.into(),
        }
    }

    pub fn scoped(config_class: impl Into<Vec<u8>>, name: impl Into<String>) -> Self {
        Self {
            config_class: Some(config_class.into()),
            name: name.into(),
        }
    }

    /// Storage key under the knob subspace.
    pub fn pack(&self) -> Vec<u8> {
        let tuple = Tuple::new().push(self.config_class.clone()).push(self.name.as_str());
        knob_subspace().pack(&tuple)
    }

    /// Parse a storage key. Returns `Ok(None)` for keys outside the knob
    /// subspace.
    pub fn unpack(key: &[u8]) -> Result<Option<Self>, FollowerError> {
        let subspace = knob_subspace();
        if !subspace.contains(key) {
            return Ok(None);
        }
        let tuple = subspace.unpack(key).map_err(|e| FollowerError::Codec {
            reason: format!("knob key: {e}"),
        })?;
        let config_class = match tuple.get(0) {
            Some(Element::Null) => None,
            Some(Element::Bytes(class)) => Some(class.clone()),
            _ => {
                return Err(FollowerError::Codec {
                    reason: "knob key: class must be null or bytes".to_string(),
                });
            }
        };
        let name = tuple.get(1).and_then(Element::as_str).ok_or_else(|| FollowerError::Codec {
            reason: "knob key: missing name".to_string(),
        })?;
        if tuple.len() != 2 {
            return Err(FollowerError::Codec {
                reason: format!("knob key: expected 2 elements, got {}", tuple.len()),
            });
        }
        Ok(Some(Self {
            config_class,
            name: name.to_string(),
        }))
    }
}

/// The knob subspace.
pub fn knob_subspace() -> Subspace {
    Subspace::from_bytes(KNOB_SUBSPACE)
}

/// Write a knob inside `tx`.
pub fn set_knob<S: VersionedStore + ?Sized>(
    tx: &mut Transaction<'_, S>,
    key: &KnobKey,
    value: &KnobValue,
) -> Result<(), FollowerError> {
    tx.set(&key.pack(), &value.encode()?).map_err(FollowerError::from)
}

/// Clear a knob inside `tx`.
pub fn clear_knob<S: VersionedStore + ?Sized>(tx: &mut Transaction<'_, S>, key: &KnobKey) -> Result<(), FollowerError> {
    tx.clear(&key.pack()).map_err(FollowerError::from)
}

/// Whether `key` passes the class filter.
///
/// With no filter every key passes. Otherwise class-scoped knobs pass only
/// when their class is in the set; global knobs and keys outside the knob
/// subspace always pass. Undecodable knob keys pass so the follower sees them.
pub fn key_passes(classes: Option<&ConfigClassSet>, key: &[u8]) -> bool {
    let Some(classes) = classes else {
        return true;
    };
    match KnobKey::unpack(key) {
        Ok(Some(KnobKey {
            config_class: Some(class),
            ..
        })) => classes.contains(&class),
        _ => true,
    }
}

/// Drop filtered keys from a snapshot.
pub fn filter_snapshot(classes: Option<&ConfigClassSet>, snapshot: &mut BTreeMap<Vec<u8>, Vec<u8>>) {
    if classes.is_some() {
        snapshot.retain(|key, _| key_passes(classes, key));
    }
}

/// Drop filtered mutations from change batches. Batches left empty are kept
/// so the follower still observes the version.
pub fn filter_changes(classes: Option<&ConfigClassSet>, changes: &mut [VersionedMutations]) {
    if classes.is_none() {
        return;
    }
    for batch in changes {
        batch.mutations.retain(|m| key_passes(classes, m.key()));
    }
}

// ============================================================================
// Knob cache
// ============================================================================

#[derive(Default)]
struct KnobState {
    version: Version,
    knobs: BTreeMap<KnobKey, KnobValue>,
}

/// Latest view of all knobs a follower receives.
#[derive(Default)]
pub struct KnobCache {
    state: RwLock<KnobState>,
}

impl KnobCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the last applied snapshot or batch.
    pub async fn version(&self) -> Version {
        self.state.read().await.version
    }

    pub async fn get(&self, key: &KnobKey) -> Option<KnobValue> {
        self.state.read().await.knobs.get(key).cloned()
    }

    /// Value of `name` as seen by a member of `classes`: the first matching
    /// class-scoped value in class order, else the global value.
    pub async fn effective(&self, classes: &ConfigClassSet, name: &str) -> Option<KnobValue> {
        let state = self.state.read().await;
        for class in classes.iter() {
            if let Some(value) = state.knobs.get(&KnobKey::scoped(class, name)) {
                return Some(value.clone());
            }
        }
        state.knobs.get(&KnobKey::global(name)).cloned()
    }

    pub async fn all(&self) -> BTreeMap<KnobKey, KnobValue> {
        self.state.read().await.knobs.clone()
    }
}

fn apply_knob_mutation(knobs: &mut BTreeMap<KnobKey, KnobValue>, mutation: &Mutation) {
    let key = match KnobKey::unpack(mutation.key()) {
        Ok(Some(key)) => key,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "skipping undecodable knob key");
            return;
        }
    };
    match mutation {
        Mutation::Set { value, .. } => match KnobValue::decode(value) {
            Ok(value) => {
                knobs.insert(key, value);
            }
            Err(e) => {
                warn!(knob = %key.name, error = %e, "skipping undecodable knob value");
                knobs.remove(&key);
            }
        },
        Mutation::Clear { .. } => {
            knobs.remove(&key);
        }
    }
}

#[async_trait]
impl ChangeSink for KnobCache {
    fn name(&self) -> &str {
        "knob-cache"
    }

    async fn apply_snapshot(&self, version: Version, snapshot: &BTreeMap<Vec<u8>, Vec<u8>>) {
        let mut knobs = BTreeMap::new();
        for (key, value) in snapshot.range(knob_subspace().raw_range().0..) {
            if !knob_subspace().contains(key) {
                break;
            }
            let mutation = Mutation::Set {
                key: key.clone(),
                value: value.clone(),
            };
            apply_knob_mutation(&mut knobs, &mutation);
        }
        debug!(version, knobs = knobs.len(), "knob cache loaded snapshot");
        *self.state.write().await = KnobState { version, knobs };
    }

    async fn apply_changes(&self, changes: &[VersionedMutations]) {
        let mut state = self.state.write().await;
        for batch in changes {
            if batch.version <= state.version {
                continue;
            }
            for mutation in &batch.mutations {
                apply_knob_mutation(&mut state.knobs, mutation);
            }
            state.version = batch.version;
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_kv::MemoryVersionedStore;

    use super::*;

    #[test]
    fn test_knob_key_layout() {
        let key = KnobKey::scoped("storage", "cache_size").pack();
        assert!(key.starts_with(b"\xff/knobs/"));
        assert_eq!(KnobKey::unpack(&key).unwrap(), Some(KnobKey::scoped("storage", "cache_size")));

        let global = KnobKey::global("log_level").pack();
        assert_eq!(KnobKey::unpack(&global).unwrap(), Some(KnobKey::global("log_level")));
        assert_eq!(KnobKey::unpack(b"\xff/tenantMap/alpha").unwrap(), None);
    }

    #[test]
    fn test_malformed_knob_key() {
        let bad = knob_subspace().pack(&Tuple::new().push(7i64).push("x"));
        assert!(matches!(KnobKey::unpack(&bad), Err(FollowerError::Codec { .. })));
        let short = knob_subspace().pack(&Tuple::new().push(()));
        assert!(matches!(KnobKey::unpack(&short), Err(FollowerError::Codec { .. })));
    }

    #[test]
    fn test_filter() {
        let classes: ConfigClassSet = ["storage"].into_iter().collect();
        let storage = KnobKey::scoped("storage", "a").pack();
        let proxy = KnobKey::scoped("proxy", "a").pack();
        let global = KnobKey::global("a").pack();

        assert!(key_passes(Some(&classes), &storage));
        assert!(!key_passes(Some(&classes), &proxy));
        assert!(key_passes(Some(&classes), &global));
        assert!(key_passes(Some(&classes), b"\xff/tenantMap/alpha"));
        assert!(key_passes(None, &proxy));

        let mut changes = vec![VersionedMutations {
            version: 3,
            mutations: vec![
                Mutation::Clear { key: proxy.clone() },
                Mutation::Clear { key: storage.clone() },
            ],
        }];
        filter_changes(Some(&classes), &mut changes);
        assert_eq!(changes[0].mutations, vec![Mutation::Clear { key: storage }]);
    }

    #[test]
    fn test_value_encoding() {
        for value in [
            KnobValue::Int(-4),
            KnobValue::Bool(true),
            KnobValue::Double(0.5),
            KnobValue::String("x".into()),
            KnobValue::Bytes(vec![0, 255]),
        ] {
            assert_eq!(KnobValue::decode(&value.encode().unwrap()).unwrap(), value);
        }
        assert!(KnobValue::decode(&[0xff, 0xff]).is_err());
    }

    #[tokio::test]
    async fn test_cache_effective_value() {
        let store = MemoryVersionedStore::new();
        let mut tx = Transaction::begin(&*store).await.unwrap();
        set_knob(&mut tx, &KnobKey::global("threads"), &KnobValue::Int(4)).unwrap();
        set_knob(&mut tx, &KnobKey::scoped("storage", "threads"), &KnobValue::Int(16)).unwrap();
        let version = tx.commit().await.unwrap();

        let mut snapshot = BTreeMap::new();
        for kv in store.get_range(&strata_kv::KeyRange::subspace(&knob_subspace()), version, 100).await.unwrap() {
            snapshot.insert(kv.key, kv.value);
        }
        let cache = KnobCache::new();
        cache.apply_snapshot(version, &snapshot).await;

        let storage: ConfigClassSet = ["storage"].into_iter().collect();
        let proxy: ConfigClassSet = ["proxy"].into_iter().collect();
        assert_eq!(cache.effective(&storage, "threads").await, Some(KnobValue::Int(16)));
        assert_eq!(cache.effective(&proxy, "threads").await, Some(KnobValue::Int(4)));

        cache
            .apply_changes(&[VersionedMutations {
                version: version + 1,
                mutations: vec![Mutation::Clear {
                    key: KnobKey::scoped("storage", "threads").pack(),
                }],
            }])
            .await;
        assert_eq!(cache.effective(&storage, "threads").await, Some(KnobValue::Int(4)));
        assert_eq!(cache.version().await, version + 1);
    }

    proptest::proptest! {
        #[test]
        fn test_filter_matches_class_membership(
            class in proptest::option::of(proptest::collection::vec(0u8..4, 1..3)),
            followed in proptest::collection::btree_set(proptest::collection::vec(0u8..4, 1..3), 0..4),
            name in "[a-z_]{1,12}",
        ) {
            let classes: ConfigClassSet = followed.iter().cloned().collect();
            let key = KnobKey { config_class: class.clone(), name }.pack();
            let expected = class.as_ref().is_none_or(|c| followed.contains(c));
            proptest::prop_assert_eq!(key_passes(Some(&classes), &key), expected);
            proptest::prop_assert!(key_passes(None, &key));
        }

        #[test]
        fn test_global_knobs_sort_before_scoped(
            class in proptest::collection::vec(proptest::num::u8::ANY, 0..4),
            global_name in "[a-z_]{1,12}",
            scoped_name in "[a-z_]{1,12}",
        ) {
            let global = KnobKey::global(global_name).pack();
            let scoped = KnobKey::scoped(class, scoped_name).pack();
            proptest::prop_assert!(global < scoped);
        }
    }
}
