//! Configuration follower convergence tests.
//!
//! A follower that bootstraps from a snapshot and then tails changes must end
//! up holding exactly what the responder's store holds, whatever mix of
//! writes, compactions and resnapshots happens in between.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use strata::constants::MAX_KEY_SIZE;
use strata::follower::CompactionPolicy;
use strata::follower::ConfigClassSet;
use strata::follower::ConfigConsumer;
use strata::follower::ConfigFollowerInterface;
use strata::follower::ConfigFollowerService;
use strata::follower::ConsumerConfig;
use strata::follower::FollowerError;
use strata::follower::GetChangesRequest;
use strata::follower::GetSnapshotAndChangesRequest;
use strata::follower::KnobCache;
use strata::follower::KnobKey;
use strata::follower::KnobValue;
use strata::follower::LocalTransport;
use strata::follower::ServiceConfig;
use strata::follower::knobs::set_knob;
use strata::kv::ChangeSink;
use strata::kv::KeyRange;
use strata::kv::MemoryVersionedStore;
use strata::kv::Mutation;
use strata::kv::StoreError;
use strata::kv::Transaction;
use strata::kv::Version;
use strata::kv::VersionedMutations;
use strata::kv::VersionedStore;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Mirrors every key it is sent.
#[derive(Default)]
struct Mirror {
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

#[async_trait]
impl ChangeSink for Mirror {
    fn name(&self) -> &str {
        "mirror"
    }

    async fn apply_snapshot(&self, _version: Version, snapshot: &BTreeMap<Vec<u8>, Vec<u8>>) {
        *self.data.lock().await = snapshot.clone();
    }

    async fn apply_changes(&self, changes: &[VersionedMutations]) {
        let mut data = self.data.lock().await;
        for batch in changes {
            for mutation in &batch.mutations {
                match mutation {
                    Mutation::Set { key, value } => {
                        data.insert(key.clone(), value.clone());
                    }
                    Mutation::Clear { key } => {
                        data.remove(key);
                    }
                }
            }
        }
    }
}

async fn serve(
    store: Arc<MemoryVersionedStore>,
    policy: CompactionPolicy,
) -> (Arc<ConfigFollowerService<MemoryVersionedStore>>, Arc<LocalTransport>) {
    let transport = LocalTransport::new("responder");
    let service = Arc::new(ConfigFollowerService::new(store, ServiceConfig {
        compaction_policy: policy,
        ..Default::default()
    }));
    let mut served = ConfigFollowerInterface::new();
    served.setup_well_known_endpoints();
    served.register(&*transport, service.clone()).await.unwrap();
    (service, transport)
}

fn consumer(transport: Arc<LocalTransport>, config: ConsumerConfig) -> ConfigConsumer<LocalTransport> {
    ConfigConsumer::new(ConfigFollowerInterface::with_remote("responder"), transport, config)
}

async fn write(store: &MemoryVersionedStore, key: &[u8], value: Option<&[u8]>) -> Version {
    let mut tx = Transaction::begin(store).await.unwrap();
    match value {
        Some(value) => tx.set(key, value).unwrap(),
        None => tx.clear(key).unwrap(),
    }
    tx.commit().await.unwrap()
}

/// Every stored key, with no upper bound short of the key size limit.
async fn store_contents(store: &MemoryVersionedStore) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let version = store.read_version().await.unwrap();
    let everything = KeyRange::new(Vec::new(), vec![0xFF; MAX_KEY_SIZE as usize + 1]);
    store
        .get_range(&everything, version, 10_000)
        .await
        .unwrap()
        .into_iter()
        .map(|kv| (kv.key, kv.value))
        .collect()
}

#[tokio::test]
async fn test_changes_below_floor_fall_back_to_snapshot() {
    let store = MemoryVersionedStore::new();
    let (service, _transport) = serve(store.clone(), CompactionPolicy::ForceResnapshot).await;
    for i in 0..12u8 {
        write(&store, &[b'k', i % 4], Some(&[i])).await;
    }
    assert_eq!(store.compact(10).await.unwrap(), 10);

    let consumer_id = Uuid::new_v4();
    let err = service
        .get_changes(GetChangesRequest {
            consumer_id,
            last_seen_version: 5,
            config_classes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FollowerError::VersionTooOld { version: 5, oldest: 10 }));

    let reply = service
        .get_snapshot_and_changes(GetSnapshotAndChangesRequest {
            consumer_id,
            config_classes: None,
        })
        .await
        .unwrap();
    assert_eq!(reply.snapshot_version, 10);
    assert_eq!(reply.end_version(), 12);
    assert_eq!(reply.most_recent_version, 12);
}

#[tokio::test]
async fn test_consumer_recovers_from_compaction() {
    let store = MemoryVersionedStore::new();
    let (_service, transport) = serve(store.clone(), CompactionPolicy::ForceResnapshot).await;
    let mirror = Arc::new(Mirror::default());
    let mut consumer = consumer(transport, ConsumerConfig::default());
    consumer.add_sink(mirror.clone());

    for i in 0..5u8 {
        write(&store, &[b'a', i], Some(b"v")).await;
    }
    assert_eq!(consumer.sync_once().await.unwrap(), 5);

    for i in 0..7u8 {
        write(&store, &[b'b', i], Some(b"w")).await;
    }
    write(&store, &[b'a', 0], None).await;
    store.compact(10).await.unwrap();

    assert_eq!(consumer.sync_once().await.unwrap(), 13);
    assert_eq!(*mirror.data.lock().await, store_contents(&store).await);
}

#[tokio::test]
async fn test_tailing_and_bootstrapping_followers_agree() {
    let store = MemoryVersionedStore::new();
    let (_service, transport) = serve(store.clone(), CompactionPolicy::ForceResnapshot).await;
    let tailing_mirror = Arc::new(Mirror::default());
    let mut tailing = consumer(transport.clone(), ConsumerConfig::default());
    tailing.add_sink(tailing_mirror.clone());

    write(&store, b"a", Some(b"1")).await;
    tailing.sync_once().await.unwrap();

    // The reserved keyspace never reaches the store, so it cannot reach
    // tailing followers while snapshots skip it.
    let mut tx = Transaction::begin(&*store).await.unwrap();
    assert_eq!(tx.set(b"\xff\xffx", b"2").unwrap_err(), StoreError::ReservedKey);
    write(&store, b"\xff/system", Some(b"3")).await;
    let latest = tailing.sync_once().await.unwrap();
    store.compact(latest).await.unwrap();

    let bootstrapped_mirror = Arc::new(Mirror::default());
    let mut bootstrapped = consumer(transport, ConsumerConfig::default());
    bootstrapped.add_sink(bootstrapped_mirror.clone());
    assert_eq!(bootstrapped.sync_once().await.unwrap(), latest);

    let expected = store_contents(&store).await;
    assert_eq!(expected.len(), 2);
    assert_eq!(*tailing_mirror.data.lock().await, expected);
    assert_eq!(*bootstrapped_mirror.data.lock().await, expected);
}

#[tokio::test]
async fn test_class_filtered_knobs() {
    let store = MemoryVersionedStore::new();
    let (_service, transport) = serve(store.clone(), CompactionPolicy::HoldForActiveFollowers).await;
    let classes: ConfigClassSet = ["storage"].into_iter().collect();
    let knobs = Arc::new(KnobCache::new());
    let mut consumer = consumer(transport, ConsumerConfig {
        config_classes: Some(classes.clone()),
        ..Default::default()
    });
    consumer.add_sink(knobs.clone());

    let mut tx = Transaction::begin(&*store).await.unwrap();
    set_knob(&mut tx, &KnobKey::global("cache_mb"), &KnobValue::Int(16)).unwrap();
    set_knob(&mut tx, &KnobKey::scoped("storage", "cache_mb"), &KnobValue::Int(64)).unwrap();
    set_knob(&mut tx, &KnobKey::scoped("proxy", "cache_mb"), &KnobValue::Int(8)).unwrap();
    tx.commit().await.unwrap();
    consumer.sync_once().await.unwrap();

    assert_eq!(knobs.effective(&classes, "cache_mb").await, Some(KnobValue::Int(64)));
    assert_eq!(knobs.get(&KnobKey::scoped("proxy", "cache_mb")).await, None);
    assert_eq!(knobs.get(&KnobKey::global("cache_mb")).await, Some(KnobValue::Int(16)));

    // Later class-scoped writes are filtered the same way.
    let mut tx = Transaction::begin(&*store).await.unwrap();
    set_knob(&mut tx, &KnobKey::scoped("proxy", "threads"), &KnobValue::Int(2)).unwrap();
    set_knob(&mut tx, &KnobKey::scoped("storage", "threads"), &KnobValue::Int(4)).unwrap();
    tx.commit().await.unwrap();
    consumer.sync_once().await.unwrap();

    assert_eq!(knobs.effective(&classes, "threads").await, Some(KnobValue::Int(4)));
    assert_eq!(knobs.get(&KnobKey::scoped("proxy", "threads")).await, None);
}

#[derive(Debug, Clone)]
enum Step {
    Write { key: u8, value: Option<u8> },
    Sync,
    ConsumerCompact,
    StoreCompact { behind_latest: u8 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0u8..8, proptest::option::of(any::<u8>())).prop_map(|(key, value)| Step::Write { key, value }),
        2 => Just(Step::Sync),
        1 => Just(Step::ConsumerCompact),
        1 => (0u8..4).prop_map(|behind_latest| Step::StoreCompact { behind_latest }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn test_follower_converges(steps in prop::collection::vec(step_strategy(), 1..60)) {
        // Property: after a final sync the follower mirrors the store exactly.
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = MemoryVersionedStore::new();
            let (_service, transport) = serve(store.clone(), CompactionPolicy::ForceResnapshot).await;
            let mirror = Arc::new(Mirror::default());
            let mut consumer = consumer(transport, ConsumerConfig::default());
            consumer.add_sink(mirror.clone());

            for step in &steps {
                match step {
                    Step::Write { key, value } => {
                        // Half the keys land in the system keyspace.
                        let first = if *key < 4 { b'k' } else { 0xFF };
                        write(&store, &[first, *key], value.as_ref().map(std::slice::from_ref)).await;
                    }
                    Step::Sync => {
                        let version = consumer.sync_once().await.unwrap();
                        prop_assert_eq!(version, store.read_version().await.unwrap());
                    }
                    Step::ConsumerCompact => {
                        if let Some(floor) = consumer.compact().await.unwrap() {
                            prop_assert!(floor <= store.read_version().await.unwrap());
                        }
                    }
                    Step::StoreCompact { behind_latest } => {
                        let latest = store.read_version().await.unwrap();
                        store.compact(latest.saturating_sub(u64::from(*behind_latest))).await.unwrap();
                    }
                }
            }

            let version = consumer.sync_once().await.unwrap();
            prop_assert_eq!(version, store.read_version().await.unwrap());
            prop_assert_eq!(mirror.data.lock().await.clone(), store_contents(&store).await);
            Ok(())
        })?;
    }
}
