//! Typed containers stored in a key range of a [`VersionedStore`].
//!
//! Each container owns a key or a subspace and converts between typed items
//! and bytes through a [`Codec`]. All reads and writes go through a caller
//! supplied [`Transaction`], so several containers can be updated atomically.

use std::marker::PhantomData;

use strata_kv::KeyRange;
use strata_kv::KeyValue;
use strata_kv::Transaction;
use strata_kv::VersionedStore;
use strata_layer::Subspace;
use strata_layer::Tuple;

use crate::codec::TenantId;
use crate::codec::TenantIdCodec;
use crate::codec::id_to_prefix;
use crate::codec::prefix_to_id;
use crate::entry::TenantMapEntry;
use crate::error::TenantError;

/// Conversion between a typed item and its stored bytes.
pub trait Codec {
    type Item;

    fn pack(item: &Self::Item) -> Result<Vec<u8>, TenantError>;

    fn unpack(bytes: &[u8]) -> Result<Self::Item, TenantError>;
}

/// Raw bytes, stored verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCodec;

impl Codec for NullCodec {
    type Item = Vec<u8>;

    fn pack(item: &Vec<u8>) -> Result<Vec<u8>, TenantError> {
        Ok(item.clone())
    }

    fn unpack(bytes: &[u8]) -> Result<Vec<u8>, TenantError> {
        Ok(bytes.to_vec())
    }
}

/// Packed tuples.
#[derive(Debug, Clone, Copy, Default)]
pub struct TupleCodec;

impl Codec for TupleCodec {
    type Item = Tuple;

    fn pack(item: &Tuple) -> Result<Vec<u8>, TenantError> {
        Ok(item.pack())
    }

    fn unpack(bytes: &[u8]) -> Result<Tuple, TenantError> {
        Tuple::unpack(bytes).map_err(|e| TenantError::CorruptKey { reason: e.to_string() })
    }
}

/// An `i64` stored as a one-element tuple.
#[derive(Debug, Clone, Copy, Default)]
pub struct Int64Codec;

impl Codec for Int64Codec {
    type Item = i64;

    fn pack(item: &i64) -> Result<Vec<u8>, TenantError> {
        Ok(Tuple::new().push(*item).pack())
    }

    fn unpack(bytes: &[u8]) -> Result<i64, TenantError> {
        let tuple = TupleCodec::unpack(bytes)?;
        match (tuple.len(), tuple.get(0).and_then(|e| e.as_int())) {
            (1, Some(value)) => Ok(value),
            _ => Err(TenantError::CorruptKey {
                reason: "expected a single integer element".to_string(),
            }),
        }
    }
}

impl Codec for TenantIdCodec {
    type Item = TenantId;

    fn pack(item: &TenantId) -> Result<Vec<u8>, TenantError> {
        Ok(id_to_prefix(*item).to_vec())
    }

    fn unpack(bytes: &[u8]) -> Result<TenantId, TenantError> {
        prefix_to_id(bytes)
    }
}

/// Tenant map values: versioned entry encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantEntryCodec;

impl Codec for TenantEntryCodec {
    type Item = TenantMapEntry;

    fn pack(item: &TenantMapEntry) -> Result<Vec<u8>, TenantError> {
        item.encode()
    }

    fn unpack(bytes: &[u8]) -> Result<TenantMapEntry, TenantError> {
        TenantMapEntry::decode(bytes)
    }
}

// =============================================================================
// Containers
// =============================================================================

/// Map from keys under a subspace to encoded objects.
#[derive(Debug, Clone)]
pub struct KeyBackedObjectMap<K, V> {
    subspace: Subspace,
    _codecs: PhantomData<fn() -> (K, V)>,
}

impl<K: Codec, V: Codec> KeyBackedObjectMap<K, V> {
    pub fn new(subspace: Subspace) -> Self {
        Self {
            subspace,
            _codecs: PhantomData,
        }
    }

    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    /// Storage key of `key`.
    pub fn key_for(&self, key: &K::Item) -> Result<Vec<u8>, TenantError> {
        Ok(self.subspace.key(&K::pack(key)?))
    }

    /// Decode a stored key-value pair that belongs to this map.
    pub fn decode(&self, key: &[u8], value: &[u8]) -> Result<(K::Item, V::Item), TenantError> {
        let suffix = self.subspace.strip(key).map_err(|e| TenantError::CorruptKey { reason: e.to_string() })?;
        Ok((K::unpack(suffix)?, V::unpack(value)?))
    }

    pub async fn get<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        key: &K::Item,
    ) -> Result<Option<V::Item>, TenantError> {
        let raw = tx.get(&self.key_for(key)?).await?;
        raw.map(|bytes| V::unpack(&bytes)).transpose()
    }

    pub fn set<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        key: &K::Item,
        value: &V::Item,
    ) -> Result<(), TenantError> {
        tx.set(&self.key_for(key)?, &V::pack(value)?)?;
        Ok(())
    }

    pub fn erase<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        key: &K::Item,
    ) -> Result<(), TenantError> {
        tx.clear(&self.key_for(key)?)?;
        Ok(())
    }

    /// Entries from `begin` (inclusive, or the start of the map) in key order.
    pub async fn get_range<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        begin: Option<&K::Item>,
        limit: u32,
    ) -> Result<Vec<(K::Item, V::Item)>, TenantError> {
        let mut range = KeyRange::subspace(&self.subspace);
        if let Some(begin) = begin {
            range.begin = self.key_for(begin)?;
        }
        let kvs = tx.get_range(&range, limit).await?;
        kvs.iter().map(|kv| self.decode(&kv.key, &kv.value)).collect()
    }

    /// Every entry in key order, read `page_size` keys at a time.
    pub async fn get_all<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        page_size: u32,
    ) -> Result<Vec<(K::Item, V::Item)>, TenantError> {
        let mut range = KeyRange::subspace(&self.subspace);
        let mut out = Vec::new();
        loop {
            let kvs = tx.get_range(&range, page_size).await?;
            for kv in &kvs {
                out.push(self.decode(&kv.key, &kv.value)?);
            }
            if !advance_past_page(&mut range, &kvs, page_size) {
                return Ok(out);
            }
        }
    }
}

/// A single typed value at a fixed key.
#[derive(Debug, Clone)]
pub struct KeyBackedProperty<C> {
    key: Vec<u8>,
    _codec: PhantomData<fn() -> C>,
}

impl<C: Codec> KeyBackedProperty<C> {
    pub fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            _codec: PhantomData,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub async fn get<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
    ) -> Result<Option<C::Item>, TenantError> {
        let raw = tx.get(&self.key).await?;
        raw.map(|bytes| C::unpack(&bytes)).transpose()
    }

    pub fn set<S: VersionedStore + ?Sized>(&self, tx: &mut Transaction<'_, S>, value: &C::Item) -> Result<(), TenantError> {
        tx.set(&self.key, &C::pack(value)?)?;
        Ok(())
    }

    pub fn clear<S: VersionedStore + ?Sized>(&self, tx: &mut Transaction<'_, S>) -> Result<(), TenantError> {
        tx.clear(&self.key)?;
        Ok(())
    }
}

/// A set of typed members stored as keys with empty values.
#[derive(Debug, Clone)]
pub struct KeyBackedSet<C> {
    subspace: Subspace,
    _codec: PhantomData<fn() -> C>,
}

impl<C: Codec> KeyBackedSet<C> {
    pub fn new(subspace: Subspace) -> Self {
        Self {
            subspace,
            _codec: PhantomData,
        }
    }

    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    /// Storage key of `member`.
    pub fn key_for(&self, member: &C::Item) -> Result<Vec<u8>, TenantError> {
        Ok(self.subspace.key(&C::pack(member)?))
    }

    /// Decode a stored key that belongs to this set.
    pub fn decode(&self, key: &[u8]) -> Result<C::Item, TenantError> {
        let suffix = self.subspace.strip(key).map_err(|e| TenantError::CorruptKey { reason: e.to_string() })?;
        C::unpack(suffix)
    }

    pub fn insert<S: VersionedStore + ?Sized>(&self, tx: &mut Transaction<'_, S>, member: &C::Item) -> Result<(), TenantError> {
        tx.set(&self.key_for(member)?, &[])?;
        Ok(())
    }

    pub fn erase<S: VersionedStore + ?Sized>(&self, tx: &mut Transaction<'_, S>, member: &C::Item) -> Result<(), TenantError> {
        tx.clear(&self.key_for(member)?)?;
        Ok(())
    }

    pub async fn exists<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        member: &C::Item,
    ) -> Result<bool, TenantError> {
        Ok(tx.get(&self.key_for(member)?).await?.is_some())
    }

    /// Members whose keys fall in `range` (the whole set when `None`).
    pub async fn get_range<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        range: Option<KeyRange>,
        limit: u32,
    ) -> Result<Vec<C::Item>, TenantError> {
        let range = range.unwrap_or_else(|| KeyRange::subspace(&self.subspace));
        let kvs = tx.get_range(&range, limit).await?;
        kvs.iter().map(|kv| self.decode(&kv.key)).collect()
    }

    /// Every member in `range` (the whole set when `None`), read `page_size`
    /// keys at a time.
    pub async fn get_all<S: VersionedStore + ?Sized>(
        &self,
        tx: &mut Transaction<'_, S>,
        range: Option<KeyRange>,
        page_size: u32,
    ) -> Result<Vec<C::Item>, TenantError> {
        let mut range = range.unwrap_or_else(|| KeyRange::subspace(&self.subspace));
        let mut out = Vec::new();
        loop {
            let kvs = tx.get_range(&range, page_size).await?;
            for kv in &kvs {
                out.push(self.decode(&kv.key)?);
            }
            if !advance_past_page(&mut range, &kvs, page_size) {
                return Ok(out);
            }
        }
    }
}

/// Move `range` past a page just read. Returns false once the range is exhausted.
fn advance_past_page(range: &mut KeyRange, page: &[KeyValue], page_size: u32) -> bool {
    match page.last() {
        Some(last) if page.len() >= page_size as usize => {
            range.begin = last.key.clone();
            range.begin.push(0x00);
            true
        }
        _ => false,
    }
}
