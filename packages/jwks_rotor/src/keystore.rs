//! In-memory keystore with lock-free snapshot reads.
//!
//! The key collection lives in an immutable [`KeySet`] snapshot behind an
//! [`ArcSwap`]. Writers build a new snapshot and swap it in atomically, so a
//! reader always observes either the state before or after a change, never
//! a mix:
//!
//! ```text
//! generate:  [K1 Active]                -> [K1 Retiring, K2 Active]   (one swap)
//! remove:    [K1 Retiring, K2 Active]   -> [K2 Active]                (one swap)
//! ```
//!
//! Demoting the previous key and installing the new one happen in the same
//! swap, which keeps "at most one active key" true at every instant.

use crate::{
    algorithm::KeySpec,
    crypto::{KeyGenerator, OsKeyGenerator},
    error::{RotationError, RotationResult},
    jwk::{PublicJwk, PublicKeySet},
    key::{Key, KeyId, KeyStatus},
};
use arc_swap::ArcSwap;
use std::{fmt, sync::Arc};
use tokio::time::Instant;
use tracing::debug;

/// A key together with its lifecycle state
#[derive(Debug, Clone)]
pub struct KeyEntry {
    key: Arc<Key>,
    status: KeyStatus,
    retired_at: Option<Instant>,
}

impl KeyEntry {
    /// The key
    #[must_use]
    pub fn key(&self) -> &Arc<Key> {
        &self.key
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> KeyStatus {
        self.status
    }

    /// When the key stopped being active
    #[must_use]
    pub fn retired_at(&self) -> Option<Instant> {
        self.retired_at
    }
}

/// Immutable snapshot of the keystore contents, in insertion order
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    entries: Vec<KeyEntry>,
}

impl KeySet {
    /// The active entry, if any
    #[must_use]
    pub fn active(&self) -> Option<&KeyEntry> {
        self.entries
            .iter()
            .find(|e| e.status == KeyStatus::Active)
    }

    /// Entry for `id`
    #[must_use]
    pub fn get(&self, id: &KeyId) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| e.key.id() == id)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.iter()
    }

    /// Number of entries with status `Active`
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == KeyStatus::Active)
            .count()
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the set holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Public JWKS view
    #[must_use]
    pub fn export(&self) -> PublicKeySet {
        PublicKeySet {
            keys: self
                .entries
                .iter()
                .map(|e| PublicJwk::from_key(&e.key))
                .collect(),
        }
    }

    /// Demote the active entry and append `key` as the new active one
    fn with_active(&self, key: Arc<Key>, now: Instant) -> RotationResult<KeySet> {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        for entry in &self.entries {
            let mut entry = entry.clone();
            if entry.status == KeyStatus::Active {
                entry.status = entry.status.transition(KeyStatus::Retiring)?;
                entry.retired_at = Some(now);
            }
            entries.push(entry);
        }
        entries.push(KeyEntry {
            key,
            status: KeyStatus::Active,
            retired_at: None,
        });
        Ok(KeySet { entries })
    }

    /// Purge `id`; only a retiring key may move to `Removed`
    fn without(&self, id: &KeyId) -> RotationResult<KeySet> {
        if let Some(entry) = self.get(id) {
            entry.status.transition(KeyStatus::Removed)?;
        }
        Ok(KeySet {
            entries: self
                .entries
                .iter()
                .filter(|e| e.key.id() != id)
                .cloned()
                .collect(),
        })
    }
}

/// Key installed by [`Keystore::generate`]
#[derive(Debug, Clone)]
pub struct Generated {
    /// The new active key
    pub key: Arc<Key>,
    /// Previously active key, now retiring
    pub retired: Option<RetiredKey>,
}

/// A key demoted from active to retiring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetiredKey {
    /// Key id
    pub id: KeyId,
    /// Moment it stopped signing
    pub retired_at: Instant,
}

/// A key purged by [`Keystore::remove`]
#[derive(Debug, Clone)]
pub struct RemovedKey {
    /// The purged key
    pub key: Arc<Key>,
    /// Moment it stopped signing
    pub retired_at: Option<Instant>,
    /// Moment it was purged
    pub removed_at: Instant,
}

/// In-memory collection of signing keys.
pub struct Keystore {
    keys: ArcSwap<KeySet>,
    generator: Box<dyn KeyGenerator>,
}

impl Keystore {
    /// Empty keystore generating keys from OS entropy
    #[must_use]
    pub fn new() -> Self {
        Self::with_generator(OsKeyGenerator)
    }

    /// Empty keystore with a custom key source
    #[must_use]
    pub fn with_generator<G: KeyGenerator>(generator: G) -> Self {
        Self {
            keys: ArcSwap::from_pointee(KeySet::default()),
            generator: Box::new(generator),
        }
    }

    /// Generate a key pair and install it as the active key.
    ///
    /// Any previously active key is demoted to `Retiring` in the same atomic
    /// step and reported in [`Generated::retired`].
    ///
    /// # Errors
    /// Returns `RotationError::Generation` when the key pair cannot be
    /// produced. The keystore is left unchanged in that case.
    pub fn generate(&self, spec: &KeySpec) -> RotationResult<Generated> {
        self.generate_at(spec, Instant::now())
    }

    /// [`generate`](Self::generate) with the retirement instant supplied by
    /// the caller, so deadlines derived from it can be checked up front.
    pub(crate) fn generate_at(&self, spec: &KeySpec, now: Instant) -> RotationResult<Generated> {
        let material = self.generator.generate(spec)?;
        let key = Arc::new(Key::from_material(spec, material)?);

        if self.keys.load().get(key.id()).is_some() {
            return Err(RotationError::generation(format!(
                "key id {} already issued",
                key.id()
            )));
        }

        let previous = self.swap(|set| set.with_active(Arc::clone(&key), now))?;

        let retired = previous.active().map(|entry| RetiredKey {
            id: entry.key.id().clone(),
            retired_at: now,
        });
        debug!(
            kid = %key.id(),
            algorithm = %key.algorithm(),
            retired = ?retired.as_ref().map(|r| r.id.as_str()),
            "Installed new active key"
        );

        Ok(Generated { key, retired })
    }

    /// Purge a retiring key.
    ///
    /// Returns `Ok(None)` when the id is absent, which makes duplicate or
    /// late removals harmless.
    ///
    /// # Errors
    /// Returns `RotationError::IllegalTransition` if `id` is the active key;
    /// it must retire before it can be removed.
    pub fn remove(&self, id: &KeyId) -> RotationResult<Option<RemovedKey>> {
        if self.keys.load().get(id).is_none() {
            return Ok(None);
        }

        let now = Instant::now();
        let previous = self.swap(|set| set.without(id))?;

        // A concurrent remove may have purged it first.
        let removed = previous.get(id).map(|e| RemovedKey {
            key: Arc::clone(&e.key),
            retired_at: e.retired_at,
            removed_at: now,
        });
        if removed.is_some() {
            debug!(kid = %id, "Purged retiring key");
        }
        Ok(removed)
    }

    /// Replace the snapshot with `next(current)`, returning the snapshot it
    /// replaced. On error the stored snapshot is left as it was.
    fn swap<F>(&self, mut next: F) -> RotationResult<Arc<KeySet>>
    where
        F: FnMut(&KeySet) -> RotationResult<KeySet>,
    {
        let mut failure = None;
        let previous = self.keys.rcu(|set| {
            failure = None;
            match next(set) {
                Ok(updated) => Arc::new(updated),
                Err(e) => {
                    failure = Some(e);
                    Arc::clone(set)
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(previous),
        }
    }

    /// Public portion of every key still held
    #[must_use]
    pub fn export_public_set(&self) -> PublicKeySet {
        self.keys.load().export()
    }

    /// The active key
    #[must_use]
    pub fn active(&self) -> Option<Arc<Key>> {
        self.keys.load().active().map(|e| Arc::clone(&e.key))
    }

    /// Status of `id`; `None` once purged or if never issued
    #[must_use]
    pub fn status(&self, id: &KeyId) -> Option<KeyStatus> {
        self.keys.load().get(id).map(KeyEntry::status)
    }

    /// Consistent snapshot of all entries
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.keys.load_full()
    }

    /// Number of keys held
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.load().len()
    }

    /// True before the first rotation
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.load().is_empty()
    }
}

impl Default for Keystore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.keys.load();
        f.debug_struct("Keystore")
            .field("keys", &snapshot.len())
            .field("active", &snapshot.active().map(|e| e.key.id().as_str()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Algorithm;

    fn spec() -> KeySpec {
        KeySpec::signing(Algorithm::Es256)
    }

    #[test]
    fn first_key_is_active_with_nothing_retired() {
        let store = Keystore::new();
        let generated = store.generate(&spec()).unwrap();
        assert!(generated.retired.is_none());
        assert_eq!(store.status(generated.key.id()), Some(KeyStatus::Active));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn second_generate_demotes_the_first() {
        let store = Keystore::new();
        let k1 = store.generate(&spec()).unwrap().key;
        let second = store.generate(&spec()).unwrap();

        assert_eq!(second.retired.as_ref().map(|r| &r.id), Some(k1.id()));
        assert_eq!(store.status(k1.id()), Some(KeyStatus::Retiring));
        assert_eq!(store.status(second.key.id()), Some(KeyStatus::Active));
        assert_eq!(store.snapshot().active_count(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = Keystore::new();
        let k1 = store.generate(&spec()).unwrap().key;
        store.generate(&spec()).unwrap();

        let removed = store.remove(k1.id()).unwrap().unwrap();
        assert_eq!(removed.key.id(), k1.id());
        assert!(removed.retired_at.is_some());
        for _ in 0..3 {
            assert!(store.remove(k1.id()).unwrap().is_none());
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn active_key_cannot_be_removed() {
        let store = Keystore::new();
        let k1 = store.generate(&spec()).unwrap().key;
        assert_eq!(
            store.remove(k1.id()).unwrap_err(),
            RotationError::IllegalTransition {
                from: KeyStatus::Active,
                to: KeyStatus::Removed
            }
        );
        assert_eq!(store.status(k1.id()), Some(KeyStatus::Active));
    }

    #[test]
    fn rejected_removal_keeps_the_same_snapshot() {
        let store = Keystore::new();
        let k1 = store.generate(&spec()).unwrap().key;
        let before = store.snapshot();

        assert!(store.remove(k1.id()).is_err());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn demotion_stamps_the_retirement_instant() {
        let store = Keystore::new();
        let k1 = store.generate(&spec()).unwrap().key;
        let now = Instant::now();
        let generated = store.generate_at(&spec(), now).unwrap();

        assert_eq!(
            generated.retired,
            Some(RetiredKey {
                id: k1.id().clone(),
                retired_at: now
            })
        );
        let snapshot = store.snapshot();
        let entry = snapshot.get(k1.id()).unwrap();
        assert_eq!(entry.status(), KeyStatus::Retiring);
        assert_eq!(entry.retired_at(), Some(now));
    }

    #[test]
    fn export_keeps_insertion_order() {
        let store = Keystore::new();
        let k1 = store.generate(&spec()).unwrap().key;
        let k2 = store.generate(&KeySpec::signing(Algorithm::Es384)).unwrap().key;
        let ids: Vec<_> = store.export_public_set().ids().cloned().collect();
        assert_eq!(ids, vec![k1.id().clone(), k2.id().clone()]);
    }
}
