//! Append-only signal store
//!
//! Signals are kept in a sharded map keyed by id, so concurrent inserts only
//! contend on the shard holding that id. A per-system-key time index backs
//! [`SignalStore::query`], which hands out a lazy cursor instead of a
//! collected vector.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{GateError, Result};
use crate::signal::{Signal, SystemKey};

type IndexEntry = (DateTime<Utc>, Uuid);

#[derive(Default)]
struct StoreInner {
    signals: DashMap<Uuid, Arc<Signal>>,
    by_key: DashMap<SystemKey, BTreeSet<IndexEntry>>,
}

/// Thread-safe, append-only record of accepted signals
///
/// Cloning is cheap and yields a handle onto the same store.
#[derive(Clone, Default)]
pub struct SignalStore {
    inner: Arc<StoreInner>,
}

impl SignalStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a signal. Fails with `DuplicateId` if the id is already present;
    /// the stored signal is never overwritten.
    pub fn put(&self, signal: Signal) -> Result<Arc<Signal>> {
        let id = signal.id;
        let key = signal.key();
        let timestamp = signal.timestamp;

        let stored = match self.inner.signals.entry(id) {
            Entry::Occupied(_) => return Err(GateError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                let stored = Arc::new(signal);
                slot.insert(Arc::clone(&stored));
                stored
            }
        };

        self.inner
            .by_key
            .entry(key)
            .or_default()
            .insert((timestamp, id));

        Ok(stored)
    }

    /// Look up a signal by id
    pub fn get(&self, id: &Uuid) -> Result<Arc<Signal>> {
        self.inner
            .signals
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| GateError::signal_not_found(*id))
    }

    /// Whether a signal with this id is stored
    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.signals.contains_key(id)
    }

    /// Time-ordered signals for `key` with `timestamp >= since`
    pub fn query(&self, key: &SystemKey, since: DateTime<Utc>) -> SignalCursor {
        SignalCursor {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            since,
            position: None,
        }
    }

    /// Number of stored signals
    pub fn len(&self) -> usize {
        self.inner.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.signals.is_empty()
    }

    /// All system keys that have at least one signal
    pub fn keys(&self) -> Vec<SystemKey> {
        let mut keys: Vec<_> = self.inner.by_key.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

/// Lazy, time-ordered, restartable sequence of signals for one system key
///
/// Each step reads the next index entry after the cursor's position, so
/// signals stored after the cursor was created are still picked up if they
/// sort after the position. The position can be saved with
/// [`SignalCursor::position`] and resumed with [`SignalCursor::resume_from`].
pub struct SignalCursor {
    inner: Arc<StoreInner>,
    key: SystemKey,
    since: DateTime<Utc>,
    position: Option<IndexEntry>,
}

impl SignalCursor {
    /// Rewind to the start of the query
    pub fn restart(&mut self) {
        self.position = None;
    }

    /// Last entry yielded, if any
    pub fn position(&self) -> Option<(DateTime<Utc>, Uuid)> {
        self.position
    }

    /// Continue after a previously saved position
    pub fn resume_from(mut self, position: (DateTime<Utc>, Uuid)) -> Self {
        self.position = Some(position);
        self
    }

    fn next_entry(&self) -> Option<IndexEntry> {
        let index = self.inner.by_key.get(&self.key)?;
        let lower = match self.position {
            Some(pos) => Bound::Excluded(pos),
            None => Bound::Included((self.since, Uuid::nil())),
        };
        index
            .range((lower, Bound::Unbounded))
            .find(|(ts, _)| *ts >= self.since)
            .copied()
    }
}

impl Iterator for SignalCursor {
    type Item = Arc<Signal>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.next_entry()?;
            self.position = Some(entry);
            // The id map is written before the index, so indexed ids resolve.
            if let Some(signal) = self.inner.signals.get(&entry.1) {
                return Some(Arc::clone(signal.value()));
            }
        }
    }
}
