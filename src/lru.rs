//! Fixed-capacity least-recently-used map.
//!
//! Entries live in a slab and are threaded onto an intrusive doubly linked
//! recency list, so `get`, `add` and eviction are all O(1). The map is not
//! synchronized; owners wrap it in their own lock.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Callback invoked with every entry pushed out of the map.
pub type EvictFn<K, V> = Box<dyn FnMut(&K, &V) + Send>;

struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A bounded key/value store evicting the least recently used entry.
pub struct Lru<K, V> {
    capacity: usize,
    index: FxHashMap<K, usize>,
    slots: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
    on_evict: Option<EvictFn<K, V>>,
}

impl<K, V> Lru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an LRU holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        Ok(Self {
            capacity,
            index: FxHashMap::default(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            on_evict: None,
        })
    }

    /// Create an LRU that reports every evicted entry to `on_evict`.
    pub fn with_evict(capacity: usize, on_evict: EvictFn<K, V>) -> Result<Self> {
        let mut lru = Self::new(capacity)?;
        lru.on_evict = Some(on_evict);
        Ok(lru)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.promote(idx);
        self.slot(idx).map(|e| &e.value)
    }

    /// Like [`Lru::get`] but hands out a mutable reference.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.index.get(key)?;
        self.promote(idx);
        self.slot_mut(idx).map(|e| &mut e.value)
    }

    /// Insert or replace `key`, marking it most recently used.
    ///
    /// Evicts the least recently used entry when the map grows past capacity.
    pub fn add(&mut self, key: K, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(entry) = self.slot_mut(idx) {
                entry.value = value;
            }
            self.promote(idx);
            return;
        }

        self.insert_new(key, value);
    }

    /// Insert `key` only when it is not already present.
    ///
    /// Returns false, leaving the existing entry untouched, when the key
    /// exists. Callers that lost the race are expected to retry with
    /// [`Lru::get_mut`].
    pub fn add_if_absent(&mut self, key: K, value: V) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }

        self.insert_new(key, value);
        true
    }

    /// Remove `key`, reporting it to the eviction callback.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = *self.index.get(key)?;
        let (key, value) = self.take(idx)?;
        self.notify(&key, &value);
        Some(value)
    }

    /// Evict every entry, reporting each to the eviction callback.
    pub fn purge(&mut self) {
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            cursor = self.slot(idx).and_then(|e| e.prev);
            if let Some((key, value)) = self.take(idx) {
                self.notify(&key, &value);
            }
        }

        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Visit every entry from most to least recently used without touching
    /// the recency order.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(entry) = self.slot(idx) else {
                break;
            };
            f(&entry.key, &entry.value);
            cursor = entry.next;
        }
    }

    /// Visit every entry mutably, dropping those for which `f` returns false.
    ///
    /// Dropped entries are expirations, not evictions, so the eviction
    /// callback is not invoked. Returns the number of dropped entries.
    pub fn retain<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut dropped = Vec::new();
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(entry) = self.slot_mut(idx) else {
                break;
            };
            if !f(&entry.key, &mut entry.value) {
                dropped.push(idx);
            }
            cursor = entry.next;
        }

        for &idx in &dropped {
            self.take(idx);
        }

        dropped.len()
    }

    fn insert_new(&mut self, key: K, value: V) {
        let entry = Entry {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        self.index.insert(key, idx);
        self.push_front(idx);

        if self.index.len() > self.capacity {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(idx) = self.tail {
            if let Some((key, value)) = self.take(idx) {
                self.notify(&key, &value);
            }
        }
    }

    fn notify(&mut self, key: &K, value: &V) {
        if let Some(on_evict) = self.on_evict.as_mut() {
            on_evict(key, value);
        }
    }

    fn take(&mut self, idx: usize) -> Option<(K, V)> {
        self.unlink(idx);
        let entry = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.index.remove(&entry.key);
        Some((entry.key, entry.value))
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.slot(idx).map(|e| (e.prev, e.next)) else {
            return;
        };

        match prev {
            Some(p) => {
                if let Some(entry) = self.slot_mut(p) {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(n) => {
                if let Some(entry) = self.slot_mut(n) {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(entry) = self.slot_mut(idx) {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let head = self.head;
        if let Some(entry) = self.slot_mut(idx) {
            entry.prev = None;
            entry.next = head;
        }
        if let Some(h) = head {
            if let Some(entry) = self.slot_mut(h) {
                entry.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn slot(&self, idx: usize) -> Option<&Entry<K, V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Entry<K, V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }
}
