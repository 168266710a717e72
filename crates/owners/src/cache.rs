//! Owner tree cache keyed by object UID.
//!
//! Reads share a read lock; a write holds the lock for a single map mutation
//! only. Recency for LRU eviction is an atomic tick per slot so a cache hit
//! never needs the write lock.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::OwnerRefTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Keep every resolved tree for the life of the process.
    #[default]
    Unbounded,
    /// Keep at most `capacity` trees, evicting the least recently used.
    Lru { capacity: usize },
}

impl EvictionPolicy {
    /// `REKON_OWNER_CACHE_CAP` style bound: `None` or zero means unbounded.
    pub fn from_cap(cap: Option<usize>) -> Self {
        match cap {
            Some(n) if n > 0 => Self::Lru { capacity: n },
            _ => Self::Unbounded,
        }
    }
}

struct Slot {
    tree: OwnerRefTree,
    last_used: AtomicU64,
}

pub struct TreeCache {
    policy: EvictionPolicy,
    slots: RwLock<FxHashMap<String, Slot>>,
    tick: AtomicU64,
}

impl TreeCache {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self { policy, slots: RwLock::new(FxHashMap::default()), tick: AtomicU64::new(0) }
    }

    pub fn policy(&self) -> EvictionPolicy { self.policy }

    pub fn get(&self, uid: &str) -> Option<OwnerRefTree> {
        let slots = self.slots.read();
        let slot = slots.get(uid)?;
        slot.last_used.store(self.next_tick(), Ordering::Relaxed);
        Some(slot.tree.clone())
    }

    pub fn insert(&self, uid: String, tree: OwnerRefTree) {
        let slot = Slot { tree, last_used: AtomicU64::new(self.next_tick()) };
        let mut slots = self.slots.write();
        slots.insert(uid, slot);
        if let EvictionPolicy::Lru { capacity } = self.policy {
            while slots.len() > capacity {
                let oldest = slots
                    .iter()
                    .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        slots.remove(&k);
                        counter!("owners_cache_evicted", 1u64);
                        debug!(uid = %k, "owners: evicted cached tree");
                    }
                    None => break,
                }
            }
        }
    }

    pub fn contains(&self, uid: &str) -> bool { self.slots.read().contains_key(uid) }

    pub fn len(&self) -> usize { self.slots.read().len() }

    pub fn is_empty(&self) -> bool { self.slots.read().is_empty() }

    pub fn clear(&self) { self.slots.write().clear(); }

    fn next_tick(&self) -> u64 { self.tick.fetch_add(1, Ordering::Relaxed) }
}

impl std::fmt::Debug for TreeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeCache").field("policy", &self.policy).field("len", &self.len()).finish()
    }
}
