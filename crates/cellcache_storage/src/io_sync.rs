use crate::{CacheLoader, CacheRemover, CacheResult, SmallKeyHashMap};

use core::hash::Hash;
use parking_lot::Mutex;
use std::sync::Arc;

/// Serializes the loads and write-backs that touch the same key, one at a time, while distinct keys proceed in parallel.
///
/// A resident cache uses the same object as its loader and its remover, so when an eviction of some key races with a miss on
/// that key, the disk read happens strictly before or strictly after the disk write, never interleaved with it.
///
/// Per-key locks are created on demand and dropped as soon as nobody holds or waits on them.
pub struct IoSync<K, L> {
    inner: L,
    locks: Mutex<SmallKeyHashMap<K, KeySlot>>,
}

struct KeySlot {
    lock: Arc<Mutex<()>>,
    users: usize,
}

impl<K, L> IoSync<K, L>
where
    K: Clone + Eq + Hash,
{
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            locks: Mutex::new(SmallKeyHashMap::default()),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// The number of keys that currently have an operation running or waiting.
    pub fn num_busy_keys(&self) -> usize {
        self.locks.lock().len()
    }

    fn lease(&self, key: &K) -> KeyLease<'_, K, L> {
        let mut locks = self.locks.lock();
        let slot = locks.entry(key.clone()).or_insert_with(|| KeySlot {
            lock: Arc::new(Mutex::new(())),
            users: 0,
        });
        slot.users += 1;

        KeyLease {
            sync: self,
            key: key.clone(),
            lock: slot.lock.clone(),
        }
    }

    fn exclusive<R>(&self, key: &K, f: impl FnOnce() -> R) -> R {
        let lease = self.lease(key);
        let _io = lease.lock.lock();

        f()
    }
}

struct KeyLease<'a, K, L>
where
    K: Clone + Eq + Hash,
{
    sync: &'a IoSync<K, L>,
    key: K,
    lock: Arc<Mutex<()>>,
}

impl<'a, K, L> Drop for KeyLease<'a, K, L>
where
    K: Clone + Eq + Hash,
{
    fn drop(&mut self) {
        let mut locks = self.sync.locks.lock();
        let unused = match locks.get_mut(&self.key) {
            Some(slot) => {
                slot.users -= 1;
                slot.users == 0
            }
            None => false,
        };
        if unused {
            locks.remove(&self.key);
        }
    }
}

impl<K, V, L> CacheLoader<K, V> for IoSync<K, L>
where
    K: Clone + Eq + Hash + Send,
    L: CacheLoader<K, V>,
{
    fn load(&self, key: &K) -> CacheResult<V> {
        self.exclusive(key, || self.inner.load(key))
    }
}

impl<K, V, L> CacheRemover<K, V> for IoSync<K, L>
where
    K: Clone + Eq + Hash + Send,
    L: CacheRemover<K, V>,
{
    fn on_removal(&self, key: &K, value: &V) -> CacheResult<()> {
        self.exclusive(key, || self.inner.on_removal(key, value))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
