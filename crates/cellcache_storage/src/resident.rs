//! The in-memory tier: a guarded, capacity-bounded LRU cache.
//!
//! "Guarded" means that at most one load per key is ever running. Concurrent requesters of a missing key all wait on the one
//! load and receive the same value (or the same error). Loads run without holding the cache lock, so unrelated keys load in
//! parallel.
//!
//! When the number of resident entries exceeds the capacity, the least recently used *unpinned* entries are handed to the
//! remover (usually the disk write-back) and only dropped once the remover succeeds. An entry whose write-back fails stays
//! resident, at the cost of temporarily exceeding the capacity.

mod lru_list;

use lru_list::LruList;

use crate::{
    stats::StatCounters, CacheError, CacheLoader, CacheRemover, CacheResult, CacheStats,
    SmallKeyHashMap,
};

use core::fmt::Debug;
use core::hash::Hash;
use core::ops::Deref;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// How many entries a `ResidentCache` may hold before it starts evicting.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CacheCapacity {
    Bounded(usize),
    Unbounded,
}

pub struct ResidentCache<K, V> {
    capacity: CacheCapacity,
    loader: Box<dyn CacheLoader<K, V>>,
    remover: Option<Box<dyn CacheRemover<K, V>>>,
    state: Mutex<State<K, V>>,
    stats: StatCounters,
}

struct State<K, V> {
    slots: SmallKeyHashMap<K, Slot<V>>,
    // Only unpinned entries that are not being written back are linked.
    order: LruList<K>,
    num_resident: usize,
    num_evicting: usize,
}

enum Slot<V> {
    Resident(Entry<V>),
    Loading(Arc<PendingLoad<V>>),
}

struct Entry<V> {
    value: V,
    recency: Option<usize>,
    pins: usize,
    evicting: bool,
}

/// A one-shot completion signal for a load in progress.
struct PendingLoad<V> {
    result: Mutex<Option<CacheResult<V>>>,
    ready: Condvar,
}

impl<V: Clone> PendingLoad<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, result: CacheResult<V>) {
        *self.result.lock() = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> CacheResult<V> {
        let mut result = self.result.lock();
        loop {
            if let Some(r) = result.as_ref() {
                return r.clone();
            }
            self.ready.wait(&mut result);
        }
    }
}

enum Lookup<V> {
    Hit(V),
    Wait(Arc<PendingLoad<V>>),
    Load(Arc<PendingLoad<V>>),
}

impl<K, V> State<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Marks the entry as most recently used. An entry whose write-back is in progress is revived, so the evicting thread will
    /// keep it. Pinned entries stay out of the order.
    fn touch(&mut self, key: &K) -> Option<&mut Entry<V>> {
        let Self { slots, order, .. } = self;
        match slots.get_mut(key) {
            Some(Slot::Resident(entry)) => {
                if entry.pins == 0 {
                    match entry.recency {
                        Some(i) => order.move_to_front(i),
                        None => entry.recency = Some(order.push_front(key.clone())),
                    }
                }
                entry.evicting = false;

                Some(entry)
            }
            _ => None,
        }
    }

    fn pin(&mut self, key: &K) -> Option<&mut Entry<V>> {
        let Self { slots, order, .. } = self;
        match slots.get_mut(key) {
            Some(Slot::Resident(entry)) => {
                if let Some(i) = entry.recency.take() {
                    order.remove(i);
                }
                entry.pins += 1;
                entry.evicting = false;

                Some(entry)
            }
            _ => None,
        }
    }

    fn insert(&mut self, key: K, value: V, pinned: bool) {
        let recency = if pinned {
            None
        } else {
            Some(self.order.push_front(key.clone()))
        };
        self.slots.insert(
            key,
            Slot::Resident(Entry {
                value,
                recency,
                pins: pinned as usize,
                evicting: false,
            }),
        );
        self.num_resident += 1;
    }

    /// Detaches an unpinned entry from the order and flags it as being written back.
    fn begin_eviction(&mut self, key: &K) -> Option<V> {
        let Self { slots, order, .. } = self;
        let entry = match slots.get_mut(key) {
            Some(Slot::Resident(entry)) if entry.pins == 0 && !entry.evicting => entry,
            _ => return None,
        };
        if let Some(i) = entry.recency.take() {
            order.remove(i);
        }
        entry.evicting = true;
        let value = entry.value.clone();
        self.num_evicting += 1;

        Some(value)
    }

    /// Returns `true` iff the entry was removed.
    fn finish_eviction(&mut self, key: &K, write_back_succeeded: bool) -> bool {
        self.num_evicting -= 1;

        let Self { slots, order, .. } = self;
        let entry = match slots.get_mut(key) {
            Some(Slot::Resident(entry)) => entry,
            _ => return false,
        };
        if !entry.evicting {
            // Revived or pinned while the remover was running.
            return false;
        }
        entry.evicting = false;
        if write_back_succeeded {
            slots.remove(key);
            self.num_resident -= 1;

            true
        } else {
            // Still the coldest entry.
            entry.recency = Some(order.push_back(key.clone()));

            false
        }
    }
}

impl<K, V> ResidentCache<K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    /// A cache with no remover; evicted entries are simply dropped.
    pub fn new(capacity: CacheCapacity, loader: impl CacheLoader<K, V> + 'static) -> Self {
        Self::with_parts(capacity, Box::new(loader), None)
    }

    pub fn with_remover(
        capacity: CacheCapacity,
        loader: impl CacheLoader<K, V> + 'static,
        remover: impl CacheRemover<K, V> + 'static,
    ) -> Self {
        Self::with_parts(capacity, Box::new(loader), Some(Box::new(remover)))
    }

    pub fn builder(capacity: CacheCapacity) -> ResidentCacheBuilder<K, V> {
        ResidentCacheBuilder {
            capacity,
            loader: None,
            remover: None,
        }
    }

    fn with_parts(
        capacity: CacheCapacity,
        loader: Box<dyn CacheLoader<K, V>>,
        remover: Option<Box<dyn CacheRemover<K, V>>>,
    ) -> Self {
        assert!(
            capacity != CacheCapacity::Bounded(0),
            "a bounded cache needs room for at least one entry"
        );

        Self {
            capacity,
            loader,
            remover,
            state: Mutex::new(State {
                slots: SmallKeyHashMap::default(),
                order: LruList::default(),
                num_resident: 0,
                num_evicting: 0,
            }),
            stats: StatCounters::default(),
        }
    }

    pub fn capacity(&self) -> CacheCapacity {
        self.capacity
    }

    /// The number of resident entries, including pinned entries and those being written back.
    pub fn len(&self) -> usize {
        self.state.lock().num_resident
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Returns `true` iff `key` is resident. This does not count as a use.
    pub fn contains(&self, key: &K) -> bool {
        matches!(self.state.lock().slots.get(key), Some(Slot::Resident(_)))
    }

    /// Returns the value for `key` if it is resident, marking it as most recently used. Never loads.
    pub fn get_if_resident(&self, key: &K) -> Option<V> {
        let value = self.state.lock().touch(key).map(|e| e.value.clone());
        if value.is_some() {
            self.stats.hit();
        }

        value
    }

    /// Pins `key` if it is resident. Never loads.
    pub fn pin_if_resident(&self, key: &K) -> Option<Pinned<'_, K, V>> {
        let value = self.state.lock().pin(key).map(|e| e.value.clone())?;
        self.stats.hit();

        Some(Pinned {
            cache: self,
            key: key.clone(),
            value,
        })
    }

    /// Returns the value for `key`, loading it if necessary. Concurrent callers for the same missing key share one load.
    ///
    /// A load failure is reported as `CacheError::Load` to every caller waiting on it and nothing is inserted. If the load
    /// succeeds but making room for it fails, the value stays resident and the `CacheError::Store` is returned.
    pub fn get(&self, key: &K) -> CacheResult<V> {
        self.get_or_load(key, false)
    }

    /// Like `get`, but the entry can't be evicted until the returned guard is dropped.
    pub fn get_pinned(&self, key: &K) -> CacheResult<Pinned<'_, K, V>> {
        let value = self.get_or_load(key, true)?;

        Ok(Pinned {
            cache: self,
            key: key.clone(),
            value,
        })
    }

    fn get_or_load(&self, key: &K, pin: bool) -> CacheResult<V> {
        loop {
            let lookup = {
                let mut state = self.state.lock();
                let hit = if pin { state.pin(key) } else { state.touch(key) }
                    .map(|entry| entry.value.clone());
                if let Some(value) = hit {
                    Lookup::Hit(value)
                } else {
                    match state.slots.get(key) {
                        Some(Slot::Loading(pending)) => Lookup::Wait(pending.clone()),
                        _ => {
                            let pending = Arc::new(PendingLoad::new());
                            state
                                .slots
                                .insert(key.clone(), Slot::Loading(pending.clone()));
                            Lookup::Load(pending)
                        }
                    }
                }
            };

            match lookup {
                Lookup::Hit(value) => {
                    tracing::trace!("hit {:?}", key);
                    self.stats.hit();
                    return Ok(value);
                }
                Lookup::Wait(pending) => {
                    self.stats.miss();
                    self.stats.coalesced();
                    let value = pending.wait()?;
                    if !pin {
                        return Ok(value);
                    }
                    // Pin whatever is resident now; if it was already evicted again, go around.
                    if let Some(entry) = self.state.lock().pin(key) {
                        return Ok(entry.value.clone());
                    }
                }
                Lookup::Load(pending) => {
                    self.stats.miss();
                    return self.load_and_insert(key, pending, pin);
                }
            }
        }
    }

    fn load_and_insert(
        &self,
        key: &K,
        pending: Arc<PendingLoad<V>>,
        pin: bool,
    ) -> CacheResult<V> {
        tracing::debug!("loading {:?}", key);
        self.stats.load();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(key)))
            .unwrap_or_else(|payload| Err(CacheError::loader(panic_message(payload))))
            .map_err(CacheError::load);

        {
            let mut state = self.state.lock();
            let still_ours = matches!(
                state.slots.get(key),
                Some(Slot::Loading(p)) if Arc::ptr_eq(p, &pending)
            );
            if still_ours {
                state.slots.remove(key);
                if let Ok(value) = &result {
                    state.insert(key.clone(), value.clone(), pin);
                }
            }
        }
        pending.complete(result.clone());

        match result {
            Ok(value) => {
                if let Err(e) = self.enforce_capacity() {
                    if pin {
                        // No guard is handed out on error.
                        self.release_pin(key);
                    }
                    return Err(e);
                }
                Ok(value)
            }
            Err(e) => {
                tracing::debug!("failed to load {:?}: {}", key, e);
                self.stats.load_failure();
                Err(e)
            }
        }
    }

    /// Evicts least recently used, unpinned entries until the cache is within capacity. Stops at the first failed write-back
    /// and returns it, leaving that entry resident.
    pub fn enforce_capacity(&self) -> CacheResult<()> {
        let limit = match self.capacity {
            CacheCapacity::Bounded(n) => n,
            CacheCapacity::Unbounded => return Ok(()),
        };

        loop {
            let victim = {
                let mut state = self.state.lock();
                if state.num_resident - state.num_evicting <= limit {
                    return Ok(());
                }
                let key = match state.order.iter_from_back().next() {
                    Some(key) => key.clone(),
                    // Everything left is pinned or already on its way out.
                    None => return Ok(()),
                };
                match state.begin_eviction(&key) {
                    Some(value) => (key, value),
                    None => return Ok(()),
                }
            };

            self.write_back_and_remove(&victim.0, &victim.1)?;
        }
    }

    fn write_back_and_remove(&self, key: &K, value: &V) -> CacheResult<bool> {
        let result = match &self.remover {
            Some(remover) => run_remover(&**remover, key, value),
            None => Ok(()),
        };

        let removed = self.state.lock().finish_eviction(key, result.is_ok());
        match result {
            Ok(()) => {
                if removed {
                    tracing::debug!("evicted {:?}", key);
                    self.stats.eviction();
                }
                Ok(removed)
            }
            Err(e) => {
                tracing::warn!("write-back of {:?} failed, keeping it resident: {}", key, e);
                self.stats.write_back_failure();
                Err(CacheError::store(e))
            }
        }
    }

    /// Removes `key` through the remover. Returns `Ok(false)` if the key is not resident, is pinned, or is already being
    /// written back. A load in progress is not affected.
    pub fn invalidate(&self, key: &K) -> CacheResult<bool> {
        let value = self.state.lock().begin_eviction(key);
        match value {
            Some(value) => self.write_back_and_remove(key, &value),
            None => Ok(false),
        }
    }

    /// Removes every unpinned entry through the remover, returning how many were removed. Stops at the first failed
    /// write-back.
    pub fn invalidate_all(&self) -> CacheResult<usize> {
        let keys: Vec<K> = {
            let state = self.state.lock();
            state.order.iter_from_back().cloned().collect()
        };

        let mut removed = 0;
        for key in keys.iter() {
            if self.invalidate(key)? {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Runs the remover on every resident entry without removing anything, i.e. flushes all dirty tiles to disk. Every entry is
    /// attempted; the first failure is returned.
    pub fn persist_all(&self) -> CacheResult<()> {
        let remover = match &self.remover {
            Some(remover) => remover,
            None => return Ok(()),
        };
        let entries: Vec<(K, V)> = {
            let state = self.state.lock();
            state
                .slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Resident(entry) => Some((key.clone(), entry.value.clone())),
                    Slot::Loading(_) => None,
                })
                .collect()
        };

        let mut first_error = None;
        for (key, value) in entries.iter() {
            if let Err(e) = run_remover(&**remover, key, value) {
                tracing::warn!("failed to persist {:?}: {}", key, e);
                self.stats.write_back_failure();
                first_error.get_or_insert(CacheError::store(e));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn release_pin(&self, key: &K) {
        let mut state = self.state.lock();
        let State { slots, order, .. } = &mut *state;
        if let Some(Slot::Resident(entry)) = slots.get_mut(key) {
            entry.pins = entry.pins.saturating_sub(1);
            if entry.pins == 0 && !entry.evicting && entry.recency.is_none() {
                entry.recency = Some(order.push_front(key.clone()));
            }
        }
    }

    fn unpin(&self, key: &K) {
        self.release_pin(key);
        if let Err(e) = self.enforce_capacity() {
            tracing::warn!("eviction after unpinning {:?} failed: {}", key, e);
        }
    }
}

fn run_remover<K, V>(remover: &dyn CacheRemover<K, V>, key: &K, value: &V) -> CacheResult<()> {
    panic::catch_unwind(AssertUnwindSafe(|| remover.on_removal(key, value)))
        .unwrap_or_else(|payload| Err(CacheError::remover(panic_message(payload))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Assembles a `ResidentCache` from independently supplied capabilities.
pub struct ResidentCacheBuilder<K, V> {
    capacity: CacheCapacity,
    loader: Option<Box<dyn CacheLoader<K, V>>>,
    remover: Option<Box<dyn CacheRemover<K, V>>>,
}

impl<K, V> ResidentCacheBuilder<K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    pub fn loader(mut self, loader: impl CacheLoader<K, V> + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn remover(mut self, remover: impl CacheRemover<K, V> + 'static) -> Self {
        self.remover = Some(Box::new(remover));
        self
    }

    pub fn build(self) -> CacheResult<ResidentCache<K, V>> {
        if self.capacity == CacheCapacity::Bounded(0) {
            return Err(CacheError::Config("cache capacity must be positive".into()));
        }
        let loader = self
            .loader
            .ok_or_else(|| CacheError::Config("a resident cache needs a loader".into()))?;

        Ok(ResidentCache::with_parts(
            self.capacity,
            loader,
            self.remover,
        ))
    }
}

/// Keeps an entry resident for as long as it lives. Dropping the guard makes the entry the most recently used and lets the
/// cache evict again.
pub struct Pinned<'a, K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    cache: &'a ResidentCache<K, V>,
    key: K,
    value: V,
}

impl<'a, K, V> Pinned<'a, K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<'a, K, V> Deref for Pinned<'a, K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<'a, K, V> Drop for Pinned<'a, K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    fn drop(&mut self) {
        self.cache.unpin(&self.key);
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnLoader, FnRemover};

    use pretty_assertions::assert_eq;
    use rand::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    type Record = Arc<Mutex<Vec<char>>>;

    fn recording_cache(capacity: usize) -> (ResidentCache<char, String>, Record) {
        let removed = Record::default();
        let record = removed.clone();
        let cache = ResidentCache::builder(CacheCapacity::Bounded(capacity))
            .loader(FnLoader(|key: &char| -> CacheResult<String> {
                Ok(key.to_string())
            }))
            .remover(FnRemover(move |key: &char, _value: &String| -> CacheResult<()> {
                record.lock().push(*key);
                Ok(())
            }))
            .build()
            .unwrap();

        (cache, removed)
    }

    #[test]
    fn evicts_strictly_least_recently_used() {
        let (cache, removed) = recording_cache(2);

        cache.get(&'A').unwrap();
        cache.get(&'B').unwrap();
        cache.get(&'C').unwrap();

        assert_eq!(*removed.lock(), vec!['A']);
        assert!(!cache.contains(&'A'));
        assert!(cache.contains(&'B'));
        assert!(cache.contains(&'C'));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn hit_refreshes_recency() {
        let (cache, removed) = recording_cache(2);

        cache.get(&'A').unwrap();
        cache.get(&'B').unwrap();
        cache.get(&'A').unwrap();
        cache.get(&'C').unwrap();

        assert_eq!(*removed.lock(), vec!['B']);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn contains_does_not_refresh_recency() {
        let (cache, removed) = recording_cache(2);

        cache.get(&'A').unwrap();
        cache.get(&'B').unwrap();
        assert!(cache.contains(&'A'));
        cache.get(&'C').unwrap();

        assert_eq!(*removed.lock(), vec!['A']);
    }

    #[test]
    fn concurrent_misses_share_one_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let cache = Arc::new(ResidentCache::new(
            CacheCapacity::Bounded(4),
            FnLoader(move |key: &u32| -> CacheResult<Arc<u32>> {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                Ok(Arc::new(*key * 10))
            }),
        ));

        let num_threads = 8;
        let barrier = Arc::new(Barrier::new(num_threads));
        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.get(&3).unwrap()
                })
            })
            .collect();
        let values: Vec<Arc<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert_eq!(*values[0], 30);
    }

    #[test]
    fn failed_load_inserts_nothing_and_can_be_retried() {
        let fail = Arc::new(AtomicBool::new(true));
        let should_fail = fail.clone();
        let cache = ResidentCache::new(
            CacheCapacity::Unbounded,
            FnLoader(move |key: &u8| {
                if should_fail.load(Ordering::SeqCst) {
                    Err(CacheError::loader("backend unavailable"))
                } else {
                    Ok(*key)
                }
            }),
        );

        let err = cache.get(&1).unwrap_err();
        assert!(err.is_load_failure());
        assert!(!cache.contains(&1));
        assert_eq!(cache.stats().load_failures, 1);

        fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.get(&1).unwrap(), 1);
    }

    #[test]
    fn loader_panic_becomes_load_failure() {
        let cache = ResidentCache::new(
            CacheCapacity::Unbounded,
            FnLoader(|_key: &u8| -> CacheResult<u8> { panic!("corrupt input") }),
        );

        let err = cache.get(&0).unwrap_err();
        assert!(err.is_load_failure());
        assert!(err.to_string().contains("corrupt input"));
        assert!(cache.is_empty());
    }

    #[test]
    fn failed_write_back_keeps_entry_resident() {
        let allow = Arc::new(AtomicBool::new(false));
        let allowed = allow.clone();
        let cache = ResidentCache::with_remover(
            CacheCapacity::Bounded(1),
            FnLoader(|key: &u8| -> CacheResult<u8> { Ok(*key) }),
            FnRemover(move |_key: &u8, _value: &u8| -> CacheResult<()> {
                if allowed.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(CacheError::from(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "disk full",
                    )))
                }
            }),
        );

        cache.get(&1).unwrap();
        let err = cache.get(&2).unwrap_err();
        assert!(err.is_store_failure());
        // Both are resident, over capacity.
        assert!(cache.contains(&1));
        assert!(cache.contains(&2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().write_back_failures, 1);

        allow.store(true, Ordering::SeqCst);
        cache.enforce_capacity().unwrap();
        assert_eq!(cache.len(), 1);
        // The entry that failed was kept as the coldest, so it went first.
        assert!(!cache.contains(&1));
    }

    #[test]
    fn pinned_entries_are_not_evicted() {
        let (cache, removed) = recording_cache(2);

        let pinned = cache.get_pinned(&'A').unwrap();
        assert_eq!(pinned.as_str(), "A");
        cache.get(&'B').unwrap();
        cache.get(&'C').unwrap();

        assert!(cache.contains(&'A'));
        assert_eq!(*removed.lock(), vec!['B']);

        // Unpinning makes A the most recent, so C is the next victim.
        drop(pinned);
        cache.get(&'D').unwrap();
        assert_eq!(*removed.lock(), vec!['B', 'C']);
        assert!(cache.contains(&'A'));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_routes_through_remover() {
        let (cache, removed) = recording_cache(4);

        cache.get(&'A').unwrap();
        cache.get(&'B').unwrap();
        assert!(cache.invalidate(&'A').unwrap());
        assert!(!cache.invalidate(&'Z').unwrap());
        assert_eq!(*removed.lock(), vec!['A']);

        let pinned = cache.get_pinned(&'C').unwrap();
        assert_eq!(cache.invalidate_all().unwrap(), 1);
        assert_eq!(*removed.lock(), vec!['A', 'B']);
        assert!(cache.contains(&'C'));
        drop(pinned);
    }

    #[test]
    fn persist_all_keeps_entries() {
        let (cache, removed) = recording_cache(4);

        cache.get(&'A').unwrap();
        cache.get(&'B').unwrap();
        cache.persist_all().unwrap();

        let mut persisted = removed.lock().clone();
        persisted.sort_unstable();
        assert_eq!(persisted, vec!['A', 'B']);
        assert_eq!(cache.len(), 2);
    }

    /// Capacity 1. The first write-back of key 1 stops between two waits on `barrier`.
    fn stalling_cache(
        barrier: Arc<Barrier>,
        loads: Arc<AtomicUsize>,
    ) -> ResidentCache<u32, Arc<u32>> {
        let stalled = AtomicBool::new(false);
        ResidentCache::with_remover(
            CacheCapacity::Bounded(1),
            FnLoader(move |key: &u32| -> CacheResult<Arc<u32>> {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(*key * 10))
            }),
            FnRemover(move |key: &u32, _value: &Arc<u32>| -> CacheResult<()> {
                if *key == 1 && !stalled.swap(true, Ordering::SeqCst) {
                    barrier.wait();
                    barrier.wait();
                }
                Ok(())
            }),
        )
    }

    #[test]
    fn get_during_write_back_revives_entry() {
        let barrier = Arc::new(Barrier::new(2));
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(stalling_cache(barrier.clone(), loads.clone()));
        let original = cache.get(&1).unwrap();

        let evictor = {
            let cache = cache.clone();
            thread::spawn(move || cache.get(&2).unwrap())
        };
        // Key 1 is being written back now.
        barrier.wait();
        let revived = cache.get(&1).unwrap();
        barrier.wait();
        assert_eq!(*evictor.join().unwrap(), 20);

        assert!(Arc::ptr_eq(&revived, &original));
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert_eq!(cache.len(), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pin_during_write_back_keeps_entry() {
        let barrier = Arc::new(Barrier::new(2));
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(stalling_cache(barrier.clone(), loads.clone()));
        let original = cache.get(&1).unwrap();

        let evictor = {
            let cache = cache.clone();
            thread::spawn(move || cache.get(&2).unwrap())
        };
        barrier.wait();
        let pinned = cache.get_pinned(&1).unwrap();
        barrier.wait();
        evictor.join().unwrap();

        assert!(Arc::ptr_eq(&*pinned, &original));
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));

        drop(pinned);
        assert!(cache.contains(&1));
        assert_eq!(cache.len(), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remover_panic_is_a_store_failure_on_every_path() {
        let cache = ResidentCache::with_remover(
            CacheCapacity::Bounded(1),
            FnLoader(|key: &u8| -> CacheResult<u8> { Ok(*key) }),
            FnRemover(|_key: &u8, _value: &u8| -> CacheResult<()> {
                panic!("disk driver crashed")
            }),
        );

        cache.get(&1).unwrap();
        let evicting = cache.get(&2).unwrap_err();
        assert!(matches!(
            evicting,
            CacheError::Store(ref inner) if matches!(**inner, CacheError::Remover(_))
        ));
        assert_eq!(
            evicting.to_string(),
            "write-back failed: remover failed: panicked: disk driver crashed"
        );

        let persisting = cache.persist_all().unwrap_err();
        assert!(persisting.is_store_failure());
        assert!(persisting.to_string().contains("disk driver crashed"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn get_if_resident_never_loads() {
        let (cache, _) = recording_cache(2);

        assert_eq!(cache.get_if_resident(&'A'), None);
        cache.get(&'A').unwrap();
        assert_eq!(cache.get_if_resident(&'A').as_deref(), Some("A"));
        assert_eq!(cache.stats().loads, 1);
    }

    #[test]
    fn capacity_holds_under_random_access() {
        let capacity = 5;
        let (cache, removed) = recording_cache(capacity);
        let keys: Vec<char> = ('a'..='p').collect();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..500 {
            let key = *keys.choose(&mut rng).unwrap();
            assert_eq!(cache.get(&key).unwrap(), key.to_string());
            assert!(cache.len() <= capacity);
        }

        let stats = cache.stats();
        assert_eq!(stats.evictions as usize, removed.lock().len());
        assert_eq!(stats.loads as usize - removed.lock().len(), cache.len());
    }

    #[test]
    fn builder_rejects_missing_loader() {
        let result = ResidentCache::<u8, u8>::builder(CacheCapacity::Unbounded).build();
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
