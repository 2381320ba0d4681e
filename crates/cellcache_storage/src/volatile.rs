//! Non-blocking access on top of a `ResidentCache`.
//!
//! A volatile request for a missing key never waits: it queues a background fetch and immediately hands back a placeholder.
//! Nothing notifies the caller when the fetch lands; it simply polls again (say, on the next repaint) and sees the real value.

use crate::{
    CacheResult, FetchTask, Pinned, PriorityQueues, ResidentCache, Scalar, SmallKeyHashSet, Tile,
};

use cellcache_core::prelude::*;

use auto_impl::auto_impl;
use core::fmt::Debug;
use core::hash::Hash;
use core::ops::Deref;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// What to do when the requested entry is not resident.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum LoadingStrategy {
    /// Load synchronously, blocking the caller.
    Blocking,
    /// Queue a background fetch and return a placeholder.
    Volatile,
    /// Return a placeholder without fetching anything.
    DontLoad,
}

/// Per-access instructions for a `VolatileCache`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CacheHints {
    pub strategy: LoadingStrategy,
    /// Queue level for background fetches, 0 being the most urgent.
    pub priority: usize,
    /// Put the fetch ahead of others already queued at the same priority.
    pub enqueue_to_front: bool,
    /// Keep a resident entry pinned for as long as the returned `CacheRef` lives.
    pub pin: bool,
}

impl Default for CacheHints {
    fn default() -> Self {
        Self::volatile(0)
    }
}

impl CacheHints {
    pub fn blocking() -> Self {
        Self {
            strategy: LoadingStrategy::Blocking,
            priority: 0,
            enqueue_to_front: false,
            pin: false,
        }
    }

    pub fn volatile(priority: usize) -> Self {
        Self {
            strategy: LoadingStrategy::Volatile,
            priority,
            enqueue_to_front: false,
            pin: false,
        }
    }

    pub fn dont_load() -> Self {
        Self {
            strategy: LoadingStrategy::DontLoad,
            ..Self::blocking()
        }
    }

    pub fn to_front(mut self) -> Self {
        self.enqueue_to_front = true;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pin = true;
        self
    }
}

/// Produces the stand-in value returned while the real one is being fetched. Placeholders are never inserted into the cache.
#[auto_impl(&, Box, Arc)]
pub trait CreateInvalid<K, V>: Send + Sync {
    fn create_invalid(&self, key: &K) -> CacheResult<V>;
}

/// Invalid, default-filled tiles with the extent of the requested cell.
pub struct InvalidTiles<T, const N: usize> {
    grid: CellGrid<N>,
    marker: PhantomData<fn() -> T>,
}

impl<T, const N: usize> InvalidTiles<T, N> {
    pub fn new(grid: CellGrid<N>) -> Self {
        Self {
            grid,
            marker: PhantomData,
        }
    }
}

impl<T, const N: usize> CreateInvalid<CellId, Arc<Tile<T, N>>> for InvalidTiles<T, N>
where
    T: Scalar,
{
    fn create_invalid(&self, key: &CellId) -> CacheResult<Arc<Tile<T, N>>> {
        Ok(Arc::new(Tile::invalid(*key, self.grid.cell_extent(*key))))
    }
}

/// The answer to a `VolatileCache::get`: either the real value or a placeholder.
pub struct CacheRef<'a, K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    value: V,
    valid: bool,
    _pin: Option<Pinned<'a, K, V>>,
}

impl<'a, K, V> CacheRef<'a, K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    /// `false` for placeholders.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_pinned(&self) -> bool {
        self._pin.is_some()
    }

    /// Releases any pin.
    pub fn into_value(self) -> V {
        self.value
    }

    /// The value and the pin that keeps it resident, so the two can be held separately.
    pub fn into_parts(self) -> (V, Option<Pinned<'a, K, V>>) {
        (self.value, self._pin)
    }
}

impl<'a, K, V> Deref for CacheRef<'a, K, V>
where
    K: Clone + Debug + Eq + Hash + Send,
    V: Clone + Send,
{
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

pub struct VolatileCache<K, V> {
    backing: Arc<ResidentCache<K, V>>,
    queues: Arc<PriorityQueues>,
    create_invalid: Box<dyn CreateInvalid<K, V>>,
    // Keys with a fetch queued or running.
    pending: Arc<Mutex<SmallKeyHashSet<K>>>,
}

impl<K, V> VolatileCache<K, V>
where
    K: Clone + Debug + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        backing: Arc<ResidentCache<K, V>>,
        queues: Arc<PriorityQueues>,
        create_invalid: impl CreateInvalid<K, V> + 'static,
    ) -> Self {
        Self {
            backing,
            queues,
            create_invalid: Box::new(create_invalid),
            pending: Arc::new(Mutex::new(SmallKeyHashSet::default())),
        }
    }

    pub fn backing(&self) -> &Arc<ResidentCache<K, V>> {
        &self.backing
    }

    pub fn queues(&self) -> &Arc<PriorityQueues> {
        &self.queues
    }

    /// Returns `true` iff a fetch for `key` is queued or running.
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().contains(key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn get(&self, key: &K, hints: &CacheHints) -> CacheResult<CacheRef<'_, K, V>> {
        if hints.strategy == LoadingStrategy::Blocking {
            return if hints.pin {
                let pin = self.backing.get_pinned(key)?;
                Ok(CacheRef {
                    value: V::clone(&pin),
                    valid: true,
                    _pin: Some(pin),
                })
            } else {
                Ok(CacheRef {
                    value: self.backing.get(key)?,
                    valid: true,
                    _pin: None,
                })
            };
        }

        let resident = if hints.pin {
            self.backing
                .pin_if_resident(key)
                .map(|pin| (V::clone(&pin), Some(pin)))
        } else {
            self.backing.get_if_resident(key).map(|value| (value, None))
        };
        if let Some((value, pin)) = resident {
            return Ok(CacheRef {
                value,
                valid: true,
                _pin: pin,
            });
        }

        if hints.strategy == LoadingStrategy::Volatile {
            self.request(key, hints.priority, hints.enqueue_to_front)?;
        }

        Ok(CacheRef {
            value: self.create_invalid.create_invalid(key)?,
            valid: false,
            _pin: None,
        })
    }

    /// Queues a background load of `key` unless one is already pending. Returns `true` iff a task was queued.
    pub fn request(&self, key: &K, priority: usize, to_front: bool) -> CacheResult<bool> {
        if !self.pending.lock().insert(key.clone()) {
            return Ok(false);
        }
        // From here on, the marker is removed when the task finishes, fails, or is discarded.
        let marker = PendingMarker {
            pending: self.pending.clone(),
            key: key.clone(),
        };

        let backing = self.backing.clone();
        let task_key = key.clone();
        let task = FetchTask::new(format!("{:?}", key), move || {
            let _marker = marker;
            backing.get(&task_key).map(|_| ())
        });
        self.queues.enqueue(task, priority, to_front)?;

        Ok(true)
    }
}

struct PendingMarker<K>
where
    K: Eq + Hash,
{
    pending: Arc<Mutex<SmallKeyHashSet<K>>>,
    key: K,
}

impl<K> Drop for PendingMarker<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
