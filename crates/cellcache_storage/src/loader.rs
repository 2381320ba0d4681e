//! The capabilities that plug tile production and write-back into the cache layers.
//!
//! Application code usually implements one of:
//!   - `TileLoader`: produce a whole `Tile` for a `CellId` (deserialize, fetch over the network, compute)
//!   - `CellLoader`: fill a freshly allocated tile in place, turned into a `TileLoader` by `FilledCellLoader`
//!
//! The resident cache itself is generic over keys and values and only sees `CacheLoader` and `CacheRemover`.

use crate::{CacheResult, Scalar, Tile};

use cellcache_core::prelude::*;

use auto_impl::auto_impl;
use std::marker::PhantomData;
use std::sync::Arc;

/// Produces the content of a cell. This is the seam where application-specific tile production enters the cache.
#[auto_impl(&, Box, Arc)]
pub trait TileLoader<T, const N: usize>: Send + Sync {
    fn produce(&self, id: CellId) -> CacheResult<Tile<T, N>>;
}

/// Fills an already allocated, default-initialized tile of the right extent.
#[auto_impl(&, Box, Arc)]
pub trait CellLoader<T, const N: usize>: Send + Sync {
    fn load(&self, tile: &mut Tile<T, N>) -> CacheResult<()>;
}

/// Handles a miss in a cache keyed by `K`.
#[auto_impl(&, Box, Arc)]
pub trait CacheLoader<K, V>: Send + Sync {
    fn load(&self, key: &K) -> CacheResult<V>;
}

/// Called with every entry that leaves a cache, before it is dropped. An error keeps the entry resident.
#[auto_impl(&, Box, Arc)]
pub trait CacheRemover<K, V>: Send + Sync {
    fn on_removal(&self, key: &K, value: &V) -> CacheResult<()>;
}

/// A `TileLoader` backed by a closure.
pub struct FnTileLoader<F>(pub F);

impl<F, T, const N: usize> TileLoader<T, N> for FnTileLoader<F>
where
    F: Fn(CellId) -> CacheResult<Tile<T, N>> + Send + Sync,
{
    #[inline]
    fn produce(&self, id: CellId) -> CacheResult<Tile<T, N>> {
        (self.0)(id)
    }
}

/// A `CellLoader` backed by a closure.
pub struct FnCellLoader<F>(pub F);

impl<F, T, const N: usize> CellLoader<T, N> for FnCellLoader<F>
where
    F: Fn(&mut Tile<T, N>) -> CacheResult<()> + Send + Sync,
{
    #[inline]
    fn load(&self, tile: &mut Tile<T, N>) -> CacheResult<()> {
        (self.0)(tile)
    }
}

/// A `CacheLoader` backed by a closure.
pub struct FnLoader<F>(pub F);

impl<F, K, V> CacheLoader<K, V> for FnLoader<F>
where
    F: Fn(&K) -> CacheResult<V> + Send + Sync,
{
    #[inline]
    fn load(&self, key: &K) -> CacheResult<V> {
        (self.0)(key)
    }
}

/// A `CacheRemover` backed by a closure.
pub struct FnRemover<F>(pub F);

impl<F, K, V> CacheRemover<K, V> for FnRemover<F>
where
    F: Fn(&K, &V) -> CacheResult<()> + Send + Sync,
{
    #[inline]
    fn on_removal(&self, key: &K, value: &V) -> CacheResult<()> {
        (self.0)(key, value)
    }
}

/// Allocates a default-filled tile with the extent given by the grid, then lets a `CellLoader` fill it.
pub struct FilledCellLoader<T, L, const N: usize> {
    grid: CellGrid<N>,
    loader: L,
    marker: PhantomData<fn() -> T>,
}

impl<T, L, const N: usize> FilledCellLoader<T, L, N> {
    pub fn new(grid: CellGrid<N>, loader: L) -> Self {
        Self {
            grid,
            loader,
            marker: PhantomData,
        }
    }
}

impl<T, L, const N: usize> TileLoader<T, N> for FilledCellLoader<T, L, N>
where
    T: Scalar,
    L: CellLoader<T, N>,
{
    fn produce(&self, id: CellId) -> CacheResult<Tile<T, N>> {
        let mut tile = Tile::fill(id, self.grid.cell_extent(id), T::default());
        self.loader.load(&mut tile)?;

        Ok(tile)
    }
}

/// Serves tiles straight from a `TileLoader` with no disk tier. Tiles are shared as `Arc`s so the cache and its readers can
/// hold them at the same time.
pub struct TileCacheLoader<L> {
    loader: L,
}

impl<L> TileCacheLoader<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }
}

impl<L, T, const N: usize> CacheLoader<CellId, Arc<Tile<T, N>>> for TileCacheLoader<L>
where
    T: Scalar,
    L: TileLoader<T, N>,
{
    #[inline]
    fn load(&self, key: &CellId) -> CacheResult<Arc<Tile<T, N>>> {
        self.loader.produce(*key).map(Arc::new)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
