//! Element-level access to a whole dataset through whichever cache tier backs it.

use crate::{
    CacheError, CacheHints, CacheResult, Pinned, ResidentCache, Scalar, Tile, VolatileCache,
};

use cellcache_core::prelude::*;

use auto_impl::auto_impl;
use core::ops::Deref;
use std::sync::Arc;

/// Where a `CellView` gets its tiles from.
#[auto_impl(&, Box, Arc)]
pub trait CellSource<T: Scalar, const N: usize>: Send + Sync {
    fn tile(&self, id: CellId) -> CacheResult<Arc<Tile<T, N>>>;

    /// Like `tile`, but the cell stays resident until the guard is dropped. Writers hold this for the whole mutation, so the
    /// change can't land in a tile the cache has already let go of.
    fn tile_pinned(&self, id: CellId) -> CacheResult<PinnedTile<'_, T, N>>;
}

/// A tile together with the pin that keeps it in the cache, if the source handed out one.
pub struct PinnedTile<'a, T, const N: usize>
where
    T: Scalar,
{
    tile: Arc<Tile<T, N>>,
    _pin: Option<Pinned<'a, CellId, Arc<Tile<T, N>>>>,
}

impl<'a, T, const N: usize> PinnedTile<'a, T, N>
where
    T: Scalar,
{
    pub fn new(tile: Arc<Tile<T, N>>, pin: Option<Pinned<'a, CellId, Arc<Tile<T, N>>>>) -> Self {
        Self { tile, _pin: pin }
    }

    pub fn is_pinned(&self) -> bool {
        self._pin.is_some()
    }
}

impl<'a, T, const N: usize> Deref for PinnedTile<'a, T, N>
where
    T: Scalar,
{
    type Target = Tile<T, N>;

    fn deref(&self) -> &Tile<T, N> {
        &self.tile
    }
}

impl<T, const N: usize> CellSource<T, N> for ResidentCache<CellId, Arc<Tile<T, N>>>
where
    T: Scalar,
{
    #[inline]
    fn tile(&self, id: CellId) -> CacheResult<Arc<Tile<T, N>>> {
        self.get(&id)
    }

    fn tile_pinned(&self, id: CellId) -> CacheResult<PinnedTile<'_, T, N>> {
        let pin = self.get_pinned(&id)?;

        Ok(PinnedTile::new(Arc::clone(&pin), Some(pin)))
    }
}

/// Tiles from a `VolatileCache`, always requested with the same hints.
pub struct VolatileCellSource<T, const N: usize> {
    cache: Arc<VolatileCache<CellId, Arc<Tile<T, N>>>>,
    hints: CacheHints,
}

impl<T, const N: usize> VolatileCellSource<T, N> {
    pub fn new(cache: Arc<VolatileCache<CellId, Arc<Tile<T, N>>>>, hints: CacheHints) -> Self {
        Self { cache, hints }
    }
}

impl<T, const N: usize> CellSource<T, N> for VolatileCellSource<T, N>
where
    T: Scalar,
{
    /// Any pin requested by the hints is released before returning.
    #[inline]
    fn tile(&self, id: CellId) -> CacheResult<Arc<Tile<T, N>>> {
        self.cache.get(&id, &self.hints).map(|r| r.into_value())
    }

    /// Pins regardless of the hints. Placeholders come back unpinned.
    fn tile_pinned(&self, id: CellId) -> CacheResult<PinnedTile<'_, T, N>> {
        let hints = CacheHints {
            pin: true,
            ..self.hints
        };
        let (tile, pin) = self.cache.get(&id, &hints)?.into_parts();

        Ok(PinnedTile::new(tile, pin))
    }
}

/// An element read through a possibly non-blocking view. `valid` is `false` when the value came from a placeholder.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Volatile<T> {
    pub value: T,
    pub valid: bool,
}

/// Random access over the full dataset. Each access is routed to the cell containing it.
#[derive(Clone)]
pub struct CellView<T, const N: usize>
where
    T: Scalar,
{
    grid: CellGrid<N>,
    source: Arc<dyn CellSource<T, N>>,
}

impl<T, const N: usize> CellView<T, N>
where
    T: Scalar,
{
    pub fn new(grid: CellGrid<N>, source: Arc<dyn CellSource<T, N>>) -> Self {
        Self { grid, source }
    }

    /// Every access blocks until its cell is loaded.
    pub fn blocking(grid: CellGrid<N>, cache: Arc<ResidentCache<CellId, Arc<Tile<T, N>>>>) -> Self {
        Self::new(grid, cache)
    }

    /// Accesses to missing cells see placeholders while the cells are fetched in the background (depending on `hints`).
    ///
    /// Reads never keep a pin, whatever `hints.pin` says. Writes always pin their cell until the write is done.
    pub fn volatile(
        grid: CellGrid<N>,
        cache: Arc<VolatileCache<CellId, Arc<Tile<T, N>>>>,
        hints: CacheHints,
    ) -> Self {
        Self::new(grid, Arc::new(VolatileCellSource::new(cache, hints)))
    }

    pub fn grid(&self) -> &CellGrid<N> {
        &self.grid
    }

    pub fn extent(&self) -> ExtentN<N> {
        self.grid.dataset_extent()
    }

    pub fn cell(&self, id: CellId) -> CacheResult<Arc<Tile<T, N>>> {
        self.source.tile(id)
    }

    /// The tile that contains `p`. Panics if `p` is outside the dataset.
    pub fn cell_containing(&self, p: PointN<N>) -> CacheResult<Arc<Tile<T, N>>> {
        self.cell(self.grid.cell_id_containing(p))
    }

    pub fn get(&self, p: PointN<N>) -> CacheResult<T> {
        Ok(self.cell_containing(p)?.get(p))
    }

    pub fn get_volatile(&self, p: PointN<N>) -> CacheResult<Volatile<T>> {
        let tile = self.cell_containing(p)?;

        Ok(Volatile {
            value: tile.get(p),
            valid: tile.is_valid(),
        })
    }

    /// Writes one element, marking its tile dirty. Placeholders reject writes.
    pub fn set(&self, p: PointN<N>, value: T) -> CacheResult<()> {
        let tile = self.writable_cell(self.grid.cell_id_containing(p))?;
        tile.set(p, value);

        Ok(())
    }

    fn writable_cell(&self, id: CellId) -> CacheResult<PinnedTile<'_, T, N>> {
        let tile = self.source.tile_pinned(id)?;
        if !tile.is_valid() {
            return Err(CacheError::PlaceholderWrite(id));
        }

        Ok(tile)
    }

    /// Copies `extent` out, dimension 0 varying fastest. Points outside the dataset read as `T::default()`.
    pub fn read_extent(&self, extent: &ExtentN<N>) -> CacheResult<Vec<T>> {
        let mut out = vec![T::default(); extent.num_points()];
        for id in self.grid.cell_ids_overlapping(extent) {
            let tile = self.cell(id)?;
            let overlap = tile.extent().intersection(extent);
            let data = tile.read();
            for p in overlap.iter_points() {
                out[extent.linear_index(p)] = data[tile.extent().linear_index(p)];
            }
        }

        Ok(out)
    }

    /// Sets every element of `extent` that lies in the dataset to `value`.
    pub fn fill_extent(&self, extent: &ExtentN<N>, value: T) -> CacheResult<()> {
        for id in self.grid.cell_ids_overlapping(extent) {
            let tile = self.writable_cell(id)?;
            let local = *tile.extent();
            let overlap = local.intersection(extent);
            tile.modify(|data| {
                for p in overlap.iter_points() {
                    data[local.linear_index(p)] = value;
                }
            });
        }

        Ok(())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
