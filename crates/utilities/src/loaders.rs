use cellcache_core::prelude::*;
use cellcache_storage::{CacheResult, Scalar, Tile, TileLoader};

use std::sync::atomic::{AtomicUsize, Ordering};

pub const CHECKER_LOW: u16 = 0x0000;
pub const CHECKER_HIGH: u16 = 0xffff;

/// Fills each cell with `CHECKER_LOW` or `CHECKER_HIGH`, alternating by the parity of its grid position.
#[derive(Clone, Copy)]
pub struct CheckerboardLoader<const N: usize> {
    grid: CellGrid<N>,
}

impl<const N: usize> CheckerboardLoader<N> {
    pub fn new(grid: CellGrid<N>) -> Self {
        Self { grid }
    }

    pub fn value_for(&self, id: CellId) -> u16 {
        let parity = self.grid.grid_position(id).0.iter().sum::<i64>().rem_euclid(2);
        if parity == 0 {
            CHECKER_LOW
        } else {
            CHECKER_HIGH
        }
    }
}

impl<const N: usize> TileLoader<u16, N> for CheckerboardLoader<N> {
    fn produce(&self, id: CellId) -> CacheResult<Tile<u16, N>> {
        Ok(Tile::fill(id, self.grid.cell_extent(id), self.value_for(id)))
    }
}

/// Wraps a loader and counts how many tiles it has produced.
pub struct CountingLoader<L> {
    inner: L,
    count: AtomicUsize,
}

impl<L> CountingLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<L, T, const N: usize> TileLoader<T, N> for CountingLoader<L>
where
    L: TileLoader<T, N>,
    T: Scalar,
{
    fn produce(&self, id: CellId) -> CacheResult<Tile<T, N>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.produce(id)
    }
}
