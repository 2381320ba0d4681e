//! Out-of-core access to N-dimensional datasets that are too large for memory.
//!
//! The dataset is split into rectangular cells. Each cell moves between three tiers: a bounded in-memory cache, a
//! directory of cell files, and the application's loader, which produces a cell the first time it is needed.
//!
//! This library is organized into two crates:
//! - **core**: points, extents, and the `CellGrid` that maps points to cells
//! - **storage**: the cache tiers, background fetching, and `CellView` element access
//!
//! Start with `CachedCellArray` and `CellCacheOptions`:
//!
//! ```
//! use cellcache::prelude::*;
//!
//! let options = CellCacheOptions::default().cell_size(4).max_cache_size(2);
//! let array = CachedCellArray::create(
//!     PointN([8, 8]),
//!     FnTileLoader(|id: CellId| -> CacheResult<Tile<u8, 2>> {
//!         let grid = CellGrid::new(PointN([8, 8]), PointN([4, 4]))?;
//!         Ok(Tile::fill(id, grid.cell_extent(id), 1))
//!     }),
//!     &options,
//! )
//! .unwrap();
//!
//! let view = array.view();
//! view.set(PointN([5, 5]), 9).unwrap();
//! assert_eq!(view.get(PointN([5, 5])).unwrap(), 9);
//! assert_eq!(view.get(PointN([0, 0])).unwrap(), 1);
//! ```

pub use cellcache_core as core;
pub use cellcache_storage as storage;

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::storage::prelude::*;
}
