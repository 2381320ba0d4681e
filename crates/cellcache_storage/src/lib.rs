#![allow(clippy::type_complexity, clippy::len_without_is_empty)]

//! Out-of-core caching for datasets too large to keep in memory, split into rectangular cells.
//!
//! Cells move through three tiers:
//!   - `ResidentCache`: bounded, least-recently-used, in memory
//!   - `DiskStore`: one raw file per cell, written back when a modified cell is evicted
//!   - `TileLoader`: the application code that produces a cell the first time it is needed
//!
//! `IoSync` keeps the load and write-back of any one cell from overlapping, and `VolatileCache` adds non-blocking access on
//! top of the resident tier, fetching missing cells on a `FetchScheduler` while handing out placeholders.
//!
//! Most users only need `CachedCellArray`, which wires everything together from `CellCacheOptions`, and `CellView` for
//! element access.

pub mod disk;
pub mod error;
pub mod factory;
pub mod fetch;
pub mod io_sync;
pub mod loader;
pub mod options;
pub mod resident;
pub mod stats;
pub mod tile;
pub mod view;
pub mod volatile;

pub use disk::*;
pub use error::*;
pub use factory::*;
pub use fetch::*;
pub use io_sync::*;
pub use loader::*;
pub use options::*;
pub use resident::*;
pub use stats::CacheStats;
pub use tile::*;
pub use view::*;
pub use volatile::*;

// Hash types to use for small keys like `CellId`.
pub type SmallKeyHashMap<K, V> = ahash::AHashMap<K, V>;
pub type SmallKeyHashSet<K> = ahash::AHashSet<K>;

pub mod prelude {
    pub use super::{
        CacheCapacity, CacheError, CacheHints, CacheLoader, CacheRemover, CacheResult, CacheStats,
        CachedCellArray, CellCacheOptions, CellLoader, CellSource, CellView, CreateInvalid,
        DirtyTracking, DiskCellCache, DiskStore, FetchScheduler, FetchTask, FilledCellLoader,
        FnCellLoader, FnLoader, FnRemover, FnTileLoader, InitialDirty, InvalidTiles, IoSync,
        LoadingStrategy, Pinned, PinnedTile, PriorityQueues, ResidentCache, Scalar, Tile,
        TileCache, TileCacheLoader, TileLoader, Volatile, VolatileCache, VolatileTileCache,
        WorkerPool,
    };

    pub use cellcache_core::prelude::*;
}
