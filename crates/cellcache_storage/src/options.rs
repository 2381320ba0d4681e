use crate::{CacheCapacity, CacheError, CacheResult, DirtyTracking, InitialDirty};

use cellcache_core::prelude::*;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::thread;

/// Everything needed to wire up a `CachedCellArray`. Missing fields take their defaults when deserializing.
///
/// ```
/// # use cellcache_storage::prelude::*;
/// #
/// let options = CellCacheOptions::default()
///     .cell_size(64)
///     .max_cache_size(200)
///     .initialize_cells_as_dirty(true);
/// assert_eq!(options.cell_shape_for::<3>().unwrap(), PointN([64; 3]));
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CellCacheOptions {
    /// Either one value used for every dimension, or one value per dimension.
    pub cell_shape: Vec<i64>,
    pub cache: CacheCapacity,
    /// Only write back tiles that have been modified.
    pub dirty_tracking: bool,
    /// Treat tiles produced by the loader as modified, so they reach the disk even if nobody writes to them.
    pub initialize_cells_as_dirty: bool,
    pub num_fetcher_threads: usize,
    pub num_priority_levels: usize,
    /// Where cell files are kept. A fresh temporary directory is used (and deleted afterwards) if unset.
    pub cache_dir: Option<PathBuf>,
    pub temp_dir_prefix: String,
}

impl Default for CellCacheOptions {
    fn default() -> Self {
        Self {
            cell_shape: vec![10],
            cache: CacheCapacity::Bounded(1000),
            dirty_tracking: true,
            initialize_cells_as_dirty: false,
            num_fetcher_threads: default_num_fetcher_threads(),
            num_priority_levels: 1,
            cache_dir: None,
            temp_dir_prefix: "cellcache".to_string(),
        }
    }
}

fn default_num_fetcher_threads() -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    cores.saturating_sub(1).max(1)
}

impl CellCacheOptions {
    pub fn cell_shape(mut self, shape: impl Into<Vec<i64>>) -> Self {
        self.cell_shape = shape.into();
        self
    }

    /// Cubic cells.
    pub fn cell_size(mut self, size: i64) -> Self {
        self.cell_shape = vec![size];
        self
    }

    pub fn cache(mut self, capacity: CacheCapacity) -> Self {
        self.cache = capacity;
        self
    }

    pub fn max_cache_size(self, max_cells: usize) -> Self {
        self.cache(CacheCapacity::Bounded(max_cells))
    }

    pub fn dirty_tracking(mut self, enabled: bool) -> Self {
        self.dirty_tracking = enabled;
        self
    }

    pub fn initialize_cells_as_dirty(mut self, dirty: bool) -> Self {
        self.initialize_cells_as_dirty = dirty;
        self
    }

    pub fn num_fetcher_threads(mut self, n: usize) -> Self {
        self.num_fetcher_threads = n;
        self
    }

    pub fn num_priority_levels(mut self, n: usize) -> Self {
        self.num_priority_levels = n;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn temp_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_dir_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.cache == CacheCapacity::Bounded(0) {
            return Err(CacheError::Config(
                "bounded cache capacity must be positive".into(),
            ));
        }
        if self.num_fetcher_threads == 0 {
            return Err(CacheError::Config(
                "need at least one fetcher thread".into(),
            ));
        }
        if self.num_priority_levels == 0 {
            return Err(CacheError::Config(
                "need at least one priority level".into(),
            ));
        }
        if self.cell_shape.is_empty() {
            return Err(CacheError::Config("cell shape is empty".into()));
        }

        Ok(())
    }

    /// The configured cell shape for an `N`-dimensional dataset.
    pub fn cell_shape_for<const N: usize>(&self) -> CacheResult<PointN<N>> {
        match self.cell_shape.as_slice() {
            [size] => Ok(PointN::fill(*size)),
            shape => PointN::from_slice(shape).ok_or_else(|| {
                CacheError::Grid(GridError::DimensionMismatch {
                    expected: N,
                    actual: shape.len(),
                })
            }),
        }
    }

    pub(crate) fn dirty_tracking_mode(&self) -> DirtyTracking {
        if self.dirty_tracking {
            DirtyTracking::Enabled
        } else {
            DirtyTracking::Disabled
        }
    }

    pub(crate) fn initial_dirty(&self) -> InitialDirty {
        if self.initialize_cells_as_dirty {
            InitialDirty::Dirty
        } else {
            InitialDirty::Clean
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
