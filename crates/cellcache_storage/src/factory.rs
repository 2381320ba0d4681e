use crate::{
    CacheHints, CacheResult, CellCacheOptions, CellLoader, CellView, DiskCellCache, DiskStore,
    FilledCellLoader, InvalidTiles, IoSync, PriorityQueues, ResidentCache, Scalar, Tile,
    TileCacheLoader, TileLoader, VolatileCache,
};

use cellcache_core::prelude::*;

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The resident tier for tiles.
pub type TileCache<T, const N: usize> = ResidentCache<CellId, Arc<Tile<T, N>>>;
/// The non-blocking tier for tiles.
pub type VolatileTileCache<T, const N: usize> = VolatileCache<CellId, Arc<Tile<T, N>>>;

/// A lazily loaded, cell-cached array, assembled from `CellCacheOptions`.
///
/// With a disk tier (`create`), misses go resident cache → disk → loader, and evicted tiles are written back to disk, all
/// funnelled through one `IoSync` so load and write-back of a cell never overlap.
///
/// ```
/// # use cellcache_storage::prelude::*;
/// #
/// let loader = FnCellLoader(|tile: &mut Tile<u8, 2>| -> CacheResult<()> {
///     tile.data_mut().iter_mut().for_each(|x| *x = 1);
///     Ok(())
/// });
/// let options = CellCacheOptions::default().cell_size(16).max_cache_size(8);
/// let array = CachedCellArray::create_with_cell_loader(PointN([100, 100]), loader, &options).unwrap();
///
/// let view = array.view();
/// view.set(PointN([50, 50]), 7).unwrap();
/// assert_eq!(view.get(PointN([50, 50])).unwrap(), 7);
/// assert_eq!(view.get(PointN([0, 99])).unwrap(), 1);
/// ```
pub struct CachedCellArray<T, const N: usize> {
    grid: CellGrid<N>,
    cache: Arc<TileCache<T, N>>,
    cache_dir: Option<PathBuf>,
}

impl<T, const N: usize> CachedCellArray<T, N>
where
    T: Scalar,
{
    /// Disk-backed array: tiles that leave memory are persisted under `options.cache_dir` (or a temporary directory).
    pub fn create(
        dataset_shape: PointN<N>,
        loader: impl TileLoader<T, N> + 'static,
        options: &CellCacheOptions,
    ) -> CacheResult<Self> {
        let grid = Self::grid_for(dataset_shape, options)?;

        Self::create_on_grid(grid, loader, options)
    }

    /// Disk-backed array whose loader fills freshly allocated cells in place.
    pub fn create_with_cell_loader(
        dataset_shape: PointN<N>,
        loader: impl CellLoader<T, N> + 'static,
        options: &CellCacheOptions,
    ) -> CacheResult<Self> {
        let grid = Self::grid_for(dataset_shape, options)?;

        Self::create_on_grid(grid, FilledCellLoader::new(grid, loader), options)
    }

    /// Memory-only array: evicted tiles are dropped and reproduced by the loader when needed again.
    pub fn read_only(
        dataset_shape: PointN<N>,
        loader: impl TileLoader<T, N> + 'static,
        options: &CellCacheOptions,
    ) -> CacheResult<Self> {
        let grid = Self::grid_for(dataset_shape, options)?;
        let cache = ResidentCache::new(options.cache, TileCacheLoader::new(loader));

        Ok(Self {
            grid,
            cache: Arc::new(cache),
            cache_dir: None,
        })
    }

    fn grid_for(dataset_shape: PointN<N>, options: &CellCacheOptions) -> CacheResult<CellGrid<N>> {
        options.validate()?;

        Ok(CellGrid::new(dataset_shape, options.cell_shape_for::<N>()?)?)
    }

    fn create_on_grid(
        grid: CellGrid<N>,
        loader: impl TileLoader<T, N> + 'static,
        options: &CellCacheOptions,
    ) -> CacheResult<Self> {
        let store = match &options.cache_dir {
            Some(dir) => DiskStore::open(dir, grid)?,
            None => DiskStore::temporary(&options.temp_dir_prefix, grid)?,
        };
        let cache_dir = store.root().to_path_buf();
        tracing::debug!("cell files under {}", cache_dir.display());

        let disk = DiskCellCache::new(
            store,
            loader,
            options.dirty_tracking_mode(),
            options.initial_dirty(),
        );
        let io = Arc::new(IoSync::new(disk));
        let cache = TileCache::<T, N>::builder(options.cache)
            .loader(io.clone())
            .remover(io)
            .build()?;

        Ok(Self {
            grid,
            cache: Arc::new(cache),
            cache_dir: Some(cache_dir),
        })
    }

    pub fn grid(&self) -> &CellGrid<N> {
        &self.grid
    }

    pub fn cache(&self) -> &Arc<TileCache<T, N>> {
        &self.cache
    }

    /// The directory holding cell files, if this array has a disk tier.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// A view that blocks on every miss.
    pub fn view(&self) -> CellView<T, N> {
        CellView::blocking(self.grid, self.cache.clone())
    }

    /// A non-blocking tier over this array's cache, fetching on `queues`.
    pub fn volatile_cache(&self, queues: Arc<PriorityQueues>) -> Arc<VolatileTileCache<T, N>> {
        Arc::new(VolatileCache::new(
            self.cache.clone(),
            queues,
            InvalidTiles::new(self.grid),
        ))
    }

    pub fn volatile_view(&self, queues: Arc<PriorityQueues>, hints: CacheHints) -> CellView<T, N> {
        CellView::volatile(self.grid, self.volatile_cache(queues), hints)
    }

    /// Writes every modified resident tile to disk. Nothing is evicted.
    pub fn persist_all(&self) -> CacheResult<()> {
        self.cache.persist_all()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
