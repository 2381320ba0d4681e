//! The disk tier: one raw file per cell, plus the composite loader/remover that sits between the resident cache and the
//! application's `TileLoader`.
//!
//! Files hold the tile elements as native-endian raw bytes, dimension 0 varying fastest. A cell at grid position
//! `(g0, g1, ..., gn)` lives at `root/g0/g1/.../gn`.

use crate::{CacheError, CacheLoader, CacheRemover, CacheResult, Scalar, Tile, TileLoader};

use cellcache_core::prelude::*;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Maps cells to files under a root directory and moves tiles in and out of them.
pub struct DiskStore<T, const N: usize> {
    root: PathBuf,
    grid: CellGrid<N>,
    // Kept alive so a temporary root is deleted with the store.
    _temp: Option<TempDir>,
    marker: PhantomData<fn() -> T>,
}

impl<T, const N: usize> DiskStore<T, N>
where
    T: Scalar,
{
    /// Use (and create, if necessary) `root` as the directory for cell files. Existing files are treated as previously
    /// written cells.
    pub fn open(root: impl Into<PathBuf>, grid: CellGrid<N>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            grid,
            _temp: None,
            marker: PhantomData,
        })
    }

    /// Create a fresh temporary directory whose name starts with `prefix`. It is deleted when the store is dropped.
    pub fn temporary(prefix: &str, grid: CellGrid<N>) -> CacheResult<Self> {
        let temp = tempfile::Builder::new().prefix(prefix).tempdir()?;

        Ok(Self {
            root: temp.path().to_path_buf(),
            grid,
            _temp: Some(temp),
            marker: PhantomData,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn grid(&self) -> &CellGrid<N> {
        &self.grid
    }

    /// The file backing cell `id`.
    pub fn path_for(&self, id: CellId) -> PathBuf {
        let position = self.grid.grid_position(id);
        let mut path = self.root.clone();
        for d in 0..N {
            path.push(position.at(d).to_string());
        }

        path
    }

    /// Returns `true` iff a file has been written for cell `id`.
    pub fn contains(&self, id: CellId) -> bool {
        self.path_for(id).is_file()
    }

    fn expected_bytes(&self, id: CellId) -> usize {
        self.grid.num_elements(id) * std::mem::size_of::<T>()
    }

    /// Read the tile for `id`, or `None` if it has never been written.
    pub fn read(&self, id: CellId) -> CacheResult<Option<Tile<T, N>>> {
        let bytes = match fs::read(self.path_for(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let expected = self.expected_bytes(id);
        if bytes.len() != expected {
            return Err(CacheError::TileSize {
                cell: id,
                expected,
                actual: bytes.len(),
            });
        }

        let extent = self.grid.cell_extent(id);
        let mut data = vec![T::default(); extent.num_points()];
        bytemuck::cast_slice_mut::<T, u8>(&mut data).copy_from_slice(&bytes);

        Ok(Some(Tile::new(id, extent, data)))
    }

    /// Write the tile's current contents. The bytes go to a sibling file first and are then renamed into place, so a reader
    /// never observes a partially written cell.
    pub fn write(&self, tile: &Tile<T, N>) -> CacheResult<()> {
        let expected = self.expected_bytes(tile.id());
        let actual = tile.num_elements() * std::mem::size_of::<T>();
        if actual != expected {
            return Err(CacheError::TileSize {
                cell: tile.id(),
                expected,
                actual,
            });
        }

        let path = self.path_for(tile.id());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = path.with_extension("partial");
        {
            let data = tile.read();
            fs::write(&staging, bytemuck::cast_slice::<T, u8>(&data))?;
        }
        fs::rename(&staging, &path)?;

        Ok(())
    }
}

/// Whether write-back skips tiles that were never modified.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DirtyTracking {
    /// Only dirty tiles are written.
    Enabled,
    /// Every valid tile is written when it leaves the cache.
    Disabled,
}

/// The dirty flag given to tiles that come from the backing loader rather than from disk. `Dirty` makes sure generated content
/// reaches the disk even if nobody modifies it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum InitialDirty {
    Clean,
    Dirty,
}

/// Disk first, backing loader second; and on the way out, write-back to disk.
pub struct DiskCellCache<T, L, const N: usize> {
    store: DiskStore<T, N>,
    backing: L,
    dirty_tracking: DirtyTracking,
    initial_dirty: InitialDirty,
}

impl<T, L, const N: usize> DiskCellCache<T, L, N>
where
    T: Scalar,
    L: TileLoader<T, N>,
{
    pub fn new(
        store: DiskStore<T, N>,
        backing: L,
        dirty_tracking: DirtyTracking,
        initial_dirty: InitialDirty,
    ) -> Self {
        Self {
            store,
            backing,
            dirty_tracking,
            initial_dirty,
        }
    }

    pub fn store(&self) -> &DiskStore<T, N> {
        &self.store
    }

    pub fn dirty_tracking(&self) -> DirtyTracking {
        self.dirty_tracking
    }

    fn produce_from_backing(&self, id: CellId) -> CacheResult<Tile<T, N>> {
        let tile = self.backing.produce(id)?;

        let expected = self.store.expected_bytes(id);
        let actual = tile.num_elements() * std::mem::size_of::<T>();
        if tile.id() != id || actual != expected {
            return Err(CacheError::TileSize {
                cell: id,
                expected,
                actual,
            });
        }
        tile.set_dirty_to(self.initial_dirty == InitialDirty::Dirty);

        Ok(tile)
    }
}

impl<T, L, const N: usize> CacheLoader<CellId, Arc<Tile<T, N>>> for DiskCellCache<T, L, N>
where
    T: Scalar,
    L: TileLoader<T, N>,
{
    fn load(&self, key: &CellId) -> CacheResult<Arc<Tile<T, N>>> {
        if let Some(tile) = self.store.read(*key)? {
            tracing::debug!("{} read from disk", key);
            return Ok(Arc::new(tile));
        }

        tracing::debug!("{} produced by backing loader", key);

        self.produce_from_backing(*key).map(Arc::new)
    }
}

impl<T, L, const N: usize> CacheRemover<CellId, Arc<Tile<T, N>>> for DiskCellCache<T, L, N>
where
    T: Scalar,
    L: TileLoader<T, N>,
{
    fn on_removal(&self, key: &CellId, tile: &Arc<Tile<T, N>>) -> CacheResult<()> {
        if !tile.is_valid() {
            return Ok(());
        }

        match self.dirty_tracking {
            DirtyTracking::Enabled => {
                if !tile.take_dirty() {
                    return Ok(());
                }
                if let Err(e) = self.store.write(tile) {
                    tile.set_dirty();
                    return Err(e);
                }
            }
            DirtyTracking::Disabled => self.store.write(tile)?,
        }
        tracing::debug!("{} written back", key);

        Ok(())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
