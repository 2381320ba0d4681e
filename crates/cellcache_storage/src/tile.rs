use cellcache_core::prelude::*;

use bytemuck::Pod;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// Element types that can live in a tile and be dumped to disk as raw bytes.
pub trait Scalar: Pod + Default + Send + Sync {}

impl<T> Scalar for T where T: Pod + Default + Send + Sync {}

/// One cell's worth of elements, the unit of caching and disk storage.
///
/// Elements are stored with dimension 0 varying fastest. The buffer is guarded by a reader-writer lock so a tile can be shared
/// (via `Arc`) between the cache and its consumers. Any mutation through the shared path marks the tile dirty, which tells the
/// write-back layer that the in-memory content has diverged from disk.
///
/// Placeholder tiles handed out by volatile access are *invalid*: they carry no persisted state and are never written back.
#[derive(Debug)]
pub struct Tile<T, const N: usize> {
    id: CellId,
    extent: ExtentN<N>,
    data: RwLock<Vec<T>>,
    dirty: AtomicBool,
    valid: bool,
}

impl<T, const N: usize> Tile<T, N>
where
    T: Scalar,
{
    /// A valid, clean tile with the given contents. `data.len()` must match the number of points in `extent`.
    pub fn new(id: CellId, extent: ExtentN<N>, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            extent.num_points(),
            "buffer length does not match {:?}",
            extent
        );

        Self {
            id,
            extent,
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
            valid: true,
        }
    }

    /// A valid, clean tile filled with `value`.
    pub fn fill(id: CellId, extent: ExtentN<N>, value: T) -> Self {
        Self::new(id, extent, vec![value; extent.num_points()])
    }

    /// A placeholder standing in for a tile that is still being fetched.
    pub fn invalid(id: CellId, extent: ExtentN<N>) -> Self {
        Self {
            valid: false,
            ..Self::fill(id, extent, T::default())
        }
    }

    #[inline]
    pub fn id(&self) -> CellId {
        self.id
    }

    /// The region of the dataset covered by this tile.
    #[inline]
    pub fn extent(&self) -> &ExtentN<N> {
        &self.extent
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.extent.num_points()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn set_dirty_to(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Clears the dirty flag, returning whether it was set.
    #[inline]
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Borrow the elements for reading.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.data.read()
    }

    /// Mutably borrow the elements of an exclusively owned tile. This does not touch the dirty flag, so it's meant for loaders
    /// that fill a tile before it is shared.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        self.data.get_mut().as_mut_slice()
    }

    /// Get the element at `p`, given in dataset coordinates.
    #[inline]
    pub fn get(&self, p: PointN<N>) -> T {
        self.data.read()[self.extent.linear_index(p)]
    }

    /// Set the element at `p`, given in dataset coordinates, and mark the tile dirty.
    #[inline]
    pub fn set(&self, p: PointN<N>, value: T) {
        let i = self.extent.linear_index(p);
        let mut data = self.data.write();
        data[i] = value;
        self.set_dirty();
    }

    /// Mutate the whole buffer under the write lock and mark the tile dirty.
    pub fn modify<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        let mut data = self.data.write();
        let result = f(data.as_mut_slice());
        self.set_dirty();

        result
    }

    /// Copy the contents of an exclusively owned tile out.
    pub fn into_data(self) -> Vec<T> {
        self.data.into_inner()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
