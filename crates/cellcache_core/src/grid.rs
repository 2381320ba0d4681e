use crate::{ExtentN, PointN};

use core::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flat index of a cell within a `CellGrid`. Grid coordinates are linearized with dimension 0 varying fastest.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

impl From<u64> for CellId {
    #[inline]
    fn from(index: u64) -> Self {
        CellId(index)
    }
}

/// Invalid grid configurations, rejected when the grid is constructed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GridError {
    #[error("dataset shape must be positive in every dimension, got {0:?}")]
    NonPositiveDatasetShape(Vec<i64>),
    #[error("cell shape must be positive in every dimension, got {0:?}")]
    NonPositiveCellShape(Vec<i64>),
    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("cell shape {0:?} does not fit a 32-bit element count")]
    CellTooLarge(Vec<i64>),
}

/// Partitions an N-dimensional dataset into cells of a fixed shape and maps between points, cells and flat cell indices.
///
/// The grid does not have to divide the dataset evenly; cells on the far boundary of a dimension are clipped to the dataset.
///
/// ```
/// # use cellcache_core::prelude::*;
/// #
/// let grid = CellGrid::new(PointN([100, 64]), PointN([64, 64])).unwrap();
/// let edge = grid.cell_id_containing(PointN([99, 0]));
/// assert_eq!(grid.cell_extent(edge).shape, PointN([36, 64]));
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct CellGrid<const N: usize> {
    dataset_shape: PointN<N>,
    cell_shape: PointN<N>,
    grid_shape: PointN<N>,
}

/// A 2D `CellGrid`.
pub type CellGrid2 = CellGrid<2>;
/// A 3D `CellGrid`.
pub type CellGrid3 = CellGrid<3>;

impl<const N: usize> CellGrid<N> {
    pub fn new(dataset_shape: PointN<N>, cell_shape: PointN<N>) -> Result<Self, GridError> {
        if !dataset_shape.is_positive() {
            return Err(GridError::NonPositiveDatasetShape(dataset_shape.0.to_vec()));
        }
        if !cell_shape.is_positive() {
            return Err(GridError::NonPositiveCellShape(cell_shape.0.to_vec()));
        }
        let clipped_cell = cell_shape.meet(dataset_shape);
        if clipped_cell.volume() > i64::from(i32::MAX) {
            return Err(GridError::CellTooLarge(cell_shape.0.to_vec()));
        }

        Ok(Self {
            dataset_shape,
            cell_shape,
            grid_shape: dataset_shape.div_ceil(cell_shape),
        })
    }

    /// Like `new`, but takes the shapes as slices whose lengths must equal `N`.
    pub fn from_slices(dataset_shape: &[i64], cell_shape: &[i64]) -> Result<Self, GridError> {
        let dataset = PointN::from_slice(dataset_shape).ok_or(GridError::DimensionMismatch {
            expected: N,
            actual: dataset_shape.len(),
        })?;
        let cell = PointN::from_slice(cell_shape).ok_or(GridError::DimensionMismatch {
            expected: N,
            actual: cell_shape.len(),
        })?;

        Self::new(dataset, cell)
    }

    /// The extent of the whole dataset, anchored at the origin.
    #[inline]
    pub fn dataset_extent(&self) -> ExtentN<N> {
        ExtentN::from_min_and_shape(PointN::ZERO, self.dataset_shape)
    }

    #[inline]
    pub fn dataset_shape(&self) -> PointN<N> {
        self.dataset_shape
    }

    /// The nominal shape of a cell. Boundary cells may be smaller.
    #[inline]
    pub fn cell_shape(&self) -> PointN<N> {
        self.cell_shape
    }

    /// The number of cells along each dimension.
    #[inline]
    pub fn grid_shape(&self) -> PointN<N> {
        self.grid_shape
    }

    #[inline]
    pub fn num_cells(&self) -> u64 {
        self.grid_shape.volume() as u64
    }

    /// Returns the grid coordinates of the cell containing `point`.
    #[inline]
    pub fn grid_position_containing(&self, point: PointN<N>) -> PointN<N> {
        assert!(
            self.dataset_extent().contains(point),
            "{:?} is outside of the dataset {:?}",
            point,
            self.dataset_shape
        );

        point / self.cell_shape
    }

    /// Returns the ID of the cell containing `point`. Panics if `point` lies outside of the dataset.
    #[inline]
    pub fn cell_id_containing(&self, point: PointN<N>) -> CellId {
        self.cell_id_at_grid_position(self.grid_position_containing(point))
    }

    /// Linearizes grid coordinates into a `CellId`.
    #[inline]
    pub fn cell_id_at_grid_position(&self, grid_position: PointN<N>) -> CellId {
        assert!(
            ExtentN::from_min_and_shape(PointN::ZERO, self.grid_shape).contains(grid_position),
            "grid position {:?} is outside of the grid {:?}",
            grid_position,
            self.grid_shape
        );

        let mut index = 0;
        let mut stride = 1;
        for d in 0..N {
            index += grid_position.0[d] * stride;
            stride *= self.grid_shape.0[d];
        }

        CellId(index as u64)
    }

    /// The grid coordinates of cell `id`. Panics if `id` is out of range.
    #[inline]
    pub fn grid_position(&self, id: CellId) -> PointN<N> {
        assert!(
            id.0 < self.num_cells(),
            "{} is out of range for a grid of {} cells",
            id,
            self.num_cells()
        );

        let mut remainder = id.0 as i64;
        let mut position = PointN::ZERO;
        for d in 0..N {
            position.0[d] = remainder % self.grid_shape.0[d];
            remainder /= self.grid_shape.0[d];
        }

        position
    }

    /// The minimum point of cell `id` in dataset coordinates.
    #[inline]
    pub fn cell_min(&self, id: CellId) -> PointN<N> {
        self.grid_position(id) * self.cell_shape
    }

    /// The extent covered by cell `id`, clipped to the dataset boundary.
    #[inline]
    pub fn cell_extent(&self, id: CellId) -> ExtentN<N> {
        let minimum = self.cell_min(id);
        let shape = self.cell_shape.meet(self.dataset_shape - minimum);

        ExtentN::from_min_and_shape(minimum, shape)
    }

    /// The number of elements actually stored in cell `id`.
    #[inline]
    pub fn num_elements(&self, id: CellId) -> usize {
        self.cell_extent(id).num_points()
    }

    /// Returns an iterator over the IDs of all cells that overlap `extent`. The query is clipped to the dataset.
    #[inline]
    pub fn cell_ids_overlapping(&self, extent: &ExtentN<N>) -> impl Iterator<Item = CellId> + '_ {
        let clipped = extent.intersection(&self.dataset_extent());
        let grid_extent = if clipped.is_empty() {
            ExtentN::from_min_and_shape(PointN::ZERO, PointN::ZERO)
        } else {
            ExtentN::from_min_and_max(
                clipped.minimum / self.cell_shape,
                clipped.max() / self.cell_shape,
            )
        };

        grid_extent
            .iter_points()
            .map(move |p| self.cell_id_at_grid_position(p))
    }

    /// Iterate over every cell in the grid in flat index order.
    #[inline]
    pub fn cell_ids(&self) -> impl Iterator<Item = CellId> {
        (0..self.num_cells()).map(CellId)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Extent3i, Point3i};

    use rand::{Rng, SeedableRng};

    #[test]
    fn edge_cell_is_clipped_to_dataset() {
        let grid = CellGrid::new(PointN([100]), PointN([64])).unwrap();

        assert_eq!(grid.num_cells(), 2);
        let edge = grid.cell_extent(CellId(1));
        assert_eq!(edge.minimum, PointN([64]));
        assert_eq!(edge.shape, PointN([36]));
        assert_eq!(grid.num_elements(CellId(1)), 36);
        assert_eq!(grid.num_elements(CellId(0)), 64);
    }

    #[test]
    fn flat_index_and_grid_position_are_inverses() {
        let grid = CellGrid::new(PointN([640, 300, 17]), PointN([64, 64, 5])).unwrap();
        assert_eq!(grid.grid_shape(), PointN([10, 5, 4]));

        for id in grid.cell_ids() {
            assert_eq!(grid.cell_id_at_grid_position(grid.grid_position(id)), id);
        }
        for p in ExtentN::from_min_and_shape(PointN::ZERO, grid.grid_shape()).iter_points() {
            assert_eq!(grid.grid_position(grid.cell_id_at_grid_position(p)), p);
        }
    }

    #[test]
    fn dimension_zero_varies_fastest() {
        let grid = CellGrid::new(PointN([30, 30]), PointN([10, 10])).unwrap();

        assert_eq!(grid.cell_id_at_grid_position(PointN([1, 0])), CellId(1));
        assert_eq!(grid.cell_id_at_grid_position(PointN([0, 1])), CellId(3));
    }

    #[test]
    fn cell_bounds_contain_random_points() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let dataset = Point3i::from([
                rng.gen_range(1..300),
                rng.gen_range(1..300),
                rng.gen_range(1..300),
            ]);
            let cell = Point3i::from([
                rng.gen_range(1..80),
                rng.gen_range(1..80),
                rng.gen_range(1..80),
            ]);
            let grid = CellGrid::new(dataset, cell).unwrap();

            for _ in 0..50 {
                let p = PointN([
                    rng.gen_range(0..dataset.0[0]),
                    rng.gen_range(0..dataset.0[1]),
                    rng.gen_range(0..dataset.0[2]),
                ]);
                let id = grid.cell_id_containing(p);
                let extent = grid.cell_extent(id);
                assert!(extent.contains(p), "{:?} not in {:?}", p, extent);
                assert!(extent.is_subset_of(&grid.dataset_extent()));
            }
        }
    }

    #[test]
    fn cells_overlapping_extent_are_clipped_to_dataset() {
        let grid = CellGrid::new(PointN([100, 100, 100]), PointN([16, 16, 16])).unwrap();
        let query = Extent3i::from_min_and_shape(PointN([15, 15, 90]), PointN([2, 2, 50]));

        let ids: Vec<_> = grid.cell_ids_overlapping(&query).collect();
        let positions: Vec<_> = ids.iter().map(|&id| grid.grid_position(id)).collect();

        assert_eq!(
            positions,
            vec![
                PointN([0, 0, 5]),
                PointN([1, 0, 5]),
                PointN([0, 1, 5]),
                PointN([1, 1, 5]),
                PointN([0, 0, 6]),
                PointN([1, 0, 6]),
                PointN([0, 1, 6]),
                PointN([1, 1, 6]),
            ]
        );

        let outside = Extent3i::from_min_and_shape(PointN([200, 0, 0]), PointN([5, 5, 5]));
        assert_eq!(grid.cell_ids_overlapping(&outside).count(), 0);
    }

    #[test]
    fn rejects_non_positive_shapes() {
        assert_eq!(
            CellGrid::new(PointN([10, 0]), PointN([4, 4])),
            Err(GridError::NonPositiveDatasetShape(vec![10, 0]))
        );
        assert_eq!(
            CellGrid::new(PointN([10, 10]), PointN([4, -1])),
            Err(GridError::NonPositiveCellShape(vec![4, -1]))
        );
        assert_eq!(
            CellGrid::<3>::from_slices(&[10, 10, 10], &[4, 4]),
            Err(GridError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    #[should_panic]
    fn out_of_range_cell_id_panics() {
        let grid = CellGrid::new(PointN([10, 10]), PointN([5, 5])).unwrap();
        grid.cell_extent(CellId(4));
    }
}
