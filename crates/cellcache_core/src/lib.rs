//! The core data types for describing a dataset that is partitioned into cells on an N-dimensional integer lattice:
//! - `PointN`: an N-dimensional integer point, most importantly `Point2i` and `Point3i`
//! - `ExtentN`: an N-dimensional box, most importantly `Extent2i` and `Extent3i`
//! - `CellGrid`: maps points and cells to flat `CellId`s and back

pub mod extent;
pub mod grid;
pub mod point;

pub use extent::{Extent2i, Extent3i, ExtentN, ExtentPointIter};
pub use grid::{CellGrid, CellGrid2, CellGrid3, CellId, GridError};
pub use point::{Point2i, Point3i, PointN};

pub use num;

pub mod prelude {
    pub use super::{
        CellGrid, CellGrid2, CellGrid3, CellId, Extent2i, Extent3i, ExtentN, GridError, Point2i,
        Point3i, PointN,
    };
}
