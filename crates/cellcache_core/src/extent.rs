use crate::PointN;

use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

/// A 2-dimensional integer extent.
pub type Extent2i = ExtentN<2>;
/// A 3-dimensional integer extent.
pub type Extent3i = ExtentN<3>;

/// An N-dimensional extent. This is mathematically the Cartesian product of a half-closed interval `[a, b)` in each dimension.
/// You can also just think of it as an axis-aligned box with some shape and a minimum point. Cells, datasets and region
/// queries are all described by extents.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ExtentN<const N: usize> {
    /// The least point contained in the extent.
    pub minimum: PointN<N>,
    /// The length of each dimension.
    pub shape: PointN<N>,
}

impl<const N: usize> ExtentN<N> {
    /// The default representation of an extent as the minimum point and shape.
    #[inline]
    pub fn from_min_and_shape(minimum: PointN<N>, shape: PointN<N>) -> Self {
        Self { minimum, shape }
    }

    /// An alternative representation of an extent as the minimum point and least upper bound.
    #[inline]
    pub fn from_min_and_lub(minimum: PointN<N>, least_upper_bound: PointN<N>) -> Self {
        // We want to avoid negative shape components.
        let shape = (least_upper_bound - minimum).join(PointN::ZERO);

        Self { minimum, shape }
    }

    /// An alternative representation of an extent as the minimum point and maximum point.
    #[inline]
    pub fn from_min_and_max(minimum: PointN<N>, max: PointN<N>) -> Self {
        Self::from_min_and_lub(minimum, max + PointN::ONES)
    }

    /// The least point `p` for which all points `q` in the extent satisfy `q < p`.
    #[inline]
    pub fn least_upper_bound(&self) -> PointN<N> {
        self.minimum + self.shape
    }

    /// The unique greatest point in the extent.
    #[inline]
    pub fn max(&self) -> PointN<N> {
        self.least_upper_bound() - PointN::ONES
    }

    /// Returns `true` iff the point `p` is contained in this extent.
    #[inline]
    pub fn contains(&self, p: PointN<N>) -> bool {
        self.minimum <= p && p < self.least_upper_bound()
    }

    /// The number of points contained in the extent.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.shape.volume() as usize
    }

    /// Returns `true` iff the number of points in the extent is 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_points() == 0
    }

    /// Returns the extent containing only the points in both `self` and `other`.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        let minimum = self.minimum.join(other.minimum);
        let lub = self.least_upper_bound().meet(other.least_upper_bound());

        Self::from_min_and_lub(minimum, lub)
    }

    /// Returns `true` iff the intersection of `self` and `other` is equal to `self`.
    #[inline]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.intersection(other).eq(self)
    }

    /// The linear offset of `p` within this extent, where dimension 0 varies fastest. `p` must be contained in the extent.
    #[inline]
    pub fn linear_index(&self, p: PointN<N>) -> usize {
        debug_assert!(self.contains(p), "{:?} is not in {:?}", p, self);

        let local = p - self.minimum;
        let mut index = 0;
        let mut stride = 1;
        for d in 0..N {
            index += local.0[d] * stride;
            stride *= self.shape.0[d];
        }

        index as usize
    }

    /// Iterate over all points in the extent, where dimension 0 varies fastest.
    /// ```
    /// # use cellcache_core::prelude::*;
    /// #
    /// let extent = Extent3i::from_min_and_shape(PointN([0, 0, 0]), PointN([2, 2, 1]));
    /// let points = extent.iter_points().collect::<Vec<_>>();
    /// assert_eq!(points, vec![
    ///     PointN([0, 0, 0]), PointN([1, 0, 0]), PointN([0, 1, 0]), PointN([1, 1, 0])
    /// ]);
    /// ```
    #[inline]
    pub fn iter_points(&self) -> ExtentPointIter<N> {
        ExtentPointIter {
            next: if self.is_empty() {
                None
            } else {
                Some(self.minimum)
            },
            minimum: self.minimum,
            lub: self.least_upper_bound(),
        }
    }
}

impl<const N: usize> Add<PointN<N>> for ExtentN<N> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: PointN<N>) -> Self::Output {
        ExtentN {
            minimum: self.minimum + rhs,
            shape: self.shape,
        }
    }
}

impl<const N: usize> Sub<PointN<N>> for ExtentN<N> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: PointN<N>) -> Self::Output {
        ExtentN {
            minimum: self.minimum - rhs,
            shape: self.shape,
        }
    }
}

/// Odometer over the points of an extent.
#[derive(Clone, Debug)]
pub struct ExtentPointIter<const N: usize> {
    next: Option<PointN<N>>,
    minimum: PointN<N>,
    lub: PointN<N>,
}

impl<const N: usize> Iterator for ExtentPointIter<N> {
    type Item = PointN<N>;

    #[inline]
    fn next(&mut self) -> Option<PointN<N>> {
        let current = self.next?;

        let mut advanced = current;
        let mut d = 0;
        self.next = loop {
            if d == N {
                break None;
            }
            advanced.0[d] += 1;
            if advanced.0[d] < self.lub.0[d] {
                break Some(advanced);
            }
            advanced.0[d] = self.minimum.0[d];
            d += 1;
        };

        Some(current)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
