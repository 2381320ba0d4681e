use core::fmt;
use core::marker::PhantomData;
use core::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};
use num::Integer;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An N-dimensional integer point on the lattice, stored as a primitive array.
///
/// ```
/// use cellcache_core::PointN;
///
/// let p2 = PointN([1, 2]); // 2D
/// let p3 = PointN([1, 2, 3]); // 3D
/// ```
///
/// Points support component-wise addition, subtraction, multiplication and division, as well as
/// scalar multiplication and division.
///
/// ```
/// use cellcache_core::PointN;
///
/// let p1 = PointN([1, 2]);
/// let p2 = PointN([3, 4]);
///
/// assert_eq!(p1 + p2, PointN([4, 6]));
/// assert_eq!(p1 - p2, PointN([-2, -2]));
/// assert_eq!(p1 * 2, PointN([2, 4]));
/// assert_eq!(p2 / 2, PointN([1, 2]));
/// ```
///
/// There is also a partial order defined on points which says that a point A is greater than a point B if and only if all of
/// the components of point A are greater than point B. This is how extents check containment:
///
/// ```
/// use cellcache_core::PointN;
///
/// let min = PointN([0, 0, 0]);
/// let least_upper_bound = PointN([3, 3, 3]);
///
/// let p = PointN([0, 1, 2]);
/// assert!(min <= p && p < least_upper_bound);
/// ```
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct PointN<const N: usize>(pub [i64; N]);

/// A 2-dimensional integer point.
pub type Point2i = PointN<2>;
/// A 3-dimensional integer point.
pub type Point3i = PointN<3>;

impl<const N: usize> PointN<N> {
    /// A point of all zeros.
    pub const ZERO: Self = PointN([0; N]);
    /// A point of all ones.
    pub const ONES: Self = PointN([1; N]);

    /// The number of dimensions.
    pub const DIMENSIONS: usize = N;

    #[inline]
    pub fn fill(value: i64) -> Self {
        PointN([value; N])
    }

    /// Builds a point from a slice, returning `None` if the lengths don't match.
    #[inline]
    pub fn from_slice(components: &[i64]) -> Option<Self> {
        if components.len() != N {
            return None;
        }
        let mut p = Self::ZERO;
        p.0.copy_from_slice(components);

        Some(p)
    }

    /// Returns the component for dimension `d`.
    #[inline]
    pub fn at(&self, d: usize) -> i64 {
        self.0[d]
    }

    /// Returns the point after applying `f` component-wise.
    #[inline]
    pub fn map_components(&self, f: impl Fn(i64) -> i64) -> Self {
        let mut out = *self;
        for c in out.0.iter_mut() {
            *c = f(*c);
        }

        out
    }

    /// Returns the point after applying `f` to each pair of components.
    #[inline]
    pub fn zip_components(&self, other: &Self, f: impl Fn(i64, i64) -> i64) -> Self {
        let mut out = *self;
        for (c, o) in out.0.iter_mut().zip(other.0.iter()) {
            *c = f(*c, *o);
        }

        out
    }

    /// Component-wise maximum.
    #[inline]
    pub fn join(&self, other: Self) -> Self {
        self.zip_components(&other, i64::max)
    }

    /// Component-wise minimum.
    #[inline]
    pub fn meet(&self, other: Self) -> Self {
        self.zip_components(&other, i64::min)
    }

    /// Component-wise floored division. Unlike `/`, this rounds towards negative infinity.
    #[inline]
    pub fn div_floor(&self, rhs: Self) -> Self {
        self.zip_components(&rhs, |a, b| Integer::div_floor(&a, &b))
    }

    /// Component-wise division, rounding up.
    #[inline]
    pub fn div_ceil(&self, rhs: Self) -> Self {
        self.zip_components(&rhs, |a, b| Integer::div_ceil(&a, &b))
    }

    /// The product of all components.
    #[inline]
    pub fn volume(&self) -> i64 {
        self.0.iter().product()
    }

    /// Returns `true` iff every component is strictly positive.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.iter().all(|&c| c > 0)
    }
}

impl<const N: usize> Default for PointN<N> {
    #[inline]
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> From<[i64; N]> for PointN<N> {
    #[inline]
    fn from(components: [i64; N]) -> Self {
        PointN(components)
    }
}

impl<const N: usize> Index<usize> for PointN<N> {
    type Output = i64;

    #[inline]
    fn index(&self, d: usize) -> &i64 {
        &self.0[d]
    }
}

impl<const N: usize> IndexMut<usize> for PointN<N> {
    #[inline]
    fn index_mut(&mut self, d: usize) -> &mut i64 {
        &mut self.0[d]
    }
}

impl<const N: usize> PartialOrd for PointN<N> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        use core::cmp::Ordering;

        if self == other {
            Some(Ordering::Equal)
        } else if self.lt(other) {
            Some(Ordering::Less)
        } else if self.gt(other) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    #[inline]
    fn lt(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a < b)
    }

    #[inline]
    fn gt(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a > b)
    }

    #[inline]
    fn le(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b)
    }

    #[inline]
    fn ge(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a >= b)
    }
}

macro_rules! impl_componentwise_op {
    ($trait:ident, $fn:ident, $op:tt) => {
        impl<const N: usize> $trait for PointN<N> {
            type Output = Self;

            #[inline]
            fn $fn(self, rhs: Self) -> Self {
                self.zip_components(&rhs, |a, b| a $op b)
            }
        }

        impl<const N: usize> $trait<i64> for PointN<N> {
            type Output = Self;

            #[inline]
            fn $fn(self, rhs: i64) -> Self {
                self.map_components(|a| a $op rhs)
            }
        }
    };
}

impl_componentwise_op!(Add, add, +);
impl_componentwise_op!(Sub, sub, -);
impl_componentwise_op!(Mul, mul, *);
impl_componentwise_op!(Div, div, /);

impl<const N: usize> Mul<PointN<N>> for i64 {
    type Output = PointN<N>;

    #[inline]
    fn mul(self, rhs: PointN<N>) -> PointN<N> {
        rhs * self
    }
}

impl<const N: usize> Neg for PointN<N> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::ZERO - self
    }
}

impl<const N: usize> AddAssign for PointN<N> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<const N: usize> SubAssign for PointN<N> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

// Serde only implements arrays up to a fixed length, so points are (de)serialized as tuples by hand.

impl<const N: usize> Serialize for PointN<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(N)?;
        for c in self.0.iter() {
            tuple.serialize_element(c)?;
        }
        tuple.end()
    }
}

impl<'de, const N: usize> Deserialize<'de> for PointN<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PointVisitor<const N: usize>(PhantomData<[i64; N]>);

        impl<'de, const N: usize> Visitor<'de> for PointVisitor<N> {
            type Value = PointN<N>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a sequence of {} integers", N)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PointN<N>, A::Error> {
                let mut p = PointN::ZERO;
                for d in 0..N {
                    p.0[d] = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(d, &self))?;
                }

                Ok(p)
            }
        }

        deserializer.deserialize_tuple(N, PointVisitor(PhantomData))
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

    #[test]
    fn partial_order_is_all_components() {
        let a = PointN([0, 5]);
        let b = PointN([1, 6]);
        let c = PointN([1, 4]);

        assert!(a < b);
        assert!(a <= b);
        assert!(!(a < c));
        assert!(!(c < a));
        assert_eq!(a.partial_cmp(&c), None);
    }

    #[test]
    fn div_floor_rounds_toward_negative_infinity() {
        let p = PointN([-1, 15, 16]);
        assert_eq!(p.div_floor(PointN::fill(16)), PointN([-1, 0, 1]));
        assert_eq!(p / 16, PointN([0, 0, 1]));
    }

    #[test]
    fn div_ceil_counts_partial_cells() {
        assert_eq!(PointN([100, 64, 1]).div_ceil(PointN::fill(64)), PointN([2, 1, 1]));
    }

    #[test]
    fn from_slice_checks_length() {
        assert_eq!(Point3i::from_slice(&[1, 2, 3]), Some(PointN([1, 2, 3])));
        assert_eq!(Point3i::from_slice(&[1, 2]), None);
    }
}
