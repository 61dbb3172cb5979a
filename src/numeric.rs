//! Numeric trait aliases used throughout the engines.
//!
//! Grid coordinates and voxel counts are generic over an integer type,
//! physical quantities are generic over a float type. `PhaseId` stays
//! concrete (see [`crate::phase`]) because the phase space is small and
//! fixed.

use num::{Float, FromPrimitive, PrimInt, Signed, ToPrimitive};
use std::fmt::{Debug, Display};
use std::iter::Sum;

/// A thread-safe marker, re-exported for bound clarity at call sites.
pub trait ThreadSafe: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> ThreadSafe for T {}

/// Integer type used for voxel coordinates, grid extents and particle/walker ids.
pub trait Index:
    PrimInt + Signed + FromPrimitive + ToPrimitive + Debug + Display + Sum + ThreadSafe
{
}
impl<T> Index for T where
    T: PrimInt + Signed + FromPrimitive + ToPrimitive + Debug + Display + Sum + ThreadSafe
{
}

/// Floating point type used for physical quantities (radii, moduli, densities, ...).
pub trait Real: Float + FromPrimitive + ToPrimitive + Debug + Display + Sum + ThreadSafe {}
impl<T> Real for T where T: Float + FromPrimitive + ToPrimitive + Debug + Display + Sum + ThreadSafe {}

/// Converts between two [`Real`] types, returning `None` on overflow.
pub fn try_convert<R: Real, T: Real>(value: R) -> Option<T> {
    T::from_f64(value.to_f64()?)
}
