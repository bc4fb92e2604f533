//! 2D vector primitive with zero snapping
//!
//! Every constructor and operator funnels through [`Vector::from`], which
//! snaps magnitudes below [`GEOMETRY_EPSILON`] to exact zero. The sweep
//! compares angles for equality; unsnapped noise such as `1e-17` would turn
//! `atan2` of a "zero" vector into an arbitrary direction.

use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::{GEOMETRY_EPSILON, PARALLEL_EPSILON};

/// A 2D point or displacement
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "DVec2", into = "DVec2")]
pub struct Vector(DVec2);

impl From<DVec2> for Vector {
    #[inline]
    fn from(v: DVec2) -> Self {
        if !v.is_finite() || v.length_squared() < GEOMETRY_EPSILON * GEOMETRY_EPSILON {
            Self(DVec2::ZERO)
        } else {
            Self(v)
        }
    }
}

impl From<Vector> for DVec2 {
    #[inline]
    fn from(v: Vector) -> Self {
        v.0
    }
}

impl Vector {
    pub const ZERO: Self = Self(DVec2::ZERO);
    pub const X: Self = Self(DVec2::X);
    pub const Y: Self = Self(DVec2::Y);

    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        DVec2::new(x, y).into()
    }

    /// Build from polar form. A negative radius flips the direction.
    #[inline]
    pub fn from_polar(r: f64, theta: f64) -> Self {
        DVec2::new(r * theta.cos(), r * theta.sin()).into()
    }

    #[inline]
    pub fn x(self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn y(self) -> f64 {
        self.0.y
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == DVec2::ZERO
    }

    #[inline]
    pub fn length(self) -> f64 {
        self.0.length()
    }

    #[inline]
    pub fn length_squared(self) -> f64 {
        self.0.length_squared()
    }

    /// Direction angle in (-π, π]; zero vector reports 0
    #[inline]
    pub fn angle(self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        crate::normalize_angle(self.0.y.atan2(self.0.x))
    }

    /// (r, theta) with theta in (-π, π]
    #[inline]
    pub fn to_polar(self) -> (f64, f64) {
        (self.length(), self.angle())
    }

    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Inner product
    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.0.dot(other.0)
    }

    /// z component of the 3D cross product
    #[inline]
    pub fn cross(self, other: Self) -> f64 {
        self.0.perp_dot(other.0)
    }

    /// Signed length of the projection onto `other` (0 when `other` is zero)
    pub fn scalar_project(self, other: Self) -> f64 {
        let len = other.length();
        if len == 0.0 { 0.0 } else { self.dot(other) / len }
    }

    /// Projection onto `other` (zero when `other` is zero)
    pub fn vector_project(self, other: Self) -> Self {
        let len2 = other.length_squared();
        if len2 == 0.0 {
            Self::ZERO
        } else {
            other * (self.dot(other) / len2)
        }
    }

    /// Normal rotated 90° counter-clockwise
    #[inline]
    pub fn normal(self) -> Self {
        Self(self.0.perp())
    }

    /// Parallel (or anti-parallel) within [`PARALLEL_EPSILON`]; zero is parallel to anything
    pub fn is_parallel(self, other: Self) -> bool {
        let scale = self.length() * other.length();
        scale == 0.0 || self.cross(other).abs() <= PARALLEL_EPSILON * scale
    }

    /// Linear interpolation: `t = 0` is self, `t = 1` is other
    #[inline]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        self.0.lerp(other.0, t).into()
    }

    /// Rotate counter-clockwise by `angle` radians
    #[inline]
    pub fn rotate(self, angle: f64) -> Self {
        DVec2::from_angle(angle).rotate(self.0).into()
    }

    #[inline]
    pub fn normalize_or_zero(self) -> Self {
        self.0.normalize_or_zero().into()
    }

    /// Coincident within [`GEOMETRY_EPSILON`]
    #[inline]
    pub fn same(self, other: Self) -> bool {
        (self - other).is_zero()
    }

    /// Coincident within an explicit tolerance
    #[inline]
    pub fn near(self, other: Self, tolerance: f64) -> bool {
        self.0.distance_squared(other.0) <= tolerance * tolerance
    }

    /// Component-wise clamp (used for rectangle closest points)
    #[inline]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        self.0.clamp(min.0, max.0).into()
    }
}

impl Add for Vector {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        (self.0 + rhs.0).into()
    }
}

impl Sub for Vector {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        (self.0 - rhs.0).into()
    }
}

impl Mul<f64> for Vector {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: f64) -> Self {
        (self.0 * rhs).into()
    }
}

impl Mul<Vector> for f64 {
    type Output = Vector;
    #[inline]
    fn mul(self, rhs: Vector) -> Vector {
        rhs * self
    }
}

impl Div<f64> for Vector {
    type Output = Self;
    #[inline]
    fn div(self, rhs: f64) -> Self {
        (self.0 / rhs).into()
    }
}

impl Neg for Vector {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl AddAssign for Vector {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vector {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign<f64> for Vector {
    #[inline]
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}
