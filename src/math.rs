
//! Simple math utilities.

use crate::error::i32_to_usize;
use crate::error::Result;
use std::convert::TryFrom;
use std::ops::{Add, Div, Mul, Sub};

/// Simple two-dimensional vector of any numerical type.
/// Supports only few mathematical operations, as this is mainly used as a data struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T>(pub T, pub T);

impl<T> Vec2<T> {

    /// Seeing this vector as a dimension or size (width and height),
    /// this returns the area that these dimensions contain (`width * height`).
    #[inline]
    pub fn area(self) -> T where T: Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The first component of this 2D vector.
    #[inline]
    pub fn x(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline]
    pub fn y(self) -> T { self.1 }

    /// The first component of this 2D vector.
    #[inline]
    pub fn width(self) -> T { self.0 }

    /// The second component of this 2D vector.
    #[inline]
    pub fn height(self) -> T { self.1 }
}

impl Vec2<i32> {

    /// Try to convert to [`Vec2<usize>`], returning an error on negative numbers.
    pub fn to_usize(self, error_message: &'static str) -> Result<Vec2<usize>> {
        let x = i32_to_usize(self.0, error_message)?;
        let y = i32_to_usize(self.1, error_message)?;
        Ok(Vec2(x, y))
    }
}

impl Vec2<usize> {

    /// Convert to [`Vec2<i32>`]. Panics for values that do not fit into an `i32`.
    pub fn to_i32(self) -> Vec2<i32> {
        let x = i32::try_from(self.0).expect("vector x coordinate too large");
        let y = i32::try_from(self.1).expect("vector y coordinate too large");
        Vec2(x, y)
    }
}

impl<T: Add<T>> Add<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn add(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 + other.0, self.1 + other.1)
    }
}

impl<T: Sub<T>> Sub<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn sub(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 - other.0, self.1 - other.1)
    }
}

impl<T: Div<T>> Div<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn div(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 / other.0, self.1 / other.1)
    }
}

impl<T: Mul<T>> Mul<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn mul(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 * other.0, self.1 * other.1)
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(vec2: Vec2<T>) -> Self { (vec2.0, vec2.1) }
}

/// Computes `floor(log(x)/log(2))`. Returns 0 where argument is 0.
pub(crate) fn floor_log_2(mut number: usize) -> usize {
    let mut log = 0;

    while number > 1 {
        log += 1;
        number >>= 1;
    }

    log
}

/// Integer division that rounds up instead of down.
/// Only works for positive numbers.
pub(crate) fn ceil_div(dividend: usize, divisor: usize) -> usize {
    debug_assert_ne!(divisor, 0, "division by zero");
    (dividend + divisor - 1) / divisor
}
