use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

use super::vec2::Vec2;

/// 3D vector in tracking space (Y is up)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Point on the floor (height 0) from a horizontal vector
    #[inline]
    pub fn on_floor(v: Vec2) -> Self {
        Self { x: v.x, y: 0.0, z: v.z }
    }

    /// Drops the vertical component
    #[inline]
    pub fn horizontal(&self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }

    #[inline]
    pub fn with_y(&self, y: f32) -> Self {
        Self { y, ..*self }
    }

    #[inline]
    pub fn dot(&self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.dot(*self).sqrt()
    }

    /// Distance ignoring the vertical axis
    #[inline]
    pub fn horizontal_distance_to(&self, other: Vec3) -> f32 {
        self.horizontal().distance_to(other.horizontal())
    }

    pub fn approx_eq(&self, other: Vec3, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon
            && (self.y - other.y).abs() < epsilon
            && (self.z - other.z).abs() < epsilon
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_drops_height() {
        let v = Vec3::new(1.0, 7.0, -2.0);
        assert_eq!(v.horizontal(), Vec2::new(1.0, -2.0));
        assert_eq!(Vec3::on_floor(v.horizontal()), Vec3::new(1.0, 0.0, -2.0));
    }

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 100.0, 4.0);
        assert!((a.horizontal_distance_to(b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_ops() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(0.5, 0.5, 0.5);
        assert_eq!(a + b, Vec3::new(1.5, 2.5, 3.5));
        assert_eq!(a - b, Vec3::new(0.5, 1.5, 2.5));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vec3::new(-1.0, -2.0, -3.0));
        assert!((a.dot(b) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_is_finite() {
        assert!(Vec3::ZERO.is_finite());
        assert!(!Vec3::new(f32::NAN, 0.0, 0.0).is_finite());
    }
}
