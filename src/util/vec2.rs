use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Vector in the horizontal floor plane (world X and Z axes)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub z: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, z: 0.0 };

    #[inline]
    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.z * self.z
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                z: self.z / len,
            }
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.z * other.z
    }

    /// 2D cross product (scalar, positive when `other` is counter-clockwise from +X to +Z)
    #[inline]
    pub fn cross(&self, other: Vec2) -> f32 {
        self.x * other.z - self.z * other.x
    }

    #[inline]
    pub fn distance_to(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    #[inline]
    pub fn distance_sq_to(&self, other: Vec2) -> f32 {
        (*self - other).length_sq()
    }

    /// Angle in radians from +X towards +Z
    pub fn angle(&self) -> f32 {
        self.z.atan2(self.x)
    }

    /// Signed angle that rotates this vector onto `other`, in (-PI, PI]
    pub fn angle_to(&self, other: Vec2) -> f32 {
        self.cross(other).atan2(self.dot(other))
    }

    pub fn is_zero(&self, epsilon: f32) -> bool {
        self.x.abs() < epsilon && self.z.abs() < epsilon
    }

    pub fn approx_eq(&self, other: Vec2, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon && (self.z - other.z).abs() < epsilon
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            z: self.z * rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            z: -self.z,
        }
    }
}
