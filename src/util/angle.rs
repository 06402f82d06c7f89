//! Angle and ring-index helpers

use std::f32::consts::PI;

/// Wraps `angle` into `[min, max)`
pub fn reduce_angle(mut angle: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if !angle.is_finite() || span <= 0.0 {
        return angle;
    }
    while angle >= max {
        angle -= span;
    }
    while angle < min {
        angle += span;
    }
    angle
}

/// Wraps `angle` into `[-PI, PI)`
#[inline]
pub fn wrap_pi(angle: f32) -> f32 {
    reduce_angle(angle, -PI, PI)
}

/// Steps an index around a ring of `modulus` entries
#[inline]
pub fn circular_index(idx: usize, increment: bool, modulus: usize) -> usize {
    if increment {
        (idx + 1) % modulus
    } else if idx == 0 {
        modulus - 1
    } else {
        idx - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    #[test]
    fn test_reduce_angle() {
        assert!((reduce_angle(3.0 * PI + 0.5, -PI, PI) - (-PI + 0.5)).abs() < 1e-5);
        assert!((reduce_angle(-3.0 * PI - 0.5, -PI, PI) - (PI - 0.5)).abs() < 1e-5);
        assert!((reduce_angle(-TAU - 0.5, 0.0, TAU) - (TAU - 0.5)).abs() < 1e-5);
        assert!((reduce_angle(0.25, -PI, PI) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_reduce_angle_nan_passthrough() {
        assert!(reduce_angle(f32::NAN, -PI, PI).is_nan());
    }

    #[test]
    fn test_circular_index() {
        assert_eq!(circular_index(3, true, 4), 0);
        assert_eq!(circular_index(0, false, 4), 3);
        assert_eq!(circular_index(2, false, 4), 1);
        assert_eq!(circular_index(1, true, 4), 2);
    }
}
