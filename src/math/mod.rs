pub mod base;
pub mod polygon_2d;
pub mod polygon_3d;

/// 2D point type.
pub type Point2 = nalgebra::Point2<f64>;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 2D vector type.
pub type Vector2 = nalgebra::Vector2<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Point coincidence tolerance. Also the parametric slack for edge capture:
/// a capture parameter is accepted in `[-TOL, 1 + TOL]`.
pub const TOL: f64 = 1e-5;

/// Congruence threshold for normal and in-plane vector alignment,
/// about 0.0081 degrees.
pub const CONGR_EPS: f64 = 0.99999999;

/// Bitwise identity key for a 3D point.
///
/// Coordinates that were copied verbatim between stores compare equal under
/// this key even where a tolerance-based test would be ambiguous. Negative
/// zero is normalized so `0.0` and `-0.0` agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey([u64; 3]);

impl PointKey {
    #[must_use]
    pub fn new(p: &Point3) -> Self {
        #[inline]
        fn bits(v: f64) -> u64 {
            if v == 0.0 { 0u64 } else { v.to_bits() }
        }
        Self([bits(p.x), bits(p.y), bits(p.z)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_key_exact_identity() {
        let a = Point3::new(0.1 + 0.2, 1.0, -0.0);
        let b = Point3::new(0.1 + 0.2, 1.0, 0.0);
        assert_eq!(PointKey::new(&a), PointKey::new(&b));

        let c = Point3::new(0.3, 1.0, 0.0);
        // 0.1 + 0.2 != 0.3 in binary floating point
        assert_ne!(PointKey::new(&a), PointKey::new(&c));
    }
}
