use super::{Point2, Point3, Vector3, TOL};

/// Orthonormal projection frame of a planar polygon.
///
/// Parametric form: `P(u, v) = origin + u * u_dir + v * v_dir`, with
/// `n = u_dir × v_dir` the polygon normal.
#[derive(Debug, Clone)]
pub struct Base {
    pub origin: Point3,
    pub u_dir: Vector3,
    pub v_dir: Vector3,
    pub n: Vector3,
}

impl Base {
    /// Builds the frame from a polygon's vertex coordinates.
    ///
    /// The normal comes from the Newell sum over the boundary; the in-plane
    /// axes are chosen from a reference axis not parallel to the normal.
    #[must_use]
    pub fn new(points: &[Point3]) -> Self {
        let n = newell_normal(points);

        let reference = if n.x.abs() < 0.9 {
            Vector3::new(1.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };

        let u_dir = n.cross(&reference).normalize();
        let v_dir = n.cross(&u_dir);

        Self {
            origin: points[0],
            u_dir,
            v_dir,
            n,
        }
    }

    /// Projects a 3D point into the frame's (u, v) coordinates.
    #[must_use]
    pub fn project(&self, p: &Point3) -> Point2 {
        let d = p - self.origin;
        Point2::new(d.dot(&self.u_dir), d.dot(&self.v_dir))
    }
}

/// Unit normal of a closed 3D polygon by the Newell sum.
///
/// Robust against collinear runs and slight non-planarity; returns the
/// zero vector for degenerate input.
#[must_use]
pub fn newell_normal(points: &[Point3]) -> Vector3 {
    let mut n = Vector3::zeros();
    let len = points.len();

    for i in 0..len {
        let a = &points[i];
        let b = &points[(i + 1) % len];

        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }

    let norm = n.norm();
    if norm > TOL * TOL {
        n / norm
    } else {
        n
    }
}

/// Full angle from `a` to `b` about the axis `axis`, in `[0, 2π)`.
#[must_use]
pub fn angle_about(a: &Vector3, b: &Vector3, axis: &Vector3) -> f64 {
    let det = axis.dot(&a.cross(b));
    let ang = det.atan2(a.dot(b));

    if ang < 0.0 {
        ang + 2.0 * std::f64::consts::PI
    } else {
        ang
    }
}
