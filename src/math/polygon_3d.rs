use super::base::Base;
use super::polygon_2d::winding_number;
use super::{Point2, Point3, Vector3};

/// Area of a coplanar 3D polygon, measured along `normal`.
#[must_use]
pub fn polygon_area(points: &[Point3], normal: &Vector3) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut cross_sum = Vector3::zeros();
    let o = &points[0];
    for i in 1..n {
        let a = points[i] - o;
        let b = points[(i + 1) % n] - o;
        cross_sum += a.cross(&b);
    }
    0.5 * cross_sum.dot(normal).abs()
}

/// Point-in-polygon test for a 3D point coplanar with the polygon.
///
/// Projects through the polygon's frame and applies the winding rule.
#[must_use]
pub fn point_in_polygon_3d(point: &Point3, polygon: &[Point3], base: &Base) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let pt = base.project(point);
    let uvs: Vec<Point2> = polygon.iter().map(|p| base.project(p)).collect();
    winding_number(&pt, &uvs) != 0
}
