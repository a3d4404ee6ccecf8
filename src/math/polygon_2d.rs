use super::{Point2, TOL};

/// Computes the signed area of a 2D polygon (shoelace formula).
///
/// Positive for counter-clockwise, negative for clockwise.
#[must_use]
pub fn signed_area(points: &[Point2]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    sum * 0.5
}

/// 2D cross product `ax * by - ay * bx`.
#[inline]
#[must_use]
pub fn cross_2d(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ax * by - ay * bx
}

/// Winding number of `pt` with respect to the polygon `verts`.
///
/// Non-zero means inside, zero means outside.
#[must_use]
pub fn winding_number(pt: &Point2, verts: &[Point2]) -> i32 {
    let n = verts.len();
    let mut winding = 0i32;

    for i in 0..n {
        let a = &verts[i];
        let b = &verts[(i + 1) % n];

        if a.y <= pt.y {
            if b.y > pt.y && cross_2d(b.x - a.x, b.y - a.y, pt.x - a.x, pt.y - a.y) > 0.0 {
                winding += 1;
            }
        } else if b.y <= pt.y && cross_2d(b.x - a.x, b.y - a.y, pt.x - a.x, pt.y - a.y) < 0.0 {
            winding -= 1;
        }
    }

    winding
}

/// Point-in-polygon test. Boundary points count as inside only as the
/// winding rule happens to see them; callers needing boundary awareness
/// test distances separately.
#[must_use]
pub fn point_in_polygon(pt: &Point2, verts: &[Point2]) -> bool {
    verts.len() >= 3 && winding_number(pt, verts) != 0
}

/// Proper intersection test for segments `a0→a1` and `b0→b1`.
///
/// Endpoint contact within `TOL` does not count as an intersection;
/// collinear overlap of positive length does.
#[must_use]
pub fn segments_intersect(a0: &Point2, a1: &Point2, b0: &Point2, b1: &Point2) -> bool {
    let da = a1 - a0;
    let db = b1 - b0;

    let denom = cross_2d(da.x, da.y, db.x, db.y);

    let d0 = b0 - a0;

    if denom.abs() < TOL * TOL {
        // parallel: check collinear overlap
        if cross_2d(da.x, da.y, d0.x, d0.y).abs() > TOL * da.norm().max(1.0) {
            return false;
        }

        let len2 = da.norm_squared();
        if len2 < TOL * TOL {
            return false;
        }

        let s0 = d0.dot(&da) / len2;
        let s1 = (b1 - a0).dot(&da) / len2;
        let (lo, hi) = if s0 < s1 { (s0, s1) } else { (s1, s0) };

        // overlap interval, excluding shared endpoints
        return hi > TOL && lo < 1.0 - TOL && (hi.min(1.0) - lo.max(0.0)) > TOL;
    }

    let t = cross_2d(d0.x, d0.y, db.x, db.y) / denom;
    let u = cross_2d(d0.x, d0.y, da.x, da.y) / denom;

    let eps_t = TOL / da.norm().max(TOL);
    let eps_u = TOL / db.norm().max(TOL);

    t > eps_t && t < 1.0 - eps_t && u > eps_u && u < 1.0 - eps_u
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point2 {
        Point2::new(x, y)
    }

    fn unit_square() -> Vec<Point2> {
        vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)]
    }

    #[test]
    fn signed_area_ccw() {
        assert!((signed_area(&unit_square()) - 1.0).abs() < TOL);
    }

    #[test]
    fn signed_area_cw() {
        let mut sq = unit_square();
        sq.reverse();
        assert!((signed_area(&sq) + 1.0).abs() < TOL);
    }

    #[test]
    fn winding_inside_outside() {
        let sq = unit_square();
        assert!(point_in_polygon(&p(0.5, 0.5), &sq));
        assert!(!point_in_polygon(&p(1.5, 0.5), &sq));
        assert!(!point_in_polygon(&p(-0.5, 0.5), &sq));
    }

    #[test]
    fn winding_concave() {
        let poly = vec![
            p(0.0, 0.0),
            p(4.0, 0.0),
            p(4.0, 4.0),
            p(2.0, 1.0),
            p(0.0, 4.0),
        ];
        assert!(point_in_polygon(&p(1.0, 1.0), &poly));
        assert!(!point_in_polygon(&p(2.0, 3.0), &poly));
    }

    #[test]
    fn segments_crossing() {
        assert!(segments_intersect(
            &p(0.0, 0.0),
            &p(1.0, 1.0),
            &p(0.0, 1.0),
            &p(1.0, 0.0)
        ));
    }

    #[test]
    fn segments_sharing_endpoint_do_not_cross() {
        assert!(!segments_intersect(
            &p(0.0, 0.0),
            &p(1.0, 0.0),
            &p(1.0, 0.0),
            &p(2.0, 1.0)
        ));
    }

    #[test]
    fn segments_disjoint() {
        assert!(!segments_intersect(
            &p(0.0, 0.0),
            &p(1.0, 0.0),
            &p(0.0, 1.0),
            &p(1.0, 1.0)
        ));
    }

    #[test]
    fn segments_collinear_overlap() {
        assert!(segments_intersect(
            &p(0.0, 0.0),
            &p(2.0, 0.0),
            &p(1.0, 0.0),
            &p(3.0, 0.0)
        ));
    }
}
