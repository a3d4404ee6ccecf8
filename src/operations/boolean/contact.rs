use tracing::debug;

use crate::error::{BooleanError, Result};
use crate::math::base::Base;
use crate::math::polygon_2d::{cross_2d, point_in_polygon, segments_intersect};
use crate::math::{Point2, Point3, Vector3, TOL};
use crate::mesh::cell_tree::{Aabb, CellTree};
use crate::mesh::locator::PointLocator;
use crate::mesh::{CellId, PointId, PolyMesh};

/// One oriented segment of the contact curve.
#[derive(Debug, Clone)]
pub struct ContactSeg {
    /// Contact-point ids of the two endpoints.
    pub a: usize,
    pub b: usize,
    /// The face on surface A whose intersection produced this segment.
    pub cell_a: CellId,
    /// The face on surface B.
    pub cell_b: CellId,
    /// Per endpoint: the A-vertex the endpoint captured to, if any.
    pub sources_a: [Option<PointId>; 2],
    /// Per endpoint: the B-vertex the endpoint captured to, if any.
    pub sources_b: [Option<PointId>; 2],
    pub deleted: bool,
}

/// The mesh/mesh intersection curve: an undirected open polyline graph
/// whose points belong to neither input surface.
#[derive(Debug, Clone, Default)]
pub struct ContactCurve {
    pub points: Vec<Point3>,
    pub segs: Vec<ContactSeg>,
}

impl ContactCurve {
    /// Live segments.
    pub fn live_segs(&self) -> impl Iterator<Item = (usize, &ContactSeg)> {
        self.segs.iter().enumerate().filter(|(_, s)| !s.deleted)
    }

    /// Indices of live segments incident to a contact point.
    #[must_use]
    pub fn segments_of_point(&self, pt: usize) -> Vec<usize> {
        self.live_segs()
            .filter(|(_, s)| s.a == pt || s.b == pt)
            .map(|(i, _)| i)
            .collect()
    }

    /// True when no live segment remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segs.iter().all(|s| s.deleted)
    }

    /// Drops deleted segments.
    pub fn compact(&mut self) {
        self.segs.retain(|s| !s.deleted);
    }
}

/// A raw segment before endpoint merging.
struct RawSeg {
    ends: [Point3; 2],
    cell_a: CellId,
    cell_b: CellId,
    sources_a: [Option<PointId>; 2],
    sources_b: [Option<PointId>; 2],
}

/// How the surfaces meet where no proper intersection segment exists.
#[derive(Debug, Default)]
struct Touches {
    /// Some face pair meets at an isolated point.
    point: bool,
    /// Some coplanar face pair shares interior (paper contact).
    paper: bool,
}

/// Computes the contact curve between two surfaces.
///
/// Builds a bounding-box tree over B's faces, intersects each face of A
/// with its candidates, and merges coincident endpoints into shared
/// contact points.
///
/// # Errors
///
/// [`BooleanError::NoContact`] when no segment survives,
/// [`BooleanError::LineEndDegree1`] when a contact point has only one
/// neighbour or the surfaces meet at isolated points only (touch without
/// crossing).
pub fn find_contact(a: &PolyMesh, b: &PolyMesh) -> Result<ContactCurve> {
    let tree = CellTree::build(b);

    let mut raw: Vec<RawSeg> = Vec::new();
    let mut touches = Touches::default();

    for (cell_a, _) in a.iter_cells() {
        let poly_a = a.cell_points(cell_a);
        let query = Aabb::from_points(&poly_a);

        for cell_b in tree.candidates(&query) {
            let poly_b = b.cell_points(cell_b);
            intersect_faces(
                &poly_a,
                &poly_b,
                &a.cell(cell_a).verts,
                &b.cell(cell_b).verts,
                cell_a,
                cell_b,
                &mut raw,
                &mut touches,
            );
        }
    }

    debug!(segments = raw.len(), "face/face intersection done");

    let curve = merge_endpoints(raw);

    if curve.segs.is_empty() {
        // point contact leaves an open "curve"; paper contact none at all
        if touches.point && !touches.paper {
            return Err(BooleanError::LineEndDegree1);
        }
        return Err(BooleanError::NoContact);
    }

    let mut degree = vec![0usize; curve.points.len()];
    for (_, seg) in curve.live_segs() {
        degree[seg.a] += 1;
        degree[seg.b] += 1;
    }
    if degree.iter().any(|&d| d == 1) {
        return Err(BooleanError::LineEndDegree1);
    }

    Ok(curve)
}

/// Intersects two polygons and appends the resulting line segments,
/// recording how the faces meet when no segment comes out.
#[allow(clippy::too_many_arguments)]
fn intersect_faces(
    poly_a: &[Point3],
    poly_b: &[Point3],
    verts_a: &[PointId],
    verts_b: &[PointId],
    cell_a: CellId,
    cell_b: CellId,
    raw: &mut Vec<RawSeg>,
    touches: &mut Touches,
) {
    let base_a = Base::new(poly_a);
    let base_b = Base::new(poly_b);

    let dir = base_a.n.cross(&base_b.n);
    let dir_norm = dir.norm();
    if dir_norm < TOL {
        // parallel supporting planes: no transversal line; a coplanar
        // pair sharing interior is paper contact
        if (poly_b[0] - poly_a[0]).dot(&base_a.n).abs() < TOL {
            let a_2d: Vec<Point2> = poly_a.iter().map(|p| base_a.project(p)).collect();
            let b_2d: Vec<Point2> = poly_b.iter().map(|p| base_a.project(p)).collect();
            if coplanar_overlap(&a_2d, &b_2d) {
                touches.paper = true;
            }
        }
        return;
    }
    let dir = dir / dir_norm;

    // a point on both planes
    let ca = base_a.n.dot(&poly_a[0].coords);
    let cb = base_b.n.dot(&poly_b[0].coords);
    let k = base_a.n.dot(&base_b.n);
    let det = 1.0 - k * k;
    let alpha = (ca - cb * k) / det;
    let beta = (cb - ca * k) / det;
    let origin = Point3::from(base_a.n * alpha + base_b.n * beta);

    let clip_a = line_in_polygon(&origin, &dir, poly_a, &base_a);
    let clip_b = line_in_polygon(&origin, &dir, poly_b, &base_b);

    let mut emitted = false;

    for &(a0, a1) in &clip_a.spans {
        for &(b0, b1) in &clip_b.spans {
            let lo = a0.max(b0);
            let hi = a1.min(b1);
            if hi - lo <= TOL {
                continue;
            }

            let p0 = origin + dir * lo;
            let p1 = origin + dir * hi;

            emitted = true;
            raw.push(RawSeg {
                ends: [p0, p1],
                cell_a,
                cell_b,
                sources_a: [
                    capture_source(&p0, poly_a, verts_a),
                    capture_source(&p1, poly_a, verts_a),
                ],
                sources_b: [
                    capture_source(&p0, poly_b, verts_b),
                    capture_source(&p1, poly_b, verts_b),
                ],
            });
        }
    }

    // the closures meeting in a single parameter means the faces only
    // graze each other there
    if !emitted {
        if let (Some((a_lo, a_hi)), Some((b_lo, b_hi))) = (clip_a.closure, clip_b.closure) {
            let lo = a_lo.max(b_lo);
            let hi = a_hi.min(b_hi);
            if hi - lo >= -TOL && hi - lo <= TOL {
                touches.point = true;
            }
        }
    }
}

/// The polygon vertex a contact endpoint captures to, if it lies within
/// the coincidence tolerance of one.
fn capture_source(p: &Point3, poly: &[Point3], verts: &[PointId]) -> Option<PointId> {
    for (q, &id) in poly.iter().zip(verts) {
        if (p - q).norm() < TOL {
            return Some(id);
        }
    }
    None
}

/// The line `origin + s * dir` clipped to a polygon, `s` in arclength
/// units.
struct LineClip {
    /// Intervals lying inside the polygon.
    spans: Vec<(f64, f64)>,
    /// Bounds of all boundary crossings: where the line meets the
    /// polygon's closure.
    closure: Option<(f64, f64)>,
}

fn line_in_polygon(origin: &Point3, dir: &Vector3, poly: &[Point3], base: &Base) -> LineClip {
    let lo_2d = base.project(origin);
    let end_3d = origin + dir;
    let end_2d = base.project(&end_3d);
    let ld = end_2d - lo_2d;

    let uvs: Vec<Point2> = poly.iter().map(|p| base.project(p)).collect();

    let mut crossings: Vec<f64> = Vec::new();
    let n = uvs.len();

    for i in 0..n {
        let e0 = &uvs[i];
        let e1 = &uvs[(i + 1) % n];
        let ed = e1 - e0;

        let denom = cross_2d(ld.x, ld.y, ed.x, ed.y);
        if denom.abs() < 1e-12 {
            continue;
        }

        let dx = e0.x - lo_2d.x;
        let dy = e0.y - lo_2d.y;
        let s = cross_2d(dx, dy, ed.x, ed.y) / denom;
        let u = cross_2d(dx, dy, ld.x, ld.y) / denom;

        let eps = TOL / ed.norm().max(TOL);
        if u >= -eps && u <= 1.0 + eps {
            crossings.push(s);
        }
    }

    crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    crossings.dedup_by(|a, b| (*a - *b).abs() < TOL);

    let closure = crossings
        .first()
        .map(|&lo| (lo, *crossings.last().expect("non-empty")));

    let mut spans: Vec<(f64, f64)> = Vec::new();

    for win in crossings.windows(2) {
        let (s0, s1) = (win[0], win[1]);
        if s1 - s0 <= TOL {
            continue;
        }

        let mid = s0 + (s1 - s0) * 0.5;
        let mid_pt = Point2::new(lo_2d.x + ld.x * mid, lo_2d.y + ld.y * mid);

        if point_in_polygon(&mid_pt, &uvs) {
            match spans.last_mut() {
                Some((_, prev_end)) if (s0 - *prev_end).abs() < TOL => *prev_end = s1,
                _ => spans.push((s0, s1)),
            }
        }
    }

    LineClip { spans, closure }
}

/// True when two coplanar polygons share more than boundary points.
fn coplanar_overlap(a: &[Point2], b: &[Point2]) -> bool {
    if b.iter().any(|p| strictly_inside(p, a)) || a.iter().any(|p| strictly_inside(p, b)) {
        return true;
    }

    let na = a.len();
    let nb = b.len();
    for i in 0..na {
        for j in 0..nb {
            if segments_intersect(&a[i], &a[(i + 1) % na], &b[j], &b[(j + 1) % nb]) {
                return true;
            }
        }
    }

    false
}

/// Point-in-polygon with the boundary excluded: points within `TOL` of an
/// edge do not count.
fn strictly_inside(p: &Point2, poly: &[Point2]) -> bool {
    let n = poly.len();
    for i in 0..n {
        if segment_distance(p, &poly[i], &poly[(i + 1) % n]) < TOL {
            return false;
        }
    }
    point_in_polygon(p, poly)
}

/// Distance from a 2D point to a segment.
fn segment_distance(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let u = b - a;
    let len2 = u.norm_squared();
    if len2 < TOL * TOL {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&u) / len2).clamp(0.0, 1.0);
    let foot = a + u * t;
    (p - foot).norm()
}

/// Merges coincident raw endpoints into shared contact points and drops
/// segments that collapse in the process.
fn merge_endpoints(raw: Vec<RawSeg>) -> ContactCurve {
    let all: Vec<(usize, Point3)> = raw
        .iter()
        .flat_map(|s| s.ends.iter().copied())
        .enumerate()
        .collect();

    let locator = PointLocator::from_points(all.iter().copied());

    let mut merged_of: Vec<Option<usize>> = vec![None; all.len()];
    let mut points: Vec<Point3> = Vec::new();

    for (i, p) in &all {
        if merged_of[*i].is_some() {
            continue;
        }
        let id = points.len();
        points.push(*p);
        for twin in locator.find_points(p) {
            merged_of[twin].get_or_insert(id);
        }
        merged_of[*i] = Some(id);
    }

    let mut curve = ContactCurve {
        points,
        segs: Vec::new(),
    };

    for (i, seg) in raw.into_iter().enumerate() {
        let a = merged_of[2 * i].expect("endpoint merged");
        let b = merged_of[2 * i + 1].expect("endpoint merged");
        if a == b {
            continue;
        }
        curve.segs.push(ContactSeg {
            a,
            b,
            cell_a: seg.cell_a,
            cell_b: seg.cell_b,
            sources_a: seg.sources_a,
            sources_b: seg.sources_b,
            deleted: false,
        });
    }

    curve
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn square_xy(mesh: &mut PolyMesh, z: f64, size: f64) -> CellId {
        let a = mesh.add_point(p(0.0, 0.0, z));
        let b = mesh.add_point(p(size, 0.0, z));
        let c = mesh.add_point(p(size, size, z));
        let d = mesh.add_point(p(0.0, size, z));
        mesh.add_cell(vec![a, b, c, d])
    }

    fn square_xz(mesh: &mut PolyMesh, y: f64, size: f64) -> CellId {
        let a = mesh.add_point(p(0.0, y, -size));
        let b = mesh.add_point(p(size, y, -size));
        let c = mesh.add_point(p(size, y, size));
        let d = mesh.add_point(p(0.0, y, size));
        mesh.add_cell(vec![a, b, c, d])
    }

    #[test]
    fn crossing_squares_give_one_segment() {
        let mut a = PolyMesh::new();
        let ca = square_xy(&mut a, 0.0, 4.0);
        let mut b = PolyMesh::new();
        let cb = square_xz(&mut b, 2.0, 4.0);

        let mut raw = Vec::new();
        intersect_faces(
            &a.cell_points(ca),
            &b.cell_points(cb),
            &a.cell(ca).verts,
            &b.cell(cb).verts,
            ca,
            cb,
            &mut raw,
            &mut Touches::default(),
        );

        assert_eq!(raw.len(), 1);
        let seg = &raw[0];
        // intersection is the line y = 2, z = 0 clipped to x in [0, 4]
        for end in &seg.ends {
            assert!((end.y - 2.0).abs() < TOL);
            assert!(end.z.abs() < TOL);
            assert!(end.x > -TOL && end.x < 4.0 + TOL);
        }
        assert!((seg.ends[0].x - seg.ends[1].x).abs() > 3.9);
    }

    #[test]
    fn parallel_faces_do_not_intersect() {
        let mut a = PolyMesh::new();
        let ca = square_xy(&mut a, 0.0, 4.0);
        let mut b = PolyMesh::new();
        let cb = square_xy(&mut b, 1.0, 4.0);

        let mut raw = Vec::new();
        intersect_faces(
            &a.cell_points(ca),
            &b.cell_points(cb),
            &a.cell(ca).verts,
            &b.cell(cb).verts,
            ca,
            cb,
            &mut raw,
            &mut Touches::default(),
        );
        assert!(raw.is_empty());
    }

    #[test]
    fn endpoint_on_vertex_is_captured() {
        let mut a = PolyMesh::new();
        let ca = square_xy(&mut a, 0.0, 4.0);

        // diamond in the plane y = 2 whose left and right corners lie
        // exactly on A's plane
        let mut b = PolyMesh::new();
        let va = b.add_point(p(1.0, 2.0, 0.0));
        let vb = b.add_point(p(2.0, 2.0, -1.0));
        let vc = b.add_point(p(3.0, 2.0, 0.0));
        let vd = b.add_point(p(2.0, 2.0, 1.0));
        let cb = b.add_cell(vec![va, vb, vc, vd]);

        let mut raw = Vec::new();
        intersect_faces(
            &a.cell_points(ca),
            &b.cell_points(cb),
            &a.cell(ca).verts,
            &b.cell(cb).verts,
            ca,
            cb,
            &mut raw,
            &mut Touches::default(),
        );

        assert_eq!(raw.len(), 1);
        let seg = &raw[0];
        // endpoints are interior to A but coincide with B's corners
        assert!(seg.sources_a.iter().all(Option::is_none));
        let mut captured: Vec<PointId> =
            seg.sources_b.iter().map(|s| s.unwrap()).collect();
        captured.sort();
        let mut expected = vec![va, vc];
        expected.sort();
        assert_eq!(captured, expected);
    }

    #[test]
    fn disjoint_meshes_report_no_contact() {
        let mut a = PolyMesh::new();
        square_xy(&mut a, 0.0, 1.0);
        let mut b = PolyMesh::new();
        let va = b.add_point(p(10.0, 10.0, 9.0));
        let vb = b.add_point(p(11.0, 10.0, 9.0));
        let vc = b.add_point(p(11.0, 10.0, 11.0));
        b.add_cell(vec![va, vb, vc]);

        assert!(matches!(find_contact(&a, &b), Err(BooleanError::NoContact)));
    }

    #[test]
    fn point_touch_reports_degree_one() {
        // the squares meet exactly at the corner (4, 4, 0) and nowhere
        // else: an isolated touch, not a crossing
        let mut a = PolyMesh::new();
        square_xy(&mut a, 0.0, 4.0);

        let mut b = PolyMesh::new();
        let va = b.add_point(p(4.0, 4.0, 0.0));
        let vb = b.add_point(p(4.0, 8.0, 0.0));
        let vc = b.add_point(p(4.0, 8.0, 4.0));
        let vd = b.add_point(p(4.0, 4.0, 4.0));
        b.add_cell(vec![va, vb, vc, vd]);

        assert!(matches!(
            find_contact(&a, &b),
            Err(BooleanError::LineEndDegree1)
        ));
    }

    #[test]
    fn coplanar_overlap_reports_no_contact() {
        // paper contact: the second square lies inside the first, in the
        // same plane
        let mut a = PolyMesh::new();
        square_xy(&mut a, 0.0, 4.0);

        let mut b = PolyMesh::new();
        let va = b.add_point(p(1.0, 1.0, 0.0));
        let vb = b.add_point(p(3.0, 1.0, 0.0));
        let vc = b.add_point(p(3.0, 3.0, 0.0));
        let vd = b.add_point(p(1.0, 3.0, 0.0));
        b.add_cell(vec![va, vb, vc, vd]);

        assert!(matches!(find_contact(&a, &b), Err(BooleanError::NoContact)));
    }

    #[test]
    fn open_crossing_reports_degree_one() {
        // two single squares crossing: the contact segment's endpoints have
        // degree 1, which closed inputs never produce
        let mut a = PolyMesh::new();
        square_xy(&mut a, 0.0, 4.0);
        let mut b = PolyMesh::new();
        square_xz(&mut b, 2.0, 4.0);

        assert!(matches!(
            find_contact(&a, &b),
            Err(BooleanError::LineEndDegree1)
        ));
    }

    #[test]
    fn merge_shares_endpoints_between_segments() {
        let mut a = PolyMesh::new();
        square_xy(&mut a, 0.0, 4.0);
        let ca = a.cell_ids()[0];

        let raw = vec![
            RawSeg {
                ends: [p(0.0, 2.0, 0.0), p(2.0, 2.0, 0.0)],
                cell_a: ca,
                cell_b: ca,
                sources_a: [None, None],
                sources_b: [None, None],
            },
            RawSeg {
                ends: [p(2.0, 2.0, 0.0), p(4.0, 2.0, 0.0)],
                cell_a: ca,
                cell_b: ca,
                sources_a: [None, None],
                sources_b: [None, None],
            },
        ];

        let curve = merge_endpoints(raw);
        assert_eq!(curve.points.len(), 3);
        assert_eq!(curve.segs.len(), 2);
        assert_eq!(curve.segments_of_point(curve.segs[0].b).len(), 2);
    }
}
