use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::debug;

use crate::error::{BooleanError, Result};
use crate::math::base::Base;
use crate::math::polygon_2d::segments_intersect;
use crate::math::{Point2, Point3, PointKey, Vector3, TOL};
use crate::mesh::{CellId, PointId, PolyMesh};

use super::contact::ContactCurve;

/// How a strip point attaches to its face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capt {
    /// Strictly interior to the face.
    Not,
    /// On the interior of an edge.
    Edge,
    /// Snapped onto the first endpoint of the containing edge.
    A,
    /// Snapped onto the second endpoint; normalized to `A` on the next
    /// edge before strips are assembled.
    B,
    /// Interior, but with more than two contact segments meeting here on
    /// this face.
    Branched,
}

impl Capt {
    /// True for points attached to the face boundary.
    #[must_use]
    pub fn is_boundary(self) -> bool {
        matches!(self, Capt::Edge | Capt::A | Capt::B)
    }
}

/// Endpoint role of a strip reference within its strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Start,
    End,
    None,
}

/// A contact point as seen from one face.
#[derive(Debug, Clone)]
pub struct StripPt {
    /// Id in the contact curve.
    pub ind: usize,
    /// Contact coordinate.
    pub pt: Point3,
    /// Coordinate used for cutting: the snapped coordinate for boundary
    /// points, `pt` otherwise.
    pub cut_pt: Point3,
    /// The snapped coordinate, meaningful when `capt` is a boundary kind.
    pub capt_pt: Point3,
    pub capt: Capt,
    /// The directed face edge `a -> b` the point lies on, if any.
    pub edge: Option<[PointId; 2]>,
    /// Parametric position on `edge`.
    pub t: f64,
    /// The owning face.
    pub poly_id: CellId,
    /// False when a source-constrained point failed to locate its edge;
    /// cross-face recovery promotes it back to true.
    pub catched: bool,
}

/// The twin descendant points a cut allocates for one strip vertex, one
/// per side of the cut.
///
/// Both twins start at the cut coordinate; the stages after CutCells may
/// pull the two sides apart. Which twin a reference names is part of the
/// cutter's contract, so the sides are tagged by field instead of by
/// position.
#[derive(Debug, Clone, Copy, Default)]
pub struct Twins {
    /// The copy walked on the outgoing side of the cut.
    pub left: PointId,
    /// The copy walked on the returning side.
    pub right: PointId,
}

/// A reference to a [`StripPt`] from within an assembled strip.
#[derive(Debug, Clone, Copy)]
pub struct StripPtR {
    pub ind: usize,
    /// Id of the owning strip.
    pub strip: usize,
    pub side: Side,
    /// The last unshifted boundary vertex walking the face ring from this
    /// endpoint; CutCells uses it to glue sub-polygons.
    pub ref_pt: Option<PointId>,
    /// The descendant twins injected by CutCells. Valid only after
    /// CutCells' init pass.
    pub desc: Twins,
}

impl StripPtR {
    fn new(ind: usize, strip: usize) -> Self {
        Self {
            ind,
            strip,
            side: Side::None,
            ref_pt: None,
            desc: Twins::default(),
        }
    }
}

/// An ordered chain of strip references on one face.
pub type Strip = VecDeque<StripPtR>;

/// Per-face strip bookkeeping.
#[derive(Debug)]
pub struct PStrips {
    /// The original face ring.
    pub poly: Vec<PointId>,
    pub base: Base,
    /// Face normal.
    pub n: Vector3,
    /// Contact point id -> its classification on this face.
    pub pts: BTreeMap<usize, StripPt>,
    pub strips: Vec<Strip>,
}

/// All cut faces of one surface.
pub type PolyStripsMap = BTreeMap<CellId, PStrips>;

/// Which input surface a contact segment attribute refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSide {
    A,
    B,
}

impl SurfaceSide {
    fn cell(self, seg: &super::contact::ContactSeg) -> CellId {
        match self {
            SurfaceSide::A => seg.cell_a,
            SurfaceSide::B => seg.cell_b,
        }
    }

    fn sources(self, seg: &super::contact::ContactSeg) -> [Option<PointId>; 2] {
        match self {
            SurfaceSide::A => seg.sources_a,
            SurfaceSide::B => seg.sources_b,
        }
    }
}

/// Assembles the per-face strips of one surface.
///
/// # Errors
///
/// [`BooleanError::ContactFailed`] when a source-constrained point cannot
/// be recovered on any face, [`BooleanError::CollapsedCutPoints`] when two
/// distinct contact points snap to one boundary coordinate, and
/// [`BooleanError::StripsCross`] when strips self-intersect in a face
/// plane.
pub fn get_poly_strips(
    mesh: &PolyMesh,
    cont: &ContactCurve,
    side: SurfaceSide,
) -> Result<PolyStripsMap> {
    let mut poly_lines: BTreeMap<CellId, Vec<usize>> = BTreeMap::new();

    for (i, seg) in cont.live_segs() {
        poly_lines.entry(side.cell(seg)).or_default().push(i);
    }

    let mut poly_strips: PolyStripsMap = BTreeMap::new();
    let mut not_catched: Vec<(CellId, usize)> = Vec::new();

    for (&cell, lines) in &mut poly_lines {
        remove_duplicates(cont, lines);

        let poly = mesh.cell(cell).verts.clone();
        let points = mesh.cell_points(cell);
        let base = Base::new(&points);
        let n = base.n;

        let mut pstrips = PStrips {
            poly,
            base,
            n,
            pts: BTreeMap::new(),
            strips: Vec::new(),
        };

        get_strip_points(mesh, cont, side, &mut pstrips, lines);

        for sp in pstrips.pts.values_mut() {
            sp.poly_id = cell;
            if !sp.catched {
                not_catched.push((cell, sp.ind));
            }
        }

        poly_strips.insert(cell, pstrips);
    }

    recover_not_catched(&mut poly_strips, &not_catched)?;
    check_collapsed(&poly_strips)?;

    for (cell, lines) in &poly_lines {
        let pstrips = poly_strips.get_mut(cell).expect("face present");
        assemble_strips(cont, pstrips, lines);
        complete_strips(pstrips);
    }

    check_strips_cross(&poly_strips)?;

    debug!(faces = poly_strips.len(), "assembled poly strips");

    Ok(poly_strips)
}

/// Drops face lines that repeat an endpoint pair in either order.
fn remove_duplicates(cont: &ContactCurve, lines: &mut Vec<usize>) {
    let mut seen: Vec<(usize, usize)> = Vec::with_capacity(lines.len());

    lines.retain(|&id| {
        let seg = &cont.segs[id];
        let dup = seen
            .iter()
            .any(|&(a, b)| (a == seg.a && b == seg.b) || (a == seg.b && b == seg.a));
        if !dup {
            seen.push((seg.a, seg.b));
        }
        !dup
    });
}

/// Classifies every contact point touching a face: edge capture, vertex
/// snapping and branch detection.
fn get_strip_points(
    mesh: &PolyMesh,
    cont: &ContactCurve,
    side: SurfaceSide,
    pstrips: &mut PStrips,
    lines: &[usize],
) {
    let poly = &pstrips.poly;

    let mut all_pts: BTreeMap<usize, Option<PointId>> = BTreeMap::new();
    let mut links: BTreeMap<usize, usize> = BTreeMap::new();

    for &line_id in lines {
        let seg = &cont.segs[line_id];
        let sources = side.sources(seg);

        all_pts.entry(seg.a).or_insert(sources[0]);
        all_pts.entry(seg.b).or_insert(sources[1]);

        *links.entry(seg.a).or_insert(0) += 1;
        *links.entry(seg.b).or_insert(0) += 1;
    }

    for (&ind, &source) in &all_pts {
        let pt = cont.points[ind];

        let mut sp = StripPt {
            ind,
            pt,
            cut_pt: pt,
            capt_pt: pt,
            capt: Capt::Not,
            edge: None,
            t: 0.0,
            poly_id: CellId::default(),
            catched: true,
        };

        let len = poly.len();
        for i in 0..len {
            let ia = poly[i];
            let ib = poly[(i + 1) % len];

            if let Some(src) = source {
                if ia != src {
                    continue;
                }
            }

            let a = mesh.point(ia);
            let b = mesh.point(ib);

            let u = b - a;
            let n = u.norm();
            let v = sp.pt - a;

            let t = v.dot(&u) / (n * n);
            let d = v.cross(&u).norm() / n;

            if d < TOL && t > -TOL && t < 1.0 + TOL {
                sp.edge = Some([ia, ib]);
                sp.t = t.clamp(0.0, 1.0);

                if (a - sp.pt).norm() < TOL {
                    sp.capt_pt = a;
                    sp.capt = Capt::A;
                } else if (b - sp.pt).norm() < TOL {
                    sp.capt_pt = b;
                    sp.capt = Capt::B;
                } else {
                    sp.capt_pt = a + u * t;
                    sp.capt = Capt::Edge;
                }
            }
        }

        if source.is_some() && sp.edge.is_none() {
            sp.catched = false;
        }

        if sp.capt == Capt::Not && links[&ind] > 2 {
            sp.capt = Capt::Branched;
        }

        pstrips.pts.insert(ind, sp);
    }

    // boundary normalization: every vertex capture becomes an `A` capture
    // on the edge leaving that vertex, and boundary points cut at their
    // snapped coordinate
    let poly = pstrips.poly.clone();
    for sp in pstrips.pts.values_mut() {
        if sp.capt.is_boundary() {
            if sp.capt == Capt::B {
                let edge = sp.edge.expect("boundary point has an edge");
                let pos = poly
                    .iter()
                    .position(|&id| id == edge[1])
                    .expect("edge endpoint in ring");
                let next = poly[(pos + 1) % poly.len()];

                sp.t = 0.0;
                sp.edge = Some([edge[1], next]);
                sp.capt = Capt::A;
            }
            sp.cut_pt = sp.capt_pt;
        } else {
            sp.cut_pt = sp.pt;
        }
    }
}

/// Cross-face recovery of points whose source vertex was not found on the
/// expected face.
fn recover_not_catched(
    poly_strips: &mut PolyStripsMap,
    not_catched: &[(CellId, usize)],
) -> Result<()> {
    for &(cell, ind) in not_catched {
        let mut found: Option<(PointId, Point3)> = None;

        for (&other, pstrips) in poly_strips.iter() {
            if other == cell {
                continue;
            }
            if let Some(corr) = pstrips.pts.get(&ind) {
                if corr.capt == Capt::A {
                    let edge = corr.edge.expect("captured point has an edge");
                    found = Some((edge[0], corr.capt_pt));
                    break;
                }
            }
        }

        let Some((edge_start, capt_pt)) = found else {
            return Err(BooleanError::ContactFailed(format!(
                "contact point {ind} could not be located on any edge"
            )));
        };

        let pstrips = poly_strips.get_mut(&cell).expect("face present");
        let pos = pstrips
            .poly
            .iter()
            .position(|&id| id == edge_start)
            .ok_or_else(|| {
                BooleanError::ContactFailed(format!(
                    "recovered vertex of contact point {ind} is not on its face"
                ))
            })?;
        let next = pstrips.poly[(pos + 1) % pstrips.poly.len()];

        let sp = pstrips.pts.get_mut(&ind).expect("point present");
        sp.capt = Capt::A;
        sp.edge = Some([edge_start, next]);
        sp.t = 0.0;
        sp.capt_pt = capt_pt;
        sp.cut_pt = capt_pt;
        sp.catched = true;
    }

    Ok(())
}

/// Two distinct contact points on one surface must never snap to the same
/// boundary coordinate.
fn check_collapsed(poly_strips: &PolyStripsMap) -> Result<()> {
    let mut collapsed: BTreeMap<PointKey, BTreeSet<usize>> = BTreeMap::new();

    for pstrips in poly_strips.values() {
        for sp in pstrips.pts.values() {
            if sp.capt.is_boundary() {
                let inds = collapsed.entry(PointKey::new(&sp.cut_pt)).or_default();
                inds.insert(sp.ind);
                if inds.len() > 1 {
                    return Err(BooleanError::CollapsedCutPoints);
                }
            }
        }
    }

    Ok(())
}

/// Chains a face's contact segments into strips.
fn assemble_strips(cont: &ContactCurve, pstrips: &mut PStrips, lines: &[usize]) {
    let mut pending: VecDeque<(usize, usize)> = lines
        .iter()
        .map(|&id| (cont.segs[id].a, cont.segs[id].b))
        .collect();

    let PStrips {
        ref pts,
        ref mut strips,
        ..
    } = *pstrips;

    let mut strip_id = 0usize;

    while let Some((f, g)) = pending.pop_back() {
        let mut strip: Strip = VecDeque::new();
        strip.push_back(StripPtR::new(f, strip_id));
        strip.push_back(StripPtR::new(g, strip_id));

        // extend the right end, then the left end
        loop {
            let right = strip.back().expect("strip non-empty").ind;
            if pts[&right].capt != Capt::Not {
                break;
            }
            let Some(pos) = pending.iter().position(|&(a, b)| a == right || b == right)
            else {
                break;
            };
            let (a, b) = pending.remove(pos).expect("position valid");
            let other = if a == right { b } else { a };
            strip.push_back(StripPtR::new(other, strip_id));
        }

        loop {
            let left = strip.front().expect("strip non-empty").ind;
            if pts[&left].capt != Capt::Not {
                break;
            }
            let Some(pos) = pending.iter().position(|&(a, b)| a == left || b == left)
            else {
                break;
            };
            let (a, b) = pending.remove(pos).expect("position valid");
            let other = if a == left { b } else { a };
            strip.push_front(StripPtR::new(other, strip_id));
        }

        strips.push(strip);
        strip_id += 1;
    }
}

/// Closes a strip with one interior end by walking its body back, so the
/// cut can pass through the interior point.
fn complete_strips(pstrips: &mut PStrips) {
    for strip in &mut pstrips.strips {
        let front = strip.front().expect("strip non-empty").ind;
        let back = strip.back().expect("strip non-empty").ind;

        if front == back {
            continue;
        }

        if pstrips.pts[&front].capt == Capt::Not {
            let mirror: Vec<StripPtR> = strip.iter().skip(1).copied().collect();
            for sp in mirror {
                strip.push_front(sp);
            }
        } else if pstrips.pts[&back].capt == Capt::Not {
            let mirror: Vec<StripPtR> = strip.iter().rev().skip(1).copied().collect();
            for sp in mirror {
                strip.push_back(sp);
            }
        }
    }
}

/// A strip encloses area unless it immediately walks back on itself.
#[must_use]
pub fn has_area(strip: &Strip) -> bool {
    let mut area = true;
    let n = strip.len();

    if n % 2 == 1 {
        for i in 0..(n - 1) / 2 {
            area = strip[i].ind != strip[n - i - 1].ind;
        }
    }

    area
}

/// Projected self-intersection test over all strips of every face.
fn check_strips_cross(poly_strips: &PolyStripsMap) -> Result<()> {
    for pstrips in poly_strips.values() {
        let proj: BTreeMap<usize, Point2> = pstrips
            .pts
            .iter()
            .map(|(&ind, sp)| (ind, pstrips.base.project(&sp.pt)))
            .collect();

        let mut segs: Vec<(usize, usize)> = Vec::new();
        for strip in &pstrips.strips {
            for i in 0..strip.len().saturating_sub(1) {
                segs.push((strip[i].ind, strip[i + 1].ind));
            }
        }

        for i in 0..segs.len() {
            for j in i + 1..segs.len() {
                let (a0, a1) = segs[i];
                let (b0, b1) = segs[j];

                if a0 == b0 || a0 == b1 || a1 == b0 || a1 == b1 {
                    continue;
                }

                if segments_intersect(&proj[&a0], &proj[&a1], &proj[&b0], &proj[&b1]) {
                    return Err(BooleanError::StripsCross);
                }
            }
        }
    }

    Ok(())
}

/// Discards degenerate interior strips ("holes" with no enclosed area) and
/// propagates the removal to both surfaces and the contact curve.
///
/// # Errors
///
/// [`BooleanError::NoContact`] when the deletion empties the curve.
pub fn clean_strips(
    ps_a: &mut PolyStripsMap,
    ps_b: &mut PolyStripsMap,
    cont: &mut ContactCurve,
) -> Result<()> {
    let mut inds: HashSet<usize> = HashSet::new();

    let mut find_holes = |poly_strips: &mut PolyStripsMap| {
        for pstrips in poly_strips.values_mut() {
            let pts = &pstrips.pts;
            pstrips.strips.retain(|strip| {
                let front = strip.front().expect("strip non-empty").ind;
                let back = strip.back().expect("strip non-empty").ind;

                if pts[&front].capt == Capt::Not
                    && pts[&back].capt == Capt::Not
                    && !has_area(strip)
                {
                    for sp in strip {
                        inds.insert(sp.ind);
                    }
                    return false;
                }
                true
            });
        }
    };

    find_holes(ps_a);
    find_holes(ps_b);

    if inds.is_empty() {
        return Ok(());
    }

    debug!(points = inds.len(), "removing degenerate interior strips");

    let clean_other = |poly_strips: &mut PolyStripsMap| {
        for pstrips in poly_strips.values_mut() {
            pstrips
                .strips
                .retain(|strip| !strip.iter().any(|sp| inds.contains(&sp.ind)));
        }
    };

    clean_other(ps_a);
    clean_other(ps_b);

    for &ind in &inds {
        for seg_id in cont.segments_of_point(ind) {
            cont.segs[seg_id].deleted = true;
        }
    }

    if cont.is_empty() {
        return Err(BooleanError::NoContact);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::boolean::contact::ContactSeg;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    /// A unit-square face mesh plus a contact curve crossing it.
    fn square_face() -> (PolyMesh, CellId) {
        let mut mesh = PolyMesh::new();
        let a = mesh.add_point(p(0.0, 0.0, 0.0));
        let b = mesh.add_point(p(4.0, 0.0, 0.0));
        let c = mesh.add_point(p(4.0, 4.0, 0.0));
        let d = mesh.add_point(p(0.0, 4.0, 0.0));
        let cell = mesh.add_cell(vec![a, b, c, d]);
        (mesh, cell)
    }

    fn seg(a: usize, b: usize, cell: CellId) -> ContactSeg {
        ContactSeg {
            a,
            b,
            cell_a: cell,
            cell_b: cell,
            sources_a: [None, None],
            sources_b: [None, None],
            deleted: false,
        }
    }

    #[test]
    fn edge_and_interior_classification() {
        let (mesh, cell) = square_face();

        let cont = ContactCurve {
            points: vec![p(2.0, 0.0, 0.0), p(2.0, 2.0, 0.0), p(2.0, 4.0, 0.0)],
            segs: vec![seg(0, 1, cell), seg(1, 2, cell)],
        };

        let ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        let pstrips = &ps[&cell];

        assert_eq!(pstrips.pts[&0].capt, Capt::Edge);
        assert!((pstrips.pts[&0].t - 0.5).abs() < TOL);
        assert_eq!(pstrips.pts[&1].capt, Capt::Not);
        assert_eq!(pstrips.pts[&2].capt, Capt::Edge);

        // one strip through the interior point
        assert_eq!(pstrips.strips.len(), 1);
        let strip = &pstrips.strips[0];
        assert_eq!(strip.len(), 3);
        assert_eq!(strip.front().unwrap().ind, 0);
        assert_eq!(strip.back().unwrap().ind, 2);
    }

    #[test]
    fn vertex_capture_normalizes_to_next_edge() {
        let (mesh, cell) = square_face();
        let verts = mesh.cell(cell).verts.clone();

        // contact point exactly at the corner (4, 0): capt B on the first
        // edge, normalized to capt A on the second
        let cont = ContactCurve {
            points: vec![p(4.0, 0.0, 0.0), p(2.0, 2.0, 0.0), p(0.0, 4.0, 0.0)],
            segs: vec![seg(0, 1, cell), seg(1, 2, cell)],
        };

        let ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        let sp = &ps[&cell].pts[&0];

        assert_eq!(sp.capt, Capt::A);
        assert_eq!(sp.edge, Some([verts[1], verts[2]]));
        assert!(sp.t.abs() < TOL);
        assert!((sp.cut_pt - p(4.0, 0.0, 0.0)).norm() < TOL);
    }

    #[test]
    fn interior_strip_is_completed() {
        let (mesh, cell) = square_face();

        // open strip ending in the interior: edge -> interior -> interior
        let cont = ContactCurve {
            points: vec![p(2.0, 0.0, 0.0), p(2.0, 1.0, 0.0), p(2.0, 2.0, 0.0)],
            segs: vec![seg(0, 1, cell), seg(1, 2, cell)],
        };

        let ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        let strip = &ps[&cell].strips[0];

        // closed through the interior: boundary ids at both ends
        assert_eq!(strip.front().unwrap().ind, strip.back().unwrap().ind);
        assert_eq!(strip.len(), 5);
    }

    #[test]
    fn crossing_strips_are_rejected() {
        let (mesh, cell) = square_face();

        let cont = ContactCurve {
            points: vec![
                p(1.0, 0.0, 0.0),
                p(2.0, 2.0, 0.0),
                p(3.0, 4.0, 0.0),
                p(0.0, 2.1, 0.0),
                p(2.0, 1.9, 0.0),
                p(4.0, 2.1, 0.0),
            ],
            segs: vec![
                seg(0, 1, cell),
                seg(1, 2, cell),
                seg(3, 4, cell),
                seg(4, 5, cell),
            ],
        };

        assert!(matches!(
            get_poly_strips(&mesh, &cont, SurfaceSide::A),
            Err(BooleanError::StripsCross)
        ));
    }

    #[test]
    fn palindromic_interior_strip_is_cleaned() {
        let (mesh, cell) = square_face();

        // a there-and-back artefact strictly inside the face
        let cont_pts = vec![p(1.0, 1.0, 0.0), p(2.0, 2.0, 0.0), p(1.0, 2.0, 0.0)];
        let mut cont = ContactCurve {
            points: cont_pts,
            segs: vec![seg(0, 1, cell), seg(1, 0, cell), seg(1, 2, cell), seg(2, 1, cell)],
        };

        let mut ps_a = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        let mut ps_b = PolyStripsMap::new();

        let result = clean_strips(&mut ps_a, &mut ps_b, &mut cont);
        assert!(matches!(result, Err(BooleanError::NoContact)));
        assert!(cont.is_empty());
    }

    #[test]
    fn duplicate_face_lines_are_removed() {
        let (_, cell) = square_face();
        let cont = ContactCurve {
            points: vec![p(0.0, 0.0, 0.0), p(1.0, 1.0, 0.0)],
            segs: vec![seg(0, 1, cell), seg(1, 0, cell)],
        };

        let mut lines = vec![0, 1];
        remove_duplicates(&cont, &mut lines);
        assert_eq!(lines, vec![0]);
    }

    #[test]
    fn has_area_detects_palindrome() {
        let mk = |inds: &[usize]| -> Strip {
            inds.iter().map(|&i| StripPtR::new(i, 0)).collect()
        };

        assert!(!has_area(&mk(&[0, 1, 0])));
        assert!(!has_area(&mk(&[0, 1, 2, 1, 0])));
        assert!(has_area(&mk(&[0, 1, 2, 3, 0])));
        assert!(has_area(&mk(&[0, 1, 2, 3])));
    }
}
