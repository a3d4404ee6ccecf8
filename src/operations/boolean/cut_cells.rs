use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::error::{BooleanError, Result};
use crate::math::base::newell_normal;
use crate::math::polygon_2d::point_in_polygon;
use crate::math::{Point2, Point3, PointKey, Vector3};
use crate::mesh::{CellId, PointId, PolyMesh};

use super::merger::merge_holes;
use super::strips::{
    has_area, Capt, PStrips, PolyStripsMap, Side, Strip, StripPt, StripPtR, Twins,
};

/// Alignment threshold for the orientation decisions inside the cutter.
const EDGE_EPS: f64 = 0.999999;

/// Which end of a strip an edge-list entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Front,
    Back,
}

/// Coordinates of a strip endpoint inside the per-face strip list.
#[derive(Debug, Clone, Copy)]
struct ERef {
    si: usize,
    end: End,
}

fn strip_end(strips: &[Strip], r: ERef) -> StripPtR {
    match r.end {
        End::Front => *strips[r.si].front().expect("strip non-empty"),
        End::Back => *strips[r.si].back().expect("strip non-empty"),
    }
}

fn strip_end_mut(strips: &mut [Strip], r: ERef) -> &mut StripPtR {
    match r.end {
        End::Front => strips[r.si].front_mut().expect("strip non-empty"),
        End::Back => strips[r.si].back_mut().expect("strip non-empty"),
    }
}

/// Removes ring vertices whose coordinates equal the next vertex exactly.
fn clean_poly(mesh: &PolyMesh, poly: &mut Vec<PointId>) {
    let keys: Vec<PointKey> = poly
        .iter()
        .map(|&id| PointKey::new(&mesh.point(id)))
        .collect();

    let n = poly.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        if keys[i] != keys[(i + 1) % n] {
            out.push(poly[i]);
        }
    }
    *poly = out;
}

/// Newell normal over the cut coordinates of a run of strip references.
fn refs_normal<'a, I>(pts: &BTreeMap<usize, StripPt>, refs: I) -> Vector3
where
    I: Iterator<Item = &'a StripPtR>,
{
    let coords: Vec<Point3> = refs.map(|r| pts[&r.ind].cut_pt).collect();
    newell_normal(&coords)
}

/// Replaces each affected face with the sub-faces induced by its strips.
///
/// # Errors
///
/// [`BooleanError::BranchedOnBothEnds`] for a strip branched at both
/// endpoints, [`BooleanError::CutFailed`] when a face cannot be
/// decomposed or a hole cannot be merged back in.
pub fn cut_cells(mesh: &mut PolyMesh, poly_strips: &mut PolyStripsMap) -> Result<()> {
    let faces: Vec<CellId> = poly_strips.keys().copied().collect();

    for cell in faces {
        let pstrips = poly_strips.get_mut(&cell).expect("face present");
        cut_one_cell(mesh, cell, pstrips)?;
    }

    Ok(())
}

#[allow(clippy::too_many_lines)]
fn cut_one_cell(mesh: &mut PolyMesh, cell: CellId, pstrips: &mut PStrips) -> Result<()> {
    let orig_id = mesh.cell(cell).orig;
    let poly = pstrips.poly.clone();
    let base = pstrips.base.clone();
    let face_n = pstrips.n;
    let pts = pstrips.pts.clone();
    let strips = &mut pstrips.strips;

    // fast path: the cut runs entirely along the face's own vertices
    if !pts.is_empty()
        && pts
            .values()
            .all(|sp| matches!(sp.capt, Capt::A | Capt::B))
    {
        let coords: Vec<Point3> = poly.iter().map(|&id| mesh.point(id)).collect();

        let set_a: BTreeSet<PointKey> = coords.iter().map(PointKey::new).collect();
        let set_b: BTreeSet<PointKey> =
            pts.values().map(|sp| PointKey::new(&sp.cut_pt)).collect();

        if set_a == set_b {
            let verts: Vec<PointId> = coords.iter().map(|p| mesh.add_point(*p)).collect();
            mesh.add_cell_with_orig(verts, orig_id);
            mesh.delete_cell(cell);
            return Ok(());
        }
    }

    // absolute ring parameter, the tie-breaker across edges
    let mut absolute_t: HashMap<PointId, f64> = HashMap::new();
    let mut t_total = 0.0;
    for &id in &poly {
        absolute_t.insert(id, t_total);
        t_total += 1.0;
    }

    if strips.iter().any(|s| {
        pts[&s.front().expect("strip non-empty").ind].capt == Capt::Branched
            && pts[&s.back().expect("strip non-empty").ind].capt == Capt::Branched
    }) {
        return Err(BooleanError::BranchedOnBothEnds);
    }

    // holes aside: strips interior at both ends
    let mut holes: Vec<Strip> = Vec::new();
    strips.retain(|s| {
        let interior = pts[&s.front().expect("strip non-empty").ind].capt == Capt::Not
            && pts[&s.back().expect("strip non-empty").ind].capt == Capt::Not;
        if interior {
            holes.push(s.clone());
        }
        !interior
    });

    let strips_m: BTreeMap<usize, usize> = strips
        .iter()
        .enumerate()
        .map(|(i, s)| (s.front().expect("strip non-empty").strip, i))
        .collect();

    // orient strips and allocate the descendant pairs
    for strip in strips.iter_mut() {
        let front = *strip.front().expect("strip non-empty");
        let back = *strip.back().expect("strip non-empty");

        let front_sp = &pts[&front.ind];
        let back_sp = &pts[&back.ind];

        // ends on the same edge: smaller t first
        if front_sp.edge.map(|e| e[0]) == back_sp.edge.map(|e| e[0])
            && front.ind != back.ind
            && front_sp.t > back_sp.t
        {
            let rev: Strip = strip.iter().rev().copied().collect();
            *strip = rev;
        }

        // branched strips run boundary first
        let front_capt = pts[&strip.front().expect("strip non-empty").ind].capt;
        let back_capt = pts[&strip.back().expect("strip non-empty").ind].capt;
        if front_capt == Capt::Branched && back_capt.is_boundary() {
            let rev: Strip = strip.iter().rev().copied().collect();
            *strip = rev;
        }

        let start_sp = pts[&strip.front().expect("strip non-empty").ind].clone();
        let end_sp = pts[&strip.back().expect("strip non-empty").ind].clone();

        let front_mut = strip.front_mut().expect("strip non-empty");
        front_mut.side = Side::Start;
        front_mut.ref_pt = start_sp.edge.map(|e| e[0]);

        if end_sp.capt.is_boundary() {
            let back_mut = strip.back_mut().expect("strip non-empty");
            back_mut.side = Side::End;
            back_mut.ref_pt = end_sp.edge.map(|e| e[0]);
        }

        for p in strip.iter_mut() {
            let cp = pts[&p.ind].cut_pt;
            p.desc = Twins {
                left: mesh.add_point(cp),
                right: mesh.add_point(cp),
            };
        }
    }

    let mut polys: VecDeque<Vec<PointId>> = VecDeque::new();
    polys.push_back(poly.clone());

    // branched strips first, grouped by their interior endpoint
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, strip) in strips.iter().enumerate() {
        let back_ind = strip.back().expect("strip non-empty").ind;
        if pts[&back_ind].capt == Capt::Branched {
            groups.entry(back_ind).or_default().push(i);
        }
    }

    let mut assembled: HashSet<usize> = HashSet::new();

    for group in groups.values() {
        let mut order = group.clone();

        order.sort_by(|&ia, &ib| {
            let sa = &strips[ia];
            let sb = &strips[ib];

            let fa = sa.front().expect("strip non-empty");
            let fb = sb.front().expect("strip non-empty");

            if fa.ind == fb.ind {
                let run: Vec<StripPtR> = sb
                    .iter()
                    .copied()
                    .chain(sa.iter().rev().copied())
                    .collect();
                let n = refs_normal(&pts, run.iter());

                if face_n.dot(&n) > EDGE_EPS {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            } else {
                let pa = &pts[&fa.ind];
                let pb = &pts[&fb.ind];

                let ka = absolute_t[&pa.edge.expect("boundary end")[0]] + pa.t;
                let kb = absolute_t[&pb.edge.expect("boundary end")[0]] + pb.t;
                ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
            }
        });

        let first_ref = strips[order[0]]
            .front()
            .expect("strip non-empty")
            .ref_pt;
        let next_pos = polys
            .iter()
            .position(|p| p.iter().any(|&id| Some(id) == first_ref))
            .ok_or(BooleanError::CutFailed)?;
        let next_poly = polys[next_pos].clone();

        for &i in &order {
            assembled.insert(strips[i].front().expect("strip non-empty").strip);
        }

        let mut group_polys: Vec<Vec<PointId>> = Vec::new();

        for k in 0..order.len() {
            let ia = order[k];
            let ib = order[(k + 1) % order.len()];

            // copies needed across the mutation below
            let (a_front, b_front, descs_out, descs_back) = {
                let sa = &strips[ia];
                let sb = &strips[ib];
                let descs_out: Vec<PointId> =
                    sb.iter().map(|p| p.desc.left).collect();
                let descs_back: Vec<PointId> =
                    sa.iter().rev().skip(1).map(|p| p.desc.right).collect();
                (
                    *sa.front().expect("strip non-empty"),
                    *sb.front().expect("strip non-empty"),
                    descs_out,
                    descs_back,
                )
            };

            let mut new_poly: Vec<PointId> = Vec::new();
            new_poly.extend(descs_out);
            new_poly.extend(descs_back);

            // boundary vertices between the two strip ends
            if a_front.ref_pt != b_front.ref_pt {
                let mut pos = next_poly
                    .iter()
                    .position(|&id| Some(id) == a_front.ref_pt)
                    .ok_or(BooleanError::CutFailed)?;
                loop {
                    pos = (pos + 1) % next_poly.len();
                    new_poly.push(next_poly[pos]);
                    if Some(next_poly[pos]) == b_front.ref_pt {
                        break;
                    }
                }
            }

            clean_poly(mesh, &mut new_poly);

            let poly_2d: Vec<Point2> = new_poly
                .iter()
                .map(|&id| base.project(&mesh.point(id)))
                .collect();

            // shift refs of strips not built in yet
            let pa = pts[&a_front.ind].clone();
            let pb = pts[&b_front.ind].clone();
            let pa_edge = pa.edge.expect("boundary end")[0];
            let pb_edge = pb.edge.expect("boundary end")[0];

            for s in strips.iter_mut() {
                if assembled.contains(&s.front().expect("strip non-empty").strip) {
                    continue;
                }

                let end_a = pts[&s.front().expect("strip non-empty").ind].clone();
                let end_b = pts[&s.back().expect("strip non-empty").ind].clone();

                if end_a.capt.is_boundary()
                    && end_a.edge.map(|e| e[0]) == Some(pa_edge)
                    && end_a.t > pa.t
                    && (pa_edge != pb_edge || end_a.t < pb.t)
                {
                    s.front_mut().expect("strip non-empty").ref_pt = Some(a_front.desc.right);

                    if end_b.ind == pa.ind {
                        s.back_mut().expect("strip non-empty").ref_pt =
                            Some(a_front.desc.right);
                    } else if end_b.ind == pb.ind {
                        s.back_mut().expect("strip non-empty").ref_pt =
                            Some(b_front.desc.left);
                    }
                }

                if end_b.capt.is_boundary()
                    && end_b.edge.map(|e| e[0]) == Some(pa_edge)
                    && end_b.t > pa.t
                    && (pa_edge != pb_edge || end_b.t < pb.t)
                {
                    s.back_mut().expect("strip non-empty").ref_pt = Some(a_front.desc.right);

                    if end_a.ind == pa.ind {
                        s.front_mut().expect("strip non-empty").ref_pt =
                            Some(a_front.desc.right);
                    } else if end_a.ind == pb.ind {
                        s.front_mut().expect("strip non-empty").ref_pt =
                            Some(b_front.desc.left);
                    }
                }

                if end_a.ind == pa.ind && end_b.ind == pb.ind {
                    s.front_mut().expect("strip non-empty").ref_pt = Some(a_front.desc.right);
                    s.back_mut().expect("strip non-empty").ref_pt = Some(b_front.desc.left);
                } else if end_b.ind == pa.ind && end_a.ind == pb.ind {
                    s.back_mut().expect("strip non-empty").ref_pt = Some(a_front.desc.right);
                    s.front_mut().expect("strip non-empty").ref_pt = Some(b_front.desc.left);
                }

                if end_b.capt == Capt::Branched {
                    let proj = base.project(&end_b.pt);
                    if point_in_polygon(&proj, &poly_2d) {
                        if end_a.ind == pa.ind {
                            s.front_mut().expect("strip non-empty").ref_pt =
                                Some(a_front.desc.right);
                        } else if end_a.ind == pb.ind {
                            s.front_mut().expect("strip non-empty").ref_pt =
                                Some(b_front.desc.left);
                        }
                    }
                }
            }

            group_polys.push(new_poly);
        }

        let _ = polys.remove(next_pos);
        polys.extend(group_polys);
    }

    // remaining strips, per working polygon
    let mut new_polys: Vec<Vec<PointId>> = Vec::new();

    for next in std::mem::take(&mut polys) {
        let sel: Vec<usize> = strips
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                pts[&s.back().expect("strip non-empty").ind].capt != Capt::Branched
                    && next
                        .iter()
                        .any(|&id| Some(id) == s.front().expect("strip non-empty").ref_pt)
            })
            .map(|(i, _)| i)
            .collect();

        if sel.is_empty() {
            new_polys.push(next);
            continue;
        }

        // closed strips wind against the face normal before insertion
        for &si in &sel {
            let s = &strips[si];
            if s.front().expect("strip non-empty").ind == s.back().expect("strip non-empty").ind
                && has_area(s)
            {
                let n = refs_normal(&pts, s.iter().take(s.len() - 1));
                if face_n.dot(&n) > EDGE_EPS {
                    let rev: Strip = s.iter().rev().copied().collect();
                    strips[si] = rev;
                }
            }
        }

        let mut edges: BTreeMap<PointId, Vec<ERef>> = BTreeMap::new();
        for &si in &sel {
            let a = pts[&strips[si].front().expect("strip non-empty").ind]
                .edge
                .expect("boundary end")[0];
            let b = pts[&strips[si].back().expect("strip non-empty").ind]
                .edge
                .expect("boundary end")[0];
            edges.entry(a).or_default().push(ERef {
                si,
                end: End::Front,
            });
            edges.entry(b).or_default().push(ERef { si, end: End::Back });
        }

        // order captures along each edge
        for (&edge_id, list) in &mut edges {
            let strips_ref = &*strips;
            list.sort_by(|&ra, &rb| {
                edge_order(
                    strips_ref, &strips_m, &pts, &absolute_t, t_total, face_n, edge_id, ra,
                    rb,
                )
            });
        }

        let mut working: VecDeque<Vec<PointId>> = VecDeque::new();
        working.push_back(next);

        for &si in &sel {
            let start = *strips[si].front().expect("strip non-empty");
            let end = *strips[si].back().expect("strip non-empty");

            let mut cycle = 0usize;

            loop {
                if cycle == working.len() {
                    break;
                }

                let next_p = working.pop_front().expect("working non-empty");

                let mut splitted: [Vec<PointId>; 2] = [Vec::new(), Vec::new()];

                if next_p.iter().any(|&id| Some(id) == start.ref_pt) {
                    if start.ref_pt == end.ref_pt {
                        for &id in &next_p {
                            splitted[0].push(id);
                            if Some(id) == start.ref_pt {
                                for p in strips[si].iter() {
                                    splitted[0].push(p.desc.left);
                                }
                            }
                        }
                        // the strip itself is a polygon
                        for p in strips[si].iter().rev() {
                            splitted[1].push(p.desc.right);
                        }
                    } else {
                        let mut curr = 0usize;
                        for &id in &next_p {
                            splitted[curr].push(id);

                            if Some(id) == start.ref_pt {
                                for p in strips[si].iter() {
                                    splitted[curr].push(p.desc.left);
                                }
                                curr = 1 - curr;
                            } else if Some(id) == end.ref_pt {
                                for p in strips[si].iter().rev() {
                                    splitted[curr].push(p.desc.right);
                                }
                                curr = 1 - curr;
                            }
                        }
                    }
                }

                if splitted[1].is_empty() {
                    working.push_back(next_p);
                    cycle += 1;
                    continue;
                }

                propagate_refs(strips, &edges, &pts, start);

                let [mut left, mut right] = splitted;
                clean_poly(mesh, &mut left);
                clean_poly(mesh, &mut right);

                if left.len() > 2 {
                    working.push_back(left);
                }
                if has_area(&strips[si]) && right.len() > 2 {
                    working.push_back(right);
                }

                break;
            }
        }

        new_polys.extend(working);
    }

    // emit the finished sub-polygons
    let mut desc_ids: Vec<CellId> = Vec::new();
    for p in new_polys {
        if p.len() > 2 {
            desc_ids.push(mesh.add_cell_with_orig(p, orig_id));
        }
    }

    mesh.delete_cell(cell);

    debug!(?cell, children = desc_ids.len(), holes = holes.len(), "cut face");

    if !holes.is_empty() {
        merge_holes(mesh, &base, &pts, &holes, &desc_ids, orig_id)
            .map_err(|_| BooleanError::CutFailed)?;
    }

    Ok(())
}

/// Ordering of two strip-end references sharing an edge.
#[allow(clippy::too_many_arguments)]
fn edge_order(
    strips: &[Strip],
    strips_m: &BTreeMap<usize, usize>,
    pts: &BTreeMap<usize, StripPt>,
    absolute_t: &HashMap<PointId, f64>,
    t_total: f64,
    face_n: Vector3,
    edge_id: PointId,
    ra: ERef,
    rb: ERef,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let a = strip_end(strips, ra);
    let b = strip_end(strips, rb);

    let a_ = &pts[&a.ind];
    let b_ = &pts[&b.ind];

    if a_.ind != b_.ind {
        return a_
            .t
            .partial_cmp(&b_.t)
            .unwrap_or(Ordering::Equal);
    }

    if a.strip != b.strip {
        // different strips starting at one point: compare their far ends
        let sa = &strips[strips_m[&a.strip]];
        let sb = &strips[strips_m[&b.strip]];

        let ea = if a.ind == sa.front().expect("strip non-empty").ind {
            sa.back().expect("strip non-empty").ind
        } else {
            sa.front().expect("strip non-empty").ind
        };
        let eb = if b.ind == sb.front().expect("strip non-empty").ind {
            sb.back().expect("strip non-empty").ind
        } else {
            sb.front().expect("strip non-empty").ind
        };

        let ea_ = &pts[&ea];
        let eb_ = &pts[&eb];

        if ea_.ind != eb_.ind {
            let r = absolute_t[&edge_id] + a_.t;
            let mut ka = absolute_t[&ea_.edge.expect("boundary end")[0]] + ea_.t;
            let mut kb = absolute_t[&eb_.edge.expect("boundary end")[0]] + eb_.t;

            ka = if ka > r { ka - r } else { ka + t_total - r };
            kb = if kb > r { kb - r } else { kb + t_total - r };

            if kb < ka {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        } else {
            // both strips span the same two points: orientation decides
            let mut run: Vec<StripPtR> = Vec::new();

            if a.side == Side::Start {
                run.extend(sa.iter().copied());
            } else {
                run.extend(sa.iter().rev().copied());
            }

            if b.side == Side::Start {
                run.extend(sb.iter().rev().skip(1).take(sb.len() - 2).copied());
            } else {
                run.extend(sb.iter().skip(1).take(sb.len() - 2).copied());
            }

            let n = refs_normal(pts, run.iter());
            if face_n.dot(&n) < EDGE_EPS {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    } else {
        // two ends of one (pre-oriented) closed strip
        match (ra.end, rb.end) {
            (End::Front, End::Back) => Ordering::Less,
            (End::Back, End::Front) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

/// Shifts the refs of later strips after one strip was built in, so each
/// still names the last unshifted vertex of its working polygon.
fn propagate_refs(
    strips: &mut [Strip],
    edges: &BTreeMap<PointId, Vec<ERef>>,
    pts: &BTreeMap<usize, StripPt>,
    start: StripPtR,
) {
    for list in edges.values() {
        for idx in 1..list.len() {
            let sp = strip_end(strips, list[idx]);

            if sp.strip <= start.strip {
                continue;
            }

            // walk back to the nearest entry that already has its place
            let mut tracker: Option<StripPtR> = None;

            let mut j = idx;
            while j > 0 {
                j -= 1;
                let p = strip_end(strips, list[j]);

                if p.strip == sp.strip {
                    strip_end_mut(strips, list[idx]).ref_pt = p.ref_pt;
                    break;
                }

                if p.strip <= start.strip {
                    let new_ref = if p.side == Side::End {
                        p.desc.left
                    } else {
                        p.desc.right
                    };
                    strip_end_mut(strips, list[idx]).ref_pt = Some(new_ref);
                    tracker = Some(p);
                    break;
                }
            }

            // resolve chains of strips inserted at the same point
            for k in idx + 1..list.len() {
                let p = strip_end(strips, list[k]);

                if p.ind != sp.ind {
                    break;
                }

                if p.strip <= start.strip {
                    if let Some(tp) = tracker {
                        if p.ind == tp.ind && p.strip < tp.strip {
                            break;
                        }
                    }

                    let new_ref = if p.side == Side::Start {
                        p.desc.left
                    } else {
                        p.desc.right
                    };
                    strip_end_mut(strips, list[idx]).ref_pt = Some(new_ref);
                    break;
                }
            }
        }

        if list.len() > 1 {
            let a = strip_end(strips, list[0]);
            let b = strip_end(strips, list[1]);

            if a.ind == b.ind && b.strip == start.strip && pts[&a.ind].capt == Capt::A {
                let new_ref = if b.side == Side::Start {
                    b.desc.left
                } else {
                    b.desc.right
                };
                strip_end_mut(strips, list[0]).ref_pt = Some(new_ref);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::polygon_3d::polygon_area;
    use crate::math::TOL;
    use crate::operations::boolean::contact::{ContactCurve, ContactSeg};
    use crate::operations::boolean::strips::{get_poly_strips, SurfaceSide};

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

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
    fn straight_cut_splits_square_in_two() {
        let (mut mesh, cell) = square_face();

        let cont = ContactCurve {
            points: vec![p(2.0, 0.0, 0.0), p(2.0, 2.0, 0.0), p(2.0, 4.0, 0.0)],
            segs: vec![seg(0, 1, cell), seg(1, 2, cell)],
        };

        let mut ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        cut_cells(&mut mesh, &mut ps).unwrap();

        assert!(!mesh.is_live(cell));
        let live: Vec<CellId> = mesh.cell_ids();
        assert_eq!(live.len(), 2);

        let up = Vector3::new(0.0, 0.0, 1.0);
        for id in live {
            let pts = mesh.cell_points(id);
            assert!((polygon_area(&pts, &up) - 8.0).abs() < 1e-6);
            assert_eq!(mesh.cell(id).orig, cell);
            // sub-faces keep the parent's winding
            assert!((mesh.cell_normal(id).z - 1.0).abs() < TOL);
        }
    }

    #[test]
    fn fast_path_duplicates_face_cut_along_own_edges() {
        let (mut mesh, cell) = square_face();
        let verts = mesh.cell(cell).verts.clone();
        let coords: Vec<Point3> = verts.iter().map(|&v| mesh.point(v)).collect();

        // the contact runs along the full boundary, all corners captured
        let cont = ContactCurve {
            points: coords.clone(),
            segs: vec![
                seg(0, 1, cell),
                seg(1, 2, cell),
                seg(2, 3, cell),
                seg(3, 0, cell),
            ],
        };

        let mut ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        cut_cells(&mut mesh, &mut ps).unwrap();

        let live = mesh.cell_ids();
        assert_eq!(live.len(), 1);

        let new_cell = live[0];
        assert_ne!(new_cell, cell);
        assert_eq!(mesh.cell(new_cell).orig, cell);

        // fresh point ids at the same coordinates
        for &v in &mesh.cell(new_cell).verts {
            assert!(!verts.contains(&v));
        }
        let new_coords: BTreeSet<PointKey> = mesh
            .cell_points(new_cell)
            .iter()
            .map(PointKey::new)
            .collect();
        let old_coords: BTreeSet<PointKey> = coords.iter().map(PointKey::new).collect();
        assert_eq!(new_coords, old_coords);
    }

    #[test]
    fn two_parallel_cuts_make_three_faces() {
        let (mut mesh, cell) = square_face();

        let cont = ContactCurve {
            points: vec![
                p(1.0, 0.0, 0.0),
                p(1.0, 2.0, 0.0),
                p(1.0, 4.0, 0.0),
                p(3.0, 0.0, 0.0),
                p(3.0, 2.0, 0.0),
                p(3.0, 4.0, 0.0),
            ],
            segs: vec![
                seg(0, 1, cell),
                seg(1, 2, cell),
                seg(3, 4, cell),
                seg(4, 5, cell),
            ],
        };

        let mut ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        cut_cells(&mut mesh, &mut ps).unwrap();

        let live = mesh.cell_ids();
        assert_eq!(live.len(), 3);

        let up = Vector3::new(0.0, 0.0, 1.0);
        let mut areas: Vec<f64> = live
            .iter()
            .map(|&id| polygon_area(&mesh.cell_points(id), &up))
            .collect();
        areas.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert!((areas[0] - 4.0).abs() < 1e-6);
        assert!((areas[1] - 4.0).abs() < 1e-6);
        assert!((areas[2] - 8.0).abs() < 1e-6);
    }

    #[test]
    fn branched_cut_produces_three_sectors() {
        let (mut mesh, cell) = square_face();

        // three strips meeting at the centre: a Y cut
        let cont = ContactCurve {
            points: vec![
                p(2.0, 2.0, 0.0), // centre, branched
                p(2.0, 0.0, 0.0),
                p(4.0, 2.0, 0.0),
                p(0.0, 2.0, 0.0),
            ],
            segs: vec![seg(1, 0, cell), seg(2, 0, cell), seg(3, 0, cell)],
        };

        let mut ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        assert_eq!(ps[&cell].pts[&0].capt, Capt::Branched);

        cut_cells(&mut mesh, &mut ps).unwrap();

        let live = mesh.cell_ids();
        assert_eq!(live.len(), 3);

        let up = Vector3::new(0.0, 0.0, 1.0);
        let total: f64 = live
            .iter()
            .map(|&id| polygon_area(&mesh.cell_points(id), &up))
            .sum();
        assert!((total - 16.0).abs() < 1e-6);
    }

    #[test]
    fn closed_interior_strip_becomes_hole_and_island() {
        let (mut mesh, cell) = square_face();

        // a triangular loop strictly inside the face
        let cont = ContactCurve {
            points: vec![
                p(1.5, 1.5, 0.0),
                p(2.5, 1.5, 0.0),
                p(2.0, 2.5, 0.0),
            ],
            segs: vec![seg(0, 1, cell), seg(1, 2, cell), seg(2, 0, cell)],
        };

        let mut ps = get_poly_strips(&mesh, &cont, SurfaceSide::A).unwrap();
        cut_cells(&mut mesh, &mut ps).unwrap();

        let live = mesh.cell_ids();
        assert_eq!(live.len(), 2);

        let up = Vector3::new(0.0, 0.0, 1.0);
        let mut areas: Vec<f64> = live
            .iter()
            .map(|&id| polygon_area(&mesh.cell_points(id), &up))
            .collect();
        areas.sort_by(|x, y| x.partial_cmp(y).unwrap());

        // island triangle and outer polygon with the keyhole bridge
        assert!((areas[0] - 0.5).abs() < 1e-6);
        assert!((areas[1] - 15.5).abs() < 1e-6);
    }
}
