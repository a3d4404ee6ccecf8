use std::collections::{BTreeMap, HashSet, VecDeque};

use tracing::debug;

use crate::math::{Point3, PointKey};
use crate::mesh::locator::PointLocator;
use crate::mesh::{CellId, LinkTable, PointId, PolyMesh};

use super::contact::ContactCurve;
use super::strips::{Capt, PolyStripsMap, StripPt, SurfaceSide};

/// Snaps the coordinates of boundary-captured points back to the contact
/// coordinate they came from.
///
/// Cutting used the snapped coordinates for exactness; afterwards the
/// surface's own vertices must not stay pulled onto the capture targets.
pub fn restore_orig_points(mesh: &mut PolyMesh, poly_strips: &PolyStripsMap) {
    let locator = PointLocator::build(mesh);

    for pstrips in poly_strips.values() {
        for sp in pstrips.pts.values() {
            if sp.capt.is_boundary() {
                for id in locator.find_points(&sp.cut_pt) {
                    mesh.set_point(id, sp.pt);
                }
            }
        }
    }
}

/// Splits the shared boundary vertex where two strips captured the same
/// face vertex from adjacent edges.
pub fn resolve_overlaps(
    mesh: &mut PolyMesh,
    cont: &ContactCurve,
    poly_strips: &PolyStripsMap,
) {
    let links = LinkTable::build(mesh);

    let mut by_ind: BTreeMap<usize, Vec<StripPt>> = BTreeMap::new();

    for pstrips in poly_strips.values() {
        for sp in pstrips.pts.values() {
            if sp.capt == Capt::Edge {
                by_ind.entry(sp.ind).or_default().push(sp.clone());
            }
        }
    }

    for (&ind, pairs) in &by_ind {
        if pairs.len() != 2 {
            continue;
        }

        let (first, second) = (&pairs[0], &pairs[1]);
        let (pa, pb) = if first.edge.expect("edge capture")[1]
            == second.edge.expect("edge capture")[0]
        {
            (first, second)
        } else {
            (second, first)
        };

        let edge_a = pa.edge.expect("edge capture");
        let edge_b = pb.edge.expect("edge capture");

        if edge_a[1] != edge_b[0] || edge_a[0] == edge_b[1] {
            continue;
        }

        // neighbours of the shared vertex along the two edges
        let mut run_a: Vec<&StripPt> = edge_points(poly_strips, pa.poly_id, edge_a);
        let mut run_b: Vec<&StripPt> = edge_points(poly_strips, pb.poly_id, edge_b);

        if run_a.last().map(|sp| sp.ind) != Some(ind)
            || run_b.first().map(|sp| sp.ind) != Some(ind)
        {
            continue;
        }

        run_a.pop();
        run_b.remove(0);

        let before = run_a
            .last()
            .map_or_else(|| mesh.point(edge_a[0]), |sp| sp.pt);
        let after = run_b
            .first()
            .map_or_else(|| mesh.point(edge_b[1]), |sp| sp.pt);

        let key_before = PointKey::new(&before);
        let key_after = PointKey::new(&after);

        // the incident face holding both surrounding coordinates gets a
        // fresh copy of the shared vertex
        for &cell in links.cells_of(edge_a[1]) {
            if !mesh.is_live(cell) {
                continue;
            }
            let keys: Vec<PointKey> = mesh
                .cell_points(cell)
                .iter()
                .map(PointKey::new)
                .collect();

            if keys.contains(&key_before) && keys.contains(&key_after) {
                let fresh = mesh.add_point(cont.points[ind]);
                mesh.replace_cell_point(cell, edge_a[1], fresh);
                debug!(?cell, "resolved overlapping capture");
                break;
            }
        }
    }
}

/// All edge captures of a face on a given directed edge, ordered by `t`.
fn edge_points<'a>(
    poly_strips: &'a PolyStripsMap,
    cell: CellId,
    edge: [PointId; 2],
) -> Vec<&'a StripPt> {
    let mut run: Vec<&StripPt> = poly_strips[&cell]
        .pts
        .values()
        .filter(|sp| sp.edge == Some(edge))
        .collect();
    run.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap_or(std::cmp::Ordering::Equal));
    run
}

/// A position on an edge walk: a captured contact point or an edge
/// endpoint sentinel.
struct WalkPt {
    ind: Option<usize>,
    t: f64,
    pt: Point3,
}

/// Inserts the captured points of each cut edge into the neighbouring
/// face's ring, closing the T-junctions the cut created.
pub fn add_adjacent_points(
    mesh: &mut PolyMesh,
    cont: &ContactCurve,
    poly_strips: &PolyStripsMap,
    side: SurfaceSide,
) {
    let locator = PointLocator::build(mesh);
    let mut links = LinkTable::build(mesh);

    for pstrips in poly_strips.values() {
        let mut edge_pts: BTreeMap<(PointId, PointId), Vec<WalkPt>> = BTreeMap::new();

        for sp in pstrips.pts.values() {
            if sp.capt == Capt::Edge {
                let edge = sp.edge.expect("edge capture");
                edge_pts.entry((edge[0], edge[1])).or_default().push(WalkPt {
                    ind: Some(sp.ind),
                    t: sp.t,
                    pt: sp.pt,
                });
            }
        }

        for ((ea, eb), mut walk) in edge_pts {
            walk.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap_or(std::cmp::Ordering::Equal));
            walk.dedup_by(|a, b| a.t == b.t);

            if walk.first().map_or(true, |w| w.t != 0.0) {
                walk.insert(
                    0,
                    WalkPt {
                        ind: None,
                        t: 0.0,
                        pt: mesh.point(ea),
                    },
                );
            }
            if walk.last().map_or(true, |w| w.t != 1.0) {
                walk.push(WalkPt {
                    ind: None,
                    t: 1.0,
                    pt: mesh.point(eb),
                });
            }

            // walk from the far endpoint back, in runs not subdivided by
            // another contact line
            walk.reverse();

            let mut ia = 0usize;
            while ia + 1 < walk.len() {
                let mut ib = ia + 1;

                while ib + 1 < walk.len() {
                    let ind = walk[ib].ind.expect("interior walk points are captures");
                    let involved: HashSet<CellId> = cont
                        .segments_of_point(ind)
                        .into_iter()
                        .map(|s| side_cell(&cont.segs[s], side))
                        .collect();

                    if involved.len() > 1 {
                        break;
                    }
                    ib += 1;
                }

                if ia + 1 != ib {
                    insert_run(mesh, &locator, &mut links, &walk, ia, ib);
                }

                ia = ib;
            }
        }
    }
}

fn side_cell(seg: &super::contact::ContactSeg, side: SurfaceSide) -> CellId {
    match side {
        SurfaceSide::A => seg.cell_a,
        SurfaceSide::B => seg.cell_b,
    }
}

/// Rebuilds the neighbour face that spans a run of captured points.
fn insert_run(
    mesh: &mut PolyMesh,
    locator: &PointLocator<PointId>,
    links: &mut LinkTable,
    walk: &[WalkPt],
    ia: usize,
    ib: usize,
) {
    let pts_a = locator.find_points(&walk[ia].pt);
    let pts_b = locator.find_points(&walk[ib].pt);

    let polys_a: Vec<(CellId, PointId)> = pts_a
        .iter()
        .flat_map(|&pt| links.cells_of(pt).iter().map(move |&c| (c, pt)))
        .collect();
    let polys_b: Vec<(CellId, PointId)> = pts_b
        .iter()
        .flat_map(|&pt| links.cells_of(pt).iter().map(move |&c| (c, pt)))
        .collect();

    for &(cell_a, pa) in &polys_a {
        for &(cell_b, pb) in &polys_b {
            if cell_a != cell_b || !mesh.is_live(cell_a) {
                continue;
            }

            let verts = mesh.cell(cell_a).verts.clone();
            let n = verts.len();

            let mut matched = false;
            let mut new_poly: Vec<PointId> = Vec::with_capacity(n + ib - ia - 1);

            for i in 0..n {
                new_poly.push(verts[i]);

                let id_a = verts[i];
                let id_b = verts[(i + 1) % n];

                if pa == id_a && pb == id_b {
                    matched = true;
                    for w in &walk[ia + 1..ib] {
                        new_poly.push(mesh.add_point(w.pt));
                    }
                }
            }

            if !matched {
                continue;
            }

            let orig = mesh.cell(cell_a).orig;
            mesh.delete_cell(cell_a);
            links.remove_cell(cell_a, &verts);

            let new_id = mesh.add_cell_with_orig(new_poly.clone(), orig);
            links.add_cell(new_id, &new_poly);

            debug!(?cell_a, inserted = ib - ia - 1, "added adjacent points");
            break;
        }
    }
}

/// Gives every face that shares a vertex-captured point its own copy of
/// that point, so regions can separate along the cut.
pub fn disjoin_polys(mesh: &mut PolyMesh, poly_strips: &PolyStripsMap) {
    let locator = PointLocator::build(mesh);
    let links = LinkTable::build(mesh);

    let mut ends: BTreeMap<usize, StripPt> = BTreeMap::new();

    for pstrips in poly_strips.values() {
        for sp in pstrips.pts.values() {
            if sp.capt == Capt::A {
                ends.entry(sp.ind).or_insert_with(|| sp.clone());
            }
        }
    }

    for sp in ends.values() {
        for pt in locator.find_points(&sp.pt) {
            let cells: Vec<CellId> = links
                .cells_of(pt)
                .iter()
                .copied()
                .filter(|&c| mesh.is_live(c))
                .collect();

            if cells.len() > 1 {
                for cell in cells {
                    let fresh = mesh.add_point(sp.pt);
                    mesh.replace_cell_point(cell, pt, fresh);
                }
            }
        }
    }
}

/// Collapses vertex copies that ended up on the same side of the cut
/// after all the splitting.
pub fn merge_points(mesh: &mut PolyMesh, cont: &ContactCurve, poly_strips: &PolyStripsMap) {
    let locator = PointLocator::build(mesh);
    let links = LinkTable::build(mesh);

    // mesh points coincident with each strip end's inner neighbour
    let mut neigh_pts: BTreeMap<usize, HashSet<PointId>> = BTreeMap::new();

    for pstrips in poly_strips.values() {
        for strip in &pstrips.strips {
            if strip.len() < 2 {
                continue;
            }

            let front = strip.front().expect("strip non-empty").ind;
            let back = strip.back().expect("strip non-empty").ind;

            let before_front = &pstrips.pts[&strip[1].ind];
            let before_back = &pstrips.pts[&strip[strip.len() - 2].ind];

            neigh_pts
                .entry(front)
                .or_default()
                .extend(locator.find_points(&before_front.pt));
            neigh_pts
                .entry(back)
                .or_default()
                .extend(locator.find_points(&before_back.pt));
        }
    }

    for (&ind, inds) in &neigh_pts {
        let mut pairs: BTreeMap<PointKey, Vec<(CellId, PointId)>> = BTreeMap::new();

        for pt in locator.find_points(&cont.points[ind]) {
            let Some(&cell) = links
                .cells_of(pt)
                .iter()
                .find(|&&c| mesh.is_live(c))
            else {
                continue;
            };

            let verts = &mesh.cell(cell).verts;
            let Some(j) = verts.iter().position(|&v| v == pt) else {
                continue;
            };
            let n = verts.len();

            let before = verts[if j == 0 { n - 1 } else { j - 1 }];
            let after = verts[(j + 1) % n];

            if !inds.contains(&before) {
                pairs
                    .entry(PointKey::new(&mesh.point(before)))
                    .or_default()
                    .push((cell, pt));
            }
            if !inds.contains(&after) {
                pairs
                    .entry(PointKey::new(&mesh.point(after)))
                    .or_default()
                    .push((cell, pt));
            }
        }

        let mut pending: VecDeque<VecDeque<(CellId, PointId)>> = pairs
            .values()
            .filter(|v| v.len() == 2)
            .map(|v| VecDeque::from([v[0], v[1]]))
            .collect();

        let mut group: VecDeque<(CellId, PointId)> = VecDeque::new();

        while !pending.is_empty() {
            if group.is_empty() {
                group = pending.pop_front().expect("pending non-empty");
            }

            let mut i = 0;
            while i < pending.len() {
                let next = &pending[i];
                let (nf, nb) = (*next.front().unwrap(), *next.back().unwrap());
                let (gf, gb) = (*group.front().unwrap(), *group.back().unwrap());

                if nf == gf {
                    group.push_front(nb);
                } else if nf == gb {
                    group.push_back(nb);
                } else if nb == gf {
                    group.push_front(nf);
                } else if nb == gb {
                    group.push_back(nf);
                } else {
                    i += 1;
                    continue;
                }
                pending.remove(i);
                i = 0;
            }

            let rep = group.front().expect("group non-empty").1;
            for &(cell, pt) in group.iter().skip(1) {
                mesh.replace_cell_point(cell, pt, rep);
            }
            group.clear();
        }
    }
}
