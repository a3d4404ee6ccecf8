use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{BooleanError, Result};
use crate::math::base::{newell_normal, Base};
use crate::math::polygon_2d::{point_in_polygon, segments_intersect};
use crate::math::{Point2, Point3};
use crate::mesh::{CellId, PointId, PolyMesh};

use super::strips::{Strip, StripPt};

/// Splices the holes of a cut face back into its sub-polygons.
///
/// Each hole is a closed interior chain of contact points. The hole's two
/// sides become real geometry: an island polygon wound like the face, and
/// a keyhole rewrite of the containing sub-polygon where the reversed hole
/// ring is connected to the nearest visible boundary vertex.
///
/// # Errors
///
/// Fails when a hole has no containing sub-polygon or no bridge can be
/// drawn without crossing existing edges.
pub fn merge_holes(
    mesh: &mut PolyMesh,
    base: &Base,
    pts: &BTreeMap<usize, StripPt>,
    holes: &[Strip],
    desc_ids: &[CellId],
    orig_id: CellId,
) -> Result<()> {
    // hole rings, closed duplicate dropped, wound like the face
    let mut rings: Vec<Vec<Point3>> = Vec::new();

    for hole in holes {
        let mut ring: Vec<Point3> = hole
            .iter()
            .take(hole.len().saturating_sub(1))
            .map(|r| pts[&r.ind].cut_pt)
            .collect();

        if ring.len() < 3 {
            continue;
        }

        if newell_normal(&ring).dot(&base.n) < 0.0 {
            ring.reverse();
        }

        rings.push(ring);
    }

    let mut containers: Vec<CellId> = desc_ids.to_vec();

    for (hole_idx, ring) in rings.iter().enumerate() {
        let ring_2d: Vec<Point2> = ring.iter().map(|p| base.project(p)).collect();

        // the sub-polygon containing every hole vertex
        let mut found: Option<(usize, Vec<PointId>, Vec<Point2>)> = None;

        for (ci, &cand) in containers.iter().enumerate() {
            if !mesh.is_live(cand) {
                continue;
            }
            let verts = mesh.cell(cand).verts.clone();
            let poly_2d: Vec<Point2> = verts
                .iter()
                .map(|&id| base.project(&mesh.point(id)))
                .collect();

            if ring_2d.iter().all(|p| point_in_polygon(p, &poly_2d)) {
                found = Some((ci, verts, poly_2d));
                break;
            }
        }

        let Some((ci, outer, outer_2d)) = found else {
            return Err(BooleanError::CutFailed);
        };

        // island: the hole interior as its own face
        let island: Vec<PointId> = ring.iter().map(|&p| mesh.add_point(p)).collect();
        mesh.add_cell_with_orig(island, orig_id);

        // bridge minimizing the connection length without crossing
        // container, own, or sibling hole edges
        let mut best: Option<(f64, usize, usize)> = None;

        for (hi, h) in ring_2d.iter().enumerate() {
            for (vi, v) in outer_2d.iter().enumerate() {
                let d = (h - v).norm_squared();
                if let Some((bd, _, _)) = best {
                    if d >= bd {
                        continue;
                    }
                }

                if bridge_is_clear(h, v, &outer_2d, &ring_2d, &rings, hole_idx, base) {
                    best = Some((d, hi, vi));
                }
            }
        }

        let Some((_, hi, vi)) = best else {
            return Err(BooleanError::CutFailed);
        };

        debug!(hole = hole_idx, "splicing hole through bridge");

        // keyhole: outer ring up to v, the reversed hole cycle, v again
        let keyhole_pts: Vec<PointId> = {
            let mut reversed: Vec<Point3> = ring.clone();
            reversed.reverse();
            let k = reversed.len();
            let start = k - 1 - hi; // position of ring[hi] in the reversed ring

            let mut ids: Vec<PointId> = Vec::with_capacity(outer.len() + k + 2);
            ids.extend_from_slice(&outer[..=vi]);
            for j in 0..=k {
                ids.push(mesh.add_point(reversed[(start + j) % k]));
            }
            ids.extend_from_slice(&outer[vi..]);
            ids
        };

        let old = containers[ci];
        mesh.delete_cell(old);
        let new_cell = mesh.add_cell_with_orig(keyhole_pts, orig_id);
        containers[ci] = new_cell;
    }

    Ok(())
}

/// True when the candidate bridge crosses no existing edge.
fn bridge_is_clear(
    h: &Point2,
    v: &Point2,
    outer: &[Point2],
    ring: &[Point2],
    all_rings: &[Vec<Point3>],
    hole_idx: usize,
    base: &Base,
) -> bool {
    let n = outer.len();
    for i in 0..n {
        if segments_intersect(h, v, &outer[i], &outer[(i + 1) % n]) {
            return false;
        }
    }

    let k = ring.len();
    for i in 0..k {
        if segments_intersect(h, v, &ring[i], &ring[(i + 1) % k]) {
            return false;
        }
    }

    for (ri, other) in all_rings.iter().enumerate() {
        if ri == hole_idx {
            continue;
        }
        let other_2d: Vec<Point2> = other.iter().map(|p| base.project(p)).collect();
        let m = other_2d.len();
        for i in 0..m {
            if segments_intersect(h, v, &other_2d[i], &other_2d[(i + 1) % m]) {
                return false;
            }
        }
    }

    true
}
