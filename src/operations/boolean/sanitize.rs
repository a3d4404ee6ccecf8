use slotmap::SecondaryMap;
use tracing::debug;

use crate::error::{BooleanError, Result};
use crate::math::base::Base;
use crate::math::polygon_2d::point_in_polygon;
use crate::math::{Point2, Point3, Vector3, TOL};
use crate::mesh::cell_tree::{Aabb, CellTree};
use crate::mesh::locator::PointLocator;
use crate::mesh::{CellId, PointId, PolyMesh};

/// A cleaned, editable copy of an input surface.
pub struct CleanInput {
    pub mesh: PolyMesh,
    /// Cleaned cell -> index of the input face it came from.
    pub input_index: SecondaryMap<CellId, usize>,
}

/// Produces a cleaned copy of an input mesh: coincident points merged,
/// collapsed cells dropped, and the input face index recorded per cell.
#[must_use]
pub fn cleaned_copy(input: &PolyMesh) -> CleanInput {
    let locator = PointLocator::build(input);

    let mut mesh = PolyMesh::new();
    let mut mapped: SecondaryMap<PointId, PointId> = SecondaryMap::new();

    for (id, p) in input.iter_points() {
        if mapped.contains_key(id) {
            continue;
        }
        let merged = mesh.add_point(*p);
        for twin in locator.find_points(p) {
            mapped.entry(twin).unwrap().or_insert(merged);
        }
        // the representative always maps to itself
        mapped.insert(id, merged);
    }

    let mut input_index: SecondaryMap<CellId, usize> = SecondaryMap::new();

    for (index, (_, cell)) in input.iter_cells().enumerate() {
        let mut verts: Vec<PointId> = Vec::with_capacity(cell.verts.len());
        for &v in &cell.verts {
            let m = mapped[v];
            if verts.last() != Some(&m) {
                verts.push(m);
            }
        }
        while verts.len() > 1 && verts.first() == verts.last() {
            verts.pop();
        }
        if verts.len() < 3 {
            continue;
        }

        let id = mesh.add_cell(verts);
        input_index.insert(id, index);
    }

    CleanInput { mesh, input_index }
}

/// Displaces points of either surface that sit within capture tolerance of
/// the other surface's face or edge interiors.
///
/// Two contact points snapping onto such a point would collapse to one
/// coordinate later in the pipeline. Vertex-on-vertex coincidence is left
/// alone: sub-vertex capture resolves it exactly.
///
/// # Errors
///
/// Returns [`BooleanError::EqualCaptPoints`] if a displaced point still
/// conflicts afterwards.
pub fn prevent_equal_capt_points(a: &mut PolyMesh, b: &mut PolyMesh) -> Result<()> {
    let moved_a = perturb_against(a, b);
    let moved_b = perturb_against(b, a);

    if moved_a + moved_b > 0 {
        debug!(moved_a, moved_b, "displaced near-coincident input points");

        if perturb_against(a, b) > 0 || perturb_against(b, a) > 0 {
            return Err(BooleanError::EqualCaptPoints);
        }
    }

    Ok(())
}

/// Moves offending points of `mesh` off the faces of `other`; returns how
/// many points were displaced.
fn perturb_against(mesh: &mut PolyMesh, other: &PolyMesh) -> usize {
    let tree = CellTree::build(other);
    let mut moved = 0;

    let ids: Vec<PointId> = mesh.iter_points().map(|(id, _)| id).collect();

    for id in ids {
        let p = mesh.point(id);
        let query = Aabb::from_points(&[p]);

        for cell in tree.candidates(&query) {
            let poly = other.cell_points(cell);

            if let Some(dir) = capture_conflict(&p, &poly) {
                mesh.set_point(id, p + dir * (2.0 * TOL));
                moved += 1;
                break;
            }
        }
    }

    moved
}

/// Tests a point against one face of the other surface.
///
/// Returns the displacement direction when the point lies within `TOL` of
/// the face's interior or of an edge interior, and `None` when it is clear
/// of the face or coincides with one of its vertices.
fn capture_conflict(p: &Point3, poly: &[Point3]) -> Option<Vector3> {
    for v in poly {
        if (p - v).norm() < TOL {
            return None;
        }
    }

    let base = Base::new(poly);
    let dist = (p - poly[0]).dot(&base.n);

    if dist.abs() >= TOL {
        return None;
    }

    // edge interiors first
    let len = poly.len();
    for i in 0..len {
        let a = &poly[i];
        let b = &poly[(i + 1) % len];
        let u = b - a;
        let t = (p - a).dot(&u) / u.norm_squared();
        if t > 0.0 && t < 1.0 {
            let foot = a + u * t;
            if (p - foot).norm() < TOL {
                return Some(escape_direction(&base.n, dist));
            }
        }
    }

    // face interior
    let uv = base.project(p);
    let poly_2d: Vec<Point2> = poly.iter().map(|q| base.project(q)).collect();
    if point_in_polygon(&uv, &poly_2d) {
        return Some(escape_direction(&base.n, dist));
    }

    None
}

/// Off-plane escape direction: away from the plane along its normal, with
/// an arbitrary but fixed side for a point lying exactly on it.
fn escape_direction(n: &Vector3, dist: f64) -> Vector3 {
    let sign = if dist >= 0.0 { 1.0 } else { -1.0 };
    n * sign
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn square(mesh: &mut PolyMesh, z: f64) -> CellId {
        let a = mesh.add_point(p(0.0, 0.0, z));
        let b = mesh.add_point(p(4.0, 0.0, z));
        let c = mesh.add_point(p(4.0, 4.0, z));
        let d = mesh.add_point(p(0.0, 4.0, z));
        mesh.add_cell(vec![a, b, c, d])
    }

    #[test]
    fn cleaned_copy_merges_duplicate_points() {
        let mut input = PolyMesh::new();
        let a = input.add_point(p(0.0, 0.0, 0.0));
        let b = input.add_point(p(1.0, 0.0, 0.0));
        let c = input.add_point(p(1.0, 1.0, 0.0));
        input.add_cell(vec![a, b, c]);

        // second triangle re-states two coordinates with its own points
        let b2 = input.add_point(p(1.0, 0.0, 0.0));
        let c2 = input.add_point(p(1.0, 1.0, 0.0));
        let d = input.add_point(p(2.0, 0.5, 0.0));
        input.add_cell(vec![b2, d, c2]);

        let clean = cleaned_copy(&input);
        assert_eq!(clean.mesh.num_points(), 4);
        assert_eq!(clean.mesh.num_cells(), 2);

        let indices: Vec<usize> = clean
            .mesh
            .iter_cells()
            .map(|(id, _)| clean.input_index[id])
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn cleaned_copy_drops_collapsed_cells() {
        let mut input = PolyMesh::new();
        let a = input.add_point(p(0.0, 0.0, 0.0));
        let b = input.add_point(p(1.0, 0.0, 0.0));
        let b2 = input.add_point(p(1.0, 0.0, 0.0));
        input.add_cell(vec![a, b, b2]);

        let clean = cleaned_copy(&input);
        assert_eq!(clean.mesh.num_cells(), 0);
    }

    #[test]
    fn vertex_on_face_interior_is_displaced() {
        let mut a = PolyMesh::new();
        let v = a.add_point(p(2.0, 2.0, 0.0));
        let w = a.add_point(p(2.0, 2.0, 3.0));
        let x = a.add_point(p(5.0, 2.0, 3.0));
        a.add_cell(vec![v, w, x]);

        let mut b = PolyMesh::new();
        square(&mut b, 0.0);

        prevent_equal_capt_points(&mut a, &mut b).unwrap();

        // the offending point moved off the plane z = 0
        assert!(a.point(v).z.abs() > TOL);
        // the others stayed
        assert!((a.point(w).z - 3.0).abs() < TOL);
    }

    #[test]
    fn vertex_on_vertex_is_left_alone() {
        let mut a = PolyMesh::new();
        let v = a.add_point(p(0.0, 0.0, 0.0));
        let w = a.add_point(p(0.0, -2.0, 3.0));
        let x = a.add_point(p(3.0, -2.0, 3.0));
        a.add_cell(vec![v, w, x]);

        let mut b = PolyMesh::new();
        square(&mut b, 0.0);

        prevent_equal_capt_points(&mut a, &mut b).unwrap();
        assert!((a.point(v) - p(0.0, 0.0, 0.0)).norm() < TOL);
    }
}
