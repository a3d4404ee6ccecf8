use slotmap::SecondaryMap;

use super::{CellId, LinkTable, PointId, PolyMesh};

/// Connected-component labelling of an oriented surface mesh.
///
/// Two cells are connected when they share a point. Every live cell and
/// every point referenced by one gets a region id in `0..count`.
#[derive(Debug, Default)]
pub struct RegionLabels {
    pub point_region: SecondaryMap<PointId, usize>,
    pub cell_region: SecondaryMap<CellId, usize>,
    pub count: usize,
}

/// Labels the connected components of a mesh by flooding the link table.
#[must_use]
pub fn label_regions(mesh: &PolyMesh) -> RegionLabels {
    let links = LinkTable::build(mesh);

    let mut labels = RegionLabels::default();
    let mut stack: Vec<CellId> = Vec::new();

    for (seed, _) in mesh.iter_cells() {
        if labels.cell_region.contains_key(seed) {
            continue;
        }

        let region = labels.count;
        labels.count += 1;

        stack.push(seed);
        labels.cell_region.insert(seed, region);

        while let Some(cell) = stack.pop() {
            for &v in &mesh.cell(cell).verts {
                labels.point_region.insert(v, region);

                for &next in links.cells_of(v) {
                    if !labels.cell_region.contains_key(next) {
                        labels.cell_region.insert(next, region);
                        stack.push(next);
                    }
                }
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    fn add_quad(mesh: &mut PolyMesh, offset: f64) -> (CellId, CellId) {
        let a = mesh.add_point(p(offset, 0.0, 0.0));
        let b = mesh.add_point(p(offset + 1.0, 0.0, 0.0));
        let c = mesh.add_point(p(offset + 1.0, 1.0, 0.0));
        let d = mesh.add_point(p(offset, 1.0, 0.0));
        let e = mesh.add_point(p(offset + 2.0, 0.0, 0.0));
        let f = mesh.add_point(p(offset + 2.0, 1.0, 0.0));

        let first = mesh.add_cell(vec![a, b, c, d]);
        // shares the edge b-c with the first quad
        let second = mesh.add_cell(vec![b, e, f, c]);
        (first, second)
    }

    #[test]
    fn single_component() {
        let mut mesh = PolyMesh::new();
        let (first, second) = add_quad(&mut mesh, 0.0);

        let labels = label_regions(&mesh);
        assert_eq!(labels.count, 1);
        assert_eq!(labels.cell_region[first], labels.cell_region[second]);
    }

    #[test]
    fn two_components() {
        let mut mesh = PolyMesh::new();
        let (a1, _) = add_quad(&mut mesh, 0.0);
        let (b1, _) = add_quad(&mut mesh, 10.0);

        let labels = label_regions(&mesh);
        assert_eq!(labels.count, 2);
        assert_ne!(labels.cell_region[a1], labels.cell_region[b1]);
    }

    #[test]
    fn deleted_cells_do_not_connect() {
        let mut mesh = PolyMesh::new();
        let (first, second) = add_quad(&mut mesh, 0.0);
        mesh.delete_cell(second);

        let labels = label_regions(&mesh);
        assert_eq!(labels.count, 1);
        assert!(labels.cell_region.contains_key(first));
        assert!(!labels.cell_region.contains_key(second));
    }

    #[test]
    fn point_labels_follow_cells() {
        let mut mesh = PolyMesh::new();
        let (first, _) = add_quad(&mut mesh, 0.0);

        let labels = label_regions(&mesh);
        for &v in &mesh.cell(first).verts {
            assert_eq!(labels.point_region[v], labels.cell_region[first]);
        }
    }
}
