pub mod cell_tree;
pub mod connectivity;
pub mod locator;

use std::collections::BTreeMap;

use slotmap::{SecondaryMap, SlotMap};

use crate::math::base::newell_normal;
use crate::math::{Point3, Vector3};

slotmap::new_key_type! {
    /// Stable identifier of a mesh point.
    pub struct PointId;

    /// Stable identifier of a polygonal face.
    pub struct CellId;
}

/// A polygonal face: an ordered ring of point ids.
///
/// Deletion is deferred: a deleted cell keeps its id and vertex list until
/// the next [`PolyMesh::compact`], so stages may keep referring to it.
#[derive(Debug, Clone)]
pub struct Cell {
    pub verts: Vec<PointId>,
    /// Ancestor cell this face descends from through cutting. Self for
    /// faces that existed before any cut.
    pub orig: CellId,
    pub deleted: bool,
}

/// Mutable polygon mesh: a point arena, a cell arena and named per-cell
/// scalar arrays for user data.
#[derive(Debug, Clone, Default)]
pub struct PolyMesh {
    points: SlotMap<PointId, Point3>,
    cells: SlotMap<CellId, Cell>,
    pub cell_data: BTreeMap<String, SecondaryMap<CellId, f64>>,
}

impl PolyMesh {
    /// Creates an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- points ---

    /// Appends a point and returns its id.
    pub fn add_point(&mut self, p: Point3) -> PointId {
        self.points.insert(p)
    }

    /// Coordinates of a point. Panics on a stale id.
    #[must_use]
    pub fn point(&self, id: PointId) -> Point3 {
        self.points[id]
    }

    /// Overwrites the coordinates of a point.
    pub fn set_point(&mut self, id: PointId, p: Point3) {
        self.points[id] = p;
    }

    /// Iterates over all points.
    pub fn iter_points(&self) -> impl Iterator<Item = (PointId, &Point3)> {
        self.points.iter()
    }

    /// Number of live points.
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    // --- cells ---

    /// Appends a face whose ancestor is itself.
    pub fn add_cell(&mut self, verts: Vec<PointId>) -> CellId {
        self.cells.insert_with_key(|key| Cell {
            verts,
            orig: key,
            deleted: false,
        })
    }

    /// Appends a face carrying an explicit ancestor id.
    pub fn add_cell_with_orig(&mut self, verts: Vec<PointId>, orig: CellId) -> CellId {
        self.cells.insert(Cell {
            verts,
            orig,
            deleted: false,
        })
    }

    /// Returns the cell for an id, deleted or not.
    #[must_use]
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    /// Marks a cell as deleted; the slot survives until [`Self::compact`].
    pub fn delete_cell(&mut self, id: CellId) {
        self.cells[id].deleted = true;
    }

    /// True if the id refers to a live (not deleted) cell.
    #[must_use]
    pub fn is_live(&self, id: CellId) -> bool {
        self.cells.get(id).is_some_and(|c| !c.deleted)
    }

    /// Iterates over live cells.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter().filter(|(_, c)| !c.deleted)
    }

    /// Ids of live cells, in arena order.
    #[must_use]
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.iter_cells().map(|(id, _)| id).collect()
    }

    /// Number of live cells.
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.iter_cells().count()
    }

    /// Vertex coordinates of a cell, in ring order.
    #[must_use]
    pub fn cell_points(&self, id: CellId) -> Vec<Point3> {
        self.cells[id]
            .verts
            .iter()
            .map(|&v| self.points[v])
            .collect()
    }

    /// Outward normal of a cell (Newell sum over its ring).
    #[must_use]
    pub fn cell_normal(&self, id: CellId) -> Vector3 {
        newell_normal(&self.cell_points(id))
    }

    /// Reverses the vertex order of a cell, flipping its orientation.
    pub fn reverse_cell(&mut self, id: CellId) {
        self.cells[id].verts.reverse();
    }

    /// Replaces every occurrence of `old` in the cell's ring with `new`.
    pub fn replace_cell_point(&mut self, id: CellId, old: PointId, new: PointId) {
        for v in &mut self.cells[id].verts {
            if *v == old {
                *v = new;
            }
        }
    }

    // --- maintenance ---

    /// Removes deleted cells from the arena.
    pub fn compact(&mut self) {
        self.cells.retain(|_, c| !c.deleted);
    }

    /// Drops points referenced by no live cell.
    pub fn remove_unused_points(&mut self) {
        let mut used: SecondaryMap<PointId, ()> = SecondaryMap::new();
        for (_, cell) in self.cells.iter().filter(|(_, c)| !c.deleted) {
            for &v in &cell.verts {
                used.insert(v, ());
            }
        }
        self.points.retain(|id, _| used.contains_key(id));
    }

    /// Axis-aligned bounds over all points. `None` for an empty mesh.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let mut iter = self.points.values();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for p in iter {
            min = Point3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Point3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        Some((min, max))
    }
}

/// Point to incident-cells table.
///
/// A derived cache: any stage that inserts or deletes cells invalidates
/// it, and the next stage that needs it rebuilds it at entry.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: SecondaryMap<PointId, Vec<CellId>>,
}

impl LinkTable {
    /// Builds the table over the live cells of a mesh.
    #[must_use]
    pub fn build(mesh: &PolyMesh) -> Self {
        let mut links: SecondaryMap<PointId, Vec<CellId>> = SecondaryMap::new();
        for (id, cell) in mesh.iter_cells() {
            for &v in &cell.verts {
                links.entry(v).unwrap().or_default().push(id);
            }
        }
        Self { links }
    }

    /// Cells incident to a point.
    #[must_use]
    pub fn cells_of(&self, p: PointId) -> &[CellId] {
        self.links.get(p).map_or(&[], Vec::as_slice)
    }

    /// Removes a cell's references after its deletion.
    pub fn remove_cell(&mut self, id: CellId, verts: &[PointId]) {
        for &v in verts {
            if let Some(list) = self.links.get_mut(v) {
                list.retain(|&c| c != id);
            }
        }
    }

    /// Registers a newly inserted cell.
    pub fn add_cell(&mut self, id: CellId, verts: &[PointId]) {
        for &v in verts {
            self.links.entry(v).unwrap().or_default().push(id);
        }
    }
}
