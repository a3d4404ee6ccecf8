use crate::math::{Point3, TOL};

use super::{CellId, PolyMesh};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    /// Smallest box containing `points`, inflated by the coincidence
    /// tolerance so borderline contacts are not filtered away.
    #[must_use]
    pub fn from_points(points: &[Point3]) -> Self {
        let mut min = points[0];
        let mut max = points[0];
        for p in &points[1..] {
            min = Point3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Point3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        Self {
            min: Point3::new(min.x - TOL, min.y - TOL, min.z - TOL),
            max: Point3::new(max.x + TOL, max.y + TOL, max.z + TOL),
        }
    }

    fn merge(&self, other: &Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Box overlap test.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    fn center(&self, axis: usize) -> f64 {
        (self.min[axis] + self.max[axis]) * 0.5
    }

    fn longest_axis(&self) -> usize {
        let d = self.max - self.min;
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }
}

enum Node {
    Leaf {
        start: usize,
        len: usize,
    },
    Branch {
        aabb: Aabb,
        left: usize,
        right: usize,
    },
}

/// Bounding-box hierarchy over the live cells of a mesh, used as the
/// broadphase for candidate face-pair queries.
pub struct CellTree {
    nodes: Vec<Node>,
    items: Vec<(CellId, Aabb)>,
    root: Option<usize>,
}

const LEAF_SIZE: usize = 4;

impl CellTree {
    /// Builds the tree by recursive median split along the longest axis.
    #[must_use]
    pub fn build(mesh: &PolyMesh) -> Self {
        let mut items: Vec<(CellId, Aabb)> = mesh
            .iter_cells()
            .map(|(id, _)| (id, Aabb::from_points(&mesh.cell_points(id))))
            .collect();

        let mut tree = Self {
            nodes: Vec::new(),
            items: Vec::new(),
            root: None,
        };

        if items.is_empty() {
            return tree;
        }

        let len = items.len();
        tree.root = Some(Self::split(&mut tree.nodes, &mut items, 0, len));
        tree.items = items;
        tree
    }

    fn split(
        nodes: &mut Vec<Node>,
        items: &mut [(CellId, Aabb)],
        start: usize,
        len: usize,
    ) -> usize {
        let slice = &mut items[start..start + len];
        let bounds = slice[1..]
            .iter()
            .fold(slice[0].1, |acc, (_, b)| acc.merge(b));

        if len <= LEAF_SIZE {
            nodes.push(Node::Leaf { start, len });
            return nodes.len() - 1;
        }

        let axis = bounds.longest_axis();
        slice.sort_by(|a, b| {
            a.1.center(axis)
                .partial_cmp(&b.1.center(axis))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mid = len / 2;
        let left = Self::split(nodes, items, start, mid);
        let right = Self::split(nodes, items, start + mid, len - mid);

        nodes.push(Node::Branch {
            aabb: bounds,
            left,
            right,
        });
        nodes.len() - 1
    }

    /// Cells whose bounding box overlaps `query`.
    #[must_use]
    pub fn candidates(&self, query: &Aabb) -> Vec<CellId> {
        let mut found = Vec::new();
        let Some(root) = self.root else {
            return found;
        };

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                Node::Leaf { start, len } => {
                    for (id, aabb) in &self.items[*start..*start + *len] {
                        if aabb.overlaps(query) {
                            found.push(*id);
                        }
                    }
                }
                Node::Branch { aabb, left, right } => {
                    if aabb.overlaps(query) {
                        stack.push(*left);
                        stack.push(*right);
                    }
                }
            }
        }

        found
    }
}
