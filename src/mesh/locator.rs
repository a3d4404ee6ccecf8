use std::collections::HashMap;

use crate::math::{Point3, TOL};

use super::{PointId, PolyMesh};

/// Uniform hash-grid index over a point set for coincidence queries.
///
/// Coordinates are snapshotted at build time: later edits to the source
/// points do not affect query results, matching the behaviour of a
/// kd-tree locator built once per stage.
#[derive(Debug)]
pub struct PointLocator<K: Copy> {
    cell: f64,
    buckets: HashMap<(i64, i64, i64), Vec<(K, Point3)>>,
}

impl<K: Copy> PointLocator<K> {
    /// Builds the index from `(key, coordinate)` pairs.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (K, Point3)>,
    {
        let points: Vec<(K, Point3)> = points.into_iter().collect();

        // Bucket size scales with the data so clustered inputs do not all
        // land in one bucket; anything >= TOL keeps queries exact.
        let cell = points
            .iter()
            .map(|(_, p)| p.coords.norm())
            .fold(0.0f64, f64::max)
            .max(1.0)
            * 1e-3;

        let mut buckets: HashMap<(i64, i64, i64), Vec<(K, Point3)>> = HashMap::new();
        for (key, p) in points {
            buckets.entry(Self::index(cell, &p)).or_default().push((key, p));
        }

        Self { cell, buckets }
    }

    fn index(cell: f64, p: &Point3) -> (i64, i64, i64) {
        (
            (p.x / cell).floor() as i64,
            (p.y / cell).floor() as i64,
            (p.z / cell).floor() as i64,
        )
    }

    /// All keys whose snapshotted coordinates lie within [`TOL`] of `p`.
    #[must_use]
    pub fn find_points(&self, p: &Point3) -> Vec<K> {
        let (ix, iy, iz) = Self::index(self.cell, p);
        let mut found = Vec::new();

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = self.buckets.get(&(ix + dx, iy + dy, iz + dz)) else {
                        continue;
                    };
                    for (key, q) in bucket {
                        if (q - p).norm() < TOL {
                            found.push(*key);
                        }
                    }
                }
            }
        }

        found
    }
}

impl PointLocator<PointId> {
    /// Builds the index over a mesh's current points.
    #[must_use]
    pub fn build(mesh: &PolyMesh) -> Self {
        Self::from_points(mesh.iter_points().map(|(id, p)| (id, *p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coincident_points_found() {
        let mut mesh = PolyMesh::new();
        let a = mesh.add_point(Point3::new(1.0, 2.0, 3.0));
        let b = mesh.add_point(Point3::new(1.0 + 0.5e-5, 2.0, 3.0));
        let _far = mesh.add_point(Point3::new(1.1, 2.0, 3.0));

        let loc = PointLocator::build(&mesh);
        let mut found = loc.find_points(&Point3::new(1.0, 2.0, 3.0));
        found.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn snapshot_ignores_later_edits() {
        let mut mesh = PolyMesh::new();
        let a = mesh.add_point(Point3::new(0.0, 0.0, 0.0));

        let loc = PointLocator::build(&mesh);
        mesh.set_point(a, Point3::new(9.0, 9.0, 9.0));

        assert_eq!(loc.find_points(&Point3::new(0.0, 0.0, 0.0)), vec![a]);
        assert!(loc.find_points(&Point3::new(9.0, 9.0, 9.0)).is_empty());
    }

    #[test]
    fn query_across_bucket_boundary() {
        let pts = vec![(0usize, Point3::new(0.9999999, 0.0, 0.0))];
        let loc = PointLocator::from_points(pts);
        assert_eq!(loc.find_points(&Point3::new(1.0, 0.0, 0.0)), vec![0]);
    }
}
