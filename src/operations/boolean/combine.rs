use std::collections::{BTreeMap, HashSet};

use slotmap::SecondaryMap;
use tracing::debug;

use crate::error::{BooleanError, Result};
use crate::math::base::angle_about;
use crate::math::{Vector3, CONGR_EPS};
use crate::mesh::connectivity::{label_regions, RegionLabels};
use crate::mesh::locator::PointLocator;
use crate::mesh::{CellId, LinkTable, PointId, PolyMesh};

use super::contact::ContactCurve;
use super::{BooleanOp, BooleanOutput, FaceOrigin};

/// Side of the cut a region falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loc {
    None,
    Inside,
    Outside,
}

/// Geometric alignment of two faces meeting at a contact edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Congr {
    Equal,
    Opposite,
    Not,
}

/// One face flanking a contact edge, with its local frame.
#[derive(Debug, Clone)]
struct PolyAtEdge {
    cell: CellId,
    pt_a: PointId,
    n: Vector3,
    e: Vector3,
    r: Vector3,
    loc: Loc,
}

impl PolyAtEdge {
    fn new(pd: &PolyMesh, cell: CellId, pt_a: PointId, pt_b: PointId) -> Self {
        let a = pd.point(pt_a);
        let b = pd.point(pt_b);

        let e = (b - a).normalize();
        let n = pd.cell_normal(cell);
        let r = e.cross(&n);

        Self {
            cell,
            pt_a,
            n,
            e,
            r,
            loc: Loc::None,
        }
    }

    fn is_congruent(&self, other: &PolyAtEdge) -> Congr {
        let cong = self.n.dot(&other.n);

        if cong > CONGR_EPS || cong < -CONGR_EPS {
            let ang = self.r.dot(&other.r);

            if ang > CONGR_EPS {
                if cong > CONGR_EPS {
                    return Congr::Equal;
                }
                return Congr::Opposite;
            }
        }

        Congr::Not
    }
}

/// The two faces flanking a contact edge on one surface.
#[derive(Debug, Clone)]
struct PolyPair {
    pa: PolyAtEdge,
    pb: PolyAtEdge,
}

impl PolyPair {
    /// Classifies a face of the opposite surface against this pair.
    fn get_loc(&mut self, pt: &mut PolyAtEdge, op: BooleanOp) {
        let ca = self.pa.is_congruent(pt);
        let cb = self.pb.is_congruent(pt);

        if ca != Congr::Not {
            if ca == Congr::Opposite {
                if op == BooleanOp::Intersection {
                    self.pa.loc = Loc::Outside;
                    pt.loc = Loc::Outside;
                } else {
                    self.pa.loc = Loc::Inside;
                    pt.loc = Loc::Inside;
                }
            } else if op == BooleanOp::Union || op == BooleanOp::Intersection {
                self.pa.loc = Loc::Inside;
                pt.loc = Loc::Outside;
            }
        } else if cb != Congr::Not {
            if cb == Congr::Opposite {
                if op == BooleanOp::Intersection {
                    self.pb.loc = Loc::Outside;
                    pt.loc = Loc::Outside;
                } else {
                    self.pb.loc = Loc::Inside;
                    pt.loc = Loc::Inside;
                }
            } else if op == BooleanOp::Union || op == BooleanOp::Intersection {
                self.pb.loc = Loc::Inside;
                pt.loc = Loc::Outside;
            }
        } else {
            let alpha = angle_about(&self.pa.r, &self.pb.r, &self.pa.e);
            let beta = angle_about(&self.pa.r, &pt.r, &self.pa.e);

            pt.loc = if beta > alpha { Loc::Inside } else { Loc::Outside };
        }
    }
}

/// Finds the two faces flanking the contact edge whose endpoints coincide
/// with `pts_a` and `pts_b`.
fn get_edge_polys(
    pd: &PolyMesh,
    links: &LinkTable,
    pts_a: &[PointId],
    pts_b: &[PointId],
) -> Option<PolyPair> {
    let mut cell_pts: BTreeMap<CellId, Vec<PointId>> = BTreeMap::new();

    for &pt in pts_a.iter().chain(pts_b.iter()) {
        for &cell in links.cells_of(pt) {
            cell_pts.entry(cell).or_default().push(pt);
        }
    }

    let mut opp: Vec<PolyAtEdge> = Vec::new();

    for (&cell, pts) in &cell_pts {
        if pts.len() < 2 {
            continue;
        }

        let verts = &pd.cell(cell).verts;
        let n = verts.len();

        for i in 0..n {
            let a = verts[i];
            let b = verts[(i + 1) % n];

            if pts.contains(&a) && pts.contains(&b) {
                opp.push(PolyAtEdge::new(pd, cell, a, b));
            }
        }
    }

    if opp.len() != 2 {
        return None;
    }

    let mut it = opp.into_iter();
    let pa = it.next().expect("two entries");
    let pb = it.next().expect("two entries");

    debug!(cell_a = ?pa.cell, cell_b = ?pb.cell, "flanking faces at contact edge");

    Some(PolyPair { pa, pb })
}

/// Copies the selected regions of one cut surface into the result,
/// reversing classified inside regions and attaching provenance and user
/// data per face.
#[allow(clippy::too_many_arguments)]
fn append_side(
    pd: &PolyMesh,
    labels: &RegionLabels,
    sel: &HashSet<usize>,
    locs: &BTreeMap<usize, Loc>,
    rev: bool,
    ctx: &SurfaceContext,
    input_cells: &[CellId],
    to_origin: fn(usize) -> FaceOrigin,
    result: &mut PolyMesh,
    origins: &mut SecondaryMap<CellId, FaceOrigin>,
) {
    let mut remap: SecondaryMap<PointId, PointId> = SecondaryMap::new();

    for (cell, data) in pd.iter_cells() {
        let region = labels.cell_region[cell];
        if !sel.contains(&region) {
            continue;
        }

        let mut verts: Vec<PointId> = data
            .verts
            .iter()
            .map(|&v| {
                *remap
                    .entry(v)
                    .expect("point id valid")
                    .or_insert_with(|| result.add_point(pd.point(v)))
            })
            .collect();

        if rev && locs.contains_key(&region) {
            verts.reverse();
        }

        let new_cell = result.add_cell(verts);

        let index = ctx.input_index[data.orig];
        origins.insert(new_cell, to_origin(index));

        let input_cell = input_cells[index];
        for (name, arr) in &ctx.input.cell_data {
            if let Some(&value) = arr.get(input_cell) {
                result
                    .cell_data
                    .entry(name.clone())
                    .or_default()
                    .insert(new_cell, value);
            }
        }
    }
}

/// Context of one input surface needed for provenance and user data.
pub struct SurfaceContext<'a> {
    /// The cut surface after all topological rewrites.
    pub modified: &'a PolyMesh,
    /// The original input surface.
    pub input: &'a PolyMesh,
    /// Sanitized cell -> index of the input face.
    pub input_index: &'a SecondaryMap<CellId, usize>,
}

/// Labels the regions of both cut surfaces against each other and emits
/// the subset selected by the operation.
///
/// # Errors
///
/// [`BooleanError::RegionClassifyFailed`] when a contact segment cannot
/// locate its two flanking faces on both surfaces.
pub fn combine_regions(
    ctx_a: &SurfaceContext,
    ctx_b: &SurfaceContext,
    cont: &ContactCurve,
    op: BooleanOp,
) -> Result<BooleanOutput> {
    let mut pd_a = ctx_a.modified.clone();
    pd_a.compact();
    pd_a.remove_unused_points();

    let mut pd_b = ctx_b.modified.clone();
    pd_b.compact();
    pd_b.remove_unused_points();

    let labels_a = label_regions(&pd_a);
    let labels_b = label_regions(&pd_b);

    let mut contact = cont.clone();
    contact.compact();

    if op == BooleanOp::None {
        let regions = labels_a;
        return Ok(BooleanOutput {
            result: pd_a,
            complement: pd_b,
            contact,
            origins: SecondaryMap::new(),
            regions,
        });
    }

    let loc_a = PointLocator::build(&pd_a);
    let loc_b = PointLocator::build(&pd_b);
    let links_a = LinkTable::build(&pd_a);
    let links_b = LinkTable::build(&pd_b);

    let mut locs_a: BTreeMap<usize, Loc> = BTreeMap::new();
    let mut locs_b: BTreeMap<usize, Loc> = BTreeMap::new();

    for seg in &contact.segs {
        let pt_a = contact.points[seg.a];
        let pt_b = contact.points[seg.b];

        let fpts_a = loc_a.find_points(&pt_a);
        let fpts_b = loc_b.find_points(&pt_a);

        // regions already located on both surfaces need no second look
        let not_located = fpts_a
            .iter()
            .filter(|&&pt| !locs_a.contains_key(&labels_a.point_region[pt]))
            .count()
            + fpts_b
                .iter()
                .filter(|&&pt| !locs_b.contains_key(&labels_b.point_region[pt]))
                .count();

        if not_located == 0 {
            continue;
        }

        let lpts_a = loc_a.find_points(&pt_b);
        let lpts_b = loc_b.find_points(&pt_b);

        let pp_a = get_edge_polys(&pd_a, &links_a, &fpts_a, &lpts_a);
        let pp_b = get_edge_polys(&pd_b, &links_b, &fpts_b, &lpts_b);

        let (Some(mut pp_a), Some(mut pp_b)) = (pp_a, pp_b) else {
            return Err(BooleanError::RegionClassifyFailed);
        };

        pp_b.get_loc(&mut pp_a.pa, op);
        pp_b.get_loc(&mut pp_a.pb, op);
        pp_a.get_loc(&mut pp_b.pa, op);
        pp_a.get_loc(&mut pp_b.pb, op);

        locs_a
            .entry(labels_a.point_region[pp_a.pa.pt_a])
            .or_insert(pp_a.pa.loc);
        locs_a
            .entry(labels_a.point_region[pp_a.pb.pt_a])
            .or_insert(pp_a.pb.loc);

        locs_b
            .entry(labels_b.point_region[pp_b.pa.pt_a])
            .or_insert(pp_b.pa.loc);
        locs_b
            .entry(labels_b.point_region[pp_b.pb.pt_a])
            .or_insert(pp_b.pb.loc);
    }

    debug!(
        regions_a = locs_a.len(),
        regions_b = locs_b.len(),
        "located regions at the contact"
    );

    let comb = match op {
        BooleanOp::Union => (Loc::Outside, Loc::Outside),
        BooleanOp::Intersection => (Loc::Inside, Loc::Inside),
        BooleanOp::DifferenceAB => (Loc::Outside, Loc::Inside),
        BooleanOp::DifferenceBA => (Loc::Inside, Loc::Outside),
        BooleanOp::None => unreachable!("handled above"),
    };

    let mut sel_a: HashSet<usize> = locs_a
        .iter()
        .filter(|(_, &loc)| loc == comb.0)
        .map(|(&r, _)| r)
        .collect();
    let mut sel_b: HashSet<usize> = locs_b
        .iter()
        .filter(|(_, &loc)| loc == comb.1)
        .map(|(&r, _)| r)
        .collect();

    // regions never touched by the contact
    if op == BooleanOp::Union || op == BooleanOp::DifferenceAB {
        for r in 0..labels_a.count {
            if !locs_a.contains_key(&r) {
                sel_a.insert(r);
            }
        }
    }
    if op == BooleanOp::Union || op == BooleanOp::DifferenceBA {
        for r in 0..labels_b.count {
            if !locs_b.contains_key(&r) {
                sel_b.insert(r);
            }
        }
    }

    // inside selections flip so outward normals point outward again
    let rev_a = op != BooleanOp::Intersection && comb.0 == Loc::Inside;
    let rev_b = op != BooleanOp::Intersection && comb.1 == Loc::Inside;

    let mut result = PolyMesh::new();
    let mut origins: SecondaryMap<CellId, FaceOrigin> = SecondaryMap::new();

    let input_cells_a = ctx_a.input.cell_ids();
    let input_cells_b = ctx_b.input.cell_ids();

    append_side(
        &pd_a,
        &labels_a,
        &sel_a,
        &locs_a,
        rev_a,
        ctx_a,
        &input_cells_a,
        FaceOrigin::A,
        &mut result,
        &mut origins,
    );
    append_side(
        &pd_b,
        &labels_b,
        &sel_b,
        &locs_b,
        rev_b,
        ctx_b,
        &input_cells_b,
        FaceOrigin::B,
        &mut result,
        &mut origins,
    );

    let regions = label_regions(&result);

    debug!(
        cells = result.num_cells(),
        regions = regions.count,
        "combined regions"
    );

    Ok(BooleanOutput {
        result,
        complement: PolyMesh::new(),
        contact,
        origins,
        regions,
    })
}
