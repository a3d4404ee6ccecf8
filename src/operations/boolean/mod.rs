mod combine;
mod contact;
mod cut_cells;
mod merger;
mod refine;
mod sanitize;
mod strips;

use slotmap::SecondaryMap;
use tracing::debug;

use crate::error::Result;
use crate::mesh::connectivity::RegionLabels;
use crate::mesh::{CellId, PolyMesh};

pub use contact::{ContactCurve, ContactSeg};

use combine::SurfaceContext;
use strips::SurfaceSide;

/// The boolean set operation to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    Union,
    Intersection,
    /// A minus B.
    DifferenceAB,
    /// B minus A.
    DifferenceBA,
    /// No combination: return the two cut surfaces and the contact curve.
    None,
}

/// Which input a result face descends from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceOrigin {
    /// Index of the originating face of surface A.
    A(usize),
    /// Index of the originating face of surface B.
    B(usize),
}

/// Output of a boolean operation.
#[derive(Debug)]
pub struct BooleanOutput {
    /// The combined surface; the cut copy of A when the operation is
    /// [`BooleanOp::None`].
    pub result: PolyMesh,
    /// The cut copy of B for [`BooleanOp::None`], empty otherwise.
    pub complement: PolyMesh,
    /// The contact curve between the two surfaces.
    pub contact: ContactCurve,
    /// Result face -> originating input face. Empty for
    /// [`BooleanOp::None`].
    pub origins: SecondaryMap<CellId, FaceOrigin>,
    /// Connected-component labelling of `result`.
    pub regions: RegionLabels,
}

/// Computes a boolean set operation between two closed, oriented
/// polygonal surfaces.
///
/// The inputs are not mutated. The pipeline runs Sanitize, Contact,
/// PolyStrips, CleanStrips, CutCells, RestoreOrigPoints, ResolveOverlaps,
/// AddAdjacentPoints, DisjoinPolys, MergePoints and CombineRegions in
/// order, each stage to completion.
///
/// # Errors
///
/// Any of the [`crate::BooleanError`] kinds; every failure is fatal and
/// leaves no partial output.
pub fn boolean_op(mesh_a: &PolyMesh, mesh_b: &PolyMesh, op: BooleanOp) -> Result<BooleanOutput> {
    debug!(?op, "boolean operation start");

    let clean_a = sanitize::cleaned_copy(mesh_a);
    let clean_b = sanitize::cleaned_copy(mesh_b);

    let mut mod_a = clean_a.mesh;
    let mut mod_b = clean_b.mesh;

    sanitize::prevent_equal_capt_points(&mut mod_a, &mut mod_b)?;

    let mut cont = contact::find_contact(&mod_a, &mod_b)?;

    let mut ps_a = strips::get_poly_strips(&mod_a, &cont, SurfaceSide::A)?;
    let mut ps_b = strips::get_poly_strips(&mod_b, &cont, SurfaceSide::B)?;

    strips::clean_strips(&mut ps_a, &mut ps_b, &mut cont)?;

    cut_cells::cut_cells(&mut mod_a, &mut ps_a)?;
    cut_cells::cut_cells(&mut mod_b, &mut ps_b)?;

    refine::restore_orig_points(&mut mod_a, &ps_a);
    refine::restore_orig_points(&mut mod_b, &ps_b);

    refine::resolve_overlaps(&mut mod_a, &cont, &ps_a);
    refine::resolve_overlaps(&mut mod_b, &cont, &ps_b);

    refine::add_adjacent_points(&mut mod_a, &cont, &ps_a, SurfaceSide::A);
    refine::add_adjacent_points(&mut mod_b, &cont, &ps_b, SurfaceSide::B);

    refine::disjoin_polys(&mut mod_a, &ps_a);
    refine::disjoin_polys(&mut mod_b, &ps_b);

    refine::merge_points(&mut mod_a, &cont, &ps_a);
    refine::merge_points(&mut mod_b, &cont, &ps_b);

    let ctx_a = SurfaceContext {
        modified: &mod_a,
        input: mesh_a,
        input_index: &clean_a.input_index,
    };
    let ctx_b = SurfaceContext {
        modified: &mod_b,
        input: mesh_b,
        input_index: &clean_b.input_index,
    };

    combine::combine_regions(&ctx_a, &ctx_b, &cont, op)
}

/// Boolean union of two surfaces.
///
/// # Errors
///
/// See [`boolean_op`].
pub fn union(mesh_a: &PolyMesh, mesh_b: &PolyMesh) -> Result<BooleanOutput> {
    boolean_op(mesh_a, mesh_b, BooleanOp::Union)
}

/// Boolean intersection of two surfaces.
///
/// # Errors
///
/// See [`boolean_op`].
pub fn intersection(mesh_a: &PolyMesh, mesh_b: &PolyMesh) -> Result<BooleanOutput> {
    boolean_op(mesh_a, mesh_b, BooleanOp::Intersection)
}

/// Boolean difference A minus B.
///
/// # Errors
///
/// See [`boolean_op`].
pub fn difference(mesh_a: &PolyMesh, mesh_b: &PolyMesh) -> Result<BooleanOutput> {
    boolean_op(mesh_a, mesh_b, BooleanOp::DifferenceAB)
}

/// Boolean difference B minus A.
///
/// # Errors
///
/// See [`boolean_op`].
pub fn difference_ba(mesh_a: &PolyMesh, mesh_b: &PolyMesh) -> Result<BooleanOutput> {
    boolean_op(mesh_a, mesh_b, BooleanOp::DifferenceBA)
}
