pub mod error;
pub mod math;
pub mod mesh;
pub mod operations;

pub use error::{BooleanError, Result};
pub use mesh::{CellId, PointId, PolyMesh};
pub use operations::boolean::{
    boolean_op, difference, difference_ba, intersection, union, BooleanOp, BooleanOutput,
    ContactCurve, ContactSeg, FaceOrigin,
};
