//! Two-phase vectorization (spec.md §4.10/§4.12): lifts the bodies of
//! loops that carry no cross-iteration `RAW`/`WAW` dependency into
//! whole-array vector ops, first over the raw loop-linear form (phase
//! 1), then again over whatever scalar `Reduce` loops phase 1 left
//! behind, once affine index expressions can be materialized as
//! `Iota`/`Gather` shape-coercions (phase 2).
//!
//! Sits downstream of `mpc-loopir` (C7-C9, C11) and is the last stage
//! of this crate's pipeline: its output, paired with the `TypeEnv`
//! `mpc-loopir::types` produced, is what the (out-of-scope) emitter
//! consumes (spec.md §6).

pub mod phase1;
pub mod phase2;
pub mod vec_ir;

pub use phase1::vectorize_phase1;
pub use phase2::vectorize_phase2;
pub use vec_ir::{ReduceLoop, VecAssign, VecRhs, VecStmt, VectorizedFunction, walk_vec_stmts};
