//! Three-address-code CFG construction, SSA, Φ-to-mux lowering, and
//! dead code elimination (spec.md §4.3-§4.6): the TAC/SSA half of the
//! lowering pipeline, sitting between the restricted AST (`mpc-ast`)
//! and loop-linear reconstruction (`mpc-loopir`).

pub mod builder;
pub mod dce;
pub mod dominance;
pub mod mux;
pub mod ssa;
pub mod tac;

pub use builder::lower_function;
pub use dce::eliminate_dead_code;
pub use dominance::DominanceInfo;
pub use mux::{check_no_if_join_phis_remain, lower_phis_to_mux};
pub use ssa::{check_ssa_uniqueness, construct_ssa};
pub use tac::{
    Assign, AssignRhs, BasicBlock, BlockId, BranchKind, Cfg, Function, Phi, Place, Terminator,
};
