//! Loop-linear reconstruction, dependency analysis, array/mux
//! refinement, and type propagation (spec.md §4.7-§4.9, §4.11): the
//! stage between the TAC/SSA pipeline (`mpc-tac`) and vectorization
//! (`mpc-vectorize`).

pub mod depgraph;
pub mod lir;
pub mod loop_linear;
pub mod refine;
pub mod types;

pub use depgraph::{DepEdgeKind, DepGraph, build_dep_graph};
pub use lir::{ForLoop, LoopLinearFunction, LoopLinearStmt, walk_stmts};
pub use loop_linear::reconstruct;
pub use refine::refine_array_writes;
pub use types::{propagate_types, TypeEnv};
