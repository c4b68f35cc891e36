//! Core utilities and foundation types shared by every stage of the
//! lowering pipeline: interned symbols, typed index vectors, source
//! spans/maps, and diagnostic rendering.
//!
//! Nothing in this crate knows about the MPC IR — it is pure
//! infrastructure, reused unchanged by `mpc-ast`, `mpc-tac`,
//! `mpc-loopir`, and `mpc-vectorize`.

pub mod def_id;
pub mod diagnostic;
pub mod error;
pub mod index_vec;
pub mod span;
pub mod symbol;

pub use def_id::{DefId, DefIdGenerator};
pub use diagnostic::{Diagnostic, DiagnosticBuilder, Handler, Level};
pub use index_vec::{Idx, IndexVec};
pub use span::{FileId, SourceFile, SourceMap, Span};
pub use symbol::Symbol;

pub use rustc_hash::{FxHashMap, FxHashSet};
