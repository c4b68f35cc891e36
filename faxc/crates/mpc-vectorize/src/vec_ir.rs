//! Vector IR (spec.md §4.10/§4.12 "Vectorization (Two Phases)"): the
//! shape C10/C12 rewrite a lifted `for` loop's body into. A vectorized
//! loop disappears as a `for` and becomes a flat run of whole-array
//! ops operating over an implicit `[0, width)` range, plus one
//! `Reduce` op for any loop-carried scalar accumulator that could not
//! be lifted (spec.md §4.10: "Loop-carried scalars that survive...
//! remain as scalar loops" — `Reduce` is this crate's name for that
//! surviving scalar loop once its *other* operations have already been
//! vectorized around it).
//!
//! `VecAssign`/`VecRhs` deliberately mirror `mpc_tac::{Assign, AssignRhs}`
//! one level up (a whole `Var`-named vector standing in for a single
//! `Var`), the same "generalize the teacher's shape" relationship
//! `mpc_loopir::lir` has to `mpc_tac::tac`.

use indexmap::IndexSet;
use mpc_ast::{BinOpKind, Constant, UnaryOpKind, Var};
use mpc_tac::Assign;
use std::fmt;

/// The right-hand side of a vector op: every scalar `AssignRhs` shape
/// lifted to operate over a whole `width`-element group, plus
/// `Broadcast` for a loop-invariant scalar operand (spec.md §4.10:
/// "Scalar broadcasts are inserted for loop-invariant operands") and
/// `Gather` for an index vector read (spec.md §4.12: "shape-coercions
/// (broadcast, index-gather)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VecRhs {
    ConstantInt(Constant),
    Var(Var),
    Broadcast(Var),
    Gather { array: Var, index: Var },
    BinOp { op: BinOpKind, left: Var, right: Var },
    UnaryOp { op: UnaryOpKind, operand: Var },
    Mux { cond: Var, then_val: Var, else_val: Var },
    /// The lane-indexed sequence `[low, low+1, ..., high-1]` a loop's
    /// own counter becomes once phase 2 needs to use it as an ordinary
    /// vector operand (spec.md §4.12's `biometric` scenario: the affine
    /// index `i*D+j` mixes an outer loop-invariant broadcast with the
    /// inner loop's own counter, so the counter itself has to become a
    /// vector before the multiply/add around it can). The payload is
    /// the originating counter `Var`, kept only for display/debugging —
    /// the lane values it produces are fixed by the enclosing
    /// `VecAssign`'s own `width`.
    Iota(Var),
}

impl fmt::Display for VecRhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VecRhs::ConstantInt(c) => write!(f, "{}", c),
            VecRhs::Var(v) => write!(f, "{}", v),
            VecRhs::Broadcast(v) => write!(f, "broadcast({})", v),
            VecRhs::Gather { array, index } => write!(f, "gather({}, {})", array, index),
            VecRhs::BinOp { op, left, right } => write!(f, "({} {} {})", left, op, right),
            VecRhs::UnaryOp { op, operand } => write!(f, "{} {}", op, operand),
            VecRhs::Mux { cond, then_val, else_val } => write!(f, "mux({}, {}, {})", cond, then_val, else_val),
            VecRhs::Iota(counter) => write!(f, "iota({})", counter),
        }
    }
}

/// A whole-vector assignment: `lhs := rhs` over `width` lanes. `width`
/// is the plaintext `Var` giving the vector's length at runtime — the
/// lifted loop's `high` bound (this crate's loops always start at a
/// `low` the builder materializes as `0`, so `high` alone is the
/// length; see `phase1::lift_loop`) — rather than a compile-time `u32`,
/// since a source program's array lengths are ordinary plaintext
/// parameters, not constants baked into the circuit shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VecAssign {
    pub lhs: Var,
    pub rhs: VecRhs,
    pub width: Var,
}

impl fmt::Display for VecAssign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}> := {}", self.lhs, self.width, self.rhs)
    }
}

/// One element of a vectorized function body: a lifted vector op, a
/// scalar loop that survived lifting (loop-carried accumulator), or an
/// ordinary straight-line scalar op untouched by either vectorization
/// phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VecStmt {
    Vector(VecAssign),
    Scalar(Assign),
    Reduce(ReduceLoop),
}

impl fmt::Display for VecStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VecStmt::Vector(v) => write!(f, "{}", v),
            VecStmt::Scalar(a) => write!(f, "{}", a),
            VecStmt::Reduce(r) => write!(f, "{}", r),
        }
    }
}

/// A `for` loop that phase 1 could not lift in full because its body
/// carries a loop-to-loop scalar dependency (spec.md §4.10). Its body
/// may still contain `Vector` ops for the parts of the body that *are*
/// parallel (spec.md's `max_dist_between_syms`/`biometric` scenarios:
/// the comparison/distance vectorizes, the running max/min does not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceLoop {
    pub counter: Var,
    pub low: Var,
    pub high: Var,
    pub body: Vec<VecStmt>,
    /// This loop's own node indices in the dependency graph built over
    /// the pre-vectorization loop-linear body (spec.md §4.8), fixed at
    /// the point phase 1 first turned this loop into a `Reduce`. Phase
    /// 1 and phase 2 both restrict `DepGraph::has_cycle_within` to
    /// exactly this set before attempting any further hoisting out of
    /// this loop (spec.md §4.10/§8 Testable Property 8), rather than
    /// recomputing a range from the (already partially lifted) body.
    pub body_nodes: IndexSet<usize>,
}

impl fmt::Display for ReduceLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "for {} in [{}, {}):", self.counter, self.low, self.high)?;
        for stmt in &self.body {
            for line in stmt.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        Ok(())
    }
}

/// Depth-first pre-order traversal of a vectorized body, the same
/// canonical order `mpc_loopir::lir::walk_stmts` defines for
/// loop-linear IR (spec.md §5 determinism).
pub fn walk_vec_stmts(body: &[VecStmt]) -> Vec<&VecStmt> {
    let mut out = Vec::new();
    fn go<'a>(body: &'a [VecStmt], out: &mut Vec<&'a VecStmt>) {
        for stmt in body {
            out.push(stmt);
            if let VecStmt::Reduce(r) = stmt {
                go(&r.body, out);
            }
        }
    }
    go(body, &mut out);
    out
}

/// The whole-function vectorized IR: C12's final output, handed to the
/// (out-of-scope) emitter alongside the `TypeEnv` C11 produced over
/// the pre-vectorization loop-linear form (spec.md §6: "a loop-linear
/// IR paired with a type environment... plus the declared parameters
/// carrying `party_idx`"). Mirrors `mpc_loopir::lir::LoopLinearFunction`
/// one stage later, the same "generalize the teacher's shape"
/// relationship the rest of this crate's IR types have to their
/// pre-vectorization counterparts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorizedFunction {
    pub name: mpc_util::Symbol,
    pub parameters: Vec<mpc_ast::Parameter>,
    pub body: Vec<VecStmt>,
    pub return_values: Vec<Var>,
}

impl fmt::Display for VectorizedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self.parameters.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        writeln!(f, "Function {}({}):", self.name.as_str(), parameters)?;
        for stmt in &self.body {
            for line in stmt.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        let returns = self.return_values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "return {}", returns)
    }
}
