//! Vectorizer phase 1 (spec.md §4.10): identifies loops with no
//! loop-carried scalar dependency and lifts their bodies to vector
//! ops; for a loop that *does* carry a scalar (an accumulator that
//! survives across iterations), still hoists whichever of its ops do
//! not feed that carry into pre-loop vector ops, leaving only the
//! carry chain itself as a scalar `Reduce` loop — this is the
//! "vectorize the sequence comparison... while leaving the running
//! max as a scalar reduction" shape spec.md §8's `max_dist_between_syms`
//! scenario names directly.
//!
//! Working definition of "loop-carried" used here: a `Var` is carried
//! by a loop body iff some op reads it before the body itself ever
//! locally defines it (a "free" read) *and* the body also assigns it
//! somewhere (as a `Place::Var` lhs) — the generated loop-linear shape
//! for an accumulator is exactly this: `acc2 := acc + elem` (free read
//! of `acc`) followed by the carry-back copy `acc := acc2` (acc's own
//! local definition), so scanning reads against a running "defined so
//! far" set catches it without needing an explicit dep-graph
//! back-edge.
//!
//! A nested `for` loop is always processed recursively before its
//! enclosing loop is considered for flattening; the presence of any
//! nested loop (lifted or not) in a body disqualifies that body's own
//! *outer* loop from full flattening (spec.md's `biometric` scenario:
//! the inner distance loop vectorizes, the outer argmin loop does not,
//! precisely because it still contains a loop).

use crate::vec_ir::{ReduceLoop, VecAssign, VecRhs, VecStmt};
use indexmap::{IndexMap, IndexSet};
use mpc_ast::{BinOpKind, Var};
use mpc_loopir::{DepGraph, ForLoop, LoopLinearStmt};
use mpc_tac::{Assign, AssignRhs, Place};

/// Lifts every loop in `body` to vector form where legal, returning
/// the rewritten body. The function's own top-level scope is treated
/// like a (very wide) loop body for the purpose of this lowering, but
/// the function itself is not wrapped in a `for` — only its nested
/// loops are candidates.
///
/// `dep_graph` must be the graph `mpc_loopir::build_dep_graph` produced
/// over this same (pre-lifting) `body` — its node numbering is the
/// `walk_stmts` pre-order this function's own traversal reproduces via
/// `cursor`, so a loop's node range computed here always lines up with
/// the graph's node indices (spec.md §4.8/§4.10).
pub fn vectorize_phase1(body: Vec<LoopLinearStmt>, dep_graph: &DepGraph) -> Vec<VecStmt> {
    let mut cursor = 0usize;
    lift_stmts(body, dep_graph, &mut cursor)
}

/// Every array `Var` written anywhere in `body` via a `Place::Index`
/// lhs, recursively through nested loops. `DepGraph::has_cycle_within`
/// can never catch the hazard this guards against — a loop writing an
/// array through one index while reading it through another never
/// forms a graph cycle, since every edge `build_dep_graph` produces
/// runs strictly forward in program order (see that function's own
/// doc) — so phase 1 (and phase 2, via its own copy of this scan over
/// `VecStmt`) tracks it directly and refuses to hoist a read of any
/// array in this set to a whole-vector/`Gather` op, leaving it (and
/// whatever wrote it) in the scalar residual instead.
pub(crate) fn written_array_roots(body: &[LoopLinearStmt]) -> IndexSet<Var> {
    let mut out = IndexSet::new();
    fn go(body: &[LoopLinearStmt], out: &mut IndexSet<Var>) {
        for stmt in body {
            match stmt {
                LoopLinearStmt::Assign(a) => {
                    if let Place::Index { array, .. } = &a.lhs {
                        out.insert(*array);
                    }
                }
                LoopLinearStmt::For(for_loop) => go(&for_loop.body, out),
            }
        }
    }
    go(body, &mut out);
    out
}

fn lift_stmts(body: Vec<LoopLinearStmt>, dep_graph: &DepGraph, cursor: &mut usize) -> Vec<VecStmt> {
    let mut out = Vec::new();
    for stmt in body {
        match stmt {
            LoopLinearStmt::Assign(a) => {
                *cursor += 1;
                out.push(VecStmt::Scalar(a));
            }
            LoopLinearStmt::For(for_loop) => {
                *cursor += 1;
                out.extend(lift_for(for_loop, dep_graph, cursor));
            }
        }
    }
    out
}

/// Lifts one loop, returning either a flat run of `Vector` ops (full
/// flattening) or a single `Reduce` preceded by whatever pre-loop
/// vector ops could be hoisted out of it.
///
/// Gated by `DepGraph::has_cycle_within` over this loop's own node
/// range (spec.md §4.10: "no dep-graph cycle through its body") in
/// addition to the scalar-carry heuristic below: a loop whose body
/// carries a real RAW/WAW/WAR cycle is left untouched as a plain
/// scalar `Reduce`, with no attempt at partial hoisting.
///
/// Separately, regardless of cycles, `written_array_roots` blocks
/// per-statement hoisting of any read of an array this loop's own body
/// also writes via `Place::Index` — the case `mpc_loopir::depgraph`'s
/// conservative same-array collision rule exists for (two accesses on
/// distinct index `Var`s), which a straight-line, forward-edges-only
/// dep graph cannot express as a cycle.
fn lift_for(for_loop: ForLoop, dep_graph: &DepGraph, cursor: &mut usize) -> Vec<VecStmt> {
    let ForLoop { counter, low, high, body } = for_loop;
    let written_arrays = written_array_roots(&body);
    let body_start = *cursor;
    let inner = lift_stmts(body, dep_graph, cursor);
    let body_end = *cursor;
    let body_nodes: IndexSet<usize> = (body_start..body_end).collect();

    if dep_graph.has_cycle_within(&body_nodes) {
        return vec![VecStmt::Reduce(ReduceLoop { counter, low, high, body: inner, body_nodes })];
    }

    let carried = carried_vars(&inner);
    let mut hoisted_names: IndexMap<Var, Var> = IndexMap::new();
    let mut pre_loop: Vec<VecStmt> = Vec::new();
    let mut residual: Vec<VecStmt> = Vec::new();

    for stmt in inner {
        match &stmt {
            VecStmt::Scalar(assign) => {
                if let Place::Var(lhs) = &assign.lhs {
                    if !carried.contains(lhs) {
                        if let Some(vec_assign) = try_hoist(assign, counter, high, &hoisted_names, &written_arrays) {
                            let array_name = vec_assign.lhs;
                            hoisted_names.insert(*lhs, array_name);
                            pre_loop.push(VecStmt::Vector(vec_assign));
                            continue;
                        }
                    }
                }
                residual.extend(rewrite_hoisted_reads(stmt, &hoisted_names));
            }
            VecStmt::Vector(_) | VecStmt::Reduce(_) => {
                residual.extend(rewrite_hoisted_reads(stmt, &hoisted_names));
            }
        }
    }

    if residual.is_empty() {
        pre_loop
    } else {
        let mut out = pre_loop;
        out.push(VecStmt::Reduce(ReduceLoop { counter, low, high, body: residual, body_nodes }));
        out
    }
}

/// Every `Var` that is read somewhere in `body` before it is locally
/// defined *and* is also assigned somewhere in `body` — see module doc.
pub(crate) fn carried_vars(body: &[VecStmt]) -> IndexSet<Var> {
    let written_anywhere: IndexSet<Var> = body
        .iter()
        .flat_map(written_vars_top_level)
        .collect();

    let mut defined: IndexSet<Var> = IndexSet::new();
    let mut carried: IndexSet<Var> = IndexSet::new();
    for stmt in body {
        let (reads, writes) = reads_and_writes(stmt);
        for r in reads {
            if !defined.contains(&r) && written_anywhere.contains(&r) {
                carried.insert(r);
            }
        }
        defined.extend(writes);
    }
    carried
}

fn written_vars_top_level(stmt: &VecStmt) -> Vec<Var> {
    reads_and_writes(stmt).1
}

/// `(reads, writes)` for one vectorized statement. For a nested
/// `Reduce`, "writes" is whatever scalar vars its own body assigns at
/// its top level (its exported carried values) and "reads" is its
/// loop bound plus whatever its body reads that it doesn't itself
/// define — an approximation of the nested loop's external data-flow
/// sufficient to decide whether the *enclosing* loop's scalars are
/// carried across the nested loop's boundary.
pub(crate) fn reads_and_writes(stmt: &VecStmt) -> (Vec<Var>, Vec<Var>) {
    match stmt {
        VecStmt::Scalar(assign) => {
            let mut reads = Vec::new();
            if let Place::Index { index, .. } = &assign.lhs {
                reads.push(*index);
            }
            mark_rhs_reads(&assign.rhs, &mut reads);
            let writes = match &assign.lhs {
                Place::Var(v) => vec![*v],
                Place::Index { .. } => vec![],
            };
            (reads, writes)
        }
        VecStmt::Vector(vec_assign) => {
            let mut reads = vec![vec_assign.width];
            mark_vec_rhs_reads(&vec_assign.rhs, &mut reads);
            (reads, vec![vec_assign.lhs])
        }
        VecStmt::Reduce(reduce) => {
            let mut reads = vec![reduce.low, reduce.high];
            let mut writes = Vec::new();
            for inner in &reduce.body {
                let (inner_reads, inner_writes) = reads_and_writes(inner);
                reads.extend(inner_reads);
                writes.extend(inner_writes);
            }
            (reads, writes)
        }
    }
}

fn mark_rhs_reads(rhs: &AssignRhs, reads: &mut Vec<Var>) {
    match rhs {
        AssignRhs::ConstantInt(_) => {}
        AssignRhs::Var(v) => reads.push(*v),
        AssignRhs::Index { array, index } => {
            reads.push(*array);
            reads.push(*index);
        }
        AssignRhs::BinOp { left, right, .. } => {
            reads.push(*left);
            reads.push(*right);
        }
        AssignRhs::UnaryOp { operand, .. } => reads.push(*operand),
        AssignRhs::Mux { cond, then_val, else_val } => {
            reads.push(*cond);
            reads.push(*then_val);
            reads.push(*else_val);
        }
    }
}

fn mark_vec_rhs_reads(rhs: &VecRhs, reads: &mut Vec<Var>) {
    match rhs {
        VecRhs::ConstantInt(_) => {}
        VecRhs::Var(v) | VecRhs::Broadcast(v) => reads.push(*v),
        VecRhs::Gather { array, index } => {
            reads.push(*array);
            reads.push(*index);
        }
        VecRhs::BinOp { left, right, .. } => {
            reads.push(*left);
            reads.push(*right);
        }
        VecRhs::UnaryOp { operand, .. } => reads.push(*operand),
        VecRhs::Mux { cond, then_val, else_val } => {
            reads.push(*cond);
            reads.push(*then_val);
            reads.push(*else_val);
        }
        VecRhs::Iota(_) => {}
    }
}

/// Attempts to rewrite one non-carried scalar assignment into a
/// pre-loop vector op over `[0, high)`, assuming `low` is the
/// zero-constant every loop this crate builds starts from. Fails (and
/// the op stays scalar, inside whatever `Reduce` remains) when the op
/// reads the loop counter directly rather than only through an array
/// index, or indexes an array with something other than the counter
/// itself — both would require per-lane gather support this phase
/// does not implement.
fn try_hoist(
    assign: &Assign,
    counter: Var,
    high: Var,
    hoisted: &IndexMap<Var, Var>,
    written_arrays: &IndexSet<Var>,
) -> Option<VecAssign> {
    let Place::Var(lhs) = &assign.lhs else { return None };
    let rhs = vectorize_rhs(&assign.rhs, counter, hoisted, written_arrays)?;
    Some(VecAssign { lhs: fresh_vector_name(*lhs), rhs, width: high })
}

/// Names the hoisted array after the scalar it replaces, carrying a
/// `!vec` synthetic marker subscript so it never collides with the
/// original scalar `Var` it is derived from — both are live
/// simultaneously while `residual` still refers to the scalar name via
/// `rewrite_hoisted_reads`.
pub(crate) fn fresh_vector_name(scalar: Var) -> Var {
    scalar.with_subscript(scalar.rename_subscript.unwrap_or(0).wrapping_add(0x5645_4300))
}

fn vectorize_rhs(
    rhs: &AssignRhs,
    counter: Var,
    hoisted: &IndexMap<Var, Var>,
    written_arrays: &IndexSet<Var>,
) -> Option<VecRhs> {
    let lift_operand = |v: Var| -> Option<VecRhs> {
        if v == counter {
            return None;
        }
        if let Some(&vec_name) = hoisted.get(&v) {
            Some(VecRhs::Var(vec_name))
        } else {
            Some(VecRhs::Broadcast(v))
        }
    };

    match rhs {
        AssignRhs::ConstantInt(c) => Some(VecRhs::ConstantInt(*c)),
        AssignRhs::Var(v) => lift_operand(*v),
        AssignRhs::Index { array, index } => {
            if written_arrays.contains(array) {
                None
            } else if *index == counter {
                Some(VecRhs::Var(*array))
            } else {
                None
            }
        }
        AssignRhs::BinOp { op, left, right } => {
            let (l, r) = (scalarize(lift_operand(*left)?), scalarize(lift_operand(*right)?));
            Some(VecRhs::BinOp { op: *op, left: l, right: r })
        }
        AssignRhs::UnaryOp { op, operand } => {
            let o = scalarize(lift_operand(*operand)?);
            Some(VecRhs::UnaryOp { op: *op, operand: o })
        }
        AssignRhs::Mux { cond, then_val, else_val } => {
            let c = scalarize(lift_operand(*cond)?);
            let t = scalarize(lift_operand(*then_val)?);
            let e = scalarize(lift_operand(*else_val)?);
            Some(VecRhs::Mux { cond: c, then_val: t, else_val: e })
        }
    }
}

/// `VecRhs::{Var,Broadcast}` both ultimately carry a single `Var`
/// payload (the referenced vector or the loop-invariant scalar to
/// broadcast); operators that take whole-vector operands address them
/// by that `Var` regardless of which of the two shapes produced it —
/// a loop-invariant scalar used directly in an operator position reads
/// the same as its own one-lane "vector".
fn scalarize(rhs: VecRhs) -> Var {
    match rhs {
        VecRhs::Var(v) | VecRhs::Broadcast(v) => v,
        _ => unreachable!("lift_operand only ever returns Var or Broadcast"),
    }
}

/// Rewrites any scalar read of a now-hoisted var left in `stmt` to
/// read the hoisted vector by index instead (`hoisted_array[counter]`,
/// an ordinary scalar index op — not a `VecRhs`, since this statement
/// still lives inside the retained scalar loop and reads one lane at
/// a time). A direct `rhs := that_var` substitutes the index op in
/// place; a var buried inside a `BinOp`/`UnaryOp`/`Mux`/`Index`
/// operand position cannot take an expression there (three-address
/// code only allows a bare `Var`), so those positions get a small
/// materializing read spliced in immediately before the statement
/// instead — hence this returns a `Vec`, not a single `VecStmt`.
pub(crate) fn rewrite_hoisted_reads(stmt: VecStmt, hoisted: &IndexMap<Var, Var>) -> Vec<VecStmt> {
    match stmt {
        VecStmt::Scalar(mut assign) => {
            let mut materialized = Vec::new();
            assign.rhs = rewrite_rhs_var_refs(assign.rhs, hoisted, &mut materialized);
            materialized.push(VecStmt::Scalar(assign));
            materialized
        }
        other => vec![other],
    }
}

fn rewrite_rhs_var_refs(rhs: AssignRhs, hoisted: &IndexMap<Var, Var>, materialized: &mut Vec<VecStmt>) -> AssignRhs {
    let mut emitted: IndexMap<Var, Var> = IndexMap::new();
    let mut sub = |v: Var| -> Var {
        let Some(&array) = hoisted.get(&v) else { return v };
        if let Some(&temp) = emitted.get(&v) {
            return temp;
        }
        let temp = v.with_subscript(v.rename_subscript.unwrap_or(0).wrapping_add(0x5343_4c52));
        materialized.push(VecStmt::Scalar(Assign { lhs: Place::Var(temp), rhs: AssignRhs::Index { array, index: v } }));
        emitted.insert(v, temp);
        temp
    };
    match rhs {
        AssignRhs::ConstantInt(c) => AssignRhs::ConstantInt(c),
        AssignRhs::Var(v) => match hoisted.get(&v) {
            Some(&arr) => AssignRhs::Index { array: arr, index: v },
            None => AssignRhs::Var(v),
        },
        AssignRhs::Index { array, index } => AssignRhs::Index { array: sub(array), index: sub(index) },
        AssignRhs::BinOp { op, left, right } => {
            AssignRhs::BinOp { op, left: sub(left), right: sub(right) }
        }
        AssignRhs::UnaryOp { op, operand } => AssignRhs::UnaryOp { op, operand: sub(operand) },
        AssignRhs::Mux { cond, then_val, else_val } => {
            AssignRhs::Mux { cond: sub(cond), then_val: sub(then_val), else_val: sub(else_val) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Var {
        Var::user(mpc_util::Symbol::intern(s))
    }

    /// Builds the dep graph over a lone loop the same way the pipeline
    /// builds one over a whole function body, then lifts it — the test
    /// equivalent of calling `vectorize_phase1` with a single-statement
    /// body, so `lift_for`'s node-range bookkeeping lines up with a real
    /// `DepGraph` instead of an empty stand-in.
    fn lift_one_loop(for_loop: ForLoop) -> Vec<VecStmt> {
        let wrapped = vec![LoopLinearStmt::For(for_loop)];
        let dep_graph = mpc_loopir::build_dep_graph(&wrapped);
        vectorize_phase1(wrapped, &dep_graph)
    }

    #[test]
    fn loop_with_no_carry_fully_flattens() {
        let seq = sym("seq");
        let sym_val = sym("sym_val");
        let i = sym("i");
        let low = Var::synthetic(0);
        let high = sym("n");
        let elem = Var::synthetic(1);
        let cmp = Var::synthetic(2);

        let body = vec![
            LoopLinearStmt::Assign(Assign { lhs: Place::Var(elem), rhs: AssignRhs::Index { array: seq, index: i } }),
            LoopLinearStmt::Assign(Assign {
                lhs: Place::Var(cmp),
                rhs: AssignRhs::BinOp { op: BinOpKind::Eq, left: elem, right: sym_val },
            }),
        ];
        let for_loop = ForLoop { counter: i, low, high, body };

        let lifted = lift_one_loop(for_loop);
        assert!(lifted.iter().all(|s| matches!(s, VecStmt::Vector(_))));
        assert_eq!(lifted.len(), 2);
    }

    #[test]
    fn accumulator_loop_stays_a_reduce_with_hoisted_comparison() {
        let seq = sym("seq");
        let sym_val = sym("sym_val");
        let i = sym("i");
        let low = Var::synthetic(0);
        let high = sym("n");
        let cmp = sym("cmp");
        let dist = sym("current_dist");
        let elem = Var::synthetic(5);

        let body = vec![
            LoopLinearStmt::Assign(Assign {
                lhs: Place::Var(elem),
                rhs: AssignRhs::Index { array: seq, index: i },
            }),
            LoopLinearStmt::Assign(Assign {
                lhs: Place::Var(cmp),
                rhs: AssignRhs::BinOp { op: BinOpKind::Eq, left: elem, right: sym_val },
            }),
            LoopLinearStmt::Assign(Assign {
                lhs: Place::Var(dist),
                rhs: AssignRhs::Mux { cond: cmp, then_val: i, else_val: dist },
            }),
        ];
        let for_loop = ForLoop { counter: i, low, high, body };

        let lifted = lift_one_loop(for_loop);
        assert!(matches!(lifted.last(), Some(VecStmt::Reduce(_))));
        assert!(lifted[..lifted.len() - 1].iter().any(|s| matches!(s, VecStmt::Vector(_))));
    }

    #[test]
    fn loop_with_conservatively_colliding_array_accesses_stays_unlifted() {
        // `A[i] := v` then `w := A[j]` on distinct index `Var`s: no
        // scalar carry exists, so the carried-vars heuristic alone
        // would fully flatten this loop, but `mpc_loopir::depgraph`
        // conservatively collides the two accesses (same array, distinct
        // index `Var`s), which must block lifting here too.
        let arr = sym("a");
        let i = sym("i");
        let j = sym("j");
        let low = Var::synthetic(0);
        let high = sym("n");
        let v = Var::synthetic(1);
        let w = Var::synthetic(2);

        let body = vec![
            LoopLinearStmt::Assign(Assign { lhs: Place::Index { array: arr, index: i }, rhs: AssignRhs::Var(v) }),
            LoopLinearStmt::Assign(Assign { lhs: Place::Var(w), rhs: AssignRhs::Index { array: arr, index: j } }),
        ];
        let for_loop = ForLoop { counter: i, low, high, body: body.clone() };

        let lifted = lift_one_loop(for_loop);
        assert_eq!(lifted.len(), 1);
        let Some(VecStmt::Reduce(reduce)) = lifted.into_iter().next() else {
            panic!("expected the colliding loop to stay a plain Reduce")
        };
        assert_eq!(reduce.body.len(), body.len(), "no partial hoisting should have happened");
        assert!(reduce.body.iter().all(|s| matches!(s, VecStmt::Scalar(_))));
    }

    #[test]
    fn read_of_an_array_the_same_loop_writes_elsewhere_is_not_hoisted() {
        // `A[j] := v` (some unrelated index `j`) then `w := A[i]` where
        // `i` is this loop's own counter — `w := A[i]`'s index matches
        // the counter exactly, so in isolation `vectorize_rhs` would
        // happily hoist it to `Var(A)`. `A` is also written earlier in
        // this same loop body via a different index, which `has_cycle_within`
        // can't see (no cycle, just two forward edges) but
        // `written_array_roots` does.
        let arr = sym("a");
        let i = sym("i");
        let j = sym("j");
        let low = Var::synthetic(0);
        let high = sym("n");
        let v = Var::synthetic(1);
        let w = Var::synthetic(2);

        let body = vec![
            LoopLinearStmt::Assign(Assign { lhs: Place::Index { array: arr, index: j }, rhs: AssignRhs::Var(v) }),
            LoopLinearStmt::Assign(Assign { lhs: Place::Var(w), rhs: AssignRhs::Index { array: arr, index: i } }),
        ];
        let for_loop = ForLoop { counter: i, low, high, body: body.clone() };

        let lifted = lift_one_loop(for_loop);
        assert_eq!(lifted.len(), 1);
        let Some(VecStmt::Reduce(reduce)) = lifted.into_iter().next() else {
            panic!("expected the whole loop to stay a plain Reduce")
        };
        assert_eq!(reduce.body.len(), body.len());
        assert!(reduce.body.iter().all(|s| matches!(s, VecStmt::Scalar(_))));
    }
}
