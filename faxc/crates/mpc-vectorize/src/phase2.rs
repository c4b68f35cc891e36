//! Vectorizer phase 2 (spec.md §4.12): runs after type propagation
//! (`mpc_loopir::propagate_types`) against whatever `Reduce` loops
//! phase 1 left behind, and lifts further ops out of them using two
//! shape-coercions phase 1 does not attempt: materializing a loop's own
//! counter as a per-lane `Iota` vector (so an expression built *from*
//! the counter, not just a bare index read of it, can itself become a
//! vector), and `Gather` for an array read whose index is one of those
//! now-vectorized expressions rather than the counter directly.
//!
//! This is exactly the shape spec.md §8's `biometric` scenario needs:
//! the inner loop's `S[i*D+j]` mixes the outer loop's invariant `i`
//! with the inner loop's own counter `j`, so phase 1's "index must be
//! the counter itself" rule can never fire for it — phase 1 leaves the
//! whole inner body as a scalar `Reduce`, and phase 2 is what actually
//! lifts the distance computation out of it, leaving only the
//! genuinely loop-carried `sum` accumulator behind as a (now much
//! smaller) scalar reduction.

use crate::phase1::{carried_vars, fresh_vector_name, rewrite_hoisted_reads};
use crate::vec_ir::{ReduceLoop, VecAssign, VecRhs, VecStmt};
use indexmap::{IndexMap, IndexSet};
use mpc_ast::Var;
use mpc_loopir::DepGraph;
use mpc_tac::{Assign, AssignRhs, Place};

/// Runs phase 2 over a function body already lowered by phase 1.
/// Every `Vector`/`Scalar` op outside a `Reduce` is left untouched —
/// phase 1 already gave it the most lifting it can legally get;
/// phase 2 only ever has new capability to offer a `Reduce`'s own
/// residual body.
///
/// `dep_graph` must be the same graph phase 1 was given — each
/// `Reduce`'s own `body_nodes` (set when phase 1 first produced it)
/// indexes into this same graph, so phase 2 re-checks
/// `DepGraph::has_cycle_within` before attempting any further hoisting
/// rather than assuming phase 1's earlier pass already settled it.
pub fn vectorize_phase2(body: Vec<VecStmt>, dep_graph: &DepGraph) -> Vec<VecStmt> {
    body.into_iter().flat_map(|stmt| lift_stmt_phase2(stmt, dep_graph)).collect()
}

fn lift_stmt_phase2(stmt: VecStmt, dep_graph: &DepGraph) -> Vec<VecStmt> {
    match stmt {
        VecStmt::Reduce(reduce) => lift_reduce_phase2(reduce, dep_graph),
        other => vec![other],
    }
}

/// Every array `Var` written anywhere in `body` via a `Place::Index`
/// lhs, recursively through any nested `Reduce` — the `VecStmt`-level
/// twin of `phase1::written_array_roots`, run here because phase 2
/// only ever sees the already-lifted form, not the original
/// `LoopLinearStmt` tree phase 1 scanned. Any array write phase 1 could
/// not hoist (it never can — `Place::Index` lhs assignments always stay
/// scalar) is still present here verbatim, so this scan sees the same
/// set phase 1 would have.
fn written_array_roots(body: &[VecStmt]) -> IndexSet<Var> {
    let mut out = IndexSet::new();
    fn go(body: &[VecStmt], out: &mut IndexSet<Var>) {
        for stmt in body {
            match stmt {
                VecStmt::Scalar(a) => {
                    if let Place::Index { array, .. } = &a.lhs {
                        out.insert(*array);
                    }
                }
                VecStmt::Reduce(r) => go(&r.body, out),
                VecStmt::Vector(_) => {}
            }
        }
    }
    go(body, &mut out);
    out
}

/// Recurses into `reduce`'s own body first (a doubly-nested loop's
/// inner `Reduce`, if any, gets the same second chance before the
/// outer one is reconsidered), then retries hoisting whatever scalar
/// ops remain at this level using the counter-as-`Iota` extension.
///
/// Re-checks `DepGraph::has_cycle_within` over `reduce.body_nodes`
/// before attempting any hoisting, and — like phase 1 — refuses to
/// hoist a read of any array this loop's own body also writes via
/// `Place::Index`, the hazard a forward-edges-only dep graph can never
/// express as a cycle (see `mpc_loopir::depgraph::DepGraph::has_cycle_within`'s
/// doc).
fn lift_reduce_phase2(reduce: ReduceLoop, dep_graph: &DepGraph) -> Vec<VecStmt> {
    if dep_graph.has_cycle_within(&reduce.body_nodes) {
        let ReduceLoop { counter, low, high, body, body_nodes } = reduce;
        let inner: Vec<VecStmt> = body.into_iter().flat_map(|stmt| lift_stmt_phase2(stmt, dep_graph)).collect();
        return vec![VecStmt::Reduce(ReduceLoop { counter, low, high, body: inner, body_nodes })];
    }

    let ReduceLoop { counter, low, high, body, body_nodes } = reduce;
    let written_arrays = written_array_roots(&body);
    let inner: Vec<VecStmt> = body.into_iter().flat_map(|stmt| lift_stmt_phase2(stmt, dep_graph)).collect();

    let carried = carried_vars(&inner);
    let mut hoisted_names: IndexMap<Var, Var> = IndexMap::new();
    let mut iota_name: Option<Var> = None;
    let mut pre_loop: Vec<VecStmt> = Vec::new();
    let mut residual: Vec<VecStmt> = Vec::new();

    for stmt in inner {
        match &stmt {
            VecStmt::Scalar(assign) => {
                if let Place::Var(lhs) = &assign.lhs {
                    if !carried.contains(lhs) {
                        if let Some(vec_assign) = try_hoist_phase2(
                            assign,
                            counter,
                            high,
                            &hoisted_names,
                            &written_arrays,
                            &mut iota_name,
                            &mut pre_loop,
                        ) {
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

/// Same contract as `phase1::try_hoist`, plus two additional cases:
/// a direct read of `counter` now lifts to the `Iota` vector (inserted
/// into `pre_loop` the first time anything needs it), and an array
/// index that is itself a previously-hoisted vector lifts to `Gather`
/// rather than failing.
fn try_hoist_phase2(
    assign: &Assign,
    counter: Var,
    high: Var,
    hoisted: &IndexMap<Var, Var>,
    written_arrays: &IndexSet<Var>,
    iota_name: &mut Option<Var>,
    pre_loop: &mut Vec<VecStmt>,
) -> Option<VecAssign> {
    let Place::Var(lhs) = &assign.lhs else { return None };
    let rhs = vectorize_rhs_phase2(&assign.rhs, counter, high, hoisted, written_arrays, iota_name, pre_loop)?;
    Some(VecAssign { lhs: fresh_vector_name(*lhs), rhs, width: high })
}

fn vectorize_rhs_phase2(
    rhs: &AssignRhs,
    counter: Var,
    high: Var,
    hoisted: &IndexMap<Var, Var>,
    written_arrays: &IndexSet<Var>,
    iota_name: &mut Option<Var>,
    pre_loop: &mut Vec<VecStmt>,
) -> Option<VecRhs> {
    let mut lift_operand = |v: Var| -> Option<VecRhs> {
        if v == counter {
            return Some(VecRhs::Var(iota_for(counter, high, iota_name, pre_loop)));
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
            } else if let Some(&vec_index) = hoisted.get(index) {
                Some(VecRhs::Gather { array: *array, index: vec_index })
            } else {
                None
            }
        }
        AssignRhs::BinOp { op, left, right } => {
            let l = scalarize(lift_operand(*left)?);
            let r = scalarize(lift_operand(*right)?);
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

/// `VecRhs::{Var,Broadcast}` (the only two shapes `lift_operand` above
/// ever returns) both carry a single `Var` payload — see
/// `phase1::scalarize`, duplicated here rather than shared since it is
/// a one-line match with nothing left to generalize.
fn scalarize(rhs: VecRhs) -> Var {
    match rhs {
        VecRhs::Var(v) | VecRhs::Broadcast(v) => v,
        _ => unreachable!("lift_operand only ever returns Var or Broadcast"),
    }
}

/// Returns the `Iota` vector standing in for `counter`'s per-lane
/// values, materializing it into `pre_loop` the first time it is
/// needed and reusing the same name on every later reference within
/// this `Reduce`'s hoisting pass.
fn iota_for(counter: Var, high: Var, iota_name: &mut Option<Var>, pre_loop: &mut Vec<VecStmt>) -> Var {
    if let Some(name) = *iota_name {
        return name;
    }
    let name = fresh_iota_name(counter);
    pre_loop.push(VecStmt::Vector(VecAssign { lhs: name, rhs: VecRhs::Iota(counter), width: high }));
    *iota_name = Some(name);
    name
}

/// Names the materialized counter vector after the counter itself,
/// with a marker subscript distinct from `fresh_vector_name`'s so an
/// `Iota` can never collide with an ordinary hoisted array even when
/// both derive from the same scalar `Var`.
fn fresh_iota_name(counter: Var) -> Var {
    counter.with_subscript(counter.rename_subscript.unwrap_or(0).wrapping_add(0x494f_5441))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_ast::BinOpKind;

    fn sym(s: &str) -> Var {
        Var::user(mpc_util::Symbol::intern(s))
    }

    /// Lifts a standalone `ReduceLoop` the way `vectorize_phase2` would,
    /// against an empty dep graph — these tests build their `ReduceLoop`
    /// directly rather than through phase 1, so there is no real
    /// pre-lifting `LoopLinearStmt` body left to build a graph over; an
    /// empty graph has no edges, so `has_cycle_within` is `false`
    /// regardless of which node indices `body_nodes` names, exactly like
    /// every real loop phase 1 ever hands phase 2 (see
    /// `DepGraph::has_cycle_within`'s doc: a cycle never appears).
    fn lift_one_reduce(reduce: ReduceLoop) -> Vec<VecStmt> {
        let dep_graph = mpc_loopir::build_dep_graph(&[]);
        lift_reduce_phase2(reduce, &dep_graph)
    }

    /// Mirrors the `biometric` scenario's inner loop in miniature:
    /// `idx := i * D + j; d := S[idx] - C[j]; p := d * d; sum := sum + p`
    /// over `j in [0, D)`, with `i`/`D`/`S`/`C` loop-invariant. Phase 1
    /// leaves the whole thing scalar (it can't hoist `idx`, since `j`
    /// is read directly rather than through an index); phase 2 should
    /// lift everything except the `sum` carry.
    #[test]
    fn affine_index_lifts_via_iota_and_gather() {
        let i = sym("i");
        let d_bound = sym("D");
        let j = sym("j");
        let low = Var::synthetic(0);
        let seq = sym("S");
        let c = sym("C");
        let sum = sym("sum");
        let idx = Var::synthetic(1);
        let s_at_idx = Var::synthetic(2);
        let c_at_j = Var::synthetic(3);
        let d = Var::synthetic(4);
        let p = Var::synthetic(5);
        let sum2 = Var::synthetic(6);

        let body = vec![
            VecStmt::Scalar(Assign {
                lhs: Place::Var(idx),
                rhs: AssignRhs::BinOp { op: BinOpKind::Add, left: i, right: j },
            }),
            VecStmt::Scalar(Assign { lhs: Place::Var(s_at_idx), rhs: AssignRhs::Index { array: seq, index: idx } }),
            VecStmt::Scalar(Assign { lhs: Place::Var(c_at_j), rhs: AssignRhs::Index { array: c, index: j } }),
            VecStmt::Scalar(Assign {
                lhs: Place::Var(d),
                rhs: AssignRhs::BinOp { op: BinOpKind::Sub, left: s_at_idx, right: c_at_j },
            }),
            VecStmt::Scalar(Assign {
                lhs: Place::Var(p),
                rhs: AssignRhs::BinOp { op: BinOpKind::Mul, left: d, right: d },
            }),
            VecStmt::Scalar(Assign {
                lhs: Place::Var(sum2),
                rhs: AssignRhs::BinOp { op: BinOpKind::Add, left: sum, right: p },
            }),
        ];
        let body_nodes = (0..body.len()).collect();
        let reduce = ReduceLoop { counter: j, low, high: d_bound, body, body_nodes };

        let lifted = lift_one_reduce(reduce);

        assert!(matches!(lifted.last(), Some(VecStmt::Reduce(_))));
        let Some(VecStmt::Reduce(remaining)) = lifted.last() else { unreachable!() };
        assert_eq!(remaining.body.len(), 1, "only the sum carry should remain scalar");

        assert!(lifted[..lifted.len() - 1].iter().any(|s| matches!(s, VecStmt::Vector(VecAssign { rhs: VecRhs::Iota(_), .. }))));
        assert!(lifted[..lifted.len() - 1]
            .iter()
            .any(|s| matches!(s, VecStmt::Vector(VecAssign { rhs: VecRhs::Gather { .. }, .. }))));
    }

    #[test]
    fn loop_with_no_residual_capability_is_left_alone() {
        let i = sym("i");
        let low = Var::synthetic(0);
        let high = sym("n");
        let acc = sym("acc");
        let acc2 = Var::synthetic(1);
        let elem = Var::synthetic(2);

        let body = vec![
            VecStmt::Scalar(Assign { lhs: Place::Var(elem), rhs: AssignRhs::Index { array: sym("seq"), index: i } }),
            VecStmt::Scalar(Assign {
                lhs: Place::Var(acc2),
                rhs: AssignRhs::BinOp { op: BinOpKind::Add, left: acc, right: elem },
            }),
            VecStmt::Scalar(Assign { lhs: Place::Var(acc), rhs: AssignRhs::Var(acc2) }),
        ];
        let body_nodes = (0..body.len()).collect();
        let reduce = ReduceLoop { counter: i, low, high, body, body_nodes };
        let before_len = reduce.body.len();

        let lifted = lift_one_reduce(reduce);
        assert_eq!(lifted.len(), 1);
        let Some(VecStmt::Reduce(remaining)) = lifted.into_iter().next() else { unreachable!() };
        assert_eq!(remaining.body.len(), before_len);
    }

    #[test]
    fn gather_of_an_array_written_elsewhere_in_the_same_loop_is_not_hoisted() {
        // Same shape as `affine_index_lifts_via_iota_and_gather`, plus a
        // write to `S` (the array the Gather would read) via some
        // unrelated index `k` earlier in the body. The Gather's own
        // index (`idx`, a hoisted vector) still matches phase 1/2's
        // usual eligibility rule, but `S` being written elsewhere in
        // this loop must still block it.
        let i = sym("i");
        let d_bound = sym("D");
        let j = sym("j");
        let k = sym("k");
        let low = Var::synthetic(0);
        let seq = sym("S");
        let junk = Var::synthetic(0);
        let idx = Var::synthetic(1);
        let s_at_idx = Var::synthetic(2);

        let body = vec![
            VecStmt::Scalar(Assign { lhs: Place::Index { array: seq, index: k }, rhs: AssignRhs::Var(junk) }),
            VecStmt::Scalar(Assign {
                lhs: Place::Var(idx),
                rhs: AssignRhs::BinOp { op: BinOpKind::Add, left: i, right: j },
            }),
            VecStmt::Scalar(Assign { lhs: Place::Var(s_at_idx), rhs: AssignRhs::Index { array: seq, index: idx } }),
        ];
        let body_nodes = (0..body.len()).collect();
        let reduce = ReduceLoop { counter: j, low, high: d_bound, body: body.clone(), body_nodes };

        // `idx`'s own definition (`i + j`) has nothing to do with `S`
        // and still hoists to a pre-loop `Iota`/`BinOp` vector pair, so
        // the loop doesn't stay a single untouched `Reduce` — only the
        // `S`-touching ops are required to stay scalar.
        let lifted = lift_one_reduce(reduce);
        let no_gather_touches_seq = lifted.iter().all(|stmt| match stmt {
            VecStmt::Vector(v) => !matches!(v.rhs, VecRhs::Gather { array, .. } if array == seq),
            _ => true,
        });
        assert!(no_gather_touches_seq, "S must never be read through a Gather while also written in this loop");

        let reduce_bodies: Vec<&VecStmt> = lifted
            .iter()
            .filter_map(|stmt| match stmt {
                VecStmt::Reduce(r) => Some(r.body.iter()),
                _ => None,
            })
            .flatten()
            .collect();
        let seq_write_survives = reduce_bodies.iter().any(|stmt| {
            matches!(stmt, VecStmt::Scalar(a) if matches!(&a.lhs, Place::Index { array, .. } if *array == seq))
        });
        let seq_read_survives = reduce_bodies.iter().any(|stmt| {
            matches!(stmt, VecStmt::Scalar(a) if matches!(&a.rhs, AssignRhs::Index { array, .. } if *array == seq))
        });
        assert!(seq_write_survives, "the write to S must remain scalar");
        assert!(seq_read_survives, "the read of S must remain scalar");
    }
}
