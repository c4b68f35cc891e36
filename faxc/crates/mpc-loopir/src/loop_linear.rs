//! Loop-linear form reconstruction (spec.md §4.7): rebuilds the
//! structured program by recognizing header/latch/join triples and
//! emitting nested `for` loops plus straight-line ops, with `if`
//! entirely gone (already lowered to `mux` by C5).
//!
//! Key invariant this pass relies on (spec.md §4.5): after Φ→mux
//! lowering, a block retains Φ-functions *iff* it is a loop header — an
//! if-join's Φs were all rewritten to `mux` assignments. So "does this
//! block still have Φs" is a sufficient loop-header test; no separate
//! structural back-edge search is needed.
//!
//! Array writes guarded by a plaintext-unreachable condition (spec.md
//! §4.9's "A := mux(c, A_then_branch, A)" starting point) are
//! synthesized directly here rather than in a separate whole-array-Φ
//! step: `mpc-tac::ssa` deliberately does not version array variables
//! on an indexed write (an `Index` place is a *use* of the array's
//! current version, never a redefinition — see its `rename_block`), so
//! a conditional `A[i] := v` never gets an automatic Φ of its own. This
//! pass detects that case directly (an indexed write living inside one
//! arm of an `If`, where the *same* array may or may not be touched by
//! the other arm) and emits the element-level guarded form
//! `A[i] := mux(guard, v, A[i])` at the point of linearization. C9
//! (`refine`) then treats this shape as its established canonical form
//! rather than re-deriving it from a whole-array merge. See DESIGN.md.

use crate::lir::{ForLoop, LoopLinearFunction, LoopLinearStmt};
use indexmap::IndexMap;
use mpc_ast::error::InternalAssertionError;
use mpc_ast::{BinOpKind, UnaryOpKind, Var, VarName};
use mpc_tac::{Assign, AssignRhs, BlockId, Cfg, Function as TacFunction, Phi, Place, Terminator};

enum Exit {
    Stop,
    Return(Vec<Var>),
}

/// Monotonic synthetic-temp allocator seeded above every synthetic id
/// already used in the function, so freshly materialized guard/read
/// temps never collide with TAC-builder or SSA-renamer output.
struct TempGen {
    next: u32,
}

impl TempGen {
    fn seed_from(cfg: &Cfg) -> Self {
        let mut max = 0u32;
        let mut see = |v: Var| {
            if let VarName::Synthetic(id) = v.name {
                max = max.max(id + 1);
            }
        };
        for block in cfg.block_indices() {
            let b = &cfg.blocks[block];
            for phi in &b.phi_functions {
                see(phi.lhs);
                phi.rhs.iter().copied().for_each(&mut see);
            }
            for assign in &b.assignments {
                see_place(&assign.lhs, &mut see);
                see_rhs(&assign.rhs, &mut see);
            }
            match &b.terminator {
                Terminator::ConditionalJump { cond } => see(*cond),
                Terminator::Return(values) => values.iter().copied().for_each(&mut see),
                Terminator::Jump(_) => {}
            }
        }
        TempGen { next: max }
    }

    fn fresh(&mut self) -> Var {
        let id = self.next;
        self.next += 1;
        Var::synthetic(id)
    }
}

fn see_place(place: &Place, see: &mut impl FnMut(Var)) {
    match place {
        Place::Var(v) => see(*v),
        Place::Index { array, index } => {
            see(*array);
            see(*index);
        }
    }
}

fn see_rhs(rhs: &AssignRhs, see: &mut impl FnMut(Var)) {
    match rhs {
        AssignRhs::ConstantInt(_) => {}
        AssignRhs::Var(v) => see(*v),
        AssignRhs::Index { array, index } => {
            see(*array);
            see(*index);
        }
        AssignRhs::BinOp { left, right, .. } => {
            see(*left);
            see(*right);
        }
        AssignRhs::UnaryOp { operand, .. } => see(*operand),
        AssignRhs::Mux { cond, then_val, else_val } => {
            see(*cond);
            see(*then_val);
            see(*else_val);
        }
    }
}

/// Entry point: reconstructs loop-linear form for one TAC/SSA function.
pub fn reconstruct(function: &TacFunction) -> Result<LoopLinearFunction, InternalAssertionError> {
    let cfg = &function.body;
    let mut temp_gen = TempGen::seed_from(cfg);
    let cond_to_join = invert_if_joins(cfg);

    let (body, exit) = linearize(cfg, cfg.entry_block, None, &cond_to_join, &mut temp_gen)?;
    let Exit::Return(return_values) = exit else {
        return Err(InternalAssertionError::new(
            "loop_linear",
            "function body did not reach a `return` while linearizing",
        ));
    };

    Ok(LoopLinearFunction {
        name: function.name,
        parameters: function.parameters.clone(),
        body,
        return_values,
    })
}

fn invert_if_joins(cfg: &Cfg) -> IndexMap<Var, BlockId> {
    let mut map = IndexMap::new();
    for block in cfg.block_indices() {
        if let Some(cond) = cfg.if_join_condition(block) {
            map.insert(cond, block);
        }
    }
    map
}

/// Walks the CFG from `start` until it hits `stop` (exclusive) or a
/// `Return`, emitting straight-line ops and recursively-built `for`
/// loops in program order.
fn linearize(
    cfg: &Cfg,
    start: BlockId,
    stop: Option<BlockId>,
    cond_to_join: &IndexMap<Var, BlockId>,
    temp_gen: &mut TempGen,
) -> Result<(Vec<LoopLinearStmt>, Exit), InternalAssertionError> {
    let mut out = Vec::new();
    let mut current = start;

    loop {
        if Some(current) == stop {
            return Ok((out, Exit::Stop));
        }
        let block = &cfg.blocks[current];

        if !block.phi_functions.is_empty() {
            let (pre, for_loop, join) = build_for(cfg, current, cond_to_join, temp_gen)?;
            out.extend(pre);
            out.push(LoopLinearStmt::For(for_loop));
            current = join;
            continue;
        }

        out.extend(block.assignments.iter().cloned().map(LoopLinearStmt::Assign));

        match &block.terminator {
            Terminator::Jump(next) => {
                current = *next;
            }
            Terminator::Return(values) => {
                return Ok((out, Exit::Return(values.clone())));
            }
            Terminator::ConditionalJump { cond } => {
                let join = *cond_to_join.get(cond).ok_or_else(|| {
                    InternalAssertionError::new(
                        "loop_linear",
                        format!("branch on `{}` has no recorded if-join", cond),
                    )
                })?;
                let true_succ = cfg.true_successor(current).ok_or_else(|| {
                    InternalAssertionError::new("loop_linear", "conditional jump missing TRUE successor")
                })?;
                let false_succ = cfg.false_successor(current).ok_or_else(|| {
                    InternalAssertionError::new("loop_linear", "conditional jump missing FALSE successor")
                })?;

                let (then_stmts, then_exit) = linearize(cfg, true_succ, Some(join), cond_to_join, temp_gen)?;
                let (else_stmts, else_exit) = linearize(cfg, false_succ, Some(join), cond_to_join, temp_gen)?;

                out.extend(guard_index_writes(then_stmts, *cond, temp_gen));
                if !else_stmts.is_empty() {
                    let not_cond = temp_gen.fresh();
                    out.push(LoopLinearStmt::Assign(Assign {
                        lhs: Place::Var(not_cond),
                        rhs: AssignRhs::UnaryOp { op: UnaryOpKind::Not, operand: *cond },
                    }));
                    out.extend(guard_index_writes(else_stmts, not_cond, temp_gen));
                }

                match (then_exit, else_exit) {
                    (Exit::Stop, Exit::Stop) => {
                        current = join;
                    }
                    (Exit::Return(v), _) | (_, Exit::Return(v)) => {
                        return Ok((out, Exit::Return(v)));
                    }
                }
            }
        }
    }
}

/// Wraps every indexed write in `stmts` (recursing into nested `for`
/// bodies, since a loop living entirely inside one arm of an `if` needs
/// every one of its writes guarded too) with a `mux` against the
/// element's prior value, so executing both arms unconditionally
/// (spec.md §1: MPC backends cannot branch on secret data) still only
/// lets the taken arm's write take effect.
fn guard_index_writes(stmts: Vec<LoopLinearStmt>, guard: Var, temp_gen: &mut TempGen) -> Vec<LoopLinearStmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            LoopLinearStmt::Assign(assign) => out.extend(guard_index_write(assign, guard, temp_gen)),
            LoopLinearStmt::For(mut for_loop) => {
                for_loop.body = guard_index_writes(for_loop.body, guard, temp_gen);
                out.push(LoopLinearStmt::For(for_loop));
            }
        }
    }
    out
}

fn guard_index_write(assign: Assign, guard: Var, temp_gen: &mut TempGen) -> Vec<LoopLinearStmt> {
    let Place::Index { array, index } = assign.lhs else {
        return vec![LoopLinearStmt::Assign(assign)];
    };

    let mut out = Vec::new();
    let value_var = match assign.rhs {
        AssignRhs::Var(v) => v,
        other => {
            let tmp = temp_gen.fresh();
            out.push(LoopLinearStmt::Assign(Assign { lhs: Place::Var(tmp), rhs: other }));
            tmp
        }
    };
    let old_value = temp_gen.fresh();
    out.push(LoopLinearStmt::Assign(Assign {
        lhs: Place::Var(old_value),
        rhs: AssignRhs::Index { array, index },
    }));
    out.push(LoopLinearStmt::Assign(Assign {
        lhs: Place::Index { array, index },
        rhs: AssignRhs::Mux { cond: guard, then_val: value_var, else_val: old_value },
    }));
    out
}

/// Recovers one loop's `(counter, low, high, body)` from its header's
/// Φ-set, synthesizing pre-loop init copies and end-of-body carry
/// updates for every non-counter Φ (spec.md §4.10: "Loop-carried
/// scalars that survive... remain as scalar loops").
fn build_for(
    cfg: &Cfg,
    header: BlockId,
    cond_to_join: &IndexMap<Var, BlockId>,
    temp_gen: &mut TempGen,
) -> Result<(Vec<LoopLinearStmt>, ForLoop, BlockId), InternalAssertionError> {
    let block = &cfg.blocks[header];
    let Terminator::ConditionalJump { cond } = block.terminator else {
        return Err(InternalAssertionError::new("loop_linear", "loop header must end in a conditional jump"));
    };
    let body_entry = cfg
        .true_successor(header)
        .ok_or_else(|| InternalAssertionError::new("loop_linear", "loop header missing TRUE successor"))?;
    let join = cfg
        .false_successor(header)
        .ok_or_else(|| InternalAssertionError::new("loop_linear", "loop header missing FALSE successor"))?;

    let preds: Vec<BlockId> = cfg.predecessors(header).collect();
    if preds.len() != 2 {
        return Err(InternalAssertionError::new(
            "loop_linear",
            format!("loop header {} must have exactly two predecessors, found {}", header.0, preds.len()),
        ));
    }
    let latch = preds[1];
    if !matches!(cfg.blocks[latch].terminator, Terminator::Jump(t) if t == header) {
        return Err(InternalAssertionError::new("loop_linear", "latch block must jump straight back to its header"));
    }

    let (counter_phi_idx, high_var) = find_counter_phi(block, cond)?;
    let counter_phi = block.phi_functions[counter_phi_idx].clone();
    let low_var = counter_phi.rhs[0];
    let counter_base = counter_phi.lhs.base();

    let mut subst: IndexMap<Var, Var> = IndexMap::new();
    subst.insert(counter_phi.lhs, counter_base);

    let mut pre = Vec::new();
    let mut post_updates = Vec::new();
    for (i, phi) in block.phi_functions.iter().enumerate() {
        if i == counter_phi_idx {
            continue;
        }
        let base = phi.lhs.base();
        subst.insert(phi.lhs, base);
        pre.push(LoopLinearStmt::Assign(Assign { lhs: Place::Var(base), rhs: AssignRhs::Var(phi.rhs[0]) }));
        post_updates.push(Assign { lhs: Place::Var(base), rhs: AssignRhs::Var(phi.rhs[1]) });
    }

    let (body_stmts, exit) = linearize(cfg, body_entry, Some(latch), cond_to_join, temp_gen)?;
    if !matches!(exit, Exit::Stop) {
        return Err(InternalAssertionError::new("loop_linear", "a `return` inside a loop body is not supported"));
    }

    let mut body = substitute_stmts(&body_stmts, &subst);
    body.extend(post_updates.into_iter().map(|a| LoopLinearStmt::Assign(substitute_assign(a, &subst))));

    Ok((pre, ForLoop { counter: counter_base, low: low_var, high: high_var, body }, join))
}

/// Finds the header Φ driving the loop's bound check: the one
/// assignment `cond := counter < high` whose `left` operand is some
/// Φ's `lhs` in this very block (the builder always computes the bound
/// check using the counter's *own* current SSA version, so after
/// renaming this is a direct, unambiguous match).
fn find_counter_phi(block: &mpc_tac::BasicBlock, cond: Var) -> Result<(usize, Var), InternalAssertionError> {
    for assign in &block.assignments {
        if assign.lhs != Place::Var(cond) {
            continue;
        }
        if let AssignRhs::BinOp { op: BinOpKind::Lt, left, right } = assign.rhs {
            if let Some(idx) = block.phi_functions.iter().position(|p: &Phi| p.lhs == left) {
                return Ok((idx, right));
            }
        }
    }
    Err(InternalAssertionError::new("loop_linear", "loop header lacks a recognizable `counter < high` comparison"))
}

fn substitute_stmts(stmts: &[LoopLinearStmt], subst: &IndexMap<Var, Var>) -> Vec<LoopLinearStmt> {
    stmts
        .iter()
        .map(|stmt| match stmt {
            LoopLinearStmt::Assign(a) => LoopLinearStmt::Assign(substitute_assign(a.clone(), subst)),
            LoopLinearStmt::For(for_loop) => LoopLinearStmt::For(ForLoop {
                counter: for_loop.counter,
                low: rename(for_loop.low, subst),
                high: rename(for_loop.high, subst),
                body: substitute_stmts(&for_loop.body, subst),
            }),
        })
        .collect()
}

fn substitute_assign(assign: Assign, subst: &IndexMap<Var, Var>) -> Assign {
    let lhs = match assign.lhs {
        Place::Var(v) => Place::Var(rename(v, subst)),
        Place::Index { array, index } => Place::Index { array: rename(array, subst), index: rename(index, subst) },
    };
    let rhs = match assign.rhs {
        AssignRhs::ConstantInt(c) => AssignRhs::ConstantInt(c),
        AssignRhs::Var(v) => AssignRhs::Var(rename(v, subst)),
        AssignRhs::Index { array, index } => {
            AssignRhs::Index { array: rename(array, subst), index: rename(index, subst) }
        }
        AssignRhs::BinOp { op, left, right } => {
            AssignRhs::BinOp { op, left: rename(left, subst), right: rename(right, subst) }
        }
        AssignRhs::UnaryOp { op, operand } => AssignRhs::UnaryOp { op, operand: rename(operand, subst) },
        AssignRhs::Mux { cond, then_val, else_val } => {
            AssignRhs::Mux { cond: rename(cond, subst), then_val: rename(then_val, subst), else_val: rename(else_val, subst) }
        }
    };
    Assign { lhs, rhs }
}

fn rename(v: Var, subst: &IndexMap<Var, Var>) -> Var {
    subst.get(&v).copied().unwrap_or(v)
}
