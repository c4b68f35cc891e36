//! SSA construction (spec.md §4.4): Φ placement via dominance
//! frontiers (Cytron-Ferrante), followed by dominator-tree-driven
//! variable renaming. Grounded on
//! `examples/original_source/compiler/compiler/tac_cfg_to_ssa.py`'s
//! "second form" (spec.md §9 Open Question) — the one that never seeds
//! a dominator-tree entry for a block with itself as immediate
//! dominator.

use crate::dominance::DominanceInfo;
use crate::tac::{AssignRhs, Assign, BlockId, Cfg, Phi, Place, Terminator};
use indexmap::{IndexMap, IndexSet};
use mpc_ast::error::InternalAssertionError;
use mpc_ast::Var;

/// Runs Φ placement then renaming in place over `cfg`, returning the
/// renamed `Var` each parameter's base name ends up bound to (subscript
/// 0, per spec.md §4.4: "Parameters are pre-seeded with subscript 0").
pub fn construct_ssa(cfg: &mut Cfg, parameters: &[Var]) -> Result<(), InternalAssertionError> {
    let dom = DominanceInfo::compute(cfg)?;
    place_phis(cfg, &dom);
    rename(cfg, &dom, parameters)
}

/// Cytron-Ferrante Φ placement. The worklist and per-block "already
/// placed" markers are driven by a monotone iteration-count stamp
/// rather than resetting a `HashSet` per variable, mirroring the
/// original's `has_already`/`work` counters keyed by `iter_count`.
fn place_phis(cfg: &mut Cfg, dom: &DominanceInfo) {
    let defs = collect_defs(cfg);

    let mut iter_count: u32 = 0;
    let mut has_already: IndexMap<BlockId, u32> = IndexMap::new();
    let mut in_work: IndexMap<BlockId, u32> = IndexMap::new();

    for (&var, def_blocks) in &defs {
        iter_count += 1;
        let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
        for &b in &worklist {
            in_work.insert(b, iter_count);
        }

        let mut cursor = 0;
        while cursor < worklist.len() {
            let x = worklist[cursor];
            cursor += 1;
            for y in dom.frontier(x).collect::<Vec<_>>() {
                if has_already.get(&y).copied() != Some(iter_count) {
                    let arity = cfg.in_degree(y);
                    cfg.blocks[y].phi_functions.push(Phi { lhs: var, rhs: vec![var; arity] });
                    has_already.insert(y, iter_count);
                    if in_work.get(&y).copied() != Some(iter_count) {
                        in_work.insert(y, iter_count);
                        worklist.push(y);
                    }
                }
            }
        }
    }
}

/// Every block (in insertion/iteration order) that directly assigns a
/// given base variable, keyed by variable in first-definition order —
/// `IndexMap` so the Φ-placement worklist seed order is deterministic.
fn collect_defs(cfg: &Cfg) -> IndexMap<Var, IndexSet<BlockId>> {
    let mut defs: IndexMap<Var, IndexSet<BlockId>> = IndexMap::new();
    for block in cfg.block_indices() {
        for assign in &cfg.blocks[block].assignments {
            if let Place::Var(v) = assign.lhs {
                defs.entry(v).or_default().insert(block);
            }
        }
        for phi in &cfg.blocks[block].phi_functions {
            defs.entry(phi.lhs).or_default().insert(block);
        }
    }
    defs
}

struct RenameState {
    stacks: IndexMap<Var, Vec<u32>>,
    counters: IndexMap<Var, u32>,
}

impl RenameState {
    fn top(&self, v: Var) -> Option<u32> {
        self.stacks.get(&v).and_then(|s| s.last()).copied()
    }

    fn push_def(&mut self, v: Var) -> u32 {
        let counter = self.counters.entry(v).or_insert(0);
        let i = *counter;
        *counter += 1;
        self.stacks.entry(v).or_default().push(i);
        i
    }

    fn pop_def(&mut self, v: Var) {
        self.stacks.entry(v).or_default().pop();
    }
}

fn rename(cfg: &mut Cfg, dom: &DominanceInfo, parameters: &[Var]) -> Result<(), InternalAssertionError> {
    let mut state = RenameState { stacks: IndexMap::new(), counters: IndexMap::new() };
    for &p in parameters {
        state.stacks.entry(p).or_default().push(0);
        state.counters.insert(p, 1);
    }

    rename_block(cfg, dom, dom.entry(), &mut state)
}

fn rename_block(
    cfg: &mut Cfg,
    dom: &DominanceInfo,
    block: BlockId,
    state: &mut RenameState,
) -> Result<(), InternalAssertionError> {
    let mut defined_here: Vec<Var> = Vec::new();

    let phi_count = cfg.blocks[block].phi_functions.len();
    for i in 0..phi_count {
        let base = cfg.blocks[block].phi_functions[i].lhs.base();
        let i_new = state.push_def(base);
        cfg.blocks[block].phi_functions[i].lhs = base.with_subscript(i_new);
        defined_here.push(base);
    }

    let assign_count = cfg.blocks[block].assignments.len();
    for i in 0..assign_count {
        rename_rhs_in_place(&mut cfg.blocks[block].assignments[i], state)?;
        match cfg.blocks[block].assignments[i].lhs.clone() {
            Place::Var(v) => {
                let base = v.base();
                let i_new = state.push_def(base);
                cfg.blocks[block].assignments[i].lhs = Place::Var(base.with_subscript(i_new));
                defined_here.push(base);
            }
            Place::Index { array, index } => {
                let array_sub = state.top(array.base()).ok_or_else(|| {
                    InternalAssertionError::new("ssa_rename", format!("undefined use of `{}`", array))
                })?;
                let index_sub = state.top(index.base()).ok_or_else(|| {
                    InternalAssertionError::new("ssa_rename", format!("undefined use of `{}`", index))
                })?;
                cfg.blocks[block].assignments[i].lhs = Place::Index {
                    array: array.base().with_subscript(array_sub),
                    index: index.base().with_subscript(index_sub),
                };
            }
        }
    }

    match cfg.blocks[block].terminator.clone() {
        Terminator::ConditionalJump { cond } => {
            let sub = state
                .top(cond.base())
                .ok_or_else(|| InternalAssertionError::new("ssa_rename", format!("undefined use of `{}`", cond)))?;
            cfg.blocks[block].terminator = Terminator::ConditionalJump { cond: cond.base().with_subscript(sub) };
        }
        Terminator::Return(values) => {
            let renamed = values
                .iter()
                .map(|&value| {
                    state.top(value.base()).map(|sub| value.base().with_subscript(sub)).ok_or_else(|| {
                        InternalAssertionError::new("ssa_rename", format!("undefined use of `{}`", value))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            cfg.blocks[block].terminator = Terminator::Return(renamed);
        }
        Terminator::Jump(_) => {}
    }

    for succ in cfg.successors(block).collect::<Vec<_>>() {
        let j = cfg
            .predecessor_index(succ, block)
            .ok_or_else(|| InternalAssertionError::new("ssa_rename", "successor has no matching predecessor index"))?;
        let phi_count = cfg.blocks[succ].phi_functions.len();
        for k in 0..phi_count {
            let base = cfg.blocks[succ].phi_functions[k].lhs.base();
            let sub = state
                .top(base)
                .ok_or_else(|| InternalAssertionError::new("ssa_rename", format!("undefined use of `{}`", base)))?;
            cfg.blocks[succ].phi_functions[k].rhs[j] = base.with_subscript(sub);
        }
    }

    for child in dom.children(block) {
        rename_block(cfg, dom, child, state)?;
    }

    for v in defined_here {
        state.pop_def(v);
    }

    Ok(())
}

fn rename_rhs_in_place(assign: &mut Assign, state: &RenameState) -> Result<(), InternalAssertionError> {
    let rename_one = |v: Var| -> Result<Var, InternalAssertionError> {
        let sub = state
            .top(v.base())
            .ok_or_else(|| InternalAssertionError::new("ssa_rename", format!("undefined use of `{}`", v)))?;
        Ok(v.base().with_subscript(sub))
    };

    assign.rhs = match assign.rhs.clone() {
        AssignRhs::ConstantInt(c) => AssignRhs::ConstantInt(c),
        AssignRhs::Var(v) => AssignRhs::Var(rename_one(v)?),
        AssignRhs::Index { array, index } => {
            AssignRhs::Index { array: rename_one(array)?, index: rename_one(index)? }
        }
        AssignRhs::BinOp { op, left, right } => {
            AssignRhs::BinOp { op, left: rename_one(left)?, right: rename_one(right)? }
        }
        AssignRhs::UnaryOp { op, operand } => AssignRhs::UnaryOp { op, operand: rename_one(operand)? },
        AssignRhs::Mux { cond, then_val, else_val } => {
            AssignRhs::Mux { cond: rename_one(cond)?, then_val: rename_one(then_val)?, else_val: rename_one(else_val)? }
        }
    };
    Ok(())
}

/// Testable property 1 (spec.md §8): after SSA construction, every
/// `lhs` across all blocks of the function is unique.
pub fn check_ssa_uniqueness(cfg: &Cfg) -> Result<(), InternalAssertionError> {
    let mut seen: IndexSet<Var> = IndexSet::new();
    for block in cfg.block_indices() {
        for phi in &cfg.blocks[block].phi_functions {
            if !seen.insert(phi.lhs) {
                return Err(InternalAssertionError::new(
                    "ssa_check",
                    format!("duplicate SSA definition of `{}`", phi.lhs),
                ));
            }
        }
        for assign in &cfg.blocks[block].assignments {
            if let Place::Var(v) = assign.lhs {
                if !seen.insert(v) {
                    return Err(InternalAssertionError::new(
                        "ssa_check",
                        format!("duplicate SSA definition of `{}`", v),
                    ));
                }
            }
        }
    }
    Ok(())
}
