//! Dead code elimination (spec.md §4.6): iterate to a fixed point,
//! deleting any Φ or assignment whose `lhs` is never read, seeded from
//! the values every `Return` carries. Conservative under array
//! aliasing: a write through a `Place::Index` is kept live as long as
//! its *array* variable is live, since refining which individual
//! elements are actually read is out of scope (spec.md §1 Non-goals).

use crate::tac::{AssignRhs, Cfg, Place, Terminator};
use indexmap::IndexSet;
use mpc_ast::Var;

/// Removes dead Φs and assignments from every block of `cfg` in place,
/// iterating until nothing more can be removed. Idempotent (testable
/// property 4, spec.md §8): a second call is always a no-op.
pub fn eliminate_dead_code(cfg: &mut Cfg) {
    loop {
        let live = compute_live_vars(cfg);
        let mut changed = false;

        for block in cfg.block_indices() {
            let before_phis = cfg.blocks[block].phi_functions.len();
            cfg.blocks[block].phi_functions.retain(|phi| live.contains(&phi.lhs));
            changed |= cfg.blocks[block].phi_functions.len() != before_phis;

            let before_assigns = cfg.blocks[block].assignments.len();
            cfg.blocks[block].assignments.retain(|assign| live.contains(&assign.lhs.root_var()));
            changed |= cfg.blocks[block].assignments.len() != before_assigns;
        }

        if !changed {
            break;
        }
    }
}

/// A variable is live if it is read by a `Return`, a `ConditionalJump`,
/// any surviving Φ operand, or the rhs of any surviving assignment —
/// including an assignment whose own `lhs` is itself live (so a chain
/// of dependent definitions all survive together).
fn compute_live_vars(cfg: &Cfg) -> IndexSet<Var> {
    let mut live: IndexSet<Var> = IndexSet::new();

    for block in cfg.block_indices() {
        match &cfg.blocks[block].terminator {
            Terminator::Return(values) => {
                live.extend(values.iter().copied());
            }
            Terminator::ConditionalJump { cond } => {
                live.insert(*cond);
            }
            Terminator::Jump(_) => {}
        }
        for phi in &cfg.blocks[block].phi_functions {
            for &rhs in &phi.rhs {
                live.insert(rhs);
            }
        }
    }

    // Back-propagate through assignments until the live set stops
    // growing: an assignment's operands are only live once its own
    // `lhs` (or, for an indexed write, its array) is known live.
    loop {
        let mut grew = false;
        for block in cfg.block_indices() {
            for assign in &cfg.blocks[block].assignments {
                if !live.contains(&assign.lhs.root_var()) {
                    continue;
                }
                if let Place::Index { index, .. } = &assign.lhs {
                    grew |= live.insert(*index);
                }
                grew |= mark_rhs_live(&assign.rhs, &mut live);
            }
        }
        if !grew {
            break;
        }
    }

    live
}

fn mark_rhs_live(rhs: &AssignRhs, live: &mut IndexSet<Var>) -> bool {
    let mut grew = false;
    match rhs {
        AssignRhs::ConstantInt(_) => {}
        AssignRhs::Var(v) => grew |= live.insert(*v),
        AssignRhs::Index { array, index } => {
            grew |= live.insert(*array);
            grew |= live.insert(*index);
        }
        AssignRhs::BinOp { left, right, .. } => {
            grew |= live.insert(*left);
            grew |= live.insert(*right);
        }
        AssignRhs::UnaryOp { operand, .. } => grew |= live.insert(*operand),
        AssignRhs::Mux { cond, then_val, else_val } => {
            grew |= live.insert(*cond);
            grew |= live.insert(*then_val);
            grew |= live.insert(*else_val);
        }
    }
    grew
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::{Assign, BasicBlock};
    use mpc_util::IndexVec;

    #[test]
    fn unused_temp_is_removed_but_its_dependency_chain_of_used_value_survives() {
        let used = Var::synthetic(0);
        let dead = Var::synthetic(1);
        let dead_input = Var::synthetic(2);

        let mut blocks = IndexVec::new();
        let mut entry_block = BasicBlock::new(Terminator::Return(vec![used]));
        entry_block.assignments.push(Assign {
            lhs: Place::Var(dead_input),
            rhs: AssignRhs::ConstantInt(mpc_ast::Constant::int(1)),
        });
        entry_block.assignments.push(Assign {
            lhs: Place::Var(dead),
            rhs: AssignRhs::Var(dead_input),
        });
        entry_block.assignments.push(Assign {
            lhs: Place::Var(used),
            rhs: AssignRhs::ConstantInt(mpc_ast::Constant::int(2)),
        });
        let entry = blocks.push(entry_block);
        let cfg = Cfg::new(blocks, entry, entry);
        let mut cfg = cfg;

        eliminate_dead_code(&mut cfg);

        assert_eq!(cfg.blocks[entry].assignments.len(), 1);
        assert_eq!(cfg.blocks[entry].assignments[0].lhs, Place::Var(used));
    }

    #[test]
    fn running_twice_is_a_no_op() {
        let used = Var::synthetic(0);
        let dead = Var::synthetic(1);

        let mut blocks = IndexVec::new();
        let mut entry_block = BasicBlock::new(Terminator::Return(vec![used]));
        entry_block.assignments.push(Assign {
            lhs: Place::Var(dead),
            rhs: AssignRhs::ConstantInt(mpc_ast::Constant::int(1)),
        });
        entry_block.assignments.push(Assign {
            lhs: Place::Var(used),
            rhs: AssignRhs::ConstantInt(mpc_ast::Constant::int(2)),
        });
        let entry = blocks.push(entry_block);
        let mut cfg = Cfg::new(blocks, entry, entry);

        eliminate_dead_code(&mut cfg);
        let once = cfg.clone();
        eliminate_dead_code(&mut cfg);
        assert_eq!(cfg, once);
    }
}
