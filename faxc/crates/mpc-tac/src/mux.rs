//! Φ-to-mux lowering (spec.md §4.5): replaces every if-join Φ with a
//! data-dependent `mux(cond, then_val, else_val)` assignment, leaving
//! loop-header Φs (carried loop variables, recovered later by the
//! loop-linear pass) untouched.
//!
//! Blocks are visited in `BlockId` order, which for this builder is
//! also innermost-join-first: a nested `If`'s join block is always
//! allocated (and so given a smaller id) before the enclosing `If`'s
//! join, since `lower_if` only calls `new_block` for its own join
//! after both branches have finished recursing. Processing in that
//! order means an outer join's Φ operands already reference the
//! resolved `Var` an inner mux produced, so nesting composes for free
//! instead of requiring an explicit predicate AND-combination step.

use crate::tac::{Assign, AssignRhs, Cfg, Place};
use mpc_ast::error::InternalAssertionError;

/// Rewrites every if-join Φ in `cfg` into a `mux` assignment, in place.
pub fn lower_phis_to_mux(cfg: &mut Cfg) -> Result<(), InternalAssertionError> {
    for block in cfg.block_indices() {
        let Some(cond) = cfg.if_join_condition(block) else { continue };

        let phis = std::mem::take(&mut cfg.blocks[block].phi_functions);
        let mut muxes = Vec::with_capacity(phis.len());
        for phi in phis {
            if phi.rhs.len() != 2 {
                return Err(InternalAssertionError::new(
                    "mux_lowering",
                    format!("if-join block {} has a Φ with {} operands, expected 2", block.0, phi.rhs.len()),
                ));
            }
            let then_val = phi.rhs[0];
            let else_val = phi.rhs[1];
            muxes.push(Assign {
                lhs: Place::Var(phi.lhs),
                rhs: AssignRhs::Mux { cond, then_val, else_val },
            });
        }
        // Mux assignments read the branch's merged values, so they must
        // precede whatever the block already does with `phi.lhs`.
        muxes.extend(std::mem::take(&mut cfg.blocks[block].assignments));
        cfg.blocks[block].assignments = muxes;
    }
    Ok(())
}

/// Testable property (spec.md §4.5: "After substitution, no
/// Φ-functions remain anywhere in an if-join block").
pub fn check_no_if_join_phis_remain(cfg: &Cfg) -> Result<(), InternalAssertionError> {
    for block in cfg.block_indices() {
        if cfg.if_join_condition(block).is_some() && !cfg.blocks[block].phi_functions.is_empty() {
            return Err(InternalAssertionError::new(
                "mux_lowering",
                format!("if-join block {} still has unlowered Φ-functions", block.0),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tac::{BasicBlock, BlockId, BranchKind, Phi, Terminator};
    use mpc_util::IndexVec;

    #[test]
    fn diamond_phi_becomes_mux_with_true_then_false_else() {
        let cond = mpc_ast::Var::synthetic(0);
        let then_val = mpc_ast::Var::synthetic(1);
        let else_val = mpc_ast::Var::synthetic(2);
        let merged = mpc_ast::Var::synthetic(3);

        let mut blocks = IndexVec::new();
        let entry = blocks.push(BasicBlock::new(Terminator::ConditionalJump { cond }));
        let then_b = blocks.push(BasicBlock::new(Terminator::Jump(BlockId(0))));
        let else_b = blocks.push(BasicBlock::new(Terminator::Jump(BlockId(0))));
        let mut join_block = BasicBlock::new(Terminator::Return(vec![merged]));
        join_block.phi_functions.push(Phi { lhs: merged, rhs: vec![then_val, else_val] });
        let join = blocks.push(join_block);

        let mut cfg = Cfg::new(blocks, entry, join);
        cfg.add_edge(entry, then_b, BranchKind::True);
        cfg.add_edge(entry, else_b, BranchKind::False);
        cfg.add_edge(then_b, join, BranchKind::Unconditional);
        cfg.add_edge(else_b, join, BranchKind::Unconditional);
        cfg.mark_if_join(join, cond);

        lower_phis_to_mux(&mut cfg).unwrap();
        check_no_if_join_phis_remain(&cfg).unwrap();

        assert!(cfg.blocks[join].phi_functions.is_empty());
        assert_eq!(cfg.blocks[join].assignments.len(), 1);
        assert_eq!(
            cfg.blocks[join].assignments[0],
            Assign { lhs: Place::Var(merged), rhs: AssignRhs::Mux { cond, then_val, else_val } }
        );
    }

    #[test]
    fn loop_header_phi_is_left_untouched() {
        let cond = mpc_ast::Var::synthetic(0);
        let init = mpc_ast::Var::synthetic(1);
        let back_edge = mpc_ast::Var::synthetic(2);
        let carried = mpc_ast::Var::synthetic(3);

        let mut blocks = IndexVec::new();
        let mut header_block = BasicBlock::new(Terminator::ConditionalJump { cond });
        header_block.phi_functions.push(Phi { lhs: carried, rhs: vec![init, back_edge] });
        let header = blocks.push(header_block);
        let body = blocks.push(BasicBlock::new(Terminator::Jump(BlockId(0))));
        let latch = blocks.push(BasicBlock::new(Terminator::Jump(BlockId(0))));
        let join = blocks.push(BasicBlock::new(Terminator::Return(vec![carried])));

        let mut cfg = Cfg::new(blocks, header, join);
        cfg.add_edge(header, body, BranchKind::True);
        cfg.add_edge(header, join, BranchKind::False);
        cfg.add_edge(body, latch, BranchKind::Unconditional);
        cfg.add_edge(latch, header, BranchKind::Unconditional);
        // `header` is not in `if_joins`: it is a loop header, not an if-join.

        lower_phis_to_mux(&mut cfg).unwrap();
        assert_eq!(cfg.blocks[header].phi_functions.len(), 1);
    }
}
