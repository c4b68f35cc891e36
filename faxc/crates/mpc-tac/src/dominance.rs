//! Dominance and dominance-frontier analysis, computed with the
//! Cooper-Harvey-Kennedy iterative algorithm over a reverse-postorder
//! traversal (spec.md §9 Design Notes), rather than the teacher's
//! naive dominator-set intersection in the orphaned `analysis/cfg.rs`.
//! Node order must be stable, so every intermediate map here is an
//! `IndexMap` keyed by `BlockId` in reverse-postorder, never a
//! `HashMap` (spec.md §5 determinism requirement).

use crate::tac::{BlockId, Cfg};
use indexmap::{IndexMap, IndexSet};
use mpc_ast::error::InternalAssertionError;

/// Immediate dominators and dominance frontiers for one function's CFG.
pub struct DominanceInfo {
    /// `idom[b]` is `b`'s immediate dominator. The entry block is its
    /// own entry in this map but is never treated as self-dominating
    /// by `dominates`/`strictly_dominates` (spec.md §9 Open Question:
    /// reject a dominator-tree entry whose idom equals itself except
    /// for the entry block).
    idom: IndexMap<BlockId, BlockId>,
    frontiers: IndexMap<BlockId, IndexSet<BlockId>>,
    rpo: Vec<BlockId>,
    entry: BlockId,
}

impl DominanceInfo {
    pub fn compute(cfg: &Cfg) -> Result<Self, InternalAssertionError> {
        let rpo = reverse_postorder(cfg);
        let rpo_index: IndexMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: IndexMap<BlockId, BlockId> = IndexMap::new();
        idom.insert(cfg.entry_block, cfg.entry_block);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let preds: Vec<BlockId> =
                    cfg.predecessors(block).filter(|p| idom.contains_key(p)).collect();
                let Some((&first, rest)) = preds.split_first() else { continue };
                let mut new_idom = first;
                for &pred in rest {
                    new_idom = intersect(&idom, &rpo_index, new_idom, pred);
                }
                if idom.get(&block) != Some(&new_idom) {
                    idom.insert(block, new_idom);
                    changed = true;
                }
            }
        }

        for &block in &rpo {
            if block != cfg.entry_block {
                if let Some(&d) = idom.get(&block) {
                    if d == block {
                        return Err(InternalAssertionError::new(
                            "dominance",
                            format!("block {} dominates itself (spurious self-dominance)", block.0),
                        ));
                    }
                }
            }
        }

        let frontiers = compute_frontiers(cfg, &idom, &rpo);

        Ok(DominanceInfo { idom, frontiers, rpo, entry: cfg.entry_block })
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        if block == self.entry {
            return None;
        }
        self.idom.get(&block).copied()
    }

    pub fn frontier(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.frontiers.get(&block).into_iter().flatten().copied()
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return false;
        }
        let mut cur = b;
        while let Some(idom) = self.immediate_dominator(cur) {
            if idom == a {
                return true;
            }
            cur = idom;
        }
        false
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        a == b || self.strictly_dominates(a, b)
    }

    /// Dominator-tree children of `block`, in reverse-postorder (the
    /// order the SSA renamer's DFS must recurse in for determinism).
    pub fn children(&self, block: BlockId) -> Vec<BlockId> {
        self.rpo
            .iter()
            .copied()
            .filter(|&b| b != self.entry && self.idom.get(&b) == Some(&block) && b != block)
            .collect()
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }
}

fn intersect(
    idom: &IndexMap<BlockId, BlockId>,
    rpo_index: &IndexMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

fn compute_frontiers(
    cfg: &Cfg,
    idom: &IndexMap<BlockId, BlockId>,
    rpo: &[BlockId],
) -> IndexMap<BlockId, IndexSet<BlockId>> {
    let mut frontiers: IndexMap<BlockId, IndexSet<BlockId>> =
        rpo.iter().map(|&b| (b, IndexSet::new())).collect();

    for &block in rpo {
        let preds: Vec<BlockId> = cfg.predecessors(block).collect();
        if preds.len() < 2 {
            continue;
        }
        for pred in preds {
            if !idom.contains_key(&pred) {
                continue;
            }
            let mut runner = pred;
            while Some(&runner) != idom.get(&block) {
                frontiers.entry(runner).or_default().insert(block);
                match idom.get(&runner) {
                    Some(&next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }

    frontiers
}

/// Reverse postorder over the CFG starting at the entry block, using
/// insertion-order successor iteration so output is stable across runs
/// for the same input (spec.md §5).
fn reverse_postorder(cfg: &Cfg) -> Vec<BlockId> {
    let mut visited: IndexSet<BlockId> = IndexSet::new();
    let mut postorder = Vec::new();

    fn visit(cfg: &Cfg, block: BlockId, visited: &mut IndexSet<BlockId>, postorder: &mut Vec<BlockId>) {
        if !visited.insert(block) {
            return;
        }
        for succ in cfg.successors(block) {
            visit(cfg, succ, visited, postorder);
        }
        postorder.push(block);
    }

    visit(cfg, cfg.entry_block, &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}
