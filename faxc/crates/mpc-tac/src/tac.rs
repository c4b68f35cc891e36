//! Three-address-code IR: basic blocks, phi functions, and the CFG
//! that threads them together (spec.md §3 "Basic block (TAC/SSA)" and
//! "CFG").

use indexmap::IndexMap;
use mpc_ast::{BinOpKind, Constant, UnaryOpKind, Var};
use mpc_util::{define_idx, IndexVec};
use std::fmt;

define_idx!(BlockId);

/// `lhs := list[rhs]`, one per predecessor, ordered by predecessor
/// iteration order of the CFG (stable across the pass).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    pub lhs: Var,
    pub rhs: Vec<Var>,
}

impl fmt::Display for Phi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rhs = self.rhs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "{} := phi({})", self.lhs, rhs)
    }
}

/// The right-hand side of a three-address assignment: exactly one
/// operator applied to `Var`/`Constant` operands, never a nested
/// expression.
///
/// `Mux` is not part of spec.md §3's "Basic block" enumeration, but
/// §4.5 requires Φ-to-mux lowering to "synthesize a scalar select"
/// `mux(cond, then, else)` and §4.11 gives it type-propagation rules —
/// it is the output shape of C5 and the input shape of C9/C11, so it
/// lives here alongside the other three-address RHS forms rather than
/// as a separate node kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignRhs {
    ConstantInt(Constant),
    Var(Var),
    Index { array: Var, index: Var },
    BinOp { op: BinOpKind, left: Var, right: Var },
    UnaryOp { op: UnaryOpKind, operand: Var },
    Mux { cond: Var, then_val: Var, else_val: Var },
}

impl fmt::Display for AssignRhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignRhs::ConstantInt(c) => write!(f, "{}", c),
            AssignRhs::Var(v) => write!(f, "{}", v),
            AssignRhs::Index { array, index } => write!(f, "{}[{}]", array, index),
            AssignRhs::BinOp { op, left, right } => write!(f, "({} {} {})", left, op, right),
            AssignRhs::UnaryOp { op, operand } => write!(f, "{} {}", op, operand),
            AssignRhs::Mux { cond, then_val, else_val } => {
                write!(f, "mux({}, {}, {})", cond, then_val, else_val)
            }
        }
    }
}

/// The assignment target: either a plain variable or one element of an
/// array variable. Grounded in the same shape as a general-purpose
/// `Place`, narrowed to the two cases this language's data model needs
/// — no field or pointer projections, since arbitrary-rank arrays and
/// heap-aliased structures are out of scope (spec.md §1 Non-goals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Place {
    Var(Var),
    Index { array: Var, index: Var },
}

impl Place {
    /// The variable this place ultimately writes through — itself for
    /// `Var`, the array for `Index`. Used by DCE's aliasing rule
    /// (spec.md §4.6: "writes through a Subscript whose array is live").
    pub fn root_var(&self) -> Var {
        match self {
            Place::Var(v) => *v,
            Place::Index { array, .. } => *array,
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Var(v) => write!(f, "{}", v),
            Place::Index { array, index } => write!(f, "{}[{}]", array, index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assign {
    pub lhs: Place,
    pub rhs: AssignRhs,
}

impl fmt::Display for Assign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {}", self.lhs, self.rhs)
    }
}

/// Every block has exactly one terminator, consistent with its out-edges:
/// `Jump` carries its single `UNCONDITIONAL` target; `ConditionalJump`
/// carries only the branch condition — its `TRUE`/`FALSE` targets are
/// the block's two out-edges in the CFG, not duplicated here; `Return`
/// has none. `Return` carries one `Var` per returned value — length 1
/// for an ordinary `return expr`, length N for `return a, b, ..., n`
/// (spec.md §3 Non-goals cover neither; see `mpc_ast::restricted::Statement::Return`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Jump(BlockId),
    ConditionalJump { cond: Var },
    Return(Vec<Var>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub phi_functions: Vec<Phi>,
    pub assignments: Vec<Assign>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(terminator: Terminator) -> Self {
        BasicBlock { phi_functions: Vec::new(), assignments: Vec::new(), terminator }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for phi in &self.phi_functions {
            writeln!(f, "{}", phi)?;
        }
        for assign in &self.assignments {
            writeln!(f, "{}", assign)?;
        }
        match &self.terminator {
            Terminator::Jump(target) => write!(f, "jump {}", target.0),
            Terminator::ConditionalJump { cond } => write!(f, "branch {}", cond),
            Terminator::Return(values) => {
                write!(f, "return {}", values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    Unconditional,
    True,
    False,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BranchKind::Unconditional => "UNCONDITIONAL",
            BranchKind::True => "TRUE",
            BranchKind::False => "FALSE",
        };
        write!(f, "{}", s)
    }
}

/// A directed graph of basic blocks. Edges are appended in the order
/// the builder discovers them and never reordered afterward — this is
/// the ordering the determinism requirement (spec.md §5) depends on
/// for stable predecessor-index enumeration in `Phi` operand order.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub blocks: IndexVec<BlockId, BasicBlock>,
    edges: Vec<(BlockId, BlockId, BranchKind)>,
    pub entry_block: BlockId,
    pub exit_block: BlockId,
    /// Join blocks produced by `If` lowering, mapped to the branch
    /// condition that splits their predecessors into a `TRUE` half
    /// (predecessor index 0) and a `FALSE` half (predecessor index 1).
    /// Mux lowering (spec.md §4.5) reads this to tell an if-join's Φs
    /// apart from a loop header's carried-variable Φs, which are absent
    /// from this map and left untouched for the loop-linear pass.
    if_joins: IndexMap<BlockId, Var>,
}

impl Cfg {
    pub fn new(blocks: IndexVec<BlockId, BasicBlock>, entry_block: BlockId, exit_block: BlockId) -> Self {
        Cfg { blocks, edges: Vec::new(), entry_block, exit_block, if_joins: IndexMap::new() }
    }

    pub fn mark_if_join(&mut self, join: BlockId, cond: Var) {
        self.if_joins.insert(join, cond);
    }

    pub fn if_join_condition(&self, block: BlockId) -> Option<Var> {
        self.if_joins.get(&block).copied()
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: BranchKind) {
        self.edges.push((from, to, kind));
    }

    pub fn edges(&self) -> &[(BlockId, BlockId, BranchKind)] {
        &self.edges
    }

    /// Successors of `block` in edge-insertion order.
    pub fn successors(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.edges.iter().filter(move |(from, _, _)| *from == block).map(|(_, to, _)| *to)
    }

    /// Predecessors of `block` in edge-insertion order — this order is
    /// the "predecessor iteration order" spec.md §3 requires Φ operands
    /// to follow.
    pub fn predecessors(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.edges.iter().filter(move |(_, to, _)| *to == block).map(|(from, _, _)| *from)
    }

    /// The 0-based index of `pred` among `block`'s predecessors, in
    /// the stable order `predecessors` returns. Used by the SSA
    /// renamer and the mux lowerer to pick the right Φ operand.
    pub fn predecessor_index(&self, block: BlockId, pred: BlockId) -> Option<usize> {
        self.predecessors(block).position(|p| p == pred)
    }

    pub fn true_successor(&self, block: BlockId) -> Option<BlockId> {
        self.edges.iter().find(|(from, _, k)| *from == block && *k == BranchKind::True).map(|(_, to, _)| *to)
    }

    pub fn false_successor(&self, block: BlockId) -> Option<BlockId> {
        self.edges.iter().find(|(from, _, k)| *from == block && *k == BranchKind::False).map(|(_, to, _)| *to)
    }

    pub fn in_degree(&self, block: BlockId) -> usize {
        self.predecessors(block).count()
    }

    pub fn block_indices(&self) -> impl Iterator<Item = BlockId> {
        self.blocks.indices()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: mpc_util::Symbol,
    pub parameters: Vec<mpc_ast::Parameter>,
    pub body: Cfg,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self.parameters.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        writeln!(f, "Function {}({}):", self.name.as_str(), parameters)?;
        writeln!(f, "Entry block: {}", self.body.entry_block.0)?;
        writeln!(f, "Exit block: {}", self.body.exit_block.0)?;
        for (id, block) in self.body.blocks.iter_enumerated() {
            writeln!(f, "Block {}:", id.0)?;
            for line in block.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        let edges = self
            .body
            .edges()
            .iter()
            .map(|(src, dst, kind)| format!("({}, {}, {})", src.0, dst.0, kind))
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "Edges: {}", edges)
    }
}

impl PartialEq for Cfg {
    fn eq(&self, other: &Self) -> bool {
        self.blocks.len() == other.blocks.len()
            && self.entry_block == other.entry_block
            && self.exit_block == other.exit_block
            && self.edges == other.edges
            && self.blocks.iter_enumerated().zip(other.blocks.iter_enumerated()).all(|((_, a), (_, b))| a == b)
    }
}
impl Eq for Cfg {}
