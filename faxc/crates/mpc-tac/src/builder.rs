//! TAC CFG builder (spec.md §4.3): lowers the restricted AST's
//! structured statements into basic blocks with typed terminators.

use crate::tac::{AssignRhs, Assign, BasicBlock, BranchKind, Cfg, Function as TacFunction, Place, Terminator};
use crate::BlockId;
use mpc_ast::error::InternalAssertionError;
use mpc_ast::{BinOp, BinOpKind, Constant, Expression, LoopBound, Statement, SubscriptIndex, UnaryOp, Var};
use mpc_util::IndexVec;

pub fn lower_function(source: &mpc_ast::Function) -> Result<TacFunction, InternalAssertionError> {
    let mut builder = Builder::new();
    let entry = builder.new_block();
    builder.current = entry;
    builder.lower_block(&source.body)?;
    let body = builder.finish(entry)?;
    Ok(TacFunction { name: source.name, parameters: source.parameters.clone(), body })
}

/// Scratch terminator every freshly allocated block starts with;
/// overwritten before the block is ever reachable from the entry.
fn scratch_terminator() -> Terminator {
    Terminator::Jump(BlockId(0))
}

struct Builder {
    blocks: IndexVec<BlockId, BasicBlock>,
    edges: Vec<(BlockId, BlockId, BranchKind)>,
    current: BlockId,
    temp_counter: u32,
    returned: bool,
    if_joins: Vec<(BlockId, Var)>,
}

impl Builder {
    fn new() -> Self {
        Builder {
            blocks: IndexVec::new(),
            edges: Vec::new(),
            current: BlockId(0),
            temp_counter: 0,
            returned: false,
            if_joins: Vec::new(),
        }
    }

    fn new_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::new(scratch_terminator()))
    }

    fn fresh_temp(&mut self) -> Var {
        let id = self.temp_counter;
        self.temp_counter += 1;
        Var::synthetic(id)
    }

    fn push_assign(&mut self, lhs: Place, rhs: AssignRhs) {
        self.blocks[self.current].assignments.push(Assign { lhs, rhs });
    }

    fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.blocks[block].terminator = terminator;
    }

    fn push_edge(&mut self, from: BlockId, to: BlockId, kind: BranchKind) {
        self.edges.push((from, to, kind));
    }

    fn jump_to(&mut self, from: BlockId, to: BlockId) {
        self.set_terminator(from, Terminator::Jump(to));
        self.push_edge(from, to, BranchKind::Unconditional);
    }

    /// Lowers a statement list, extending `self.current` forward with
    /// whatever new blocks `For`/`If` need. After this returns,
    /// `self.current` is the block control falls into next (unless a
    /// `Return` was already seen, which terminates the function).
    fn lower_block(&mut self, stmts: &[Statement]) -> Result<(), InternalAssertionError> {
        for stmt in stmts {
            if self.returned {
                break;
            }
            match stmt {
                Statement::Assign { lhs, rhs } => {
                    let rhs_var = self.lower_expr(rhs)?;
                    let place = self.lower_place(lhs)?;
                    self.push_assign(place, AssignRhs::Var(rhs_var));
                }
                Statement::For { counter, low, high, body } => {
                    self.lower_for(*counter, low, high, body)?;
                }
                Statement::If { condition, then_branch, else_branch } => {
                    self.lower_if(condition, then_branch, else_branch)?;
                }
                Statement::Return(expr) => {
                    let values = self.lower_return_values(expr)?;
                    self.set_terminator(self.current, Terminator::Return(values));
                    self.returned = true;
                }
            }
        }
        Ok(())
    }

    fn lower_place(&mut self, expr: &Expression) -> Result<Place, InternalAssertionError> {
        match expr {
            Expression::Var(v) => Ok(Place::Var(*v)),
            Expression::Subscript(s) => {
                let index = self.lower_subscript_index(&s.index)?;
                Ok(Place::Index { array: s.array, index })
            }
            other => Err(InternalAssertionError::new(
                "tac_builder",
                format!("expression `{}` is not a valid assignment target", other),
            )),
        }
    }

    /// `return`'s operand is the one place a bare `Tuple`/`List` is
    /// legal (spec.md §8's `biometric` scenario returns a pair): each
    /// element lowers through the ordinary `lower_expr` path and the
    /// terminator carries the resulting `Var`s in source order. A
    /// scalar `return expr` is just the one-element case.
    fn lower_return_values(&mut self, expr: &Expression) -> Result<Vec<Var>, InternalAssertionError> {
        match expr {
            Expression::Tuple(elems) | Expression::List(elems) => {
                elems.iter().map(|e| self.lower_expr(e)).collect()
            }
            other => Ok(vec![self.lower_expr(other)?]),
        }
    }

    /// Flattens a compound expression into a chain of three-address
    /// assignments, returning the `Var` holding the final value. A
    /// bare `Tuple`/`List` expression is only legal directly under a
    /// `Return` (see `lower_return_values`); anywhere else it is a
    /// builder-stage invariant violation, not a user error, because the
    /// (out-of-scope) restriction validator is responsible for
    /// rejecting it earlier.
    fn lower_expr(&mut self, expr: &Expression) -> Result<Var, InternalAssertionError> {
        match expr {
            Expression::Var(v) => Ok(*v),
            Expression::Constant(c) => {
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::ConstantInt(*c));
                Ok(tmp)
            }
            Expression::Subscript(s) => {
                let index = self.lower_subscript_index(&s.index)?;
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::Index { array: s.array, index });
                Ok(tmp)
            }
            Expression::BinOp(BinOp { left, operator, right }) => {
                let l = self.lower_expr(left)?;
                let r = self.lower_expr(right)?;
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::BinOp { op: *operator, left: l, right: r });
                Ok(tmp)
            }
            Expression::UnaryOp(UnaryOp { operator, operand }) => {
                let v = self.lower_expr(operand)?;
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::UnaryOp { op: *operator, operand: v });
                Ok(tmp)
            }
            Expression::List(_) | Expression::Tuple(_) => Err(InternalAssertionError::new(
                "tac_builder",
                "list/tuple constructors cannot be lowered to a single TAC operand outside `return`",
            )),
        }
    }

    fn lower_subscript_index(&mut self, index: &SubscriptIndex) -> Result<Var, InternalAssertionError> {
        match index {
            SubscriptIndex::Var(v) => Ok(*v),
            SubscriptIndex::Constant(c) => {
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::ConstantInt(*c));
                Ok(tmp)
            }
            SubscriptIndex::BinOp(BinOp { left, operator, right }) => {
                let l = self.lower_subscript_index(left)?;
                let r = self.lower_subscript_index(right)?;
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::BinOp { op: *operator, left: l, right: r });
                Ok(tmp)
            }
            SubscriptIndex::UnaryOp(UnaryOp { operator, operand }) => {
                let v = self.lower_subscript_index(operand)?;
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::UnaryOp { op: *operator, operand: v });
                Ok(tmp)
            }
        }
    }

    fn lower_bound(&mut self, bound: &LoopBound) -> Var {
        match bound {
            LoopBound::Var(v) => *v,
            LoopBound::Constant(c) => {
                let tmp = self.fresh_temp();
                self.push_assign(Place::Var(tmp), AssignRhs::ConstantInt(*c));
                tmp
            }
        }
    }

    /// `For(counter, low, high, body)`: pre-header initializes the
    /// counter; a header block tests `counter < high`; the body runs
    /// on the `TRUE` edge; a latch increments the counter and jumps
    /// back to the header; the `FALSE` edge falls through to a join
    /// block that becomes the new current block. The counter's name is
    /// preserved unchanged so the loop-linear pass (spec.md §4.7) can
    /// recover this pattern later by matching header/latch shape.
    fn lower_for(
        &mut self,
        counter: Var,
        low: &LoopBound,
        high: &LoopBound,
        body: &[Statement],
    ) -> Result<(), InternalAssertionError> {
        let low_var = self.lower_bound(low);
        self.push_assign(Place::Var(counter), AssignRhs::Var(low_var));
        let preheader = self.current;

        let header = self.new_block();
        self.jump_to(preheader, header);
        self.current = header;
        let high_var = self.lower_bound(high);
        let cond = self.fresh_temp();
        self.push_assign(Place::Var(cond), AssignRhs::BinOp { op: BinOpKind::Lt, left: counter, right: high_var });

        let body_entry = self.new_block();
        let join = self.new_block();
        self.set_terminator(header, Terminator::ConditionalJump { cond });
        self.push_edge(header, body_entry, BranchKind::True);
        self.push_edge(header, join, BranchKind::False);

        self.current = body_entry;
        self.lower_block(body)?;
        if !self.returned {
            let body_exit = self.current;
            let latch = self.new_block();
            self.jump_to(body_exit, latch);
            self.current = latch;
            let one = self.fresh_temp();
            self.push_assign(Place::Var(one), AssignRhs::ConstantInt(Constant::int(1)));
            let next_counter = self.fresh_temp();
            self.push_assign(Place::Var(next_counter), AssignRhs::BinOp { op: BinOpKind::Add, left: counter, right: one });
            self.push_assign(Place::Var(counter), AssignRhs::Var(next_counter));
            self.jump_to(latch, header);
        }

        self.current = join;
        Ok(())
    }

    /// `If(cond, then, else)`: a branch block with `TRUE`/`FALSE`
    /// children and a shared join block. An empty `else_branch` still
    /// materializes its own empty block that jumps straight to the
    /// join, per spec.md §4.3.
    fn lower_if(
        &mut self,
        condition: &Expression,
        then_branch: &[Statement],
        else_branch: &[Statement],
    ) -> Result<(), InternalAssertionError> {
        let cond = self.lower_expr(condition)?;
        let branch = self.current;

        let then_entry = self.new_block();
        let else_entry = self.new_block();
        self.set_terminator(branch, Terminator::ConditionalJump { cond });
        self.push_edge(branch, then_entry, BranchKind::True);
        self.push_edge(branch, else_entry, BranchKind::False);

        self.current = then_entry;
        self.lower_block(then_branch)?;
        let then_returned = self.returned;
        let then_exit = self.current;
        self.returned = false;

        self.current = else_entry;
        self.lower_block(else_branch)?;
        let else_returned = self.returned;
        let else_exit = self.current;

        self.returned = then_returned && else_returned;
        if !self.returned {
            let join = self.new_block();
            if !then_returned {
                self.jump_to(then_exit, join);
            }
            if !else_returned {
                self.jump_to(else_exit, join);
            }
            // Only a genuine two-predecessor merge carries a Φ the mux
            // lowerer needs to resolve; a one-sided fall-through has no
            // dominance-frontier Φ placed here at all.
            if !then_returned && !else_returned {
                self.if_joins.push((join, cond));
            }
            self.current = join;
        }
        Ok(())
    }

    fn finish(self, entry: BlockId) -> Result<Cfg, InternalAssertionError> {
        if !self.returned {
            return Err(InternalAssertionError::new(
                "tac_builder",
                "function body fell off the end without a `return`",
            ));
        }
        let exit = self.current;
        let mut cfg = Cfg::new(self.blocks, entry, exit);
        for (from, to, kind) in self.edges {
            cfg.add_edge(from, to, kind);
        }
        for (join, cond) in self.if_joins {
            cfg.mark_if_join(join, cond);
        }
        Ok(cfg)
    }
}
