//! Small restricted-AST builder helpers shared by the end-to-end
//! golden tests below. Mirrors the teacher's own integration tests
//! (`faxc-drv/tests/`), which hand-construct IR directly in Rust
//! rather than parsing source text, since this crate has no parser.

#![allow(dead_code)]

use mpc_ast::{
    BinOp, BinOpKind, Constant, DataType, Expression, Function, LoopBound, Parameter, Statement,
    Subscript, SubscriptIndex, UnaryOp, UnaryOpKind, Var, VarType, Visibility,
};
use mpc_util::Symbol;

pub fn var(name: &str) -> Var {
    Var::user(Symbol::intern(name))
}

pub fn evar(name: &str) -> Expression {
    Expression::Var(var(name))
}

pub fn eint(value: i64) -> Expression {
    Expression::Constant(Constant::int(value))
}

pub fn ebool(value: bool) -> Expression {
    Expression::Constant(Constant::bool(value))
}

pub fn esub(array: &str, index: SubscriptIndex) -> Expression {
    Expression::Subscript(Subscript { array: var(array), index })
}

pub fn etuple(items: Vec<Expression>) -> Expression {
    Expression::Tuple(items)
}

pub fn ebin(op: BinOpKind, left: Expression, right: Expression) -> Expression {
    Expression::BinOp(BinOp { left: Box::new(left), operator: op, right: Box::new(right) })
}

pub fn eun(op: UnaryOpKind, operand: Expression) -> Expression {
    Expression::UnaryOp(UnaryOp { operator: op, operand: Box::new(operand) })
}

pub fn si_var(name: &str) -> SubscriptIndex {
    SubscriptIndex::Var(var(name))
}

pub fn si_const(value: i64) -> SubscriptIndex {
    SubscriptIndex::Constant(Constant::int(value))
}

pub fn si_bin(op: BinOpKind, left: SubscriptIndex, right: SubscriptIndex) -> SubscriptIndex {
    SubscriptIndex::BinOp(BinOp { left: Box::new(left), operator: op, right: Box::new(right) })
}

pub fn assign(lhs: Expression, rhs: Expression) -> Statement {
    Statement::Assign { lhs, rhs }
}

pub fn for_loop(counter: &str, low: LoopBound, high: LoopBound, body: Vec<Statement>) -> Statement {
    Statement::For { counter: var(counter), low, high, body }
}

pub fn if_stmt(condition: Expression, then_branch: Vec<Statement>, else_branch: Vec<Statement>) -> Statement {
    Statement::If { condition, then_branch, else_branch }
}

pub fn ret(expr: Expression) -> Statement {
    Statement::Return(expr)
}

pub fn lb_var(name: &str) -> LoopBound {
    LoopBound::Var(var(name))
}

pub fn lb_const(value: i64) -> LoopBound {
    LoopBound::Constant(Constant::int(value))
}

/// A `shared[list[int]]` (dims=1) or `shared[int]` (dims=0) parameter.
pub fn shared_param(name: &str, dims: u32) -> Parameter {
    Parameter {
        var: var(name),
        var_type: VarType::new(Visibility::Shared, dims, DataType::Int),
        default_values: vec![],
        party_idx: None,
    }
}

/// A `plaintext[int]` (dims=0) parameter — loop bounds and sizes.
pub fn plaintext_param(name: &str) -> Parameter {
    Parameter {
        var: var(name),
        var_type: VarType::new(Visibility::Plaintext, 0, DataType::Int),
        default_values: vec![],
        party_idx: None,
    }
}

pub fn function(name: &str, parameters: Vec<Parameter>, body: Vec<Statement>) -> Function {
    let mut f = Function { name: Symbol::intern(name), parameters, body };
    f.assign_party_indices();
    f
}
