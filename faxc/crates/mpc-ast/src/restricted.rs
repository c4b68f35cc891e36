//! The restricted AST: the validated source tree handed to this crate
//! by the (out-of-scope) parser and restriction-validator. This is the
//! upstream boundary named in spec.md §6 — nothing upstream of this
//! module is implemented here.

use crate::vocab::{BinOp, Constant, LoopBound, Parameter, Subscript, UnaryOp, Var};
use std::fmt;

/// A tagged union of expression forms legal in the restricted subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Var(Var),
    Constant(Constant),
    Subscript(Subscript),
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    BinOp(BinOp<Expression>),
    UnaryOp(UnaryOp<Expression>),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Var(v) => write!(f, "{}", v),
            Expression::Constant(c) => write!(f, "{}", c),
            Expression::Subscript(s) => write!(f, "{}", s),
            Expression::List(items) => {
                write!(f, "[{}]", items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))
            }
            Expression::Tuple(items) => {
                write!(f, "({})", items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))
            }
            Expression::BinOp(b) => write!(f, "{}", b),
            Expression::UnaryOp(u) => write!(f, "{}", u),
        }
    }
}

/// A statement in the restricted subset.
///
/// `Return` is not enumerated in spec.md §3's "Statements" line, but
/// §3's "Basic block" entry requires every exit block to end in a
/// `Return` terminator, and the `biometric` golden scenario (§8)
/// returns more than one value. We supplement the distilled grammar
/// with an explicit `Return` whose operand may be a `Tuple`
/// expression: the TAC builder lowers each tuple element to its own
/// `Var` and the terminator carries the resulting list (a plain
/// single-value `return` is just the one-element case). See
/// DESIGN.md for this decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign { lhs: Expression, rhs: Expression },
    For { counter: Var, low: LoopBound, high: LoopBound, body: Vec<Statement> },
    If { condition: Expression, then_branch: Vec<Statement>, else_branch: Vec<Statement> },
    Return(Expression),
}

/// The single function this compiler lowers. Multi-function programs
/// and recursion are out of scope (spec.md §1 Non-goals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: mpc_util::Symbol,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
}

impl Function {
    /// Party indices for `SHARED` parameters, assigned in declaration
    /// order starting at 0. Recomputed on demand rather than cached, so
    /// a caller constructing a `Function` by hand can never hand us a
    /// `Parameter` with a stale `party_idx`.
    pub fn assign_party_indices(&mut self) {
        let mut next = 0u32;
        for param in &mut self.parameters {
            if param.var_type.is_shared() {
                param.party_idx = Some(next);
                next += 1;
            } else {
                param.party_idx = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{DataType, VarType, Visibility};

    #[test]
    fn party_indices_assigned_in_declaration_order_skipping_plaintext() {
        let mut f = Function {
            name: mpc_util::Symbol::intern("f"),
            parameters: vec![
                Parameter {
                    var: Var::user(mpc_util::Symbol::intern("a")),
                    var_type: VarType::new(Visibility::Shared, 0, DataType::Int),
                    default_values: vec![],
                    party_idx: None,
                },
                Parameter {
                    var: Var::user(mpc_util::Symbol::intern("n")),
                    var_type: VarType::new(Visibility::Plaintext, 0, DataType::Int),
                    default_values: vec![],
                    party_idx: None,
                },
                Parameter {
                    var: Var::user(mpc_util::Symbol::intern("b")),
                    var_type: VarType::new(Visibility::Shared, 1, DataType::Int),
                    default_values: vec![],
                    party_idx: None,
                },
            ],
            body: vec![],
        };
        f.assign_party_indices();
        assert_eq!(f.parameters[0].party_idx, Some(0));
        assert_eq!(f.parameters[1].party_idx, None);
        assert_eq!(f.parameters[2].party_idx, Some(1));
    }
}
