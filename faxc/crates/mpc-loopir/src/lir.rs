//! Loop-linear IR (spec.md §3 "Statements"/§4.7): the output shape of
//! C7. No CFG, no Φ — a flat list of `for`-blocks (plaintext bounds,
//! nested bodies) and straight-line three-address ops, matching the
//! restricted AST's own `For`/`Assign` shape one level lower.
//!
//! Reuses `mpc_tac::{Assign, AssignRhs, Place}` rather than redefining
//! three-address ops: C7 only changes *how* ops are grouped (structured
//! loops instead of a CFG), never what an individual op looks like.

use mpc_ast::Var;
use mpc_tac::{Assign, AssignRhs, Place};
use std::fmt;

/// One element of a loop-linear body: either a straight-line op or a
/// nested nested `for`. There is no `If` — spec.md §4.7: "there is no
/// explicit if (it was lowered to mux in 4.5)".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopLinearStmt {
    Assign(Assign),
    For(ForLoop),
}

impl fmt::Display for LoopLinearStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopLinearStmt::Assign(a) => write!(f, "{}", a),
            LoopLinearStmt::For(for_loop) => write!(f, "{}", for_loop),
        }
    }
}

/// A structured `for counter in [low, high)` loop recovered from its
/// header/latch/join triple. `counter`/`low`/`high` are plaintext
/// (spec.md §3: "Loops are plaintext-bounded"). `counter` is the loop
/// variable's *base* name — the loop-linear form is no longer SSA, so
/// every loop-carried variable (the counter and any carried
/// accumulator) is de-subscripted back to its original name, matching
/// "Loop counters retain their original names" (spec.md §4.7). See
/// DESIGN.md "loop-carried de-SSA" for the rationale extending this to
/// non-counter carried variables too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForLoop {
    pub counter: Var,
    pub low: Var,
    pub high: Var,
    pub body: Vec<LoopLinearStmt>,
}

impl fmt::Display for ForLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "for {} in [{}, {}):", self.counter, self.low, self.high)?;
        for stmt in &self.body {
            for line in stmt.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        Ok(())
    }
}

/// The whole-function loop-linear IR handed to C8-C12. `return_values`
/// holds one `Var` per returned value — length 1 for an ordinary
/// `return`, length N for a tuple return (spec.md §8's `biometric`
/// scenario returns a pair).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopLinearFunction {
    pub name: mpc_util::Symbol,
    pub parameters: Vec<mpc_ast::Parameter>,
    pub body: Vec<LoopLinearStmt>,
    pub return_values: Vec<Var>,
}

impl fmt::Display for LoopLinearFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self.parameters.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        writeln!(f, "Function {}({}):", self.name.as_str(), parameters)?;
        for stmt in &self.body {
            for line in stmt.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        let returns = self.return_values.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "return {}", returns)
    }
}

/// Every `Assign`/`For` in program order, depth-first, pre-order —
/// the canonical traversal C8's dependency graph and C10/C12's
/// vectorizer walk in (spec.md §5: "order of insertion of the
/// underlying data structures").
pub fn walk_stmts(body: &[LoopLinearStmt]) -> Vec<&LoopLinearStmt> {
    let mut out = Vec::new();
    fn go<'a>(body: &'a [LoopLinearStmt], out: &mut Vec<&'a LoopLinearStmt>) {
        for stmt in body {
            out.push(stmt);
            if let LoopLinearStmt::For(for_loop) = stmt {
                go(&for_loop.body, out);
            }
        }
    }
    go(body, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpc_ast::{Constant, DataType, Visibility, VarType};

    #[test]
    fn display_nests_for_body_under_header() {
        let counter = Var::user(mpc_util::Symbol::intern("i"));
        let low = Var::synthetic(0);
        let high = Var::synthetic(1);
        let x = Var::synthetic(2);
        let body = vec![LoopLinearStmt::Assign(Assign {
            lhs: Place::Var(x),
            rhs: AssignRhs::ConstantInt(Constant::int(1)),
        })];
        let for_loop = ForLoop { counter, low, high, body };
        let rendered = for_loop.to_string();
        assert!(rendered.starts_with("for i in [!0, !1):\n"));
        assert!(rendered.contains("    !2 := 1"));
    }

    #[test]
    fn walk_stmts_visits_nested_for_body_after_header() {
        let inner_assign = LoopLinearStmt::Assign(Assign {
            lhs: Place::Var(Var::synthetic(0)),
            rhs: AssignRhs::ConstantInt(Constant::int(1)),
        });
        let inner_for = LoopLinearStmt::For(ForLoop {
            counter: Var::user(mpc_util::Symbol::intern("j")),
            low: Var::synthetic(1),
            high: Var::synthetic(2),
            body: vec![inner_assign.clone()],
        });
        let walked = walk_stmts(std::slice::from_ref(&inner_for));
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[0], &inner_for);
        assert_eq!(walked[1], &inner_assign);
        let _ = VarType::new(Visibility::Plaintext, 0, DataType::Int);
    }
}
