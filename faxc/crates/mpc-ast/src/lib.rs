//! The shared IR vocabulary (`vocab`) and restricted AST (`restricted`)
//! that every later lowering stage is built on top of, plus the error
//! taxonomy (`error`) those stages report through.

pub mod error;
pub mod restricted;
pub mod vocab;

pub use error::{CompileError, CompileResult, InternalAssertionError, SyntaxError, TypeError};
pub use restricted::{Expression, Function, Statement};
pub use vocab::{
    BinOp, BinOpKind, Constant, DataType, LoopBound, Parameter, Subscript, SubscriptIndex,
    UnaryOp, UnaryOpKind, Var, VarName, VarType, Visibility,
};
