//! Error taxonomy (spec.md §7). Every pipeline stage fails fast on the
//! first error — no partial IR is ever returned to the caller.

use mpc_util::diagnostic::{Diagnostic, DiagnosticBuilder, Level, SourceSnippet};
use mpc_util::Span;
use thiserror::Error;

/// An offending construct outside the restricted subset, at the
/// upstream parser/validator boundary.
#[derive(Debug, Error)]
#[error("{filename}:{line}:{column}: {message}\n{source_line}")]
pub struct SyntaxError {
    pub message: String,
    pub filename: String,
    pub line: u32,
    pub column: u32,
    pub source_line: String,
}

impl SyntaxError {
    /// Renders this error as a source snippet with a caret, per
    /// SPEC_FULL.md's ambient-stack diagnostics section.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let span = Span::point(self.line, self.column);
        let snippet = SourceSnippet::point(self.source_line.clone(), self.line as usize, self.column as usize);
        DiagnosticBuilder::error(self.message.clone())
            .span(span)
            .snippet(snippet)
            .with_note(format!("in {}", self.filename))
            .build()
    }
}

/// An incompatible type merge, unresolvable inference, or operator
/// applied to an unsupported operand type. Reports the offending
/// operation via its `Display` text rather than a structured AST
/// reference, matching the textual-IR golden-file surface.
#[derive(Debug, Error)]
#[error("type error in `{offending_op}`: {message}")]
pub struct TypeError {
    pub message: String,
    pub offending_op: String,
}

impl TypeError {
    pub fn dims_mismatch(offending_op: impl Into<String>, types: &[crate::vocab::VarType]) -> Self {
        TypeError {
            message: format!("cannot merge types with different dimensionality: {:?}", types),
            offending_op: offending_op.into(),
        }
    }

    pub fn datatype_mismatch(offending_op: impl Into<String>, types: &[crate::vocab::VarType]) -> Self {
        TypeError {
            message: format!("cannot merge types with different datatypes: {:?}", types),
            offending_op: offending_op.into(),
        }
    }

    /// Stages below the restricted AST (TAC, loop-linear, vectorized)
    /// carry no source span, so this renders without a snippet —
    /// the offending operation's printed IR text stands in for one.
    pub fn to_diagnostic(&self) -> Diagnostic {
        DiagnosticBuilder::error(format!("type error in `{}`", self.offending_op))
            .span(Span::DUMMY)
            .with_note(self.message.clone())
            .build()
    }
}

/// An invariant failure: undefined SSA use, missing dominator entry,
/// malformed CFG terminator. These are compiler bugs, not user errors;
/// they carry enough state to reproduce and are reported with the
/// stage name that raised them.
#[derive(Debug, Error)]
#[error("internal compiler error in stage `{stage}`: {message}")]
pub struct InternalAssertionError {
    pub stage: &'static str,
    pub message: String,
}

impl InternalAssertionError {
    pub fn new(stage: &'static str, message: impl Into<String>) -> Self {
        InternalAssertionError { stage, message: message.into() }
    }

    /// Renders via [`Level::Bug`] — these indicate a defect in this
    /// crate, never a malformed input program.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(Level::Bug, format!("internal compiler error in stage `{}`", self.stage), Span::DUMMY)
            .with_note(self.message.clone())
            .with_help("this is a bug in the compiler, not in the source program")
    }
}

/// Aggregate error type returned by every stage's public entry point.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Internal(#[from] InternalAssertionError),
}

impl CompileError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            CompileError::Syntax(e) => e.to_diagnostic(),
            CompileError::Type(e) => e.to_diagnostic(),
            CompileError::Internal(e) => e.to_diagnostic(),
        }
    }
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;
