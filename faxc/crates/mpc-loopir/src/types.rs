//! Type propagator (spec.md §4.11): a fixed-point dataflow over the
//! loop-linear IR inferring `visibility × dims × datatype` for every
//! `Var`. Parameters seed their declared types; every op's rhs both
//! constrains and is constrained by its operand/result types via
//! `VarType::merge` until nothing changes.

use crate::depgraph::DepGraph;
use crate::lir::{ForLoop, LoopLinearFunction, LoopLinearStmt};
use indexmap::IndexMap;
use mpc_ast::error::TypeError;
use mpc_ast::{BinOpKind, DataType, Parameter};
use mpc_tac::{Assign, AssignRhs, Place};
use mpc_ast::{Var, VarType, Visibility};
use std::fmt;

/// Assigns a `VarType` to every `Var` the typed IR references.
/// Printed form (spec.md §6) dumps bindings in first-seen order, the
/// deterministic iteration order every pass in this crate relies on.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    bindings: IndexMap<Var, VarType>,
}

impl TypeEnv {
    pub fn get(&self, v: Var) -> VarType {
        self.bindings.get(&v.base()).copied().unwrap_or(VarType::UNKNOWN)
    }

    fn set(&mut self, v: Var, t: VarType) {
        self.bindings.insert(v.base(), t);
    }

    /// Testable property 6 (spec.md §8): after 4.11, `is_complete()`
    /// holds for every `VarType` in the environment.
    pub fn all_complete(&self) -> bool {
        self.bindings.values().all(VarType::is_complete)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Var, VarType)> + '_ {
        self.bindings.iter().map(|(&v, &t)| (v, t))
    }
}

impl fmt::Display for TypeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (v, t) in &self.bindings {
            writeln!(f, "{}: {}", v, t)?;
        }
        Ok(())
    }
}

/// Runs type propagation to a fixed point over `function`'s body,
/// returning the body unchanged (spec.md §4.11 rewrites nothing — it
/// only annotates) alongside the inferred `TypeEnv`.
pub fn propagate_types(
    function: &LoopLinearFunction,
    _dep_graph: &DepGraph,
) -> Result<(LoopLinearFunction, TypeEnv), TypeError> {
    let mut env = TypeEnv::default();
    for param in &function.parameters {
        env.set(param.var, param.var_type);
    }
    // Loop counters and bounds are always plaintext ints (spec.md §3:
    // "Loops are plaintext-bounded") and never appear as a declared
    // parameter when compiler-synthesized, so they are seeded directly
    // rather than inferred from use.
    seed_loop_counters(&function.body, &mut env);

    loop {
        let mut changed = false;
        visit_stmts(&function.body, &mut env, &mut changed)?;
        if !changed {
            break;
        }
    }

    Ok((function.clone(), env))
}

fn seed_loop_counters(body: &[LoopLinearStmt], env: &mut TypeEnv) {
    for stmt in body {
        if let LoopLinearStmt::For(ForLoop { counter, body: inner, .. }) = stmt {
            if !env.get(*counter).is_complete() {
                env.set(*counter, VarType::plaintext_int());
            }
            seed_loop_counters(inner, env);
        }
    }
}

fn visit_stmts(body: &[LoopLinearStmt], env: &mut TypeEnv, changed: &mut bool) -> Result<(), TypeError> {
    for stmt in body {
        match stmt {
            LoopLinearStmt::Assign(assign) => visit_assign(assign, env, changed)?,
            LoopLinearStmt::For(for_loop) => {
                *changed |= merge_var(env, for_loop.low, VarType::plaintext_int())?;
                *changed |= merge_var(env, for_loop.high, VarType::plaintext_int())?;
                *changed |= merge_var(env, for_loop.counter, VarType::plaintext_int())?;
                visit_stmts(&for_loop.body, env, changed)?;
            }
        }
    }
    Ok(())
}

fn visit_assign(assign: &Assign, env: &mut TypeEnv, changed: &mut bool) -> Result<(), TypeError> {
    match &assign.rhs {
        AssignRhs::ConstantInt(c) => {
            let t = VarType { visibility: Some(Visibility::Plaintext), dims: Some(0), datatype: Some(c.datatype) };
            assign_lhs(assign, env, t, changed)?;
        }
        AssignRhs::Var(v) => {
            let src = env.get(*v);
            assign_lhs(assign, env, src, changed)?;
            // Bidirectional: the lhs's type (e.g. a loop-carried
            // accumulator typed by its header use) flows back to the
            // rhs `Var` too.
            let lhs_t = env.get(assign_lhs_root(assign));
            *changed |= merge_var(env, *v, lhs_t)?;
        }
        AssignRhs::Index { array, index } => {
            *changed |= merge_var(env, *index, VarType::plaintext_int())?;
            let elem_t = env.get(*array).drop_dim();
            assign_lhs(assign, env, elem_t, changed)?;
            // The element type observed at the use site also
            // constrains the array's own dimensionality/datatype.
            let lhs_t = env.get(assign_lhs_root(assign));
            *changed |= merge_var(env, *array, lhs_t.add_dim())?;
        }
        AssignRhs::BinOp { op, left, right } => {
            let operand_dt = op.get_operand_datatypes();
            let mixed = operand_dt.len() > 1;
            let merged_operand = VarType::merge(&[env.get(*left), env.get(*right)], mixed)
                .map_err(|e| merge_err(assign, e))?;
            *changed |= merge_var(env, *left, VarType { datatype: None, ..merged_operand })?;
            *changed |= merge_var(env, *right, VarType { datatype: None, ..merged_operand })?;
            let ret_t = VarType {
                visibility: merged_operand.visibility,
                dims: Some(0),
                datatype: Some(op.get_ret_datatype()),
            };
            assign_lhs(assign, env, ret_t, changed)?;
        }
        AssignRhs::UnaryOp { op, operand } => {
            let operand_t = env.get(*operand);
            let ret_t = VarType { visibility: operand_t.visibility, dims: Some(0), datatype: Some(op.get_ret_datatype()) };
            assign_lhs(assign, env, ret_t, changed)?;
        }
        AssignRhs::Mux { cond, then_val, else_val } => {
            *changed |= merge_var(
                env,
                *cond,
                VarType { visibility: None, dims: Some(0), datatype: Some(DataType::Bool) },
            )?;
            let merged = VarType::merge(&[env.get(*then_val), env.get(*else_val)], false)
                .map_err(|e| merge_err(assign, e))?;
            *changed |= merge_var(env, *then_val, merged)?;
            *changed |= merge_var(env, *else_val, merged)?;
            assign_lhs(assign, env, merged, changed)?;
        }
    }
    Ok(())
}

fn assign_lhs_root(assign: &Assign) -> Var {
    match &assign.lhs {
        Place::Var(v) => *v,
        Place::Index { array, .. } => *array,
    }
}

fn assign_lhs(assign: &Assign, env: &mut TypeEnv, t: VarType, changed: &mut bool) -> Result<(), TypeError> {
    match &assign.lhs {
        Place::Var(v) => {
            *changed |= merge_var(env, *v, t)?;
        }
        Place::Index { array, index } => {
            *changed |= merge_var(env, *index, VarType::plaintext_int())?;
            *changed |= merge_var(env, *array, t.add_dim())?;
        }
    }
    Ok(())
}

fn merge_var(env: &mut TypeEnv, v: Var, t: VarType) -> Result<bool, TypeError> {
    let current = env.get(v);
    let merged = VarType::merge(&[current, t], false).map_err(|e| TypeError {
        message: e.to_string(),
        offending_op: v.to_string(),
    })?;
    let changed = merged != current;
    env.set(v, merged);
    Ok(changed)
}

fn merge_err(assign: &Assign, e: mpc_ast::vocab::TypeMergeError) -> TypeError {
    TypeError { message: e.to_string(), offending_op: assign.to_string() }
}
