//! End-to-end golden scenario (spec.md §8): the longest run of
//! consecutive elements in `Seq` that differ from `Sym`.
//!
//! ```text
//! def max_dist_between_syms(Seq, N, Sym):
//!     max_dist = 0
//!     current_dist = 0
//!     for i in range(0, N):
//!         if not (Seq[i] == Sym):
//!             current_dist = current_dist + 1
//!         else:
//!             current_dist = 0
//!         if current_dist > max_dist:
//!             max_dist = current_dist
//!     return max_dist
//! ```

mod common;

use common::*;
use mpc_ast::{BinOpKind, UnaryOpKind};
use mpc_vectorize::VecStmt;

fn source() -> mpc_ast::Function {
    function(
        "max_dist_between_syms",
        vec![shared_param("Seq", 1), plaintext_param("N"), shared_param("Sym", 0)],
        vec![
            assign(evar("max_dist"), eint(0)),
            assign(evar("current_dist"), eint(0)),
            for_loop(
                "i",
                lb_const(0),
                lb_var("N"),
                vec![
                    if_stmt(
                        eun(UnaryOpKind::Not, ebin(BinOpKind::Eq, esub("Seq", si_var("i")), evar("Sym"))),
                        vec![assign(
                            evar("current_dist"),
                            ebin(BinOpKind::Add, evar("current_dist"), eint(1)),
                        )],
                        vec![assign(evar("current_dist"), eint(0))],
                    ),
                    if_stmt(
                        ebin(BinOpKind::Gt, evar("current_dist"), evar("max_dist")),
                        vec![assign(evar("max_dist"), evar("current_dist"))],
                        vec![],
                    ),
                ],
            ),
            ret(evar("max_dist")),
        ],
    )
}

#[test]
fn compiles_through_every_stage() {
    let outputs = mpc_pipeline::compile_function(&source(), &mpc_pipeline::CompileOptions::default())
        .expect("pipeline should accept this restricted-AST program");

    assert!(!outputs.tac_ssa.body.blocks.is_empty());
    assert!(outputs.type_env.all_complete(), "every var should get a complete type: {}", outputs.type_env);
}

/// `max_dist`/`current_dist` are both loop-carried (each iteration's
/// value depends on the previous), so no vectorization phase can lift
/// the whole loop — it must survive as a `Reduce`, matching
/// `phase1`'s own `accumulator_loop_stays_reduce_with_hoisted_comparison`
/// unit test for this exact shape.
#[test]
fn outer_loop_survives_as_a_reduce() {
    let outputs = mpc_pipeline::compile_function(&source(), &mpc_pipeline::CompileOptions::default()).unwrap();
    assert!(
        outputs.vectorized.body.iter().any(|s| matches!(s, VecStmt::Reduce(_))),
        "expected a surviving Reduce loop in: {}",
        outputs.vectorized
    );
}

#[test]
fn tac_ssa_has_no_duplicate_definitions() {
    let outputs = mpc_pipeline::compile_function(&source(), &mpc_pipeline::CompileOptions::default()).unwrap();
    mpc_tac::check_ssa_uniqueness(&outputs.tac_ssa.body).expect("SSA form should already be unique");
}

#[test]
fn no_if_join_phis_remain_after_mux_lowering() {
    let outputs = mpc_pipeline::compile_function(&source(), &mpc_pipeline::CompileOptions::default()).unwrap();
    mpc_tac::check_no_if_join_phis_remain(&outputs.tac_mux.body)
        .expect("mux lowering should have cleared every if-join Φ");
}
