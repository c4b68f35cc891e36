//! End-to-end golden scenario (spec.md §8), adapted from
//! `examples/original_source/benchmarks/biometric.py`:
//!
//! ```text
//! def biometric(C, D, S, N):
//!     min_sum = 10000
//!     min_index = -1
//!     for i in range(N):
//!         sum = 0
//!         for j in range(D):
//!             d = S[i*D+j] - C[j]
//!             p = d*d
//!             sum = sum + p
//!         if sum < min_sum:
//!             min_sum = sum
//!             min_index = i
//!     return (min_sum, min_index)
//! ```
//!
//! The inner loop's `S[i*D+j]` is exactly the affine-index shape
//! `phase2::affine_index_lifts_via_iota_and_gather` exercises directly:
//! phase 1 cannot hoist it (its index is neither the counter `j` alone
//! nor a value read through another array), so the distance/square
//! computation survives to phase 2, which lifts it via `Iota`/`Gather`
//! and leaves only the `sum` accumulator behind as a reduction.

mod common;

use common::*;
use mpc_ast::BinOpKind;
use mpc_vectorize::{VecRhs, VecStmt};

fn source() -> mpc_ast::Function {
    function(
        "biometric",
        vec![shared_param("C", 1), plaintext_param("D"), shared_param("S", 1), plaintext_param("N")],
        vec![
            assign(evar("min_sum"), eint(10000)),
            assign(evar("min_index"), eint(-1)),
            for_loop(
                "i",
                lb_const(0),
                lb_var("N"),
                vec![
                    assign(evar("sum"), eint(0)),
                    for_loop(
                        "j",
                        lb_const(0),
                        lb_var("D"),
                        vec![
                            assign(
                                evar("d"),
                                ebin(
                                    BinOpKind::Sub,
                                    esub("S", si_bin(BinOpKind::Add, si_bin(BinOpKind::Mul, si_var("i"), si_var("D")), si_var("j"))),
                                    esub("C", si_var("j")),
                                ),
                            ),
                            assign(evar("p"), ebin(BinOpKind::Mul, evar("d"), evar("d"))),
                            assign(evar("sum"), ebin(BinOpKind::Add, evar("sum"), evar("p"))),
                        ],
                    ),
                    if_stmt(
                        ebin(BinOpKind::Lt, evar("sum"), evar("min_sum")),
                        vec![assign(evar("min_sum"), evar("sum")), assign(evar("min_index"), evar("i"))],
                        vec![],
                    ),
                ],
            ),
            ret(etuple(vec![evar("min_sum"), evar("min_index")])),
        ],
    )
}

#[test]
fn compiles_through_every_stage() {
    let outputs = mpc_pipeline::compile_function(&source(), &mpc_pipeline::CompileOptions::default())
        .expect("pipeline should accept the biometric program");
    assert_eq!(outputs.vectorized.return_values.len(), 2, "min_sum and min_index both come back");
    assert!(outputs.type_env.all_complete());
}

/// The inner loop's distance/square computation should lift via
/// `Iota`/`Gather` even though phase 1 alone cannot touch it.
#[test]
fn inner_affine_index_lifts_via_iota_and_gather() {
    let outputs = mpc_pipeline::compile_function(&source(), &mpc_pipeline::CompileOptions::default()).unwrap();
    let all = mpc_vectorize::walk_vec_stmts(&outputs.vectorized.body);

    let has_iota = all.iter().any(|s| matches!(s, VecStmt::Vector(v) if matches!(v.rhs, VecRhs::Iota(_))));
    let has_gather = all.iter().any(|s| matches!(s, VecStmt::Vector(v) if matches!(v.rhs, VecRhs::Gather { .. })));
    assert!(has_iota, "expected an Iota lifting of the inner counter in:\n{}", outputs.vectorized);
    assert!(has_gather, "expected a Gather lifting of the affine S index in:\n{}", outputs.vectorized);
}

/// `sum` (inner loop) and `min_sum`/`min_index` (outer loop) are both
/// loop-carried; some `Reduce` should still remain even after phase 2.
#[test]
fn carried_accumulators_remain_reduces() {
    let outputs = mpc_pipeline::compile_function(&source(), &mpc_pipeline::CompileOptions::default()).unwrap();
    assert!(mpc_vectorize::walk_vec_stmts(&outputs.vectorized.body).iter().any(|s| matches!(s, VecStmt::Reduce(_))));
}
