// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{evolve, BranchedResult, Error, Inputs, Value};
use indoc::indoc;
use num_complex::Complex64;
use rustc_hash::FxHashMap;

fn run(source: &str) -> BranchedResult {
    evolve(source, &FxHashMap::default()).expect("program should evaluate")
}

fn bit_var(result: &BranchedResult, id: crate::PathId, name: &str) -> bool {
    match result
        .path(id)
        .variable(name)
        .unwrap_or_else(|| panic!("variable {name} should exist"))
    {
        Value::Bit(b) => b,
        other => panic!("variable {name} should be a bit, got {other}"),
    }
}

fn int_var(result: &BranchedResult, id: crate::PathId, name: &str) -> i64 {
    result
        .path(id)
        .variable(name)
        .unwrap_or_else(|| panic!("variable {name} should exist"))
        .unwrap_int()
}

fn assert_close(actual: Complex64, expected: Complex64) {
    assert!(
        (actual - expected).norm() < 1e-10,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn single_plus_state_measurement_yields_both_outcomes() {
    let result = run(indoc! {"
        qubit[1] q;
        bit b;
        h q[0];
        b = measure q[0];
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 2);
    let outcomes: Vec<Vec<bool>> = active
        .iter()
        .map(|id| result.path(*id).measurements["q[0]"].clone())
        .collect();
    assert_eq!(outcomes, vec![vec![false], vec![true]]);
}

#[test]
fn bell_pair_measurements_are_correlated() {
    let result = run(indoc! {"
        qubit[2] q;
        bit b0;
        bit b1;
        h q[0];
        cnot q[0], q[1];
        b0 = measure q[0];
        b1 = measure q[1];
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 2);
    for id in active {
        assert_eq!(bit_var(&result, id, "b0"), bit_var(&result, id, "b1"));
    }
}

#[test]
fn feedforward_applies_only_on_the_matching_path() {
    let result = run(indoc! {"
        qubit[2] q;
        bit b;
        bit b2;
        h q[0];
        b = measure q[0];
        if (b == 1) x q[1];
        b2 = measure q[1];
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 2);
    for id in active {
        let state = result.state_vector(id).expect("state should materialize");
        if bit_var(&result, id, "b") {
            assert_eq!(bit_var(&result, id, "b2"), true);
            assert_close(state[0b11], Complex64::new(1.0, 0.0));
        } else {
            assert_eq!(bit_var(&result, id, "b2"), false);
            assert_close(state[0b00], Complex64::new(1.0, 0.0));
        }
    }
}

#[test]
fn four_coin_flips_follow_the_binomial_distribution() {
    let result = run(indoc! {"
        qubit[4] q;
        bit[4] b;
        int count = 0;
        for uint i in [0:3] {
            h q[i];
            b[i] = measure q[i];
            if (b[i] == 1) {
                count = count + 1;
            }
        }
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 16);
    let mut histogram = [0usize; 5];
    for id in active {
        let count = int_var(&result, id, "count");
        histogram[usize::try_from(count).expect("count should be non-negative")] += 1;
    }
    assert_eq!(histogram, [1, 4, 6, 4, 1]);
}

#[test]
fn while_loop_paths_exit_on_different_iterations() {
    let result = run(indoc! {"
        qubit q;
        bit b;
        int count = 0;
        while (b == 0 && count < 3) {
            h q;
            b = measure q;
            count = count + 1;
        }
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 4);
    let mut exhausted = Vec::new();
    for id in active {
        let count = int_var(&result, id, "count");
        let b = bit_var(&result, id, "b");
        match count {
            1 | 2 => assert!(b, "paths exiting early should have measured one"),
            3 => exhausted.push(b),
            other => panic!("unexpected loop count {other}"),
        }
        // The measurement record grows by one entry per loop iteration.
        assert_eq!(
            result.path(id).measurements["q"].len(),
            usize::try_from(count).expect("count should be non-negative")
        );
    }
    exhausted.sort_unstable();
    assert_eq!(exhausted, vec![false, true]);
}

#[test]
fn recursive_subroutine_guards_a_branch() {
    let result = run(indoc! {"
        def factorial(int n) -> int {
            if (n <= 1) {
                return 1;
            }
            return n * factorial(n - 1);
        }
        qubit q;
        bit b;
        int result = factorial(4);
        if (result == 24) {
            h q;
        }
        b = measure q;
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 2);
    for id in active {
        assert_eq!(int_var(&result, id, "result"), 24);
    }
}

#[test]
fn independent_measurements_count_and_enumerate_exactly() {
    let result = run(indoc! {"
        qubit[3] q;
        bit[3] b;
        h q[0];
        h q[1];
        h q[2];
        b = measure q;
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 8);
    let mut outcomes: Vec<u64> = active
        .iter()
        .map(|id| match result.path(*id).variable("b") {
            Some(Value::BitArray(bits)) => bits.bits,
            other => panic!("b should be a bit register, got {other:?}"),
        })
        .collect();
    outcomes.sort_unstable();
    assert_eq!(outcomes, (0..8).collect::<Vec<u64>>());
}

#[test]
fn identical_programs_produce_identical_ledgers() {
    let source = indoc! {"
        qubit[2] q;
        bit b;
        h q[0];
        cx q[0], q[1];
        b = measure q[0];
        if (b == 1) {
            x q[1];
        }
        reset q[1];
    "};
    let first = run(source);
    let second = run(source);
    assert_eq!(first.paths().len(), second.paths().len());
    for (a, b) in first.paths().iter().zip(second.paths()) {
        assert_eq!(a.instructions, b.instructions);
        assert_eq!(a.measurements, b.measurements);
    }
}

#[test]
fn teleportation_reconstructs_the_source_state_on_every_path() {
    let angle = 0.7f64;
    let result = run(indoc! {"
        qubit[3] q;
        bit c0;
        bit c1;
        ry(0.7) q[0];
        h q[1];
        cx q[1], q[2];
        cx q[0], q[1];
        h q[0];
        c0 = measure q[0];
        c1 = measure q[1];
        if (c1 == 1) x q[2];
        if (c0 == 1) z q[2];
    "});
    let active = result.active_paths();
    assert_eq!(active.len(), 4);

    let alpha = (angle / 2.0).cos();
    let beta = (angle / 2.0).sin();
    let mut seen = Vec::new();
    for id in active {
        let c0 = bit_var(&result, id, "c0");
        let c1 = bit_var(&result, id, "c1");
        seen.push((c0, c1));
        let state = result.state_vector(id).expect("state should materialize");
        // Qubits 0 and 1 are collapsed, so the state is |c0 c1⟩ ⊗ (α|0⟩ + β|1⟩).
        let base = usize::from(c0) << 2 | usize::from(c1) << 1;
        assert_close(state[base], Complex64::new(alpha, 0.0));
        assert_close(state[base | 1], Complex64::new(beta, 0.0));
    }
    seen.sort_unstable();
    assert_eq!(
        seen,
        vec![(false, false), (false, true), (true, false), (true, true)]
    );
}

#[test]
fn fork_children_preserve_the_parent_position() {
    let result = run(indoc! {"
        qubit[2] q;
        bit[2] b;
        h q[0];
        h q[1];
        b[0] = measure q[0];
        b[1] = measure q[1];
    "});
    let active = result.active_paths();
    let outcomes: Vec<u64> = active
        .iter()
        .map(|id| match result.path(*id).variable("b") {
            Some(Value::BitArray(bits)) => bits.bits,
            other => panic!("b should be a bit register, got {other:?}"),
        })
        .collect();
    // The 0-child keeps the parent's slot and the 1-child follows it, so the
    // population enumerates outcomes with the later measurement varying
    // fastest.
    assert_eq!(outcomes, vec![0b00, 0b10, 0b01, 0b11]);
}

#[test]
fn parse_errors_fail_the_whole_run() {
    let result = evolve("qubit q; h q", &FxHashMap::default());
    let errors = result.err().expect("malformed source should fail");
    assert!(matches!(errors[0], Error::Parse(_)));
}

#[test]
fn inputs_flow_into_gate_parameters() {
    let mut inputs: Inputs = FxHashMap::default();
    inputs.insert("theta".into(), Value::Float(std::f64::consts::PI));
    let result = evolve(
        indoc! {"
            input float theta;
            qubit q;
            bit b;
            rx(theta) q;
            b = measure q;
        "},
        &inputs,
    )
    .expect("program should evaluate");
    // rx(π) maps |0⟩ to -i|1⟩, so the measurement is deterministic.
    let active = result.active_paths();
    assert_eq!(active.len(), 1);
    assert!(bit_var(&result, active[0], "b"));
}
