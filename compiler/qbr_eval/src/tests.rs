// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{
    backend::DenseSim,
    evolve,
    path::{Instruction, Path},
    val::{BitArray, Value},
    Error, Evolution,
};
use indoc::indoc;
use qbr_parse::parse;
use rustc_hash::FxHashMap;
use std::rc::Rc;

fn run(source: &str) -> Evolution {
    run_with_inputs(source, &FxHashMap::default())
}

fn run_with_inputs(source: &str, inputs: &FxHashMap<Rc<str>, Value>) -> Evolution {
    let (program, errors) = parse(source);
    assert!(errors.is_empty(), "parse errors: {errors:?}");
    evolve(&program, &DenseSim, inputs).expect("evaluation should succeed")
}

fn single_path(evolution: &Evolution) -> &Path {
    let active = evolution.active_paths();
    assert_eq!(active.len(), 1, "expected exactly one active path");
    evolution.path(active[0])
}

fn int_var(path: &Path, name: &str) -> i64 {
    path.variable(name)
        .unwrap_or_else(|| panic!("variable {name} should exist"))
        .unwrap_int()
}

fn ledger(path: &Path) -> Vec<String> {
    path.instructions
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn integer_arithmetic_and_division_to_float() {
    let evolution = run(indoc! {"
        int x = 3;
        int y = x * 4 + 2;
        float z = 7 / 2;
    "});
    let path = single_path(&evolution);
    assert_eq!(int_var(path, "y"), 14);
    assert_eq!(
        path.variable("z").expect("z should exist").unwrap_float(),
        3.5
    );
}

#[test]
fn division_by_zero_terminates_the_path() {
    let evolution = run("int x = 1 % 0;");
    assert!(evolution.active_paths().is_empty());
    assert!(matches!(
        evolution.paths[0].error,
        Some(Error::DivisionByZero(_))
    ));
}

#[test]
fn int_widths_wrap_twos_complement() {
    let evolution = run(indoc! {"
        int[8] x = 127;
        x = x + 1;
        uint[8] y = 255;
        y = y + 1;
    "});
    let path = single_path(&evolution);
    assert_eq!(int_var(path, "x"), -128);
    assert_eq!(int_var(path, "y"), 0);
}

#[test]
fn block_scoped_declarations_do_not_leak() {
    let evolution = run(indoc! {"
        int x = 0;
        if (true) {
            int y = 1;
            x = y;
        }
        int y = 5;
    "});
    let path = single_path(&evolution);
    assert_eq!(int_var(path, "x"), 1);
    assert_eq!(int_var(path, "y"), 5);
}

#[test]
fn if_and_else_declarations_are_independent() {
    let evolution = run(indoc! {"
        int r = 0;
        if (false) {
            int inner = 1;
            r = inner;
        } else {
            int inner = 2;
            r = inner;
        }
    "});
    assert_eq!(int_var(single_path(&evolution), "r"), 2);
}

#[test]
fn const_mutation_terminates_the_path() {
    let evolution = run(indoc! {"
        const int c = 1;
        c = 2;
    "});
    assert!(evolution.active_paths().is_empty());
    assert!(matches!(
        evolution.paths[0].error,
        Some(Error::CannotUpdateConstVariable(_, _))
    ));
}

#[test]
fn redeclaration_terminates_the_path() {
    let evolution = run(indoc! {"
        int x = 1;
        int x = 2;
    "});
    assert!(matches!(
        evolution.paths[0].error,
        Some(Error::RedefinedSymbol(_, _))
    ));
}

#[test]
fn const_globals_are_visible_across_the_subroutine_barrier() {
    let evolution = run(indoc! {"
        const int k = 2;
        def f() -> int {
            return k;
        }
        int r = f();
    "});
    assert_eq!(int_var(single_path(&evolution), "r"), 2);
}

#[test]
fn mutable_globals_are_invisible_across_the_subroutine_barrier() {
    let evolution = run(indoc! {"
        int g = 1;
        def f() -> int {
            return g;
        }
        int r = f();
    "});
    assert!(evolution.active_paths().is_empty());
    assert!(matches!(
        evolution.paths[0].error,
        Some(Error::UndefinedSymbol(_, _))
    ));
}

#[test]
fn while_loop_with_break_and_continue() {
    let evolution = run(indoc! {"
        int count = 0;
        int i = 0;
        while (true) {
            i = i + 1;
            if (i == 2) {
                continue;
            }
            if (i == 5) {
                break;
            }
            count = count + 1;
        }
    "});
    let path = single_path(&evolution);
    assert_eq!(int_var(path, "count"), 3);
    assert_eq!(int_var(path, "i"), 5);
}

#[test]
fn for_loop_over_range_and_set() {
    let evolution = run(indoc! {"
        int total = 0;
        for uint i in [1:3] {
            total = total + i;
        }
        int picked = 0;
        for uint i in {2, 4} {
            picked = picked + i;
        }
    "});
    let path = single_path(&evolution);
    assert_eq!(int_var(path, "total"), 6);
    assert_eq!(int_var(path, "picked"), 6);
}

#[test]
fn for_loop_variable_is_not_visible_after_the_loop() {
    let evolution = run(indoc! {"
        for uint i in [0:1] {
        }
        int i = 7;
    "});
    assert_eq!(int_var(single_path(&evolution), "i"), 7);
}

#[test]
fn switch_selects_first_matching_case() {
    let evolution = run(indoc! {"
        int x = 2;
        int r = 0;
        switch (x) {
            case 1 {
                r = 10;
            }
            case 2, 3 {
                r = 20;
            }
            default {
                r = 30;
            }
        }
        switch (x + 10) {
            case 1 {
                r = 40;
            }
        }
    "});
    // The second switch has no matching case and no default, so it is a
    // no-op.
    assert_eq!(int_var(single_path(&evolution), "r"), 20);
}

#[test]
fn alias_writes_propagate_to_the_aliased_register() {
    let evolution = run(indoc! {"
        bit[4] c;
        let mid = c[1:2];
        mid[0] = 1;
    "});
    let path = single_path(&evolution);
    assert_eq!(
        path.variable("c").expect("c should exist"),
        Value::BitArray(BitArray::new(4, 0b0010))
    );
}

#[test]
fn bit_registers_pack_lsb_first() {
    let evolution = run(indoc! {r#"
        bit[4] c = "0110";
        int v = int(c);
        bool any = bool(c);
        bit low = c[0];
        bit second = c[1];
    "#});
    let path = single_path(&evolution);
    assert_eq!(int_var(path, "v"), 6);
    assert_eq!(path.variable("any"), Some(Value::Bool(true)));
    assert_eq!(path.variable("low"), Some(Value::Bit(false)));
    assert_eq!(path.variable("second"), Some(Value::Bit(true)));
}

#[test]
fn casts_follow_the_width_rules() {
    let evolution = run(indoc! {"
        bit[3] c = bit[3](6);
        int[2] t = int[2](c);
        uint[4] u = uint[4](13);
        int[8] s = int[8](u);
    "});
    let path = single_path(&evolution);
    assert_eq!(
        path.variable("c").expect("c should exist"),
        Value::BitArray(BitArray::new(3, 0b110))
    );
    assert_eq!(int_var(path, "t"), -2);
    assert_eq!(int_var(path, "s"), 13);
}

#[test]
fn ternary_takes_the_matching_branch() {
    let evolution = run("int x = true ? 1 : 2;");
    assert_eq!(int_var(single_path(&evolution), "x"), 1);
}

#[test]
fn angle_arithmetic_wraps_modulo_two_pi() {
    let evolution = run(indoc! {"
        angle a = 3 * pi;
        float f = float(a);
    "});
    let path = single_path(&evolution);
    let f = path.variable("f").expect("f should exist").unwrap_float();
    assert!((f - std::f64::consts::PI).abs() < 1e-12);
}

#[test]
fn deterministic_measurement_does_not_fork() {
    let evolution = run(indoc! {"
        qubit q;
        bit b = measure q;
    "});
    let path = single_path(&evolution);
    assert_eq!(path.variable("b"), Some(Value::Bit(false)));
    assert_eq!(path.measurements.get("q"), Some(&vec![false]));
}

#[test]
fn indeterminate_measurement_forks_with_zero_child_first() {
    let evolution = run(indoc! {"
        qubit q;
        bit b;
        h q;
        b = measure q;
    "});
    let active = evolution.active_paths();
    assert_eq!(active.len(), 2);
    assert_eq!(
        evolution.path(active[0]).variable("b"),
        Some(Value::Bit(false))
    );
    assert_eq!(
        evolution.path(active[1]).variable("b"),
        Some(Value::Bit(true))
    );
}

#[test]
fn independent_measurements_enumerate_all_outcomes() {
    let evolution = run(indoc! {"
        qubit[2] q;
        bit[2] b;
        h q[0];
        h q[1];
        b[0] = measure q[0];
        b[1] = measure q[1];
    "});
    let active = evolution.active_paths();
    assert_eq!(active.len(), 4);
    let mut outcomes: Vec<u64> = active
        .iter()
        .map(|id| {
            evolution
                .path(*id)
                .variable("b")
                .expect("b should exist")
                .unwrap_bit_array()
                .bits
        })
        .collect();
    outcomes.sort_unstable();
    assert_eq!(outcomes, vec![0b00, 0b01, 0b10, 0b11]);
    for id in active {
        let path = evolution.path(id);
        assert_eq!(path.measurements["q[0]"].len(), 1);
        assert_eq!(path.measurements["q[1]"].len(), 1);
    }
}

#[test]
fn whole_register_measurement_measures_in_index_order() {
    let evolution = run(indoc! {"
        qubit[2] q;
        x q[1];
        bit[2] b = measure q;
    "});
    let path = single_path(&evolution);
    // b[1] holds the outcome of q[1].
    assert_eq!(
        path.variable("b").expect("b should exist"),
        Value::BitArray(BitArray::new(2, 0b10))
    );
}

#[test]
fn ledger_records_gates_in_execution_order() {
    let evolution = run(indoc! {"
        qubit q;
        h q;
        rx(0.5) q;
    "});
    let path = single_path(&evolution);
    assert_eq!(ledger(path), vec!["h 0", "rx(0.5) 0"]);
}

#[test]
fn custom_gates_inline_to_builtin_instructions() {
    let evolution = run(indoc! {"
        qubit[2] q;
        gate bell a, b {
            h a;
            cx a, b;
        }
        bell q[0], q[1];
    "});
    let path = single_path(&evolution);
    assert_eq!(ledger(path), vec!["h 0", "cx 0, 1"]);
}

#[test]
fn ctrl_modifier_prepends_controls_to_inlined_gates() {
    let evolution = run(indoc! {"
        qubit[2] q;
        gate flip a {
            x a;
        }
        ctrl @ flip q[0], q[1];
    "});
    let path = single_path(&evolution);
    assert_eq!(ledger(path), vec!["ctrl @ x 0, 1"]);
}

#[test]
fn inv_modifier_reverses_an_inlined_body() {
    let evolution = run(indoc! {"
        qubit q;
        gate two a {
            s a;
            t a;
        }
        inv @ two q;
    "});
    let path = single_path(&evolution);
    assert_eq!(ledger(path), vec!["inv @ t 0", "inv @ s 0"]);
}

#[test]
fn pow_modifier_repeats_an_inlined_body() {
    let evolution = run(indoc! {"
        qubit q;
        gate two a {
            s a;
            t a;
        }
        pow(2) @ two q;
    "});
    let path = single_path(&evolution);
    assert_eq!(ledger(path), vec!["s 0", "t 0", "s 0", "t 0"]);
}

#[test]
fn gate_broadcasts_over_registers() {
    let evolution = run(indoc! {"
        qubit[3] q;
        h q;
    "});
    let path = single_path(&evolution);
    assert_eq!(ledger(path), vec!["h 0", "h 1", "h 2"]);
}

#[test]
fn gate_may_not_reuse_a_qubit() {
    let evolution = run(indoc! {"
        qubit[2] q;
        cx q[0], q[0];
    "});
    assert!(matches!(
        evolution.paths[0].error,
        Some(Error::QubitReused(_, _))
    ));
}

#[test]
fn recursive_gate_definitions_are_rejected() {
    let evolution = run(indoc! {"
        qubit q;
        gate loop_gate a {
            loop_gate a;
        }
    "});
    assert!(matches!(
        evolution.paths[0].error,
        Some(Error::GateRecursion(_, _))
    ));
}

#[test]
fn reset_collapses_without_forking() {
    let evolution = run(indoc! {"
        qubit q;
        h q;
        reset q;
        bit b = measure q;
    "});
    let path = single_path(&evolution);
    assert_eq!(path.variable("b"), Some(Value::Bit(false)));
    assert!(path
        .instructions
        .iter()
        .any(|instruction| matches!(instruction, Instruction::Reset { qubit: 0 })));
    // Reset is not a measurement, so only the final measure is recorded.
    assert_eq!(path.measurements["q"].len(), 1);
}

#[test]
fn inputs_bind_declared_input_variables() {
    let mut inputs: FxHashMap<Rc<str>, Value> = FxHashMap::default();
    inputs.insert("x".into(), Value::Float(41.0));
    let evolution = run_with_inputs(
        indoc! {"
            input float x;
            float y = x + 1;
        "},
        &inputs,
    );
    let path = single_path(&evolution);
    assert_eq!(
        path.variable("y").expect("y should exist").unwrap_float(),
        42.0
    );
}

#[test]
fn missing_input_is_fatal_to_the_run() {
    let (program, errors) = parse("input int x;");
    assert!(errors.is_empty());
    let result = evolve(&program, &DenseSim, &FxHashMap::default());
    assert!(matches!(result, Err(Error::MissingInput(_))));
}

#[test]
fn extra_inputs_are_ignored() {
    let mut inputs: FxHashMap<Rc<str>, Value> = FxHashMap::default();
    inputs.insert("unused".into(), Value::Bool(true));
    let evolution = run_with_inputs("int x = 1;", &inputs);
    assert_eq!(int_var(single_path(&evolution), "x"), 1);
}

#[test]
fn path_errors_do_not_halt_sibling_paths() {
    let evolution = run(indoc! {"
        qubit q;
        h q;
        bit b = measure q;
        if (b == 1) {
            int z = 1 % 0;
        }
        int done = 1;
    "});
    assert_eq!(evolution.paths.len(), 2);
    let active = evolution.active_paths();
    assert_eq!(active.len(), 1);
    assert_eq!(evolution.path(active[0]).variable("b"), Some(Value::Bit(false)));
    assert_eq!(int_var(evolution.path(active[0]), "done"), 1);
    let failed: Vec<&Path> = evolution.paths.iter().filter(|p| !p.active).collect();
    assert!(matches!(
        failed[0].error,
        Some(Error::DivisionByZero(_))
    ));
}

#[test]
fn recursive_subroutines_evaluate() {
    let evolution = run(indoc! {"
        def fact(int n) -> int {
            if (n <= 1) {
                return 1;
            }
            return n * fact(n - 1);
        }
        int r = fact(4);
    "});
    assert_eq!(int_var(single_path(&evolution), "r"), 24);
}

#[test]
fn runaway_recursion_is_fatal_to_the_run() {
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let (program, errors) = parse(indoc! {"
                def forever() -> int {
                    return forever();
                }
                int r = forever();
            "});
            assert!(errors.is_empty(), "parse errors: {errors:?}");
            evolve(&program, &DenseSim, &FxHashMap::default()).map(|_| ())
        })
        .expect("thread should spawn");
    let result = handle.join().expect("thread should not panic");
    assert!(matches!(result, Err(Error::RecursionLimitExceeded(_))));
}

#[test]
fn subroutines_may_measure_when_called_as_a_statement_rhs() {
    let evolution = run(indoc! {"
        qubit q;
        def coin(qubit a) -> bit {
            h a;
            return measure a;
        }
        bit b = coin(q);
    "});
    let active = evolution.active_paths();
    assert_eq!(active.len(), 2);
    assert_eq!(
        evolution.path(active[0]).variable("b"),
        Some(Value::Bit(false))
    );
    assert_eq!(
        evolution.path(active[1]).variable("b"),
        Some(Value::Bit(true))
    );
}

#[test]
fn forking_calls_nested_in_expressions_are_rejected() {
    let evolution = run(indoc! {"
        qubit q;
        def coin(qubit a) -> bit {
            h a;
            return measure a;
        }
        int x = 1 + coin(q);
    "});
    assert!(evolution.active_paths().is_empty());
    assert!(evolution.paths.iter().all(|path| matches!(
        path.error,
        Some(Error::NondeterministicCall(_))
    )));
}

#[test]
fn measure_arrow_form_stores_into_the_target() {
    let evolution = run(indoc! {"
        qubit q;
        bit[2] c;
        x q;
        measure q -> c[1];
    "});
    let path = single_path(&evolution);
    assert_eq!(
        path.variable("c").expect("c should exist"),
        Value::BitArray(BitArray::new(2, 0b10))
    );
}

#[test]
fn stdgates_include_is_accepted() {
    let evolution = run(indoc! {r#"
        OPENQASM 3.0;
        include "stdgates.inc";
        qubit q;
        x q;
    "#});
    assert_eq!(ledger(single_path(&evolution)), vec!["x 0"]);
}

#[test]
fn builtin_math_functions_evaluate() {
    let evolution = run(indoc! {"
        float s = sqrt(16.0);
        int m = mod(7, 3);
        float c = cos(0.0);
    "});
    let path = single_path(&evolution);
    assert_eq!(
        path.variable("s").expect("s should exist").unwrap_float(),
        4.0
    );
    assert_eq!(int_var(path, "m"), 1);
    assert_eq!(
        path.variable("c").expect("c should exist").unwrap_float(),
        1.0
    );
}
