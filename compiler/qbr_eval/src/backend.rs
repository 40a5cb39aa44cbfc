// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The amplitude-engine contract and the default dense state-vector
//! implementation. An engine is stateless across calls: every query replays
//! the given instruction ledger from |0…0⟩, so a path's quantum state is
//! always derived from its ledger alone.

use crate::path::{Gate, GateInstruction, GateModifier, Instruction};
use ndarray::Array2;
use num_complex::Complex64;
use std::f64::consts::FRAC_PI_4;
use std::sync::LazyLock;
use thiserror::Error;

/// Squared-magnitude threshold below which a projected state is considered
/// annihilated.
const NULL_PROJECTION: f64 = 1e-20;

/// Tolerance used when deciding whether a reset qubit is definitely one.
const RESET_EPSILON: f64 = 1e-10;

#[derive(Clone, Debug, Error, PartialEq)]
#[error("{0}")]
pub struct EngineError(pub String);

/// The contract between the interpreter and the external state-vector
/// evolver. Implementations must accept being invoked many times per path;
/// they may memoize, but the contract does not require it.
pub trait AmplitudeEngine {
    /// The Born-rule probability of measuring |1⟩ on `qubit` after evolving
    /// a fresh register through `instructions`.
    fn probability_of_one(
        &self,
        instructions: &[Instruction],
        num_qubits: usize,
        qubit: usize,
    ) -> Result<f64, EngineError>;

    /// The full amplitude vector after evolving a fresh register through
    /// `instructions`.
    fn state_vector(
        &self,
        instructions: &[Instruction],
        num_qubits: usize,
    ) -> Result<Vec<Complex64>, EngineError>;
}

/// The default engine: dense state-vector evolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseSim;

impl AmplitudeEngine for DenseSim {
    fn probability_of_one(
        &self,
        instructions: &[Instruction],
        num_qubits: usize,
        qubit: usize,
    ) -> Result<f64, EngineError> {
        let state = evolve_state(instructions, num_qubits)?;
        Ok(probability_of_one(&state, num_qubits, qubit))
    }

    fn state_vector(
        &self,
        instructions: &[Instruction],
        num_qubits: usize,
    ) -> Result<Vec<Complex64>, EngineError> {
        evolve_state(instructions, num_qubits)
    }
}

fn evolve_state(
    instructions: &[Instruction],
    num_qubits: usize,
) -> Result<Vec<Complex64>, EngineError> {
    let dim = 1usize << num_qubits;
    let mut state = vec![Complex64::new(0.0, 0.0); dim];
    state[0] = Complex64::new(1.0, 0.0);

    for instruction in instructions {
        match instruction {
            Instruction::Gate(gate) => {
                let matrix = resolve_matrix(gate)?;
                check_targets(&gate.targets, matrix.nrows(), num_qubits)?;
                apply(&mut state, &matrix, &gate.targets, num_qubits);
            }
            Instruction::Measure { qubit, outcome } => {
                check_qubit(*qubit, num_qubits)?;
                project(&mut state, num_qubits, *qubit, *outcome)?;
            }
            Instruction::Reset { qubit } => {
                check_qubit(*qubit, num_qubits)?;
                let p_one = probability_of_one(&state, num_qubits, *qubit);
                if p_one >= 1.0 - RESET_EPSILON {
                    apply(&mut state, &X, &[*qubit], num_qubits);
                } else {
                    project(&mut state, num_qubits, *qubit, false)?;
                }
            }
        }
    }

    Ok(state)
}

fn check_qubit(qubit: usize, num_qubits: usize) -> Result<(), EngineError> {
    if qubit >= num_qubits {
        return Err(EngineError(format!(
            "qubit {qubit} out of range for {num_qubits}-qubit register"
        )));
    }
    Ok(())
}

fn check_targets(targets: &[usize], dim: usize, num_qubits: usize) -> Result<(), EngineError> {
    if dim != 1usize << targets.len() {
        return Err(EngineError(format!(
            "gate of dimension {dim} applied to {} targets",
            targets.len()
        )));
    }
    for (i, &target) in targets.iter().enumerate() {
        check_qubit(target, num_qubits)?;
        if targets[..i].contains(&target) {
            return Err(EngineError(format!("duplicate target qubit {target}")));
        }
    }
    Ok(())
}

/// Folds the modifier stack into the base gate matrix. Modifier lists are
/// ordered outermost first, so folding walks them in reverse.
fn resolve_matrix(gate: &GateInstruction) -> Result<Array2<Complex64>, EngineError> {
    let mut matrix = base_matrix(gate.gate, &gate.params)?;
    for modifier in gate.modifiers.iter().rev() {
        matrix = match modifier {
            GateModifier::Inv => dagger(&matrix),
            GateModifier::Pow(exponent) => matrix_pow(&matrix, *exponent)?,
            GateModifier::Ctrl(count) => controlled(&matrix, *count, true),
            GateModifier::NegCtrl(count) => controlled(&matrix, *count, false),
        };
    }
    Ok(matrix)
}

fn base_matrix(gate: Gate, params: &[f64]) -> Result<Array2<Complex64>, EngineError> {
    if params.len() != gate.num_params() {
        return Err(EngineError(format!(
            "gate {gate} expects {} parameters, got {}",
            gate.num_params(),
            params.len()
        )));
    }
    Ok(match gate {
        Gate::Id => ID.clone(),
        Gate::X => X.clone(),
        Gate::Y => Y.clone(),
        Gate::Z => Z.clone(),
        Gate::H => H.clone(),
        Gate::S => S.clone(),
        Gate::Sdg => S_ADJ.clone(),
        Gate::T => T.clone(),
        Gate::Tdg => T_ADJ.clone(),
        Gate::Rx => rx(params[0]),
        Gate::Ry => ry(params[0]),
        Gate::Rz => rz(params[0]),
        Gate::U => u(params[0], params[1], params[2]),
        Gate::Cx => CX.clone(),
        Gate::Cz => CZ.clone(),
        Gate::Swap => SWAP.clone(),
        Gate::Ccx => CCX.clone(),
        Gate::Phase => phase(params[0]),
        Gate::GPhase => gphase(params[0]),
    })
}

fn matrix(rows: &[&[Complex64]]) -> Array2<Complex64> {
    let dim = rows.len();
    let mut m = Array2::zeros((dim, dim));
    for (i, row) in rows.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            m[(i, j)] = *value;
        }
    }
    m
}

fn real(v: f64) -> Complex64 {
    Complex64::new(v, 0.0)
}

const I: Complex64 = Complex64::new(0.0, 1.0);

static ID: LazyLock<Array2<Complex64>> = LazyLock::new(|| Array2::eye(2));

static X: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(0.0), real(1.0)],
        &[real(1.0), real(0.0)],
    ])
});

static Y: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(0.0), -I],
        &[I, real(0.0)],
    ])
});

static Z: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(1.0), real(0.0)],
        &[real(0.0), real(-1.0)],
    ])
});

static H: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    let f = real(0.5_f64.sqrt());
    matrix(&[
        &[f, f],
        &[f, -f],
    ])
});

static S: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(1.0), real(0.0)],
        &[real(0.0), I],
    ])
});

static S_ADJ: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(1.0), real(0.0)],
        &[real(0.0), -I],
    ])
});

static T: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(1.0), real(0.0)],
        &[real(0.0), (I * FRAC_PI_4).exp()],
    ])
});

static T_ADJ: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(1.0), real(0.0)],
        &[real(0.0), (-I * FRAC_PI_4).exp()],
    ])
});

// Two-qubit matrices index their basis with the first target as the most
// significant bit, so the control of `cx` is the high bit.
static CX: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(1.0), real(0.0), real(0.0), real(0.0)],
        &[real(0.0), real(1.0), real(0.0), real(0.0)],
        &[real(0.0), real(0.0), real(0.0), real(1.0)],
        &[real(0.0), real(0.0), real(1.0), real(0.0)],
    ])
});

static CZ: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    let mut m = Array2::eye(4);
    m[(3, 3)] = real(-1.0);
    m
});

static SWAP: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    matrix(&[
        &[real(1.0), real(0.0), real(0.0), real(0.0)],
        &[real(0.0), real(0.0), real(1.0), real(0.0)],
        &[real(0.0), real(1.0), real(0.0), real(0.0)],
        &[real(0.0), real(0.0), real(0.0), real(1.0)],
    ])
});

static CCX: LazyLock<Array2<Complex64>> = LazyLock::new(|| {
    let mut m = Array2::eye(8);
    m[(6, 6)] = real(0.0);
    m[(7, 7)] = real(0.0);
    m[(6, 7)] = real(1.0);
    m[(7, 6)] = real(1.0);
    m
});

fn rx(angle: f64) -> Array2<Complex64> {
    let sin = (angle / 2.0).sin();
    let cos = (angle / 2.0).cos();
    matrix(&[
        &[real(cos), -I * sin],
        &[-I * sin, real(cos)],
    ])
}

fn ry(angle: f64) -> Array2<Complex64> {
    let sin = (angle / 2.0).sin();
    let cos = (angle / 2.0).cos();
    matrix(&[
        &[real(cos), real(-sin)],
        &[real(sin), real(cos)],
    ])
}

fn rz(angle: f64) -> Array2<Complex64> {
    let a = (-I * (angle / 2.0)).exp();
    let b = (I * (angle / 2.0)).exp();
    matrix(&[
        &[a, real(0.0)],
        &[real(0.0), b],
    ])
}

fn u(theta: f64, phi: f64, lambda: f64) -> Array2<Complex64> {
    let sin = (theta / 2.0).sin();
    let cos = (theta / 2.0).cos();
    matrix(&[
        &[real(cos), -(I * lambda).exp() * sin],
        &[(I * phi).exp() * sin, (I * (phi + lambda)).exp() * cos],
    ])
}

fn phase(lambda: f64) -> Array2<Complex64> {
    matrix(&[
        &[real(1.0), real(0.0)],
        &[real(0.0), (I * lambda).exp()],
    ])
}

/// A zero-qubit gate: a 1×1 phase. Control modifiers extend it into the
/// usual controlled-phase family.
fn gphase(gamma: f64) -> Array2<Complex64> {
    let mut m = Array2::zeros((1, 1));
    m[(0, 0)] = (I * gamma).exp();
    m
}

fn dagger(m: &Array2<Complex64>) -> Array2<Complex64> {
    m.t().mapv(|v| v.conj())
}

fn matrix_pow(m: &Array2<Complex64>, exponent: f64) -> Result<Array2<Complex64>, EngineError> {
    let rounded = exponent.round();
    if (exponent - rounded).abs() > 1e-9 {
        return Err(EngineError(format!(
            "non-integral gate exponent {exponent}"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let mut count = rounded as i64;
    let base = if count < 0 {
        count = -count;
        dagger(m)
    } else {
        m.clone()
    };
    let mut result = Array2::eye(m.nrows());
    for _ in 0..count {
        result = result.dot(&base);
    }
    Ok(result)
}

/// Extends a matrix with `count` control qubits occupying the most
/// significant local bits. For positive controls the original matrix acts on
/// the all-ones control block; for negative controls, the all-zeros block.
fn controlled(m: &Array2<Complex64>, count: usize, on_one: bool) -> Array2<Complex64> {
    let dim = m.nrows();
    let new_dim = dim << count;
    let mut out = Array2::eye(new_dim);
    let offset = if on_one { new_dim - dim } else { 0 };
    for i in 0..dim {
        for j in 0..dim {
            out[(offset + i, offset + j)] = m[(i, j)];
        }
    }
    out
}

/// Applies a k-qubit matrix to the state. The first target is the most
/// significant bit of the matrix's basis index, and qubit 0 is the most
/// significant bit of a basis-state label.
fn apply(state: &mut [Complex64], m: &Array2<Complex64>, targets: &[usize], num_qubits: usize) {
    let k = targets.len();
    let sub_dim = 1usize << k;
    let positions: Vec<usize> = targets.iter().map(|&t| num_qubits - 1 - t).collect();
    let target_mask: usize = positions.iter().map(|&p| 1usize << p).sum();

    let mut sub = vec![Complex64::new(0.0, 0.0); sub_dim];
    for base in 0..state.len() {
        if base & target_mask != 0 {
            continue;
        }
        for s in 0..sub_dim {
            sub[s] = state[expand(base, s, k, &positions)];
        }
        for (row, value) in m.rows().into_iter().zip(0..) {
            let mut acc = Complex64::new(0.0, 0.0);
            for s in 0..sub_dim {
                acc += row[s] * sub[s];
            }
            state[expand(base, value, k, &positions)] = acc;
        }
    }
}

/// Scatters a local sub-index into a full basis index: local bit `j`
/// (counting the first target as most significant) lands at the state bit
/// position of target `j`.
fn expand(base: usize, sub_index: usize, k: usize, positions: &[usize]) -> usize {
    let mut index = base;
    for (j, &p) in positions.iter().enumerate() {
        if sub_index >> (k - 1 - j) & 1 == 1 {
            index |= 1 << p;
        }
    }
    index
}

fn probability_of_one(state: &[Complex64], num_qubits: usize, qubit: usize) -> f64 {
    let position = num_qubits - 1 - qubit;
    state
        .iter()
        .enumerate()
        .filter(|(index, _)| index >> position & 1 == 1)
        .map(|(_, amp)| amp.norm_sqr())
        .sum()
}

/// Projects the state onto the given outcome of a qubit and renormalizes.
fn project(
    state: &mut [Complex64],
    num_qubits: usize,
    qubit: usize,
    outcome: bool,
) -> Result<(), EngineError> {
    let position = num_qubits - 1 - qubit;
    let keep = usize::from(outcome);
    let mut norm_sqr = 0.0;
    for (index, amp) in state.iter_mut().enumerate() {
        if index >> position & 1 == keep {
            norm_sqr += amp.norm_sqr();
        } else {
            *amp = Complex64::new(0.0, 0.0);
        }
    }
    if norm_sqr < NULL_PROJECTION {
        return Err(EngineError(format!(
            "projecting qubit {qubit} onto outcome {} annihilated the state",
            u8::from(outcome)
        )));
    }
    let scale = 1.0 / norm_sqr.sqrt();
    for amp in state.iter_mut() {
        *amp *= scale;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AmplitudeEngine, DenseSim};
    use crate::path::{Gate, GateInstruction, GateModifier, Instruction};
    use num_complex::Complex64;

    fn gate(gate: Gate, targets: &[usize]) -> Instruction {
        Instruction::Gate(GateInstruction {
            gate,
            targets: targets.to_vec(),
            params: Vec::new(),
            modifiers: Vec::new(),
        })
    }

    fn assert_close(actual: Complex64, expected: Complex64) {
        assert!(
            (actual - expected).norm() < 1e-10,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn x_flips_the_qubit() {
        let engine = DenseSim;
        let state = engine
            .state_vector(&[gate(Gate::X, &[0])], 1)
            .expect("evolution should succeed");
        assert_close(state[0], Complex64::new(0.0, 0.0));
        assert_close(state[1], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn h_splits_amplitude_evenly() {
        let engine = DenseSim;
        let p = engine
            .probability_of_one(&[gate(Gate::H, &[0])], 1, 0)
            .expect("evolution should succeed");
        assert!((p - 0.5).abs() < 1e-10);
    }

    #[test]
    fn bell_pair_correlates_qubits() {
        let engine = DenseSim;
        let instructions = [gate(Gate::H, &[0]), gate(Gate::Cx, &[0, 1])];
        let state = engine
            .state_vector(&instructions, 2)
            .expect("evolution should succeed");
        let f = 0.5_f64.sqrt();
        assert_close(state[0b00], Complex64::new(f, 0.0));
        assert_close(state[0b01], Complex64::new(0.0, 0.0));
        assert_close(state[0b10], Complex64::new(0.0, 0.0));
        assert_close(state[0b11], Complex64::new(f, 0.0));
    }

    #[test]
    fn qubit_zero_is_the_most_significant_label_bit() {
        let engine = DenseSim;
        let state = engine
            .state_vector(&[gate(Gate::X, &[0])], 2)
            .expect("evolution should succeed");
        assert_close(state[0b10], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn ctrl_modifier_extends_a_gate() {
        let engine = DenseSim;
        // ctrl @ x with control on qubit 0, which is |1> after x.
        let instructions = [
            gate(Gate::X, &[0]),
            Instruction::Gate(GateInstruction {
                gate: Gate::X,
                targets: vec![0, 1],
                params: Vec::new(),
                modifiers: vec![GateModifier::Ctrl(1)],
            }),
        ];
        let state = engine
            .state_vector(&instructions, 2)
            .expect("evolution should succeed");
        assert_close(state[0b11], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn negctrl_fires_on_zero() {
        let engine = DenseSim;
        let instructions = [Instruction::Gate(GateInstruction {
            gate: Gate::X,
            targets: vec![0, 1],
            params: Vec::new(),
            modifiers: vec![GateModifier::NegCtrl(1)],
        })];
        let state = engine
            .state_vector(&instructions, 2)
            .expect("evolution should succeed");
        assert_close(state[0b01], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn inv_pow_compose() {
        let engine = DenseSim;
        // pow(2) @ h is the identity.
        let instructions = [Instruction::Gate(GateInstruction {
            gate: Gate::H,
            targets: vec![0],
            params: Vec::new(),
            modifiers: vec![GateModifier::Pow(2.0)],
        })];
        let state = engine
            .state_vector(&instructions, 1)
            .expect("evolution should succeed");
        assert_close(state[0], Complex64::new(1.0, 0.0));

        // inv @ s undoes s.
        let instructions = [
            gate(Gate::X, &[0]),
            gate(Gate::S, &[0]),
            Instruction::Gate(GateInstruction {
                gate: Gate::S,
                targets: vec![0],
                params: Vec::new(),
                modifiers: vec![GateModifier::Inv],
            }),
        ];
        let state = engine
            .state_vector(&instructions, 1)
            .expect("evolution should succeed");
        assert_close(state[1], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn measure_marker_projects_and_renormalizes() {
        let engine = DenseSim;
        let instructions = [
            gate(Gate::H, &[0]),
            Instruction::Measure {
                qubit: 0,
                outcome: true,
            },
        ];
        let state = engine
            .state_vector(&instructions, 1)
            .expect("evolution should succeed");
        assert_close(state[0], Complex64::new(0.0, 0.0));
        assert_close(state[1], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn impossible_projection_is_an_error() {
        let engine = DenseSim;
        let instructions = [Instruction::Measure {
            qubit: 0,
            outcome: true,
        }];
        assert!(engine.state_vector(&instructions, 1).is_err());
    }

    #[test]
    fn reset_sends_definite_one_to_zero() {
        let engine = DenseSim;
        let instructions = [gate(Gate::X, &[0]), Instruction::Reset { qubit: 0 }];
        let state = engine
            .state_vector(&instructions, 1)
            .expect("evolution should succeed");
        assert_close(state[0], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn gphase_rotates_the_global_phase() {
        let engine = DenseSim;
        let instructions = [Instruction::Gate(GateInstruction {
            gate: Gate::GPhase,
            targets: Vec::new(),
            params: vec![std::f64::consts::PI],
            modifiers: Vec::new(),
        })];
        let state = engine
            .state_vector(&instructions, 1)
            .expect("evolution should succeed");
        assert_close(state[0], Complex64::new(-1.0, 0.0));
    }
}
