// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! One execution path: a classical environment, the record of measurement
//! outcomes observed along this history, and the append-only ledger of
//! quantum instructions the path has committed. Paths never carry quantum
//! state; the amplitude engine re-derives it from the ledger on demand.

use crate::{
    scope::Env,
    val::{ArrayValue, BitArray, Value},
    Error,
};
use rustc_hash::FxHashMap;
use std::{
    fmt::{self, Display, Formatter},
    rc::Rc,
};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PathId(pub usize);

impl Display for PathId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A built-in gate. Custom gates are inlined down to these before anything is
/// committed to a ledger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Gate {
    Id,
    X,
    Y,
    Z,
    H,
    S,
    Sdg,
    T,
    Tdg,
    Rx,
    Ry,
    Rz,
    U,
    Cx,
    Cz,
    Swap,
    Ccx,
    Phase,
    GPhase,
}

impl Gate {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Gate::Id => "id",
            Gate::X => "x",
            Gate::Y => "y",
            Gate::Z => "z",
            Gate::H => "h",
            Gate::S => "s",
            Gate::Sdg => "sdg",
            Gate::T => "t",
            Gate::Tdg => "tdg",
            Gate::Rx => "rx",
            Gate::Ry => "ry",
            Gate::Rz => "rz",
            Gate::U => "u",
            Gate::Cx => "cx",
            Gate::Cz => "cz",
            Gate::Swap => "swap",
            Gate::Ccx => "ccx",
            Gate::Phase => "phase",
            Gate::GPhase => "gphase",
        }
    }

    /// The number of angle parameters the gate takes.
    #[must_use]
    pub fn num_params(self) -> usize {
        match self {
            Gate::Rx | Gate::Ry | Gate::Rz | Gate::Phase | Gate::GPhase => 1,
            Gate::U => 3,
            _ => 0,
        }
    }

    /// The number of qubits the unmodified gate acts on.
    #[must_use]
    pub fn num_qubits(self) -> usize {
        match self {
            Gate::GPhase => 0,
            Gate::Cx | Gate::Cz | Gate::Swap => 2,
            Gate::Ccx => 3,
            _ => 1,
        }
    }
}

impl Display for Gate {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A gate modifier. `Ctrl` and `NegCtrl` consume that many leading target
/// slots as controls; modifier lists are ordered outermost first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateModifier {
    Ctrl(usize),
    NegCtrl(usize),
    Inv,
    Pow(f64),
}

impl Display for GateModifier {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            GateModifier::Ctrl(1) => write!(f, "ctrl"),
            GateModifier::Ctrl(n) => write!(f, "ctrl({n})"),
            GateModifier::NegCtrl(1) => write!(f, "negctrl"),
            GateModifier::NegCtrl(n) => write!(f, "negctrl({n})"),
            GateModifier::Inv => write!(f, "inv"),
            GateModifier::Pow(x) => write!(f, "pow({x})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GateInstruction {
    pub gate: Gate,
    pub targets: Vec<usize>,
    pub params: Vec<f64>,
    pub modifiers: Vec<GateModifier>,
}

/// One committed quantum operation: a gate application, or a projector
/// marker from a measurement or reset.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Gate(GateInstruction),
    Measure { qubit: usize, outcome: bool },
    Reset { qubit: usize },
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Instruction::Gate(gate) => {
                for modifier in &gate.modifiers {
                    write!(f, "{modifier} @ ")?;
                }
                write!(f, "{}", gate.gate)?;
                if !gate.params.is_empty() {
                    write!(f, "(")?;
                    let mut first = true;
                    for param in &gate.params {
                        if !first {
                            write!(f, ", ")?;
                        }
                        write!(f, "{param}")?;
                        first = false;
                    }
                    write!(f, ")")?;
                }
                let mut first = true;
                for target in &gate.targets {
                    if first {
                        write!(f, " ")?;
                    } else {
                        write!(f, ", ")?;
                    }
                    write!(f, "{target}")?;
                    first = false;
                }
                Ok(())
            }
            Instruction::Measure { qubit, outcome } => {
                write!(f, "measure {qubit} = {}", u8::from(*outcome))
            }
            Instruction::Reset { qubit } => write!(f, "reset {qubit}"),
        }
    }
}

/// One classical execution history through the program.
#[derive(Clone, Debug)]
pub struct Path {
    pub id: PathId,
    pub active: bool,
    pub env: Env,
    /// Outcome bits observed per qualified qubit name, in measurement order.
    pub measurements: FxHashMap<Rc<str>, Vec<bool>>,
    pub instructions: Vec<Instruction>,
    /// The error that terminated this path, if any.
    pub error: Option<Error>,
    pub(crate) return_flag: bool,
    pub(crate) return_value: Option<Value>,
    pub(crate) break_flag: bool,
    pub(crate) continue_flag: bool,
}

impl Path {
    pub(crate) fn new(id: PathId) -> Self {
        Self {
            id,
            active: true,
            env: Env::new(),
            measurements: FxHashMap::default(),
            instructions: Vec::new(),
            error: None,
            return_flag: false,
            return_value: None,
            break_flag: false,
            continue_flag: false,
        }
    }

    /// Clones this path's classical state into a new path. The fork inherits
    /// the environment, measurement record, and ledger; control-flow flags
    /// are inherited too so a fork inside a loop body stays in lockstep with
    /// its parent.
    #[must_use]
    pub(crate) fn fork(&self, id: PathId) -> Self {
        Self {
            id,
            active: self.active,
            env: self.env.clone(),
            measurements: self.measurements.clone(),
            instructions: self.instructions.clone(),
            error: None,
            return_flag: self.return_flag,
            return_value: self.return_value.clone(),
            break_flag: self.break_flag,
            continue_flag: self.continue_flag,
        }
    }

    /// Whether a control-flow flag suspends ordinary statement execution for
    /// this path.
    pub(crate) fn flagged(&self) -> bool {
        self.break_flag || self.continue_flag || self.return_flag
    }

    /// The classical variables of the global frame, omitting qubit bindings.
    #[must_use]
    pub fn classical_env(&self) -> Vec<(Rc<str>, Value)> {
        self.env
            .globals()
            .filter(|var| !matches!(var.value, Value::Qubit(_) | Value::QubitArray(_)))
            .map(|var| (var.name.clone(), var.value.clone()))
            .collect()
    }

    /// Looks up a variable visible from the global scope by name. An alias
    /// reads through to the selected elements of the storage it references.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Value> {
        let resolved = self.env.resolve(name)?;
        let value = self.env.var(resolved.slot).value.clone();
        let Some(selection) = resolved.selection else {
            return Some(value);
        };
        match value {
            Value::BitArray(bits) => {
                let mut out = BitArray::new(u32::try_from(selection.len()).ok()?, 0);
                for (j, &i) in selection.iter().enumerate() {
                    let i = u32::try_from(i).ok()?;
                    out.set(u32::try_from(j).ok()?, bits.get(i));
                }
                Some(Value::BitArray(out))
            }
            Value::Array(arr) => {
                let mut values = Vec::new();
                for &i in selection.iter() {
                    values.push(arr.values.get(usize::try_from(i).ok()?)?.clone());
                }
                Some(Value::Array(ArrayValue { values }))
            }
            other => Some(other),
        }
    }
}
