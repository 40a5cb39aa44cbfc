// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The top-level driver for the branched execution engine. It parses a
//! program, seeds one initial path with the supplied input bindings, and
//! returns the final population of execution paths, whose quantum states can
//! be materialized on demand through the amplitude engine.

#![warn(clippy::mod_module_files, clippy::pedantic, clippy::unwrap_used)]

#[cfg(test)]
mod tests;

pub use qbr_eval::{
    backend::{AmplitudeEngine, DenseSim, EngineError},
    path::{Gate, GateInstruction, GateModifier, Instruction, Path, PathId},
    val::{BitArray, IntValue, Value},
    COLLAPSE_EPSILON,
};

use miette::Diagnostic;
use num_complex::Complex64;
use qbr_eval::Evolution;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use thiserror::Error as ThisError;

#[derive(Clone, Debug, Diagnostic, PartialEq, ThisError)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(qbr_parse::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Eval(qbr_eval::Error),
}

/// Inputs bound to the program's declared `input` variables by name.
pub type Inputs = FxHashMap<Rc<str>, Value>;

/// Parses and evaluates a program with the default dense state-vector
/// engine.
///
/// # Errors
/// Returns all parse errors if the source is malformed, or the run-fatal
/// evaluation error if one occurred. Path-local errors do not fail the run;
/// they are attached to the terminated paths in the result.
pub fn evolve(source: &str, inputs: &Inputs) -> Result<BranchedResult, Vec<Error>> {
    evolve_with_engine(source, inputs, Box::new(DenseSim))
}

/// Parses and evaluates a program against a caller-supplied amplitude
/// engine.
///
/// # Errors
/// Same contract as [`evolve`].
pub fn evolve_with_engine(
    source: &str,
    inputs: &Inputs,
    engine: Box<dyn AmplitudeEngine>,
) -> Result<BranchedResult, Vec<Error>> {
    let (program, errors) = qbr_parse::parse(source);
    if !errors.is_empty() {
        return Err(errors.into_iter().map(Error::Parse).collect());
    }

    let evolution = qbr_eval::evolve(&program, engine.as_ref(), inputs)
        .map_err(|error| vec![Error::Eval(error)])?;
    log::debug!(
        "evolution finished: {} paths, {} active, {} qubits",
        evolution.paths.len(),
        evolution.active_paths().len(),
        evolution.num_qubits
    );
    for path in &evolution.paths {
        if let Some(error) = &path.error {
            log::trace!("path {} terminated: {error}", path.id);
        }
    }
    Ok(BranchedResult { evolution, engine })
}

/// The final population: every path the program produced, with its classical
/// variables, measurement records, and committed instruction ledger.
pub struct BranchedResult {
    evolution: Evolution,
    engine: Box<dyn AmplitudeEngine>,
}

impl BranchedResult {
    #[must_use]
    pub fn paths(&self) -> &[Path] {
        &self.evolution.paths
    }

    #[must_use]
    pub fn active_paths(&self) -> Vec<PathId> {
        self.evolution.active_paths()
    }

    #[must_use]
    pub fn path(&self, id: PathId) -> &Path {
        self.evolution.path(id)
    }

    #[must_use]
    pub fn num_qubits(&self) -> usize {
        self.evolution.num_qubits
    }

    /// The qualified name of each qubit in the global registry.
    #[must_use]
    pub fn qubit_names(&self) -> &[Rc<str>] {
        &self.evolution.qubit_names
    }

    /// Materializes the full amplitude vector of a path by replaying its
    /// ledger through the amplitude engine.
    ///
    /// # Errors
    /// Returns an evaluation error if the engine rejects the ledger.
    pub fn state_vector(&self, id: PathId) -> Result<Vec<Complex64>, Error> {
        self.engine
            .state_vector(&self.path(id).instructions, self.evolution.num_qubits)
            .map_err(|error| Error::Eval(qbr_eval::Error::EngineFailure(error.to_string())))
    }
}
