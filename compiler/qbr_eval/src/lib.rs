// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The branched interpreter. A program is evaluated against a population of
//! execution paths: every statement is applied to each active path in its own
//! classical environment, measurements with indeterminate outcomes fork a
//! path into two, and each path records the quantum instructions it has
//! committed in an append-only ledger. Quantum state is never stored on a
//! path; the amplitude engine re-derives it from the ledger on demand.

#![warn(clippy::mod_module_files, clippy::pedantic, clippy::unwrap_used)]
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

pub mod backend;
mod builtins;
pub mod path;
pub mod scope;
pub mod val;

#[cfg(test)]
mod tests;

use backend::AmplitudeEngine;
use builtins::MathError;
use miette::Diagnostic;
use num_traits::ToPrimitive;
use path::{GateInstruction, GateModifier, Instruction, Path, PathId};
use qbr_data_structures::span::Span;
use qbr_parse::ast::{
    BinOp, ClassicalDeclStmt, DefStmt, EnumerableSet, Expr, ExprKind, ForStmt, FunctionCall,
    GateCallStmt, GateDefStmt, GateModifierKind, GateOperand, IfStmt, IndexItem, IoKeyword, Lit,
    LiteralKind, Program, RangeDef, ScalarType, ScalarTypeKind, Stmt, StmtKind, SwitchStmt,
    TypeDef, UnaryOp, ValueExpr, WhileStmt,
};
use rustc_hash::FxHashMap;
use scope::{AliasTarget, FrameKind, Mutability, Variable};
use std::rc::Rc;
use thiserror::Error as ThisError;
use val::{wrap_angle, ArrayValue, BitArray, IntValue, Ty, Value, MAX_WIDTH};

/// Outcome probabilities within this distance of 0 or 1 collapse without
/// forking.
pub const COLLAPSE_EPSILON: f64 = 1e-10;

/// The maximum subroutine call or gate inlining depth.
pub const RECURSION_LIMIT: usize = 1024;

#[derive(Clone, Debug, Diagnostic, PartialEq, ThisError)]
pub enum Error {
    #[error("{0} expects {1} arguments, but {2} were provided")]
    #[diagnostic(code("Qbr.Eval.ArityMismatch"))]
    ArityMismatch(String, usize, usize, #[label] Span),

    #[error("cannot apply operator {0} to types {1} and {2}")]
    #[diagnostic(code("Qbr.Eval.CannotApplyOperatorToTypes"))]
    CannotApplyOperatorToTypes(&'static str, String, String, #[label] Span),

    #[error("cannot cast expression of type {0} to type {1}")]
    #[diagnostic(code("Qbr.Eval.CannotCast"))]
    CannotCast(String, String, #[label] Span),

    #[error("cannot update const variable {0}")]
    #[diagnostic(help("mutable variables must be declared without the keyword `const`"))]
    #[diagnostic(code("Qbr.Eval.CannotUpdateConstVariable"))]
    CannotUpdateConstVariable(String, #[label] Span),

    #[error("division by zero")]
    #[diagnostic(code("Qbr.Eval.DivisionByZero"))]
    DivisionByZero(#[label] Span),

    #[error("amplitude engine failure: {0}")]
    #[diagnostic(code("Qbr.Eval.EngineFailure"))]
    EngineFailure(String),

    #[error("gate {0} may not mention its own name")]
    #[diagnostic(code("Qbr.Eval.GateRecursion"))]
    GateRecursion(String, #[label] Span),

    #[error("index out of range: {0}")]
    #[diagnostic(code("Qbr.Eval.IndexOutOfBounds"))]
    IndexOutOfBounds(i64, #[label] Span),

    #[error("invalid argument: {0}")]
    #[diagnostic(code("Qbr.Eval.InvalidArgument"))]
    InvalidArgument(&'static str, #[label] Span),

    #[error("control counts must be positive integers")]
    #[diagnostic(code("Qbr.Eval.InvalidControlCount"))]
    InvalidControlCount(#[label] Span),

    #[error("{0} must be declared in global scope")]
    #[diagnostic(code("Qbr.Eval.InvalidScope"))]
    InvalidScope(&'static str, #[label] Span),

    #[error("missing value for input {0}")]
    #[diagnostic(code("Qbr.Eval.MissingInput"))]
    MissingInput(String),

    #[error("a call that forks on measurement may only be a whole statement or right-hand side")]
    #[diagnostic(code("Qbr.Eval.NondeterministicCall"))]
    NondeterministicCall(#[label] Span),

    #[error("gate uses qubit {0} more than once")]
    #[diagnostic(code("Qbr.Eval.QubitReused"))]
    QubitReused(String, #[label] Span),

    #[error("recursion limit exceeded")]
    #[diagnostic(code("Qbr.Eval.RecursionLimitExceeded"))]
    RecursionLimitExceeded(#[label] Span),

    #[error("redefined symbol: {0}")]
    #[diagnostic(code("Qbr.Eval.RedefinedSymbol"))]
    RedefinedSymbol(String, #[label] Span),

    #[error("expected {0}, found {1}")]
    #[diagnostic(code("Qbr.Eval.Type"))]
    Type(&'static str, String, #[label] Span),

    #[error("{0} max width is {MAX_WIDTH} but {1} was provided")]
    #[diagnostic(code("Qbr.Eval.TypeMaxWidthExceeded"))]
    TypeMaxWidthExceeded(&'static str, u32, #[label] Span),

    #[error("undefined symbol: {0}")]
    #[diagnostic(code("Qbr.Eval.UndefinedSymbol"))]
    UndefinedSymbol(String, #[label] Span),

    #[error("not supported: {0}")]
    #[diagnostic(code("Qbr.Eval.Unimplemented"))]
    Unimplemented(&'static str, #[label] Span),

    #[error("include {0} could not be resolved")]
    #[diagnostic(code("Qbr.Eval.UnsupportedInclude"))]
    UnsupportedInclude(String, #[label] Span),

    #[error("mismatched widths: {0} and {1}")]
    #[diagnostic(code("Qbr.Eval.WidthMismatch"))]
    WidthMismatch(u32, u32, #[label] Span),

    #[error("range with step size of zero")]
    #[diagnostic(code("Qbr.Eval.ZeroStepRange"))]
    ZeroStepRange(#[label] Span),
}

impl Error {
    /// Whether the error aborts the whole run rather than terminating a
    /// single path.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::EngineFailure(_)
                | Error::MissingInput(_)
                | Error::RecursionLimitExceeded(_)
        )
    }
}

/// The final population of an evaluation run.
pub struct Evolution {
    pub paths: Vec<Path>,
    pub num_qubits: usize,
    /// Qualified name of each qubit in the global registry.
    pub qubit_names: Vec<Rc<str>>,
    /// The surviving population in traversal order: children of a split keep
    /// the parent's position, with the 1-child immediately after the 0-child.
    active: Vec<PathId>,
}

impl Evolution {
    #[must_use]
    pub fn active_paths(&self) -> Vec<PathId> {
        self.active
            .iter()
            .copied()
            .filter(|id| self.paths[id.0].active)
            .collect()
    }

    #[must_use]
    pub fn path(&self, id: PathId) -> &Path {
        &self.paths[id.0]
    }
}

/// Evaluates a program against the given amplitude engine, seeding one path
/// whose global frame binds the program's `input` declarations from
/// `inputs`. Unknown entries in `inputs` are ignored.
pub fn evolve(
    program: &Program,
    engine: &dyn AmplitudeEngine,
    inputs: &FxHashMap<Rc<str>, Value>,
) -> Result<Evolution, Error> {
    let mut interpreter = Interpreter {
        engine,
        inputs,
        registry: Vec::new(),
        declared_qubits: FxHashMap::default(),
        gates: FxHashMap::default(),
        defs: FxHashMap::default(),
        paths: Vec::new(),
        call_depth: 0,
    };
    let active = interpreter.run(program)?;
    let num_qubits = interpreter.registry.len();
    let mut paths = interpreter.paths;
    for path in &mut paths {
        path.break_flag = false;
        path.continue_flag = false;
        path.return_flag = false;
        path.return_value = None;
    }
    Ok(Evolution {
        paths,
        num_qubits,
        qubit_names: interpreter.registry,
        active,
    })
}

/// An index evaluated against a concrete collection: a single position or an
/// expanded slice.
enum Index {
    At(i64),
    Slice(Vec<i64>),
}

struct Interpreter<'a> {
    engine: &'a dyn AmplitudeEngine,
    inputs: &'a FxHashMap<Rc<str>, Value>,
    /// Qualified name per global qubit index. Shared by all paths; qubits are
    /// never forked, only the instructions acting on them are.
    registry: Vec<Rc<str>>,
    /// Registered qubit declarations keyed by declaration site, so a
    /// declaration reached by several paths allocates only once.
    declared_qubits: FxHashMap<u32, (usize, usize)>,
    gates: FxHashMap<Rc<str>, (Span, Rc<GateDefStmt>)>,
    defs: FxHashMap<Rc<str>, (Span, Rc<DefStmt>)>,
    paths: Vec<Path>,
    call_depth: usize,
}

impl Interpreter<'_> {
    fn run(&mut self, program: &Program) -> Result<Vec<PathId>, Error> {
        let seed = PathId(0);
        self.paths.push(Path::new(seed));
        self.declare_constants(seed);
        self.eval_stmts(&program.statements, vec![seed])
    }

    fn declare_constants(&mut self, p: PathId) {
        for (name, value) in [
            ("pi", std::f64::consts::PI),
            ("π", std::f64::consts::PI),
            ("tau", std::f64::consts::TAU),
            ("τ", std::f64::consts::TAU),
            ("euler", std::f64::consts::E),
            ("ℇ", std::f64::consts::E),
        ] {
            self.paths[p.0]
                .env
                .declare(Variable {
                    name: name.into(),
                    ty: Ty::Float,
                    mutability: Mutability::Const,
                    value: Value::Float(value),
                })
                .expect("constants should not collide");
        }
    }

    fn path(&self, p: PathId) -> &Path {
        &self.paths[p.0]
    }

    fn path_mut(&mut self, p: PathId) -> &mut Path {
        &mut self.paths[p.0]
    }

    /// Terminates a path with a path-local error.
    fn fail(&mut self, p: PathId, error: Error) {
        let path = self.path_mut(p);
        if path.active {
            path.active = false;
            path.error = Some(error);
        }
    }

    /// Splits a result into path-local failure (the path is terminated and
    /// `None` returned) and run-fatal failure (propagated).
    fn guarded<T>(&mut self, p: PathId, result: Result<T, Error>) -> Result<Option<T>, Error> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                self.fail(p, error);
                Ok(None)
            }
        }
    }

    /// Evaluates a statement list against a population, statement at a time.
    /// Paths suspended by `break`, `continue`, or `return` skip the remaining
    /// statements and flow through unchanged.
    fn eval_stmts(
        &mut self,
        stmts: &[Box<Stmt>],
        paths: Vec<PathId>,
    ) -> Result<Vec<PathId>, Error> {
        let mut active = paths;
        for stmt in stmts {
            let mut next = Vec::new();
            for p in active {
                if self.path(p).flagged() {
                    next.push(p);
                } else {
                    next.extend(self.eval_stmt_on(stmt, p)?);
                }
            }
            active = next;
        }
        Ok(active)
    }

    /// Evaluates one statement against one path. Returns the paths that
    /// continue after the statement: empty when the path terminated, more
    /// than one when a measurement forked it.
    #[allow(clippy::too_many_lines)]
    fn eval_stmt_on(&mut self, stmt: &Stmt, p: PathId) -> Result<Vec<PathId>, Error> {
        let span = stmt.span;
        match &*stmt.kind {
            StmtKind::Include(include) => {
                if include.path.as_ref() == "stdgates.inc" {
                    Ok(vec![p])
                } else {
                    self.fail(
                        p,
                        Error::UnsupportedInclude(include.path.to_string(), include.span),
                    );
                    Ok(Vec::new())
                }
            }
            StmtKind::Block(block) => {
                self.path_mut(p).env.enter(FrameKind::Block);
                let out = self.eval_stmts(&block.stmts, vec![p])?;
                for q in &out {
                    self.path_mut(*q).env.leave();
                }
                Ok(out)
            }
            StmtKind::QubitDecl(decl) => {
                let result = self.eval_qubit_decl(p, decl, span);
                Ok(self.guarded(p, result)?.map(|()| vec![p]).unwrap_or_default())
            }
            StmtKind::ClassicalDecl(decl) => self.eval_classical_decl(p, decl, span),
            StmtKind::ConstDecl(decl) => {
                let result = (|| {
                    let ty = self.resolve_type(p, &decl.ty)?;
                    let value = self.eval_expr(p, &decl.init)?;
                    let value = self.cast_value(&ty, value, false, decl.init.span)?;
                    self.declare(p, &decl.name.name, ty, Mutability::Const, value, span)
                })();
                Ok(self.guarded(p, result)?.map(|()| vec![p]).unwrap_or_default())
            }
            StmtKind::IODecl(decl) => {
                let result = (|| {
                    if !self.path(p).env.in_global_scope() {
                        return Err(Error::InvalidScope("input and output declarations", span));
                    }
                    let ty = self.resolve_type(p, &decl.ty)?;
                    let (mutability, value) = match decl.io {
                        IoKeyword::Input => {
                            let value = self
                                .inputs
                                .get(&decl.name.name)
                                .ok_or_else(|| Error::MissingInput(decl.name.name.to_string()))?
                                .clone();
                            (
                                Mutability::Input,
                                self.cast_value(&ty, value, false, span)?,
                            )
                        }
                        IoKeyword::Output => (Mutability::Output, ty.default_value()),
                    };
                    self.declare(p, &decl.name.name, ty, mutability, value, span)
                })();
                Ok(self.guarded(p, result)?.map(|()| vec![p]).unwrap_or_default())
            }
            StmtKind::Alias(alias) => {
                let result = self.eval_alias(p, &alias.name.name, &alias.target, span);
                Ok(self.guarded(p, result)?.map(|()| vec![p]).unwrap_or_default())
            }
            StmtKind::Assign(assign) => {
                let outcomes = match &assign.rhs {
                    ValueExpr::Measurement(measure) => {
                        self.measure_operand(p, &measure.operand, measure.span)?
                    }
                    ValueExpr::Expr(expr) => match self.rhs_values(p, expr)? {
                        Some(outcomes) => outcomes,
                        None => return Ok(Vec::new()),
                    },
                };
                let mut out = Vec::new();
                for (q, value) in outcomes {
                    let result = self.store_lvalue(q, &assign.lhs, value);
                    if self.guarded(q, result)?.is_some() {
                        out.push(q);
                    }
                }
                Ok(out)
            }
            StmtKind::AssignOp(assign_op) => {
                let result = (|| {
                    let current = self.eval_expr(p, &assign_op.lhs)?;
                    let rhs = self.eval_expr(p, &assign_op.rhs)?;
                    let value = eval_binary(assign_op.op, current, rhs, span)?;
                    self.store_lvalue(p, &assign_op.lhs, value)
                })();
                Ok(self.guarded(p, result)?.map(|()| vec![p]).unwrap_or_default())
            }
            StmtKind::GateCall(call) => {
                let result = self.gate_call_instructions(p, call, span);
                match self.guarded(p, result)? {
                    Some(instructions) => {
                        self.path_mut(p)
                            .instructions
                            .extend(instructions.into_iter().map(Instruction::Gate));
                        Ok(vec![p])
                    }
                    None => Ok(Vec::new()),
                }
            }
            StmtKind::Measure(measure) => {
                let outcomes =
                    self.measure_operand(p, &measure.measurement.operand, measure.measurement.span)?;
                match &measure.target {
                    None => Ok(outcomes.into_iter().map(|(q, _)| q).collect()),
                    Some(target) => {
                        let mut out = Vec::new();
                        for (q, value) in outcomes {
                            let result = self.store_lvalue(q, target, value);
                            if self.guarded(q, result)?.is_some() {
                                out.push(q);
                            }
                        }
                        Ok(out)
                    }
                }
            }
            StmtKind::Reset(reset) => {
                let result = self.resolve_gate_operand(p, &reset.operand);
                match self.guarded(p, result)? {
                    Some((qubits, _)) => {
                        for qubit in qubits {
                            self.path_mut(p).instructions.push(Instruction::Reset { qubit });
                        }
                        Ok(vec![p])
                    }
                    None => Ok(Vec::new()),
                }
            }
            StmtKind::If(if_stmt) => self.eval_if(p, if_stmt),
            StmtKind::While(while_stmt) => self.eval_while(p, while_stmt),
            StmtKind::For(for_stmt) => self.eval_for(p, for_stmt, span),
            StmtKind::Switch(switch) => self.eval_switch(p, switch),
            StmtKind::Break => {
                self.path_mut(p).break_flag = true;
                Ok(vec![p])
            }
            StmtKind::Continue => {
                self.path_mut(p).continue_flag = true;
                Ok(vec![p])
            }
            StmtKind::Return(ret) => {
                let outcomes = match &ret.value {
                    None => vec![(p, None)],
                    Some(ValueExpr::Measurement(measure)) => self
                        .measure_operand(p, &measure.operand, measure.span)?
                        .into_iter()
                        .map(|(q, value)| (q, Some(value)))
                        .collect(),
                    Some(ValueExpr::Expr(expr)) => match self.rhs_values(p, expr)? {
                        Some(outcomes) => outcomes
                            .into_iter()
                            .map(|(q, value)| (q, Some(value)))
                            .collect(),
                        None => return Ok(Vec::new()),
                    },
                };
                let mut out = Vec::new();
                for (q, value) in outcomes {
                    let path = self.path_mut(q);
                    path.return_flag = true;
                    path.return_value = value;
                    out.push(q);
                }
                Ok(out)
            }
            StmtKind::Def(def) => {
                let result = self.register_def(p, def, span);
                Ok(self.guarded(p, result)?.map(|()| vec![p]).unwrap_or_default())
            }
            StmtKind::GateDef(gate_def) => {
                let result = self.register_gate(p, gate_def, span);
                Ok(self.guarded(p, result)?.map(|()| vec![p]).unwrap_or_default())
            }
            StmtKind::Expr(expr) => {
                if let ExprKind::Call(call) = &*expr.kind {
                    if self.defs.contains_key(&call.name.name) {
                        let result = self.eval_call(p, call, expr.span);
                        let Some(outcomes) = self.guarded(p, result)? else {
                            return Ok(Vec::new());
                        };
                        return Ok(outcomes.into_iter().map(|(q, _)| q).collect());
                    }
                }
                let result = self.eval_expr(p, expr);
                Ok(self.guarded(p, result)?.map(|_| vec![p]).unwrap_or_default())
            }
            StmtKind::Err => {
                self.fail(p, Error::Unimplemented("invalid statement", span));
                Ok(Vec::new())
            }
        }
    }

    /// Evaluates the right-hand side of a declaration, assignment, or
    /// return. A call to a subroutine goes through the population-aware call
    /// path so that measurements inside the body may fork; everything else is
    /// a single-path expression. Returns `None` when the path terminated.
    fn rhs_values(
        &mut self,
        p: PathId,
        expr: &Expr,
    ) -> Result<Option<Vec<(PathId, Value)>>, Error> {
        if let ExprKind::Call(call) = &*expr.kind {
            if self.defs.contains_key(&call.name.name) {
                let result = self.eval_call(p, call, expr.span);
                let Some(outcomes) = self.guarded(p, result)? else {
                    return Ok(None);
                };
                let mut values = Vec::new();
                for (q, value) in outcomes {
                    match value {
                        Some(value) => values.push((q, value)),
                        None => self.fail(
                            q,
                            Error::Type("value", "void subroutine call".to_string(), expr.span),
                        ),
                    }
                }
                return Ok(Some(values));
            }
        }
        let result = self.eval_expr(p, expr);
        Ok(self.guarded(p, result)?.map(|value| vec![(p, value)]))
    }

    fn eval_qubit_decl(
        &mut self,
        p: PathId,
        decl: &qbr_parse::ast::QubitDeclStmt,
        span: Span,
    ) -> Result<(), Error> {
        if !self.path(p).env.in_global_scope() {
            return Err(Error::InvalidScope("qubit declarations", span));
        }
        let size = match &decl.size {
            None => None,
            Some(expr) => {
                let value = self.eval_expr(p, expr)?;
                let size = value
                    .as_int()
                    .filter(|size| *size > 0)
                    .ok_or(Error::Type("positive integer", value.type_name().to_string(), expr.span))?;
                Some(size as usize)
            }
        };

        let (start, len) = match self.declared_qubits.get(&span.lo) {
            Some(registered) => *registered,
            None => {
                let start = self.registry.len();
                let len = size.unwrap_or(1);
                if size.is_none() {
                    self.registry.push(decl.name.name.clone());
                } else {
                    for index in 0..len {
                        self.registry
                            .push(format!("{}[{index}]", decl.name.name).into());
                    }
                }
                self.declared_qubits.insert(span.lo, (start, len));
                (start, len)
            }
        };

        let (ty, value) = if size.is_none() {
            (Ty::Qubit, Value::Qubit(start))
        } else {
            (
                Ty::QubitArray(len as u32),
                Value::QubitArray((start..start + len).collect()),
            )
        };
        self.declare(p, &decl.name.name, ty, Mutability::Mutable, value, span)
    }

    fn eval_classical_decl(
        &mut self,
        p: PathId,
        decl: &ClassicalDeclStmt,
        span: Span,
    ) -> Result<Vec<PathId>, Error> {
        let ty = match {
            let result = self.resolve_type(p, &decl.ty);
            self.guarded(p, result)?
        } {
            Some(ty) => ty,
            None => return Ok(Vec::new()),
        };

        let outcomes = match &decl.init {
            None => vec![(p, ty.default_value())],
            Some(ValueExpr::Measurement(measure)) => {
                self.measure_operand(p, &measure.operand, measure.span)?
            }
            Some(ValueExpr::Expr(expr)) => match self.rhs_values(p, expr)? {
                Some(outcomes) => outcomes,
                None => return Ok(Vec::new()),
            },
        };

        let mut out = Vec::new();
        for (q, value) in outcomes {
            let result = (|| {
                let value = self.cast_value(&ty, value, false, span)?;
                self.declare(
                    q,
                    &decl.name.name,
                    ty.clone(),
                    Mutability::Mutable,
                    value,
                    span,
                )
            })();
            if self.guarded(q, result)?.is_some() {
                out.push(q);
            }
        }
        Ok(out)
    }

    fn declare(
        &mut self,
        p: PathId,
        name: &Rc<str>,
        ty: Ty,
        mutability: Mutability,
        value: Value,
        span: Span,
    ) -> Result<(), Error> {
        self.path_mut(p)
            .env
            .declare(Variable {
                name: name.clone(),
                ty,
                mutability,
                value,
            })
            .map(|_| ())
            .map_err(|()| Error::RedefinedSymbol(name.to_string(), span))
    }

    fn eval_alias(
        &mut self,
        p: PathId,
        name: &Rc<str>,
        target: &Expr,
        span: Span,
    ) -> Result<(), Error> {
        let (base, index) = match &*target.kind {
            ExprKind::Ident(ident) => (ident, None),
            ExprKind::Index(index_expr) => {
                let ExprKind::Ident(ident) = &*index_expr.collection.kind else {
                    return Err(Error::Unimplemented("alias target", target.span));
                };
                (ident, Some(&index_expr.index))
            }
            _ => return Err(Error::Unimplemented("alias target", target.span)),
        };

        let resolved = self
            .path(p)
            .env
            .resolve(&base.name)
            .ok_or_else(|| Error::UndefinedSymbol(base.name.to_string(), base.span))?;
        let base_value = self.path(p).env.var(resolved.slot).value.clone();

        // Qubit references are immutable, so aliasing them materializes the
        // selected indices directly.
        if matches!(base_value, Value::Qubit(_) | Value::QubitArray(_)) {
            let value = match index {
                None => base_value,
                Some(item) => {
                    let index = self.eval_index(p, item, collection_len(&base_value))?;
                    index_value(&base_value, &index, span)?
                }
            };
            let ty = match &value {
                Value::Qubit(_) => Ty::Qubit,
                Value::QubitArray(qs) => Ty::QubitArray(qs.len() as u32),
                _ => unreachable!("qubit alias should produce a qubit value"),
            };
            return self.declare(p, name, ty, Mutability::Mutable, value, span);
        }

        let selection = match index {
            None => resolved.selection,
            Some(item) => {
                let len = collection_len(&base_value);
                let indices = match self.eval_index(p, item, len)? {
                    Index::At(i) => vec![i],
                    Index::Slice(indices) => indices,
                };
                for &i in &indices {
                    if i < 0 || i >= len {
                        return Err(Error::IndexOutOfBounds(i, span));
                    }
                }
                // Compose with the selection of an aliased alias.
                match &resolved.selection {
                    None => Some(indices.into()),
                    Some(outer) => Some(
                        indices
                            .iter()
                            .map(|&i| outer[i as usize])
                            .collect::<Vec<_>>()
                            .into(),
                    ),
                }
            }
        };

        self.path_mut(p)
            .env
            .declare_alias(
                name.clone(),
                AliasTarget {
                    slot: resolved.slot,
                    selection,
                },
            )
            .map_err(|()| Error::RedefinedSymbol(name.to_string(), span))
    }

    fn register_def(&mut self, p: PathId, def: &DefStmt, span: Span) -> Result<(), Error> {
        if !self.path(p).env.in_global_scope() {
            return Err(Error::InvalidScope("def declarations", span));
        }
        if let Some((existing, _)) = self.defs.get(&def.name.name) {
            if *existing == span {
                return Ok(());
            }
            return Err(Error::RedefinedSymbol(def.name.name.to_string(), span));
        }
        self.defs
            .insert(def.name.name.clone(), (span, Rc::new(def.clone())));
        Ok(())
    }

    fn register_gate(&mut self, p: PathId, gate: &GateDefStmt, span: Span) -> Result<(), Error> {
        if !self.path(p).env.in_global_scope() {
            return Err(Error::InvalidScope("gate declarations", span));
        }
        if mentions_gate(&gate.body.stmts, &gate.name.name) {
            return Err(Error::GateRecursion(gate.name.name.to_string(), span));
        }
        if let Some((existing, _)) = self.gates.get(&gate.name.name) {
            if *existing == span {
                return Ok(());
            }
            return Err(Error::RedefinedSymbol(gate.name.name.to_string(), span));
        }
        self.gates
            .insert(gate.name.name.clone(), (span, Rc::new(gate.clone())));
        Ok(())
    }
}

fn mentions_gate(stmts: &[Box<Stmt>], name: &str) -> bool {
    stmts.iter().any(|stmt| match &*stmt.kind {
        StmtKind::GateCall(call) => call.name.name.as_ref() == name,
        StmtKind::Block(block) => mentions_gate(&block.stmts, name),
        _ => false,
    })
}

fn collection_len(value: &Value) -> i64 {
    match value {
        Value::BitArray(bits) => i64::from(bits.width),
        Value::QubitArray(qs) => qs.len() as i64,
        Value::Array(arr) => arr.values.len() as i64,
        _ => 0,
    }
}

/// Reads one element or slice out of an indexable value.
fn index_value(value: &Value, index: &Index, span: Span) -> Result<Value, Error> {
    let len = collection_len(value);
    let check = |i: i64| {
        if i < 0 || i >= len {
            Err(Error::IndexOutOfBounds(i, span))
        } else {
            Ok(i as usize)
        }
    };
    match (value, index) {
        (Value::BitArray(bits), Index::At(i)) => Ok(Value::Bit(bits.get(check(*i)? as u32))),
        (Value::BitArray(bits), Index::Slice(indices)) => {
            let mut out = BitArray::new(indices.len() as u32, 0);
            for (j, &i) in indices.iter().enumerate() {
                out.set(j as u32, bits.get(check(i)? as u32));
            }
            Ok(Value::BitArray(out))
        }
        (Value::QubitArray(qs), Index::At(i)) => Ok(Value::Qubit(qs[check(*i)?])),
        (Value::QubitArray(qs), Index::Slice(indices)) => {
            let mut out = Vec::new();
            for &i in indices {
                out.push(qs[check(i)?]);
            }
            Ok(Value::QubitArray(out.into()))
        }
        (Value::Array(arr), Index::At(i)) => Ok(arr.values[check(*i)?].clone()),
        (Value::Array(arr), Index::Slice(indices)) => {
            let mut out = Vec::new();
            for &i in indices {
                out.push(arr.values[check(i)?].clone());
            }
            Ok(Value::Array(ArrayValue { values: out }))
        }
        _ => Err(Error::Type(
            "indexable value",
            value.type_name().to_string(),
            span,
        )),
    }
}

impl Interpreter<'_> {
    fn eval_cond(&mut self, p: PathId, expr: &Expr) -> Result<bool, Error> {
        let value = self.eval_expr(p, expr)?;
        value
            .as_bool()
            .ok_or_else(|| Error::Type("bool", value.type_name().to_string(), expr.span))
    }

    fn eval_if(&mut self, p: PathId, if_stmt: &IfStmt) -> Result<Vec<PathId>, Error> {
        let result = self.eval_cond(p, &if_stmt.condition);
        let Some(guard) = self.guarded(p, result)? else {
            return Ok(Vec::new());
        };
        if guard {
            self.path_mut(p).env.enter(FrameKind::If);
            let out = self.eval_stmt_on(&if_stmt.if_body, p)?;
            for q in &out {
                self.path_mut(*q).env.leave();
            }
            Ok(out)
        } else if let Some(else_body) = &if_stmt.else_body {
            self.path_mut(p).env.enter(FrameKind::Else);
            let out = self.eval_stmt_on(else_body, p)?;
            for q in &out {
                self.path_mut(*q).env.leave();
            }
            Ok(out)
        } else {
            Ok(vec![p])
        }
    }

    /// Drives a `while` loop for one incoming path. Descendants forked inside
    /// the body keep looping; paths may exit on different iterations.
    fn eval_while(&mut self, p: PathId, while_stmt: &WhileStmt) -> Result<Vec<PathId>, Error> {
        let mut in_loop = vec![p];
        let mut done = Vec::new();
        loop {
            let mut entering = Vec::new();
            for q in in_loop {
                let result = self.eval_cond(q, &while_stmt.condition);
                match self.guarded(q, result)? {
                    Some(true) => entering.push(q),
                    Some(false) => done.push(q),
                    None => {}
                }
            }
            if entering.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for q in entering {
                self.path_mut(q).env.enter(FrameKind::While);
                let out = self.eval_stmt_on(&while_stmt.body, q)?;
                for r in out {
                    self.path_mut(r).env.leave();
                    let path = self.path_mut(r);
                    if path.break_flag {
                        path.break_flag = false;
                        path.continue_flag = false;
                        done.push(r);
                    } else if path.return_flag {
                        done.push(r);
                    } else {
                        path.continue_flag = false;
                        next.push(r);
                    }
                }
            }
            in_loop = next;
        }
        Ok(done)
    }

    /// Drives a `for` loop for one incoming path. The iterable is evaluated
    /// once at loop entry; descendants forked inside the body inherit the
    /// remaining iterations.
    fn eval_for(&mut self, p: PathId, for_stmt: &ForStmt, span: Span) -> Result<Vec<PathId>, Error> {
        let setup = (|| {
            let values = self.iterable_values(p, &for_stmt.iterable, span)?;
            let ty = self.resolve_scalar(p, &for_stmt.ty)?;
            Ok((values, ty))
        })();
        let Some((values, ty)) = self.guarded(p, setup)? else {
            return Ok(Vec::new());
        };

        let mut in_loop = vec![p];
        let mut done = Vec::new();
        for v in values {
            let mut next = Vec::new();
            for q in in_loop {
                self.path_mut(q).env.enter(FrameKind::ForIter);
                let declared = (|| {
                    let value = self.cast_value(
                        &ty,
                        Value::Int(IntValue {
                            width: MAX_WIDTH,
                            signed: true,
                            value: v,
                        }),
                        false,
                        span,
                    )?;
                    self.declare(
                        q,
                        &for_stmt.ident.name,
                        ty.clone(),
                        Mutability::Mutable,
                        value,
                        for_stmt.ident.span,
                    )
                })();
                if self.guarded(q, declared)?.is_none() {
                    continue;
                }
                let out = self.eval_stmt_on(&for_stmt.body, q)?;
                for r in out {
                    self.path_mut(r).env.leave();
                    let path = self.path_mut(r);
                    if path.break_flag {
                        path.break_flag = false;
                        path.continue_flag = false;
                        done.push(r);
                    } else if path.return_flag {
                        done.push(r);
                    } else {
                        path.continue_flag = false;
                        next.push(r);
                    }
                }
            }
            in_loop = next;
            if in_loop.is_empty() {
                break;
            }
        }
        done.extend(in_loop);
        Ok(done)
    }

    fn iterable_values(
        &mut self,
        p: PathId,
        iterable: &EnumerableSet,
        span: Span,
    ) -> Result<Vec<i64>, Error> {
        match iterable {
            EnumerableSet::Range(range) => {
                let start = self.range_bound(p, range.start.as_ref(), span)?;
                let end = self.range_bound(p, range.end.as_ref(), span)?;
                let step = match &range.step {
                    None => 1,
                    Some(expr) => {
                        let step = self.eval_int(p, expr)?;
                        if step == 0 {
                            return Err(Error::ZeroStepRange(range.span));
                        }
                        step
                    }
                };
                let mut values = Vec::new();
                let mut v = start;
                while (step > 0 && v <= end) || (step < 0 && v >= end) {
                    values.push(v);
                    v += step;
                }
                Ok(values)
            }
            EnumerableSet::Set(set) => {
                let mut values = Vec::new();
                for expr in set.values.iter() {
                    values.push(self.eval_int(p, expr)?);
                }
                Ok(values)
            }
        }
    }

    fn range_bound(
        &mut self,
        p: PathId,
        bound: Option<&Expr>,
        span: Span,
    ) -> Result<i64, Error> {
        match bound {
            Some(expr) => self.eval_int(p, expr),
            None => Err(Error::InvalidArgument(
                "loop ranges must have a start and an end",
                span,
            )),
        }
    }

    fn eval_int(&mut self, p: PathId, expr: &Expr) -> Result<i64, Error> {
        let value = self.eval_expr(p, expr)?;
        value
            .as_int()
            .ok_or_else(|| Error::Type("integer", value.type_name().to_string(), expr.span))
    }

    fn eval_switch(&mut self, p: PathId, switch: &SwitchStmt) -> Result<Vec<PathId>, Error> {
        let result = self.eval_int(p, &switch.selector);
        let Some(selector) = self.guarded(p, result)? else {
            return Ok(Vec::new());
        };
        for case in switch.cases.iter() {
            for label in case.labels.iter() {
                let result = self.eval_int(p, label);
                let Some(value) = self.guarded(p, result)? else {
                    return Ok(Vec::new());
                };
                if value == selector {
                    self.path_mut(p).env.enter(FrameKind::Block);
                    let out = self.eval_stmts(&case.body.stmts, vec![p])?;
                    for q in &out {
                        self.path_mut(*q).env.leave();
                    }
                    return Ok(out);
                }
            }
        }
        if let Some(default) = &switch.default {
            self.path_mut(p).env.enter(FrameKind::Block);
            let out = self.eval_stmts(&default.stmts, vec![p])?;
            for q in &out {
                self.path_mut(*q).env.leave();
            }
            return Ok(out);
        }
        // No matching case and no default: the statement is a no-op.
        Ok(vec![p])
    }

    /// Calls a subroutine for one path. The body runs through the population
    /// machinery, so measurement statements inside it may fork; every
    /// resulting path is returned with its own return value.
    fn eval_call(
        &mut self,
        p: PathId,
        call: &FunctionCall,
        span: Span,
    ) -> Result<Vec<(PathId, Option<Value>)>, Error> {
        let (_, def) = self
            .defs
            .get(&call.name.name)
            .cloned()
            .expect("caller should check that the subroutine exists");
        if self.call_depth >= RECURSION_LIMIT {
            return Err(Error::RecursionLimitExceeded(span));
        }
        if call.args.len() != def.params.len() {
            return Err(Error::ArityMismatch(
                call.name.name.to_string(),
                def.params.len(),
                call.args.len(),
                span,
            ));
        }

        let mut vars = Vec::new();
        for (param, arg) in def.params.iter().zip(call.args.iter()) {
            let value = self.eval_expr(p, arg)?;
            let (ty, value) = self.bind_param(p, param, value, arg.span)?;
            vars.push(Variable {
                name: param.name.name.clone(),
                ty,
                mutability: Mutability::Mutable,
                value,
            });
        }
        let return_ty = match &def.return_ty {
            Some(ty) => Some(self.resolve_scalar(p, ty)?),
            None => None,
        };

        self.path_mut(p).env.enter(FrameKind::Function);
        for var in vars {
            let name = var.name.clone();
            if self.path_mut(p).env.declare(var).is_err() {
                self.path_mut(p).env.leave();
                return Err(Error::RedefinedSymbol(name.to_string(), span));
            }
        }

        self.call_depth += 1;
        let body_result = self.eval_stmts(&def.body.stmts, vec![p]);
        self.call_depth -= 1;
        let out = body_result?;

        let mut outcomes = Vec::new();
        for q in out {
            self.path_mut(q).env.leave();
            let path = self.path_mut(q);
            path.break_flag = false;
            path.continue_flag = false;
            path.return_flag = false;
            let value = path.return_value.take();
            match (&return_ty, value) {
                (None, _) => outcomes.push((q, None)),
                (Some(ty), Some(value)) => {
                    let ty = ty.clone();
                    let result = self.cast_value(&ty, value, false, span);
                    if let Some(value) = self.guarded(q, result)? {
                        outcomes.push((q, Some(value)));
                    }
                }
                (Some(_), None) => self.fail(
                    q,
                    Error::Type("return value", "end of subroutine".to_string(), span),
                ),
            }
        }
        Ok(outcomes)
    }

    fn bind_param(
        &mut self,
        p: PathId,
        param: &qbr_parse::ast::TypedParameter,
        value: Value,
        span: Span,
    ) -> Result<(Ty, Value), Error> {
        if let TypeDef::Scalar(scalar) = &param.ty {
            match &scalar.kind {
                ScalarTypeKind::Qubit(None) => {
                    return match value {
                        Value::Qubit(_) => Ok((Ty::Qubit, value)),
                        _ => Err(Error::Type("qubit", value.type_name().to_string(), span)),
                    };
                }
                ScalarTypeKind::Qubit(Some(size)) => {
                    let size = self.eval_width(p, size, "qubit")?;
                    return match value {
                        Value::QubitArray(qs) => {
                            if qs.len() as u32 == size {
                                Ok((Ty::QubitArray(size), Value::QubitArray(qs)))
                            } else {
                                Err(Error::WidthMismatch(qs.len() as u32, size, span))
                            }
                        }
                        other => Err(Error::Type(
                            "qubit register",
                            other.type_name().to_string(),
                            span,
                        )),
                    };
                }
                _ => {}
            }
        }
        let ty = self.resolve_type(p, &param.ty)?;
        let value = self.cast_value(&ty, value, false, span)?;
        Ok((ty, value))
    }

    /// Measures a gate operand. A whole register measures its qubits in
    /// index order, forking independently at each indeterminate outcome.
    fn measure_operand(
        &mut self,
        p: PathId,
        operand: &GateOperand,
        _span: Span,
    ) -> Result<Vec<(PathId, Value)>, Error> {
        let resolved = self.resolve_gate_operand(p, operand);
        let Some((qubits, is_register)) = self.guarded(p, resolved)? else {
            return Ok(Vec::new());
        };
        let mut acc: Vec<(PathId, u64)> = vec![(p, 0)];
        for (j, &qubit) in qubits.iter().enumerate() {
            let mut next = Vec::new();
            for (q, bits) in acc {
                for (r, outcome) in self.measure_single(q, qubit)? {
                    next.push((r, bits | u64::from(outcome) << j));
                }
            }
            acc = next;
        }
        Ok(acc
            .into_iter()
            .map(|(q, bits)| {
                let value = if is_register {
                    Value::BitArray(BitArray::new(qubits.len() as u32, bits))
                } else {
                    Value::Bit(bits & 1 == 1)
                };
                (q, value)
            })
            .collect())
    }

    /// The branching step. Computes the Born-rule probability of |1⟩ from
    /// the path's ledger; a near-certain outcome collapses in place, while an
    /// indeterminate one forks the path, with the 0-child keeping the
    /// parent's position and the 1-child inserted immediately after.
    fn measure_single(&mut self, p: PathId, qubit: usize) -> Result<Vec<(PathId, bool)>, Error> {
        let prob_one = self
            .engine
            .probability_of_one(&self.paths[p.0].instructions, self.registry.len(), qubit)
            .map_err(|error| Error::EngineFailure(error.to_string()))?;
        if !prob_one.is_finite()
            || !(-COLLAPSE_EPSILON..=1.0 + COLLAPSE_EPSILON).contains(&prob_one)
        {
            return Err(Error::EngineFailure(format!(
                "probability {prob_one} outside [0, 1]"
            )));
        }

        let name = self.registry[qubit].clone();
        if prob_one <= COLLAPSE_EPSILON {
            self.record_outcome(p, &name, qubit, false);
            Ok(vec![(p, false)])
        } else if prob_one >= 1.0 - COLLAPSE_EPSILON {
            self.record_outcome(p, &name, qubit, true);
            Ok(vec![(p, true)])
        } else {
            let child_id = PathId(self.paths.len());
            let child = self.paths[p.0].fork(child_id);
            self.paths.push(child);
            self.record_outcome(p, &name, qubit, false);
            self.record_outcome(child_id, &name, qubit, true);
            Ok(vec![(p, false), (child_id, true)])
        }
    }

    fn record_outcome(&mut self, p: PathId, name: &Rc<str>, qubit: usize, outcome: bool) {
        let path = self.path_mut(p);
        path.measurements
            .entry(name.clone())
            .or_default()
            .push(outcome);
        path.instructions
            .push(Instruction::Measure { qubit, outcome });
    }

    /// Resolves a gate operand to concrete qubit indices. The flag reports
    /// whether the operand denotes a register (even of length one) rather
    /// than a single qubit.
    fn resolve_gate_operand(
        &mut self,
        p: PathId,
        operand: &GateOperand,
    ) -> Result<(Vec<usize>, bool), Error> {
        let resolved = self
            .path(p)
            .env
            .resolve(&operand.name.name)
            .ok_or_else(|| {
                Error::UndefinedSymbol(operand.name.name.to_string(), operand.name.span)
            })?;
        let mut value = self.path(p).env.var(resolved.slot).value.clone();
        if let Some(selection) = &resolved.selection {
            value = index_value(&value, &Index::Slice(selection.to_vec()), operand.span)?;
        }
        match (&value, &operand.index) {
            (Value::Qubit(index), None) => Ok((vec![*index], false)),
            (Value::Qubit(_), Some(_)) => Err(Error::Type(
                "qubit register",
                "qubit".to_string(),
                operand.span,
            )),
            (Value::QubitArray(qs), None) => Ok((qs.to_vec(), true)),
            (Value::QubitArray(_), Some(item)) => {
                let index = self.eval_index(p, item, collection_len(&value))?;
                match index_value(&value, &index, operand.span)? {
                    Value::Qubit(index) => Ok((vec![index], false)),
                    Value::QubitArray(qs) => Ok((qs.to_vec(), true)),
                    _ => Err(Error::Type(
                        "qubit",
                        value.type_name().to_string(),
                        operand.span,
                    )),
                }
            }
            _ => Err(Error::Type(
                "qubit",
                value.type_name().to_string(),
                operand.span,
            )),
        }
    }

    /// Resolves a gate application into the built-in gate instructions it
    /// commits: modifiers and parameters are evaluated, registers broadcast,
    /// and custom gates inline recursively.
    fn gate_call_instructions(
        &mut self,
        p: PathId,
        call: &GateCallStmt,
        span: Span,
    ) -> Result<Vec<GateInstruction>, Error> {
        let mut modifiers = Vec::new();
        for modifier in call.modifiers.iter() {
            let resolved = match &modifier.kind {
                GateModifierKind::Ctrl(count) => {
                    GateModifier::Ctrl(self.modifier_count(p, count.as_ref(), modifier.span)?)
                }
                GateModifierKind::NegCtrl(count) => {
                    GateModifier::NegCtrl(self.modifier_count(p, count.as_ref(), modifier.span)?)
                }
                GateModifierKind::Inv => GateModifier::Inv,
                GateModifierKind::Pow(expr) => {
                    let value = self.eval_expr(p, expr)?;
                    GateModifier::Pow(value.as_float().ok_or_else(|| {
                        Error::Type("number", value.type_name().to_string(), expr.span)
                    })?)
                }
            };
            modifiers.push(resolved);
        }
        let control_total: usize = modifiers
            .iter()
            .map(|modifier| match modifier {
                GateModifier::Ctrl(count) | GateModifier::NegCtrl(count) => *count,
                _ => 0,
            })
            .sum();

        let mut params = Vec::new();
        for param in call.params.iter() {
            let value = self.eval_expr(p, param)?;
            params.push(value.as_float().ok_or_else(|| {
                Error::Type("angle", value.type_name().to_string(), param.span)
            })?);
        }

        let mut operand_lists = Vec::new();
        for operand in call.operands.iter() {
            let (qubits, _) = self.resolve_gate_operand(p, operand)?;
            operand_lists.push((qubits, operand.span));
        }

        // Registers broadcast: every register operand must have the same
        // length, and single qubits repeat across the rows.
        let mut broadcast = 1;
        for (list, operand_span) in &operand_lists {
            if list.len() > 1 {
                if broadcast == 1 {
                    broadcast = list.len();
                } else if broadcast != list.len() {
                    return Err(Error::WidthMismatch(
                        broadcast as u32,
                        list.len() as u32,
                        *operand_span,
                    ));
                }
            }
        }

        let mut instructions = Vec::new();
        for j in 0..broadcast {
            let row: Vec<usize> = operand_lists
                .iter()
                .map(|(list, _)| if list.len() > 1 { list[j] } else { list[0] })
                .collect();
            instructions.extend(self.gate_row(p, call, &modifiers, control_total, &params, row, span)?);
        }
        Ok(instructions)
    }

    fn modifier_count(
        &mut self,
        p: PathId,
        count: Option<&Expr>,
        span: Span,
    ) -> Result<usize, Error> {
        match count {
            None => Ok(1),
            Some(expr) => {
                let value = self.eval_int(p, expr)?;
                if value < 1 {
                    return Err(Error::InvalidControlCount(span));
                }
                Ok(value as usize)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn gate_row(
        &mut self,
        p: PathId,
        call: &GateCallStmt,
        modifiers: &[GateModifier],
        control_total: usize,
        params: &[f64],
        row: Vec<usize>,
        span: Span,
    ) -> Result<Vec<GateInstruction>, Error> {
        if let Some(gate) = builtins::gate_by_name(&call.name.name) {
            if params.len() != gate.num_params() {
                return Err(Error::ArityMismatch(
                    call.name.name.to_string(),
                    gate.num_params(),
                    params.len(),
                    span,
                ));
            }
            let expected = control_total + gate.num_qubits();
            if row.len() != expected {
                return Err(Error::ArityMismatch(
                    call.name.name.to_string(),
                    expected,
                    row.len(),
                    span,
                ));
            }
            self.check_distinct(&row, span)?;
            return Ok(vec![GateInstruction {
                gate,
                targets: row,
                params: params.to_vec(),
                modifiers: modifiers.to_vec(),
            }]);
        }

        let Some((_, def)) = self.gates.get(&call.name.name).cloned() else {
            return Err(Error::UndefinedSymbol(
                call.name.name.to_string(),
                call.name.span,
            ));
        };
        if params.len() != def.params.len() {
            return Err(Error::ArityMismatch(
                call.name.name.to_string(),
                def.params.len(),
                params.len(),
                span,
            ));
        }
        let expected = control_total + def.qubits.len();
        if row.len() != expected {
            return Err(Error::ArityMismatch(
                call.name.name.to_string(),
                expected,
                row.len(),
                span,
            ));
        }
        let (controls, inner) = row.split_at(control_total);
        let body = self.expand_gate(p, &def, params, inner, span)?;
        let folded = fold_modifiers(body, modifiers, controls, span)?;
        for instruction in &folded {
            self.check_distinct(&instruction.targets, span)?;
        }
        Ok(folded)
    }

    fn check_distinct(&self, targets: &[usize], span: Span) -> Result<(), Error> {
        for (i, target) in targets.iter().enumerate() {
            if targets[..i].contains(target) {
                return Err(Error::QubitReused(self.registry[*target].to_string(), span));
            }
        }
        Ok(())
    }

    /// Inlines a custom gate body: parameters bind as constant angles, qubit
    /// formals bind to the substituted indices, and the body may contain only
    /// gate applications.
    fn expand_gate(
        &mut self,
        p: PathId,
        def: &Rc<GateDefStmt>,
        params: &[f64],
        qubits: &[usize],
        span: Span,
    ) -> Result<Vec<GateInstruction>, Error> {
        if self.call_depth >= RECURSION_LIMIT {
            return Err(Error::RecursionLimitExceeded(span));
        }
        self.path_mut(p).env.enter(FrameKind::Gate);
        self.call_depth += 1;
        let result = (|| {
            for (param, &value) in def.params.iter().zip(params) {
                self.path_mut(p)
                    .env
                    .declare(Variable {
                        name: param.name.clone(),
                        ty: Ty::Angle,
                        mutability: Mutability::Const,
                        value: Value::Angle(value),
                    })
                    .map_err(|()| Error::RedefinedSymbol(param.name.to_string(), param.span))?;
            }
            for (formal, &qubit) in def.qubits.iter().zip(qubits) {
                self.path_mut(p)
                    .env
                    .declare(Variable {
                        name: formal.name.clone(),
                        ty: Ty::Qubit,
                        mutability: Mutability::Const,
                        value: Value::Qubit(qubit),
                    })
                    .map_err(|()| Error::RedefinedSymbol(formal.name.to_string(), formal.span))?;
            }
            let mut instructions = Vec::new();
            for stmt in def.body.stmts.iter() {
                match &*stmt.kind {
                    StmtKind::GateCall(call) => {
                        instructions.extend(self.gate_call_instructions(p, call, stmt.span)?);
                    }
                    _ => {
                        return Err(Error::Unimplemented(
                            "only gate applications are allowed in gate bodies",
                            stmt.span,
                        ))
                    }
                }
            }
            Ok(instructions)
        })();
        self.call_depth -= 1;
        self.path_mut(p).env.leave();
        result
    }

    fn eval_expr(&mut self, p: PathId, expr: &Expr) -> Result<Value, Error> {
        match &*expr.kind {
            ExprKind::Lit(lit) => lit_value(lit),
            ExprKind::Ident(ident) => {
                let resolved = self
                    .path(p)
                    .env
                    .resolve(&ident.name)
                    .ok_or_else(|| Error::UndefinedSymbol(ident.name.to_string(), ident.span))?;
                let value = self.path(p).env.var(resolved.slot).value.clone();
                match resolved.selection {
                    None => Ok(value),
                    Some(selection) => {
                        index_value(&value, &Index::Slice(selection.to_vec()), expr.span)
                    }
                }
            }
            ExprKind::Index(index_expr) => {
                let value = self.eval_expr(p, &index_expr.collection)?;
                let index = self.eval_index(p, &index_expr.index, collection_len(&value))?;
                index_value(&value, &index, expr.span)
            }
            ExprKind::Paren(inner) => self.eval_expr(p, inner),
            ExprKind::UnaryOp(unary) => {
                let value = self.eval_expr(p, &unary.expr)?;
                eval_unary(unary.op, value, expr.span)
            }
            ExprKind::BinaryOp(binary) => match binary.op {
                // Logical operators short-circuit.
                BinOp::AndL | BinOp::OrL => {
                    let lhs = self.eval_cond(p, &binary.lhs)?;
                    if binary.op == BinOp::AndL && !lhs {
                        return Ok(Value::Bool(false));
                    }
                    if binary.op == BinOp::OrL && lhs {
                        return Ok(Value::Bool(true));
                    }
                    let rhs = self.eval_cond(p, &binary.rhs)?;
                    Ok(Value::Bool(rhs))
                }
                _ => {
                    let lhs = self.eval_expr(p, &binary.lhs)?;
                    let rhs = self.eval_expr(p, &binary.rhs)?;
                    eval_binary(binary.op, lhs, rhs, expr.span)
                }
            },
            ExprKind::Ternary(ternary) => {
                if self.eval_cond(p, &ternary.cond)? {
                    self.eval_expr(p, &ternary.if_true)
                } else {
                    self.eval_expr(p, &ternary.if_false)
                }
            }
            ExprKind::Cast(cast) => {
                let value = self.eval_expr(p, &cast.arg)?;
                let ty = self.resolve_type(p, &cast.ty)?;
                self.cast_value(&ty, value, true, cast.span)
            }
            ExprKind::Call(call) => self.eval_expr_call(p, call, expr.span),
            ExprKind::Err => Err(Error::Unimplemented("invalid expression", expr.span)),
        }
    }

    /// A call in expression position. Subroutine calls must resolve to a
    /// single continuing path; a fork inside a nested call has no replayable
    /// continuation.
    fn eval_expr_call(
        &mut self,
        p: PathId,
        call: &FunctionCall,
        span: Span,
    ) -> Result<Value, Error> {
        if self.defs.contains_key(&call.name.name) {
            let outcomes = self.eval_call(p, call, span)?;
            if outcomes.len() == 1 && outcomes[0].0 == p {
                return match outcomes
                    .into_iter()
                    .next()
                    .expect("length was checked")
                    .1
                {
                    Some(value) => Ok(value),
                    None => Err(Error::Type(
                        "value",
                        "void subroutine call".to_string(),
                        span,
                    )),
                };
            }
            for (q, _) in outcomes {
                self.fail(q, Error::NondeterministicCall(span));
            }
            return Err(Error::NondeterministicCall(span));
        }

        let mut args = Vec::new();
        for arg in call.args.iter() {
            args.push(self.eval_expr(p, arg)?);
        }
        match builtins::call_math(&call.name.name, &args) {
            Some(Ok(value)) => Ok(value),
            Some(Err(MathError::Arity(expected))) => Err(Error::ArityMismatch(
                call.name.name.to_string(),
                expected,
                args.len(),
                span,
            )),
            Some(Err(MathError::Domain(message))) => Err(Error::InvalidArgument(message, span)),
            None => Err(Error::UndefinedSymbol(
                call.name.name.to_string(),
                call.name.span,
            )),
        }
    }

    /// Evaluates an index against a collection of the given length; ranges
    /// expand to explicit positions with the usual inclusive-end defaults.
    fn eval_index(&mut self, p: PathId, item: &IndexItem, len: i64) -> Result<Index, Error> {
        match item {
            IndexItem::Expr(expr) => Ok(Index::At(self.eval_int(p, expr)?)),
            IndexItem::Range(range) => Ok(Index::Slice(self.slice_indices(p, range, len)?)),
        }
    }

    fn slice_indices(
        &mut self,
        p: PathId,
        range: &RangeDef,
        len: i64,
    ) -> Result<Vec<i64>, Error> {
        let step = match &range.step {
            None => 1,
            Some(expr) => {
                let step = self.eval_int(p, expr)?;
                if step == 0 {
                    return Err(Error::ZeroStepRange(range.span));
                }
                step
            }
        };
        let start = match &range.start {
            Some(expr) => self.eval_int(p, expr)?,
            None => {
                if step > 0 {
                    0
                } else {
                    len - 1
                }
            }
        };
        let end = match &range.end {
            Some(expr) => self.eval_int(p, expr)?,
            None => {
                if step > 0 {
                    len - 1
                } else {
                    0
                }
            }
        };
        let mut indices = Vec::new();
        let mut v = start;
        while (step > 0 && v <= end) || (step < 0 && v >= end) {
            indices.push(v);
            v += step;
        }
        Ok(indices)
    }

    fn resolve_type(&mut self, p: PathId, ty: &TypeDef) -> Result<Ty, Error> {
        match ty {
            TypeDef::Scalar(scalar) => self.resolve_scalar(p, scalar),
            TypeDef::Array(array) => {
                let base = self.resolve_scalar(p, &array.base)?;
                if matches!(base, Ty::Qubit | Ty::QubitArray(_)) {
                    return Err(Error::Type(
                        "classical array base type",
                        base.to_string(),
                        array.span,
                    ));
                }
                let mut dims = Vec::new();
                for dim in array.dims.iter() {
                    let value = self.eval_int(p, dim)?;
                    if value < 1 {
                        return Err(Error::InvalidArgument(
                            "array dimensions must be positive",
                            dim.span,
                        ));
                    }
                    dims.push(value as u32);
                }
                if dims.is_empty() {
                    return Err(Error::InvalidArgument(
                        "arrays must have at least one dimension",
                        array.span,
                    ));
                }
                Ok(Ty::Array(Box::new(base), dims))
            }
        }
    }

    fn resolve_scalar(&mut self, p: PathId, scalar: &ScalarType) -> Result<Ty, Error> {
        match &scalar.kind {
            ScalarTypeKind::Angle(size) => {
                if let Some(size) = size {
                    let _ = self.eval_width(p, size, "angle")?;
                }
                Ok(Ty::Angle)
            }
            ScalarTypeKind::Bit(None) => Ok(Ty::Bit),
            ScalarTypeKind::Bit(Some(size)) => {
                Ok(Ty::BitArray(self.eval_width(p, size, "bit")?))
            }
            ScalarTypeKind::Bool => Ok(Ty::Bool),
            ScalarTypeKind::Complex => Ok(Ty::Complex),
            ScalarTypeKind::Float(size) => {
                if let Some(size) = size {
                    let _ = self.eval_int(p, size)?;
                }
                Ok(Ty::Float)
            }
            ScalarTypeKind::Int(None) => Ok(Ty::Int {
                width: MAX_WIDTH,
                signed: true,
            }),
            ScalarTypeKind::Int(Some(size)) => Ok(Ty::Int {
                width: self.eval_width(p, size, "int")?,
                signed: true,
            }),
            ScalarTypeKind::Qubit(None) => Ok(Ty::Qubit),
            ScalarTypeKind::Qubit(Some(size)) => {
                Ok(Ty::QubitArray(self.eval_width(p, size, "qubit")?))
            }
            ScalarTypeKind::UInt(None) => Ok(Ty::Int {
                width: MAX_WIDTH,
                signed: false,
            }),
            ScalarTypeKind::UInt(Some(size)) => Ok(Ty::Int {
                width: self.eval_width(p, size, "uint")?,
                signed: false,
            }),
            ScalarTypeKind::Err => Err(Error::Unimplemented("invalid type", scalar.span)),
        }
    }

    fn eval_width(&mut self, p: PathId, expr: &Expr, kind: &'static str) -> Result<u32, Error> {
        let value = self.eval_int(p, expr)?;
        if value < 1 {
            return Err(Error::InvalidArgument("widths must be positive", expr.span));
        }
        if value > i64::from(MAX_WIDTH) {
            return Err(Error::TypeMaxWidthExceeded(kind, value as u32, expr.span));
        }
        Ok(value as u32)
    }

    /// Coerces a value into a declared type. Explicit casts additionally
    /// permit lossy conversions like float to int.
    #[allow(clippy::cast_possible_truncation)]
    fn cast_value(
        &self,
        ty: &Ty,
        value: Value,
        explicit: bool,
        span: Span,
    ) -> Result<Value, Error> {
        let from = value.type_name();
        let cannot = |ty: &Ty| Error::CannotCast(from.to_string(), ty.to_string(), span);
        match ty {
            Ty::Bool => value.as_bool().map(Value::Bool).ok_or_else(|| cannot(ty)),
            Ty::Bit => match value {
                Value::Bit(_) => Ok(value),
                Value::Bool(b) => Ok(Value::Bit(b)),
                Value::Int(i) => Ok(Value::Bit(i.value & 1 == 1)),
                Value::BitArray(b) if b.width == 1 => Ok(Value::Bit(b.bits & 1 == 1)),
                _ => Err(cannot(ty)),
            },
            Ty::BitArray(width) => match value {
                Value::BitArray(b) if b.width == *width => Ok(Value::BitArray(b)),
                Value::BitArray(b) if explicit => Ok(Value::BitArray(BitArray::new(*width, b.bits))),
                Value::BitArray(b) => Err(Error::WidthMismatch(b.width, *width, span)),
                Value::Int(i) => Ok(Value::BitArray(BitArray::new(*width, i.value as u64))),
                Value::Bit(b) if *width == 1 => {
                    Ok(Value::BitArray(BitArray::new(1, u64::from(b))))
                }
                _ => Err(cannot(ty)),
            },
            Ty::Int { width, signed } => match value {
                Value::Int(i) => Ok(Value::Int(IntValue::wrap(*width, *signed, i.value))),
                Value::Bit(b) | Value::Bool(b) => {
                    Ok(Value::Int(IntValue::wrap(*width, *signed, i64::from(b))))
                }
                Value::BitArray(b) => {
                    Ok(Value::Int(IntValue::wrap(*width, *signed, b.bits as i64)))
                }
                Value::Float(v) if explicit => {
                    Ok(Value::Int(IntValue::wrap(*width, *signed, v.trunc() as i64)))
                }
                _ => Err(cannot(ty)),
            },
            Ty::Float => match value {
                Value::Float(_) => Ok(value),
                Value::Angle(v) => Ok(Value::Float(v)),
                Value::Int(_) | Value::Bit(_) | Value::Bool(_) => Ok(Value::Float(
                    value.as_float().expect("integral values convert to float"),
                )),
                _ => Err(cannot(ty)),
            },
            Ty::Angle => match value {
                Value::Angle(_) => Ok(value),
                Value::Float(v) => Ok(Value::Angle(wrap_angle(v))),
                Value::Int(_) | Value::Bit(_) | Value::Bool(_) => Ok(Value::Angle(wrap_angle(
                    value.as_float().expect("integral values convert to float"),
                ))),
                _ => Err(cannot(ty)),
            },
            Ty::Complex => value
                .as_complex()
                .map(Value::Complex)
                .ok_or_else(|| cannot(ty)),
            Ty::Array(base, dims) => {
                let Value::Array(arr) = value else {
                    return Err(cannot(ty));
                };
                let Some((dim, rest)) = dims.split_first() else {
                    return Err(cannot(ty));
                };
                if arr.values.len() as u32 != *dim {
                    return Err(Error::WidthMismatch(arr.values.len() as u32, *dim, span));
                }
                let element_ty = if rest.is_empty() {
                    (**base).clone()
                } else {
                    Ty::Array(base.clone(), rest.to_vec())
                };
                let mut values = Vec::new();
                for element in arr.values {
                    values.push(self.cast_value(&element_ty, element, explicit, span)?);
                }
                Ok(Value::Array(ArrayValue { values }))
            }
            Ty::Qubit => match value {
                Value::Qubit(_) => Ok(value),
                _ => Err(cannot(ty)),
            },
            Ty::QubitArray(size) => match value {
                Value::QubitArray(qs) if qs.len() as u32 == *size => {
                    Ok(Value::QubitArray(qs))
                }
                _ => Err(cannot(ty)),
            },
        }
    }

    /// Stores a value into an assignable expression: a variable name or a
    /// single level of indexing into one.
    fn store_lvalue(&mut self, p: PathId, lhs: &Expr, value: Value) -> Result<(), Error> {
        match &*lhs.kind {
            ExprKind::Ident(ident) => self.store_named(p, &ident.name, None, value, lhs.span),
            ExprKind::Index(index_expr) => {
                let ExprKind::Ident(ident) = &*index_expr.collection.kind else {
                    return Err(Error::Unimplemented(
                        "assignment through a nested index",
                        lhs.span,
                    ));
                };
                let resolved = self.path(p).env.resolve(&ident.name).ok_or_else(|| {
                    Error::UndefinedSymbol(ident.name.to_string(), ident.span)
                })?;
                let len = match &resolved.selection {
                    Some(selection) => selection.len() as i64,
                    None => collection_len(&self.path(p).env.var(resolved.slot).value),
                };
                let index = self.eval_index(p, &index_expr.index, len)?;
                self.store_named(p, &ident.name, Some(index), value, lhs.span)
            }
            _ => Err(Error::Type(
                "assignable expression",
                "expression".to_string(),
                lhs.span,
            )),
        }
    }

    fn store_named(
        &mut self,
        p: PathId,
        name: &Rc<str>,
        index: Option<Index>,
        value: Value,
        span: Span,
    ) -> Result<(), Error> {
        let resolved = self
            .path(p)
            .env
            .resolve(name)
            .ok_or_else(|| Error::UndefinedSymbol(name.to_string(), span))?;
        if self.path(p).env.var(resolved.slot).mutability == Mutability::Const {
            return Err(Error::CannotUpdateConstVariable(name.to_string(), span));
        }

        // Compose an alias selection with the assignment's own index.
        let effective = match (&resolved.selection, index) {
            (None, index) => index,
            (Some(selection), None) => Some(Index::Slice(selection.to_vec())),
            (Some(selection), Some(Index::At(i))) => {
                let i = usize::try_from(i)
                    .ok()
                    .filter(|i| *i < selection.len())
                    .ok_or(Error::IndexOutOfBounds(i, span))?;
                Some(Index::At(selection[i]))
            }
            (Some(selection), Some(Index::Slice(indices))) => {
                let mut composed = Vec::new();
                for i in indices {
                    let i = usize::try_from(i)
                        .ok()
                        .filter(|i| *i < selection.len())
                        .ok_or(Error::IndexOutOfBounds(i, span))?;
                    composed.push(selection[i]);
                }
                Some(Index::Slice(composed))
            }
        };

        let slot = resolved.slot;
        match effective {
            None => {
                let ty = self.path(p).env.var(slot).ty.clone();
                if matches!(ty, Ty::Qubit | Ty::QubitArray(_)) {
                    return Err(Error::Type("classical variable", "qubit".to_string(), span));
                }
                let coerced = self.cast_value(&ty, value, false, span)?;
                self.path_mut(p).env.var_mut(slot).value = coerced;
                Ok(())
            }
            Some(Index::At(i)) => {
                let var = self.path(p).env.var(slot);
                let len = collection_len(&var.value);
                if i < 0 || i >= len {
                    return Err(Error::IndexOutOfBounds(i, span));
                }
                match &var.value {
                    Value::BitArray(_) => {
                        let bit = self.cast_value(&Ty::Bit, value, false, span)?.unwrap_bit();
                        let Value::BitArray(bits) = &mut self.path_mut(p).env.var_mut(slot).value
                        else {
                            unreachable!("value kind was checked");
                        };
                        bits.set(i as u32, bit);
                        Ok(())
                    }
                    Value::Array(_) => {
                        let element_ty = match &var.ty {
                            Ty::Array(base, dims) if dims.len() > 1 => {
                                Ty::Array(base.clone(), dims[1..].to_vec())
                            }
                            Ty::Array(base, _) => (**base).clone(),
                            _ => {
                                return Err(Error::Type(
                                    "array",
                                    var.value.type_name().to_string(),
                                    span,
                                ))
                            }
                        };
                        let coerced = self.cast_value(&element_ty, value, false, span)?;
                        let Value::Array(arr) = &mut self.path_mut(p).env.var_mut(slot).value
                        else {
                            unreachable!("value kind was checked");
                        };
                        arr.values[i as usize] = coerced;
                        Ok(())
                    }
                    _ => Err(Error::Type(
                        "indexable value",
                        var.value.type_name().to_string(),
                        span,
                    )),
                }
            }
            Some(Index::Slice(indices)) => {
                let var = self.path(p).env.var(slot);
                let len = collection_len(&var.value);
                for &i in &indices {
                    if i < 0 || i >= len {
                        return Err(Error::IndexOutOfBounds(i, span));
                    }
                }
                match &var.value {
                    Value::BitArray(_) => {
                        let source = self
                            .cast_value(&Ty::BitArray(indices.len() as u32), value, false, span)?
                            .unwrap_bit_array();
                        let Value::BitArray(bits) = &mut self.path_mut(p).env.var_mut(slot).value
                        else {
                            unreachable!("value kind was checked");
                        };
                        for (j, &i) in indices.iter().enumerate() {
                            bits.set(i as u32, source.get(j as u32));
                        }
                        Ok(())
                    }
                    Value::Array(_) => {
                        let source = match value {
                            Value::Array(source) => source,
                            other => {
                                return Err(Error::Type(
                                    "array",
                                    other.type_name().to_string(),
                                    span,
                                ))
                            }
                        };
                        if source.values.len() != indices.len() {
                            return Err(Error::WidthMismatch(
                                source.values.len() as u32,
                                indices.len() as u32,
                                span,
                            ));
                        }
                        let Value::Array(arr) = &mut self.path_mut(p).env.var_mut(slot).value
                        else {
                            unreachable!("value kind was checked");
                        };
                        for (element, &i) in source.values.into_iter().zip(&indices) {
                            arr.values[i as usize] = element;
                        }
                        Ok(())
                    }
                    _ => Err(Error::Type(
                        "indexable value",
                        var.value.type_name().to_string(),
                        span,
                    )),
                }
            }
        }
    }
}

/// Folds a modifier stack into an inlined gate body. Modifiers are ordered
/// outermost first and fold innermost first: `inv` reverses the sequence and
/// marks every instruction, integral powers repeat the sequence, and controls
/// prepend their qubits to every instruction's targets.
fn fold_modifiers(
    instructions: Vec<GateInstruction>,
    modifiers: &[GateModifier],
    controls: &[usize],
    span: Span,
) -> Result<Vec<GateInstruction>, Error> {
    let mut slices = Vec::new();
    let mut offset = 0;
    for modifier in modifiers {
        let count = match modifier {
            GateModifier::Ctrl(count) | GateModifier::NegCtrl(count) => *count,
            _ => 0,
        };
        slices.push(&controls[offset..offset + count]);
        offset += count;
    }

    let mut seq = instructions;
    for (modifier, ctrls) in modifiers.iter().zip(slices).rev() {
        match modifier {
            GateModifier::Inv => {
                seq.reverse();
                for instruction in &mut seq {
                    instruction.modifiers.insert(0, GateModifier::Inv);
                }
            }
            GateModifier::Pow(exponent) => {
                let rounded = exponent.round();
                if (exponent - rounded).abs() < 1e-9 {
                    #[allow(clippy::cast_possible_truncation)]
                    let mut count = rounded as i64;
                    let base = if count < 0 {
                        count = -count;
                        let mut inverse = seq.clone();
                        inverse.reverse();
                        for instruction in &mut inverse {
                            instruction.modifiers.insert(0, GateModifier::Inv);
                        }
                        inverse
                    } else {
                        seq.clone()
                    };
                    let mut repeated = Vec::new();
                    for _ in 0..count {
                        repeated.extend(base.iter().cloned());
                    }
                    seq = repeated;
                } else if seq.len() == 1 {
                    seq[0].modifiers.insert(0, GateModifier::Pow(*exponent));
                } else {
                    return Err(Error::Unimplemented(
                        "non-integral power of a multi-instruction gate",
                        span,
                    ));
                }
            }
            GateModifier::Ctrl(_) | GateModifier::NegCtrl(_) => {
                for instruction in &mut seq {
                    instruction.modifiers.insert(0, *modifier);
                    let mut targets = ctrls.to_vec();
                    targets.extend(instruction.targets.iter().copied());
                    instruction.targets = targets;
                }
            }
        }
    }
    Ok(seq)
}

fn lit_value(lit: &Lit) -> Result<Value, Error> {
    match &lit.kind {
        LiteralKind::Int(value) => Ok(Value::Int(IntValue {
            width: MAX_WIDTH,
            signed: true,
            value: *value,
        })),
        LiteralKind::BigInt(_) => Err(Error::Unimplemented(
            "integer literals wider than 64 bits",
            lit.span,
        )),
        LiteralKind::Float(value) => Ok(Value::Float(*value)),
        LiteralKind::Imaginary(value) => Ok(Value::Complex(num_complex::Complex64::new(
            0.0, *value,
        ))),
        LiteralKind::Bool(value) => Ok(Value::Bool(*value)),
        LiteralKind::Bitstring(value, width) => {
            if *width > MAX_WIDTH as usize {
                return Err(Error::TypeMaxWidthExceeded("bit", *width as u32, lit.span));
            }
            let bits = value
                .to_u64()
                .ok_or(Error::Unimplemented("bitstring literal", lit.span))?;
            Ok(Value::BitArray(BitArray::new(*width as u32, bits)))
        }
        LiteralKind::String(value) => Ok(Value::String(value.clone())),
    }
}

fn eval_unary(op: UnaryOp, value: Value, span: Span) -> Result<Value, Error> {
    match op {
        UnaryOp::Neg => match value {
            Value::Int(i) => Ok(Value::Int(IntValue::wrap(
                i.width,
                i.signed,
                i.value.wrapping_neg(),
            ))),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Angle(v) => Ok(Value::Angle(wrap_angle(-v))),
            Value::Complex(c) => Ok(Value::Complex(-c)),
            _ => Err(Error::Type(
                "numeric value",
                value.type_name().to_string(),
                span,
            )),
        },
        UnaryOp::NotL => value
            .as_bool()
            .map(|b| Value::Bool(!b))
            .ok_or_else(|| Error::Type("bool", value.type_name().to_string(), span)),
        UnaryOp::NotB => match value {
            Value::Int(i) => Ok(Value::Int(IntValue::wrap(i.width, i.signed, !i.value))),
            Value::BitArray(b) => Ok(Value::BitArray(BitArray::new(
                b.width,
                !b.bits & BitArray::mask(b.width),
            ))),
            Value::Bit(b) => Ok(Value::Bit(!b)),
            _ => Err(Error::Type(
                "integer or bit register",
                value.type_name().to_string(),
                span,
            )),
        },
    }
}

/// One integer operand of an arithmetic or bitwise operation: its value and
/// the width and signedness it contributes to the result.
fn int_operand(value: &Value) -> Option<(i64, u32, bool)> {
    match value {
        Value::Int(i) => Some((i.value, i.width, i.signed)),
        Value::Bit(b) | Value::Bool(b) => Some((i64::from(*b), 1, false)),
        _ => None,
    }
}

#[allow(clippy::too_many_lines)]
fn eval_binary(op: BinOp, lhs: Value, rhs: Value, span: Span) -> Result<Value, Error> {
    let type_error = |op: &'static str, lhs: &Value, rhs: &Value| {
        Error::CannotApplyOperatorToTypes(
            op,
            lhs.type_name().to_string(),
            rhs.type_name().to_string(),
            span,
        )
    };
    match op {
        BinOp::AndL | BinOp::OrL => {
            let (Some(l), Some(r)) = (lhs.as_bool(), rhs.as_bool()) else {
                return Err(type_error(if op == BinOp::AndL { "&&" } else { "||" }, &lhs, &rhs));
            };
            Ok(Value::Bool(if op == BinOp::AndL {
                l && r
            } else {
                l || r
            }))
        }
        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => {
            eval_comparison(op, &lhs, &rhs, span)
        }
        BinOp::AndB | BinOp::OrB | BinOp::XorB => eval_bitwise(op, &lhs, &rhs, span),
        BinOp::Shl | BinOp::Shr => eval_shift(op, &lhs, &rhs, span),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Exp => {
            eval_arith(op, lhs, rhs, span)
        }
    }
}

fn eval_comparison(op: BinOp, lhs: &Value, rhs: &Value, span: Span) -> Result<Value, Error> {
    let type_error = || {
        Error::CannotApplyOperatorToTypes(
            comparison_name(op),
            lhs.type_name().to_string(),
            rhs.type_name().to_string(),
            span,
        )
    };

    // Complex and string values support only equality.
    if matches!(lhs, Value::Complex(_)) || matches!(rhs, Value::Complex(_)) {
        let (Some(l), Some(r)) = (lhs.as_complex(), rhs.as_complex()) else {
            return Err(type_error());
        };
        return match op {
            BinOp::Eq => Ok(Value::Bool(l == r)),
            BinOp::Neq => Ok(Value::Bool(l != r)),
            _ => Err(type_error()),
        };
    }
    if let (Value::String(l), Value::String(r)) = (lhs, rhs) {
        return match op {
            BinOp::Eq => Ok(Value::Bool(l == r)),
            BinOp::Neq => Ok(Value::Bool(l != r)),
            _ => Err(type_error()),
        };
    }
    if let (Value::BitArray(l), Value::BitArray(r)) = (lhs, rhs) {
        if l.width != r.width {
            return Err(Error::WidthMismatch(l.width, r.width, span));
        }
        return Ok(Value::Bool(compare(op, l.bits.cmp(&r.bits))));
    }

    // Angles compare modulo 2π.
    if matches!(lhs, Value::Angle(_)) || matches!(rhs, Value::Angle(_)) {
        let (Some(l), Some(r)) = (lhs.as_float(), rhs.as_float()) else {
            return Err(type_error());
        };
        let (l, r) = (wrap_angle(l), wrap_angle(r));
        return Ok(Value::Bool(compare(
            op,
            l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal),
        )));
    }
    if matches!(lhs, Value::Float(_)) || matches!(rhs, Value::Float(_)) {
        let (Some(l), Some(r)) = (lhs.as_float(), rhs.as_float()) else {
            return Err(type_error());
        };
        return Ok(Value::Bool(compare(
            op,
            l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Greater),
        )));
    }
    if let (Some(l), Some(r)) = (lhs.as_int(), rhs.as_int()) {
        return Ok(Value::Bool(compare(op, l.cmp(&r))));
    }
    Err(type_error())
}

fn comparison_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "==",
        BinOp::Neq => "!=",
        BinOp::Lt => "<",
        BinOp::Lte => "<=",
        BinOp::Gt => ">",
        BinOp::Gte => ">=",
        _ => "comparison",
    }
}

fn compare(op: BinOp, ordering: std::cmp::Ordering) -> bool {
    match op {
        BinOp::Eq => ordering.is_eq(),
        BinOp::Neq => !ordering.is_eq(),
        BinOp::Lt => ordering.is_lt(),
        BinOp::Lte => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Gte => ordering.is_ge(),
        _ => unreachable!("operator should be a comparison"),
    }
}

fn eval_bitwise(op: BinOp, lhs: &Value, rhs: &Value, span: Span) -> Result<Value, Error> {
    let name = match op {
        BinOp::AndB => "&",
        BinOp::OrB => "|",
        _ => "^",
    };
    let apply = |a: u64, b: u64| match op {
        BinOp::AndB => a & b,
        BinOp::OrB => a | b,
        _ => a ^ b,
    };
    match (lhs, rhs) {
        (Value::BitArray(l), Value::BitArray(r)) => {
            if l.width != r.width {
                return Err(Error::WidthMismatch(l.width, r.width, span));
            }
            Ok(Value::BitArray(BitArray::new(l.width, apply(l.bits, r.bits))))
        }
        (Value::Bit(l), Value::Bit(r)) => {
            Ok(Value::Bit(apply(u64::from(*l), u64::from(*r)) == 1))
        }
        _ => {
            let (Some((l, lw, ls)), Some((r, rw, rs))) = (int_operand(lhs), int_operand(rhs))
            else {
                return Err(Error::CannotApplyOperatorToTypes(
                    name,
                    lhs.type_name().to_string(),
                    rhs.type_name().to_string(),
                    span,
                ));
            };
            #[allow(clippy::cast_possible_wrap)]
            let value = apply(l as u64, r as u64) as i64;
            Ok(Value::Int(IntValue::wrap(lw.max(rw), ls || rs, value)))
        }
    }
}

fn eval_shift(op: BinOp, lhs: &Value, rhs: &Value, span: Span) -> Result<Value, Error> {
    let amount = rhs.as_int().ok_or_else(|| {
        Error::Type("integer shift amount", rhs.type_name().to_string(), span)
    })?;
    if amount < 0 {
        return Err(Error::InvalidArgument("negative shift amount", span));
    }
    let amount = amount.min(i64::from(u32::MAX)) as u32;
    match lhs {
        Value::BitArray(bits) => {
            let shifted = if amount >= MAX_WIDTH {
                0
            } else if op == BinOp::Shl {
                bits.bits << amount
            } else {
                bits.bits >> amount
            };
            Ok(Value::BitArray(BitArray::new(bits.width, shifted)))
        }
        Value::Int(i) => {
            let value = if amount >= MAX_WIDTH {
                if op == BinOp::Shr && i.signed && i.value < 0 {
                    -1
                } else {
                    0
                }
            } else if op == BinOp::Shl {
                i.value.wrapping_shl(amount)
            } else if i.signed {
                i.value.wrapping_shr(amount)
            } else {
                #[allow(clippy::cast_possible_wrap)]
                let shifted = ((i.value as u64) >> amount) as i64;
                shifted
            };
            Ok(Value::Int(IntValue::wrap(i.width, i.signed, value)))
        }
        _ => Err(Error::CannotApplyOperatorToTypes(
            if op == BinOp::Shl { "<<" } else { ">>" },
            lhs.type_name().to_string(),
            rhs.type_name().to_string(),
            span,
        )),
    }
}

#[allow(clippy::cast_precision_loss)]
fn eval_arith(op: BinOp, lhs: Value, rhs: Value, span: Span) -> Result<Value, Error> {
    let name = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        _ => "**",
    };
    let type_error = || {
        Error::CannotApplyOperatorToTypes(
            name,
            lhs.type_name().to_string(),
            rhs.type_name().to_string(),
            span,
        )
    };

    if matches!(lhs, Value::Complex(_)) || matches!(rhs, Value::Complex(_)) {
        let (Some(l), Some(r)) = (lhs.as_complex(), rhs.as_complex()) else {
            return Err(type_error());
        };
        return Ok(Value::Complex(match op {
            BinOp::Add => l + r,
            BinOp::Sub => l - r,
            BinOp::Mul => l * r,
            BinOp::Div => l / r,
            BinOp::Exp => l.powc(r),
            _ => return Err(type_error()),
        }));
    }

    // Angle arithmetic wraps modulo 2π; a ratio of two angles is a plain
    // float.
    if matches!(lhs, Value::Angle(_)) || matches!(rhs, Value::Angle(_)) {
        let (Some(l), Some(r)) = (lhs.as_float(), rhs.as_float()) else {
            return Err(type_error());
        };
        return match op {
            BinOp::Add => Ok(Value::Angle(wrap_angle(l + r))),
            BinOp::Sub => Ok(Value::Angle(wrap_angle(l - r))),
            BinOp::Mul => Ok(Value::Angle(wrap_angle(l * r))),
            BinOp::Div if matches!(lhs, Value::Angle(_)) && matches!(rhs, Value::Angle(_)) => {
                Ok(Value::Float(l / r))
            }
            BinOp::Div => Ok(Value::Angle(wrap_angle(l / r))),
            BinOp::Mod => Ok(Value::Angle(wrap_angle(l % r))),
            BinOp::Exp => Err(type_error()),
            _ => Err(type_error()),
        };
    }

    if matches!(lhs, Value::Float(_)) || matches!(rhs, Value::Float(_)) {
        let (Some(l), Some(r)) = (lhs.as_float(), rhs.as_float()) else {
            return Err(type_error());
        };
        return Ok(Value::Float(match op {
            BinOp::Add => l + r,
            BinOp::Sub => l - r,
            BinOp::Mul => l * r,
            BinOp::Div => l / r,
            BinOp::Mod => l % r,
            _ => l.powf(r),
        }));
    }

    let (Some((l, lw, ls)), Some((r, rw, rs))) = (int_operand(&lhs), int_operand(&rhs)) else {
        return Err(type_error());
    };
    let width = lw.max(rw);
    let signed = ls || rs;
    match op {
        // Division of two integers yields a float.
        BinOp::Div => {
            if r == 0 {
                return Err(Error::DivisionByZero(span));
            }
            Ok(Value::Float(l as f64 / r as f64))
        }
        BinOp::Mod => {
            if r == 0 {
                return Err(Error::DivisionByZero(span));
            }
            Ok(Value::Int(IntValue::wrap(width, signed, l.wrapping_rem(r))))
        }
        BinOp::Add => Ok(Value::Int(IntValue::wrap(width, signed, l.wrapping_add(r)))),
        BinOp::Sub => Ok(Value::Int(IntValue::wrap(width, signed, l.wrapping_sub(r)))),
        BinOp::Mul => Ok(Value::Int(IntValue::wrap(width, signed, l.wrapping_mul(r)))),
        BinOp::Exp => {
            if r < 0 {
                Ok(Value::Float((l as f64).powf(r as f64)))
            } else {
                let exponent = u32::try_from(r).unwrap_or(u32::MAX);
                Ok(Value::Int(IntValue::wrap(
                    width,
                    signed,
                    l.wrapping_pow(exponent),
                )))
            }
        }
        _ => Err(type_error()),
    }
}
