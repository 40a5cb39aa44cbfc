// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The abstract program tree the interpreter walks. Nodes are deliberately
//! explicit about declared types so evaluation never has to reparse, and
//! every node carries the source span it came from for diagnostics.

use crate::display_utils::{
    write_field, write_list_field, write_opt_field, writeln_field, writeln_header,
    writeln_list_field, writeln_opt_field,
};
use num_bigint::BigInt;
use qbr_data_structures::span::{Span, WithSpan};
use std::{
    fmt::{self, Display, Formatter},
    rc::Rc,
};

/// An alternative to `Vec<T>` that uses less stack space.
pub type List<T> = Box<[Box<T>]>;

pub(crate) fn list_from_iter<T>(vals: impl IntoIterator<Item = T>) -> List<T> {
    vals.into_iter().map(Box::new).collect()
}

#[derive(Clone, Debug)]
pub struct Program {
    pub span: Span,
    pub version: Option<Version>,
    pub statements: List<Stmt>,
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "Program", self.span)?;
        writeln_opt_field(f, "version", self.version.as_ref())?;
        write_list_field(f, "statements", &self.statements)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Version {
    pub major: u32,
    pub minor: Option<u32>,
    pub span: Span,
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{}", self.major, minor),
            None => write!(f, "{}", self.major),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub span: Span,
    pub kind: Box<StmtKind>,
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "Stmt", self.span)?;
        write_field(f, "kind", &self.kind)
    }
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Alias(AliasDeclStmt),
    Assign(AssignStmt),
    AssignOp(AssignOpStmt),
    Block(Block),
    Break,
    ClassicalDecl(ClassicalDeclStmt),
    ConstDecl(ConstDeclStmt),
    Continue,
    Def(DefStmt),
    Expr(Expr),
    For(ForStmt),
    GateCall(GateCallStmt),
    GateDef(GateDefStmt),
    If(IfStmt),
    Include(IncludeStmt),
    IODecl(IODeclStmt),
    Measure(MeasureStmt),
    QubitDecl(QubitDeclStmt),
    Reset(ResetStmt),
    Return(ReturnStmt),
    Switch(SwitchStmt),
    While(WhileStmt),
    Err,
}

impl Display for StmtKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StmtKind::Alias(alias) => alias.fmt(f),
            StmtKind::Assign(assign) => assign.fmt(f),
            StmtKind::AssignOp(assign_op) => assign_op.fmt(f),
            StmtKind::Block(block) => block.fmt(f),
            StmtKind::Break => write!(f, "BreakStmt"),
            StmtKind::ClassicalDecl(decl) => decl.fmt(f),
            StmtKind::ConstDecl(decl) => decl.fmt(f),
            StmtKind::Continue => write!(f, "ContinueStmt"),
            StmtKind::Def(def) => def.fmt(f),
            StmtKind::Expr(expr) => {
                write!(f, "ExprStmt: ")?;
                expr.fmt(f)
            }
            StmtKind::For(for_stmt) => for_stmt.fmt(f),
            StmtKind::GateCall(gate_call) => gate_call.fmt(f),
            StmtKind::GateDef(gate_def) => gate_def.fmt(f),
            StmtKind::If(if_stmt) => if_stmt.fmt(f),
            StmtKind::Include(include) => include.fmt(f),
            StmtKind::IODecl(io_decl) => io_decl.fmt(f),
            StmtKind::Measure(measure) => measure.fmt(f),
            StmtKind::QubitDecl(decl) => decl.fmt(f),
            StmtKind::Reset(reset) => reset.fmt(f),
            StmtKind::Return(ret) => ret.fmt(f),
            StmtKind::Switch(switch) => switch.fmt(f),
            StmtKind::While(while_stmt) => while_stmt.fmt(f),
            StmtKind::Err => write!(f, "Err"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ident {
    pub span: Span,
    pub name: Rc<str>,
}

impl Default for Ident {
    fn default() -> Self {
        Self {
            span: Span::default(),
            name: "".into(),
        }
    }
}

impl WithSpan for Ident {
    fn with_span(self, span: Span) -> Self {
        Self { span, ..self }
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Ident {} \"{}\"", self.span, self.name)
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub span: Span,
    pub stmts: List<Stmt>,
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.stmts.is_empty() {
            write!(f, "Block {}: <empty>", self.span)
        } else {
            writeln_header(f, "Block", self.span)?;
            write_list_field(f, "stmts", &self.stmts)
        }
    }
}

/// A qubit-valued operand of a gate application, measurement, or reset: a
/// declared qubit or register name with an optional index or slice.
#[derive(Clone, Debug)]
pub struct GateOperand {
    pub span: Span,
    pub name: Ident,
    pub index: Option<IndexItem>,
}

impl Default for GateOperand {
    fn default() -> Self {
        Self {
            span: Span::default(),
            name: Ident::default(),
            index: None,
        }
    }
}

impl WithSpan for GateOperand {
    fn with_span(self, span: Span) -> Self {
        Self { span, ..self }
    }
}

impl Display for GateOperand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "GateOperand", self.span)?;
        writeln_field(f, "name", &self.name)?;
        write_opt_field(f, "index", self.index.as_ref())
    }
}

/// A single index: either an expression or a range slice.
#[derive(Clone, Debug)]
pub enum IndexItem {
    Expr(Expr),
    Range(RangeDef),
}

impl Display for IndexItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IndexItem::Expr(expr) => expr.fmt(f),
            IndexItem::Range(range) => range.fmt(f),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RangeDef {
    pub span: Span,
    pub start: Option<Expr>,
    pub step: Option<Expr>,
    pub end: Option<Expr>,
}

impl Display for RangeDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "Range", self.span)?;
        writeln_opt_field(f, "start", self.start.as_ref())?;
        writeln_opt_field(f, "step", self.step.as_ref())?;
        write_opt_field(f, "end", self.end.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct AliasDeclStmt {
    pub name: Ident,
    pub target: Expr,
}

impl Display for AliasDeclStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "AliasDeclStmt:")?;
        writeln_field(f, "name", &self.name)?;
        write_field(f, "target", &self.target)
    }
}

#[derive(Clone, Debug)]
pub struct AssignStmt {
    pub lhs: Expr,
    pub rhs: ValueExpr,
}

impl Display for AssignStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "AssignStmt:")?;
        writeln_field(f, "lhs", &self.lhs)?;
        write_field(f, "rhs", &self.rhs)
    }
}

#[derive(Clone, Debug)]
pub struct AssignOpStmt {
    pub op: BinOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Display for AssignOpStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "AssignOpStmt:")?;
        writeln_field(f, "op", &self.op)?;
        writeln_field(f, "lhs", &self.lhs)?;
        write_field(f, "rhs", &self.rhs)
    }
}

/// The right-hand side of an assignment or initializer, which may be a
/// measurement rather than a classical expression.
#[derive(Clone, Debug)]
pub enum ValueExpr {
    Expr(Expr),
    Measurement(MeasureExpr),
}

impl Display for ValueExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Expr(expr) => expr.fmt(f),
            ValueExpr::Measurement(measure) => measure.fmt(f),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MeasureExpr {
    pub span: Span,
    pub operand: GateOperand,
}

impl Display for MeasureExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "MeasureExpr", self.span)?;
        write_field(f, "operand", &self.operand)
    }
}

#[derive(Clone, Debug)]
pub struct ClassicalDeclStmt {
    pub ty: TypeDef,
    pub name: Ident,
    pub init: Option<ValueExpr>,
}

impl Display for ClassicalDeclStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "ClassicalDeclStmt:")?;
        writeln_field(f, "type", &self.ty)?;
        writeln_field(f, "name", &self.name)?;
        write_opt_field(f, "init", self.init.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct ConstDeclStmt {
    pub ty: TypeDef,
    pub name: Ident,
    pub init: Expr,
}

impl Display for ConstDeclStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "ConstDeclStmt:")?;
        writeln_field(f, "type", &self.ty)?;
        writeln_field(f, "name", &self.name)?;
        write_field(f, "init", &self.init)
    }
}

#[derive(Clone, Debug)]
pub struct QubitDeclStmt {
    pub name: Ident,
    pub size: Option<Expr>,
}

impl Display for QubitDeclStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "QubitDeclStmt:")?;
        writeln_field(f, "name", &self.name)?;
        write_opt_field(f, "size", self.size.as_ref())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IoKeyword {
    Input,
    Output,
}

impl Display for IoKeyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IoKeyword::Input => write!(f, "input"),
            IoKeyword::Output => write!(f, "output"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IODeclStmt {
    pub io: IoKeyword,
    pub ty: TypeDef,
    pub name: Ident,
}

impl Display for IODeclStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "IODeclStmt:")?;
        writeln_field(f, "io", &self.io)?;
        writeln_field(f, "type", &self.ty)?;
        write_field(f, "name", &self.name)
    }
}

#[derive(Clone, Debug)]
pub struct IncludeStmt {
    pub span: Span,
    pub path: Rc<str>,
}

impl Display for IncludeStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "IncludeStmt {}: \"{}\"", self.span, self.path)
    }
}

#[derive(Clone, Debug)]
pub struct GateCallStmt {
    pub modifiers: List<GateModifier>,
    pub name: Ident,
    pub params: List<Expr>,
    pub operands: List<GateOperand>,
}

impl Display for GateCallStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "GateCall:")?;
        writeln_list_field(f, "modifiers", &self.modifiers)?;
        writeln_field(f, "name", &self.name)?;
        writeln_list_field(f, "params", &self.params)?;
        write_list_field(f, "operands", &self.operands)
    }
}

#[derive(Clone, Debug)]
pub struct GateModifier {
    pub span: Span,
    pub kind: GateModifierKind,
}

impl Display for GateModifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            GateModifierKind::Ctrl(None) => write!(f, "Ctrl {}", self.span),
            GateModifierKind::Ctrl(Some(count)) => {
                writeln_header(f, "Ctrl", self.span)?;
                write_field(f, "count", count)
            }
            GateModifierKind::NegCtrl(None) => write!(f, "NegCtrl {}", self.span),
            GateModifierKind::NegCtrl(Some(count)) => {
                writeln_header(f, "NegCtrl", self.span)?;
                write_field(f, "count", count)
            }
            GateModifierKind::Inv => write!(f, "Inv {}", self.span),
            GateModifierKind::Pow(exponent) => {
                writeln_header(f, "Pow", self.span)?;
                write_field(f, "exponent", exponent)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum GateModifierKind {
    Ctrl(Option<Expr>),
    NegCtrl(Option<Expr>),
    Inv,
    Pow(Expr),
}

#[derive(Clone, Debug)]
pub struct GateDefStmt {
    pub name: Ident,
    pub params: List<Ident>,
    pub qubits: List<Ident>,
    pub body: Block,
}

impl Display for GateDefStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "GateDef:")?;
        writeln_field(f, "name", &self.name)?;
        writeln_list_field(f, "params", &self.params)?;
        writeln_list_field(f, "qubits", &self.qubits)?;
        write_field(f, "body", &self.body)
    }
}

#[derive(Clone, Debug)]
pub struct DefStmt {
    pub name: Ident,
    pub params: List<TypedParameter>,
    pub return_ty: Option<ScalarType>,
    pub body: Block,
}

impl Display for DefStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "DefStmt:")?;
        writeln_field(f, "name", &self.name)?;
        writeln_list_field(f, "params", &self.params)?;
        writeln_opt_field(f, "return_type", self.return_ty.as_ref())?;
        write_field(f, "body", &self.body)
    }
}

#[derive(Clone, Debug)]
pub struct TypedParameter {
    pub span: Span,
    pub ty: TypeDef,
    pub name: Ident,
}

impl Default for TypedParameter {
    fn default() -> Self {
        Self {
            span: Span::default(),
            ty: TypeDef::Scalar(ScalarType {
                span: Span::default(),
                kind: ScalarTypeKind::Err,
            }),
            name: Ident::default(),
        }
    }
}

impl WithSpan for TypedParameter {
    fn with_span(self, span: Span) -> Self {
        Self { span, ..self }
    }
}

impl Display for TypedParameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "TypedParameter", self.span)?;
        writeln_field(f, "type", &self.ty)?;
        write_field(f, "name", &self.name)
    }
}

#[derive(Clone, Debug)]
pub struct ReturnStmt {
    pub value: Option<ValueExpr>,
}

impl Display for ReturnStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "ReturnStmt:")?;
        write_opt_field(f, "value", self.value.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct MeasureStmt {
    pub measurement: MeasureExpr,
    pub target: Option<Expr>,
}

impl Display for MeasureStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "MeasureStmt:")?;
        writeln_field(f, "measurement", &self.measurement)?;
        write_opt_field(f, "target", self.target.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct ResetStmt {
    pub operand: GateOperand,
}

impl Display for ResetStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "ResetStmt:")?;
        write_field(f, "operand", &self.operand)
    }
}

#[derive(Clone, Debug)]
pub struct IfStmt {
    pub condition: Expr,
    pub if_body: Stmt,
    pub else_body: Option<Stmt>,
}

impl Display for IfStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "IfStmt:")?;
        writeln_field(f, "condition", &self.condition)?;
        writeln_field(f, "if_body", &self.if_body)?;
        write_opt_field(f, "else_body", self.else_body.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Stmt,
}

impl Display for WhileStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "WhileStmt:")?;
        writeln_field(f, "condition", &self.condition)?;
        write_field(f, "body", &self.body)
    }
}

#[derive(Clone, Debug)]
pub struct ForStmt {
    pub ty: ScalarType,
    pub ident: Ident,
    pub iterable: EnumerableSet,
    pub body: Stmt,
}

impl Display for ForStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "ForStmt:")?;
        writeln_field(f, "variable_type", &self.ty)?;
        writeln_field(f, "variable_name", &self.ident)?;
        writeln_field(f, "iterable", &self.iterable)?;
        write_field(f, "body", &self.body)
    }
}

/// The collection a `for` loop walks: a range or a discrete set.
#[derive(Clone, Debug)]
pub enum EnumerableSet {
    Range(RangeDef),
    Set(DiscreteSet),
}

impl Display for EnumerableSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EnumerableSet::Range(range) => range.fmt(f),
            EnumerableSet::Set(set) => set.fmt(f),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DiscreteSet {
    pub span: Span,
    pub values: List<Expr>,
}

impl Display for DiscreteSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "DiscreteSet", self.span)?;
        write_list_field(f, "values", &self.values)
    }
}

#[derive(Clone, Debug)]
pub struct SwitchStmt {
    pub selector: Expr,
    pub cases: List<SwitchCase>,
    pub default: Option<Block>,
}

impl Display for SwitchStmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "SwitchStmt:")?;
        writeln_field(f, "selector", &self.selector)?;
        writeln_list_field(f, "cases", &self.cases)?;
        write_opt_field(f, "default", self.default.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub span: Span,
    pub labels: List<Expr>,
    pub body: Block,
}

impl Display for SwitchCase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "SwitchCase", self.span)?;
        writeln_list_field(f, "labels", &self.labels)?;
        write_field(f, "body", &self.body)
    }
}

#[derive(Clone, Debug)]
pub enum TypeDef {
    Scalar(ScalarType),
    Array(ArrayType),
}

impl TypeDef {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            TypeDef::Scalar(ty) => ty.span,
            TypeDef::Array(ty) => ty.span,
        }
    }
}

impl Display for TypeDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeDef::Scalar(ty) => ty.fmt(f),
            TypeDef::Array(ty) => ty.fmt(f),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScalarType {
    pub span: Span,
    pub kind: ScalarTypeKind,
}

impl Display for ScalarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (name, size) = match &self.kind {
            ScalarTypeKind::Angle(size) => ("AngleType", size.as_ref()),
            ScalarTypeKind::Bit(size) => ("BitType", size.as_ref()),
            ScalarTypeKind::Bool => ("BoolType", None),
            ScalarTypeKind::Complex => ("ComplexType", None),
            ScalarTypeKind::Float(size) => ("FloatType", size.as_ref()),
            ScalarTypeKind::Int(size) => ("IntType", size.as_ref()),
            ScalarTypeKind::Qubit(size) => ("QubitType", size.as_ref()),
            ScalarTypeKind::UInt(size) => ("UIntType", size.as_ref()),
            ScalarTypeKind::Err => ("Err", None),
        };
        match (&self.kind, size) {
            (ScalarTypeKind::Bool | ScalarTypeKind::Complex | ScalarTypeKind::Err, _) => {
                write!(f, "{name} {}", self.span)
            }
            (_, None) => {
                writeln_header(f, name, self.span)?;
                write_opt_field::<Expr>(f, "size", None)
            }
            (_, Some(size)) => {
                writeln_header(f, name, self.span)?;
                write_field(f, "size", size)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum ScalarTypeKind {
    Angle(Option<Expr>),
    Bit(Option<Expr>),
    Bool,
    Complex,
    Float(Option<Expr>),
    Int(Option<Expr>),
    /// Only valid as a subroutine parameter type.
    Qubit(Option<Expr>),
    UInt(Option<Expr>),
    Err,
}

#[derive(Clone, Debug)]
pub struct ArrayType {
    pub span: Span,
    pub base: ScalarType,
    pub dims: List<Expr>,
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "ArrayType", self.span)?;
        writeln_field(f, "base", &self.base)?;
        write_list_field(f, "dimensions", &self.dims)
    }
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub span: Span,
    pub kind: Box<ExprKind>,
}

impl Default for Expr {
    fn default() -> Self {
        Self {
            span: Span::default(),
            kind: Box::new(ExprKind::Err),
        }
    }
}

impl WithSpan for Expr {
    fn with_span(self, span: Span) -> Self {
        Self { span, ..self }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Expr {}: {}", self.span, self.kind)
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    BinaryOp(BinaryOpExpr),
    Call(FunctionCall),
    Cast(Cast),
    Err,
    Ident(Ident),
    Index(IndexExpr),
    Lit(Lit),
    Paren(Expr),
    Ternary(TernaryExpr),
    UnaryOp(UnaryOpExpr),
}

impl Display for ExprKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExprKind::BinaryOp(op) => op.fmt(f),
            ExprKind::Call(call) => call.fmt(f),
            ExprKind::Cast(cast) => cast.fmt(f),
            ExprKind::Err => write!(f, "Err"),
            ExprKind::Ident(ident) => ident.fmt(f),
            ExprKind::Index(index) => index.fmt(f),
            ExprKind::Lit(lit) => lit.fmt(f),
            ExprKind::Paren(expr) => write!(f, "Paren {}", expr),
            ExprKind::Ternary(ternary) => ternary.fmt(f),
            ExprKind::UnaryOp(op) => op.fmt(f),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BinaryOpExpr {
    pub op: BinOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Display for BinaryOpExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "BinaryOpExpr:")?;
        writeln_field(f, "op", &self.op)?;
        writeln_field(f, "lhs", &self.lhs)?;
        write_field(f, "rhs", &self.rhs)
    }
}

#[derive(Clone, Debug)]
pub struct UnaryOpExpr {
    pub op: UnaryOp,
    pub expr: Expr,
}

impl Display for UnaryOpExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "UnaryOpExpr:")?;
        writeln_field(f, "op", &self.op)?;
        write_field(f, "expr", &self.expr)
    }
}

#[derive(Clone, Debug)]
pub struct TernaryExpr {
    pub cond: Expr,
    pub if_true: Expr,
    pub if_false: Expr,
}

impl Display for TernaryExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "TernaryExpr:")?;
        writeln_field(f, "cond", &self.cond)?;
        writeln_field(f, "if_true", &self.if_true)?;
        write_field(f, "if_false", &self.if_false)
    }
}

#[derive(Clone, Debug)]
pub struct Cast {
    pub span: Span,
    pub ty: TypeDef,
    pub arg: Expr,
}

impl Display for Cast {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "Cast", self.span)?;
        writeln_field(f, "type", &self.ty)?;
        write_field(f, "arg", &self.arg)
    }
}

#[derive(Clone, Debug)]
pub struct FunctionCall {
    pub span: Span,
    pub name: Ident,
    pub args: List<Expr>,
}

impl Display for FunctionCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "FunctionCall", self.span)?;
        writeln_field(f, "name", &self.name)?;
        write_list_field(f, "args", &self.args)
    }
}

#[derive(Clone, Debug)]
pub struct IndexExpr {
    pub span: Span,
    pub collection: Expr,
    pub index: IndexItem,
}

impl Display for IndexExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln_header(f, "IndexExpr", self.span)?;
        writeln_field(f, "collection", &self.collection)?;
        write_field(f, "index", &self.index)
    }
}

#[derive(Clone, Debug)]
pub struct Lit {
    pub span: Span,
    pub kind: LiteralKind,
}

impl Display for Lit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Lit: {}", self.kind)
    }
}

#[derive(Clone, Debug)]
pub enum LiteralKind {
    BigInt(BigInt),
    Bitstring(BigInt, usize),
    Bool(bool),
    Float(f64),
    Imaginary(f64),
    Int(i64),
    String(Rc<str>),
}

impl Display for LiteralKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LiteralKind::BigInt(value) => write!(f, "BigInt({value})"),
            LiteralKind::Bitstring(value, width) => {
                let width = *width;
                write!(f, "Bitstring(\"{:0>width$}\")", value.to_str_radix(2))
            }
            LiteralKind::Bool(value) => write!(f, "Bool({value})"),
            LiteralKind::Float(value) => write!(f, "Float({value:?})"),
            LiteralKind::Imaginary(value) => write!(f, "Imaginary({value:?})"),
            LiteralKind::Int(value) => write!(f, "Int({value})"),
            LiteralKind::String(value) => write!(f, "String(\"{value}\")"),
        }
    }
}

/// A binary operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinOp {
    /// Addition: `+`.
    Add,
    /// Bitwise AND: `&`.
    AndB,
    /// Logical AND: `&&`.
    AndL,
    /// Division: `/`.
    Div,
    /// Equality: `==`.
    Eq,
    /// Exponentiation: `**`.
    Exp,
    /// Greater than: `>`.
    Gt,
    /// Greater than or equal: `>=`.
    Gte,
    /// Less than: `<`.
    Lt,
    /// Less than or equal: `<=`.
    Lte,
    /// Modulus: `%`.
    Mod,
    /// Multiplication: `*`.
    Mul,
    /// Inequality: `!=`.
    Neq,
    /// Bitwise OR: `|`.
    OrB,
    /// Logical OR: `||`.
    OrL,
    /// Shift left: `<<`.
    Shl,
    /// Shift right: `>>`.
    Shr,
    /// Subtraction: `-`.
    Sub,
    /// Bitwise XOR: `^`.
    XorB,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Add => write!(f, "Add"),
            BinOp::AndB => write!(f, "AndB"),
            BinOp::AndL => write!(f, "AndL"),
            BinOp::Div => write!(f, "Div"),
            BinOp::Eq => write!(f, "Eq"),
            BinOp::Exp => write!(f, "Exp"),
            BinOp::Gt => write!(f, "Gt"),
            BinOp::Gte => write!(f, "Gte"),
            BinOp::Lt => write!(f, "Lt"),
            BinOp::Lte => write!(f, "Lte"),
            BinOp::Mod => write!(f, "Mod"),
            BinOp::Mul => write!(f, "Mul"),
            BinOp::Neq => write!(f, "Neq"),
            BinOp::OrB => write!(f, "OrB"),
            BinOp::OrL => write!(f, "OrL"),
            BinOp::Shl => write!(f, "Shl"),
            BinOp::Shr => write!(f, "Shr"),
            BinOp::Sub => write!(f, "Sub"),
            BinOp::XorB => write!(f, "XorB"),
        }
    }
}

/// A unary operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    /// Negation: `-`.
    Neg,
    /// Bitwise NOT: `~`.
    NotB,
    /// Logical NOT: `!`.
    NotL,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "Neg"),
            UnaryOp::NotB => write!(f, "NotB"),
            UnaryOp::NotL => write!(f, "NotL"),
        }
    }
}
