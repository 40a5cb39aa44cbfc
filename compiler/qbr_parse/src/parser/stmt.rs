// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{
    expr::{self, discrete_set, index_item},
    prim::{barrier, ident, opt, recovering_semi, recovering_token, seq, shorten, token},
    scan::ParserContext,
    Result,
};
use crate::{
    ast::{
        list_from_iter, AliasDeclStmt, ArrayType, AssignStmt, AssignOpStmt, Block,
        ClassicalDeclStmt, ConstDeclStmt, DefStmt, EnumerableSet, Expr, ExprKind, ForStmt,
        GateCallStmt, GateDefStmt, GateModifier, GateModifierKind, GateOperand, IfStmt,
        IncludeStmt, IndexItem, IODeclStmt, IoKeyword, MeasureExpr, MeasureStmt,
        QubitDeclStmt, ResetStmt, ReturnStmt, ScalarType, ScalarTypeKind, Stmt, StmtKind,
        SwitchCase, SwitchStmt, TypeDef, TypedParameter, ValueExpr, WhileStmt,
    },
    keyword::Keyword,
    lex::{Delim, Literal, TokenKind},
    Error, ErrorKind,
};

pub(super) fn parse(s: &mut ParserContext) -> Result<Stmt> {
    let lo = s.peek().span.lo;
    let kind = match s.peek().kind {
        TokenKind::Keyword(Keyword::Include) => include_stmt(s)?,
        TokenKind::Keyword(Keyword::Qubit) => qubit_decl(s)?,
        TokenKind::Keyword(Keyword::Const) => const_decl(s)?,
        TokenKind::Keyword(Keyword::Input) => io_decl(s, IoKeyword::Input)?,
        TokenKind::Keyword(Keyword::Output) => io_decl(s, IoKeyword::Output)?,
        TokenKind::Keyword(Keyword::Let) => alias_decl(s)?,
        TokenKind::Keyword(Keyword::Gate) => gate_def(s)?,
        TokenKind::Keyword(Keyword::Def) => def_stmt(s)?,
        TokenKind::Keyword(Keyword::If) => if_stmt(s)?,
        TokenKind::Keyword(Keyword::For) => for_stmt(s)?,
        TokenKind::Keyword(Keyword::While) => while_stmt(s)?,
        TokenKind::Keyword(Keyword::Switch) => switch_stmt(s)?,
        TokenKind::Keyword(Keyword::Break) => {
            s.advance();
            recovering_semi(s);
            StmtKind::Break
        }
        TokenKind::Keyword(Keyword::Continue) => {
            s.advance();
            recovering_semi(s);
            StmtKind::Continue
        }
        TokenKind::Keyword(Keyword::Return) => return_stmt(s)?,
        TokenKind::Keyword(Keyword::Reset) => reset_stmt(s)?,
        TokenKind::Keyword(Keyword::Measure) => measure_stmt(s)?,
        TokenKind::Keyword(
            Keyword::Ctrl | Keyword::NegCtrl | Keyword::Inv | Keyword::Pow,
        ) => modified_gate_call(s)?,
        TokenKind::Open(Delim::Brace) => StmtKind::Block(parse_block(s)?),
        TokenKind::Keyword(
            Keyword::Bit
            | Keyword::Bool
            | Keyword::Int
            | Keyword::UInt
            | Keyword::Float
            | Keyword::Angle
            | Keyword::Complex
            | Keyword::Array,
        ) => classical_decl(s)?,
        _ => expr_like_stmt(s)?,
    };

    Ok(Stmt {
        span: s.span(lo),
        kind: Box::new(kind),
    })
}

pub(super) fn parse_block(s: &mut ParserContext) -> Result<Block> {
    let lo = s.peek().span.lo;
    token(s, TokenKind::Open(Delim::Brace))?;
    let mut stmts = Vec::new();
    while s.peek().kind != TokenKind::Close(Delim::Brace) && s.peek().kind != TokenKind::Eof {
        match barrier(s, &[TokenKind::Close(Delim::Brace)], parse) {
            Ok(stmt) => stmts.push(stmt),
            Err(error) => {
                s.push_error(error);
                s.recover(&[TokenKind::Semi]);
            }
        }
    }
    recovering_token(s, TokenKind::Close(Delim::Brace));
    Ok(Block {
        span: s.span(lo),
        stmts: list_from_iter(stmts),
    })
}

/// The body of a conditional or loop: either a braced block or a single
/// statement.
fn stmt_or_block(s: &mut ParserContext) -> Result<Stmt> {
    if s.peek().kind == TokenKind::Open(Delim::Brace) {
        let lo = s.peek().span.lo;
        let block = parse_block(s)?;
        Ok(Stmt {
            span: s.span(lo),
            kind: Box::new(StmtKind::Block(block)),
        })
    } else {
        parse(s)
    }
}

fn include_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    let lo = s.peek().span.lo;
    s.advance();
    let TokenKind::Literal(Literal::String) = s.peek().kind else {
        return Err(Error(ErrorKind::Rule(
            "include path",
            s.peek().kind,
            s.peek().span,
        )));
    };
    let path = shorten(1, 1, s.read()).to_string();
    s.advance();
    recovering_semi(s);
    Ok(StmtKind::Include(IncludeStmt {
        span: s.span(lo),
        path: path.into(),
    }))
}

fn qubit_decl(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let size = opt(s, designator)?;
    let name = ident(s)?;
    recovering_semi(s);
    Ok(StmtKind::QubitDecl(QubitDeclStmt { name, size }))
}

fn const_decl(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let ty = scalar_or_array_type(s)?;
    let name = ident(s)?;
    token(s, TokenKind::Eq)?;
    let init = expr::expr(s)?;
    recovering_semi(s);
    Ok(StmtKind::ConstDecl(ConstDeclStmt { ty, name, init }))
}

fn io_decl(s: &mut ParserContext, io: IoKeyword) -> Result<StmtKind> {
    s.advance();
    let ty = scalar_or_array_type(s)?;
    let name = ident(s)?;
    recovering_semi(s);
    Ok(StmtKind::IODecl(IODeclStmt { io, ty, name }))
}

fn alias_decl(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let name = ident(s)?;
    token(s, TokenKind::Eq)?;
    let target = expr::expr(s)?;
    recovering_semi(s);
    Ok(StmtKind::Alias(AliasDeclStmt { name, target }))
}

fn classical_decl(s: &mut ParserContext) -> Result<StmtKind> {
    let ty = scalar_or_array_type(s)?;
    let name = ident(s)?;
    let init = if token(s, TokenKind::Eq).is_ok() {
        Some(value_expr(s)?)
    } else {
        None
    };
    recovering_semi(s);
    Ok(StmtKind::ClassicalDecl(ClassicalDeclStmt { ty, name, init }))
}

/// The right-hand side of an assignment or initializer, which may be a
/// measurement.
fn value_expr(s: &mut ParserContext) -> Result<ValueExpr> {
    if s.peek().kind == TokenKind::Keyword(Keyword::Measure) {
        Ok(ValueExpr::Measurement(measure_expr(s)?))
    } else {
        Ok(ValueExpr::Expr(expr::expr(s)?))
    }
}

fn measure_expr(s: &mut ParserContext) -> Result<MeasureExpr> {
    let lo = s.peek().span.lo;
    token(s, TokenKind::Keyword(Keyword::Measure))?;
    let operand = gate_operand(s)?;
    Ok(MeasureExpr {
        span: s.span(lo),
        operand,
    })
}

pub(super) fn gate_operand(s: &mut ParserContext) -> Result<GateOperand> {
    let lo = s.peek().span.lo;
    let name = ident(s)?;
    let index = if token(s, TokenKind::Open(Delim::Bracket)).is_ok() {
        let index = index_item(s)?;
        recovering_token(s, TokenKind::Close(Delim::Bracket));
        Some(index)
    } else {
        None
    };
    Ok(GateOperand {
        span: s.span(lo),
        name,
        index,
    })
}

fn gate_def(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let name = ident(s)?;
    let params = if token(s, TokenKind::Open(Delim::Paren)).is_ok() {
        let (params, _) = seq(s, ident)?;
        recovering_token(s, TokenKind::Close(Delim::Paren));
        params
    } else {
        Vec::new()
    };
    let (qubits, _) = seq(s, ident)?;
    let body = parse_block(s)?;
    Ok(StmtKind::GateDef(GateDefStmt {
        name,
        params: list_from_iter(params),
        qubits: list_from_iter(qubits),
        body,
    }))
}

fn def_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let name = ident(s)?;
    token(s, TokenKind::Open(Delim::Paren))?;
    let (params, _) = seq(s, typed_param)?;
    recovering_token(s, TokenKind::Close(Delim::Paren));
    let return_ty = if token(s, TokenKind::Arrow).is_ok() {
        Some(scalar_type(s)?)
    } else {
        None
    };
    let body = parse_block(s)?;
    Ok(StmtKind::Def(DefStmt {
        name,
        params: list_from_iter(params),
        return_ty,
        body,
    }))
}

fn typed_param(s: &mut ParserContext) -> Result<TypedParameter> {
    let lo = s.peek().span.lo;
    let ty = if s.peek().kind == TokenKind::Keyword(Keyword::Qubit) {
        let type_lo = s.peek().span.lo;
        s.advance();
        let size = opt(s, designator)?;
        TypeDef::Scalar(ScalarType {
            span: s.span(type_lo),
            kind: ScalarTypeKind::Qubit(size),
        })
    } else {
        scalar_or_array_type(s)?
    };
    let name = ident(s)?;
    Ok(TypedParameter {
        span: s.span(lo),
        ty,
        name,
    })
}

fn return_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let value = if s.peek().kind == TokenKind::Semi {
        None
    } else {
        Some(value_expr(s)?)
    };
    recovering_semi(s);
    Ok(StmtKind::Return(ReturnStmt { value }))
}

fn reset_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let operand = gate_operand(s)?;
    recovering_semi(s);
    Ok(StmtKind::Reset(ResetStmt { operand }))
}

fn measure_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    let measurement = measure_expr(s)?;
    let target = if token(s, TokenKind::Arrow).is_ok() {
        Some(expr::expr(s)?)
    } else {
        None
    };
    recovering_semi(s);
    Ok(StmtKind::Measure(MeasureStmt {
        measurement,
        target,
    }))
}

fn if_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    token(s, TokenKind::Open(Delim::Paren))?;
    let condition = expr::expr(s)?;
    recovering_token(s, TokenKind::Close(Delim::Paren));
    let if_body = stmt_or_block(s)?;
    let else_body = if token(s, TokenKind::Keyword(Keyword::Else)).is_ok() {
        Some(stmt_or_block(s)?)
    } else {
        None
    };
    Ok(StmtKind::If(IfStmt {
        condition,
        if_body,
        else_body,
    }))
}

fn while_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    token(s, TokenKind::Open(Delim::Paren))?;
    let condition = expr::expr(s)?;
    recovering_token(s, TokenKind::Close(Delim::Paren));
    let body = stmt_or_block(s)?;
    Ok(StmtKind::While(WhileStmt { condition, body }))
}

fn for_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    let ty = scalar_type(s)?;
    let loop_var = ident(s)?;
    token(s, TokenKind::Keyword(Keyword::In))?;
    let iterable = for_iterable(s)?;
    let body = stmt_or_block(s)?;
    Ok(StmtKind::For(ForStmt {
        ty,
        ident: loop_var,
        iterable,
        body,
    }))
}

fn for_iterable(s: &mut ParserContext) -> Result<EnumerableSet> {
    if s.peek().kind == TokenKind::Open(Delim::Brace) {
        Ok(EnumerableSet::Set(discrete_set(s)?))
    } else {
        token(s, TokenKind::Open(Delim::Bracket))?;
        let item = index_item(s)?;
        recovering_token(s, TokenKind::Close(Delim::Bracket));
        match item {
            IndexItem::Range(range) => Ok(EnumerableSet::Range(range)),
            IndexItem::Expr(expr) => Err(Error(ErrorKind::Convert(
                "range",
                "expression",
                expr.span,
            ))),
        }
    }
}

fn switch_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    s.advance();
    token(s, TokenKind::Open(Delim::Paren))?;
    let selector = expr::expr(s)?;
    recovering_token(s, TokenKind::Close(Delim::Paren));
    token(s, TokenKind::Open(Delim::Brace))?;
    let mut cases = Vec::new();
    let mut default = None;
    loop {
        match s.peek().kind {
            TokenKind::Keyword(Keyword::Case) => {
                let lo = s.peek().span.lo;
                s.advance();
                let (labels, _) = seq(s, expr::expr)?;
                let body = parse_block(s)?;
                cases.push(SwitchCase {
                    span: s.span(lo),
                    labels: list_from_iter(labels),
                    body,
                });
            }
            TokenKind::Keyword(Keyword::Default) => {
                s.advance();
                default = Some(parse_block(s)?);
            }
            _ => break,
        }
    }
    recovering_token(s, TokenKind::Close(Delim::Brace));
    Ok(StmtKind::Switch(SwitchStmt {
        selector,
        cases: list_from_iter(cases),
        default,
    }))
}

fn modified_gate_call(s: &mut ParserContext) -> Result<StmtKind> {
    let mut modifiers = Vec::new();
    while let Some(modifier) = opt(s, gate_modifier)? {
        modifiers.push(modifier);
    }
    let name = ident(s)?;
    let params = gate_params(s)?;
    let (operands, _) = seq(s, gate_operand)?;
    recovering_semi(s);
    Ok(StmtKind::GateCall(GateCallStmt {
        modifiers: list_from_iter(modifiers),
        name,
        params: list_from_iter(params),
        operands: list_from_iter(operands),
    }))
}

fn gate_modifier(s: &mut ParserContext) -> Result<GateModifier> {
    let lo = s.peek().span.lo;
    let kind = match s.peek().kind {
        TokenKind::Keyword(Keyword::Ctrl) => {
            s.advance();
            GateModifierKind::Ctrl(modifier_arg(s)?)
        }
        TokenKind::Keyword(Keyword::NegCtrl) => {
            s.advance();
            GateModifierKind::NegCtrl(modifier_arg(s)?)
        }
        TokenKind::Keyword(Keyword::Inv) => {
            s.advance();
            GateModifierKind::Inv
        }
        TokenKind::Keyword(Keyword::Pow) => {
            s.advance();
            token(s, TokenKind::Open(Delim::Paren))?;
            let exponent = expr::expr(s)?;
            recovering_token(s, TokenKind::Close(Delim::Paren));
            GateModifierKind::Pow(exponent)
        }
        _ => {
            return Err(Error(ErrorKind::Rule(
                "gate modifier",
                s.peek().kind,
                s.peek().span,
            )))
        }
    };
    token(s, TokenKind::At)?;
    Ok(GateModifier {
        span: s.span(lo),
        kind,
    })
}

fn modifier_arg(s: &mut ParserContext) -> Result<Option<Expr>> {
    if token(s, TokenKind::Open(Delim::Paren)).is_ok() {
        let arg = expr::expr(s)?;
        recovering_token(s, TokenKind::Close(Delim::Paren));
        Ok(Some(arg))
    } else {
        Ok(None)
    }
}

fn gate_params(s: &mut ParserContext) -> Result<Vec<Expr>> {
    if token(s, TokenKind::Open(Delim::Paren)).is_ok() {
        let (params, _) = seq(s, expr::expr)?;
        recovering_token(s, TokenKind::Close(Delim::Paren));
        Ok(params)
    } else {
        Ok(Vec::new())
    }
}

/// A statement that begins with an expression: an assignment, a compound
/// assignment, a gate call, or a bare expression statement.
fn expr_like_stmt(s: &mut ParserContext) -> Result<StmtKind> {
    let lhs = expr::expr(s)?;
    match s.peek().kind {
        TokenKind::Eq => {
            s.advance();
            let rhs = value_expr(s)?;
            recovering_semi(s);
            Ok(StmtKind::Assign(AssignStmt { lhs, rhs }))
        }
        TokenKind::BinOpEq(op) => {
            s.advance();
            let rhs = expr::expr(s)?;
            recovering_semi(s);
            Ok(StmtKind::AssignOp(AssignOpStmt {
                op: expr::closed_bin_op(op),
                lhs,
                rhs,
            }))
        }
        TokenKind::Ident => gate_call_from_expr(s, lhs),
        _ => {
            recovering_semi(s);
            // A bare `gphase(...)` call is a gate application with no
            // operands rather than a classical call.
            if let ExprKind::Call(call) = &*lhs.kind {
                if call.name.name.as_ref() == "gphase" {
                    return Ok(StmtKind::GateCall(GateCallStmt {
                        modifiers: list_from_iter(Vec::new()),
                        name: call.name.clone(),
                        params: call.args.clone(),
                        operands: list_from_iter(Vec::new()),
                    }));
                }
            }
            Ok(StmtKind::Expr(lhs))
        }
    }
}

/// Reinterprets an already-parsed leading expression as the head of a gate
/// call: a bare identifier names a parameterless gate, and a call supplies
/// its parameters.
fn gate_call_from_expr(s: &mut ParserContext, lhs: Expr) -> Result<StmtKind> {
    let (name, params) = match *lhs.kind {
        ExprKind::Ident(name) => (name, Vec::new()),
        ExprKind::Call(call) => (call.name, call.args.into_vec().into_iter().map(|e| *e).collect()),
        _ => {
            return Err(Error(ErrorKind::Convert(
                "gate name",
                "expression",
                lhs.span,
            )))
        }
    };
    let (operands, _) = seq(s, gate_operand)?;
    recovering_semi(s);
    Ok(StmtKind::GateCall(GateCallStmt {
        modifiers: list_from_iter(Vec::new()),
        name,
        params: list_from_iter(params),
        operands: list_from_iter(operands),
    }))
}

pub(super) fn scalar_or_array_type(s: &mut ParserContext) -> Result<TypeDef> {
    if s.peek().kind == TokenKind::Keyword(Keyword::Array) {
        Ok(TypeDef::Array(array_type(s)?))
    } else {
        Ok(TypeDef::Scalar(scalar_type(s)?))
    }
}

pub(super) fn scalar_type(s: &mut ParserContext) -> Result<ScalarType> {
    let lo = s.peek().span.lo;
    let kind = match s.peek().kind {
        TokenKind::Keyword(Keyword::Bit) => {
            s.advance();
            ScalarTypeKind::Bit(opt(s, designator)?)
        }
        TokenKind::Keyword(Keyword::Bool) => {
            s.advance();
            ScalarTypeKind::Bool
        }
        TokenKind::Keyword(Keyword::Int) => {
            s.advance();
            ScalarTypeKind::Int(opt(s, designator)?)
        }
        TokenKind::Keyword(Keyword::UInt) => {
            s.advance();
            ScalarTypeKind::UInt(opt(s, designator)?)
        }
        TokenKind::Keyword(Keyword::Float) => {
            s.advance();
            ScalarTypeKind::Float(opt(s, designator)?)
        }
        TokenKind::Keyword(Keyword::Angle) => {
            s.advance();
            ScalarTypeKind::Angle(opt(s, designator)?)
        }
        TokenKind::Keyword(Keyword::Complex) => {
            s.advance();
            // An optional base designator like `complex[float[64]]` is
            // accepted and discarded; evaluation is always double precision.
            if token(s, TokenKind::Open(Delim::Bracket)).is_ok() {
                let _ = scalar_type(s)?;
                recovering_token(s, TokenKind::Close(Delim::Bracket));
            }
            ScalarTypeKind::Complex
        }
        _ => {
            return Err(Error(ErrorKind::Rule(
                "scalar type",
                s.peek().kind,
                s.peek().span,
            )))
        }
    };
    Ok(ScalarType {
        span: s.span(lo),
        kind,
    })
}

fn array_type(s: &mut ParserContext) -> Result<ArrayType> {
    let lo = s.peek().span.lo;
    token(s, TokenKind::Keyword(Keyword::Array))?;
    token(s, TokenKind::Open(Delim::Bracket))?;
    let base = scalar_type(s)?;
    let mut dims = Vec::new();
    while token(s, TokenKind::Comma).is_ok() {
        dims.push(expr::expr(s)?);
    }
    recovering_token(s, TokenKind::Close(Delim::Bracket));
    Ok(ArrayType {
        span: s.span(lo),
        base,
        dims: list_from_iter(dims),
    })
}

fn designator(s: &mut ParserContext) -> Result<Expr> {
    token(s, TokenKind::Open(Delim::Bracket))?;
    let size = expr::expr(s)?;
    recovering_token(s, TokenKind::Close(Delim::Bracket));
    Ok(size)
}
