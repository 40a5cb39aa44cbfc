// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Expression parsing makes use of Pratt parsing (or "top-down operator-
//! precedence parsing") to handle relative precedence of operators.

use super::{
    prim::{ident, opt, seq, shorten, token},
    scan::ParserContext,
    stmt::scalar_or_array_type,
    Result,
};
use crate::{
    ast::{
        BinaryOpExpr, BinOp, Cast, DiscreteSet, Expr, ExprKind, FunctionCall, Ident, IndexExpr,
        IndexItem, Lit, LiteralKind, list_from_iter, RangeDef, TernaryExpr, UnaryOp, UnaryOpExpr,
    },
    keyword::Keyword,
    lex::{ClosedBinOp, ComparisonOp, Delim, Literal, Radix, Token, TokenKind},
    Error, ErrorKind,
};
use num_bigint::BigInt;
use num_traits::Num;
use qbr_data_structures::span::Span;

struct PrefixOp {
    kind: UnaryOp,
    precedence: u8,
}

struct InfixOp {
    kind: OpKind,
    precedence: u8,
}

enum OpKind {
    Binary(BinOp, Assoc),
    Funcall,
    Index,
}

#[derive(Clone, Copy)]
enum Assoc {
    Left,
    Right,
}

pub(super) fn expr(s: &mut ParserContext) -> Result<Expr> {
    let lo = s.peek().span.lo;
    let cond = expr_op(s, 0)?;
    if token(s, TokenKind::Question).is_err() {
        return Ok(cond);
    }

    let if_true = expr(s)?;
    token(s, TokenKind::Colon)?;
    let if_false = expr(s)?;
    Ok(Expr {
        span: s.span(lo),
        kind: Box::new(ExprKind::Ternary(TernaryExpr {
            cond,
            if_true,
            if_false,
        })),
    })
}

fn expr_op(s: &mut ParserContext, min_precedence: u8) -> Result<Expr> {
    let lo = s.peek().span.lo;

    let mut lhs = if let Some(op) = prefix_op(s.peek().kind) {
        s.advance();
        let rhs = expr_op(s, op.precedence)?;
        Expr {
            span: s.span(lo),
            kind: Box::new(ExprKind::UnaryOp(UnaryOpExpr {
                op: op.kind,
                expr: rhs,
            })),
        }
    } else {
        expr_base(s)?
    };

    while let Some(op) = infix_op(s.peek().kind) {
        if op.precedence < min_precedence {
            break;
        }

        s.advance();
        let kind = match op.kind {
            OpKind::Binary(kind, assoc) => {
                let precedence = next_precedence(op.precedence, assoc);
                let rhs = expr_op(s, precedence)?;
                Box::new(ExprKind::BinaryOp(BinaryOpExpr { op: kind, lhs, rhs }))
            }
            OpKind::Funcall => {
                if let ExprKind::Ident(name) = *lhs.kind {
                    Box::new(funcall(s, name)?)
                } else {
                    return Err(Error(ErrorKind::Convert(
                        "identifier",
                        "expression",
                        lhs.span,
                    )));
                }
            }
            OpKind::Index => Box::new(index_expr(s, lhs)?),
        };

        lhs = Expr {
            span: s.span(lo),
            kind,
        };
    }

    Ok(lhs)
}

fn expr_base(s: &mut ParserContext) -> Result<Expr> {
    let lo = s.peek().span.lo;
    if let Some(l) = lit(s)? {
        Ok(Expr {
            span: s.span(lo),
            kind: Box::new(ExprKind::Lit(l)),
        })
    } else if token(s, TokenKind::Open(Delim::Paren)).is_ok() {
        let inner = expr(s)?;
        token(s, TokenKind::Close(Delim::Paren))?;
        Ok(Expr {
            span: s.span(lo),
            kind: Box::new(ExprKind::Paren(inner)),
        })
    } else if s.peek().kind == TokenKind::Keyword(Keyword::Pow) {
        // `pow` is a keyword for the gate modifier, but it is also the name of
        // the exponentiation built-in.
        let span = s.peek().span;
        s.advance();
        Ok(Expr {
            span: s.span(lo),
            kind: Box::new(ExprKind::Ident(Ident {
                span,
                name: "pow".into(),
            })),
        })
    } else {
        match opt(s, scalar_or_array_type) {
            Err(err) => Err(err),
            Ok(Some(ty)) => {
                // If we have a type, we expect to see a parenthesized
                // expression next, making this a cast.
                token(s, TokenKind::Open(Delim::Paren))?;
                let arg = expr(s)?;
                token(s, TokenKind::Close(Delim::Paren))?;
                Ok(Expr {
                    span: s.span(lo),
                    kind: Box::new(ExprKind::Cast(Cast {
                        span: s.span(lo),
                        ty,
                        arg,
                    })),
                })
            }
            Ok(None) => {
                if let Ok(id) = ident(s) {
                    Ok(Expr {
                        span: s.span(lo),
                        kind: Box::new(ExprKind::Ident(id)),
                    })
                } else {
                    Err(Error(ErrorKind::Rule(
                        "expression",
                        s.peek().kind,
                        s.peek().span,
                    )))
                }
            }
        }
    }
}

pub(super) fn lit(s: &mut ParserContext) -> Result<Option<Lit>> {
    let lexeme = s.read();
    let token = s.peek();
    match lit_token(lexeme, token) {
        Ok(Some(lit)) => {
            s.advance();
            Ok(Some(lit))
        }
        Ok(None) => Ok(None),
        Err(err) => {
            s.advance();
            Err(err)
        }
    }
}

fn lit_token(lexeme: &str, token: Token) -> Result<Option<Lit>> {
    match token.kind {
        TokenKind::Literal(literal) => match literal {
            Literal::Integer(radix) => {
                let offset = if radix == Radix::Decimal { 0 } else { 2 };
                let value = lit_int(&lexeme[offset..], radix.into());
                if let Some(value) = value {
                    Ok(Some(Lit {
                        kind: LiteralKind::Int(value),
                        span: token.span,
                    }))
                } else if let Some(value) = lit_bigint(&lexeme[offset..], radix.into()) {
                    Ok(Some(Lit {
                        kind: LiteralKind::BigInt(value),
                        span: token.span,
                    }))
                } else {
                    Err(Error(ErrorKind::Lit("integer", token.span)))
                }
            }
            Literal::Float => {
                let lexeme = lexeme.replace('_', "");
                let value = lexeme
                    .parse()
                    .map_err(|_| Error(ErrorKind::Lit("floating-point", token.span)))?;
                Ok(Some(Lit {
                    kind: LiteralKind::Float(value),
                    span: token.span,
                }))
            }
            Literal::Imaginary => {
                let lexeme: String = shorten(0, 2, lexeme)
                    .chars()
                    .filter(|c| *c != '_')
                    .collect();
                let value = lexeme
                    .parse()
                    .map_err(|_| Error(ErrorKind::Lit("imaginary", token.span)))?;
                Ok(Some(Lit {
                    kind: LiteralKind::Imaginary(value),
                    span: token.span,
                }))
            }
            Literal::Bitstring => {
                let lexeme: String = shorten(1, 1, lexeme)
                    .chars()
                    .filter(|c| *c != '_')
                    .collect();
                let width = lexeme.len();
                let value = BigInt::from_str_radix(&lexeme, 2)
                    .map_err(|_| Error(ErrorKind::Lit("bitstring", token.span)))?;
                Ok(Some(Lit {
                    span: token.span,
                    kind: LiteralKind::Bitstring(value, width),
                }))
            }
            Literal::String => {
                let lexeme = shorten(1, 1, lexeme);
                let string = unescape(lexeme).map_err(|index| {
                    let ch = lexeme[index + 1..]
                        .chars()
                        .next()
                        .expect("character should be found at index");
                    let index: u32 = index.try_into().expect("index should fit into u32");
                    let lo = token.span.lo + index + 2;
                    let span = Span { lo, hi: lo + 1 };
                    Error(ErrorKind::Escape(ch, span))
                })?;
                Ok(Some(Lit {
                    kind: LiteralKind::String(string.into()),
                    span: token.span,
                }))
            }
        },
        TokenKind::Keyword(Keyword::True) => Ok(Some(Lit {
            kind: LiteralKind::Bool(true),
            span: token.span,
        })),
        TokenKind::Keyword(Keyword::False) => Ok(Some(Lit {
            kind: LiteralKind::Bool(false),
            span: token.span,
        })),
        _ => Ok(None),
    }
}

fn lit_int(lexeme: &str, radix: u32) -> Option<i64> {
    let multiplier = i64::from(radix);
    lexeme
        .chars()
        .filter(|&c| c != '_')
        .try_rfold((0i64, 1i64, false), |(value, place, mut overflow), c| {
            let (increment, over) = i64::from(c.to_digit(radix)?).overflowing_mul(place);
            overflow |= over;

            let (new_value, over) = value.overflowing_add(increment);
            overflow |= over;

            // Only treat as overflow if the value is not i64::MIN, since we need to allow once special
            // case of overflow to allow for minimum value literals.
            if overflow && new_value != i64::MIN {
                return None;
            }

            let (new_place, over) = place.overflowing_mul(multiplier);
            overflow |= over;

            // If the place overflows, we can still accept the value as long as it's the last digit.
            // Pass the overflow forward so that it fails if there are more digits.
            Some((new_value, new_place, overflow))
        })
        .map(|(value, _, _)| value)
}

fn lit_bigint(lexeme: &str, radix: u32) -> Option<BigInt> {
    let lexeme: String = lexeme.chars().filter(|&c| c != '_').collect();
    BigInt::from_str_radix(&lexeme, radix).ok()
}

fn funcall(s: &mut ParserContext, name: Ident) -> Result<ExprKind> {
    let lo = name.span.lo;
    let (args, _) = seq(s, expr)?;
    token(s, TokenKind::Close(Delim::Paren))?;
    Ok(ExprKind::Call(FunctionCall {
        span: s.span(lo),
        name,
        args: list_from_iter(args),
    }))
}

fn index_expr(s: &mut ParserContext, lhs: Expr) -> Result<ExprKind> {
    let lo = lhs.span.lo;
    let index = index_item(s)?;
    token(s, TokenKind::Close(Delim::Bracket))?;
    Ok(ExprKind::Index(IndexExpr {
        span: s.span(lo),
        collection: lhs,
        index,
    }))
}

/// A single index: a plain expression, or a range with optional start, step,
/// and end.
pub(super) fn index_item(s: &mut ParserContext) -> Result<IndexItem> {
    let lo = s.peek().span.lo;
    let start = opt(s, expr)?;

    // If no colon, the expression is a normal index.
    if token(s, TokenKind::Colon).is_err() {
        let expr = start.ok_or(Error(ErrorKind::Rule(
            "expression",
            s.peek().kind,
            s.span(lo),
        )))?;
        return Ok(IndexItem::Expr(expr));
    }

    let middle = opt(s, expr)?;
    let end = if token(s, TokenKind::Colon).is_ok() {
        opt(s, expr)?
    } else {
        return Ok(IndexItem::Range(RangeDef {
            span: s.span(lo),
            start,
            step: None,
            end: middle,
        }));
    };

    Ok(IndexItem::Range(RangeDef {
        span: s.span(lo),
        start,
        step: middle,
        end,
    }))
}

pub(super) fn discrete_set(s: &mut ParserContext) -> Result<DiscreteSet> {
    let lo = s.peek().span.lo;
    token(s, TokenKind::Open(Delim::Brace))?;
    let (exprs, _) = seq(s, expr)?;
    token(s, TokenKind::Close(Delim::Brace))?;
    Ok(DiscreteSet {
        span: s.span(lo),
        values: list_from_iter(exprs),
    })
}

fn next_precedence(precedence: u8, assoc: Assoc) -> u8 {
    match assoc {
        Assoc::Left => precedence + 1,
        Assoc::Right => precedence,
    }
}

/// The operation precedence table is at
/// <https://openqasm.com/language/classical.html#evaluation-order>.
fn prefix_op(kind: TokenKind) -> Option<PrefixOp> {
    match kind {
        TokenKind::Bang => Some(PrefixOp {
            kind: UnaryOp::NotL,
            precedence: 11,
        }),
        TokenKind::Tilde => Some(PrefixOp {
            kind: UnaryOp::NotB,
            precedence: 11,
        }),
        TokenKind::ClosedBinOp(ClosedBinOp::Minus) => Some(PrefixOp {
            kind: UnaryOp::Neg,
            precedence: 11,
        }),
        _ => None,
    }
}

/// The operation precedence table is at
/// <https://openqasm.com/language/classical.html#evaluation-order>.
fn infix_op(kind: TokenKind) -> Option<InfixOp> {
    fn left_assoc(op: BinOp, precedence: u8) -> Option<InfixOp> {
        Some(InfixOp {
            kind: OpKind::Binary(op, Assoc::Left),
            precedence,
        })
    }

    match kind {
        TokenKind::ClosedBinOp(token) => match token {
            ClosedBinOp::StarStar => Some(InfixOp {
                kind: OpKind::Binary(BinOp::Exp, Assoc::Right),
                precedence: 12,
            }),
            ClosedBinOp::Star => left_assoc(BinOp::Mul, 10),
            ClosedBinOp::Slash => left_assoc(BinOp::Div, 10),
            ClosedBinOp::Percent => left_assoc(BinOp::Mod, 10),
            ClosedBinOp::Minus => left_assoc(BinOp::Sub, 9),
            ClosedBinOp::Plus => left_assoc(BinOp::Add, 9),
            ClosedBinOp::LtLt => left_assoc(BinOp::Shl, 8),
            ClosedBinOp::GtGt => left_assoc(BinOp::Shr, 8),
            ClosedBinOp::Amp => left_assoc(BinOp::AndB, 5),
            ClosedBinOp::Caret => left_assoc(BinOp::XorB, 4),
            ClosedBinOp::Bar => left_assoc(BinOp::OrB, 3),
            ClosedBinOp::AmpAmp => left_assoc(BinOp::AndL, 2),
            ClosedBinOp::BarBar => left_assoc(BinOp::OrL, 1),
        },
        TokenKind::ComparisonOp(token) => match token {
            ComparisonOp::Gt => left_assoc(BinOp::Gt, 7),
            ComparisonOp::GtEq => left_assoc(BinOp::Gte, 7),
            ComparisonOp::Lt => left_assoc(BinOp::Lt, 7),
            ComparisonOp::LtEq => left_assoc(BinOp::Lte, 7),
            ComparisonOp::BangEq => left_assoc(BinOp::Neq, 6),
            ComparisonOp::EqEq => left_assoc(BinOp::Eq, 6),
        },
        TokenKind::Open(Delim::Paren) => Some(InfixOp {
            kind: OpKind::Funcall,
            precedence: 13,
        }),
        TokenKind::Open(Delim::Bracket) => Some(InfixOp {
            kind: OpKind::Index,
            precedence: 13,
        }),
        _ => None,
    }
}

pub(super) fn closed_bin_op(op: ClosedBinOp) -> BinOp {
    match op {
        ClosedBinOp::Amp => BinOp::AndB,
        ClosedBinOp::AmpAmp => BinOp::AndL,
        ClosedBinOp::Bar => BinOp::OrB,
        ClosedBinOp::BarBar => BinOp::OrL,
        ClosedBinOp::Caret => BinOp::XorB,
        ClosedBinOp::GtGt => BinOp::Shr,
        ClosedBinOp::LtLt => BinOp::Shl,
        ClosedBinOp::Minus => BinOp::Sub,
        ClosedBinOp::Percent => BinOp::Mod,
        ClosedBinOp::Plus => BinOp::Add,
        ClosedBinOp::Slash => BinOp::Div,
        ClosedBinOp::Star => BinOp::Mul,
        ClosedBinOp::StarStar => BinOp::Exp,
    }
}

fn unescape(s: &str) -> std::result::Result<String, usize> {
    let mut chars = s.char_indices();
    let mut buf = String::with_capacity(s.len());
    while let Some((index, ch)) = chars.next() {
        buf.push(if ch == '\\' {
            let escape = chars.next().expect("escape should not be empty").1;
            match escape {
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                _ => return Err(index),
            }
        } else {
            ch
        });
    }

    Ok(buf)
}
