// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{ClosedBinOp, ComparisonOp, Error, Lexer, Literal, Token, TokenKind};
use crate::{keyword::Keyword, lex::Radix};
use qbr_data_structures::span::Span;

fn lex(input: &str) -> (Vec<Token>, Vec<Error>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for result in Lexer::new(input) {
        match result {
            Ok(token) => tokens.push(token),
            Err(error) => errors.push(error),
        }
    }
    (tokens, errors)
}

fn kinds(input: &str) -> Vec<TokenKind> {
    let (tokens, errors) = lex(input);
    assert!(errors.is_empty(), "{errors:?}");
    tokens.into_iter().map(|t| t.kind).collect()
}

#[test]
fn compound_operators() {
    assert_eq!(
        kinds("** << >> == != <= >= -> && || +="),
        vec![
            TokenKind::ClosedBinOp(ClosedBinOp::StarStar),
            TokenKind::ClosedBinOp(ClosedBinOp::LtLt),
            TokenKind::ClosedBinOp(ClosedBinOp::GtGt),
            TokenKind::ComparisonOp(ComparisonOp::EqEq),
            TokenKind::ComparisonOp(ComparisonOp::BangEq),
            TokenKind::ComparisonOp(ComparisonOp::LtEq),
            TokenKind::ComparisonOp(ComparisonOp::GtEq),
            TokenKind::Arrow,
            TokenKind::ClosedBinOp(ClosedBinOp::AmpAmp),
            TokenKind::ClosedBinOp(ClosedBinOp::BarBar),
            TokenKind::BinOpEq(ClosedBinOp::Plus),
        ]
    );
}

#[test]
fn compound_assignment_operators() {
    assert_eq!(
        kinds("<<= >>= **= %="),
        vec![
            TokenKind::BinOpEq(ClosedBinOp::LtLt),
            TokenKind::BinOpEq(ClosedBinOp::GtGt),
            TokenKind::BinOpEq(ClosedBinOp::StarStar),
            TokenKind::BinOpEq(ClosedBinOp::Percent),
        ]
    );
}

#[test]
fn keywords_and_idents() {
    assert_eq!(
        kinds("measure q"),
        vec![TokenKind::Keyword(Keyword::Measure), TokenKind::Ident]
    );
    assert_eq!(
        kinds("OPENQASM"),
        vec![TokenKind::Keyword(Keyword::OpenQASM)]
    );
    // Keywords are case sensitive.
    assert_eq!(kinds("Measure"), vec![TokenKind::Ident]);
}

#[test]
fn literals() {
    assert_eq!(
        kinds(r#"1 0x1f 2.5 3im "0110" "abc""#),
        vec![
            TokenKind::Literal(Literal::Integer(Radix::Decimal)),
            TokenKind::Literal(Literal::Integer(Radix::Hex)),
            TokenKind::Literal(Literal::Float),
            TokenKind::Literal(Literal::Imaginary),
            TokenKind::Literal(Literal::Bitstring),
            TokenKind::Literal(Literal::String),
        ]
    );
}

#[test]
fn trivia_is_discarded_but_spans_are_kept() {
    let (tokens, errors) = lex("x  // c\n  y");
    assert!(errors.is_empty());
    assert_eq!(
        tokens,
        vec![
            Token {
                kind: TokenKind::Ident,
                span: Span { lo: 0, hi: 1 },
            },
            Token {
                kind: TokenKind::Ident,
                span: Span { lo: 10, hi: 11 },
            },
        ]
    );
}

#[test]
fn unterminated_string_is_an_error() {
    let (_, errors) = lex(r#""abc"#);
    assert_eq!(
        errors,
        vec![Error::UnterminatedString(Span { lo: 0, hi: 0 })]
    );
}

#[test]
fn unknown_char_is_an_error() {
    let (_, errors) = lex("#");
    assert_eq!(errors, vec![Error::Unknown('#', Span { lo: 0, hi: 1 })]);
}
