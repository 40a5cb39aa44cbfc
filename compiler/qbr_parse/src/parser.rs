// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub(crate) mod expr;
pub(crate) mod prim;
pub(crate) mod scan;
pub(crate) mod stmt;
#[cfg(test)]
pub(crate) mod tests;

use crate::{
    ast::{list_from_iter, Program, Version},
    lex::{Literal, TokenKind},
    Error, ErrorKind,
};
use scan::ParserContext;

pub(crate) type Result<T> = std::result::Result<T, Error>;

pub(crate) trait Parser<T>: FnMut(&mut ParserContext) -> Result<T> {}

impl<T, F: FnMut(&mut ParserContext) -> Result<T>> Parser<T> for F {}

pub(crate) fn program(s: &mut ParserContext) -> Program {
    let lo = s.peek().span.lo;
    let version = opt_version_header(s);

    let mut statements = Vec::new();
    while s.peek().kind != TokenKind::Eof {
        match stmt::parse(s) {
            Ok(statement) => statements.push(statement),
            Err(error) => {
                s.push_error(error);
                s.recover(&[TokenKind::Semi]);
            }
        }
    }

    Program {
        span: s.span(lo),
        version,
        statements: list_from_iter(statements),
    }
}

/// Parses the `OPENQASM 3.0;` header if one is present. Header errors are
/// recorded but do not stop the rest of the program from parsing.
fn opt_version_header(s: &mut ParserContext) -> Option<Version> {
    if prim::token(s, TokenKind::Keyword(crate::keyword::Keyword::OpenQASM)).is_err() {
        return None;
    }

    let version = match version(s) {
        Ok(version) => Some(version),
        Err(error) => {
            s.push_error(error);
            None
        }
    };
    prim::recovering_semi(s);
    version
}

fn version(s: &mut ParserContext) -> Result<Version> {
    let token = s.peek();
    let lexeme = s.read();
    match token.kind {
        TokenKind::Literal(Literal::Float) => {
            let (major, minor) = split_version(lexeme)
                .ok_or(Error(ErrorKind::Lit("version", token.span)))?;
            s.advance();
            Ok(Version {
                major,
                minor: Some(minor),
                span: token.span,
            })
        }
        TokenKind::Literal(Literal::Integer(_)) => {
            let major = lexeme
                .parse()
                .map_err(|_| Error(ErrorKind::Lit("version", token.span)))?;
            s.advance();
            Ok(Version {
                major,
                minor: None,
                span: token.span,
            })
        }
        _ => Err(Error(ErrorKind::Rule("version", token.kind, token.span))),
    }
}

fn split_version(lexeme: &str) -> Option<(u32, u32)> {
    let (major, minor) = lexeme.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}
