// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The source-to-IR front end: a two-phase lexer and a recursive-descent
//! parser with Pratt expression parsing, producing the abstract program tree
//! in [`ast`]. Parsing never panics; malformed input produces error
//! diagnostics alongside a best-effort tree.

#![warn(clippy::mod_module_files, clippy::pedantic, clippy::unwrap_used)]

pub mod ast;
mod display_utils;
pub mod keyword;
pub mod lex;
mod parser;

use ast::Program;
use lex::TokenKind;
use miette::Diagnostic;
use qbr_data_structures::span::Span;
use thiserror::Error as ThisError;

/// Parses the given source as a complete program. Returns the best-effort
/// tree along with all errors encountered; an error-free parse returns an
/// empty vector.
#[must_use]
pub fn parse(input: &str) -> (Program, Vec<Error>) {
    let mut scanner = parser::scan::ParserContext::new(input);
    let program = parser::program(&mut scanner);
    (program, scanner.into_errors())
}

#[derive(Clone, Debug, Diagnostic, Eq, PartialEq, ThisError)]
#[error(transparent)]
#[diagnostic(transparent)]
pub struct Error(pub ErrorKind);

#[derive(Clone, Debug, Diagnostic, Eq, PartialEq, ThisError)]
pub enum ErrorKind {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lex(lex::Error),
    #[error("invalid {0} literal")]
    #[diagnostic(code("Qbr.Parse.Literal"))]
    Lit(&'static str, #[label] Span),
    #[error("unknown escape sequence: `{0}`")]
    #[diagnostic(code("Qbr.Parse.Escape"))]
    Escape(char, #[label] Span),
    #[error("expected {0}, found {1}")]
    #[diagnostic(code("Qbr.Parse.Token"))]
    Token(TokenKind, TokenKind, #[label] Span),
    #[error("expected {0}, found {1}")]
    #[diagnostic(code("Qbr.Parse.Rule"))]
    Rule(&'static str, TokenKind, #[label] Span),
    #[error("expected {0}, found {1}")]
    #[diagnostic(code("Qbr.Parse.Convert"))]
    Convert(&'static str, &'static str, #[label] Span),
    #[error("missing entry in sequence")]
    #[diagnostic(code("Qbr.Parse.MissingSeqEntry"))]
    MissingSeqEntry(#[label] Span),
}
