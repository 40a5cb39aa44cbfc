// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{
    lex::{Lexer, Token, TokenKind},
    Error, ErrorKind,
};
use qbr_data_structures::span::Span;

#[derive(Debug)]
pub(crate) struct NoBarrierError;

pub(crate) struct ParserContext<'a> {
    input: &'a str,
    tokens: Lexer<'a>,
    barriers: Vec<&'a [TokenKind]>,
    errors: Vec<Error>,
    peek: Token,
    offset: u32,
}

impl<'a> ParserContext<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        let mut tokens = Lexer::new(input);
        let (peek, errors) = next_ok(&mut tokens);
        Self {
            input,
            tokens,
            barriers: Vec::new(),
            errors: errors
                .into_iter()
                .map(|e| Error(ErrorKind::Lex(e)))
                .collect(),
            peek: peek.unwrap_or_else(|| eof(input.len())),
            offset: 0,
        }
    }

    pub(crate) fn peek(&self) -> Token {
        self.peek
    }

    pub(crate) fn read(&self) -> &'a str {
        &self.input[self.peek.span]
    }

    pub(crate) fn span(&self, from: u32) -> Span {
        Span {
            lo: from,
            hi: self.offset,
        }
    }

    pub(crate) fn advance(&mut self) {
        if self.peek.kind != TokenKind::Eof {
            self.offset = self.peek.span.hi;
            let (peek, errors) = next_ok(&mut self.tokens);
            self.errors
                .extend(errors.into_iter().map(|e| Error(ErrorKind::Lex(e))));
            self.peek = peek.unwrap_or_else(|| eof(self.input.len()));
        }
    }

    pub(crate) fn push_barrier(&mut self, tokens: &'a [TokenKind]) {
        self.barriers.push(tokens);
    }

    pub(crate) fn pop_barrier(&mut self) -> Result<(), NoBarrierError> {
        match self.barriers.pop() {
            Some(_) => Ok(()),
            None => Err(NoBarrierError),
        }
    }

    /// Advances the scanner to the next token in `tokens` (consuming it), or
    /// stops before a token that any enclosing barrier is waiting for.
    pub(crate) fn recover(&mut self, tokens: &[TokenKind]) {
        loop {
            let peek = self.peek.kind;
            if tokens.iter().any(|&token| peek == token) {
                self.advance();
                break;
            } else if peek == TokenKind::Eof
                || self
                    .barriers
                    .iter()
                    .any(|tokens| tokens.iter().any(|&token| peek == token))
            {
                break;
            } else {
                self.advance();
            }
        }
    }

    pub(crate) fn push_error(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub(crate) fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}

fn eof(offset: usize) -> Token {
    let offset = offset.try_into().expect("eof offset should fit into u32");
    Token {
        kind: TokenKind::Eof,
        span: Span {
            lo: offset,
            hi: offset,
        },
    }
}

/// Advances the iterator by skipping [`Err`] values until the first [`Ok`]
/// value is found. Returns the found value or [`None`] if the iterator is
/// exhausted. All skipped errors are also accumulated into a vector and
/// returned.
fn next_ok<T, E>(iter: impl Iterator<Item = Result<T, E>>) -> (Option<T>, Vec<E>) {
    let mut errors = Vec::new();
    for result in iter {
        match result {
            Ok(v) => return (Some(v), errors),
            Err(e) => errors.push(e),
        }
    }

    (None, errors)
}
