// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The second lexing phase "cooks" a raw token stream, transforming it into
//! tokens that directly correspond to components in the grammar. Keywords are
//! classified, compound operators are fused, and strings made entirely of
//! binary digits become bitstring literals.
//!
//! Whitespace and comment tokens are discarded; this means that cooked tokens
//! are not necessarily contiguous, so they include both a starting and ending
//! byte offset.
//!
//! Tokens never contain substrings from the original input, but are simply
//! labels that refer back to regions in the input. Lexing never fails, but
//! may produce error tokens.

#[cfg(test)]
mod tests;

use super::{
    raw::{self, Number, Single},
    Delim, Radix,
};
use crate::keyword::Keyword;
use enum_iterator::Sequence;
use miette::Diagnostic;
use qbr_data_structures::span::Span;
use std::{
    fmt::{self, Display, Formatter},
    iter::Peekable,
};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: Span,
}

#[derive(Clone, Copy, Debug, Diagnostic, Eq, Error, PartialEq)]
pub enum Error {
    #[error("unterminated string literal")]
    #[diagnostic(code("Qbr.Lex.UnterminatedString"))]
    UnterminatedString(#[label] Span),

    #[error("unrecognized character `{0}`")]
    #[diagnostic(code("Qbr.Lex.UnknownChar"))]
    Unknown(char, #[label] Span),
}

impl Error {
    pub(crate) fn with_offset(self, offset: u32) -> Self {
        match self {
            Self::UnterminatedString(span) => Self::UnterminatedString(span + offset),
            Self::Unknown(c, span) => Self::Unknown(c, span + offset),
        }
    }
}

/// A token kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
pub enum TokenKind {
    /// `->`
    Arrow,
    /// `@`
    At,
    /// `!`
    Bang,
    /// A closed binary operator followed by an equals token.
    BinOpEq(ClosedBinOp),
    /// A closing delimiter.
    Close(Delim),
    /// A closed binary operator not followed by an equals token.
    ClosedBinOp(ClosedBinOp),
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// A comparison operator.
    ComparisonOp(ComparisonOp),
    /// `.`
    Dot,
    /// End of file.
    Eof,
    /// `=`
    Eq,
    /// An identifier.
    Ident,
    /// A keyword.
    Keyword(Keyword),
    /// A literal.
    Literal(Literal),
    /// An opening delimiter.
    Open(Delim),
    /// `?`
    Question,
    /// `;`
    Semi,
    /// `~`
    Tilde,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TokenKind::Arrow => f.write_str("`->`"),
            TokenKind::At => f.write_str("`@`"),
            TokenKind::Bang => f.write_str("`!`"),
            TokenKind::BinOpEq(op) => write!(f, "`{op}=`"),
            TokenKind::Close(Delim::Brace) => f.write_str("`}`"),
            TokenKind::Close(Delim::Bracket) => f.write_str("`]`"),
            TokenKind::Close(Delim::Paren) => f.write_str("`)`"),
            TokenKind::ClosedBinOp(op) => write!(f, "`{op}`"),
            TokenKind::Colon => f.write_str("`:`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::ComparisonOp(op) => write!(f, "`{op}`"),
            TokenKind::Dot => f.write_str("`.`"),
            TokenKind::Eof => f.write_str("EOF"),
            TokenKind::Eq => f.write_str("`=`"),
            TokenKind::Ident => f.write_str("identifier"),
            TokenKind::Keyword(keyword) => write!(f, "keyword `{keyword}`"),
            TokenKind::Literal(literal) => write!(f, "{literal}"),
            TokenKind::Open(Delim::Brace) => f.write_str("`{`"),
            TokenKind::Open(Delim::Bracket) => f.write_str("`[`"),
            TokenKind::Open(Delim::Paren) => f.write_str("`(`"),
            TokenKind::Question => f.write_str("`?`"),
            TokenKind::Semi => f.write_str("`;`"),
            TokenKind::Tilde => f.write_str("`~`"),
        }
    }
}

/// A literal token.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
pub enum Literal {
    Bitstring,
    Float,
    Imaginary,
    Integer(Radix),
    String,
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Literal::Bitstring => "bitstring",
            Literal::Float => "float",
            Literal::Imaginary => "imaginary number",
            Literal::Integer(_) => "integer",
            Literal::String => "string",
        })
    }
}

/// A binary operator that returns the same type as the type of its first
/// operand; in other words, the domain of the first operand is closed under
/// this operation. These are candidates for compound assignment operators,
/// like `+=`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
pub enum ClosedBinOp {
    /// `&`
    Amp,
    /// `&&`
    AmpAmp,
    /// `|`
    Bar,
    /// `||`
    BarBar,
    /// `^`
    Caret,
    /// `>>`
    GtGt,
    /// `<<`
    LtLt,
    /// `-`
    Minus,
    /// `%`
    Percent,
    /// `+`
    Plus,
    /// `/`
    Slash,
    /// `*`
    Star,
    /// `**`
    StarStar,
}

impl Display for ClosedBinOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            ClosedBinOp::Amp => "&",
            ClosedBinOp::AmpAmp => "&&",
            ClosedBinOp::Bar => "|",
            ClosedBinOp::BarBar => "||",
            ClosedBinOp::Caret => "^",
            ClosedBinOp::GtGt => ">>",
            ClosedBinOp::LtLt => "<<",
            ClosedBinOp::Minus => "-",
            ClosedBinOp::Percent => "%",
            ClosedBinOp::Plus => "+",
            ClosedBinOp::Slash => "/",
            ClosedBinOp::Star => "*",
            ClosedBinOp::StarStar => "**",
        })
    }
}

/// A comparison operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
pub enum ComparisonOp {
    /// `!=`
    BangEq,
    /// `==`
    EqEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
}

impl Display for ComparisonOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            ComparisonOp::BangEq => "!=",
            ComparisonOp::EqEq => "==",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
        })
    }
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    len: u32,

    // This uses a `Peekable` iterator over the raw lexer, which allows for one
    // token lookahead.
    tokens: Peekable<raw::Lexer<'a>>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            len: input
                .len()
                .try_into()
                .expect("input length should fit into u32"),
            tokens: raw::Lexer::new(input).peekable(),
        }
    }

    fn offset(&mut self) -> u32 {
        self.tokens.peek().map_or_else(|| self.len, |t| t.offset)
    }

    fn next_if_eq(&mut self, single: Single) -> bool {
        self.tokens
            .next_if(|t| t.kind == raw::TokenKind::Single(single))
            .is_some()
    }

    fn cook(&mut self, token: &raw::Token) -> Result<Option<Token>, Error> {
        let kind = match token.kind {
            raw::TokenKind::Comment | raw::TokenKind::Whitespace => Ok(None),
            raw::TokenKind::Ident => {
                let ident = &self.input[(token.offset as usize)..(self.offset() as usize)];
                Ok(Some(ident_kind(ident)))
            }
            raw::TokenKind::Number(number) => Ok(Some(TokenKind::Literal(match number {
                Number::Float => Literal::Float,
                Number::Imaginary => Literal::Imaginary,
                Number::Int(radix) => Literal::Integer(radix),
            }))),
            raw::TokenKind::Single(single) => Ok(Some(self.single(single))),
            raw::TokenKind::String { terminated: true } => {
                let lexeme = &self.input[(token.offset as usize)..(self.offset() as usize)];
                Ok(Some(TokenKind::Literal(string_kind(lexeme))))
            }
            raw::TokenKind::String { terminated: false } => Err(Error::UnterminatedString(Span {
                lo: token.offset,
                hi: token.offset,
            })),
            raw::TokenKind::Unknown => {
                let c = self.input[(token.offset as usize)..]
                    .chars()
                    .next()
                    .expect("token offset should be the start of a character");
                let span = Span {
                    lo: token.offset,
                    hi: self.offset(),
                };
                Err(Error::Unknown(c, span))
            }
        }?;

        Ok(kind.map(|kind| {
            let span = Span {
                lo: token.offset,
                hi: self.offset(),
            };
            Token { kind, span }
        }))
    }

    fn single(&mut self, single: Single) -> TokenKind {
        match single {
            Single::Amp => {
                if self.next_if_eq(Single::Amp) {
                    TokenKind::ClosedBinOp(ClosedBinOp::AmpAmp)
                } else {
                    self.closed_bin_op(ClosedBinOp::Amp)
                }
            }
            Single::At => TokenKind::At,
            Single::Bang => {
                if self.next_if_eq(Single::Eq) {
                    TokenKind::ComparisonOp(ComparisonOp::BangEq)
                } else {
                    TokenKind::Bang
                }
            }
            Single::Bar => {
                if self.next_if_eq(Single::Bar) {
                    TokenKind::ClosedBinOp(ClosedBinOp::BarBar)
                } else {
                    self.closed_bin_op(ClosedBinOp::Bar)
                }
            }
            Single::Caret => self.closed_bin_op(ClosedBinOp::Caret),
            Single::Close(delim) => TokenKind::Close(delim),
            Single::Colon => TokenKind::Colon,
            Single::Comma => TokenKind::Comma,
            Single::Dot => TokenKind::Dot,
            Single::Eq => {
                if self.next_if_eq(Single::Eq) {
                    TokenKind::ComparisonOp(ComparisonOp::EqEq)
                } else {
                    TokenKind::Eq
                }
            }
            Single::Gt => {
                if self.next_if_eq(Single::Eq) {
                    TokenKind::ComparisonOp(ComparisonOp::GtEq)
                } else if self.next_if_eq(Single::Gt) {
                    self.closed_bin_op(ClosedBinOp::GtGt)
                } else {
                    TokenKind::ComparisonOp(ComparisonOp::Gt)
                }
            }
            Single::Lt => {
                if self.next_if_eq(Single::Eq) {
                    TokenKind::ComparisonOp(ComparisonOp::LtEq)
                } else if self.next_if_eq(Single::Lt) {
                    self.closed_bin_op(ClosedBinOp::LtLt)
                } else {
                    TokenKind::ComparisonOp(ComparisonOp::Lt)
                }
            }
            Single::Minus => {
                if self.next_if_eq(Single::Gt) {
                    TokenKind::Arrow
                } else {
                    self.closed_bin_op(ClosedBinOp::Minus)
                }
            }
            Single::Open(delim) => TokenKind::Open(delim),
            Single::Percent => self.closed_bin_op(ClosedBinOp::Percent),
            Single::Plus => self.closed_bin_op(ClosedBinOp::Plus),
            Single::Question => TokenKind::Question,
            Single::Semi => TokenKind::Semi,
            Single::Slash => self.closed_bin_op(ClosedBinOp::Slash),
            Single::Star => {
                if self.next_if_eq(Single::Star) {
                    self.closed_bin_op(ClosedBinOp::StarStar)
                } else {
                    self.closed_bin_op(ClosedBinOp::Star)
                }
            }
            Single::Tilde => TokenKind::Tilde,
        }
    }

    fn closed_bin_op(&mut self, op: ClosedBinOp) -> TokenKind {
        if self.next_if_eq(Single::Eq) {
            TokenKind::BinOpEq(op)
        } else {
            TokenKind::ClosedBinOp(op)
        }
    }
}

fn ident_kind(ident: &str) -> TokenKind {
    ident
        .parse()
        .map(TokenKind::Keyword)
        .unwrap_or(TokenKind::Ident)
}

/// A string made only of binary digits (and separators) is a bitstring
/// literal; the distinction is made here so the parser never re-reads the
/// input.
fn string_kind(lexeme: &str) -> Literal {
    let contents = &lexeme[1..lexeme.len() - 1];
    if !contents.is_empty()
        && contents.chars().all(|c| c == '0' || c == '1' || c == '_')
        && contents.chars().any(|c| c != '_')
    {
        Literal::Bitstring
    } else {
        Literal::String
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(token) = self.tokens.next() {
            match self.cook(&token) {
                Ok(None) => {}
                Ok(Some(token)) => return Some(Ok(token)),
                Err(err) => return Some(Err(err)),
            }
        }

        None
    }
}
