// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Writers for the indented tree form the AST `Display` impls produce. Each
//! field writer indents one level relative to the formatter it is given;
//! nesting falls out of `Display` recursion.

use indenter::{indented, Indented};
use qbr_data_structures::span::Span;
use std::fmt::{self, Display, Formatter, Write};

fn set_indentation<'a, 'b>(
    indent: Indented<'a, Formatter<'b>>,
    level: usize,
) -> Indented<'a, Formatter<'b>> {
    match level {
        0 => indent.with_str(""),
        1 => indent.with_str("    "),
        2 => indent.with_str("        "),
        _ => unimplemented!("indentation level not supported"),
    }
}

pub(crate) fn writeln_header(f: &mut Formatter, name: &str, span: Span) -> fmt::Result {
    writeln!(f, "{name} {span}:")
}

pub(crate) fn write_field<T: Display>(
    f: &mut Formatter,
    field_name: &str,
    value: &T,
) -> fmt::Result {
    let mut indent = set_indentation(indented(f), 1);
    write!(indent, "{field_name}: {value}")
}

pub(crate) fn writeln_field<T: Display>(
    f: &mut Formatter,
    field_name: &str,
    value: &T,
) -> fmt::Result {
    write_field(f, field_name, value)?;
    writeln!(f)
}

pub(crate) fn write_opt_field<T: Display>(
    f: &mut Formatter,
    field_name: &str,
    opt_value: Option<&T>,
) -> fmt::Result {
    if let Some(value) = opt_value {
        write_field(f, field_name, value)
    } else {
        write_field(f, field_name, &"<none>")
    }
}

pub(crate) fn writeln_opt_field<T: Display>(
    f: &mut Formatter,
    field_name: &str,
    opt_value: Option<&T>,
) -> fmt::Result {
    write_opt_field(f, field_name, opt_value)?;
    writeln!(f)
}

pub(crate) fn write_list_field<T: Display>(
    f: &mut Formatter,
    field_name: &str,
    vals: &[T],
) -> fmt::Result {
    if vals.is_empty() {
        let mut indent = set_indentation(indented(f), 1);
        return write!(indent, "{field_name}: <empty>");
    }
    let mut indent = set_indentation(indented(f), 1);
    writeln!(indent, "{field_name}:")?;
    let mut indent = set_indentation(indented(f), 2);
    if let Some((last, most)) = vals.split_last() {
        for val in most {
            writeln!(indent, "{val}")?;
        }
        write!(indent, "{last}")?;
    }
    Ok(())
}

pub(crate) fn writeln_list_field<T: Display>(
    f: &mut Formatter,
    field_name: &str,
    vals: &[T],
) -> fmt::Result {
    write_list_field(f, field_name, vals)?;
    writeln!(f)
}

