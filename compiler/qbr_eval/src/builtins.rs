// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The built-in gate table and classical built-in functions. Gate names are
//! the standard-gates surface; the classical functions are the numeric
//! built-ins of the language.

use crate::{
    path::Gate,
    val::{BitArray, IntValue, Value},
};

/// Looks up a built-in gate by source name.
#[must_use]
pub(crate) fn gate_by_name(name: &str) -> Option<Gate> {
    Some(match name {
        "id" => Gate::Id,
        "x" => Gate::X,
        "y" => Gate::Y,
        "z" => Gate::Z,
        "h" => Gate::H,
        "s" => Gate::S,
        "sdg" => Gate::Sdg,
        "t" => Gate::T,
        "tdg" => Gate::Tdg,
        "rx" => Gate::Rx,
        "ry" => Gate::Ry,
        "rz" => Gate::Rz,
        "u" | "U" => Gate::U,
        "cx" | "cnot" | "CX" => Gate::Cx,
        "cz" => Gate::Cz,
        "swap" => Gate::Swap,
        "ccx" => Gate::Ccx,
        "phase" | "p" => Gate::Phase,
        "gphase" => Gate::GPhase,
        _ => return None,
    })
}

pub(crate) enum MathError {
    Arity(usize),
    Domain(&'static str),
}

/// Evaluates a classical built-in function, or returns `None` if the name is
/// not a built-in.
pub(crate) fn call_math(name: &str, args: &[Value]) -> Option<Result<Value, MathError>> {
    let result = match name {
        "arccos" => unary_float(args, f64::acos),
        "arcsin" => unary_float(args, f64::asin),
        "arctan" => unary_float(args, f64::atan),
        "ceiling" => unary_float(args, f64::ceil),
        "cos" => unary_float(args, f64::cos),
        "exp" => unary_float(args, f64::exp),
        "floor" => unary_float(args, f64::floor),
        "log" => unary_float(args, f64::ln),
        "sin" => unary_float(args, f64::sin),
        "sqrt" => unary_float(args, f64::sqrt),
        "tan" => unary_float(args, f64::tan),
        "mod" => binary_mod(args),
        "pow" => binary_pow(args),
        "popcount" => popcount(args),
        _ => return None,
    };
    Some(result)
}

fn unary_float(args: &[Value], f: impl FnOnce(f64) -> f64) -> Result<Value, MathError> {
    let [arg] = args else {
        return Err(MathError::Arity(1));
    };
    let value = arg
        .as_float()
        .ok_or(MathError::Domain("expected a numeric argument"))?;
    Ok(Value::Float(f(value)))
}

fn binary_mod(args: &[Value]) -> Result<Value, MathError> {
    let [lhs, rhs] = args else {
        return Err(MathError::Arity(2));
    };
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        if b.value == 0 {
            return Err(MathError::Domain("mod by zero"));
        }
        return Ok(Value::Int(IntValue::wrap(
            a.width.max(b.width),
            a.signed || b.signed,
            a.value.wrapping_rem(b.value),
        )));
    }
    let a = lhs
        .as_float()
        .ok_or(MathError::Domain("expected a numeric argument"))?;
    let b = rhs
        .as_float()
        .ok_or(MathError::Domain("expected a numeric argument"))?;
    Ok(Value::Float(a % b))
}

fn binary_pow(args: &[Value]) -> Result<Value, MathError> {
    let [lhs, rhs] = args else {
        return Err(MathError::Arity(2));
    };
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        if b.value >= 0 {
            let exponent = u32::try_from(b.value).unwrap_or(u32::MAX);
            return Ok(Value::Int(IntValue::wrap(
                a.width.max(b.width),
                a.signed || b.signed,
                a.value.wrapping_pow(exponent),
            )));
        }
    }
    let a = lhs
        .as_float()
        .ok_or(MathError::Domain("expected a numeric argument"))?;
    let b = rhs
        .as_float()
        .ok_or(MathError::Domain("expected a numeric argument"))?;
    Ok(Value::Float(a.powf(b)))
}

fn popcount(args: &[Value]) -> Result<Value, MathError> {
    let [arg] = args else {
        return Err(MathError::Arity(1));
    };
    let bits = match arg {
        Value::BitArray(BitArray { bits, .. }) => *bits,
        #[allow(clippy::cast_sign_loss)]
        Value::Int(i) => i.value as u64,
        _ => return Err(MathError::Domain("expected a bit register or integer")),
    };
    Ok(Value::Int(IntValue {
        width: 64,
        signed: false,
        value: i64::from(bits.count_ones()),
    }))
}
