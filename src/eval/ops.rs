/// Operator semantics: arithmetic, bitwise, comparison, membership and subscription
///
/// Integer arithmetic is 64-bit and checked; overflow surfaces as `OverflowError`
/// instead of wrapping or silently promoting.

use crate::eval::ast::{BinOp, CmpOp, UnaryOp};
use crate::eval::error::{EvalError, EvalResult};
use crate::eval::value::{Dict, Value};

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn overflow() -> EvalError {
    EvalError::Overflow("integer result does not fit in 64 bits".to_string())
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> EvalError {
    EvalError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

/// Guard for sizes of produced sequences and strings
pub fn check_len(len: usize, max_len: usize) -> EvalResult<()> {
    if len > max_len {
        return Err(EvalError::Limit(format!(
            "result of length {} exceeds the limit of {}",
            len, max_len
        )));
    }
    Ok(())
}

pub fn binary(op: BinOp, left: &Value, right: &Value, max_len: usize) -> EvalResult<Value> {
    if let (Some(a), Some(b)) = (num(left), num(right)) {
        if matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) {
            if let (Value::Bool(x), Value::Bool(y)) = (left, right) {
                return Ok(Value::Bool(match op {
                    BinOp::BitAnd => x & y,
                    BinOp::BitOr => x | y,
                    _ => x ^ y,
                }));
            }
        }
        return numeric(op, a, b).map_err(|e| match e {
            EvalError::Type(_) => unsupported(op, left, right),
            other => other,
        });
    }

    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len(), max_len)?;
            Ok(Value::Str(format!("{}{}", a, b)))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            check_len(a.len() + b.len(), max_len)?;
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            check_len(a.len() + b.len(), max_len)?;
            Ok(Value::Tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
            if matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                && matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            repeat(seq, count.as_int().unwrap_or(0), max_len)
        }
        (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut merged = a.clone();
            for (k, v) in b.iter() {
                merged.insert(k.clone(), v.clone())?;
            }
            Ok(Value::Dict(merged))
        }
        _ => Err(unsupported(op, left, right)),
    }
}

fn repeat(seq: &Value, times: i64, max_len: usize) -> EvalResult<Value> {
    let times = usize::try_from(times.max(0)).map_err(|_| overflow())?;
    let unit = match seq {
        Value::Str(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        _ => 0,
    };
    check_len(unit.saturating_mul(times), max_len)?;
    Ok(match seq {
        Value::Str(s) => Value::Str(s.repeat(times)),
        Value::List(items) => Value::List(repeat_items(items, times)),
        Value::Tuple(items) => Value::Tuple(repeat_items(items, times)),
        other => other.clone(),
    })
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    std::iter::repeat(items).take(times).flatten().cloned().collect()
}

fn numeric(op: BinOp, a: Num, b: Num) -> EvalResult<Value> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(op, x, y),
        (x, y) => {
            let x = match x {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            let y = match y {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            float_op(op, x, y)
        }
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> EvalResult<Value> {
    let result = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div => return float_op(op, x as f64, y as f64),
        BinOp::FloorDiv => floor_div(x, y)?,
        BinOp::Mod => floor_mod(x, y)?,
        BinOp::Pow => return int_pow(x, y),
        BinOp::LShift => {
            if y < 0 {
                return Err(EvalError::value_error("negative shift count"));
            }
            if x == 0 {
                0
            } else {
                let shift = u32::try_from(y).ok().filter(|s| *s < 64).ok_or_else(overflow)?;
                let shifted = x << shift;
                if shifted >> shift != x {
                    return Err(overflow());
                }
                shifted
            }
        }
        BinOp::RShift => {
            if y < 0 {
                return Err(EvalError::value_error("negative shift count"));
            }
            if y >= 64 {
                if x < 0 {
                    -1
                } else {
                    0
                }
            } else {
                x >> y
            }
        }
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::MatMul => return Err(EvalError::type_error("matrix multiplication is not supported")),
    };
    Ok(Value::Int(result))
}

/// Python floor division on integers
pub fn floor_div(x: i64, y: i64) -> EvalResult<i64> {
    if y == 0 {
        return Err(EvalError::ZeroDivision("integer division or modulo by zero".to_string()));
    }
    let q = x.checked_div(y).ok_or_else(overflow)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Python modulo on integers; the result takes the sign of the divisor
pub fn floor_mod(x: i64, y: i64) -> EvalResult<i64> {
    if y == 0 {
        return Err(EvalError::ZeroDivision("integer division or modulo by zero".to_string()));
    }
    let r = x.checked_rem(y).unwrap_or(0);
    if r != 0 && ((r < 0) != (y < 0)) {
        Ok(r + y)
    } else {
        Ok(r)
    }
}

fn int_pow(base: i64, exp: i64) -> EvalResult<Value> {
    if exp < 0 {
        if base == 0 {
            return Err(EvalError::ZeroDivision(
                "0.0 cannot be raised to a negative power".to_string(),
            ));
        }
        return Ok(Value::Float((base as f64).powf(exp as f64)));
    }
    match base {
        0 | 1 => return Ok(Value::Int(if exp == 0 { 1 } else { base })),
        -1 => return Ok(Value::Int(if exp % 2 == 0 { 1 } else { -1 })),
        _ => {}
    }
    let exp = u32::try_from(exp).map_err(|_| overflow())?;
    base.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
}

fn float_op(op: BinOp, x: f64, y: f64) -> EvalResult<Value> {
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision("division by zero".to_string()));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision("float floor division by zero".to_string()));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision("float modulo".to_string()));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(EvalError::ZeroDivision(
                    "0.0 cannot be raised to a negative power".to_string(),
                ));
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(EvalError::value_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            let r = x.powf(y);
            if r.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(EvalError::Overflow("numerical result out of range".to_string()));
            }
            r
        }
        _ => return Err(EvalError::type_error("unsupported float operation")),
    };
    Ok(Value::Float(result))
}

pub fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v @ (Value::Int(_) | Value::Bool(_))) => {
            v.as_int().unwrap_or(0).checked_neg().map(Value::Int).ok_or_else(overflow)
        }
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Bool(_))) => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (UnaryOp::Invert, v @ (Value::Int(_) | Value::Bool(_))) => Ok(Value::Int(!v.as_int().unwrap_or(0))),
        (op, v) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(EvalError::type_error(format!("bad operand type for unary {}: '{}'", symbol, v.type_name())))
        }
    }
}

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
    use std::cmp::Ordering::*;
    Ok(match op {
        CmpOp::Eq => left == right,
        CmpOp::NotEq => left != right,
        CmpOp::Lt => left.compare(right)? == Less,
        CmpOp::LtE => left.compare(right)? != Greater,
        CmpOp::Gt => left.compare(right)? == Greater,
        CmpOp::GtE => left.compare(right)? != Less,
        CmpOp::Is => identical(left, right),
        CmpOp::IsNot => !identical(left, right),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
    })
}

/// Values have no addresses here, so identity is equality within the same type
fn identical(left: &Value, right: &Value) -> bool {
    left.type_name() == right.type_name() && left == right
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(EvalError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) => Ok(items.contains(item)),
        Value::Dict(d) => {
            if !item.is_hashable() {
                return Err(EvalError::type_error(format!("unhashable type: '{}'", item.type_name())));
            }
            Ok(d.contains_key(item))
        }
        other => Err(EvalError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: i64, len: usize, kind: &str) -> EvalResult<usize> {
    let len = len as i64;
    let adjusted = if index < 0 { index + len } else { index };
    if adjusted < 0 || adjusted >= len {
        return Err(EvalError::Index(format!("{} index out of range", kind)));
    }
    Ok(adjusted as usize)
}

pub fn subscript(value: &Value, index: &Value) -> EvalResult<Value> {
    match value {
        Value::List(items) | Value::Tuple(items) => {
            let kind = if matches!(value, Value::List(_)) { "list" } else { "tuple" };
            let i = index.as_int().ok_or_else(|| {
                EvalError::type_error(format!(
                    "{} indices must be integers or slices, not {}",
                    kind,
                    index.type_name()
                ))
            })?;
            Ok(items[normalize_index(i, items.len(), kind)?].clone())
        }
        Value::Str(s) => {
            let i = index.as_int().ok_or_else(|| {
                EvalError::type_error(format!("string indices must be integers, not '{}'", index.type_name()))
            })?;
            let count = s.chars().count();
            let at = normalize_index(i, count, "string")?;
            Ok(Value::Str(s.chars().nth(at).map(String::from).unwrap_or_default()))
        }
        Value::Dict(d) => {
            if !index.is_hashable() {
                return Err(EvalError::type_error(format!("unhashable type: '{}'", index.type_name())));
            }
            d.get(index).cloned().ok_or_else(|| EvalError::Key(index.repr()))
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Indices selected by `[lower:upper:step]` on a sequence of length `len`
pub fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> EvalResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let b = if bound < 0 { bound + len } else { bound };
        b.clamp(low, high)
    };
    let (start, stop) = if step > 0 {
        (
            lower.map(|l| clamp(l, 0, len)).unwrap_or(0),
            upper.map(|u| clamp(u, 0, len)).unwrap_or(len),
        )
    } else {
        (
            lower.map(|l| clamp(l, -1, len - 1)).unwrap_or(len - 1),
            upper.map(|u| clamp(u, -1, len - 1)).unwrap_or(-1),
        )
    };
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(out)
}

pub fn slice(value: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> EvalResult<Value> {
    match value {
        Value::List(items) => {
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::List(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::Tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), lower, upper, step)?;
            Ok(Value::Str(picked.into_iter().map(|i| chars[i]).collect()))
        }
        other => Err(EvalError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Merge helper for `dict(mapping, **kwargs)`
pub fn dict_from_pairs(pairs: Vec<Value>) -> EvalResult<Dict> {
    let mut dict = Dict::new();
    for (n, pair) in pairs.into_iter().enumerate() {
        match pair {
            Value::List(kv) | Value::Tuple(kv) if kv.len() == 2 => {
                let mut kv = kv.into_iter();
                let key = kv.next().unwrap_or(Value::None);
                let value = kv.next().unwrap_or(Value::None);
                dict.insert(key, value)?;
            }
            other => {
                return Err(EvalError::value_error(format!(
                    "dictionary update sequence element #{} has wrong shape: {}",
                    n,
                    other.repr()
                )))
            }
        }
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1_000;

    fn bin(op: BinOp, a: Value, b: Value) -> EvalResult<Value> {
        binary(op, &a, &b, MAX)
    }

    #[test]
    fn integer_division_floors_toward_negative_infinity() {
        assert_eq!(bin(BinOp::FloorDiv, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(bin(BinOp::Mod, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(1));
        assert_eq!(bin(BinOp::Mod, Value::Int(7), Value::Int(-2)).unwrap(), Value::Int(-1));
        assert_eq!(bin(BinOp::Div, Value::Int(7), Value::Int(2)).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn overflow_and_zero_division_are_errors() {
        assert!(matches!(
            bin(BinOp::Mul, Value::Int(i64::MAX), Value::Int(2)),
            Err(EvalError::Overflow(_))
        ));
        assert!(matches!(bin(BinOp::Pow, Value::Int(10), Value::Int(40)), Err(EvalError::Overflow(_))));
        assert!(matches!(bin(BinOp::Div, Value::Int(1), Value::Int(0)), Err(EvalError::ZeroDivision(_))));
        assert!(matches!(bin(BinOp::Mod, Value::Float(1.0), Value::Int(0)), Err(EvalError::ZeroDivision(_))));
    }

    #[test]
    fn sequence_repetition_respects_limit() {
        assert_eq!(bin(BinOp::Mul, Value::str("ab"), Value::Int(2)).unwrap(), Value::str("abab"));
        assert_eq!(bin(BinOp::Mul, Value::Int(-1), Value::List(vec![Value::Int(1)])).unwrap(), Value::List(vec![]));
        assert!(matches!(bin(BinOp::Mul, Value::str("ab"), Value::Int(10_000)), Err(EvalError::Limit(_))));
    }

    #[test]
    fn list_and_tuple_repetition_clone_items() {
        let list = Value::List(vec![Value::Int(1), Value::str("x")]);
        assert_eq!(
            bin(BinOp::Mul, list, Value::Int(2)).unwrap(),
            Value::List(vec![Value::Int(1), Value::str("x"), Value::Int(1), Value::str("x")])
        );
        let tuple = Value::Tuple(vec![Value::None]);
        assert_eq!(bin(BinOp::Mul, Value::Int(3), tuple).unwrap(), Value::Tuple(vec![Value::None; 3]));
    }

    #[test]
    fn string_repetition_limit_counts_chars() {
        // 500 two-byte chars: 1000 chars would fit, 2000 bytes would not
        assert!(bin(BinOp::Mul, Value::str("é"), Value::Int(1_000)).is_ok());
        assert!(matches!(bin(BinOp::Mul, Value::str("é"), Value::Int(1_001)), Err(EvalError::Limit(_))));
    }

    #[test]
    fn huge_slice_steps_stop_instead_of_overflowing() {
        let items = Value::List((1..=6).map(Value::Int).collect());
        assert_eq!(slice(&items, Some(5), None, Some(i64::MAX)).unwrap(), Value::List(vec![Value::Int(6)]));
        assert_eq!(slice(&items, Some(0), None, Some(i64::MAX)).unwrap(), Value::List(vec![Value::Int(1)]));
        assert_eq!(slice(&items, Some(-1), None, Some(i64::MIN)).unwrap(), Value::List(vec![Value::Int(6)]));
        assert_eq!(slice(&Value::str("abc"), Some(1), None, Some(i64::MAX)).unwrap(), Value::str("b"));
    }

    #[test]
    fn mixed_types_are_type_errors() {
        let err = bin(BinOp::Add, Value::Int(1), Value::str("a")).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unsupported operand type(s) for +: 'int' and 'str'");
        assert!(matches!(bin(BinOp::MatMul, Value::Int(1), Value::Int(2)), Err(EvalError::Type(_))));
    }

    #[test]
    fn negative_slices_walk_backwards() {
        let v = Value::List((0..5).map(Value::Int).collect());
        assert_eq!(
            slice(&v, None, None, Some(-1)).unwrap(),
            Value::List((0..5).rev().map(Value::Int).collect())
        );
        assert_eq!(slice(&Value::str("hello"), Some(1), Some(-1), None).unwrap(), Value::str("ell"));
        assert!(slice(&v, None, None, Some(0)).is_err());
    }

    #[test]
    fn membership_and_identity() {
        assert!(compare(CmpOp::In, &Value::str("ell"), &Value::str("hello")).unwrap());
        assert!(compare(CmpOp::NotIn, &Value::Int(3), &Value::List(vec![Value::Int(1)])).unwrap());
        assert!(compare(CmpOp::Is, &Value::None, &Value::None).unwrap());
        assert!(!compare(CmpOp::Is, &Value::Int(1), &Value::Bool(true)).unwrap());
        assert!(compare(CmpOp::In, &Value::Int(1), &Value::Int(2)).is_err());
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let v = Value::Tuple(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(subscript(&v, &Value::Int(-1)).unwrap(), Value::Int(2));
        assert!(matches!(subscript(&v, &Value::Int(2)), Err(EvalError::Index(_))));
    }
}
