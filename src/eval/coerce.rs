/// Caller-side coercions between loosely typed node inputs and concrete values

use crate::eval::value::Value;
use thiserror::Error;

/// Value that cannot be converted to the requested type
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value for {target} conversion: {value}")]
pub struct CoercionError {
    pub target: &'static str,
    pub value: String,
}

impl CoercionError {
    fn new(target: &'static str, value: &Value) -> Self {
        Self { target, value: value.repr() }
    }
}

const TRUE_WORDS: &[&str] = &["yes", "y", "true", "t", "1"];
const FALSE_WORDS: &[&str] = &["no", "n", "false", "f", "0", "0.0", "", "none", "[]", "{}"];

/// Boolean from a fixed, case-insensitive vocabulary of textual forms
pub fn cbool(value: &Value) -> Result<bool, CoercionError> {
    let text = value.to_string().to_lowercase();
    if TRUE_WORDS.contains(&text.as_str()) {
        Ok(true)
    } else if FALSE_WORDS.contains(&text.as_str()) {
        Ok(false)
    } else {
        Err(CoercionError::new("boolean", value))
    }
}

/// Integer rounded half away from zero; containers coerce to their length
pub fn cint(value: &Value) -> Result<i64, CoercionError> {
    let number = match value {
        Value::Str(s) if s.trim().is_empty() => return Ok(0),
        Value::Str(s) => match s.trim().parse::<f64>() {
            Ok(f) => f,
            Err(_) => return Ok(s.chars().count() as i64),
        },
        Value::List(items) | Value::Tuple(items) => return Ok(items.len() as i64),
        Value::Dict(d) => return Ok(d.len() as i64),
        v => v.as_float().ok_or_else(|| CoercionError::new("integer", value))?,
    };
    if !number.is_finite() {
        return Err(CoercionError::new("integer", value));
    }
    let rounded = if number > 0.0 { (number + 0.5).floor() } else { (number - 0.5).ceil() };
    if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return Err(CoercionError::new("integer", value));
    }
    Ok(rounded as i64)
}

/// Float from numbers and numeric strings
pub fn cfloat(value: &Value) -> Result<f64, CoercionError> {
    match value {
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| CoercionError::new("float", value)),
        v => v.as_float().ok_or_else(|| CoercionError::new("float", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbool_accepts_only_known_words() {
        for truthy in ["Yes", "y", "TRUE", "t", "1"] {
            assert_eq!(cbool(&Value::str(truthy)), Ok(true), "{}", truthy);
        }
        assert_eq!(cbool(&Value::Bool(true)), Ok(true));
        assert_eq!(cbool(&Value::Int(1)), Ok(true));
        for falsy in [Value::str("No"), Value::str(""), Value::None, Value::Int(0), Value::Float(0.0)] {
            assert_eq!(cbool(&falsy), Ok(false));
        }
        assert_eq!(cbool(&Value::List(vec![])), Ok(false));
        assert_eq!(cbool(&Value::Dict(Default::default())), Ok(false));
        assert!(cbool(&Value::str("maybe")).is_err());
        assert!(cbool(&Value::Int(2)).is_err());
    }

    #[test]
    fn cint_rounds_half_away_from_zero() {
        assert_eq!(cint(&Value::Float(2.5)), Ok(3));
        assert_eq!(cint(&Value::Float(-2.5)), Ok(-3));
        assert_eq!(cint(&Value::Float(2.4)), Ok(2));
        assert_eq!(cint(&Value::str("3.6")), Ok(4));
        assert_eq!(cint(&Value::str("")), Ok(0));
        assert_eq!(cint(&Value::Bool(true)), Ok(1));
    }

    #[test]
    fn cint_falls_back_to_container_length() {
        assert_eq!(cint(&Value::List(vec![Value::None; 3])), Ok(3));
        assert_eq!(cint(&Value::str("abcd")), Ok(4));
        assert!(cint(&Value::None).is_err());
        assert!(cint(&Value::Float(f64::NAN)).is_err());
    }
}
