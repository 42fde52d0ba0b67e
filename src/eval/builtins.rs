/// Whitelisted functions, module attributes and read-only methods
///
/// This table is the complete set of callables an expression can reach. Names not
/// listed here resolve to `NameError`/`AttributeError`; there is no path from an
/// expression to host functions, I/O or reflection.

use crate::eval::error::{EvalError, EvalResult};
use crate::eval::interpreter::Context;
use crate::eval::ops::{self, check_len};
use crate::eval::value::{format_float, Dict, Function, Module, Value};
use crate::eval::ast::BinOp;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::cmp::Ordering;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    All,
    Any,
    Ascii,
    Bin,
    Bool,
    Chr,
    Dict,
    Divmod,
    Enumerate,
    Filter,
    Float,
    Format,
    Hex,
    Int,
    Len,
    List,
    Map,
    Max,
    Min,
    Oct,
    Ord,
    Pow,
    Range,
    Repr,
    Reversed,
    Round,
    Sorted,
    Str,
    Sum,
    Tuple,
    Type,
    Zip,
    RandRange,
    RandInt,
    Choice,
    Shuffle,
    Sample,
    Uniform,
    Random,
    Seed,
    Math(MathFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sqrt,
    Floor,
    Ceil,
    Trunc,
    Fabs,
    Exp,
    Log,
    Log2,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Degrees,
    Radians,
    Hypot,
    Pow,
    Fmod,
    Copysign,
    Isclose,
    Isnan,
    Isinf,
    Isfinite,
    Gcd,
    Lcm,
    Factorial,
    Comb,
    Perm,
    Prod,
    Fsum,
}

const GLOBALS: &[(&str, Builtin)] = &[
    ("abs", Builtin::Abs),
    ("all", Builtin::All),
    ("any", Builtin::Any),
    ("ascii", Builtin::Ascii),
    ("bin", Builtin::Bin),
    ("bool", Builtin::Bool),
    ("chr", Builtin::Chr),
    ("dict", Builtin::Dict),
    ("divmod", Builtin::Divmod),
    ("enumerate", Builtin::Enumerate),
    ("filter", Builtin::Filter),
    ("float", Builtin::Float),
    ("format", Builtin::Format),
    ("hex", Builtin::Hex),
    ("int", Builtin::Int),
    ("len", Builtin::Len),
    ("list", Builtin::List),
    ("map", Builtin::Map),
    ("max", Builtin::Max),
    ("min", Builtin::Min),
    ("oct", Builtin::Oct),
    ("ord", Builtin::Ord),
    ("pow", Builtin::Pow),
    ("range", Builtin::Range),
    ("repr", Builtin::Repr),
    ("reversed", Builtin::Reversed),
    ("round", Builtin::Round),
    ("sorted", Builtin::Sorted),
    ("str", Builtin::Str),
    ("sum", Builtin::Sum),
    ("tuple", Builtin::Tuple),
    ("type", Builtin::Type),
    ("zip", Builtin::Zip),
    ("randrange", Builtin::RandRange),
    ("randint", Builtin::RandInt),
    ("choice", Builtin::Choice),
    ("shuffle", Builtin::Shuffle),
    ("sample", Builtin::Sample),
    ("uniform", Builtin::Uniform),
    ("rnd", Builtin::Random),
    ("seed", Builtin::Seed),
];

const RANDOM_ATTRS: &[(&str, Builtin)] = &[
    ("random", Builtin::Random),
    ("randrange", Builtin::RandRange),
    ("randint", Builtin::RandInt),
    ("choice", Builtin::Choice),
    ("shuffle", Builtin::Shuffle),
    ("sample", Builtin::Sample),
    ("uniform", Builtin::Uniform),
    ("seed", Builtin::Seed),
];

const MATH_FUNCTIONS: &[(&str, MathFn)] = &[
    ("sqrt", MathFn::Sqrt),
    ("floor", MathFn::Floor),
    ("ceil", MathFn::Ceil),
    ("trunc", MathFn::Trunc),
    ("fabs", MathFn::Fabs),
    ("exp", MathFn::Exp),
    ("log", MathFn::Log),
    ("log2", MathFn::Log2),
    ("log10", MathFn::Log10),
    ("sin", MathFn::Sin),
    ("cos", MathFn::Cos),
    ("tan", MathFn::Tan),
    ("asin", MathFn::Asin),
    ("acos", MathFn::Acos),
    ("atan", MathFn::Atan),
    ("atan2", MathFn::Atan2),
    ("sinh", MathFn::Sinh),
    ("cosh", MathFn::Cosh),
    ("tanh", MathFn::Tanh),
    ("degrees", MathFn::Degrees),
    ("radians", MathFn::Radians),
    ("hypot", MathFn::Hypot),
    ("pow", MathFn::Pow),
    ("fmod", MathFn::Fmod),
    ("copysign", MathFn::Copysign),
    ("isclose", MathFn::Isclose),
    ("isnan", MathFn::Isnan),
    ("isinf", MathFn::Isinf),
    ("isfinite", MathFn::Isfinite),
    ("gcd", MathFn::Gcd),
    ("lcm", MathFn::Lcm),
    ("factorial", MathFn::Factorial),
    ("comb", MathFn::Comb),
    ("perm", MathFn::Perm),
    ("prod", MathFn::Prod),
    ("fsum", MathFn::Fsum),
];

const STR_METHODS: &[&str] = &[
    "upper", "lower", "title", "capitalize", "swapcase", "strip", "lstrip", "rstrip", "split",
    "splitlines", "join", "replace", "startswith", "endswith", "find", "rfind", "index", "count",
    "isdigit", "isnumeric", "isalpha", "isalnum", "isspace", "isupper", "islower", "zfill",
    "ljust", "rjust", "center", "format",
];
const SEQUENCE_METHODS: &[&str] = &["index", "count"];
const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "copy"];

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Math(f) => f.name(),
            Builtin::Random => "random",
            other => GLOBALS
                .iter()
                .find(|(_, b)| b == other)
                .map(|(name, _)| *name)
                .unwrap_or("builtin"),
        }
    }
}

impl MathFn {
    pub fn name(&self) -> &'static str {
        MATH_FUNCTIONS
            .iter()
            .find(|(_, f)| f == self)
            .map(|(name, _)| *name)
            .unwrap_or("math")
    }
}

fn function(builtin: Builtin) -> Value {
    Value::Function(Arc::new(Function::Builtin(builtin)))
}

/// Resolve a whitelisted global name
pub fn lookup(name: &str) -> Option<Value> {
    match name {
        "math" => Some(Value::Module(Module::Math)),
        "random" => Some(Value::Module(Module::Random)),
        _ => GLOBALS.iter().find(|(n, _)| *n == name).map(|(_, b)| function(*b)),
    }
}

/// Attribute access on an already-produced value
pub fn attribute(value: &Value, attr: &str) -> EvalResult<Value> {
    let missing = || {
        EvalError::Attribute(match value {
            Value::Module(m) => format!("module '{}' has no attribute '{}'", m.name(), attr),
            other => format!("'{}' object has no attribute '{}'", other.type_name(), attr),
        })
    };
    if attr.starts_with('_') {
        return Err(missing());
    }
    let method = |receiver: &Value| {
        Value::Function(Arc::new(Function::Method { receiver: receiver.clone(), name: attr.to_string() }))
    };
    match value {
        Value::Module(Module::Math) => match attr {
            "pi" => Ok(Value::Float(std::f64::consts::PI)),
            "e" => Ok(Value::Float(std::f64::consts::E)),
            "tau" => Ok(Value::Float(std::f64::consts::TAU)),
            "inf" => Ok(Value::Float(f64::INFINITY)),
            "nan" => Ok(Value::Float(f64::NAN)),
            _ => MATH_FUNCTIONS
                .iter()
                .find(|(n, _)| *n == attr)
                .map(|(_, f)| function(Builtin::Math(*f)))
                .ok_or_else(missing),
        },
        Value::Module(Module::Random) => RANDOM_ATTRS
            .iter()
            .find(|(n, _)| *n == attr)
            .map(|(_, b)| function(*b))
            .ok_or_else(missing),
        Value::Str(_) if STR_METHODS.contains(&attr) => Ok(method(value)),
        Value::List(_) if SEQUENCE_METHODS.contains(&attr) || attr == "copy" => Ok(method(value)),
        Value::Tuple(_) if SEQUENCE_METHODS.contains(&attr) => Ok(method(value)),
        Value::Dict(_) if DICT_METHODS.contains(&attr) => Ok(method(value)),
        Value::Float(_) if attr == "is_integer" => Ok(method(value)),
        Value::Int(_) if attr == "bit_length" => Ok(method(value)),
        _ => Err(missing()),
    }
}

/// Materialise any iterable value as a vector of items
pub fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(d) => Ok(d.keys().cloned().collect()),
        other => Err(EvalError::type_error(format!("'{}' object is not iterable", other.type_name()))),
    }
}

/// Positional and keyword arguments of one call
struct Args {
    name: &'static str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    fn keyword(&mut self, key: &str) -> Option<Value> {
        let at = self.keywords.iter().position(|(k, _)| k == key)?;
        Some(self.keywords.remove(at).1)
    }

    fn no_keywords(&self) -> EvalResult<()> {
        match self.keywords.first() {
            Some((k, _)) => Err(EvalError::type_error(format!(
                "'{}' is an invalid keyword argument for {}()",
                k, self.name
            ))),
            None => Ok(()),
        }
    }

    fn between(self, min: usize, max: usize) -> EvalResult<Vec<Value>> {
        self.no_keywords()?;
        let n = self.positional.len();
        if n < min || n > max {
            let expected = if min == max { format!("exactly {}", min) } else { format!("from {} to {}", min, max) };
            return Err(EvalError::type_error(format!(
                "{}() takes {} arguments ({} given)",
                self.name, expected, n
            )));
        }
        Ok(self.positional)
    }

    fn exactly<const N: usize>(self) -> EvalResult<[Value; N]> {
        let values = self.between(N, N)?;
        values
            .try_into()
            .map_err(|_| EvalError::type_error("argument count mismatch"))
    }
}

fn int_arg(name: &str, value: &Value) -> EvalResult<i64> {
    value.as_int().ok_or_else(|| {
        EvalError::type_error(format!(
            "{}(): '{}' object cannot be interpreted as an integer",
            name,
            value.type_name()
        ))
    })
}

fn float_arg(name: &str, value: &Value) -> EvalResult<f64> {
    value.as_float().ok_or_else(|| {
        EvalError::type_error(format!("{}(): must be real number, not {}", name, value.type_name()))
    })
}

fn str_arg<'v>(name: &str, value: &'v Value) -> EvalResult<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(EvalError::type_error(format!(
            "{}(): argument must be str, not {}",
            name,
            other.type_name()
        ))),
    }
}

fn domain_error() -> EvalError {
    EvalError::value_error("math domain error")
}

/// Dispatch a call to a whitelisted builtin
pub(crate) fn call(
    ctx: &mut Context<'_>,
    builtin: Builtin,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
) -> EvalResult<Value> {
    let mut args = Args { name: builtin.name(), positional, keywords };
    let max_len = ctx.max_len();
    match builtin {
        Builtin::Abs => {
            let [x] = args.exactly()?;
            match x {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v @ (Value::Int(_) | Value::Bool(_)) => v
                    .as_int()
                    .unwrap_or(0)
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Overflow("integer result does not fit in 64 bits".into())),
                other => Err(EvalError::type_error(format!("bad operand type for abs(): '{}'", other.type_name()))),
            }
        }
        Builtin::All => {
            let [x] = args.exactly()?;
            Ok(Value::Bool(iterate(&x)?.iter().all(Value::truthy)))
        }
        Builtin::Any => {
            let [x] = args.exactly()?;
            Ok(Value::Bool(iterate(&x)?.iter().any(Value::truthy)))
        }
        Builtin::Ascii => {
            let [x] = args.exactly()?;
            Ok(Value::Str(ascii_escape(&x.repr())))
        }
        Builtin::Bin | Builtin::Hex | Builtin::Oct => {
            let [x] = args.exactly()?;
            let i = int_arg(builtin.name(), &x)?;
            let digits = match builtin {
                Builtin::Bin => format!("0b{:b}", i.unsigned_abs()),
                Builtin::Hex => format!("0x{:x}", i.unsigned_abs()),
                _ => format!("0o{:o}", i.unsigned_abs()),
            };
            Ok(Value::Str(if i < 0 { format!("-{}", digits) } else { digits }))
        }
        Builtin::Bool => {
            let values = args.between(0, 1)?;
            Ok(Value::Bool(values.first().is_some_and(Value::truthy)))
        }
        Builtin::Chr => {
            let [x] = args.exactly()?;
            let code = int_arg("chr", &x)?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| EvalError::value_error("chr() arg not in range(0x110000)"))
        }
        Builtin::Dict => {
            let keywords = std::mem::take(&mut args.keywords);
            let values = args.between(0, 1)?;
            let mut dict = match values.into_iter().next() {
                None => Dict::new(),
                Some(Value::Dict(d)) => d,
                Some(other) => ops::dict_from_pairs(iterate(&other)?)?,
            };
            for (k, v) in keywords {
                dict.insert(Value::Str(k), v)?;
            }
            Ok(Value::Dict(dict))
        }
        Builtin::Divmod => {
            let [a, b] = args.exactly()?;
            let q = ops::binary(BinOp::FloorDiv, &a, &b, max_len)?;
            let r = ops::binary(BinOp::Mod, &a, &b, max_len)?;
            Ok(Value::Tuple(vec![q, r]))
        }
        Builtin::Enumerate => {
            let start = args.keyword("start");
            let mut values = args.between(1, 2)?;
            let start = match start.or_else(|| values.get(1).cloned()) {
                Some(v) => int_arg("enumerate", &v)?,
                None => 0,
            };
            values.truncate(1);
            let items = iterate(&values[0])?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let n = start
                    .checked_add(i as i64)
                    .ok_or_else(|| EvalError::Overflow("enumerate index overflow".into()))?;
                out.push(Value::Tuple(vec![Value::Int(n), item]));
            }
            Ok(Value::List(out))
        }
        Builtin::Filter => {
            let [f, it] = args.exactly()?;
            let mut out = Vec::new();
            for item in iterate(&it)? {
                let keep = if f.is_none() {
                    item.truthy()
                } else {
                    ctx.call_value(&f, vec![item.clone()], Vec::new())?.truthy()
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::List(out))
        }
        Builtin::Float => {
            let values = args.between(0, 1)?;
            match values.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => {
                    let cleaned = s.trim().replace('_', "");
                    cleaned.parse::<f64>().map(Value::Float).map_err(|_| {
                        EvalError::value_error(format!("could not convert string to float: {}", Value::str(s.as_str()).repr()))
                    })
                }
                Some(v) => Ok(Value::Float(float_arg("float", v)?)),
            }
        }
        Builtin::Format => {
            let values = args.between(1, 2)?;
            let spec = match values.get(1) {
                Some(v) => str_arg("format", v)?.to_string(),
                None => String::new(),
            };
            format_value(&values[0], &spec, max_len).map(Value::Str)
        }
        Builtin::Int => {
            let base = args.keyword("base");
            let values = args.between(0, 2)?;
            let base = match base.or_else(|| values.get(1).cloned()) {
                Some(b) => Some(int_arg("int", &b)?),
                None => None,
            };
            match (values.first(), base) {
                (None, _) => Ok(Value::Int(0)),
                (Some(Value::Str(s)), base) => parse_int(s, base.unwrap_or(10)).map(Value::Int),
                (Some(_), Some(_)) => Err(EvalError::type_error("int() can't convert non-string with explicit base")),
                (Some(Value::Float(f)), None) => float_to_int(*f).map(Value::Int),
                (Some(v), None) => Ok(Value::Int(int_arg("int", v)?)),
            }
        }
        Builtin::Len => {
            let [x] = args.exactly()?;
            let n = match &x {
                Value::Str(s) => s.chars().count(),
                Value::List(items) | Value::Tuple(items) => items.len(),
                Value::Dict(d) => d.len(),
                other => {
                    return Err(EvalError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(n as i64))
        }
        Builtin::List | Builtin::Tuple => {
            let values = args.between(0, 1)?;
            let items = match values.first() {
                Some(v) => iterate(v)?,
                None => Vec::new(),
            };
            Ok(if builtin == Builtin::List { Value::List(items) } else { Value::Tuple(items) })
        }
        Builtin::Map => {
            if args.positional.len() < 2 {
                return Err(EvalError::type_error("map() must have at least two arguments."));
            }
            let mut values = args.between(2, usize::MAX)?;
            let f = values.remove(0);
            let columns = values.iter().map(iterate).collect::<EvalResult<Vec<_>>>()?;
            let n = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                let row = columns.iter().map(|c| c[i].clone()).collect();
                out.push(ctx.call_value(&f, row, Vec::new())?);
            }
            Ok(Value::List(out))
        }
        Builtin::Max => extreme(ctx, args, Ordering::Greater),
        Builtin::Min => extreme(ctx, args, Ordering::Less),
        Builtin::Ord => {
            let [x] = args.exactly()?;
            let s = str_arg("ord", &x)?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => Err(EvalError::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        Builtin::Pow => {
            let values = args.between(2, 3)?;
            match values.get(2) {
                None => ops::binary(BinOp::Pow, &values[0], &values[1], max_len),
                Some(m) => {
                    let (b, e, m) = (int_arg("pow", &values[0])?, int_arg("pow", &values[1])?, int_arg("pow", m)?);
                    mod_pow(b, e, m).map(Value::Int)
                }
            }
        }
        Builtin::Range => {
            let values = args.between(1, 3)?;
            let ints = values.iter().map(|v| int_arg("range", v)).collect::<EvalResult<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => (0, 0, 1),
            };
            if step == 0 {
                return Err(EvalError::value_error("range() arg 3 must not be zero"));
            }
            let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
            let count = if step > 0 && start < stop {
                (stop - start - 1) / step + 1
            } else if step < 0 && start > stop {
                (start - stop - 1) / (-step) + 1
            } else {
                0
            };
            check_len(usize::try_from(count).unwrap_or(usize::MAX), max_len)?;
            Ok(Value::List((0..count).map(|i| Value::Int((start + i * step) as i64)).collect()))
        }
        Builtin::Repr => {
            let [x] = args.exactly()?;
            Ok(Value::Str(x.repr()))
        }
        Builtin::Reversed => {
            let [x] = args.exactly()?;
            match x {
                Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Dict(_) => {
                    let mut items = iterate(&x)?;
                    items.reverse();
                    Ok(Value::List(items))
                }
                other => Err(EvalError::type_error(format!("'{}' object is not reversible", other.type_name()))),
            }
        }
        Builtin::Round => {
            let ndigits = args.keyword("ndigits");
            let values = args.between(1, 2)?;
            let ndigits = match ndigits.or_else(|| values.get(1).cloned()) {
                Some(Value::None) | None => None,
                Some(n) => Some(int_arg("round", &n)?),
            };
            round(&values[0], ndigits)
        }
        Builtin::Sorted => {
            let key = args.keyword("key");
            let reverse = args.keyword("reverse").is_some_and(|r| r.truthy());
            let [it] = args.exactly()?;
            sort_values(ctx, iterate(&it)?, key, reverse).map(Value::List)
        }
        Builtin::Str => {
            let values = args.between(0, 1)?;
            Ok(Value::Str(values.first().map(Value::to_string).unwrap_or_default()))
        }
        Builtin::Sum => {
            let start = args.keyword("start");
            let values = args.between(1, 2)?;
            let mut total = start.or_else(|| values.get(1).cloned()).unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(EvalError::type_error("sum() can't sum strings [use ''.join(seq) instead]"));
            }
            for item in iterate(&values[0])? {
                total = ops::binary(BinOp::Add, &total, &item, max_len)?;
            }
            Ok(total)
        }
        Builtin::Type => {
            let [x] = args.exactly()?;
            Ok(type_of(&x))
        }
        Builtin::Zip => {
            let values = args.between(0, usize::MAX)?;
            let columns = values.iter().map(iterate).collect::<EvalResult<Vec<_>>>()?;
            let n = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::List(
                (0..n)
                    .map(|i| Value::Tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        Builtin::RandRange => {
            let values = args.between(1, 3)?;
            let ints = values.iter().map(|v| int_arg("randrange", v)).collect::<EvalResult<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => (0, 0, 1),
            };
            if step == 0 {
                return Err(EvalError::value_error("zero step for randrange()"));
            }
            let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
            let count = (stop - start + step - step.signum()) / step;
            if count <= 0 {
                return Err(EvalError::value_error("empty range for randrange()"));
            }
            let k = ctx.rng().random_range(0..count);
            Ok(Value::Int((start + k * step) as i64))
        }
        Builtin::RandInt => {
            let [a, b] = args.exactly()?;
            let (a, b) = (int_arg("randint", &a)?, int_arg("randint", &b)?);
            if a > b {
                return Err(EvalError::value_error("empty range for randint()"));
            }
            Ok(Value::Int(ctx.rng().random_range(a..=b)))
        }
        Builtin::Choice => {
            let [seq] = args.exactly()?;
            let items = iterate(&seq)?;
            items
                .choose(&mut *ctx.rng())
                .cloned()
                .ok_or_else(|| EvalError::Index("cannot choose from an empty sequence".into()))
        }
        Builtin::Shuffle => {
            let [seq] = args.exactly()?;
            let mut items = iterate(&seq)?;
            items.shuffle(&mut *ctx.rng());
            Ok(Value::List(items))
        }
        Builtin::Sample => {
            let k = args.keyword("k");
            let values = args.between(1, 2)?;
            let k = k
                .or_else(|| values.get(1).cloned())
                .ok_or_else(|| EvalError::type_error("sample() missing required argument: 'k'"))?;
            let k = int_arg("sample", &k)?;
            let items = iterate(&values[0])?;
            if k < 0 || k as usize > items.len() {
                return Err(EvalError::value_error("sample larger than population or is negative"));
            }
            let picked = rand::seq::index::sample(&mut *ctx.rng(), items.len(), k as usize);
            Ok(Value::List(picked.iter().map(|i| items[i].clone()).collect()))
        }
        Builtin::Uniform => {
            let [a, b] = args.exactly()?;
            let (a, b) = (float_arg("uniform", &a)?, float_arg("uniform", &b)?);
            let r: f64 = ctx.rng().random();
            Ok(Value::Float(a + (b - a) * r))
        }
        Builtin::Random => {
            args.exactly::<0>()?;
            Ok(Value::Float(ctx.rng().random()))
        }
        Builtin::Seed => {
            let values = args.between(0, 1)?;
            let rng = match values.first() {
                None | Some(Value::None) => StdRng::from_os_rng(),
                Some(Value::Int(i)) => StdRng::seed_from_u64(*i as u64),
                Some(other) => {
                    let mut hasher = DefaultHasher::new();
                    other.repr().hash(&mut hasher);
                    StdRng::seed_from_u64(hasher.finish())
                }
            };
            *ctx.rng() = rng;
            Ok(Value::None)
        }
        Builtin::Math(f) => call_math(ctx, f, args),
    }
}

fn call_math(ctx: &mut Context<'_>, f: MathFn, mut args: Args) -> EvalResult<Value> {
    let name = f.name();
    let unary = |args: Args, op: fn(f64) -> f64| -> EvalResult<Value> {
        let [x] = args.exactly()?;
        let x = float_arg(name, &x)?;
        let r = op(x);
        if r.is_nan() && !x.is_nan() {
            return Err(domain_error());
        }
        if r.is_infinite() && x.is_finite() {
            return Err(EvalError::Overflow("math range error".into()));
        }
        Ok(Value::Float(r))
    };
    match f {
        MathFn::Sqrt => unary(args, f64::sqrt),
        MathFn::Fabs => unary(args, f64::abs),
        MathFn::Exp => unary(args, f64::exp),
        MathFn::Sin => unary(args, f64::sin),
        MathFn::Cos => unary(args, f64::cos),
        MathFn::Tan => unary(args, f64::tan),
        MathFn::Asin => unary(args, f64::asin),
        MathFn::Acos => unary(args, f64::acos),
        MathFn::Atan => unary(args, f64::atan),
        MathFn::Sinh => unary(args, f64::sinh),
        MathFn::Cosh => unary(args, f64::cosh),
        MathFn::Tanh => unary(args, f64::tanh),
        MathFn::Degrees => unary(args, f64::to_degrees),
        MathFn::Radians => unary(args, f64::to_radians),
        MathFn::Floor | MathFn::Ceil | MathFn::Trunc => {
            let [x] = args.exactly()?;
            if let Some(i) = x.as_int() {
                return Ok(Value::Int(i));
            }
            let v = float_arg(name, &x)?;
            let r = match f {
                MathFn::Floor => v.floor(),
                MathFn::Ceil => v.ceil(),
                _ => v.trunc(),
            };
            float_to_int(r).map(Value::Int)
        }
        MathFn::Log | MathFn::Log2 | MathFn::Log10 => {
            let values = if f == MathFn::Log { args.between(1, 2)? } else { args.between(1, 1)? };
            let x = float_arg(name, &values[0])?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            let r = match (f, values.get(1)) {
                (MathFn::Log2, _) => x.log2(),
                (MathFn::Log10, _) => x.log10(),
                (_, Some(base)) => {
                    let base = float_arg(name, base)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(domain_error());
                    }
                    x.ln() / base.ln()
                }
                _ => x.ln(),
            };
            Ok(Value::Float(r))
        }
        MathFn::Atan2 | MathFn::Pow | MathFn::Fmod | MathFn::Copysign => {
            let [a, b] = args.exactly()?;
            let (a, b) = (float_arg(name, &a)?, float_arg(name, &b)?);
            let r = match f {
                MathFn::Atan2 => a.atan2(b),
                MathFn::Pow => {
                    if a == 0.0 && b < 0.0 {
                        return Err(domain_error());
                    }
                    a.powf(b)
                }
                MathFn::Fmod => {
                    if b == 0.0 {
                        return Err(domain_error());
                    }
                    a % b
                }
                _ => a.copysign(b),
            };
            if r.is_nan() && !a.is_nan() && !b.is_nan() {
                return Err(domain_error());
            }
            Ok(Value::Float(r))
        }
        MathFn::Hypot => {
            let values = args.between(0, usize::MAX)?;
            let mut total = 0.0f64;
            for v in &values {
                total = total.hypot(float_arg(name, v)?);
            }
            Ok(Value::Float(total))
        }
        MathFn::Isclose => {
            let rel_tol = args.keyword("rel_tol");
            let abs_tol = args.keyword("abs_tol");
            let [a, b] = args.exactly()?;
            let (a, b) = (float_arg(name, &a)?, float_arg(name, &b)?);
            let rel = rel_tol.map(|v| float_arg(name, &v)).transpose()?.unwrap_or(1e-9);
            let abs = abs_tol.map(|v| float_arg(name, &v)).transpose()?.unwrap_or(0.0);
            if a == b {
                return Ok(Value::Bool(true));
            }
            let diff = (a - b).abs();
            Ok(Value::Bool(diff <= (rel * b.abs()).max(rel * a.abs()) || diff <= abs))
        }
        MathFn::Isnan | MathFn::Isinf | MathFn::Isfinite => {
            let [x] = args.exactly()?;
            let x = float_arg(name, &x)?;
            Ok(Value::Bool(match f {
                MathFn::Isnan => x.is_nan(),
                MathFn::Isinf => x.is_infinite(),
                _ => x.is_finite(),
            }))
        }
        MathFn::Gcd | MathFn::Lcm => {
            let values = args.between(0, usize::MAX)?;
            let mut acc: i64 = if f == MathFn::Gcd { 0 } else { 1 };
            for v in &values {
                let n = int_arg(name, v)?.checked_abs().ok_or_else(|| EvalError::Overflow("integer overflow".into()))?;
                acc = if f == MathFn::Gcd {
                    gcd(acc, n)
                } else if acc == 0 || n == 0 {
                    0
                } else {
                    (acc / gcd(acc, n))
                        .checked_mul(n)
                        .ok_or_else(|| EvalError::Overflow("integer result does not fit in 64 bits".into()))?
                };
            }
            Ok(Value::Int(acc))
        }
        MathFn::Factorial => {
            let [n] = args.exactly()?;
            let n = int_arg(name, &n)?;
            if n < 0 {
                return Err(EvalError::value_error("factorial() not defined for negative values"));
            }
            let mut acc: i64 = 1;
            for i in 2..=n {
                acc = acc
                    .checked_mul(i)
                    .ok_or_else(|| EvalError::Overflow("integer result does not fit in 64 bits".into()))?;
            }
            Ok(Value::Int(acc))
        }
        MathFn::Comb | MathFn::Perm => {
            let values = if f == MathFn::Perm { args.between(1, 2)? } else { args.between(2, 2)? };
            let n = int_arg(name, &values[0])?;
            let k = match values.get(1) {
                Some(k) => int_arg(name, k)?,
                None => n,
            };
            if n < 0 || k < 0 {
                return Err(EvalError::value_error(format!("{}() arguments must be non-negative", name)));
            }
            if k > n {
                return Ok(Value::Int(0));
            }
            let overflow = || EvalError::Overflow("integer result does not fit in 64 bits".into());
            let mut acc: i128 = 1;
            let k = if f == MathFn::Comb { k.min(n - k) } else { k };
            for i in 0..k {
                acc = acc.checked_mul(i128::from(n - i)).ok_or_else(overflow)?;
                if f == MathFn::Comb {
                    acc /= i128::from(i + 1);
                }
            }
            i64::try_from(acc).map(Value::Int).map_err(|_| overflow())
        }
        MathFn::Prod => {
            let start = args.keyword("start");
            let [it] = args.exactly()?;
            let mut acc = start.unwrap_or(Value::Int(1));
            for item in iterate(&it)? {
                acc = ops::binary(BinOp::Mul, &acc, &item, ctx.max_len())?;
            }
            Ok(acc)
        }
        MathFn::Fsum => {
            let [it] = args.exactly()?;
            let mut sum = 0.0f64;
            let mut compensation = 0.0f64;
            for item in iterate(&it)? {
                let x = float_arg(name, &item)?;
                let t = sum + x;
                compensation += if sum.abs() >= x.abs() { (sum - t) + x } else { (x - t) + sum };
                sum = t;
            }
            Ok(Value::Float(sum + compensation))
        }
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn mod_pow(base: i64, exp: i64, modulus: i64) -> EvalResult<i64> {
    if modulus == 0 {
        return Err(EvalError::value_error("pow() 3rd argument cannot be 0"));
    }
    if exp < 0 {
        return Err(EvalError::value_error("pow() 2nd argument cannot be negative when 3rd argument specified"));
    }
    let m = i128::from(modulus);
    let mut result: i128 = 1 % m;
    let mut b = i128::from(base).rem_euclid(m.abs());
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * b) % m;
        }
        b = (b * b) % m;
        e >>= 1;
    }
    let r = result as i64;
    ops::floor_mod(r, modulus)
}

fn float_to_int(f: f64) -> EvalResult<i64> {
    if f.is_nan() {
        return Err(EvalError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(EvalError::Overflow("cannot convert float infinity to integer".into()));
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(EvalError::Overflow("integer result does not fit in 64 bits".into()));
    }
    Ok(t as i64)
}

fn parse_int(text: &str, base: i64) -> EvalResult<i64> {
    let invalid = || {
        EvalError::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            Value::str(text).repr()
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(EvalError::value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = text.trim().replace('_', "");
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, trimmed.strip_prefix('+').unwrap_or(&trimmed).to_string()),
    };
    let lower = body.to_ascii_lowercase();
    let (radix, digits) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &body[2..]),
        (0 | 8, Some("0o")) => (8, &body[2..]),
        (0 | 2, Some("0b")) => (2, &body[2..]),
        (0, _) => (10, body.as_str()),
        (b, _) => (b as u32, body.as_str()),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let magnitude = i128::from_str_radix(digits, radix).map_err(|_| invalid())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| EvalError::Overflow("integer result does not fit in 64 bits".into()))
}

fn round(value: &Value, ndigits: Option<i64>) -> EvalResult<Value> {
    match (value, ndigits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(n)) => {
            let n = n.clamp(-308, 308) as i32;
            let scale = 10f64.powi(n.abs());
            let r = if n >= 0 {
                (f * scale).round_ties_even() / scale
            } else {
                (f / scale).round_ties_even() * scale
            };
            Ok(Value::Float(if r.is_finite() { r } else { *f }))
        }
        (v @ (Value::Int(_) | Value::Bool(_)), n) => {
            let i = v.as_int().unwrap_or(0);
            match n {
                Some(n) if n < 0 => {
                    let Some(p) = u32::try_from(-n).ok().and_then(|e| 10i64.checked_pow(e)) else {
                        return Ok(Value::Int(0));
                    };
                    let q = ops::floor_div(i, p)?;
                    let r = i - q * p;
                    let up = 2 * i128::from(r) > i128::from(p) || (2 * i128::from(r) == i128::from(p) && q % 2 != 0);
                    let q = if up { q + 1 } else { q };
                    q.checked_mul(p)
                        .map(Value::Int)
                        .ok_or_else(|| EvalError::Overflow("integer result does not fit in 64 bits".into()))
                }
                _ => Ok(Value::Int(i)),
            }
        }
        (other, _) => Err(EvalError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn sort_values(
    ctx: &mut Context<'_>,
    items: Vec<Value>,
    key: Option<Value>,
    reverse: bool,
) -> EvalResult<Vec<Value>> {
    let keys = match key {
        Some(f) if !f.is_none() => items
            .iter()
            .map(|v| ctx.call_value(&f, vec![v.clone()], Vec::new()))
            .collect::<EvalResult<Vec<_>>>()?,
        _ => items.clone(),
    };
    let mut order: Vec<usize> = (0..items.len()).collect();
    let mut failure = None;
    order.sort_by(|&a, &b| {
        let ord = keys[a].compare(&keys[b]).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        });
        if reverse {
            ord.reverse()
        } else {
            ord
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    Ok(order.into_iter().map(|i| items[i].clone()).collect())
}

fn extreme(ctx: &mut Context<'_>, mut args: Args, want: Ordering) -> EvalResult<Value> {
    let name = args.name;
    let key = args.keyword("key").filter(|k| !k.is_none());
    let default = args.keyword("default");
    let values = args.between(0, usize::MAX)?;
    let items = match values.len() {
        0 => return Err(EvalError::type_error(format!("{} expected at least 1 argument, got 0", name))),
        1 => iterate(&values[0])?,
        _ => values,
    };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let k = match &key {
            Some(f) => ctx.call_value(f, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((_, best_key)) => k.compare(best_key)? == want,
        };
        if replace {
            best = Some((item, k));
        }
    }
    match (best, default) {
        (Some((item, _)), _) => Ok(item),
        (None, Some(d)) => Ok(d),
        (None, None) => Err(EvalError::value_error(format!("{}() arg is an empty sequence", name))),
    }
}

fn type_of(value: &Value) -> Value {
    match value {
        Value::Bool(_) => function(Builtin::Bool),
        Value::Int(_) => function(Builtin::Int),
        Value::Float(_) => function(Builtin::Float),
        Value::Str(_) => function(Builtin::Str),
        Value::List(_) => function(Builtin::List),
        Value::Tuple(_) => function(Builtin::Tuple),
        Value::Dict(_) => function(Builtin::Dict),
        other => Value::Str(other.type_name().to_string()),
    }
}

fn ascii_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        match code {
            0..=0x7f => out.push(c),
            0x80..=0xff => out.push_str(&format!("\\x{:02x}", code)),
            0x100..=0xffff => out.push_str(&format!("\\u{:04x}", code)),
            _ => out.push_str(&format!("\\U{:08x}", code)),
        }
    }
    out
}

/// Minimal format-spec mini-language: `[[fill]align][sign][0][width][,|_][.precision][type]`
///
/// Width and precision may not exceed `max_len`.
pub fn format_value(value: &Value, spec: &str, max_len: usize) -> EvalResult<String> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let invalid = || EvalError::value_error(format!("invalid format specifier '{}'", spec));
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && "<>^=".contains(chars[1]) {
        fill = chars[0];
        align = Some(chars[1]);
        i = 2;
    } else if "<>^=".contains(chars[0]) {
        align = Some(chars[0]);
        i = 1;
    }
    let mut sign = '-';
    if i < chars.len() && "+- ".contains(chars[i]) {
        sign = chars[i];
        i += 1;
    }
    if i < chars.len() && chars[i] == '0' && align.is_none() {
        fill = '0';
        align = Some('=');
        i += 1;
    }
    let mut width = 0usize;
    while i < chars.len() && chars[i].is_ascii_digit() {
        width = push_digit(width, chars[i]).ok_or_else(invalid)?;
        i += 1;
    }
    check_len(width, max_len)?;
    let mut grouping = None;
    if i < chars.len() && (chars[i] == ',' || chars[i] == '_') {
        grouping = Some(chars[i]);
        i += 1;
    }
    let mut precision = None;
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let mut p = 0usize;
        let begin = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            p = push_digit(p, chars[i]).ok_or_else(invalid)?;
            i += 1;
        }
        if begin == i {
            return Err(invalid());
        }
        check_len(p, max_len)?;
        precision = Some(p);
    }
    let kind = chars.get(i).copied();
    if i + usize::from(kind.is_some()) != chars.len() {
        return Err(invalid());
    }

    let (negative, body, numeric) = match (value, kind) {
        (Value::Str(s), None | Some('s')) => {
            let text = match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            (false, text, false)
        }
        (v @ (Value::Int(_) | Value::Bool(_)), None | Some('d' | 'b' | 'o' | 'x' | 'X' | 'n')) => {
            let n = v.as_int().unwrap_or(0);
            let magnitude = n.unsigned_abs();
            let digits = match kind {
                Some('b') => format!("{:b}", magnitude),
                Some('o') => format!("{:o}", magnitude),
                Some('x') => format!("{:x}", magnitude),
                Some('X') => format!("{:X}", magnitude),
                _ => group(&magnitude.to_string(), grouping),
            };
            (n < 0, digits, true)
        }
        (v, Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%')) | (v @ Value::Float(_), None) if v.is_numeric() => {
            let x = v.as_float().unwrap_or(0.0);
            let magnitude = x.abs();
            let digits = match kind {
                Some('f' | 'F') => group_float(&format!("{:.*}", precision.unwrap_or(6), magnitude), grouping),
                Some('%') => format!("{:.*}%", precision.unwrap_or(6), magnitude * 100.0),
                Some('e' | 'E') => {
                    let s = scientific(magnitude, precision.unwrap_or(6));
                    if kind == Some('E') { s.to_uppercase() } else { s }
                }
                Some('g' | 'G') => general(magnitude, precision.unwrap_or(6)),
                _ => match precision {
                    Some(p) => general(magnitude, p.max(1)),
                    None => format_float(magnitude),
                },
            };
            (x.is_sign_negative() && !x.is_nan(), digits, true)
        }
        _ => return Err(invalid()),
    };

    let sign_text = match (negative, sign) {
        (true, _) => "-",
        (false, '+') if numeric => "+",
        (false, ' ') if numeric => " ",
        _ => "",
    };
    let len = sign_text.chars().count() + body.chars().count();
    let pad = width.saturating_sub(len);
    let padding = |n: usize| fill.to_string().repeat(n);
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '<' => format!("{}{}{}", sign_text, body, padding(pad)),
        '^' => format!("{}{}{}{}", padding(pad / 2), sign_text, body, padding(pad - pad / 2)),
        '=' => format!("{}{}{}", sign_text, padding(pad), body),
        _ => format!("{}{}{}", padding(pad), sign_text, body),
    })
}

/// `n * 10 + digit`, or `None` on overflow
fn push_digit(n: usize, digit: char) -> Option<usize> {
    n.checked_mul(10)?.checked_add(digit.to_digit(10)? as usize)
}

fn group(digits: &str, separator: Option<char>) -> String {
    let Some(sep) = separator else {
        return digits.to_string();
    };
    let mut out = String::new();
    for (n, c) in digits.chars().enumerate() {
        if n > 0 && (digits.len() - n) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn group_float(text: &str, separator: Option<char>) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{}", group(int, separator), frac),
        None => group(text, separator),
    }
}

fn scientific(x: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision, x);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let e: i32 = exp.parse().unwrap_or(0);
            format!("{}e{}{:02}", mantissa, if e < 0 { '-' } else { '+' }, e.abs())
        }
        None => s,
    }
}

fn general(x: f64, precision: usize) -> String {
    if !x.is_finite() {
        return format_float(x);
    }
    let p = precision.max(1);
    let exp = if x == 0.0 { 0 } else { x.abs().log10().floor() as i32 };
    let text = if exp < -4 || exp >= p as i32 {
        scientific(x, p - 1)
    } else {
        format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, x)
    };
    strip_zeros(&text)
}

fn strip_zeros(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exp)) => format!("{}e{}", strip_zeros(mantissa), exp),
        None if text.contains('.') => text.trim_end_matches('0').trim_end_matches('.').to_string(),
        None => text.to_string(),
    }
}

/// Dispatch a read-only method bound to `receiver`
pub(crate) fn call_method(
    ctx: &mut Context<'_>,
    receiver: &Value,
    name: &str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
) -> EvalResult<Value> {
    let max_len = ctx.max_len();
    let args = Args { name: "method", positional, keywords };
    match receiver {
        Value::Str(s) => str_method(s, name, args, max_len),
        Value::List(items) | Value::Tuple(items) => match name {
            "index" => {
                let [x] = args.exactly()?;
                items
                    .iter()
                    .position(|v| *v == x)
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| EvalError::value_error(format!("{} is not in {}", x.repr(), receiver.type_name())))
            }
            "count" => {
                let [x] = args.exactly()?;
                Ok(Value::Int(items.iter().filter(|v| **v == x).count() as i64))
            }
            _ => {
                args.exactly::<0>()?;
                Ok(receiver.clone())
            }
        },
        Value::Dict(d) => match name {
            "get" => {
                let values = args.between(1, 2)?;
                Ok(d.get(&values[0]).cloned().or_else(|| values.get(1).cloned()).unwrap_or(Value::None))
            }
            "keys" => {
                args.exactly::<0>()?;
                Ok(Value::List(d.keys().cloned().collect()))
            }
            "values" => {
                args.exactly::<0>()?;
                Ok(Value::List(d.values().cloned().collect()))
            }
            "items" => {
                args.exactly::<0>()?;
                Ok(Value::List(d.iter().map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()])).collect()))
            }
            _ => {
                args.exactly::<0>()?;
                Ok(receiver.clone())
            }
        },
        Value::Float(f) => {
            args.exactly::<0>()?;
            Ok(Value::Bool(f.is_finite() && f.fract() == 0.0))
        }
        Value::Int(i) => {
            args.exactly::<0>()?;
            Ok(Value::Int(i64::from(64 - i.unsigned_abs().leading_zeros())))
        }
        other => Err(EvalError::Attribute(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            name
        ))),
    }
}

fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

fn affixes(name: &str, value: &Value) -> EvalResult<Vec<String>> {
    match value {
        Value::Str(s) => Ok(vec![s.clone()]),
        Value::Tuple(items) => items.iter().map(|i| str_arg(name, i).map(str::to_string)).collect(),
        other => Err(EvalError::type_error(format!(
            "{} first arg must be str or a tuple of str, not {}",
            name,
            other.type_name()
        ))),
    }
}

fn str_method(s: &str, name: &str, mut args: Args, max_len: usize) -> EvalResult<Value> {
    let text = |t: String| -> EvalResult<Value> {
        check_len(t.len(), max_len)?;
        Ok(Value::Str(t))
    };
    let all_chars =
        |pred: fn(char) -> bool| -> EvalResult<Value> { Ok(Value::Bool(!s.is_empty() && s.chars().all(pred))) };
    match name {
        "upper" => args.exactly::<0>().and_then(|_| text(s.to_uppercase())),
        "lower" => args.exactly::<0>().and_then(|_| text(s.to_lowercase())),
        "swapcase" => args.exactly::<0>().and_then(|_| {
            text(s
                .chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else {
                        c.to_uppercase().collect::<Vec<_>>()
                    }
                })
                .collect())
        }),
        "capitalize" => args.exactly::<0>().and_then(|_| {
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            };
            text(out)
        }),
        "title" => args.exactly::<0>().and_then(|_| {
            let mut out = String::with_capacity(s.len());
            let mut previous_cased = false;
            for c in s.chars() {
                if previous_cased {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                previous_cased = c.is_alphabetic();
            }
            text(out)
        }),
        "strip" | "lstrip" | "rstrip" => {
            let values = args.between(0, 1)?;
            let set: Option<Vec<char>> = match values.first() {
                None | Some(Value::None) => None,
                Some(v) => Some(str_arg(name, v)?.chars().collect()),
            };
            let matcher = |c: char| match &set {
                Some(chars) => chars.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(Value::Str(out.to_string()))
        }
        "split" => {
            let sep = args.keyword("sep");
            let maxsplit = args.keyword("maxsplit");
            let values = args.between(0, 2)?;
            let sep = sep.or_else(|| values.first().cloned()).filter(|v| !v.is_none());
            let maxsplit = match maxsplit.or_else(|| values.get(1).cloned()) {
                Some(m) => int_arg("split", &m)?,
                None => -1,
            };
            let parts: Vec<Value> = match sep {
                Some(sep) => {
                    let sep = str_arg("split", &sep)?;
                    if sep.is_empty() {
                        return Err(EvalError::value_error("empty separator"));
                    }
                    if maxsplit < 0 {
                        s.split(sep).map(Value::from).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, sep).map(Value::from).collect()
                    }
                }
                None => {
                    let mut parts = Vec::new();
                    let mut rest = s.trim_start();
                    while !rest.is_empty() {
                        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
                            parts.push(Value::from(rest));
                            break;
                        }
                        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                        parts.push(Value::from(&rest[..end]));
                        rest = rest[end..].trim_start();
                    }
                    parts
                }
            };
            Ok(Value::List(parts))
        }
        "splitlines" => {
            args.exactly::<0>()?;
            Ok(Value::List(s.lines().map(Value::from).collect()))
        }
        "join" => {
            let [it] = args.exactly()?;
            let mut pieces = Vec::new();
            for (n, item) in iterate(&it)?.into_iter().enumerate() {
                match item {
                    Value::Str(piece) => pieces.push(piece),
                    other => {
                        return Err(EvalError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            n,
                            other.type_name()
                        )))
                    }
                }
            }
            let total = pieces.iter().map(String::len).sum::<usize>() + s.len() * pieces.len().saturating_sub(1);
            check_len(total, max_len)?;
            Ok(Value::Str(pieces.join(s)))
        }
        "replace" => {
            let values = args.between(2, 3)?;
            let (old, new) = (str_arg(name, &values[0])?, str_arg(name, &values[1])?);
            let count = match values.get(2) {
                Some(c) => int_arg(name, c)?,
                None => -1,
            };
            let occurrences = if old.is_empty() { s.chars().count() + 1 } else { s.matches(old).count() };
            let replaced = if count < 0 { occurrences } else { occurrences.min(count as usize) };
            check_len(s.len() + replaced.saturating_mul(new.len()), max_len)?;
            let out = if count < 0 { s.replace(old, new) } else { s.replacen(old, new, count as usize) };
            Ok(Value::Str(out))
        }
        "startswith" | "endswith" => {
            let [affix] = args.exactly()?;
            let options = affixes(name, &affix)?;
            Ok(Value::Bool(options.iter().any(|o| {
                if name == "startswith" {
                    s.starts_with(o.as_str())
                } else {
                    s.ends_with(o.as_str())
                }
            })))
        }
        "find" | "rfind" | "index" => {
            let [sub] = args.exactly()?;
            let sub = str_arg(name, &sub)?;
            let found = if name == "rfind" { s.rfind(sub) } else { s.find(sub) };
            match (found, name) {
                (Some(byte), _) => Ok(Value::Int(char_index(s, byte))),
                (None, "index") => Err(EvalError::value_error("substring not found")),
                (None, _) => Ok(Value::Int(-1)),
            }
        }
        "count" => {
            let [sub] = args.exactly()?;
            let sub = str_arg(name, &sub)?;
            let n = if sub.is_empty() { s.chars().count() + 1 } else { s.matches(sub).count() };
            Ok(Value::Int(n as i64))
        }
        "isdigit" | "isnumeric" => args.exactly::<0>().and_then(|_| all_chars(|c| c.is_numeric())),
        "isalpha" => args.exactly::<0>().and_then(|_| all_chars(char::is_alphabetic)),
        "isalnum" => args.exactly::<0>().and_then(|_| all_chars(char::is_alphanumeric)),
        "isspace" => args.exactly::<0>().and_then(|_| all_chars(char::is_whitespace)),
        "isupper" | "islower" => {
            args.exactly::<0>()?;
            let cased: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
            let ok = !cased.is_empty()
                && cased.iter().all(|c| if name == "isupper" { !c.is_lowercase() } else { !c.is_uppercase() });
            Ok(Value::Bool(ok))
        }
        "zfill" | "ljust" | "rjust" | "center" => {
            let values = args.between(1, 2)?;
            let width = int_arg(name, &values[0])?.max(0) as usize;
            check_len(width, max_len)?;
            let fill = match values.get(1) {
                Some(v) => {
                    let f = str_arg(name, v)?;
                    let mut chars = f.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => return Err(EvalError::type_error("the fill character must be exactly one character long")),
                    }
                }
                None => if name == "zfill" { '0' } else { ' ' },
            };
            let len = s.chars().count();
            let pad = width.saturating_sub(len);
            let padding = |n: usize| fill.to_string().repeat(n);
            Ok(Value::Str(match name {
                "ljust" => format!("{}{}", s, padding(pad)),
                "rjust" => format!("{}{}", padding(pad), s),
                "center" => {
                    let left = pad / 2 + (pad & width & 1);
                    format!("{}{}{}", padding(left), s, padding(pad - left))
                }
                _ => match s.strip_prefix(['-', '+']) {
                    Some(rest) => format!("{}{}{}", &s[..1], padding(pad), rest),
                    None => format!("{}{}", padding(pad), s),
                },
            }))
        }
        "format" => {
            let keywords = std::mem::take(&mut args.keywords);
            let positional = args.between(0, usize::MAX)?;
            let out = format_template(s, &positional, &keywords, max_len)?;
            check_len(out.chars().count(), max_len)?;
            Ok(Value::Str(out))
        }
        _ => Err(EvalError::Attribute(format!("'str' object has no attribute '{}'", name))),
    }
}

/// `"{} {name:>4}".format(...)` with positional, indexed and keyword fields
fn format_template(
    template: &str,
    positional: &[Value],
    keywords: &[(String, Value)],
    max_len: usize,
) -> EvalResult<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(EvalError::value_error("expected '}' before end of string")),
                    }
                }
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let value = if name.is_empty() {
                    let v = positional.get(auto_index);
                    auto_index += 1;
                    v.ok_or_else(|| EvalError::Index(format!("replacement index {} out of range", auto_index - 1)))?
                } else if let Ok(i) = name.parse::<usize>() {
                    positional
                        .get(i)
                        .ok_or_else(|| EvalError::Index(format!("replacement index {} out of range", i)))?
                } else {
                    keywords
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| EvalError::Key(Value::str(name).repr()))?
                };
                out.push_str(&format_value(value, spec, max_len)?);
                check_len(out.chars().count(), max_len)?;
            }
            '}' => return Err(EvalError::value_error("single '}' encountered in format string")),
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_resolves_only_known_names() {
        assert!(lookup("len").is_some());
        assert!(matches!(lookup("math"), Some(Value::Module(Module::Math))));
        assert!(lookup("open").is_none());
        assert!(lookup("eval").is_none());
        assert!(lookup("__import__").is_none());
    }

    #[test]
    fn private_attributes_are_never_exposed() {
        assert!(matches!(attribute(&Value::str("x"), "__class__"), Err(EvalError::Attribute(_))));
        assert!(matches!(attribute(&Value::Module(Module::Math), "_x"), Err(EvalError::Attribute(_))));
        assert!(attribute(&Value::Module(Module::Math), "sqrt").is_ok());
        assert!(matches!(attribute(&Value::List(vec![]), "append"), Err(EvalError::Attribute(_))));
    }

    #[test]
    fn builtin_names_round_trip() {
        assert_eq!(Builtin::Sorted.name(), "sorted");
        assert_eq!(Builtin::Math(MathFn::Sqrt).name(), "sqrt");
        assert_eq!(Builtin::Random.name(), "random");
    }

    #[test]
    fn format_spec_covers_common_forms() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f", 1_000).unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), "05d", 1_000).unwrap(), "00042");
        assert_eq!(format_value(&Value::Int(1234567), ",", 1_000).unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::str("ab"), ">4", 1_000).unwrap(), "  ab");
        assert_eq!(format_value(&Value::Int(255), "x", 1_000).unwrap(), "ff");
        assert_eq!(format_value(&Value::Float(0.25), ".0%", 1_000).unwrap(), "25%");
        assert_eq!(format_value(&Value::Float(12345.678), ".2e", 1_000).unwrap(), "1.23e+04");
        assert!(format_value(&Value::str("a"), "d", 1_000).is_err());
    }

    #[test]
    fn format_width_and_precision_are_bounded() {
        let err = format_value(&Value::Int(1), "99999999999999999999", 1_000).unwrap_err();
        assert!(matches!(err, EvalError::Value(_)), "{}", err);
        assert!(matches!(format_value(&Value::Float(1.0), ".99999999999999999999f", 1_000), Err(EvalError::Value(_))));

        assert!(matches!(format_value(&Value::Int(1), "5000", 100), Err(EvalError::Limit(_))));
        assert!(matches!(format_value(&Value::Float(1.0), ".5000f", 100), Err(EvalError::Limit(_))));
        assert_eq!(format_value(&Value::Int(1), "100", 100).unwrap().len(), 100);
    }

    #[test]
    fn format_builtins_respect_evaluator_limits() {
        use crate::eval::{Environment, Evaluator, Limits};

        let evaluator = Evaluator::new(Limits { max_len: 100, ..Limits::default() });
        let env = Environment::new();
        for source in ["len(format(1, '5000'))", "'{:>5000}'.format(1)", "'{:.500f}'.format(1.5)", "'{}{}'.format('a' * 60, 'b' * 60)"] {
            assert!(matches!(evaluator.evaluate(source, &env), Err(EvalError::Limit(_))), "{}", source);
        }
        assert_eq!(evaluator.evaluate("len(format(1, '50'))", &env).unwrap(), Value::Int(50));
    }

    #[test]
    fn int_parsing_handles_bases_and_signs() {
        assert_eq!(parse_int(" -42 ", 10).unwrap(), -42);
        assert_eq!(parse_int("0x1f", 0).unwrap(), 31);
        assert_eq!(parse_int("ff", 16).unwrap(), 255);
        assert!(parse_int("1.5", 10).is_err());
        assert!(parse_int("", 10).is_err());
    }

    #[test]
    fn rounding_is_half_even() {
        assert_eq!(round(&Value::Float(2.5), None).unwrap(), Value::Int(2));
        assert_eq!(round(&Value::Float(3.5), None).unwrap(), Value::Int(4));
        assert_eq!(round(&Value::Int(25), Some(-1)).unwrap(), Value::Int(20));
        assert_eq!(round(&Value::Int(35), Some(-1)).unwrap(), Value::Int(40));
        assert_eq!(round(&Value::Float(1.234), Some(2)).unwrap(), Value::Float(1.23));
    }

    #[test]
    fn template_formatting() {
        let out = format_template(
            "{} + {0} = {total:.1f} {{ok}}",
            &[Value::Int(1)],
            &[("total".to_string(), Value::Float(2.0))],
            1_000,
        )
        .unwrap();
        assert_eq!(out, "1 + 1 = 2.0 {ok}");
    }

    #[test]
    fn modular_power_matches_python_sign_rules() {
        assert_eq!(mod_pow(3, 4, 5).unwrap(), 1);
        assert_eq!(mod_pow(2, 10, -7).unwrap(), -5);
        assert!(mod_pow(2, 3, 0).is_err());
    }
}
