/// Tree-walking interpreter over the parsed program
///
/// Names resolve through the local scope chain, then the caller-supplied
/// environment, then the builtin whitelist. Every evaluation is bounded by the
/// configured call depth, result length and step budget.

use crate::eval::ast::{BoolOp, Comprehension, Expr, Program, Stmt, Target};
use crate::eval::builtins::{self, iterate};
use crate::eval::error::{EvalError, EvalResult};
use crate::eval::ops;
use crate::eval::parser::parse;
use crate::eval::value::{Dict, Function, Lambda, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Names visible to an expression besides its own locals
pub type Environment = HashMap<String, Value>;

/// Resource bounds applied to every evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum nesting of function calls
    pub max_depth: usize,
    /// Maximum length of any produced string or sequence
    pub max_len: usize,
    /// Maximum number of evaluated expression nodes
    pub max_steps: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_depth: 64, max_len: 1_000_000, max_steps: 5_000_000 }
    }
}

/// Result of running a program: the value of its last statement and the
/// locals its assignments produced
#[derive(Debug, Clone)]
pub struct Execution {
    pub value: Value,
    pub locals: HashMap<String, Value>,
}

/// Restricted expression evaluator
///
/// Stateless apart from the random-number generator shared by the `random`
/// builtins, so one instance can serve a whole process.
#[derive(Debug)]
pub struct Evaluator {
    limits: Limits,
    rng: Mutex<StdRng>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl Evaluator {
    pub fn new(limits: Limits) -> Self {
        Self { limits, rng: Mutex::new(StdRng::from_os_rng()) }
    }

    /// Evaluator with a deterministic random sequence
    pub fn with_seed(limits: Limits, seed: u64) -> Self {
        Self { limits, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Evaluate `source` and return the value of its last statement
    pub fn evaluate(&self, source: &str, env: &Environment) -> EvalResult<Value> {
        Ok(self.execute(source, env)?.value)
    }

    /// Evaluate `source`, also returning the locals bound by its assignments
    pub fn execute(&self, source: &str, env: &Environment) -> EvalResult<Execution> {
        let program = parse(source)?;
        self.run(&program, env)
    }

    pub fn run(&self, program: &Program, env: &Environment) -> EvalResult<Execution> {
        let mut ctx = Context {
            evaluator: self,
            env,
            frames: vec![Frame::body(HashMap::new())],
            depth: 0,
            steps: 0,
        };
        let mut last = Value::None;
        for statement in &program.statements {
            last = match statement {
                Stmt::Expr(expr) => ctx.eval(expr)?,
                Stmt::Assign { target, value } => {
                    let value = ctx.eval(value)?;
                    ctx.bind(target, value.clone())?;
                    value
                }
            };
        }
        let locals = ctx.frames.pop().map(|f| f.vars).unwrap_or_default();
        Ok(Execution { value: last, locals })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FrameKind {
    Body,
    Comprehension,
}

struct Frame {
    kind: FrameKind,
    vars: HashMap<String, Value>,
}

impl Frame {
    fn body(vars: HashMap<String, Value>) -> Self {
        Self { kind: FrameKind::Body, vars }
    }
}

/// State of one evaluation
pub(crate) struct Context<'a> {
    evaluator: &'a Evaluator,
    env: &'a Environment,
    frames: Vec<Frame>,
    depth: usize,
    steps: u64,
}

impl<'a> Context<'a> {
    pub(crate) fn max_len(&self) -> usize {
        self.evaluator.limits.max_len
    }

    pub(crate) fn rng(&self) -> MutexGuard<'a, StdRng> {
        self.evaluator.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.vars.get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.env.get(name) {
            return Ok(v.clone());
        }
        builtins::lookup(name).ok_or_else(|| EvalError::Name(name.to_string()))
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> EvalResult<Vec<Value>> {
        let values = exprs.iter().map(|e| self.eval(e)).collect::<EvalResult<Vec<_>>>()?;
        ops::check_len(values.len(), self.max_len())?;
        Ok(values)
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.steps += 1;
        if self.steps > self.evaluator.limits.max_steps {
            return Err(EvalError::Limit(format!(
                "evaluation exceeded {} steps",
                self.evaluator.limits.max_steps
            )));
        }
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name(name) => self.lookup(name),
            Expr::Tuple(items) => Ok(Value::Tuple(self.eval_all(items)?)),
            Expr::List(items) => Ok(Value::List(self.eval_all(items)?)),
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (k, v) in entries {
                    let key = self.eval(k)?;
                    let value = self.eval(v)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::Dict(dict))
            }
            Expr::Slice { .. } => Err(EvalError::type_error("slices are only valid inside a subscript")),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                ops::unary(*op, &v)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                ops::binary(*op, &l, &r, self.max_len())
            }
            Expr::Bool { op, values } => {
                let mut result = Value::None;
                for e in values {
                    result = self.eval(e)?;
                    let decided = match op {
                        BoolOp::And => !result.truthy(),
                        BoolOp::Or => result.truthy(),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(result)
            }
            Expr::Compare { left, rest } => {
                let mut l = self.eval(left)?;
                for (op, e) in rest {
                    let r = self.eval(e)?;
                    if !ops::compare(*op, &l, &r)? {
                        return Ok(Value::Bool(false));
                    }
                    l = r;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let f = self.eval(func)?;
                let args = self.eval_all(args)?;
                let mut keywords = Vec::with_capacity(kwargs.len());
                for (k, e) in kwargs {
                    keywords.push((k.clone(), self.eval(e)?));
                }
                self.call_value(&f, args, keywords)
            }
            Expr::Attribute { value, attr } => {
                let v = self.eval(value)?;
                builtins::attribute(&v, attr)
            }
            Expr::Subscript { value, index } => {
                let v = self.eval(value)?;
                match &**index {
                    Expr::Slice { lower, upper, step } => {
                        let lower = self.slice_bound(lower.as_deref())?;
                        let upper = self.slice_bound(upper.as_deref())?;
                        let step = self.slice_bound(step.as_deref())?;
                        ops::slice(&v, lower, upper, step)
                    }
                    other => {
                        let i = self.eval(other)?;
                        ops::subscript(&v, &i)
                    }
                }
            }
            Expr::ListComp { element, generators } => {
                self.frames.push(Frame { kind: FrameKind::Comprehension, vars: HashMap::new() });
                let mut out = Vec::new();
                let result = self.comprehension(element, generators, &mut out);
                self.frames.pop();
                result?;
                Ok(Value::List(out))
            }
            Expr::Lambda { params, body } => {
                let mut captured = HashMap::new();
                for frame in &self.frames {
                    captured.extend(frame.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Ok(Value::Function(Arc::new(Function::Lambda(Lambda {
                    params: params.clone(),
                    body: Arc::clone(body),
                    captured,
                }))))
            }
            Expr::Named { target, value } => {
                let v = self.eval(value)?;
                // binds in the nearest enclosing non-comprehension scope
                if let Some(frame) = self.frames.iter_mut().rev().find(|f| f.kind == FrameKind::Body) {
                    frame.vars.insert(target.clone(), v.clone());
                }
                Ok(v)
            }
        }
    }

    fn slice_bound(&mut self, bound: Option<&Expr>) -> EvalResult<Option<i64>> {
        let Some(expr) = bound else {
            return Ok(None);
        };
        match self.eval(expr)? {
            Value::None => Ok(None),
            v => v
                .as_int()
                .map(Some)
                .ok_or_else(|| EvalError::type_error("slice indices must be integers or None")),
        }
    }

    fn comprehension(&mut self, element: &Expr, generators: &[Comprehension], out: &mut Vec<Value>) -> EvalResult<()> {
        let Some((generator, inner)) = generators.split_first() else {
            out.push(self.eval(element)?);
            return ops::check_len(out.len(), self.max_len());
        };
        let iterable = self.eval(&generator.iter)?;
        'items: for item in iterate(&iterable)? {
            self.bind(&generator.target, item)?;
            for condition in &generator.conditions {
                if !self.eval(condition)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehension(element, inner, out)?;
        }
        Ok(())
    }

    fn bind(&mut self, target: &Target, value: Value) -> EvalResult<()> {
        match target {
            Target::Name(name) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.vars.insert(name.clone(), value);
                }
                Ok(())
            }
            Target::Tuple(targets) => {
                let items = match value {
                    Value::List(items) | Value::Tuple(items) => items,
                    v @ (Value::Str(_) | Value::Dict(_)) => iterate(&v)?,
                    other => {
                        return Err(EvalError::type_error(format!(
                            "cannot unpack non-iterable {} object",
                            other.type_name()
                        )))
                    }
                };
                if items.len() != targets.len() {
                    return Err(EvalError::value_error(if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!("not enough values to unpack (expected {}, got {})", targets.len(), items.len())
                    }));
                }
                for (t, v) in targets.iter().zip(items) {
                    self.bind(t, v)?;
                }
                Ok(())
            }
        }
    }

    /// Call any callable value
    pub(crate) fn call_value(
        &mut self,
        func: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        let Value::Function(function) = func else {
            return Err(EvalError::type_error(format!("'{}' object is not callable", func.type_name())));
        };
        if self.depth >= self.evaluator.limits.max_depth {
            return Err(EvalError::Recursion(self.evaluator.limits.max_depth));
        }
        self.depth += 1;
        let result = match &**function {
            Function::Builtin(b) => builtins::call(self, *b, args, kwargs),
            Function::Method { receiver, name } => builtins::call_method(self, receiver, name, args, kwargs),
            Function::Lambda(lambda) => self.call_lambda(lambda, args, kwargs),
        };
        self.depth -= 1;
        result
    }

    fn call_lambda(&mut self, lambda: &Lambda, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        if args.len() > lambda.params.len() {
            return Err(EvalError::type_error(format!(
                "<lambda>() takes {} positional arguments but {} were given",
                lambda.params.len(),
                args.len()
            )));
        }
        let mut vars = lambda.captured.clone();
        let mut bound: Vec<Option<Value>> = vec![None; lambda.params.len()];
        for (slot, arg) in bound.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        for (name, value) in kwargs {
            let at = lambda.params.iter().position(|p| *p == name).ok_or_else(|| {
                EvalError::type_error(format!("<lambda>() got an unexpected keyword argument '{}'", name))
            })?;
            if bound[at].is_some() {
                return Err(EvalError::type_error(format!(
                    "<lambda>() got multiple values for argument '{}'",
                    name
                )));
            }
            bound[at] = Some(value);
        }
        for (param, value) in lambda.params.iter().zip(bound) {
            let value = value.ok_or_else(|| {
                EvalError::type_error(format!("<lambda>() missing required argument: '{}'", param))
            })?;
            vars.insert(param.clone(), value);
        }
        let saved = std::mem::replace(&mut self.frames, vec![Frame::body(vars)]);
        let result = self.eval(&lambda.body);
        self.frames = saved;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> EvalResult<Value> {
        Evaluator::with_seed(Limits::default(), 7).evaluate(source, &Environment::new())
    }

    fn eval_with(source: &str, vars: &[(&str, Value)]) -> EvalResult<Value> {
        let env: Environment = vars.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        Evaluator::default().evaluate(source, &env)
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn arithmetic_follows_precedence() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), Value::Int(14));
        assert_eq!(eval("(2 + 3) * 4").unwrap(), Value::Int(20));
        assert_eq!(eval("-2 ** 2").unwrap(), Value::Int(-4));
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), Value::Int(512));
        assert_eq!(eval("7 // 2 + 7 % 2 + 1 / 4").unwrap(), Value::Float(4.25));
        assert_eq!(eval("1 << 4 | 3 & 1 ^ 2").unwrap(), Value::Int(19));
    }

    #[test]
    fn list_comprehension_with_range() {
        assert_eq!(eval("[i*2 for i in range(3)]").unwrap(), ints(&[0, 2, 4]));
        assert_eq!(
            eval("[x * y for x in range(1, 3) for y in range(3) if y > 0]").unwrap(),
            ints(&[1, 2, 2, 4])
        );
        assert_eq!(eval("[a + b for a, b in zip([1, 2], [10, 20])]").unwrap(), ints(&[11, 22]));
    }

    #[test]
    fn boolean_operators_short_circuit() {
        let env = [("a", Value::Int(1)), ("b", Value::Int(2)), ("z", Value::Bool(true))];
        assert_eq!(eval_with("a < b and z", &env).unwrap(), Value::Bool(true));
        assert_eq!(eval("0 or 'x'").unwrap(), Value::str("x"));
        assert_eq!(eval("[] and undefined_name").unwrap(), Value::List(vec![]));
        assert_eq!(eval("1 or undefined_name").unwrap(), Value::Int(1));
    }

    #[test]
    fn undefined_names_and_host_functions_are_rejected() {
        assert!(matches!(eval("undefined_name"), Err(EvalError::Name(n)) if n == "undefined_name"));
        assert!(matches!(eval("os.system('x')"), Err(EvalError::Name(_))));
        assert!(matches!(eval("__import__('os')"), Err(EvalError::Name(_))));
        assert!(matches!(eval("open('/etc/passwd')"), Err(EvalError::Name(_))));
        assert!(matches!(eval("(1).__class__"), Err(EvalError::Attribute(_))));
        assert!(matches!(eval("math.__dict__"), Err(EvalError::Attribute(_))));
    }

    #[test]
    fn incompatible_operands_are_type_errors() {
        assert!(matches!(eval("1 + 'a'"), Err(EvalError::Type(_))));
        assert!(matches!(eval("5()"), Err(EvalError::Type(_))));
        assert!(matches!(eval("math()"), Err(EvalError::Type(_))));
        assert!(matches!(eval("[1] < 'a'"), Err(EvalError::Type(_))));
    }

    #[test]
    fn chained_comparisons() {
        assert_eq!(eval("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 3 < 2").unwrap(), Value::Bool(false));
        assert!(eval("x is None").is_err());
        assert_eq!(eval("None is None and 2 is not 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("'b' in 'abc' and 4 not in [1, 2]").unwrap(), Value::Bool(true));
    }

    #[test]
    fn containers_and_subscripts() {
        assert_eq!(eval("(1, 2, 3)[1:]").unwrap(), Value::Tuple(vec![Value::Int(2), Value::Int(3)]));
        assert_eq!(eval("'hello'[::-1]").unwrap(), Value::str("olleh"));
        assert_eq!(eval("{'a': 1, 'b': 2}['b']").unwrap(), Value::Int(2));
        assert!(matches!(eval("{'a': 1}['z']"), Err(EvalError::Key(_))));
        assert!(matches!(eval("[1][5]"), Err(EvalError::Index(_))));
        assert_eq!(eval("{'a': 1} | {'b': 2}").unwrap().to_string(), "{'a': 1, 'b': 2}");
    }

    #[test]
    fn conditional_expression_evaluates_one_branch() {
        assert_eq!(eval("'yes' if 1 > 0 else undefined_name").unwrap(), Value::str("yes"));
        assert_eq!(eval("undefined_name if 0 else 'no'").unwrap(), Value::str("no"));
    }

    #[test]
    fn assignments_accumulate_locals() {
        let evaluator = Evaluator::default();
        let run = evaluator.execute("a = 2\nb, c = a * 2, a * 3\nd = b + c", &Environment::new()).unwrap();
        assert_eq!(run.value, Value::Int(10));
        assert_eq!(run.locals.get("c"), Some(&Value::Int(6)));
        assert_eq!(eval("(y := 4) * y").unwrap(), Value::Int(16));
        assert_eq!(eval("[last := i for i in range(3)]; last").unwrap(), Value::Int(2));
        assert!(matches!(eval("a, b = 1, 2, 3"), Err(EvalError::Value(_))));
    }

    #[test]
    fn lambdas_close_over_locals() {
        assert_eq!(eval("k = 3; f = lambda x: x * k; f(2)").unwrap(), Value::Int(6));
        assert!(matches!(eval("(lambda a, b=None: a)"), Err(EvalError::Syntax { .. })));
        assert_eq!(eval("(lambda a, b: a - b)(b=1, a=5)").unwrap(), Value::Int(4));
        assert_eq!(eval("sorted([3, 1, 2], key=lambda v: -v)").unwrap(), ints(&[3, 2, 1]));
        assert_eq!(eval("list(map(lambda v: v + 1, [1, 2]))").unwrap(), ints(&[2, 3]));
        assert!(matches!(eval("(lambda x: x)()"), Err(EvalError::Type(_))));
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let err = eval("f = lambda g, n: g(g, n + 1); f(f, 0)").unwrap_err();
        assert!(matches!(err, EvalError::Recursion(64)));
    }

    #[test]
    fn oversized_results_hit_the_length_limit() {
        let limits = Limits { max_len: 100, ..Limits::default() };
        let evaluator = Evaluator::new(limits);
        let env = Environment::new();
        assert!(matches!(evaluator.evaluate("range(1000)", &env), Err(EvalError::Limit(_))));
        assert!(matches!(evaluator.evaluate("'ab' * 200", &env), Err(EvalError::Limit(_))));
        assert!(matches!(
            evaluator.evaluate("[i for i in range(50) for j in range(50)]", &env),
            Err(EvalError::Limit(_))
        ));
    }

    #[test]
    fn step_budget_stops_long_filters() {
        let limits = Limits { max_steps: 10_000, ..Limits::default() };
        let evaluator = Evaluator::new(limits);
        let result = evaluator.evaluate("[0 for i in range(1000) for j in range(1000) if 0]", &Environment::new());
        assert!(matches!(result, Err(EvalError::Limit(_))));
    }

    #[test]
    fn builtins_cover_the_whitelist() {
        assert_eq!(eval("abs(-3) + len('abc') + max(1, 5) + min([4, 2])").unwrap(), Value::Int(13));
        assert_eq!(eval("sum(x for x in range(5))").unwrap(), Value::Int(10));
        assert_eq!(eval("round(1.25, 1)").unwrap(), Value::Float(1.2));
        assert_eq!(eval("int('12') + int(3.9) + int(True)").unwrap(), Value::Int(16));
        assert_eq!(eval("str(1.0) + repr('a')").unwrap(), Value::str("1.0'a'"));
        assert_eq!(eval("divmod(-7, 2)").unwrap(), Value::Tuple(vec![Value::Int(-4), Value::Int(1)]));
        assert_eq!(eval("list(enumerate('ab', start=1))[1]").unwrap().to_string(), "(2, 'b')");
        assert_eq!(eval("dict([('a', 1)], b=2)").unwrap().to_string(), "{'a': 1, 'b': 2}");
        assert_eq!(eval("type(1) == int and type('') == str").unwrap(), Value::Bool(true));
        assert_eq!(eval("hex(255) + bin(5) + oct(8)").unwrap(), Value::str("0xff0b1010o10"));
        assert_eq!(eval("all([1, True]) and not any([0, ''])").unwrap(), Value::Bool(true));
        assert_eq!(eval("max([], default=7)").unwrap(), Value::Int(7));
        assert_eq!(eval("chr(ord('a') + 1)").unwrap(), Value::str("b"));
        assert_eq!(eval("pow(2, 10, 1000)").unwrap(), Value::Int(24));
        assert_eq!(eval("list(reversed([1, 2]))").unwrap(), ints(&[2, 1]));
        assert_eq!(eval("format(0.5, '.1%')").unwrap(), Value::str("50.0%"));
    }

    #[test]
    fn modules_and_methods() {
        assert_eq!(eval("math.sqrt(16) + math.floor(2.7)").unwrap(), Value::Float(6.0));
        assert_eq!(eval("math.factorial(5)").unwrap(), Value::Int(120));
        assert!(matches!(eval("math.sqrt(-1)"), Err(EvalError::Value(_))));
        assert_eq!(eval("'a,b'.split(',')").unwrap().to_string(), "['a', 'b']");
        assert_eq!(eval("'-'.join(['x', 'y']).upper()").unwrap(), Value::str("X-Y"));
        assert_eq!(eval("{'k': 1}.get('z', 0)").unwrap(), Value::Int(0));
        assert_eq!(eval("'{} is {:>3}'.format('x', 7)").unwrap(), Value::str("x is   7"));
        assert_eq!(eval("[1, 2, 2].count(2)").unwrap(), Value::Int(2));
    }

    #[test]
    fn random_family_is_seedable_and_bounded() {
        let evaluator = Evaluator::default();
        let env = Environment::new();
        let first = evaluator.evaluate("seed(42); [randint(1, 6) for _ in range(5)]", &env).unwrap();
        let second = evaluator.evaluate("seed(42); [randint(1, 6) for _ in range(5)]", &env).unwrap();
        assert_eq!(first, second);
        let r = evaluator.evaluate("rnd()", &env).unwrap().as_float().unwrap();
        assert!((0.0..1.0).contains(&r));
        let shuffled = evaluator.evaluate("sorted(shuffle([3, 1, 2]))", &env).unwrap();
        assert_eq!(shuffled, ints(&[1, 2, 3]));
        assert_eq!(evaluator.evaluate("len(sample(range(10), 3))", &env).unwrap(), Value::Int(3));
        assert!(evaluator.evaluate("choice([])", &env).is_err());
        let x = evaluator.evaluate("random.uniform(2, 3)", &env).unwrap().as_float().unwrap();
        assert!((2.0..=3.0).contains(&x));
    }

    #[test]
    fn environment_values_are_visible_but_locals_shadow_them() {
        let env = [("x", Value::Int(1))];
        assert_eq!(eval_with("x + 1", &env).unwrap(), Value::Int(2));
        assert_eq!(eval_with("x = 5; x", &env).unwrap(), Value::Int(5));
        assert_eq!(eval_with("len = 3; len", &[]).unwrap(), Value::Int(3));
    }

    #[test]
    fn syntax_errors_surface_before_evaluation() {
        assert!(matches!(eval(""), Err(EvalError::Syntax { .. })));
        assert!(matches!(eval("undefined_name +"), Err(EvalError::Syntax { .. })));
    }
}
