/// Recursive-descent parser for the expression language
///
/// Follows the usual Python precedence ladder (lambda, conditional, or, and, not,
/// comparison, bitwise, shift, arithmetic, unary, power, trailers). The whole source
/// is parsed before anything is evaluated, so malformed input never runs.

use crate::eval::ast::{BinOp, BoolOp, CmpOp, Comprehension, Expr, Program, Stmt, Target, UnaryOp};
use crate::eval::error::{EvalError, EvalResult};
use crate::eval::lexer::{tokenize, Token, TokenKind};
use crate::eval::value::Value;
use std::sync::Arc;

/// Maximum bracket/operator nesting accepted by the parser
const MAX_NESTING: usize = 64;

/// Parse `source` into a program of one or more statements
pub fn parse(source: &str) -> EvalResult<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, nesting: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        kind
    }

    fn check_punct(&self, p: &str) -> bool {
        matches!(self.peek(), TokenKind::Punct(q) if *q == p)
    }

    fn check_keyword(&self, k: &str) -> bool {
        matches!(self.peek(), TokenKind::Keyword(q) if *q == k)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.check_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, k: &str) -> bool {
        if self.check_keyword(k) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> EvalResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", p)))
        }
    }

    fn unexpected(&self, context: &str) -> EvalError {
        let found = match self.peek() {
            TokenKind::Int(i) => i.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::Str(s) => format!("'{}'", s),
            TokenKind::Name(n) => n.clone(),
            TokenKind::Keyword(k) => k.to_string(),
            TokenKind::Punct(p) => p.to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        };
        EvalError::syntax(format!("{}, found {}", context, found), self.offset())
    }

    fn enter(&mut self) -> EvalResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(EvalError::syntax("expression is nested too deeply", self.offset()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn program(&mut self) -> EvalResult<Program> {
        let mut statements = Vec::new();
        loop {
            while matches!(self.peek(), TokenKind::Newline) || self.check_punct(";") {
                self.advance();
            }
            if matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            statements.push(self.statement()?);
            match self.peek() {
                TokenKind::Newline | TokenKind::Eof => {}
                TokenKind::Punct(";") => {}
                _ => return Err(self.unexpected("expected end of statement")),
            }
        }
        if statements.is_empty() {
            return Err(EvalError::syntax("empty expression", 0));
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> EvalResult<Stmt> {
        let start = self.offset();
        let first = self.expr_list()?;
        if !self.eat_punct("=") {
            return Ok(Stmt::Expr(first));
        }
        let target = to_target(&first)
            .ok_or_else(|| EvalError::syntax("cannot assign to expression", start))?;
        let value = self.expr_list()?;
        if self.check_punct("=") {
            return Err(EvalError::syntax("only single target assignments are supported", self.offset()));
        }
        Ok(Stmt::Assign { target, value })
    }

    /// `a, b, c` – a bare tuple when a comma is present
    fn expr_list(&mut self) -> EvalResult<Expr> {
        let first = self.named_test()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.at_expr_end() {
                break;
            }
            items.push(self.named_test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expr_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Newline | TokenKind::Eof)
            || [")", "]", "}", "=", ";"].iter().any(|p| self.check_punct(p))
    }

    fn named_test(&mut self) -> EvalResult<Expr> {
        if let (TokenKind::Name(name), TokenKind::Punct(":=")) = (self.peek(), self.peek_at(1)) {
            let target = name.clone();
            self.pos += 2;
            let value = self.test()?;
            return Ok(Expr::Named { target, value: Box::new(value) });
        }
        self.test()
    }

    fn test(&mut self) -> EvalResult<Expr> {
        self.enter()?;
        let result = self.test_inner();
        self.leave();
        result
    }

    fn test_inner(&mut self) -> EvalResult<Expr> {
        if self.eat_keyword("lambda") {
            return self.lambda();
        }
        let body = self.or_test()?;
        if !self.eat_keyword("if") {
            return Ok(body);
        }
        let test = self.or_test()?;
        if !self.eat_keyword("else") {
            return Err(self.unexpected("expected 'else' in conditional expression"));
        }
        let orelse = self.test()?;
        Ok(Expr::IfExp { test: Box::new(test), body: Box::new(body), orelse: Box::new(orelse) })
    }

    fn lambda(&mut self) -> EvalResult<Expr> {
        let mut params = Vec::new();
        while !self.check_punct(":") {
            match self.advance() {
                TokenKind::Name(name) => {
                    if params.contains(&name) {
                        return Err(EvalError::syntax(
                            format!("duplicate argument '{}' in lambda", name),
                            self.offset(),
                        ));
                    }
                    params.push(name);
                }
                _ => return Err(EvalError::syntax("invalid lambda parameter", self.offset())),
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(":")?;
        let body = self.test()?;
        Ok(Expr::Lambda { params, body: Arc::new(body) })
    }

    fn or_test(&mut self) -> EvalResult<Expr> {
        let first = self.and_test()?;
        if !self.check_keyword("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("or") {
            values.push(self.and_test()?);
        }
        Ok(Expr::Bool { op: BoolOp::Or, values })
    }

    fn and_test(&mut self) -> EvalResult<Expr> {
        let first = self.not_test()?;
        if !self.check_keyword("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("and") {
            values.push(self.not_test()?);
        }
        Ok(Expr::Bool { op: BoolOp::And, values })
    }

    fn not_test(&mut self) -> EvalResult<Expr> {
        if self.eat_keyword("not") {
            self.enter()?;
            let operand = self.not_test();
            self.leave();
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand?) });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> EvalResult<Expr> {
        let left = self.bit_or()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Punct("==") => CmpOp::Eq,
                TokenKind::Punct("!=") => CmpOp::NotEq,
                TokenKind::Punct("<") => CmpOp::Lt,
                TokenKind::Punct("<=") => CmpOp::LtE,
                TokenKind::Punct(">") => CmpOp::Gt,
                TokenKind::Punct(">=") => CmpOp::GtE,
                TokenKind::Keyword("in") => CmpOp::In,
                TokenKind::Keyword("is") => {
                    if matches!(self.peek_at(1), TokenKind::Keyword("not")) {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                TokenKind::Keyword("not") if matches!(self.peek_at(1), TokenKind::Keyword("in")) => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.bit_or()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare { left: Box::new(left), rest })
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> EvalResult<Expr>,
    ) -> EvalResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat_punct(symbol) {
                    let right = next(self)?;
                    left = Expr::Binary { op: *op, left: Box::new(left), right: Box::new(right) };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn bit_or(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[("<<", BinOp::LShift), (">>", BinOp::RShift)], Self::arith)
    }

    fn arith(&mut self) -> EvalResult<Expr> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> EvalResult<Expr> {
        self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
                ("@", BinOp::MatMul),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> EvalResult<Expr> {
        let op = match self.peek() {
            TokenKind::Punct("-") => UnaryOp::Neg,
            TokenKind::Punct("+") => UnaryOp::Pos,
            TokenKind::Punct("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.factor();
        self.leave();
        Ok(Expr::Unary { op, operand: Box::new(operand?) })
    }

    fn power(&mut self) -> EvalResult<Expr> {
        let base = self.primary()?;
        if self.eat_punct("**") {
            self.enter()?;
            let exponent = self.factor();
            self.leave();
            return Ok(Expr::Binary { op: BinOp::Pow, left: Box::new(base), right: Box::new(exponent?) });
        }
        Ok(base)
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_punct("(") {
                expr = self.call(expr)?;
            } else if self.eat_punct("[") {
                let index = self.subscript()?;
                self.expect_punct("]")?;
                expr = Expr::Subscript { value: Box::new(expr), index: Box::new(index) };
            } else if self.eat_punct(".") {
                match self.advance() {
                    TokenKind::Name(attr) => expr = Expr::Attribute { value: Box::new(expr), attr },
                    _ => return Err(EvalError::syntax("expected attribute name", self.offset())),
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn call(&mut self, func: Expr) -> EvalResult<Expr> {
        self.enter()?;
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check_punct(")") {
            if let (TokenKind::Name(name), TokenKind::Punct("=")) = (self.peek(), self.peek_at(1)) {
                let name = name.clone();
                self.pos += 2;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(EvalError::syntax(format!("keyword argument repeated: {}", name), self.offset()));
                }
                kwargs.push((name, self.test()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(EvalError::syntax(
                        "positional argument follows keyword argument",
                        self.offset(),
                    ));
                }
                let arg = self.named_test()?;
                if self.check_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    args.push(Expr::ListComp { element: Box::new(arg), generators });
                    break;
                }
                args.push(arg);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        self.leave();
        Ok(Expr::Call { func: Box::new(func), args, kwargs })
    }

    fn subscript(&mut self) -> EvalResult<Expr> {
        let first = self.subscript_item()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.check_punct("]") {
                break;
            }
            items.push(self.subscript_item()?);
        }
        if items.iter().any(|i| matches!(i, Expr::Slice { .. })) {
            return Err(EvalError::syntax("extended slicing is not supported", self.offset()));
        }
        Ok(Expr::Tuple(items))
    }

    fn subscript_item(&mut self) -> EvalResult<Expr> {
        let lower = if self.check_punct(":") { None } else { Some(Box::new(self.test()?)) };
        if !self.eat_punct(":") {
            return lower
                .map(|e| *e)
                .ok_or_else(|| self.unexpected("expected subscript"));
        }
        let upper = if self.check_punct(":") || self.check_punct("]") || self.check_punct(",") {
            None
        } else {
            Some(Box::new(self.test()?))
        };
        let step = if self.eat_punct(":") && !self.check_punct("]") && !self.check_punct(",") {
            Some(Box::new(self.test()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn atom(&mut self) -> EvalResult<Expr> {
        if matches!(self.peek(), TokenKind::Eof | TokenKind::Newline) {
            return Err(self.unexpected("invalid syntax"));
        }
        match self.advance() {
            TokenKind::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            TokenKind::Str(s) => {
                let mut text = s;
                while let TokenKind::Str(next) = self.peek() {
                    text.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::Str(text)))
            }
            TokenKind::Name(name) => Ok(Expr::Name(name)),
            TokenKind::Keyword("True") => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::Keyword("False") => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Keyword("None") => Ok(Expr::Literal(Value::None)),
            TokenKind::Punct("(") => self.enclosed(Self::paren_body),
            TokenKind::Punct("[") => self.enclosed(Self::list_body),
            TokenKind::Punct("{") => self.enclosed(Self::dict_body),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("invalid syntax"))
            }
        }
    }

    fn enclosed(&mut self, body: fn(&mut Self) -> EvalResult<Expr>) -> EvalResult<Expr> {
        self.enter()?;
        let result = body(self);
        self.leave();
        result
    }

    fn paren_body(&mut self) -> EvalResult<Expr> {
        if self.eat_punct(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.named_test()?;
        if self.check_keyword("for") {
            let generators = self.comprehension_clauses()?;
            self.expect_punct(")")?;
            return Ok(Expr::ListComp { element: Box::new(first), generators });
        }
        if self.eat_punct(")") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.check_punct(")") {
                break;
            }
            items.push(self.named_test()?);
        }
        self.expect_punct(")")?;
        Ok(Expr::Tuple(items))
    }

    fn list_body(&mut self) -> EvalResult<Expr> {
        if self.eat_punct("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.named_test()?;
        if self.check_keyword("for") {
            let generators = self.comprehension_clauses()?;
            self.expect_punct("]")?;
            return Ok(Expr::ListComp { element: Box::new(first), generators });
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.check_punct("]") {
                break;
            }
            items.push(self.named_test()?);
        }
        self.expect_punct("]")?;
        Ok(Expr::List(items))
    }

    fn dict_body(&mut self) -> EvalResult<Expr> {
        let mut entries = Vec::new();
        while !self.check_punct("}") {
            let key = self.test()?;
            if !self.eat_punct(":") {
                return Err(self.unexpected("set literals are not supported; expected ':'"));
            }
            let value = self.test()?;
            if self.check_keyword("for") {
                return Err(EvalError::syntax("dict comprehensions are not supported", self.offset()));
            }
            entries.push((key, value));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Dict(entries))
    }

    fn comprehension_clauses(&mut self) -> EvalResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.eat_keyword("for") {
            let start = self.offset();
            let target_expr = self.target_list()?;
            let target = to_target(&target_expr)
                .ok_or_else(|| EvalError::syntax("invalid comprehension target", start))?;
            if !self.eat_keyword("in") {
                return Err(self.unexpected("expected 'in'"));
            }
            let iter = self.or_test()?;
            let mut conditions = Vec::new();
            while self.eat_keyword("if") {
                conditions.push(self.or_test()?);
            }
            generators.push(Comprehension { target, iter, conditions });
        }
        Ok(generators)
    }

    /// Comprehension targets stop before `in`, so they are parsed below comparisons
    fn target_list(&mut self) -> EvalResult<Expr> {
        let first = self.bit_or()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.check_keyword("in") {
                break;
            }
            items.push(self.bit_or()?);
        }
        Ok(Expr::Tuple(items))
    }
}

fn to_target(expr: &Expr) -> Option<Target> {
    match expr {
        Expr::Name(name) => Some(Target::Name(name.clone())),
        Expr::Tuple(items) | Expr::List(items) => {
            items.iter().map(to_target).collect::<Option<Vec<_>>>().map(Target::Tuple)
        }
        _ => None,
    }
}
