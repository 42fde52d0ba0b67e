/// Tokenizer for the expression language
///
/// Produces a flat token stream with byte offsets. Newlines are only significant
/// outside of brackets, where they separate top-level statements.

use crate::eval::error::{EvalError, EvalResult};

/// Reserved words; never usable as names
pub const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "for", "lambda", "None", "True", "False",
];

/// Multi-character operators must precede their single-character prefixes
const PUNCTUATION: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", ":=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Keyword(&'static str),
    Punct(&'static str),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Split `source` into tokens
pub fn tokenize(source: &str) -> EvalResult<Vec<Token>> {
    let mut lexer = Lexer { chars: source.char_indices().collect(), pos: 0, depth: 0, len: source.len() };
    lexer.run()
}

struct Lexer {
    chars: Vec<(usize, char)>,
    pos: usize,
    depth: usize,
    len: usize,
}

impl Lexer {
    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|(o, _)| *o).unwrap_or(self.len)
    }

    fn run(&mut self) -> EvalResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek(0) {
            let offset = self.offset();
            match c {
                '#' => {
                    while let Some(c) = self.peek(0) {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '\\' if self.peek(1) == Some('\n') => self.pos += 2,
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        tokens.push(Token { kind: TokenKind::Newline, offset });
                    }
                }
                c if c.is_whitespace() => self.pos += 1,
                c if c.is_ascii_digit() => tokens.push(self.number(offset)?),
                '.' if self.peek(1).is_some_and(|n| n.is_ascii_digit()) => {
                    tokens.push(self.number(offset)?)
                }
                '\'' | '"' => {
                    let text = self.string(false)?;
                    tokens.push(Token { kind: TokenKind::Str(text), offset });
                }
                'r' | 'R' if matches!(self.peek(1), Some('\'') | Some('"')) => {
                    self.pos += 1;
                    let text = self.string(true)?;
                    tokens.push(Token { kind: TokenKind::Str(text), offset });
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = self.pos;
                    while self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
                        self.pos += 1;
                    }
                    let word: String = self.chars[start..self.pos].iter().map(|(_, c)| *c).collect();
                    let kind = match KEYWORDS.iter().find(|k| **k == word) {
                        Some(k) => TokenKind::Keyword(k),
                        None => TokenKind::Name(word),
                    };
                    tokens.push(Token { kind, offset });
                }
                _ => {
                    let punct = PUNCTUATION
                        .iter()
                        .find(|p| p.chars().enumerate().all(|(i, pc)| self.peek(i) == Some(pc)))
                        .ok_or_else(|| EvalError::syntax(format!("invalid character '{}'", c), offset))?;
                    self.pos += punct.chars().count();
                    match *punct {
                        "(" | "[" | "{" => self.depth += 1,
                        ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                        _ => {}
                    }
                    tokens.push(Token { kind: TokenKind::Punct(punct), offset });
                }
            }
        }
        tokens.push(Token { kind: TokenKind::Eof, offset: self.len });
        Ok(tokens)
    }

    fn number(&mut self, offset: usize) -> EvalResult<Token> {
        let radix = match (self.peek(0), self.peek(1)) {
            (Some('0'), Some('x' | 'X')) => 16,
            (Some('0'), Some('o' | 'O')) => 8,
            (Some('0'), Some('b' | 'B')) => 2,
            _ => 10,
        };
        if radix != 10 {
            self.pos += 2;
            let digits = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let value = i64::from_str_radix(&digits.replace('_', ""), radix)
                .map_err(|_| EvalError::syntax(format!("invalid integer literal '{}'", digits), offset))?;
            return Ok(Token { kind: TokenKind::Int(value), offset });
        }

        let mut text = self.take_while(|c| c.is_ascii_digit() || c == '_');
        let mut is_float = false;
        if self.peek(0) == Some('.') && !self.peek(1).is_some_and(|c| c.is_alphabetic() || c == '_') {
            is_float = true;
            self.pos += 1;
            text.push('.');
            text.push_str(&self.take_while(|c| c.is_ascii_digit() || c == '_'));
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = matches!(self.peek(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.pos += 1;
                if sign {
                    text.push(self.peek(0).unwrap_or('+'));
                    self.pos += 1;
                }
                text.push_str(&self.take_while(|c| c.is_ascii_digit()));
            }
        }
        let mut clean = text.replace('_', "");
        if clean.starts_with('.') {
            clean.insert(0, '0');
        }
        let kind = if is_float {
            TokenKind::Float(
                clean
                    .parse()
                    .map_err(|_| EvalError::syntax(format!("invalid float literal '{}'", text), offset))?,
            )
        } else {
            TokenKind::Int(clean.parse().map_err(|_| {
                EvalError::syntax(format!("integer literal '{}' is too large", text), offset)
            })?)
        };
        Ok(Token { kind, offset })
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek(0) {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn string(&mut self, raw: bool) -> EvalResult<String> {
        let start = self.offset();
        let quote = self.peek(0).unwrap_or('\'');
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let c = self
                .peek(0)
                .ok_or_else(|| EvalError::syntax("unterminated string literal", start))?;
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(out);
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(out);
                }
            }
            if c == '\n' && !triple {
                return Err(EvalError::syntax("unterminated string literal", start));
            }
            self.pos += 1;
            if c != '\\' || raw {
                out.push(c);
                continue;
            }
            let escaped = self
                .peek(0)
                .ok_or_else(|| EvalError::syntax("unterminated string literal", start))?;
            self.pos += 1;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '\n' => {}
                'x' | 'u' => {
                    let width = if escaped == 'x' { 2 } else { 4 };
                    let hex: String = (0..width).filter_map(|i| self.peek(i)).collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == width)
                        .and_then(char::from_u32)
                        .ok_or_else(|| EvalError::syntax("invalid escape sequence", start))?;
                    self.pos += width;
                    out.push(code);
                }
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            kinds("a**2 // 3"),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Punct("**"),
                TokenKind::Int(2),
                TokenKind::Punct("//"),
                TokenKind::Int(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_strings() {
        assert_eq!(kinds("0x1F")[0], TokenKind::Int(31));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        assert_eq!(kinds("2.5e3")[0], TokenKind::Float(2500.0));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
        assert_eq!(kinds(r#"'a\n\'b'"#)[0], TokenKind::Str("a\n'b".into()));
        assert_eq!(kinds(r"r'a\n'")[0], TokenKind::Str("a\\n".into()));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let tokens = kinds("[1,\n2]\nx");
        assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn keywords_are_not_names() {
        assert_eq!(kinds("not x")[0], TokenKind::Keyword("not"));
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        assert!(matches!(tokenize("'abc"), Err(EvalError::Syntax { .. })));
        assert!(matches!(tokenize("a $ b"), Err(EvalError::Syntax { .. })));
    }
}
