//! Conditional-directive expression language.
//!
//! Precedence, lowest first: `or`, `and`, equality (`==`, `!=`, `EQ`, `NE`,
//! `IN`), ordering (`<`, `<=`, `>`, `>=`, `LT`, `LE`, `GT`, `GE`), unary
//! `!`/`NOT`, primary. Operands are parsed into a small tree first so `and`
//! and `or` can short-circuit without evaluating the unused side.

use thiserror::Error;

use super::MacroEnv;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExprError(String);

impl ExprError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

type ExprResult<T> = Result<T, ExprError>;

/// Evaluate `text` as a condition under `env`.
pub fn evaluate(text: &str, env: &MacroEnv) -> ExprResult<bool> {
    let expr = parse(text, env)?;
    eval(&expr, env)?.truthy()
}

/// An evaluated operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Num(u64),
    Str(String),
    /// A bare identifier that names no macro; compares as its own text.
    Word(String),
    Undefined,
}

impl Value {
    /// Coerce a macro value: booleans, then numbers, then strings.
    pub fn from_macro(raw: &str) -> Self {
        let text = raw.trim();
        let text = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text);
        if text.eq_ignore_ascii_case("TRUE") {
            Self::Bool(true)
        } else if text.eq_ignore_ascii_case("FALSE") {
            Self::Bool(false)
        } else if let Some(n) = parse_number(text) {
            Self::Num(n)
        } else {
            Self::Str(text.to_string())
        }
    }

    pub fn truthy(&self) -> ExprResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Num(n) => Ok(*n != 0),
            Self::Str(s) if s.is_empty() => Ok(false),
            Self::Str(s) => Err(ExprError::new(format!(
                "string \"{s}\" cannot be used as a condition"
            ))),
            Self::Word(_) | Self::Undefined => Ok(false),
        }
    }

    fn as_number(&self) -> Option<u64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Bool(b) => Some(u64::from(*b)),
            Self::Str(s) | Self::Word(s) => parse_number(s),
            Self::Undefined => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Num(0) => Some(false),
            Self::Num(1) => Some(true),
            Self::Num(_) | Self::Undefined => None,
            Self::Str(s) | Self::Word(s) => {
                if s.eq_ignore_ascii_case("TRUE") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("FALSE") {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Self::Str(s) | Self::Word(s) => Some(s.clone()),
            Self::Num(n) => Some(n.to_string()),
            Self::Bool(true) => Some("TRUE".to_string()),
            Self::Bool(false) => Some("FALSE".to_string()),
            Self::Undefined => None,
        }
    }

    fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Undefined, _) | (_, Self::Undefined) => false,
            (Self::Num(a), b) | (b, Self::Num(a)) => b.as_number() == Some(*a),
            (Self::Bool(a), b) | (b, Self::Bool(a)) => b.as_bool() == Some(*a),
            (a, b) => a.as_text() == b.as_text(),
        }
    }
}

fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    In,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    Op(BinaryOp),
    Macro(String),
    Str(String),
    Num(u64),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Literal(Value),
    Macro(String),
    Ident(String),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

fn tokenize(text: &str, env: &MacroEnv) -> ExprResult<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' => i += 1,
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'$' if bytes.get(i + 1) == Some(&b'(') => {
                let close = text[i + 2..]
                    .find(')')
                    .ok_or_else(|| ExprError::new("unterminated macro reference"))?;
                tokens.push(Token::Macro(text[i + 2..i + 2 + close].trim().to_string()));
                i += close + 3;
            }
            b'"' | b'\'' => {
                let close = text[i + 1..]
                    .find(c as char)
                    .ok_or_else(|| ExprError::new("unterminated string literal"))?;
                tokens.push(Token::Str(env.expand(&text[i + 1..i + 1 + close])));
                i += close + 2;
            }
            b'=' | b'!' | b'<' | b'>' | b'&' | b'|' => {
                let next = bytes.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    (b'=', Some(b'=')) => (Token::Op(BinaryOp::Eq), 2),
                    (b'!', Some(b'=')) => (Token::Op(BinaryOp::Ne), 2),
                    (b'<', Some(b'=')) => (Token::Op(BinaryOp::Le), 2),
                    (b'>', Some(b'=')) => (Token::Op(BinaryOp::Ge), 2),
                    (b'&', Some(b'&')) => (Token::Op(BinaryOp::And), 2),
                    (b'|', Some(b'|')) => (Token::Op(BinaryOp::Or), 2),
                    (b'<', _) => (Token::Op(BinaryOp::Lt), 1),
                    (b'>', _) => (Token::Op(BinaryOp::Gt), 1),
                    (b'!', _) => (Token::Not, 1),
                    _ => {
                        return Err(ExprError::new(format!(
                            "unexpected '{}' at offset {i}",
                            c as char
                        )));
                    }
                };
                tokens.push(token);
                i += width;
            }
            _ if c.is_ascii_alphanumeric() || c == b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'.'))
                {
                    i += 1;
                }
                tokens.push(word_token(&text[start..i])?);
            }
            _ => {
                return Err(ExprError::new(format!(
                    "unexpected '{}' at offset {i}",
                    c as char
                )));
            }
        }
    }

    Ok(tokens)
}

fn word_token(word: &str) -> ExprResult<Token> {
    let op = match word.to_ascii_uppercase().as_str() {
        "OR" => Some(BinaryOp::Or),
        "AND" => Some(BinaryOp::And),
        "EQ" => Some(BinaryOp::Eq),
        "NE" => Some(BinaryOp::Ne),
        "IN" => Some(BinaryOp::In),
        "LT" => Some(BinaryOp::Lt),
        "LE" => Some(BinaryOp::Le),
        "GT" => Some(BinaryOp::Gt),
        "GE" => Some(BinaryOp::Ge),
        "NOT" => return Ok(Token::Not),
        _ => None,
    };
    if let Some(op) = op {
        return Ok(Token::Op(op));
    }
    if word.as_bytes()[0].is_ascii_digit() {
        return parse_number(word)
            .map(Token::Num)
            .ok_or_else(|| ExprError::new(format!("invalid number '{word}'")));
    }
    Ok(Token::Ident(word.to_string()))
}

fn parse(text: &str, env: &MacroEnv) -> ExprResult<Expr> {
    let tokens = tokenize(text, env)?;
    if tokens.is_empty() {
        return Err(ExprError::new("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExprError::new(format!("unexpected trailing {token:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn binary_level(
        &mut self,
        ops: &[BinaryOp],
        operand: fn(&mut Self) -> ExprResult<Expr>,
    ) -> ExprResult<Expr> {
        let mut lhs = operand(self)?;
        while let Some(op) = self.eat_op(ops) {
            let rhs = operand(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or_expr(&mut self) -> ExprResult<Expr> {
        self.binary_level(&[BinaryOp::Or], Self::and_expr)
    }

    fn and_expr(&mut self) -> ExprResult<Expr> {
        self.binary_level(&[BinaryOp::And], Self::equality)
    }

    fn equality(&mut self) -> ExprResult<Expr> {
        self.binary_level(&[BinaryOp::Eq, BinaryOp::Ne, BinaryOp::In], Self::ordering)
    }

    fn ordering(&mut self) -> ExprResult<Expr> {
        self.binary_level(
            &[BinaryOp::Lt, BinaryOp::Le, BinaryOp::Gt, BinaryOp::Ge],
            Self::unary,
        )
    }

    fn unary(&mut self) -> ExprResult<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::new("missing ')'")),
                }
            }
            Some(Token::Num(n)) => Ok(Expr::Literal(Value::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Macro(name)) => Ok(Expr::Macro(name)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("TRUE") => {
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("FALSE") => {
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Some(Token::Ident(word)) => Ok(Expr::Ident(word)),
            Some(token) => Err(ExprError::new(format!("expected an operand, found {token:?}"))),
            None => Err(ExprError::new("expected an operand at end of expression")),
        }
    }
}

fn eval(expr: &Expr, env: &MacroEnv) -> ExprResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Macro(name) => Ok(env.get(name).map_or(Value::Undefined, Value::from_macro)),
        Expr::Ident(word) => Ok(env
            .get(word)
            .map_or_else(|| Value::Word(word.clone()), Value::from_macro)),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.truthy()?)),
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if eval(lhs, env)?.truthy()? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, env)?.truthy()?))
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            if !eval(lhs, env)?.truthy()? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, env)?.truthy()?))
        }
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, env)?;
            let b = eval(rhs, env)?;
            compare(*op, &a, &b).map(Value::Bool)
        }
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> ExprResult<bool> {
    match op {
        BinaryOp::Eq => Ok(a.equals(b)),
        BinaryOp::Ne => Ok(!a.equals(b)),
        BinaryOp::In => {
            let (Some(needle), Some(haystack)) = (a.as_text(), b.as_text()) else {
                return Ok(false);
            };
            Ok(haystack.split_whitespace().any(|w| w == needle))
        }
        _ => {
            let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
                return Err(ExprError::new(format!(
                    "ordering comparison needs numbers, got {a:?} and {b:?}"
                )));
            };
            Ok(match op {
                BinaryOp::Lt => x < y,
                BinaryOp::Le => x <= y,
                BinaryOp::Gt => x > y,
                _ => x >= y,
            })
        }
    }
}
