//! Test and collection expressions.
//!
//! A small expression language evaluated against a parameter object:
//!
//! ```text
//! name != null and name != ''
//! ids.size() > 0 && !archived
//! user.age gte 18 or (role == 'admin')
//! ```
//!
//! Expressions are parsed once when the fragment tree is built. Evaluation
//! never fails: missing properties read as null.

use sqlmapper_core::{Error, Object, Result, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

/// Name lookup for the first segment of a path.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<&Object>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Property(String),
    Index(usize),
    /// `size()` or `length()`
    Size,
    /// `isEmpty()`
    IsEmpty,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path { root: String, steps: Vec<Step> },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse an expression.
    pub fn parse(source: &str) -> Result<Expr> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate to an object.
    pub fn evaluate(&self, scope: &dyn Scope) -> Object {
        match self {
            Expr::Literal(v) => Object::Value(v.clone()),
            Expr::Path { root, steps } => resolve_path(root, steps, scope)
                .map(Cow::into_owned)
                .unwrap_or_else(Object::null),
            other => Object::Value(Value::Bool(other.evaluate_bool(scope))),
        }
    }

    /// Evaluate as a condition.
    pub fn evaluate_bool(&self, scope: &dyn Scope) -> bool {
        match self {
            Expr::Literal(v) => truthy(&Object::Value(v.clone())),
            Expr::Path { root, steps } => {
                resolve_path(root, steps, scope).is_some_and(|obj| truthy(&obj))
            }
            Expr::Not(inner) => !inner.evaluate_bool(scope),
            Expr::And(a, b) => a.evaluate_bool(scope) && b.evaluate_bool(scope),
            Expr::Or(a, b) => a.evaluate_bool(scope) || b.evaluate_bool(scope),
            Expr::Compare(op, a, b) => {
                let left = a.evaluate(scope);
                let right = b.evaluate(scope);
                match op {
                    CompareOp::Eq => equals(&left, &right),
                    CompareOp::Ne => !equals(&left, &right),
                    CompareOp::Lt => compare(&left, &right) == Some(Ordering::Less),
                    CompareOp::Le => matches!(
                        compare(&left, &right),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    CompareOp::Gt => compare(&left, &right) == Some(Ordering::Greater),
                    CompareOp::Ge => matches!(
                        compare(&left, &right),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                }
            }
        }
    }
}

fn resolve_path<'a>(root: &str, steps: &[Step], scope: &'a dyn Scope) -> Option<Cow<'a, Object>> {
    let mut current = Cow::Borrowed(scope.lookup(root)?);
    for step in steps {
        current = match (step, current) {
            (Step::Property(name), Cow::Borrowed(obj)) => match obj {
                Object::Map(m) => Cow::Borrowed(m.get(name)?),
                other if is_size_alias(name) => Cow::Owned(size_of(other)),
                _ => return None,
            },
            (Step::Property(name), Cow::Owned(obj)) => match obj {
                Object::Map(mut m) => Cow::Owned(m.remove(name)?),
                other if is_size_alias(name) => Cow::Owned(size_of(&other)),
                _ => return None,
            },
            (Step::Index(i), Cow::Borrowed(obj)) => match obj {
                Object::List(items) => Cow::Borrowed(items.get(*i)?),
                Object::Value(Value::Array(items)) => {
                    Cow::Owned(Object::Value(items.get(*i)?.clone()))
                }
                _ => return None,
            },
            (Step::Index(i), Cow::Owned(obj)) => match obj {
                Object::List(mut items) if *i < items.len() => Cow::Owned(items.swap_remove(*i)),
                Object::Value(Value::Array(items)) => {
                    Cow::Owned(Object::Value(items.get(*i)?.clone()))
                }
                _ => return None,
            },
            (Step::Size, obj) => Cow::Owned(size_of(&obj)),
            (Step::IsEmpty, obj) => Cow::Owned(Object::from(obj.is_empty())),
        };
    }
    Some(current)
}

fn is_size_alias(name: &str) -> bool {
    name == "length" || name == "size"
}

fn size_of(obj: &Object) -> Object {
    Object::from(obj.len() as i64)
}

/// Condition truthiness: null is false, booleans are themselves, numbers are
/// true when non-zero, anything else that is present is true.
pub fn truthy(obj: &Object) -> bool {
    match obj {
        Object::Value(Value::Null) => false,
        Object::Value(Value::Bool(b)) => *b,
        Object::Value(v) if v.is_numeric() => v.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) => None,
        other => other.as_f64(),
    }
}

/// Loose equality between evaluated operands.
pub fn equals(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Value(Value::Null), Object::Value(Value::Null)) => true,
        (Object::Value(Value::Null), _) | (_, Object::Value(Value::Null)) => false,
        (Object::Value(x), Object::Value(y)) => {
            if x.is_numeric() || y.is_numeric() {
                if let (Some(l), Some(r)) = (x.as_i64(), y.as_i64()) {
                    return l == r;
                }
                if let (Some(l), Some(r)) = (numeric(x), numeric(y)) {
                    return l == r;
                }
            }
            match (x, y) {
                (Value::Bool(l), Value::Bool(r)) => l == r,
                (Value::Text(l), Value::Text(r)) => l == r,
                _ => x == y || x.to_string() == y.to_string(),
            }
        }
        _ => a == b,
    }
}

/// Ordering between evaluated operands; `None` when they are not comparable.
pub fn compare(a: &Object, b: &Object) -> Option<Ordering> {
    let (Object::Value(x), Object::Value(y)) = (a, b) else {
        return None;
    };
    if x.is_null() || y.is_null() {
        return None;
    }
    if let (Some(l), Some(r)) = (x.as_i64(), y.as_i64()) {
        return Some(l.cmp(&r));
    }
    if let (Some(l), Some(r)) = (numeric(x), numeric(y)) {
        return l.partial_cmp(&r);
    }
    match (x, y) {
        (Value::Text(l), Value::Text(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
}

fn syntax_error(source: &str, message: &str) -> Error {
    Error::config(format!(
        "Error parsing expression '{}': {}",
        source, message
    ))
}

fn tokenize(source: &str) -> Result<Vec<Tok>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Tok::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Tok::Dot);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax_error(source, "unterminated string literal")),
                        Some('\\') if chars.get(i + 1).is_some() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Tok::Str(text));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // a dot followed by a letter is a method call on the number
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(char::is_ascii_digit) {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if text.contains('.') {
                    let f = text
                        .parse::<f64>()
                        .map_err(|_| syntax_error(source, "invalid number"))?;
                    tokens.push(Tok::Float(f));
                } else {
                    let n = text
                        .parse::<i64>()
                        .map_err(|_| syntax_error(source, "invalid number"))?;
                    tokens.push(Tok::Int(n));
                }
                // numeric type suffixes such as 10L or 1.5d
                if i < chars.len() && matches!(chars[i], 'L' | 'l' | 'd' | 'D' | 'f' | 'F') {
                    i += 1;
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                let op = match two.as_str() {
                    "==" => Some("=="),
                    "!=" => Some("!="),
                    "<=" => Some("<="),
                    ">=" => Some(">="),
                    "&&" => Some("&&"),
                    "||" => Some("||"),
                    _ => None,
                };
                if let Some(op) = op {
                    tokens.push(Tok::Op(op));
                    i += 2;
                    continue;
                }
                let op = match c {
                    '<' => "<",
                    '>' => ">",
                    '!' => "!",
                    '-' => "-",
                    _ => {
                        return Err(syntax_error(
                            source,
                            &format!("unexpected character '{}'", c),
                        ));
                    }
                };
                tokens.push(Tok::Op(op));
                i += 1;
            }
        }
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> Error {
        syntax_error(self.source, message)
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_word(&self, words: &[&str]) -> bool {
        matches!(self.peek(), Some(Tok::Ident(w)) if words.contains(&w.as_str()))
    }

    fn peek_op(&self, ops: &[&str]) -> bool {
        matches!(self.peek(), Some(Tok::Op(op)) if ops.contains(op))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_word(&["or"]) || self.peek_op(&["||"]) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek_word(&["and"]) || self.peek_op(&["&&"]) {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek_word(&["not"]) || self.peek_op(&["!"]) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Tok::Op("==")) => Some(CompareOp::Eq),
            Some(Tok::Op("!=")) => Some(CompareOp::Ne),
            Some(Tok::Op("<")) => Some(CompareOp::Lt),
            Some(Tok::Op("<=")) => Some(CompareOp::Le),
            Some(Tok::Op(">")) => Some(CompareOp::Gt),
            Some(Tok::Op(">=")) => Some(CompareOp::Ge),
            Some(Tok::Ident(w)) => match w.as_str() {
                "eq" => Some(CompareOp::Eq),
                "neq" => Some(CompareOp::Ne),
                "lt" => Some(CompareOp::Lt),
                "lte" => Some(CompareOp::Le),
                "gt" => Some(CompareOp::Gt),
                "gte" => Some(CompareOp::Ge),
                _ => None,
            },
            _ => None,
        };
        let Some(op) = op else {
            return Ok(left);
        };
        self.pos += 1;
        let right = self.parse_primary()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Tok::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(Tok::Int(n)) => Ok(Expr::Literal(Value::BigInt(n))),
            Some(Tok::Float(f)) => Ok(Expr::Literal(Value::Double(f))),
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::Text(s))),
            Some(Tok::Op("-")) => match self.next() {
                Some(Tok::Int(n)) => Ok(Expr::Literal(Value::BigInt(-n))),
                Some(Tok::Float(f)) => Ok(Expr::Literal(Value::Double(-f))),
                _ => Err(self.error("expected a number after '-'")),
            },
            Some(Tok::Ident(word)) => match word.as_str() {
                "null" => Ok(Expr::Literal(Value::Null)),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                _ => self.parse_path(word),
            },
            Some(_) => Err(self.error("unexpected token")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr> {
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let Some(Tok::Ident(name)) = self.next() else {
                        return Err(self.error("expected a property name after '.'"));
                    };
                    if self.peek() == Some(&Tok::LParen) {
                        self.pos += 1;
                        if self.next() != Some(Tok::RParen) {
                            return Err(self.error("methods take no arguments"));
                        }
                        steps.push(match name.as_str() {
                            "size" | "length" => Step::Size,
                            "isEmpty" => Step::IsEmpty,
                            other => {
                                return Err(self.error(&format!("unknown method '{}()'", other)));
                            }
                        });
                    } else {
                        steps.push(Step::Property(name));
                    }
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let step = match self.next() {
                        Some(Tok::Int(n)) => Step::Index(
                            usize::try_from(n).map_err(|_| self.error("negative index"))?,
                        ),
                        Some(Tok::Str(key)) => Step::Property(key),
                        _ => return Err(self.error("expected an index or quoted key")),
                    };
                    if self.next() != Some(Tok::RBracket) {
                        return Err(self.error("expected ']'"));
                    }
                    steps.push(step);
                }
                _ => break,
            }
        }
        Ok(Expr::Path { root, steps })
    }
}
