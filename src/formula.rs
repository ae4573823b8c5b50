//! Restricted arithmetic over named field values.
//!
//! Evaluation runs in three stages:
//!
//! 1. Every identifier (`[A-Za-z_][A-Za-z0-9_]*`) is replaced by the numeric coercion of its
//!    value, parenthesised. Missing or non-numeric values become `0`.
//! 2. The substituted text must consist only of digits, whitespace, `+ - * / ( ) .`.
//!    Anything else rejects the expression before it is parsed.
//! 3. The text is tokenized into that closed set and evaluated by a recursive-descent
//!    parser with the usual precedence and left associativity.
//!
//! [`evaluate`] never fails: rejected expressions and non-finite results yield `0`.
//! [`try_evaluate`] reports why.

use crate::error::{CalculationError, Result};
use crate::schema::{FieldValue, FieldValues};
use log::warn;

const MAX_NESTING: usize = 64;
/// Bounds the depth of the left-leaning tree a flat operator chain builds.
const MAX_TOKENS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn eval(&self) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Neg(e) => -e.eval(),
            Expr::Add(a, b) => a.eval() + b.eval(),
            Expr::Sub(a, b) => a.eval() - b.eval(),
            Expr::Mul(a, b) => a.eval() * b.eval(),
            Expr::Div(a, b) => a.eval() / b.eval(),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Identifiers referenced by an expression, in order of first appearance.
pub fn identifiers(expression: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(c) = chars.next() {
        if is_identifier_start(c) {
            let mut name = String::from(c);
            while let Some(&next) = chars.peek() {
                if !is_identifier_char(next) {
                    break;
                }
                name.push(next);
                chars.next();
            }
            if !found.contains(&name) {
                found.push(name);
            }
        }
    }
    found
}

/// Replaces each identifier with its parenthesised numeric value.
pub fn substitute(expression: &str, values: &FieldValues) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut chars = expression.chars().peekable();
    while let Some(c) = chars.next() {
        if !is_identifier_start(c) {
            out.push(c);
            continue;
        }
        let mut name = String::from(c);
        while let Some(&next) = chars.peek() {
            if !is_identifier_char(next) {
                break;
            }
            name.push(next);
            chars.next();
        }
        let value = values.get(&name).map(FieldValue::as_number).unwrap_or(0.0);
        out.push_str(&format!("({})", value));
    }
    out
}

/// True when `text` is non-empty and made only of `[0-9\s+\-*/().]`.
pub fn is_safe_arithmetic(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || "+-*/().".contains(c))
}

fn invalid(expression: &str, reason: impl Into<String>) -> CalculationError {
    CalculationError::InvalidExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| invalid(text, format!("invalid number '{}'", literal)))?;
                tokens.push(Token::Number(value));
                continue;
            }
            other => return Err(invalid(text, format!("unexpected character '{}'", other))),
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn parse(mut self) -> Result<Expr> {
        if self.tokens.is_empty() {
            return Err(invalid(self.source, "empty expression"));
        }
        let expr = self.expression()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(invalid(self.source, format!("unexpected {:?}", token))),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.advance();
                    left = Expr::Add(Box::new(left), Box::new(self.term()?));
                }
                Token::Minus => {
                    self.advance();
                    left = Expr::Sub(Box::new(left), Box::new(self.term()?));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.advance();
                    left = Expr::Mul(Box::new(left), Box::new(self.unary()?));
                }
                Token::Slash => {
                    self.advance();
                    left = Expr::Div(Box::new(left), Box::new(self.unary()?));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(invalid(self.source, "expression nested too deeply"));
        }
        let expr = match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Expr::Neg(Box::new(self.unary()?))
            }
            Some(Token::Plus) => {
                self.advance();
                self.unary()?
            }
            _ => self.primary()?,
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(invalid(self.source, "missing closing parenthesis")),
                }
            }
            Some(token) => Err(invalid(self.source, format!("unexpected {:?}", token))),
            None => Err(invalid(self.source, "unexpected end of expression")),
        }
    }
}

/// Parses substituted arithmetic text. Rejects anything outside the safe character set.
pub fn parse_arithmetic(text: &str) -> Result<Expr> {
    if !is_safe_arithmetic(text) {
        return Err(invalid(text, "disallowed characters after substitution"));
    }
    let tokens = tokenize(text)?;
    if tokens.len() > MAX_TOKENS {
        return Err(invalid(
            text,
            format!("expression longer than {} tokens", MAX_TOKENS),
        ));
    }
    Parser::new(text, tokens).parse()
}

pub fn try_evaluate(expression: &str, values: &FieldValues) -> Result<f64> {
    let substituted = substitute(expression, values);
    let expr = parse_arithmetic(&substituted).map_err(|e| match e {
        CalculationError::InvalidExpression { reason, .. } => invalid(expression, reason),
        other => other,
    })?;
    let result = expr.eval();
    Ok(if result.is_finite() { result } else { 0.0 })
}

pub fn evaluate(expression: &str, values: &FieldValues) -> f64 {
    match try_evaluate(expression, values) {
        Ok(value) => value,
        Err(e) => {
            warn!("Formula rejected, using 0: {}", e);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, FieldValue)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_learnership_formula() {
        let v = values(&[
            ("learnerCount", 15.into()),
            ("costPerLearner", "28000".into()),
        ]);
        assert_eq!(evaluate("learnerCount * costPerLearner", &v), 420000.0);
    }

    #[test]
    fn test_precedence_and_associativity() {
        let v = FieldValues::new();
        assert_eq!(evaluate("2 + 3 * 4", &v), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4", &v), 20.0);
        assert_eq!(evaluate("100 / 10 / 2", &v), 5.0);
        assert_eq!(evaluate("10 - 4 - 3", &v), 3.0);
        assert_eq!(evaluate("-3 * -2", &v), 6.0);
        assert_eq!(evaluate("1.5 * 4", &v), 6.0);
    }

    #[test]
    fn test_missing_and_non_numeric_values_are_zero() {
        let v = values(&[("a", "not a number".into())]);
        assert_eq!(evaluate("a + b + 7", &v), 7.0);
    }

    #[test]
    fn test_negative_values_substitute_safely() {
        let v = values(&[("a", 10.into()), ("b", (-4).into())]);
        assert_eq!(evaluate("a - b", &v), 14.0);
        assert_eq!(substitute("a-b", &v), "(10)-(-4)");
    }

    #[test]
    fn test_injection_never_evaluates() {
        let v = values(&[("a", "1); process.exit(".into())]);
        assert_eq!(evaluate("a * 2", &v), 0.0);

        let v = FieldValues::new();
        assert!(try_evaluate("a; b", &v).is_err());
        assert!(try_evaluate("a ** 2", &v).is_err());
        assert!(try_evaluate("a % 2", &v).is_err());
        assert!(try_evaluate("a == b", &v).is_err());
        assert!(try_evaluate("\"text\"", &v).is_err());
        assert_eq!(evaluate("a % 2", &v), 0.0);
    }

    #[test]
    fn test_malformed_arithmetic_is_rejected() {
        let v = FieldValues::new();
        for expr in ["", "(1 + 2", "1 + 2)", "1 +", "1.2.3 + 1", "2 3", "()"] {
            assert!(try_evaluate(expr, &v).is_err(), "expected rejection: {:?}", expr);
        }
        // A number glued to an identifier is not implicit multiplication
        let v = values(&[("x", 5.into())]);
        assert!(try_evaluate("2x", &v).is_err());
    }

    #[test]
    fn test_division_by_zero_yields_zero() {
        let v = values(&[("a", 10.into())]);
        assert_eq!(evaluate("a / b", &v), 0.0);
        assert_eq!(evaluate("b / b", &v), 0.0);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(try_evaluate(&deep, &FieldValues::new()).is_err());
        let fine = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&fine, &FieldValues::new()), 1.0);
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let v = FieldValues::new();
        let long = format!("{}1", "1+".repeat(20_000));
        assert!(try_evaluate(&long, &v).is_err());
        assert_eq!(evaluate(&long, &v), 0.0);

        let short = format!("{}1", "1+".repeat(400));
        assert_eq!(evaluate(&short, &v), 401.0);
    }

    #[test]
    fn test_deterministic() {
        let v = values(&[("a", 3.25.into()), ("b", 7.into())]);
        let first = evaluate("a * b / (a + b)", &v);
        for _ in 0..10 {
            assert_eq!(evaluate("a * b / (a + b)", &v).to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(
            identifiers("learnerCount * costPerLearner + learnerCount"),
            vec!["learnerCount", "costPerLearner"]
        );
        assert!(identifiers("1 + 2").is_empty());
    }
}
