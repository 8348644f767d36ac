//! Parser and evaluator for the condition/filter expression dialect.
//!
//! Supports exactly what the translator emits plus bare attribute names and
//! parentheses: comparisons (`= <> < <= > >=`), `BETWEEN .. AND ..`,
//! `IN (..)`, `attribute_exists`, `attribute_not_exists`, `contains`,
//! `begins_with`, `NOT` and `AND`. Aliases and placeholders are resolved at
//! parse time, so a parsed [`Expression`] is self-contained.
//!
//! Lexing is done with winnow combinators; the token stream is then consumed
//! by a recursive-descent parser.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use thiserror::Error;
use winnow::combinator::alt;
use winnow::error::ContextError;
use winnow::token::{one_of, take_while};
use winnow::ModalResult;
use winnow::Parser as _;

use crate::query::value::Value;
use crate::store::Item;

/// Failure to parse an expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    /// Input ended in the middle of a clause.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A token appeared where it is not allowed.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    /// A character that starts no token.
    #[error("unrecognized character '{0}'")]
    InvalidCharacter(char),
    /// `#alias` missing from the name map.
    #[error("undefined attribute name alias {0}")]
    UnknownName(String),
    /// `:placeholder` missing from the value map.
    #[error("undefined value placeholder {0}")]
    UnknownValue(String),
}

/// Comparison operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Name(String),
    Placeholder(String),
    Dot,
    Comma,
    LParen,
    RParen,
    Compare(CompareOp),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) | Token::Name(w) | Token::Placeholder(w) => w.clone(),
            Token::Dot => ".".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Compare(op) => format!("{op:?}"),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

type Input<'a> = &'a str;

fn skip_ws(input: &mut Input<'_>) {
    let _: ModalResult<&str, ContextError> =
        take_while(0.., char::is_whitespace).parse_next(input);
}

fn compare_op(input: &mut Input<'_>) -> ModalResult<Token> {
    // Two-character operators first so `<=` never lexes as `<` `=`.
    alt((
        "<>".value(CompareOp::Ne),
        "<=".value(CompareOp::Le),
        ">=".value(CompareOp::Ge),
        '<'.value(CompareOp::Lt),
        '>'.value(CompareOp::Gt),
        '='.value(CompareOp::Eq),
    ))
    .map(Token::Compare)
    .parse_next(input)
}

fn punctuation(input: &mut Input<'_>) -> ModalResult<Token> {
    alt((
        '.'.value(Token::Dot),
        ','.value(Token::Comma),
        '('.value(Token::LParen),
        ')'.value(Token::RParen),
    ))
    .parse_next(input)
}

fn name(input: &mut Input<'_>) -> ModalResult<Token> {
    ('#', take_while(1.., is_ident))
        .take()
        .map(|s: &str| Token::Name(s.to_string()))
        .parse_next(input)
}

fn placeholder(input: &mut Input<'_>) -> ModalResult<Token> {
    (':', take_while(1.., is_ident))
        .take()
        .map(|s: &str| Token::Placeholder(s.to_string()))
        .parse_next(input)
}

fn word(input: &mut Input<'_>) -> ModalResult<Token> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., is_ident),
    )
        .take()
        .map(|s: &str| Token::Word(s.to_string()))
        .parse_next(input)
}

fn next_token(input: &mut Input<'_>) -> ModalResult<Token> {
    alt((compare_op, punctuation, name, placeholder, word)).parse_next(input)
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut input: Input<'_> = text;
    let mut tokens = Vec::new();
    loop {
        skip_ws(&mut input);
        let Some(c) = input.chars().next() else {
            break;
        };
        match next_token.parse_next(&mut input) {
            Ok(token) => tokens.push(token),
            Err(_) => return Err(ExpressionError::InvalidCharacter(c)),
        }
    }
    Ok(tokens)
}

/// Attribute path or bound value.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Attribute path, one entry per segment.
    Path(Vec<String>),
    /// Resolved placeholder value.
    Literal(Value),
}

/// Parsed predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Conjunction.
    And(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
    /// Binary comparison.
    Compare(Operand, CompareOp, Operand),
    /// Inclusive range.
    Between(Operand, Operand, Operand),
    /// Membership.
    In(Operand, Vec<Operand>),
    /// `attribute_exists(path)`
    Exists(Vec<String>),
    /// `attribute_not_exists(path)`
    NotExists(Vec<String>),
    /// `contains(path, operand)`
    Contains(Vec<String>, Operand),
    /// `begins_with(path, operand)`
    BeginsWith(Vec<String>, Operand),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'a BTreeMap<String, String>,
    values: &'a BTreeMap<String, Value>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExpressionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken(token.describe()))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ExpressionError> {
        let token = self.next()?;
        if token.is_keyword(keyword) {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken(token.describe()))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn conjunction(&mut self) -> Result<Predicate, ExpressionError> {
        let mut terms = vec![self.unary()?];
        while self.at_keyword("AND") {
            self.pos += 1;
            terms.push(self.unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Predicate::And(terms)
        })
    }

    fn unary(&mut self) -> Result<Predicate, ExpressionError> {
        if self.at_keyword("NOT") {
            self.pos += 1;
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.conjunction()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        if let Some(function) = self.function_name() {
            return self.function(&function);
        }
        let left = self.operand()?;
        match self.next()? {
            Token::Compare(op) => Ok(Predicate::Compare(left, op, self.operand()?)),
            t if t.is_keyword("BETWEEN") => {
                let low = self.operand()?;
                self.expect_keyword("AND")?;
                Ok(Predicate::Between(left, low, self.operand()?))
            }
            t if t.is_keyword("IN") => {
                self.expect(Token::LParen)?;
                let mut candidates = vec![self.operand()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    candidates.push(self.operand()?);
                }
                self.expect(Token::RParen)?;
                Ok(Predicate::In(left, candidates))
            }
            other => Err(ExpressionError::UnexpectedToken(other.describe())),
        }
    }

    fn function_name(&self) -> Option<String> {
        match (self.peek(), self.tokens.get(self.pos + 1)) {
            (Some(Token::Word(w)), Some(Token::LParen)) => Some(w.to_ascii_lowercase()),
            _ => None,
        }
    }

    fn function(&mut self, name: &str) -> Result<Predicate, ExpressionError> {
        self.pos += 2;
        let path = self.path()?;
        let predicate = match name {
            "attribute_exists" => Predicate::Exists(path),
            "attribute_not_exists" => Predicate::NotExists(path),
            "contains" | "begins_with" => {
                self.expect(Token::Comma)?;
                let operand = self.operand()?;
                if name == "contains" {
                    Predicate::Contains(path, operand)
                } else {
                    Predicate::BeginsWith(path, operand)
                }
            }
            other => return Err(ExpressionError::UnexpectedToken(other.to_string())),
        };
        self.expect(Token::RParen)?;
        Ok(predicate)
    }

    fn operand(&mut self) -> Result<Operand, ExpressionError> {
        if let Some(Token::Placeholder(p)) = self.peek() {
            let value = self
                .values
                .get(p)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownValue(p.clone()))?;
            self.pos += 1;
            return Ok(Operand::Literal(value));
        }
        Ok(Operand::Path(self.path()?))
    }

    fn path(&mut self) -> Result<Vec<String>, ExpressionError> {
        let mut segments = vec![self.segment()?];
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            segments.push(self.segment()?);
        }
        Ok(segments)
    }

    fn segment(&mut self) -> Result<String, ExpressionError> {
        match self.next()? {
            Token::Name(alias) => self
                .names
                .get(&alias)
                .cloned()
                .ok_or(ExpressionError::UnknownName(alias)),
            Token::Word(word) => Ok(word),
            other => Err(ExpressionError::UnexpectedToken(other.describe())),
        }
    }
}

/// A parsed, placeholder-resolved expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    root: Predicate,
}

impl Expression {
    /// Parses `text`, resolving `#alias` and `:placeholder` tokens.
    pub fn parse(
        text: &str,
        names: &BTreeMap<String, String>,
        values: &BTreeMap<String, Value>,
    ) -> Result<Self, ExpressionError> {
        let mut parser = Parser {
            tokens: tokenize(text)?,
            pos: 0,
            names,
            values,
        };
        let root = parser.conjunction()?;
        if let Some(extra) = parser.peek() {
            return Err(ExpressionError::UnexpectedToken(extra.describe()));
        }
        Ok(Self { root })
    }

    /// Root predicate.
    pub fn predicate(&self) -> &Predicate {
        &self.root
    }

    /// Whether a top-level conjunct is `attribute = literal`.
    pub fn has_equality_on(&self, attribute: &str) -> bool {
        let conjuncts: &[Predicate] = match &self.root {
            Predicate::And(terms) => terms,
            single => std::slice::from_ref(single),
        };
        conjuncts.iter().any(|p| {
            matches!(
                p,
                Predicate::Compare(Operand::Path(path), CompareOp::Eq, Operand::Literal(_))
                    if path.len() == 1 && path[0] == attribute
            )
        })
    }

    /// Evaluates the expression against `item`.
    pub fn matches(&self, item: &Item) -> bool {
        evaluate(&self.root, item)
    }
}

/// Resolves a (possibly nested) attribute path inside `item`.
pub fn resolve<'a>(item: &'a Item, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = item.get(first)?;
    for segment in rest {
        match current {
            Value::Map(entries) => current = entries.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn operand<'a>(item: &'a Item, op: &'a Operand) -> Option<&'a Value> {
    match op {
        Operand::Path(path) => resolve(item, path),
        Operand::Literal(value) => Some(value),
    }
}

fn evaluate(predicate: &Predicate, item: &Item) -> bool {
    match predicate {
        Predicate::And(terms) => terms.iter().all(|t| evaluate(t, item)),
        Predicate::Not(inner) => !evaluate(inner, item),
        Predicate::Compare(left, op, right) => {
            let (left, right) = (operand(item, left), operand(item, right));
            match op {
                CompareOp::Eq => matches!((left, right), (Some(l), Some(r)) if l.loosely_equals(r)),
                CompareOp::Ne => !matches!((left, right), (Some(l), Some(r)) if l.loosely_equals(r)),
                ordering => {
                    let Some(cmp) = left.zip(right).and_then(|(l, r)| l.compare(r)) else {
                        return false;
                    };
                    match ordering {
                        CompareOp::Lt => cmp == Ordering::Less,
                        CompareOp::Le => cmp != Ordering::Greater,
                        CompareOp::Gt => cmp == Ordering::Greater,
                        _ => cmp != Ordering::Less,
                    }
                }
            }
        }
        Predicate::Between(target, low, high) => {
            let (Some(v), Some(lo), Some(hi)) =
                (operand(item, target), operand(item, low), operand(item, high))
            else {
                return false;
            };
            matches!(v.compare(lo), Some(Ordering::Greater | Ordering::Equal))
                && matches!(v.compare(hi), Some(Ordering::Less | Ordering::Equal))
        }
        Predicate::In(target, candidates) => operand(item, target).is_some_and(|v| {
            candidates
                .iter()
                .filter_map(|c| operand(item, c))
                .any(|c| v.loosely_equals(c))
        }),
        Predicate::Exists(path) => resolve(item, path).is_some(),
        Predicate::NotExists(path) => resolve(item, path).is_none(),
        Predicate::Contains(path, needle) => {
            match (resolve(item, path), operand(item, needle)) {
                (Some(Value::String(hay)), Some(Value::String(n))) => hay.contains(n.as_str()),
                (Some(Value::List(values)), Some(n)) => values.iter().any(|v| v.loosely_equals(n)),
                _ => false,
            }
        }
        Predicate::BeginsWith(path, prefix) => match (resolve(item, path), operand(item, prefix)) {
            (Some(Value::String(s)), Some(Value::String(p))) => s.starts_with(p.as_str()),
            (Some(Value::Bytes(b)), Some(Value::Bytes(p))) => b.starts_with(p),
            _ => false,
        },
    }
}
