//! Named-attribute predicates and the fluent builder that produces them.
//!
//! A [`Condition`] pairs an attribute path with a [`Comparator`] and the
//! operands that comparator needs. Operand arity is carried by the
//! [`Operands`] variant rather than by a bare value list, so a condition that
//! exists is always well-formed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConditionError;
use crate::query::value::Value;

/// Comparison applied between an attribute and its operands.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    /// `attr = v`
    Equals,
    /// `attr <> v`
    NotEquals,
    /// `attr < v`
    LessThan,
    /// `attr <= v`
    LessThanEquals,
    /// `attr > v`
    GreaterThan,
    /// `attr >= v`
    GreaterThanEquals,
    /// `attr BETWEEN lo AND hi`
    Between,
    /// `contains(attr, v)`
    Contains,
    /// `NOT contains(attr, v)`
    NotContains,
    /// `attribute_exists(attr)`
    Exists,
    /// `attribute_not_exists(attr)`
    NotExists,
    /// `attr IN (v, ...)`
    In,
    /// `begins_with(attr, v)`
    StartsWith,
}

/// Number of operands a comparator takes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Arity {
    /// No operands.
    Nullary,
    /// Exactly one operand.
    Unary,
    /// Exactly two operands.
    Binary,
    /// One or more operands.
    Variadic,
}

impl Comparator {
    /// All comparators in declaration order.
    pub const ALL: [Comparator; 13] = [
        Comparator::Equals,
        Comparator::NotEquals,
        Comparator::LessThan,
        Comparator::LessThanEquals,
        Comparator::GreaterThan,
        Comparator::GreaterThanEquals,
        Comparator::Between,
        Comparator::Contains,
        Comparator::NotContains,
        Comparator::Exists,
        Comparator::NotExists,
        Comparator::In,
        Comparator::StartsWith,
    ];

    /// Operand arity required by this comparator.
    pub fn arity(self) -> Arity {
        match self {
            Comparator::Exists | Comparator::NotExists => Arity::Nullary,
            Comparator::Between => Arity::Binary,
            Comparator::In => Arity::Variadic,
            _ => Arity::Unary,
        }
    }

    /// Whether the comparator may restrict a sort/range key.
    pub fn supports_range_key(self) -> bool {
        matches!(
            self,
            Comparator::Equals
                | Comparator::LessThan
                | Comparator::LessThanEquals
                | Comparator::GreaterThan
                | Comparator::GreaterThanEquals
                | Comparator::Between
                | Comparator::StartsWith
        )
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Comparator::Equals => "EQUALS",
            Comparator::NotEquals => "NOT_EQUALS",
            Comparator::LessThan => "LESS_THAN",
            Comparator::LessThanEquals => "LESS_THAN_EQUALS",
            Comparator::GreaterThan => "GREATER_THAN",
            Comparator::GreaterThanEquals => "GREATER_THAN_EQUALS",
            Comparator::Between => "BETWEEN",
            Comparator::Contains => "CONTAINS",
            Comparator::NotContains => "NOT_CONTAINS",
            Comparator::Exists => "EXISTS",
            Comparator::NotExists => "NOT_EXISTS",
            Comparator::In => "IN",
            Comparator::StartsWith => "STARTS_WITH",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operands attached to a condition, tagged by arity.
#[derive(Clone, Debug, PartialEq)]
pub enum Operands {
    /// `EXISTS` / `NOT_EXISTS`.
    None,
    /// Single-valued comparators.
    Single([Value; 1]),
    /// `BETWEEN` bounds, lower first.
    Pair([Value; 2]),
    /// `IN` members; never empty.
    List(Vec<Value>),
}

impl Operands {
    /// Operands as an ordered slice.
    pub fn as_slice(&self) -> &[Value] {
        match self {
            Operands::None => &[],
            Operands::Single(v) => v.as_slice(),
            Operands::Pair(v) => v.as_slice(),
            Operands::List(v) => v.as_slice(),
        }
    }
}

/// Immutable predicate over one attribute path.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    attribute: String,
    comparator: Comparator,
    operands: Operands,
}

impl Condition {
    /// Validates `values` against the comparator's arity and builds a condition.
    pub fn new(
        attribute: impl Into<String>,
        comparator: Comparator,
        values: Vec<Value>,
    ) -> Result<Self, ConditionError> {
        let attribute = attribute.into();
        if attribute.trim().is_empty() {
            return Err(ConditionError::EmptyAttribute);
        }
        let found = values.len();
        let arity_err = |expected| ConditionError::Arity {
            comparator,
            expected,
            found,
        };
        let operands = match comparator.arity() {
            Arity::Nullary if values.is_empty() => Operands::None,
            Arity::Nullary => return Err(arity_err("exactly 0")),
            Arity::Unary => {
                let [v]: [Value; 1] = values.try_into().map_err(|_| arity_err("exactly 1"))?;
                Operands::Single([v])
            }
            Arity::Binary => {
                let pair: [Value; 2] = values.try_into().map_err(|_| arity_err("exactly 2"))?;
                Operands::Pair(pair)
            }
            Arity::Variadic if values.is_empty() => return Err(arity_err("at least 1")),
            Arity::Variadic => Operands::List(values),
        };
        Ok(Self {
            attribute,
            comparator,
            operands,
        })
    }

    fn unchecked(attribute: String, comparator: Comparator, operands: Operands) -> Self {
        Self {
            attribute,
            comparator,
            operands,
        }
    }

    /// Attribute path, segments separated by `.`.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Comparator applied to the attribute.
    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// Arity-tagged operands.
    pub fn operands(&self) -> &Operands {
        &self.operands
    }

    /// Operands in declaration order.
    pub fn values(&self) -> &[Value] {
        self.operands.as_slice()
    }

    /// First operand, if any.
    pub fn value(&self) -> Option<&Value> {
        self.values().first()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.attribute, self.comparator)?;
        for (idx, value) in self.values().iter().enumerate() {
            let sep = if idx == 0 { " " } else { ", " };
            write!(f, "{sep}{value}")?;
        }
        Ok(())
    }
}

/// Entry point of the fluent builder: `attribute("age").lt(50)?`.
///
/// Every factory method checks the attribute, so a blank name fails with
/// [`ConditionError::EmptyAttribute`] just like [`Condition::new`].
pub fn attribute(name: impl Into<String>) -> NamedCondition {
    NamedCondition { name: name.into() }
}

/// Attribute-scoped condition factory.
#[derive(Clone, Debug)]
pub struct NamedCondition {
    name: String,
}

impl NamedCondition {
    fn build(
        self,
        comparator: Comparator,
        operands: Operands,
    ) -> Result<Condition, ConditionError> {
        if self.name.trim().is_empty() {
            return Err(ConditionError::EmptyAttribute);
        }
        Ok(Condition::unchecked(self.name, comparator, operands))
    }

    fn single(
        self,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> Result<Condition, ConditionError> {
        self.build(comparator, Operands::Single([value.into()]))
    }

    /// `attr = value`
    pub fn equals_to(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::Equals, value)
    }

    /// `attr <> value`
    pub fn not_equals_to(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::NotEquals, value)
    }

    /// `attr < value`
    pub fn lt(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::LessThan, value)
    }

    /// `attr <= value`
    pub fn le(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::LessThanEquals, value)
    }

    /// `attr > value`
    pub fn gt(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::GreaterThan, value)
    }

    /// `attr >= value`
    pub fn ge(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::GreaterThanEquals, value)
    }

    /// `attr BETWEEN lower AND upper`
    pub fn between(
        self,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) -> Result<Condition, ConditionError> {
        self.build(Comparator::Between, Operands::Pair([lower.into(), upper.into()]))
    }

    /// `contains(attr, value)`
    pub fn contains(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::Contains, value)
    }

    /// `NOT contains(attr, value)`
    pub fn not_contains(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::NotContains, value)
    }

    /// `begins_with(attr, value)`
    pub fn starts_with(self, value: impl Into<Value>) -> Result<Condition, ConditionError> {
        self.single(Comparator::StartsWith, value)
    }

    /// `attribute_exists(attr)`
    pub fn exists(self) -> Result<Condition, ConditionError> {
        self.build(Comparator::Exists, Operands::None)
    }

    /// `attribute_not_exists(attr)`
    pub fn not_exists(self) -> Result<Condition, ConditionError> {
        self.build(Comparator::NotExists, Operands::None)
    }

    /// `attr IN (values...)`; fails when `values` is empty.
    pub fn r#in<I, V>(self, values: I) -> Result<Condition, ConditionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::new(
            self.name,
            Comparator::In,
            values.into_iter().map(Into::into).collect(),
        )
    }
}
