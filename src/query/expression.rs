//! Rendering conditions into placeholder-based store expressions.
//!
//! Every condition of a request is rendered with its own ordinal. Attribute
//! path segments become `#n{ordinal}_{segment}` name aliases and operands
//! become `:v{ordinal}_{position}` value placeholders, so no two conditions in
//! one request can collide and reserved words never reach the expression text.
//! Key-condition fragments and filter fragments are collected separately and
//! each joined with `AND`.

use std::collections::BTreeMap;

use crate::error::TranslationError;
use crate::query::condition::{Comparator, Condition};
use crate::query::value::Value;

/// Separator between attribute path segments.
pub const PATH_SEPARATOR: char = '.';

/// Where a rendered fragment will be used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExpressionContext {
    /// Partition part of a key condition; `EQUALS` only.
    PartitionKey,
    /// Sort part of a key condition; `EQUALS`, ordering, `BETWEEN`, `STARTS_WITH`.
    RangeKey,
    /// Post-retrieval filter; every comparator.
    Filter,
}

impl ExpressionContext {
    /// Human-readable context name used in errors.
    pub fn name(self) -> &'static str {
        match self {
            ExpressionContext::PartitionKey => "partition key",
            ExpressionContext::RangeKey => "range key",
            ExpressionContext::Filter => "filter",
        }
    }

    fn allows(self, comparator: Comparator) -> bool {
        match self {
            ExpressionContext::PartitionKey => comparator == Comparator::Equals,
            ExpressionContext::RangeKey => comparator.supports_range_key(),
            ExpressionContext::Filter => true,
        }
    }
}

/// Name and value placeholder maps accumulated over one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Placeholders {
    /// `#alias` to attribute path segment.
    pub names: BTreeMap<String, String>,
    /// `:placeholder` to operand value.
    pub values: BTreeMap<String, Value>,
}

impl Placeholders {
    /// Whether no placeholder has been registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.values.is_empty()
    }
}

/// Renders one condition as an expression fragment, registering its
/// placeholders. `ordinal` must be unique within the request.
pub fn translate(
    ordinal: usize,
    condition: &Condition,
    context: ExpressionContext,
    placeholders: &mut Placeholders,
) -> Result<String, TranslationError> {
    let comparator = condition.comparator();
    if !context.allows(comparator) {
        return Err(TranslationError::UnsupportedComparator {
            comparator,
            context: context.name(),
        });
    }

    let path = alias_path(ordinal, condition.attribute(), placeholders)?;
    let values: Vec<String> = condition
        .values()
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let key = format!(":v{ordinal}_{idx}");
            let value = match comparator {
                Comparator::StartsWith => Value::String(value.to_plain_string()),
                _ => value.clone(),
            };
            placeholders.values.insert(key.clone(), value);
            key
        })
        .collect();

    let fragment = match comparator {
        Comparator::Equals => format!("{path} = {}", values[0]),
        Comparator::NotEquals => format!("{path} <> {}", values[0]),
        Comparator::LessThan => format!("{path} < {}", values[0]),
        Comparator::LessThanEquals => format!("{path} <= {}", values[0]),
        Comparator::GreaterThan => format!("{path} > {}", values[0]),
        Comparator::GreaterThanEquals => format!("{path} >= {}", values[0]),
        Comparator::Between => format!("{path} BETWEEN {} AND {}", values[0], values[1]),
        Comparator::Contains => format!("contains({path}, {})", values[0]),
        Comparator::NotContains => format!("NOT contains({path}, {})", values[0]),
        Comparator::Exists => format!("attribute_exists({path})"),
        Comparator::NotExists => format!("attribute_not_exists({path})"),
        Comparator::In => format!("{path} IN ({})", values.join(", ")),
        Comparator::StartsWith => format!("begins_with({path}, {})", values[0]),
    };
    Ok(fragment)
}

fn alias_path(
    ordinal: usize,
    attribute: &str,
    placeholders: &mut Placeholders,
) -> Result<String, TranslationError> {
    let mut aliases = Vec::new();
    for (idx, segment) in attribute.split(PATH_SEPARATOR).enumerate() {
        if segment.is_empty() {
            return Err(TranslationError::EmptyAttributeSegment {
                attribute: attribute.to_string(),
            });
        }
        let alias = format!("#n{ordinal}_{idx}");
        placeholders.names.insert(alias.clone(), segment.to_string());
        aliases.push(alias);
    }
    Ok(aliases.join(&PATH_SEPARATOR.to_string()))
}

/// Rendered expressions for one store request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expressions {
    /// Key-condition expression; absent for scans.
    pub key_condition: Option<String>,
    /// Filter expression; absent when no filter condition remains.
    pub filter: Option<String>,
    /// Placeholders referenced by both expressions.
    pub placeholders: Placeholders,
}

/// Accumulates key and filter fragments for one request with a shared,
/// strictly increasing ordinal.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    next_ordinal: usize,
    placeholders: Placeholders,
    key: Vec<String>,
    filter: Vec<String>,
}

impl ExpressionBuilder {
    /// Creates an empty builder. Ordinals start at 1.
    pub fn new() -> Self {
        Self::default()
    }

    fn ordinal(&mut self) -> usize {
        self.next_ordinal += 1;
        self.next_ordinal
    }

    /// Adds a key-condition fragment rendered in `context`.
    pub fn key(&mut self, condition: &Condition, context: ExpressionContext) -> Result<&mut Self, TranslationError> {
        let ordinal = self.ordinal();
        let fragment = translate(ordinal, condition, context, &mut self.placeholders)?;
        self.key.push(fragment);
        Ok(self)
    }

    /// Adds a filter fragment.
    pub fn filter(&mut self, condition: &Condition) -> Result<&mut Self, TranslationError> {
        let ordinal = self.ordinal();
        let fragment = translate(ordinal, condition, ExpressionContext::Filter, &mut self.placeholders)?;
        self.filter.push(fragment);
        Ok(self)
    }

    /// Adds every condition as a filter fragment, in order.
    pub fn filters<'a, I>(&mut self, conditions: I) -> Result<&mut Self, TranslationError>
    where
        I: IntoIterator<Item = &'a Condition>,
    {
        for condition in conditions {
            self.filter(condition)?;
        }
        Ok(self)
    }

    /// Joins the collected fragments.
    pub fn finish(self) -> Expressions {
        let join = |parts: Vec<String>| (!parts.is_empty()).then(|| parts.join(" AND "));
        Expressions {
            key_condition: join(self.key),
            filter: join(self.filter),
            placeholders: self.placeholders,
        }
    }
}
