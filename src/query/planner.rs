//! Rule-based access path selection.
//!
//! Given the conditions of a request and the table topology, pick the
//! cheapest valid way to read: a direct partition-key query, a secondary
//! index query, or a full scan. Whatever conditions the chosen key does not
//! consume become post-retrieval filters.

use std::fmt;

use crate::query::condition::{Comparator, Condition};
use crate::query::params::QueryParams;
use crate::query::topology::{IndexKeys, TableTopology};

/// Access path chosen for one request.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessPath {
    /// Query the table by its partition key, optionally narrowed by the sort key.
    DirectKey {
        /// `EQUALS` condition on the table partition key.
        partition: Condition,
        /// Condition on the table sort key, if one was supplied.
        range: Option<Condition>,
    },
    /// Query a secondary index by its partition attribute.
    Indexed {
        /// Name of the selected index.
        index: String,
        /// `EQUALS` condition on the index partition attribute.
        partition: Condition,
        /// Condition on the index sort attribute, if one was supplied.
        range: Option<Condition>,
    },
    /// Read everything and filter.
    Scan,
}

impl AccessPath {
    /// Short operator name used in logs and explain output.
    pub fn name(&self) -> &'static str {
        match self {
            AccessPath::DirectKey { .. } => "DirectKey",
            AccessPath::Indexed { .. } => "Indexed",
            AccessPath::Scan => "Scan",
        }
    }

    /// Index targeted by the path, when it is [`AccessPath::Indexed`].
    pub fn index_name(&self) -> Option<&str> {
        match self {
            AccessPath::Indexed { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Partition and optional range condition consumed by the key, if any.
    pub fn key_conditions(&self) -> Option<(&Condition, Option<&Condition>)> {
        match self {
            AccessPath::DirectKey { partition, range }
            | AccessPath::Indexed {
                partition, range, ..
            } => Some((partition, range.as_ref())),
            AccessPath::Scan => None,
        }
    }

    fn consumes(&self, attribute: &str) -> bool {
        self.key_conditions().is_some_and(|(partition, range)| {
            partition.attribute() == attribute
                || range.is_some_and(|r| r.attribute() == attribute)
        })
    }
}

/// Chosen access path plus the conditions left for the filter expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    /// Selected access path.
    pub path: AccessPath,
    /// Remaining conditions, conjoined, in insertion order.
    pub filters: Vec<Condition>,
}

/// Selects the access path for `params` against `topology`.
///
/// 1. `EQUALS` on the table partition key selects [`AccessPath::DirectKey`].
/// 2. Otherwise the conditions are walked in insertion order and the first
///    `EQUALS` on an index partition attribute selects [`AccessPath::Indexed`].
///    When several indexes share that attribute, one whose sort attribute is
///    also constrained wins; remaining ties go to the lowest index name.
/// 3. Otherwise [`AccessPath::Scan`].
pub fn select(params: &QueryParams, topology: &TableTopology) -> AccessPath {
    if let Some(partition) = params
        .condition(topology.partition_key())
        .filter(|c| c.comparator() == Comparator::Equals)
    {
        let range = topology
            .sort_key()
            .and_then(|sort| params.condition(sort))
            .cloned();
        return AccessPath::DirectKey {
            partition: partition.clone(),
            range,
        };
    }

    for condition in params.conditions() {
        if condition.comparator() != Comparator::Equals {
            continue;
        }
        let Some((index, keys)) = pick_index(params, topology, condition.attribute()) else {
            continue;
        };
        let range = keys
            .sort
            .as_deref()
            .and_then(|sort| params.condition(sort))
            .cloned();
        return AccessPath::Indexed {
            index: index.to_string(),
            partition: condition.clone(),
            range,
        };
    }

    AccessPath::Scan
}

fn pick_index<'a>(
    params: &QueryParams,
    topology: &'a TableTopology,
    attribute: &'a str,
) -> Option<(&'a str, &'a IndexKeys)> {
    let mut first = None;
    for (name, keys) in topology.indexes_partitioned_on(attribute) {
        let sort_constrained = keys
            .sort
            .as_deref()
            .is_some_and(|sort| params.condition(sort).is_some());
        if sort_constrained {
            return Some((name, keys));
        }
        first.get_or_insert((name, keys));
    }
    first
}

/// Selects the access path and splits off the filter conditions.
pub fn plan(params: &QueryParams, topology: &TableTopology) -> Plan {
    let path = select(params, topology);
    let filters = params
        .conditions()
        .iter()
        .filter(|c| !path.consumes(c.attribute()))
        .cloned()
        .collect();
    Plan { path, filters }
}

/// Printable outline of a [`Plan`]: the access path, the key conditions it
/// queries with, and the filters applied afterwards.
#[derive(Clone, Copy, Debug)]
pub struct PlanExplain<'a> {
    plan: &'a Plan,
}

impl Plan {
    /// Explain view over this plan.
    pub fn explain(&self) -> PlanExplain<'_> {
        PlanExplain { plan: self }
    }
}

impl PlanExplain<'_> {
    /// Renders one line per operator, replacing condition literals with `?`
    /// when `redact` is set.
    pub fn render(&self, redact: bool) -> String {
        let show = |cond: &Condition| {
            if redact {
                "?".to_string()
            } else {
                cond.to_string()
            }
        };
        let path = &self.plan.path;
        let mut out = String::from(path.name());
        if let Some(index) = path.index_name() {
            out.push_str(&format!(" [index={index}]"));
        }
        out.push('\n');
        if let Some((partition, range)) = path.key_conditions() {
            out.push_str(&format!("  KeyCondition [partition={}", show(partition)));
            if let Some(range) = range {
                out.push_str(&format!(", range={}", show(range)));
            }
            out.push_str("]\n");
        }
        if !self.plan.filters.is_empty() {
            let filters: Vec<String> = self
                .plan
                .filters
                .iter()
                .map(|cond| format!("{}={}", cond.attribute(), show(cond)))
                .collect();
            out.push_str(&format!("  Filter [{}]\n", filters.join(", ")));
        }
        out
    }
}

impl fmt::Display for PlanExplain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::attribute;

    fn hobbit_topology() -> TableTopology {
        TableTopology::new("id")
            .with_sort_key("updateTime")
            .with_index("name-index", "name")
            .with_sorted_index("age-index", "race", "age")
    }

    fn params(conds: Vec<Condition>) -> QueryParams {
        QueryParams::builder().conditions(conds).build().unwrap()
    }

    #[test]
    fn partition_equality_selects_direct_key_with_range() {
        let p = params(vec![
            attribute("name").equals_to("Frodo").unwrap(),
            attribute("updateTime").gt(10).unwrap(),
            attribute("id").equals_to("f1").unwrap(),
        ]);
        let plan = plan(&p, &hobbit_topology());
        let AccessPath::DirectKey { partition, range } = &plan.path else {
            panic!("expected direct key, got {:?}", plan.path);
        };
        assert_eq!(partition.attribute(), "id");
        assert_eq!(range.as_ref().unwrap().attribute(), "updateTime");
        let filters: Vec<_> = plan.filters.iter().map(|c| c.attribute()).collect();
        assert_eq!(filters, ["name"]);
    }

    #[test]
    fn partition_inequality_does_not_select_direct_key() {
        let p = params(vec![attribute("id").not_equals_to("f1").unwrap()]);
        assert_eq!(select(&p, &hobbit_topology()), AccessPath::Scan);
    }

    #[test]
    fn index_equality_selects_index_with_its_sort_attribute() {
        let p = params(vec![
            attribute("age").lt(50).unwrap(),
            attribute("race").equals_to("hobbit").unwrap(),
        ]);
        let plan = plan(&p, &hobbit_topology());
        assert_eq!(plan.path.index_name(), Some("age-index"));
        let (_, range) = plan.path.key_conditions().unwrap();
        assert_eq!(range.unwrap().attribute(), "age");
        assert!(plan.filters.is_empty());
    }

    #[test]
    fn first_inserted_condition_wins_between_indexes() {
        let topo = hobbit_topology();
        let by_race = params(vec![
            attribute("race").equals_to("hobbit").unwrap(),
            attribute("name").equals_to("Frodo").unwrap(),
        ]);
        assert_eq!(select(&by_race, &topo).index_name(), Some("age-index"));
        let by_name = params(vec![
            attribute("name").equals_to("Frodo").unwrap(),
            attribute("race").equals_to("hobbit").unwrap(),
        ]);
        assert_eq!(select(&by_name, &topo).index_name(), Some("name-index"));
    }

    #[test]
    fn shared_partition_prefers_constrained_sort_then_name() {
        let topo = TableTopology::new("id")
            .with_sorted_index("b-by-height", "race", "height")
            .with_sorted_index("c-by-age", "race", "age")
            .with_index("a-plain", "race");
        let only_race = params(vec![attribute("race").equals_to("elf").unwrap()]);
        assert_eq!(select(&only_race, &topo).index_name(), Some("a-plain"));
        let with_age = params(vec![
            attribute("race").equals_to("elf").unwrap(),
            attribute("age").ge(100).unwrap(),
        ]);
        assert_eq!(select(&with_age, &topo).index_name(), Some("c-by-age"));
    }

    #[test]
    fn no_key_match_scans_with_every_condition_as_filter() {
        let p = params(vec![
            attribute("origin.place").equals_to("Shire").unwrap(),
            attribute("age").lt(50).unwrap(),
        ]);
        let plan = plan(&p, &hobbit_topology());
        assert_eq!(plan.path, AccessPath::Scan);
        assert_eq!(plan.filters, p.conditions());
    }

    #[test]
    fn explain_renders_and_redacts() {
        let p = params(vec![
            attribute("race").equals_to("hobbit").unwrap(),
            attribute("origin.place").equals_to("Shire").unwrap(),
        ]);
        let planned = plan(&p, &hobbit_topology());
        let explain = planned.explain();
        let text = explain.render(false);
        assert!(text.starts_with("Indexed [index=age-index]"));
        assert!(text.contains("KeyCondition [partition=race EQUALS \"hobbit\"]"));
        assert!(text.contains("Filter [origin.place=origin.place EQUALS \"Shire\"]"));
        let redacted = explain.render(true);
        assert!(!redacted.contains("hobbit"));
        assert!(redacted.contains("partition=?"));
        assert!(redacted.contains("Filter [origin.place=?]"));
        assert_eq!(explain.to_string(), text);
    }

    #[test]
    fn scan_explain_is_a_single_line() {
        let text = plan(&params(vec![]), &hobbit_topology()).explain().render(false);
        assert_eq!(text, "Scan\n");
    }
}
