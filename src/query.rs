//! Query engine over JSON documents scanned from a Sled tree.
//!
//! Supports the shapes the catalogue needs: equality and lower-bound filters,
//! a single sort field and a limit. Sorting is stable, so ties keep the
//! store's iteration order.

use chrono::DateTime;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum Filter {
    Eq(String, Value),
    Gte(String, Value),
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    filters: Vec<Filter>,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq(field, expected) => doc
                .get(field)
                .map(|actual| compare_values(actual, expected) == Some(Ordering::Equal))
                .unwrap_or(false),
            Filter::Gte(field, bound) => doc
                .get(field)
                .and_then(|actual| compare_values(actual, bound))
                .map(|ord| ord != Ordering::Less)
                .unwrap_or(false),
        })
    }

    /// Filters, sorts and truncates a scanned document set.
    pub fn apply(&self, docs: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut out: Vec<Value> = docs.into_iter().filter(|doc| self.matches(doc)).collect();

        if let Some((field, direction)) = &self.order {
            out.sort_by(|a, b| {
                match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => {
                        let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
                        match direction {
                            Direction::Asc => ord,
                            Direction::Desc => ord.reverse(),
                        }
                    }
                    // Missing fields sort last in either direction
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }

        if let Some(n) = self.limit {
            out.truncate(n);
        }
        out
    }
}

/// Orders two JSON scalars. Numbers compare numerically, RFC 3339 strings
/// chronologically, other strings lexicographically. Mixed types don't compare.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
