use std::cmp::Ordering;

use scd_types::{Column, ColumnKind, Envelope, Payload, SurrogateKey, TableDef};
use serde_json::Value;

use crate::error::QueryError;
use crate::scope::{Filter, Order, Scope};

/// Immutable description of a read over one entity table.
///
/// Built by applying [`Scope`]s. Output is ordered by the orderings in the
/// sequence they were applied, then by `(business_key, version)` ascending so
/// results are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    orders: Vec<Order>,
    limit: Option<usize>,
}

impl Query {
    /// The unfiltered query (every version of every entity).
    pub fn new() -> Self {
        Self::default()
    }

    /// A new query with `scope` applied; `self` is untouched.
    pub fn with(&self, scope: impl Into<Scope>) -> Self {
        let mut next = self.clone();
        match scope.into() {
            Scope::Filter(filter) => next.filters.push(filter),
            Scope::Order(order) => next.orders.push(order),
            Scope::AllVersions => {}
            Scope::Limit(n) => next.limit = Some(next.limit.map_or(n, |cur| cur.min(n))),
        }
        next
    }

    /// Apply several scopes in sequence.
    pub fn scoped<I, S>(&self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scope>,
    {
        scopes.into_iter().fold(self.clone(), |q, s| q.with(s))
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Check the query against a table before running it.
    pub fn validate(&self, table: &TableDef) -> Result<(), QueryError> {
        for filter in &self.filters {
            if let Filter::ValidDuring { start, end } = filter {
                if start > end {
                    return Err(QueryError::InvertedRange {
                        start: *start,
                        end: *end,
                    });
                }
            }
            if let Some(column) = filter.column() {
                if table.column(column).is_none() {
                    return Err(QueryError::UnknownColumn {
                        table: table.name.to_string(),
                        column: column.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether a row passes every filter.
    pub fn matches(&self, envelope: &Envelope, payload: &Payload) -> bool {
        self.filters.iter().all(|f| f.matches(envelope, payload))
    }

    /// Output ordering between two rows.
    pub fn compare(&self, a: &Envelope, b: &Envelope) -> Ordering {
        self.orders
            .iter()
            .map(|order| match *order {
                Order::Version { desc } => directed(a.version.cmp(&b.version), desc),
                Order::Time { desc } => directed(a.valid_from.cmp(&b.valid_from), desc),
                Order::BusinessKey { desc } => {
                    directed(a.business_key.cmp(&b.business_key), desc)
                }
            })
            .fold(Ordering::Equal, Ordering::then)
            .then_with(|| a.business_key.cmp(&b.business_key))
            .then_with(|| a.version.cmp(&b.version))
    }

    /// Filter, order and truncate rows in memory.
    ///
    /// `view` projects a row onto its envelope and payload.
    pub fn apply<R, F>(&self, rows: impl IntoIterator<Item = R>, view: F) -> Vec<R>
    where
        F: Fn(&R) -> (&Envelope, &Payload),
    {
        let mut selected: Vec<R> = rows
            .into_iter()
            .filter(|row| {
                let (envelope, payload) = view(row);
                self.matches(envelope, payload)
            })
            .collect();
        selected.sort_by(|a, b| self.compare(view(a).0, view(b).0));
        if let Some(n) = self.limit {
            selected.truncate(n);
        }
        selected
    }
}

fn directed(ordering: Ordering, desc: bool) -> Ordering {
    if desc {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Turn a raw string (query parameter, CLI flag) into a typed column value.
pub fn parse_field_value(column: &Column, raw: &str) -> Result<Value, QueryError> {
    let invalid = |reason: String| QueryError::InvalidValue {
        column: column.name.to_string(),
        reason,
    };
    match column.kind {
        ColumnKind::Text => Ok(Value::from(raw)),
        ColumnKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| invalid(e.to_string())),
        ColumnKind::Real => raw
            .parse::<f64>()
            .map_err(|e| invalid(e.to_string()))
            .and_then(|f| {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| invalid("not a finite number".into()))
            }),
        ColumnKind::Uuid => raw
            .parse::<SurrogateKey>()
            .map(|k| Value::from(k.to_string()))
            .map_err(|e| invalid(e.to_string())),
    }
}
