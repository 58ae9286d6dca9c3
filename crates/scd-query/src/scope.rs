use scd_types::{BusinessKey, Envelope, Payload, SurrogateKey, Timestamp, Version};
use serde_json::Value;

/// A row predicate. Filters in one query combine by logical AND.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// `valid_to IS NULL`
    Latest,
    /// `valid_to IS NOT NULL`
    Historical,
    BusinessKey(BusinessKey),
    Version(Version),
    SurrogateKey(SurrogateKey),
    /// `valid_from <= t AND (valid_to IS NULL OR valid_to > t)`
    AsOf(Timestamp),
    /// `valid_from <= end AND (valid_to IS NULL OR valid_to >= start)`
    ValidDuring { start: Timestamp, end: Timestamp },
    /// `valid_from > t`
    CreatedAfter(Timestamp),
    /// `valid_from < t`
    CreatedBefore(Timestamp),
    /// Payload column equality.
    FieldEquals { column: String, value: Value },
    /// Payload column membership. An empty set matches nothing.
    FieldIn { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn matches(&self, envelope: &Envelope, payload: &Payload) -> bool {
        match self {
            Self::Latest => envelope.valid_to.is_none(),
            Self::Historical => envelope.valid_to.is_some(),
            Self::BusinessKey(key) => &envelope.business_key == key,
            Self::Version(v) => envelope.version == *v,
            Self::SurrogateKey(k) => envelope.surrogate_key == *k,
            Self::AsOf(t) => {
                envelope.valid_from <= *t && envelope.valid_to.map_or(true, |end| end > *t)
            }
            Self::ValidDuring { start, end } => {
                envelope.valid_from <= *end && envelope.valid_to.map_or(true, |to| to >= *start)
            }
            Self::CreatedAfter(t) => envelope.valid_from > *t,
            Self::CreatedBefore(t) => envelope.valid_from < *t,
            Self::FieldEquals { column, value } => payload
                .get(column)
                .is_some_and(|actual| values_equal(actual, value)),
            Self::FieldIn { column, values } => payload
                .get(column)
                .is_some_and(|actual| values.iter().any(|v| values_equal(actual, v))),
        }
    }

    /// Payload column this filter reads, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::FieldEquals { column, .. } | Self::FieldIn { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// JSON equality that treats `60` and `60.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// An ordering directive. Earlier orderings take precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Version { desc: bool },
    Time { desc: bool },
    BusinessKey { desc: bool },
}

/// Anything that can be applied to a [`crate::Query`].
#[derive(Clone, Debug, PartialEq)]
pub enum Scope {
    Filter(Filter),
    Order(Order),
    /// Explicitly no filter.
    AllVersions,
    Limit(usize),
}

impl From<Filter> for Scope {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

impl From<Order> for Scope {
    fn from(order: Order) -> Self {
        Self::Order(order)
    }
}

pub fn latest() -> Scope {
    Filter::Latest.into()
}

pub fn historical() -> Scope {
    Filter::Historical.into()
}

pub fn all_versions() -> Scope {
    Scope::AllVersions
}

pub fn by_business_key(key: BusinessKey) -> Scope {
    Filter::BusinessKey(key).into()
}

pub fn by_version(version: Version) -> Scope {
    Filter::Version(version).into()
}

pub fn by_surrogate_key(key: SurrogateKey) -> Scope {
    Filter::SurrogateKey(key).into()
}

pub fn as_of(t: Timestamp) -> Scope {
    Filter::AsOf(t).into()
}

pub fn valid_during(start: Timestamp, end: Timestamp) -> Scope {
    Filter::ValidDuring { start, end }.into()
}

pub fn created_after(t: Timestamp) -> Scope {
    Filter::CreatedAfter(t).into()
}

pub fn created_before(t: Timestamp) -> Scope {
    Filter::CreatedBefore(t).into()
}

pub fn field_eq(column: impl Into<String>, value: impl Into<Value>) -> Scope {
    Filter::FieldEquals {
        column: column.into(),
        value: value.into(),
    }
    .into()
}

pub fn field_in(column: impl Into<String>, values: Vec<Value>) -> Scope {
    Filter::FieldIn {
        column: column.into(),
        values,
    }
    .into()
}

pub fn order_by_version(desc: bool) -> Scope {
    Order::Version { desc }.into()
}

pub fn order_by_time(desc: bool) -> Scope {
    Order::Time { desc }.into()
}

pub fn order_by_business_key(desc: bool) -> Scope {
    Order::BusinessKey { desc }.into()
}

pub fn limit(n: usize) -> Scope {
    Scope::Limit(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn row(from: i64, to: Option<i64>) -> Envelope {
        let mut env = Envelope::first(BusinessKey::new("k").unwrap(), t(from));
        env.valid_to = to.map(t);
        env
    }

    fn payload() -> Payload {
        let mut p = Payload::new();
        p.insert("rate".into(), Value::from(60));
        p.insert("status".into(), Value::from("active"));
        p
    }

    // -----------------------------------------------------------------------
    // Temporal predicates
    // -----------------------------------------------------------------------

    #[test]
    fn latest_and_historical_partition() {
        let open = row(0, None);
        let closed = row(0, Some(5));
        let p = payload();
        assert!(Filter::Latest.matches(&open, &p));
        assert!(!Filter::Latest.matches(&closed, &p));
        assert!(Filter::Historical.matches(&closed, &p));
        assert!(!Filter::Historical.matches(&open, &p));
    }

    #[test]
    fn as_of_is_half_open() {
        let r = row(10, Some(20));
        let p = payload();
        assert!(!Filter::AsOf(t(9)).matches(&r, &p));
        assert!(Filter::AsOf(t(10)).matches(&r, &p));
        assert!(Filter::AsOf(t(19)).matches(&r, &p));
        assert!(!Filter::AsOf(t(20)).matches(&r, &p));
    }

    #[test]
    fn valid_during_touches_boundaries() {
        let r = row(10, Some(20));
        let p = payload();
        let during = |s, e| Filter::ValidDuring { start: t(s), end: t(e) }.matches(&r, &p);
        assert!(during(0, 10));
        assert!(during(20, 30));
        assert!(during(12, 15));
        assert!(!during(0, 9));
        assert!(!during(21, 30));
    }

    #[test]
    fn valid_during_open_row() {
        let r = row(10, None);
        let p = payload();
        assert!(Filter::ValidDuring { start: t(100), end: t(200) }.matches(&r, &p));
    }

    #[test]
    fn created_after_and_before_are_strict() {
        let r = row(10, None);
        let p = payload();
        assert!(Filter::CreatedAfter(t(9)).matches(&r, &p));
        assert!(!Filter::CreatedAfter(t(10)).matches(&r, &p));
        assert!(Filter::CreatedBefore(t(11)).matches(&r, &p));
        assert!(!Filter::CreatedBefore(t(10)).matches(&r, &p));
    }

    // -----------------------------------------------------------------------
    // Payload predicates
    // -----------------------------------------------------------------------

    #[test]
    fn field_equals_normalizes_numbers() {
        let r = row(0, None);
        let p = payload();
        assert!(Filter::FieldEquals { column: "rate".into(), value: Value::from(60.0) }.matches(&r, &p));
        assert!(!Filter::FieldEquals { column: "rate".into(), value: Value::from(61) }.matches(&r, &p));
        assert!(!Filter::FieldEquals { column: "missing".into(), value: Value::from(1) }.matches(&r, &p));
    }

    #[test]
    fn field_in_empty_matches_nothing() {
        let r = row(0, None);
        let p = payload();
        assert!(!Filter::FieldIn { column: "status".into(), values: vec![] }.matches(&r, &p));
        assert!(Filter::FieldIn {
            column: "status".into(),
            values: vec![Value::from("paused"), Value::from("active")],
        }
        .matches(&r, &p));
    }

    #[test]
    fn constructors_wrap_variants() {
        assert_eq!(latest(), Scope::Filter(Filter::Latest));
        assert_eq!(order_by_time(true), Scope::Order(Order::Time { desc: true }));
        assert_eq!(limit(3), Scope::Limit(3));
        assert_eq!(all_versions(), Scope::AllVersions);
    }
}
