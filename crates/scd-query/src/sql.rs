use std::fmt::Write as _;

use scd_types::temporal::to_micros;
use scd_types::TableDef;
use serde_json::Value;

use crate::error::QueryError;
use crate::query::Query;
use crate::scope::{Filter, Order};

/// A bound parameter for a rendered statement.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlParam {
    /// Bind form of a JSON payload value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

/// The `WHERE`/`ORDER BY`/`LIMIT` tail of a select, with positional `?`
/// parameters in `params` order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlFragment {
    pub where_clause: Option<String>,
    pub order_clause: String,
    pub limit: Option<usize>,
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    /// Everything after `FROM <table>`, starting with a space.
    pub fn tail(&self) -> String {
        let mut out = String::new();
        if let Some(clause) = &self.where_clause {
            let _ = write!(out, " WHERE {clause}");
        }
        let _ = write!(out, " ORDER BY {}", self.order_clause);
        if let Some(n) = self.limit {
            let _ = write!(out, " LIMIT {n}");
        }
        out
    }

    /// Only the `WHERE` part, for `COUNT(*)` statements.
    pub fn where_tail(&self) -> String {
        self.where_clause
            .as_ref()
            .map(|clause| format!(" WHERE {clause}"))
            .unwrap_or_default()
    }
}

/// Double-quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Query {
    /// Render against `table`. Validates first, so unknown payload columns
    /// never reach the statement text.
    pub fn to_sql(&self, table: &TableDef) -> Result<SqlFragment, QueryError> {
        self.validate(table)?;

        let mut params = Vec::new();
        let predicates: Vec<String> = self
            .filters()
            .iter()
            .map(|filter| render_filter(filter, &mut params))
            .collect();

        let mut order: Vec<String> = self
            .orders()
            .iter()
            .map(|order| {
                let (column, desc) = match *order {
                    Order::Version { desc } => ("version", desc),
                    Order::Time { desc } => ("valid_from", desc),
                    Order::BusinessKey { desc } => ("business_key", desc),
                };
                format!("{} {}", quote_ident(column), if desc { "DESC" } else { "ASC" })
            })
            .collect();
        order.push(format!("{} ASC", quote_ident("business_key")));
        order.push(format!("{} ASC", quote_ident("version")));

        Ok(SqlFragment {
            where_clause: (!predicates.is_empty()).then(|| predicates.join(" AND ")),
            order_clause: order.join(", "),
            limit: self.limit(),
            params,
        })
    }
}

fn render_filter(filter: &Filter, params: &mut Vec<SqlParam>) -> String {
    let from = quote_ident("valid_from");
    let to = quote_ident("valid_to");
    match filter {
        Filter::Latest => format!("{to} IS NULL"),
        Filter::Historical => format!("{to} IS NOT NULL"),
        Filter::BusinessKey(key) => {
            params.push(SqlParam::Text(key.to_string()));
            format!("{} = ?", quote_ident("business_key"))
        }
        Filter::Version(v) => {
            params.push(SqlParam::Integer(i64::from(v.get())));
            format!("{} = ?", quote_ident("version"))
        }
        Filter::SurrogateKey(k) => {
            params.push(SqlParam::Text(k.to_string()));
            format!("{} = ?", quote_ident("surrogate_key"))
        }
        Filter::AsOf(t) => {
            params.push(SqlParam::Integer(to_micros(t)));
            params.push(SqlParam::Integer(to_micros(t)));
            format!("({from} <= ? AND ({to} IS NULL OR {to} > ?))")
        }
        Filter::ValidDuring { start, end } => {
            params.push(SqlParam::Integer(to_micros(end)));
            params.push(SqlParam::Integer(to_micros(start)));
            format!("({from} <= ? AND ({to} IS NULL OR {to} >= ?))")
        }
        Filter::CreatedAfter(t) => {
            params.push(SqlParam::Integer(to_micros(t)));
            format!("{from} > ?")
        }
        Filter::CreatedBefore(t) => {
            params.push(SqlParam::Integer(to_micros(t)));
            format!("{from} < ?")
        }
        Filter::FieldEquals { column, value } => {
            if value.is_null() {
                format!("{} IS NULL", quote_ident(column))
            } else {
                params.push(SqlParam::from_json(value));
                format!("{} = ?", quote_ident(column))
            }
        }
        Filter::FieldIn { column, values } => {
            if values.is_empty() {
                return "0 = 1".to_string();
            }
            let marks = vec!["?"; values.len()].join(", ");
            params.extend(values.iter().map(SqlParam::from_json));
            format!("{} IN ({marks})", quote_ident(column))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope;
    use chrono::{TimeZone, Utc};
    use scd_types::{BusinessKey, Column, Version};

    const COLUMNS: &[Column] = &[Column::text("status"), Column::real("hourly_rate")];
    const TABLE: TableDef = TableDef::new("jobs", COLUMNS);

    #[test]
    fn empty_query_has_no_where() {
        let sql = Query::new().to_sql(&TABLE).unwrap();
        assert_eq!(sql.where_clause, None);
        assert_eq!(sql.order_clause, "\"business_key\" ASC, \"version\" ASC");
        assert_eq!(sql.tail(), " ORDER BY \"business_key\" ASC, \"version\" ASC");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn filters_join_with_and_in_application_order() {
        let key = BusinessKey::new("job-1").unwrap();
        let q = Query::new().scoped([scope::by_business_key(key), scope::latest()]);
        let sql = q.to_sql(&TABLE).unwrap();
        assert_eq!(
            sql.where_clause.as_deref(),
            Some("\"business_key\" = ? AND \"valid_to\" IS NULL")
        );
        assert_eq!(sql.params, vec![SqlParam::Text("job-1".into())]);
    }

    #[test]
    fn as_of_binds_micros_twice() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let sql = Query::new().with(scope::as_of(t)).to_sql(&TABLE).unwrap();
        let micros = t.timestamp_micros();
        assert_eq!(sql.params, vec![SqlParam::Integer(micros), SqlParam::Integer(micros)]);
    }

    #[test]
    fn orders_precede_tie_break() {
        let q = Query::new()
            .with(scope::order_by_version(true))
            .with(scope::limit(10));
        let sql = q.to_sql(&TABLE).unwrap();
        assert!(sql.order_clause.starts_with("\"version\" DESC, "));
        assert!(sql.tail().ends_with(" LIMIT 10"));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let sql = Query::new()
            .with(scope::field_in("status", vec![]))
            .to_sql(&TABLE)
            .unwrap();
        assert_eq!(sql.where_clause.as_deref(), Some("0 = 1"));
    }

    #[test]
    fn field_values_bind_by_type() {
        let q = Query::new().scoped([
            scope::field_in("status", vec!["active".into(), "paused".into()]),
            scope::field_eq("hourly_rate", 60.5),
            scope::by_version(Version::FIRST),
        ]);
        let sql = q.to_sql(&TABLE).unwrap();
        assert_eq!(
            sql.params,
            vec![
                SqlParam::Text("active".into()),
                SqlParam::Text("paused".into()),
                SqlParam::Real(60.5),
                SqlParam::Integer(1),
            ]
        );
    }

    #[test]
    fn unknown_column_is_rejected_before_rendering() {
        let q = Query::new().with(scope::field_eq("status\" OR 1=1 --", "x"));
        assert!(matches!(q.to_sql(&TABLE), Err(QueryError::UnknownColumn { .. })));
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
