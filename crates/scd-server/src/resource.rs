use chrono::{DateTime, Utc};
use scd_engine::{Engine, EngineResult};
use scd_models::{Job, PaymentLineItem, Timelog};
use scd_query::{scope, Query, Scope};
use scd_store::VersionStore;
use scd_types::{Clock, Entity, Timestamp, Versioned};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ServerError, ServerResult};

/// Filters accepted by collection listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ListFilter {
    pub company: Option<String>,
    pub contractor: Option<String>,
    pub status: Option<String>,
    /// RFC 3339; lists the versions current at that instant instead of the
    /// latest ones.
    pub as_of: Option<String>,
    pub limit: Option<usize>,
}

impl ListFilter {
    fn given(&self) -> impl Iterator<Item = &'static str> + '_ {
        [
            ("company", self.company.is_some()),
            ("contractor", self.contractor.is_some()),
            ("status", self.status.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
    }
}

/// An entity exposed as a collection.
pub trait Resource: Entity {
    /// Collection path segment, e.g. `jobs`.
    const PATH: &'static str;
    /// Which of `company`, `contractor` and `status` apply.
    const FILTERS: &'static [&'static str];

    fn filter_scopes<S: VersionStore, C: Clock>(
        engine: &Engine<S, C>,
        filter: &ListFilter,
    ) -> EngineResult<Vec<Scope>>;
}

impl Resource for Job {
    const PATH: &'static str = "jobs";
    const FILTERS: &'static [&'static str] = &["company", "contractor", "status"];

    fn filter_scopes<S: VersionStore, C: Clock>(
        _engine: &Engine<S, C>,
        filter: &ListFilter,
    ) -> EngineResult<Vec<Scope>> {
        let mut scopes = Vec::new();
        if let Some(company) = &filter.company {
            scopes.push(scope::field_eq("company_id", company.as_str()));
        }
        if let Some(contractor) = &filter.contractor {
            scopes.push(scope::field_eq("contractor_id", contractor.as_str()));
        }
        if let Some(status) = &filter.status {
            scopes.push(scope::field_eq("status", status.as_str()));
        }
        Ok(scopes)
    }
}

impl Resource for Timelog {
    const PATH: &'static str = "timelogs";
    const FILTERS: &'static [&'static str] = &["contractor"];

    fn filter_scopes<S: VersionStore, C: Clock>(
        engine: &Engine<S, C>,
        filter: &ListFilter,
    ) -> EngineResult<Vec<Scope>> {
        match &filter.contractor {
            Some(contractor) => Ok(vec![scope::field_in(
                "job_uid",
                contractor_job_uids(engine, contractor, false)?,
            )]),
            None => Ok(Vec::new()),
        }
    }
}

impl Resource for PaymentLineItem {
    const PATH: &'static str = "payments";
    const FILTERS: &'static [&'static str] = &["contractor", "status"];

    fn filter_scopes<S: VersionStore, C: Clock>(
        engine: &Engine<S, C>,
        filter: &ListFilter,
    ) -> EngineResult<Vec<Scope>> {
        let mut scopes = Vec::new();
        if let Some(status) = &filter.status {
            scopes.push(scope::field_eq("status", status.as_str()));
        }
        if let Some(contractor) = &filter.contractor {
            scopes.push(scope::field_in(
                "job_uid",
                contractor_job_uids(engine, contractor, false)?,
            ));
        }
        Ok(scopes)
    }
}

/// Surrogate keys of the contractor's jobs, as JSON strings for a
/// `job_uid IN (...)` filter. Only latest job versions unless
/// `all_versions` is set.
pub fn contractor_job_uids<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    contractor: &str,
    all_versions: bool,
) -> EngineResult<Vec<Value>> {
    let mut query = Query::new().with(scope::field_eq("contractor_id", contractor));
    if !all_versions {
        query = query.with(scope::latest());
    }
    Ok(engine
        .find::<Job>(&query)?
        .iter()
        .map(|job| Value::from(job.surrogate_key().to_string()))
        .collect())
}

/// Build the listing query for `E`: latest rows (or rows current at
/// `as_of`) narrowed by the resource's filters.
pub fn list_query<E: Resource, S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    filter: &ListFilter,
) -> ServerResult<Query> {
    if let Some(name) = filter.given().find(|name| !E::FILTERS.contains(name)) {
        return Err(ServerError::BadRequest(format!(
            "{} cannot be filtered by {name}",
            E::PATH
        )));
    }
    let base = match &filter.as_of {
        Some(raw) => scope::as_of(parse_timestamp(raw)?),
        None => scope::latest(),
    };
    let mut query = Query::new()
        .with(base)
        .scoped(E::filter_scopes(engine, filter)?);
    match filter.limit {
        Some(0) => return Err(ServerError::BadRequest("limit must be positive".into())),
        Some(n) => query = query.with(scope::limit(n)),
        None => {}
    }
    Ok(query)
}

/// Parse an RFC 3339 instant.
pub fn parse_timestamp(raw: &str) -> ServerResult<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ServerError::BadRequest(format!("invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use scd_models::tables;
    use scd_query::Filter;
    use scd_store::InMemoryStore;
    use scd_types::BusinessKey;

    fn engine() -> Engine<InMemoryStore> {
        Engine::new(Arc::new(InMemoryStore::with_schema(&tables())))
    }

    #[test]
    fn defaults_to_latest() {
        let q = list_query::<Job, _, _>(&engine(), &ListFilter::default()).unwrap();
        assert_eq!(q.filters(), &[Filter::Latest]);
        assert_eq!(q.limit(), None);
    }

    #[test]
    fn as_of_replaces_latest() {
        let filter = ListFilter {
            as_of: Some("2024-03-01T12:00:00Z".into()),
            limit: Some(5),
            ..ListFilter::default()
        };
        let q = list_query::<Job, _, _>(&engine(), &filter).unwrap();
        assert!(matches!(q.filters(), [Filter::AsOf(_)]));
        assert_eq!(q.limit(), Some(5));
    }

    #[test]
    fn rejects_bad_input() {
        let e = engine();
        let bad_time = ListFilter {
            as_of: Some("yesterday".into()),
            ..ListFilter::default()
        };
        assert!(matches!(
            list_query::<Job, _, _>(&e, &bad_time),
            Err(ServerError::BadRequest(_))
        ));
        let company = ListFilter {
            company: Some("acme".into()),
            ..ListFilter::default()
        };
        assert!(list_query::<Job, _, _>(&e, &company).is_ok());
        assert!(matches!(
            list_query::<Timelog, _, _>(&e, &company),
            Err(ServerError::BadRequest(_))
        ));
        let zero = ListFilter {
            limit: Some(0),
            ..ListFilter::default()
        };
        assert!(list_query::<PaymentLineItem, _, _>(&e, &zero).is_err());
    }

    #[test]
    fn contractor_filter_joins_latest_jobs() {
        let e = engine();
        let v1 = e
            .create(Job::new(BusinessKey::new("job-1").unwrap(), "Dev", "acme", "alice", 50.0))
            .unwrap();
        let v2 = e
            .update(&BusinessKey::new("job-1").unwrap(), |j: &mut Job| j.update_rate(60.0))
            .unwrap();
        e.create(Job::new(BusinessKey::new("job-2").unwrap(), "Ops", "acme", "bob", 40.0))
            .unwrap();

        let latest = contractor_job_uids(&e, "alice", false).unwrap();
        assert_eq!(latest, vec![Value::from(v2.surrogate_key().to_string())]);
        let all = contractor_job_uids(&e, "alice", true).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&Value::from(v1.surrogate_key().to_string())));
        assert!(contractor_job_uids(&e, "carol", false).unwrap().is_empty());
    }
}
