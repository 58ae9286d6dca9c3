use scd_query::{scope, Query};
use scd_store::{StoreResult, StoreTransaction, StoredRow, VersionStore};
use scd_types::{BusinessKey, Clock, Entity, TableDef, Timestamp, Version};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// The open row for `key`, if any.
pub(crate) fn latest_row<T: StoreTransaction>(
    tx: &T,
    table: &TableDef,
    key: &BusinessKey,
) -> StoreResult<Option<StoredRow>> {
    let query = Query::new().scoped([
        scope::by_business_key(key.clone()),
        scope::latest(),
        scope::order_by_version(true),
        scope::limit(1),
    ]);
    Ok(tx.select(table, &query)?.into_iter().next())
}

fn decode_all<E: Entity>(rows: Vec<StoredRow>) -> StoreResult<Vec<E>> {
    rows.into_iter().map(StoredRow::into_entity).collect()
}

impl<S: VersionStore, C: Clock> Engine<S, C> {
    /// The current version of `key`.
    pub fn get_latest<E: Entity>(&self, key: &BusinessKey) -> EngineResult<E> {
        self.in_transaction("get_latest", key.as_str(), |tx| {
            latest_row(tx, &E::TABLE, key)
                .and_then(|row| row.map(StoredRow::into_entity::<E>).transpose())
                .map_err(EngineError::store("get_latest", key))?
                .ok_or_else(|| EngineError::not_found(E::TABLE.name, key))
        })
    }

    /// Every version of `key` in ascending version order. Empty if the key
    /// has never existed.
    pub fn get_all_versions<E: Entity>(&self, key: &BusinessKey) -> EngineResult<Vec<E>> {
        let query = Query::new().scoped([
            scope::by_business_key(key.clone()),
            scope::order_by_version(false),
        ]);
        self.in_transaction("get_all_versions", key.as_str(), |tx| {
            tx.select(&E::TABLE, &query)
                .and_then(decode_all)
                .map_err(EngineError::store("get_all_versions", key))
        })
    }

    /// One specific version of `key`.
    pub fn get_version<E: Entity>(&self, key: &BusinessKey, version: Version) -> EngineResult<E> {
        let query = Query::new().scoped([
            scope::by_business_key(key.clone()),
            scope::by_version(version),
        ]);
        self.find_one(&query, "get_version", key)
    }

    /// The version of `key` that was current at `at`.
    pub fn get_as_of<E: Entity>(&self, key: &BusinessKey, at: Timestamp) -> EngineResult<E> {
        let query = Query::new().scoped([scope::by_business_key(key.clone()), scope::as_of(at)]);
        self.find_one(&query, "get_as_of", key)
    }

    /// Whether any version of `key` exists, including soft-deleted history.
    pub fn exists<E: Entity>(&self, key: &BusinessKey) -> EngineResult<bool> {
        let query = Query::new().scoped([scope::by_business_key(key.clone()), scope::limit(1)]);
        self.in_transaction("exists", key.as_str(), |tx| {
            tx.count(&E::TABLE, &query)
                .map(|n| n > 0)
                .map_err(EngineError::store("exists", key))
        })
    }

    /// Whether `key` currently has an open version.
    pub fn has_latest_version<E: Entity>(&self, key: &BusinessKey) -> EngineResult<bool> {
        let query = Query::new().scoped([scope::by_business_key(key.clone()), scope::latest()]);
        self.in_transaction("has_latest_version", key.as_str(), |tx| {
            tx.count(&E::TABLE, &query)
                .map(|n| n > 0)
                .map_err(EngineError::store("has_latest_version", key))
        })
    }

    /// Rows of `E` matching an arbitrary scoped query.
    pub fn find<E: Entity>(&self, query: &Query) -> EngineResult<Vec<E>> {
        self.in_transaction("find", E::TABLE.name, |tx| {
            tx.select(&E::TABLE, query)
                .and_then(decode_all)
                .map_err(EngineError::store("find", E::TABLE.name))
        })
    }

    /// Number of rows of `E` matching `query`.
    pub fn count<E: Entity>(&self, query: &Query) -> EngineResult<usize> {
        self.in_transaction("count", E::TABLE.name, |tx| {
            tx.count(&E::TABLE, query)
                .map_err(EngineError::store("count", E::TABLE.name))
        })
    }

    fn find_one<E: Entity>(
        &self,
        query: &Query,
        operation: &'static str,
        key: &BusinessKey,
    ) -> EngineResult<E> {
        self.in_transaction(operation, key.as_str(), |tx| {
            tx.select(&E::TABLE, query)
                .and_then(decode_all)
                .map_err(EngineError::store(operation, key))?
                .into_iter()
                .next()
                .ok_or_else(|| EngineError::not_found(E::TABLE.name, key))
        })
    }
}
