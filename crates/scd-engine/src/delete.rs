use scd_store::{StoreError, StoreTransaction, VersionStore};
use scd_types::{BusinessKey, Clock, Entity};
use tracing::info;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::read::latest_row;

impl<S: VersionStore, C: Clock> Engine<S, C> {
    /// Close the latest version of `key` without a successor.
    ///
    /// History is untouched and the row count does not change. Not
    /// idempotent: a second call finds no latest row and fails with
    /// [`EngineError::NotFound`], as does losing a race with another
    /// delete.
    pub fn soft_delete<E: Entity>(&self, key: &BusinessKey) -> EngineResult<()> {
        let table = E::TABLE;
        let closed = self.in_transaction("soft_delete", key.as_str(), |tx| {
            let latest = latest_row(tx, &table, key)
                .map_err(EngineError::store("soft_delete.load_latest", key))?
                .ok_or_else(|| EngineError::not_found(table.name, key))?;
            let at = self.now_not_before(latest.envelope.valid_from);
            match tx.close_if_open(&table, latest.envelope.surrogate_key, at) {
                Ok(true) => Ok(latest.envelope.version),
                Ok(false) => Err(EngineError::not_found(table.name, key)),
                Err(StoreError::RowLocked { .. }) => Err(EngineError::ConflictExhausted {
                    table: table.name,
                    business_key: key.to_string(),
                    attempts: 1,
                }),
                Err(err) => Err(EngineError::infra("soft_delete.close", key)(err)),
            }
        })?;
        info!(table = table.name, business_key = %key, version = %closed, "soft-deleted");
        Ok(())
    }
}
