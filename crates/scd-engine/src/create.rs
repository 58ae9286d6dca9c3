use scd_store::{StoreError, StoreTransaction, StoredRow, VersionStore};
use scd_types::{Clock, Entity, Envelope};
use tracing::{debug, info};

use crate::engine::{check_references, Engine};
use crate::error::{EngineError, EngineResult};
use crate::read::latest_row;

impl<S: VersionStore, C: Clock> Engine<S, C> {
    /// Persist the first version of a new entity.
    ///
    /// Only the business key of `entity`'s envelope is used; the surrogate
    /// key, version and validity interval are assigned here. Fails with
    /// [`EngineError::AlreadyExists`] if the key has any version, open or
    /// soft-deleted. Two concurrent creates of one key cannot both succeed:
    /// the loser hits the `(business_key, version = 1)` constraint.
    pub fn create<E: Entity>(&self, mut entity: E) -> EngineResult<E> {
        let table = E::TABLE;
        let key = entity.business_key().clone();
        entity.validate().map_err(EngineError::Validation)?;

        let created = self.in_transaction("create", key.as_str(), |tx| {
            let existing = latest_row(tx, &table, &key)
                .map_err(EngineError::store("create.load_latest", &key))?;
            if existing.is_some() {
                return Err(EngineError::already_exists(table.name, &key));
            }
            let max = tx
                .max_version(&table, &key)
                .map_err(EngineError::store("create.allocate", &key))?;
            if max.is_some() {
                debug!(table = table.name, business_key = %key, "key has soft-deleted history");
                return Err(EngineError::already_exists(table.name, &key));
            }

            *entity.envelope_mut() = Envelope::first(key.clone(), self.clock().now());
            check_references(tx, &entity, "create.check_references")?;

            let row = StoredRow::from_entity(&entity)
                .map_err(EngineError::infra("create.encode", &key))?;
            match tx.insert(&table, &row) {
                Ok(()) => Ok(entity),
                Err(err) if err.is_unique_violation() => {
                    Err(EngineError::already_exists(table.name, &key))
                }
                Err(err @ StoreError::ForeignKeyViolation { .. }) => {
                    Err(EngineError::store("create.insert", &key)(err))
                }
                Err(err) => Err(EngineError::infra("create.insert", &key)(err)),
            }
        })?;

        info!(
            table = table.name,
            business_key = %key,
            surrogate_key = %created.surrogate_key(),
            "created version 1"
        );
        Ok(created)
    }
}
