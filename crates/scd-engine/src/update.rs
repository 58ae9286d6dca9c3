use std::thread;

use scd_query::{scope, Query};
use scd_store::{StoreError, StoreResult, StoreTransaction, StoredRow, VersionStore};
use scd_types::{BusinessKey, Clock, Entity, TableDef};
use tracing::{debug, info, warn};

use crate::allocator::next_version;
use crate::engine::{check_references, Engine};
use crate::error::{EngineError, EngineResult};
use crate::read::latest_row;

/// Whether `key` has an open row other than the pending `successor`.
fn has_other_latest<T: StoreTransaction, E: Entity>(
    tx: &T,
    table: &TableDef,
    key: &BusinessKey,
    successor: &E,
) -> StoreResult<bool> {
    let query = Query::new().scoped([scope::by_business_key(key.clone()), scope::latest()]);
    Ok(tx
        .select(table, &query)?
        .iter()
        .any(|row| row.envelope.surrogate_key != successor.surrogate_key()))
}

impl<S: VersionStore, C: Clock> Engine<S, C> {
    /// Create a new version of `key` by mutating a copy of the latest one.
    ///
    /// `mutate` receives a clone of the current latest entity; the persisted
    /// row is never touched. It may run more than once when the version
    /// allocation has to be retried, so it should be a pure function of its
    /// input.
    pub fn update<E: Entity>(
        &self,
        key: &BusinessKey,
        mut mutate: impl FnMut(&mut E),
    ) -> EngineResult<E> {
        self.try_update(key, |entity: &mut E| {
            mutate(entity);
            Ok(())
        })
    }

    /// Like [`Engine::update`] but the mutator may reject the change; its
    /// error message is reported as [`EngineError::Validation`].
    ///
    /// Within one transaction, each attempt:
    ///
    /// 1. loads the latest row (`NotFound` if there is none)
    /// 2. allocates `MAX(version) + 1`
    /// 3. mutates and validates a clone, then gives it a fresh envelope
    /// 4. inserts the successor (a version conflict starts the next attempt)
    /// 5. closes the predecessor at the successor's `valid_from`; if it was
    ///    closed meanwhile, a concurrent delete reports `NotFound` and a
    ///    concurrent successor reports `ConflictExhausted`
    ///
    /// The predecessor is closed only after the successor is inserted, and
    /// any failure rolls back both.
    pub fn try_update<E: Entity>(
        &self,
        key: &BusinessKey,
        mut mutate: impl FnMut(&mut E) -> Result<(), String>,
    ) -> EngineResult<E> {
        let table = E::TABLE;
        let policy = self.config().retry.clone();
        let attempts = policy.attempts();

        let updated = self.in_transaction("update", key.as_str(), |tx| {
            for attempt in 1..=attempts {
                let current = latest_row(tx, &table, key)
                    .map_err(EngineError::store("update.load_latest", key))?
                    .ok_or_else(|| EngineError::not_found(table.name, key))?;

                let candidate = next_version(tx, &table, key)
                    .map_err(EngineError::store("update.allocate", key))?;
                if candidate != current.envelope.version.next() {
                    warn!(
                        table = table.name,
                        business_key = %key,
                        latest = %current.envelope.version,
                        candidate = %candidate,
                        attempt,
                        "latest row is stale, retrying"
                    );
                    if attempt < attempts {
                        thread::sleep(policy.delay(attempt));
                    }
                    continue;
                }

                let latest: E = current
                    .into_entity()
                    .map_err(EngineError::infra("update.decode", key))?;
                let mut successor = latest.clone();
                mutate(&mut successor).map_err(EngineError::Validation)?;
                successor.validate().map_err(EngineError::Validation)?;

                let at = self.now_not_before(latest.valid_from());
                *successor.envelope_mut() = latest.envelope().successor(candidate, at);
                check_references(tx, &successor, "update.check_references")?;

                let row = StoredRow::from_entity(&successor)
                    .map_err(EngineError::infra("update.encode", key))?;
                match tx.insert(&table, &row) {
                    Ok(()) => {}
                    Err(err) if err.is_unique_violation() => {
                        warn!(
                            table = table.name,
                            business_key = %key,
                            version = %candidate,
                            attempt,
                            "version already taken, retrying"
                        );
                        if attempt < attempts {
                            thread::sleep(policy.delay(attempt));
                        }
                        continue;
                    }
                    Err(err) => return Err(EngineError::store("update.insert", key)(err)),
                }

                return match tx.close_if_open(&table, latest.surrogate_key(), at) {
                    Ok(true) => {
                        debug!(
                            table = table.name,
                            business_key = %key,
                            closed = %latest.version(),
                            "closed predecessor"
                        );
                        Ok(successor)
                    }
                    // Closed under us; the successor must not survive.
                    Ok(false) => {
                        let superseded = has_other_latest(tx, &table, key, &successor)
                            .map_err(EngineError::store("update.recheck_latest", key))?;
                        if superseded {
                            Err(EngineError::ConflictExhausted {
                                table: table.name,
                                business_key: key.to_string(),
                                attempts: attempt,
                            })
                        } else {
                            Err(EngineError::not_found(table.name, key))
                        }
                    }
                    Err(StoreError::RowLocked { .. }) => Err(EngineError::ConflictExhausted {
                        table: table.name,
                        business_key: key.to_string(),
                        attempts: attempt,
                    }),
                    Err(err) => Err(EngineError::infra("update.close_predecessor", key)(err)),
                };
            }
            Err(EngineError::ConflictExhausted {
                table: table.name,
                business_key: key.to_string(),
                attempts,
            })
        })?;

        info!(
            table = table.name,
            business_key = %key,
            version = %updated.version(),
            "updated"
        );
        Ok(updated)
    }
}
