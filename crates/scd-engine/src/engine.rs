use std::cmp::max;
use std::fmt;
use std::sync::Arc;

use scd_store::{StoreTransaction, VersionStore};
use scd_types::{Clock, Entity, SystemClock, Timestamp};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// The versioning engine.
///
/// Holds an explicit store handle, a clock and the retry configuration;
/// there is no global state. Cloning is cheap when the clock is.
pub struct Engine<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: EngineConfig,
}

impl<S: VersionStore> Engine<S> {
    /// An engine on the system clock with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: VersionStore, C: Clock> Engine<S, C> {
    pub fn with_clock(store: Arc<S>, clock: C) -> Self {
        Self {
            store,
            clock,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current time, but never earlier than `floor`.
    ///
    /// Used when closing a row so that `valid_to >= valid_from` holds even
    /// if the clock steps backwards.
    pub(crate) fn now_not_before(&self, floor: Timestamp) -> Timestamp {
        max(self.clock.now(), floor)
    }

    /// Run `f` in one transaction: commit on `Ok`, roll back on `Err`.
    pub(crate) fn in_transaction<'s, T>(
        &'s self,
        operation: &'static str,
        key: &str,
        f: impl FnOnce(&mut S::Tx<'s>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut tx = self
            .store
            .begin()
            .map_err(EngineError::infra(operation, key))?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit().map_err(EngineError::infra(operation, key))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(operation, business_key = key, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Every reference column of `entity` must point at an existing row.
pub(crate) fn check_references<E: Entity, T: StoreTransaction>(
    tx: &T,
    entity: &E,
    operation: &'static str,
) -> EngineResult<()> {
    for reference in entity.references()? {
        let exists = tx
            .contains(reference.table, reference.target)
            .map_err(EngineError::infra(operation, entity.business_key()))?;
        if !exists {
            return Err(EngineError::Validation(format!(
                "{}.{} references missing {} row {}",
                E::TABLE.name,
                reference.column,
                reference.table,
                reference.target
            )));
        }
    }
    Ok(())
}

impl<S, C: Clone> Clone for Engine<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: VersionStore, C> fmt::Debug for Engine<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.store.backend())
            .field("config", &self.config)
            .finish()
    }
}
