use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use scd_query::Query;
use scd_types::{BusinessKey, SurrogateKey, TableDef, Timestamp, Version};
use tracing::debug;

use crate::error::{StoreError, StoreResult, SURROGATE_CONSTRAINT, VERSION_CONSTRAINT};
use crate::row::StoredRow;
use crate::traits::{StoreTransaction, VersionStore};

type TxId = u64;

/// Committed rows of one table plus the claims of open transactions.
///
/// Claims emulate unique-index locks: a pending insert reserves its
/// `(business_key, version)` and surrogate key, and a pending close reserves
/// the row, until the owning transaction commits or rolls back.
struct TableState {
    def: TableDef,
    rows: Vec<StoredRow>,
    by_surrogate: HashMap<SurrogateKey, usize>,
    versions: HashSet<(BusinessKey, Version)>,
    max_versions: HashMap<BusinessKey, Version>,
    pending_versions: HashMap<(BusinessKey, Version), TxId>,
    pending_surrogates: HashMap<SurrogateKey, TxId>,
    close_claims: HashMap<SurrogateKey, TxId>,
}

impl TableState {
    fn new(def: TableDef) -> Self {
        Self {
            def,
            rows: Vec::new(),
            by_surrogate: HashMap::new(),
            versions: HashSet::new(),
            max_versions: HashMap::new(),
            pending_versions: HashMap::new(),
            pending_surrogates: HashMap::new(),
            close_claims: HashMap::new(),
        }
    }

    fn release(&mut self, tx: TxId) {
        self.pending_versions.retain(|_, owner| *owner != tx);
        self.pending_surrogates.retain(|_, owner| *owner != tx);
        self.close_claims.retain(|_, owner| *owner != tx);
    }
}

/// In-memory, `HashMap`-based version store.
///
/// Intended for tests and embedding. Provides read-committed visibility and
/// the same constraint behavior as the SQLite backend. The lock is held only
/// for the duration of a single statement, never across a transaction.
pub struct InMemoryStore {
    tables: RwLock<HashMap<&'static str, TableState>>,
    next_tx: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
        }
    }

    /// Create a store with `tables` already applied.
    pub fn with_schema(tables: &[TableDef]) -> Self {
        let store = Self::new();
        let mut map = store.tables.write().unwrap_or_else(PoisonError::into_inner);
        for def in tables {
            map.insert(def.name, TableState::new(*def));
        }
        drop(map);
        store
    }

    /// Number of committed rows in `table` (0 if unknown).
    pub fn row_count(&self, table: &str) -> usize {
        self.read()
            .map(|map| map.get(table).map_or(0, |t| t.rows.len()))
            .unwrap_or(0)
    }

    /// Names of the tables currently defined, sorted.
    pub fn table_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .read()
            .map(|map| map.keys().copied().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<&'static str, TableState>>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<&'static str, TableState>>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("tables", &self.table_names())
            .finish()
    }
}

impl VersionStore for InMemoryStore {
    type Tx<'a> = InMemoryTransaction<'a>;

    fn begin(&self) -> StoreResult<InMemoryTransaction<'_>> {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        Ok(InMemoryTransaction {
            store: self,
            id,
            inserts: Vec::new(),
            closes: Vec::new(),
            finished: false,
        })
    }

    fn apply_schema(&self, tables: &[TableDef]) -> StoreResult<()> {
        let mut map = self.write()?;
        for def in tables {
            map.entry(def.name).or_insert_with(|| TableState::new(*def));
        }
        debug!(count = tables.len(), "applied in-memory schema");
        Ok(())
    }

    fn drop_schema(&self, tables: &[TableDef]) -> StoreResult<()> {
        let mut map = self.write()?;
        for def in tables.iter().rev() {
            map.remove(def.name);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// An open transaction against an [`InMemoryStore`].
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryStore,
    id: TxId,
    inserts: Vec<(&'static str, StoredRow)>,
    closes: Vec<(&'static str, SurrogateKey, Timestamp)>,
    finished: bool,
}

impl InMemoryTransaction<'_> {
    /// Committed rows with this transaction's writes overlaid.
    fn visible_rows(&self, state: &TableState) -> Vec<StoredRow> {
        let name = state.def.name;
        let mut rows = state.rows.clone();
        for (table, key, at) in &self.closes {
            if *table == name {
                if let Some(&idx) = state.by_surrogate.get(key) {
                    rows[idx].envelope.valid_to = Some(*at);
                }
            }
        }
        rows.extend(
            self.inserts
                .iter()
                .filter(|(table, _)| *table == name)
                .map(|(_, row)| row.clone()),
        );
        rows
    }

    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let mut map = self
            .store
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for state in map.values_mut() {
            state.release(self.id);
        }
    }
}

fn table<'m>(
    map: &'m HashMap<&'static str, TableState>,
    name: &str,
) -> StoreResult<&'m TableState> {
    map.get(name)
        .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
}

impl StoreTransaction for InMemoryTransaction<'_> {
    fn select(&self, def: &TableDef, query: &Query) -> StoreResult<Vec<StoredRow>> {
        query.validate(def)?;
        let map = self.store.read()?;
        let state = table(&map, def.name)?;
        Ok(query.apply(self.visible_rows(state), |r| (&r.envelope, &r.payload)))
    }

    fn count(&self, def: &TableDef, query: &Query) -> StoreResult<usize> {
        self.select(def, query).map(|rows| rows.len())
    }

    fn max_version(&self, def: &TableDef, key: &BusinessKey) -> StoreResult<Option<Version>> {
        let map = self.store.read()?;
        let state = table(&map, def.name)?;
        let own = self
            .inserts
            .iter()
            .filter(|(t, row)| *t == def.name && &row.envelope.business_key == key)
            .map(|(_, row)| row.envelope.version);
        Ok(state.max_versions.get(key).copied().into_iter().chain(own).max())
    }

    fn insert(&mut self, def: &TableDef, row: &StoredRow) -> StoreResult<()> {
        row.check_columns(def)?;
        let mut map = self.store.write()?;

        for column in def.reference_columns() {
            let target_table = column.references.unwrap_or_default();
            let target: SurrogateKey = row
                .payload
                .get(column.name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .parse()?;
            let committed = table(&map, target_table)?.by_surrogate.contains_key(&target);
            let own = self.inserts.iter().any(|(t, r)| {
                *t == target_table && r.envelope.surrogate_key == target
            });
            if !committed && !own {
                return Err(StoreError::ForeignKeyViolation {
                    table: def.name.to_string(),
                    column: column.name.to_string(),
                });
            }
        }

        let state = map
            .get_mut(def.name)
            .ok_or_else(|| StoreError::UnknownTable(def.name.to_string()))?;
        let env = &row.envelope;
        if state.by_surrogate.contains_key(&env.surrogate_key)
            || state.pending_surrogates.contains_key(&env.surrogate_key)
        {
            return Err(StoreError::UniqueViolation {
                table: def.name.to_string(),
                constraint: SURROGATE_CONSTRAINT,
            });
        }
        let version_key = (env.business_key.clone(), env.version);
        if state.versions.contains(&version_key) || state.pending_versions.contains_key(&version_key)
        {
            return Err(StoreError::UniqueViolation {
                table: def.name.to_string(),
                constraint: VERSION_CONSTRAINT,
            });
        }

        state.pending_surrogates.insert(env.surrogate_key, self.id);
        state.pending_versions.insert(version_key, self.id);
        self.inserts.push((state.def.name, row.clone()));
        Ok(())
    }

    fn close_if_open(
        &mut self,
        def: &TableDef,
        surrogate_key: SurrogateKey,
        at: Timestamp,
    ) -> StoreResult<bool> {
        if let Some((_, row)) = self
            .inserts
            .iter_mut()
            .find(|(t, r)| *t == def.name && r.envelope.surrogate_key == surrogate_key)
        {
            if row.envelope.valid_to.is_some() {
                return Ok(false);
            }
            row.envelope.valid_to = Some(at);
            return Ok(true);
        }

        let mut map = self.store.write()?;
        let state = map
            .get_mut(def.name)
            .ok_or_else(|| StoreError::UnknownTable(def.name.to_string()))?;
        let Some(&idx) = state.by_surrogate.get(&surrogate_key) else {
            return Ok(false);
        };
        match state.close_claims.get(&surrogate_key) {
            Some(owner) if *owner == self.id => return Ok(false),
            Some(_) => {
                return Err(StoreError::RowLocked {
                    table: def.name.to_string(),
                    surrogate_key,
                })
            }
            None => {}
        }
        if state.rows[idx].envelope.valid_to.is_some() {
            return Ok(false);
        }
        state.close_claims.insert(surrogate_key, self.id);
        self.closes.push((state.def.name, surrogate_key, at));
        Ok(true)
    }

    fn contains(&self, table_name: &str, surrogate_key: SurrogateKey) -> StoreResult<bool> {
        let map = self.store.read()?;
        let committed = table(&map, table_name)?
            .by_surrogate
            .contains_key(&surrogate_key);
        Ok(committed
            || self
                .inserts
                .iter()
                .any(|(t, r)| *t == table_name && r.envelope.surrogate_key == surrogate_key))
    }

    fn commit(mut self) -> StoreResult<()> {
        let mut map = self.store.write()?;
        for (name, key, at) in self.closes.drain(..) {
            if let Some(state) = map.get_mut(name) {
                if let Some(&idx) = state.by_surrogate.get(&key) {
                    state.rows[idx].envelope.valid_to = Some(at);
                }
            }
        }
        let inserted = self.inserts.len();
        for (name, row) in self.inserts.drain(..) {
            if let Some(state) = map.get_mut(name) {
                let env = &row.envelope;
                state.by_surrogate.insert(env.surrogate_key, state.rows.len());
                state.versions.insert((env.business_key.clone(), env.version));
                let max = state
                    .max_versions
                    .entry(env.business_key.clone())
                    .or_insert(env.version);
                if env.version > *max {
                    *max = env.version;
                }
                state.rows.push(row);
            }
        }
        for state in map.values_mut() {
            state.release(self.id);
        }
        self.finished = true;
        debug!(tx = self.id, inserted, "committed in-memory transaction");
        Ok(())
    }

    fn rollback(mut self) -> StoreResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
