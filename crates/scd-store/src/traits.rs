use scd_query::Query;
use scd_types::{BusinessKey, SurrogateKey, TableDef, Timestamp, Version};

use crate::error::StoreResult;
use crate::row::StoredRow;

/// A shared, transactional store of SCD tables.
///
/// Implementations must be safe to share across threads; every write goes
/// through a [`StoreTransaction`] obtained from [`VersionStore::begin`].
pub trait VersionStore: Send + Sync {
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    /// Open a transaction with at least read-committed isolation.
    fn begin(&self) -> StoreResult<Self::Tx<'_>>;

    /// Create tables, constraints and indexes. Idempotent.
    fn apply_schema(&self, tables: &[TableDef]) -> StoreResult<()>;

    /// Drop tables in reverse dependency order.
    fn drop_schema(&self, tables: &[TableDef]) -> StoreResult<()>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// One open transaction.
///
/// Reads see committed data plus this transaction's own writes. The only
/// update ever issued against a persisted row is [`close_if_open`].
///
/// [`close_if_open`]: StoreTransaction::close_if_open
pub trait StoreTransaction {
    /// Rows of `table` matching `query`, in query order.
    fn select(&self, table: &TableDef, query: &Query) -> StoreResult<Vec<StoredRow>>;

    /// Number of rows [`select`](Self::select) would return.
    fn count(&self, table: &TableDef, query: &Query) -> StoreResult<usize>;

    /// Highest version stored for `key`, if any.
    fn max_version(&self, table: &TableDef, key: &BusinessKey) -> StoreResult<Option<Version>>;

    /// Insert a new row.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when `(business_key, version)`
    /// or `surrogate_key` is already taken by a committed row or by another
    /// open transaction.
    ///
    /// [`StoreError::UniqueViolation`]: crate::StoreError::UniqueViolation
    fn insert(&mut self, table: &TableDef, row: &StoredRow) -> StoreResult<()>;

    /// Set `valid_to = at` on the row if it is still open.
    ///
    /// Returns `false` when the row is missing or already closed.
    fn close_if_open(
        &mut self,
        table: &TableDef,
        surrogate_key: SurrogateKey,
        at: Timestamp,
    ) -> StoreResult<bool>;

    /// Whether any row of the named table has this surrogate key.
    fn contains(&self, table: &str, surrogate_key: SurrogateKey) -> StoreResult<bool>;

    fn commit(self) -> StoreResult<()>;

    fn rollback(self) -> StoreResult<()>;
}
