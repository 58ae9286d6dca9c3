//! Optimistic version allocation.
//!
//! The candidate is `MAX(version) + 1` as seen inside the caller's
//! transaction. Nothing is locked; the `(business_key, version)` constraint
//! rejects the insert if another writer committed (or holds) the same
//! candidate, and the caller recomputes.

use scd_store::{StoreResult, StoreTransaction};
use scd_types::{BusinessKey, TableDef, Version};

/// Next version for `key`, or [`Version::FIRST`] if it has none.
pub fn next_version<T: StoreTransaction>(
    tx: &T,
    table: &TableDef,
    key: &BusinessKey,
) -> StoreResult<Version> {
    Ok(tx
        .max_version(table, key)?
        .map_or(Version::FIRST, |max| max.next()))
}
