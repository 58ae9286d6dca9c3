//! Transactional storage for SCD tables.
//!
//! The engine talks to storage only through [`VersionStore`] and
//! [`StoreTransaction`]. A backend must provide:
//!
//! 1. Read-committed visibility: a transaction sees committed rows plus its
//!    own pending writes.
//! 2. A uniqueness constraint on `(business_key, version)` and on
//!    `surrogate_key`, reported as [`StoreError::UniqueViolation`].
//! 3. A conditional close (`valid_to IS NULL` guard) as the only update.
//! 4. Atomic commit; dropping an unfinished transaction rolls it back.
//!
//! # Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`SqliteStore`] -- `rusqlite` connection with real DDL and constraints

pub mod error;
pub mod memory;
pub mod row;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use row::StoredRow;
pub use sqlite::SqliteStore;
pub use traits::{StoreTransaction, VersionStore};
