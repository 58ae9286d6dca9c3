//! Temporal scope algebra for SCD tables.
//!
//! A [`Scope`] is a pure transformation of a [`Query`] description. Filters
//! combine by logical AND and commute; orderings only decide output
//! sequence. Applying a scope never mutates the query it was applied to.
//!
//! ```
//! use scd_query::{scope, Query};
//! use scd_types::BusinessKey;
//!
//! let key = BusinessKey::new("job-1").unwrap();
//! let history = Query::new()
//!     .with(scope::by_business_key(key))
//!     .with(scope::order_by_version(false));
//! let current = history.with(scope::latest());
//! assert_eq!(history.filters().len(), 1);
//! assert_eq!(current.filters().len(), 2);
//! ```
//!
//! Queries evaluate in memory ([`Query::apply`]) or render to parameterised
//! SQL ([`Query::to_sql`]); both interpretations agree on every predicate.

pub mod error;
pub mod query;
pub mod scope;
pub mod sql;

pub use error::QueryError;
pub use query::{parse_field_value, Query};
pub use scope::{Filter, Order, Scope};
pub use sql::{SqlFragment, SqlParam};
