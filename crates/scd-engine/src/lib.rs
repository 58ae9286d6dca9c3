//! Type-2 slowly changing dimension engine.
//!
//! Every change to an entity inserts a new immutable row; the previous
//! latest row is closed by setting `valid_to`. The [`Engine`] provides:
//!
//! - [`Engine::create`] -- first version of a new business key
//! - [`Engine::update`] / [`Engine::try_update`] -- clone, mutate, insert the
//!   successor, then close the predecessor, all in one transaction
//! - [`Engine::soft_delete`] -- close the latest row without a successor
//! - point reads (`get_latest`, `get_version`, `get_as_of`, ...) and scoped
//!   queries over any [`scd_query::Query`]
//! - [`IntegrityAuditor`] -- checks the versioning invariants of a table
//!
//! # Concurrency
//!
//! Versions are allocated optimistically as `MAX(version) + 1`. The store's
//! `(business_key, version)` uniqueness constraint is the only arbiter
//! between concurrent writers of one key; a losing writer recomputes and
//! retries up to [`RetryPolicy::max_attempts`] times. Versions therefore
//! follow commit order, not call order. Different business keys never
//! conflict.

pub mod allocator;
pub mod config;
pub mod create;
pub mod delete;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod read;
pub mod update;

pub use config::{EngineConfig, RetryPolicy};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use integrity::{IntegrityAuditor, IntegrityReport, Violation, ViolationKind};
