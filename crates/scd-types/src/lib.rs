//! Foundation types for Type-2 slowly changing dimension (SCD) storage.
//!
//! Every versioned entity embeds the same five-field [`Envelope`]:
//!
//! - [`SurrogateKey`] -- fresh per row, never reused
//! - [`BusinessKey`] -- shared by all versions of one logical entity
//! - [`Version`] -- contiguous from 1 per business key
//! - `valid_from` / `valid_to` -- the half-open validity interval
//!
//! The [`Versioned`] trait exposes the envelope; [`Entity`] adds the static
//! table mapping the store and engine operate on. Nothing in this crate
//! touches storage.

pub mod entity;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod temporal;
pub mod version;

pub use entity::{Column, ColumnKind, Entity, Payload, Reference, TableDef, ENVELOPE_FIELDS};
pub use envelope::{Envelope, Versioned};
pub use error::TypeError;
pub use identity::{BusinessKey, SurrogateKey};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
pub use version::Version;
