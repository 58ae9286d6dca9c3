//! Concrete versioned entities.
//!
//! - [`Job`] (`jobs`) -- a contract between a company and a contractor
//! - [`Timelog`] (`timelogs`) -- time worked, pinned to one job version
//! - [`PaymentLineItem`] (`payment_line_items`) -- an amount owed, pinned to
//!   one job version and one timelog version
//!
//! Dependent rows reference the surrogate key of the exact version they were
//! computed from, never the business key.

pub mod error;
pub mod job;
pub mod payment;
pub mod timelog;

use std::fmt;
use std::str::FromStr;

use scd_types::{Entity, TableDef};

pub use error::ModelError;
pub use job::{Job, JobStatus};
pub use payment::{calculate_amount, PaymentLineItem, PaymentStatus};
pub use timelog::{Timelog, TimelogKind};

macro_rules! impl_versioned {
    ($($ty:ty),* $(,)?) => {
        $(
            impl scd_types::Versioned for $ty {
                fn envelope(&self) -> &scd_types::Envelope {
                    &self.envelope
                }
                fn envelope_mut(&mut self) -> &mut scd_types::Envelope {
                    &mut self.envelope
                }
            }
        )*
    };
}

impl_versioned!(Job, Timelog, PaymentLineItem);

/// All entity tables in dependency order (referenced tables first).
pub fn tables() -> [TableDef; 3] {
    [Job::TABLE, Timelog::TABLE, PaymentLineItem::TABLE]
}

/// The entity types, addressable by name from the CLI and HTTP routes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Job,
    Timelog,
    Payment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Job, Self::Timelog, Self::Payment];

    pub fn table(&self) -> TableDef {
        match self {
            Self::Job => Job::TABLE,
            Self::Timelog => Timelog::TABLE,
            Self::Payment => PaymentLineItem::TABLE,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job => write!(f, "job"),
            Self::Timelog => write!(f, "timelog"),
            Self::Payment => write!(f, "payment"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" | "jobs" => Ok(Self::Job),
            "timelog" | "timelogs" => Ok(Self::Timelog),
            "payment" | "payments" | "payment_line_items" => Ok(Self::Payment),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_in_dependency_order() {
        let names: Vec<_> = tables().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["jobs", "timelogs", "payment_line_items"]);
        for (i, table) in tables().iter().enumerate() {
            for column in table.reference_columns() {
                let target = column.references.unwrap();
                let pos = names.iter().position(|n| *n == target).unwrap();
                assert!(pos < i, "{} references later table {target}", table.name);
            }
        }
    }

    #[test]
    fn kind_parses_singular_and_plural() {
        assert_eq!("jobs".parse::<EntityKind>().unwrap(), EntityKind::Job);
        assert_eq!("payment".parse::<EntityKind>().unwrap(), EntityKind::Payment);
        assert_eq!(EntityKind::Timelog.table().name, "timelogs");
        assert!("invoice".parse::<EntityKind>().is_err());
    }
}
