//! Static table mapping for versioned entities.
//!
//! Each entity declares its table name and payload columns at compile time
//! through [`Entity::TABLE`]. Stores use the declaration to build DDL, bind
//! parameters and decode rows; nothing is discovered at runtime.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::envelope::{Envelope, Versioned};
use crate::error::TypeError;
use crate::identity::SurrogateKey;

/// Entity-specific fields of a row, keyed by column name.
pub type Payload = serde_json::Map<String, Value>;

/// Column names owned by the envelope. Payload columns may not reuse them.
pub const ENVELOPE_FIELDS: [&str; 5] = [
    "surrogate_key",
    "business_key",
    "version",
    "valid_from",
    "valid_to",
];

/// Storage type of a payload column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    /// A surrogate key, stored as its hyphenated string form.
    Uuid,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text | Self::Uuid => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// One payload column of an entity table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Table whose surrogate key this column references, if any.
    pub references: Option<&'static str>,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text, references: None }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Integer, references: None }
    }

    pub const fn real(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Real, references: None }
    }

    /// A column pinning one specific version of a row in `table`.
    pub const fn reference(name: &'static str, table: &'static str) -> Self {
        Self { name, kind: ColumnKind::Uuid, references: Some(table) }
    }
}

/// Table name plus payload columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl TableDef {
    pub const fn new(name: &'static str, columns: &'static [Column]) -> Self {
        Self { name, columns }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Payload columns that reference other tables.
    pub fn reference_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.references.is_some())
    }
}

/// A dependent row's pointer at one specific version of another entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reference {
    pub column: &'static str,
    pub table: &'static str,
    pub target: SurrogateKey,
}

/// A versioned entity with a static table mapping.
///
/// The default payload conversions serialize the entity to a JSON object and
/// split the envelope fields off, so an entity only needs to serialize its
/// envelope fields under the names in [`ENVELOPE_FIELDS`] (usually through
/// `#[serde(flatten)]`) and its payload under its column names.
pub trait Entity: Versioned + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: TableDef;

    /// Entity-specific payload invariants.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn to_payload(&self) -> Result<Payload, TypeError> {
        let value = serde_json::to_value(self).map_err(|e| TypeError::Payload(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(TypeError::Payload(format!(
                "{} does not serialize to an object",
                Self::TABLE.name
            )));
        };
        for field in ENVELOPE_FIELDS {
            map.remove(field);
        }
        Ok(map)
    }

    fn from_parts(envelope: Envelope, payload: Payload) -> Result<Self, TypeError> {
        let Value::Object(mut map) =
            serde_json::to_value(&envelope).map_err(|e| TypeError::Payload(e.to_string()))?
        else {
            return Err(TypeError::Payload("envelope is not an object".into()));
        };
        for (column, value) in payload {
            if !ENVELOPE_FIELDS.contains(&column.as_str()) {
                map.insert(column, value);
            }
        }
        serde_json::from_value(Value::Object(map)).map_err(|e| {
            TypeError::Payload(format!("cannot decode {} row: {e}", Self::TABLE.name))
        })
    }

    /// Surrogate keys this row points at, read from its reference columns.
    fn references(&self) -> Result<Vec<Reference>, TypeError> {
        let payload = self.to_payload()?;
        Self::TABLE
            .reference_columns()
            .map(|column| {
                let raw = payload
                    .get(column.name)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        TypeError::Payload(format!(
                            "{}.{} must be a surrogate key string",
                            Self::TABLE.name,
                            column.name
                        ))
                    })?;
                Ok(Reference {
                    column: column.name,
                    table: column.references.unwrap_or_default(),
                    target: raw.parse()?,
                })
            })
            .collect()
    }
}
