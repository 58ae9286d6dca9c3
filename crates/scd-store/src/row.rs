use scd_types::{Column, ColumnKind, Entity, Envelope, Payload, TableDef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// One persisted version: the envelope plus the payload columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub envelope: Envelope,
    pub payload: Payload,
}

impl StoredRow {
    pub fn new(envelope: Envelope, payload: Payload) -> Self {
        Self { envelope, payload }
    }

    pub fn from_entity<E: Entity>(entity: &E) -> StoreResult<Self> {
        Ok(Self {
            envelope: entity.envelope().clone(),
            payload: entity.to_payload()?,
        })
    }

    pub fn into_entity<E: Entity>(self) -> StoreResult<E> {
        Ok(E::from_parts(self.envelope, self.payload)?)
    }

    /// Check that every declared column is present with a value of its kind.
    pub fn check_columns(&self, table: &TableDef) -> StoreResult<()> {
        for column in table.columns {
            let value = self.payload.get(column.name).unwrap_or(&Value::Null);
            if let Err(reason) = check_value(column, value) {
                return Err(StoreError::BadColumn {
                    table: table.name.to_string(),
                    column: column.name.to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

fn check_value(column: &Column, value: &Value) -> Result<(), String> {
    let ok = match column.kind {
        ColumnKind::Text => value.is_string(),
        ColumnKind::Integer => value.is_i64(),
        ColumnKind::Real => value.is_number(),
        ColumnKind::Uuid => value
            .as_str()
            .is_some_and(|s| s.parse::<scd_types::SurrogateKey>().is_ok()),
    };
    if ok {
        Ok(())
    } else if value.is_null() {
        Err("missing value".into())
    } else {
        Err(format!("expected {:?}, found {value}", column.kind))
    }
}
