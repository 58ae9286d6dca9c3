use std::fmt;

use scd_query::Query;
use scd_store::{StoreResult, StoreTransaction, StoredRow, VersionStore};
use scd_types::{Clock, Entity, SurrogateKey, TableDef, Version};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// Result of auditing one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrityReport {
    pub table: &'static str,
    pub row_count: usize,
    pub business_keys: usize,
    pub latest_rows: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }
}

/// A specific invariant violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub business_key: String,
    pub version: Option<Version>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Two rows share `(business_key, version)`.
    DuplicateVersion,
    /// Versions of a key are not exactly `1..=n`.
    VersionGap,
    /// More than one open row for a key.
    MultipleLatest,
    /// A version's interval extends past its successor's start.
    OverlappingInterval,
    /// `valid_to < valid_from`.
    InvertedInterval,
    /// A reference column points at no row.
    DanglingReference,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DuplicateVersion => "duplicate-version",
            Self::VersionGap => "version-gap",
            Self::MultipleLatest => "multiple-latest",
            Self::OverlappingInterval => "overlapping-interval",
            Self::InvertedInterval => "inverted-interval",
            Self::DanglingReference => "dangling-reference",
        };
        f.write_str(name)
    }
}

/// Checks the versioning invariants of stored tables.
pub struct IntegrityAuditor;

impl IntegrityAuditor {
    /// Audit every row of `table` as seen by `tx`.
    pub fn audit_table<T: StoreTransaction>(
        tx: &T,
        table: &TableDef,
    ) -> StoreResult<IntegrityReport> {
        // Default order is (business_key, version) ascending.
        let rows = tx.select(table, &Query::new())?;
        let mut violations = Vec::new();
        let mut business_keys = 0;

        for group in rows.chunk_by(|a, b| a.envelope.business_key == b.envelope.business_key) {
            business_keys += 1;
            audit_history(group, &mut violations);
        }
        for row in &rows {
            audit_references(tx, table, row, &mut violations)?;
        }

        Ok(IntegrityReport {
            table: table.name,
            row_count: rows.len(),
            business_keys,
            latest_rows: rows.iter().filter(|r| r.envelope.is_latest()).count(),
            violations,
        })
    }
}

/// Version sequence and interval checks for one key's rows in version order.
fn audit_history(rows: &[StoredRow], violations: &mut Vec<Violation>) {
    let key = rows[0].envelope.business_key.to_string();
    let mut push = |version: Option<Version>, kind, description: String| {
        violations.push(Violation {
            business_key: key.clone(),
            version,
            kind,
            description,
        })
    };

    let mut expected = 1u32;
    for (i, row) in rows.iter().enumerate() {
        let env = &row.envelope;
        let version = env.version.get();
        if i > 0 && rows[i - 1].envelope.version == env.version {
            push(
                Some(env.version),
                ViolationKind::DuplicateVersion,
                format!("version {version} stored more than once"),
            );
            continue;
        }
        if version != expected {
            push(
                Some(env.version),
                ViolationKind::VersionGap,
                format!("expected version {expected}, found {version}"),
            );
        }
        expected = version.saturating_add(1);

        if let Some(to) = env.valid_to {
            if to < env.valid_from {
                push(
                    Some(env.version),
                    ViolationKind::InvertedInterval,
                    format!("valid_to {to} precedes valid_from {}", env.valid_from),
                );
            }
        }
        if let Some(next) = rows.get(i + 1) {
            let overlaps = env
                .valid_to
                .map_or(true, |to| to > next.envelope.valid_from);
            if overlaps && next.envelope.version != env.version {
                push(
                    Some(env.version),
                    ViolationKind::OverlappingInterval,
                    format!(
                        "interval of {} extends past start of {}",
                        env.version, next.envelope.version
                    ),
                );
            }
        }
    }

    let open = rows.iter().filter(|r| r.envelope.is_latest()).count();
    if open > 1 {
        push(
            None,
            ViolationKind::MultipleLatest,
            format!("{open} rows have no valid_to"),
        );
    }
}

fn audit_references<T: StoreTransaction>(
    tx: &T,
    table: &TableDef,
    row: &StoredRow,
    violations: &mut Vec<Violation>,
) -> StoreResult<()> {
    for column in table.reference_columns() {
        let target_table = column.references.unwrap_or_default();
        let target = row
            .payload
            .get(column.name)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<SurrogateKey>().ok());
        let found = match target {
            Some(key) => tx.contains(target_table, key)?,
            None => false,
        };
        if !found {
            violations.push(Violation {
                business_key: row.envelope.business_key.to_string(),
                version: Some(row.envelope.version),
                kind: ViolationKind::DanglingReference,
                description: format!(
                    "{}.{} does not reference an existing {target_table} row",
                    table.name, column.name
                ),
            });
        }
    }
    Ok(())
}

impl<S: VersionStore, C: Clock> Engine<S, C> {
    /// Audit the table of `E`.
    pub fn audit<E: Entity>(&self) -> EngineResult<IntegrityReport> {
        self.audit_table(&E::TABLE)
    }

    pub fn audit_table(&self, table: &TableDef) -> EngineResult<IntegrityReport> {
        self.in_transaction("audit", table.name, |tx| {
            IntegrityAuditor::audit_table(tx, table).map_err(EngineError::store("audit", table.name))
        })
    }

    /// Audit several tables in one transaction.
    pub fn audit_tables(&self, tables: &[TableDef]) -> EngineResult<Vec<IntegrityReport>> {
        self.in_transaction("audit", "*", |tx| {
            tables
                .iter()
                .map(|table| IntegrityAuditor::audit_table(tx, table))
                .collect::<StoreResult<Vec<_>>>()
                .map_err(EngineError::store("audit", "*"))
        })
    }
}
