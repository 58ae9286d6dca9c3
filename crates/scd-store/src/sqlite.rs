use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode};
use scd_query::sql::quote_ident;
use scd_query::{Query, SqlParam};
use scd_types::temporal::{from_micros, to_micros};
use scd_types::{
    BusinessKey, ColumnKind, Envelope, Payload, SurrogateKey, TableDef, Timestamp, TypeError,
    Version, ENVELOPE_FIELDS,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult, SURROGATE_CONSTRAINT, VERSION_CONSTRAINT};
use crate::row::StoredRow;
use crate::schema::{create_table_sql, drop_table_sql};
use crate::traits::{StoreTransaction, VersionStore};

/// SQLite-backed version store.
///
/// A single connection behind a `Mutex`; transactions are `BEGIN IMMEDIATE`
/// and hold the connection until they finish, so writers serialize. The
/// `(business_key, version)` unique constraint and foreign keys are enforced
/// by SQLite itself.
///
/// Reads run through the same transactions, so a reader waits for any
/// writer and for other readers, whatever business key they touch. Writers
/// of different keys still never fail against each other; they only queue.
/// Deployments that need concurrent readers should use one store per
/// process over a WAL database file rather than share one handle.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::configure(conn, Some(path))
    }

    /// A private in-memory database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::configure(Connection::open_in_memory()?, None)
    }

    fn configure(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = ?path, "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn run_script<'s>(
        &self,
        tables: impl Iterator<Item = &'s TableDef>,
        render: fn(&TableDef) -> String,
    ) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for table in tables {
            tx.execute_batch(&render(table))
                .map_err(|e| StoreError::Migration(format!("{}: {e}", table.name)))?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish()
    }
}

impl VersionStore for SqliteStore {
    type Tx<'a> = SqliteTransaction<'a>;

    fn begin(&self) -> StoreResult<SqliteTransaction<'_>> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTransaction {
            conn,
            finished: false,
        })
    }

    fn apply_schema(&self, tables: &[TableDef]) -> StoreResult<()> {
        self.run_script(tables.iter(), create_table_sql)?;
        debug!(count = tables.len(), "applied sqlite schema");
        Ok(())
    }

    fn drop_schema(&self, tables: &[TableDef]) -> StoreResult<()> {
        self.run_script(tables.iter().rev(), drop_table_sql)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

/// An open `BEGIN IMMEDIATE` transaction. Rolls back on drop unless
/// committed.
pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn select(&self, table: &TableDef, query: &Query) -> StoreResult<Vec<StoredRow>> {
        let fragment = query.to_sql(table)?;
        let sql = format!(
            "SELECT {} FROM {}{}",
            select_list(table),
            quote_ident(table.name),
            fragment.tail()
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let width = ENVELOPE_FIELDS.len() + table.columns.len();
        let raw = stmt
            .query_map(params_from_iter(bind(&fragment.params)), |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(|values| decode_row(table, values)).collect()
    }

    fn count(&self, table: &TableDef, query: &Query) -> StoreResult<usize> {
        let fragment = query.to_sql(table)?;
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {}{})",
            quote_ident(table.name),
            fragment.tail()
        );
        let n: i64 = self
            .conn
            .query_row(&sql, params_from_iter(bind(&fragment.params)), |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    fn max_version(&self, table: &TableDef, key: &BusinessKey) -> StoreResult<Option<Version>> {
        let sql = format!(
            "SELECT MAX({}) FROM {} WHERE {} = ?1",
            quote_ident("version"),
            quote_ident(table.name),
            quote_ident("business_key")
        );
        let max: Option<i64> = self
            .conn
            .query_row(&sql, params![key.as_str()], |row| row.get(0))?;
        max.map(decode_version).transpose()
    }

    fn insert(&mut self, table: &TableDef, row: &StoredRow) -> StoreResult<()> {
        row.check_columns(table)?;
        let values = encode_row(table, row);
        let marks = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({marks})",
            quote_ident(table.name),
            select_list(table)
        );
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(values.iter()))
            .map_err(|e| classify(table, e))?;
        Ok(())
    }

    fn close_if_open(
        &mut self,
        table: &TableDef,
        surrogate_key: SurrogateKey,
        at: Timestamp,
    ) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {} SET {to} = ?1 WHERE {} = ?2 AND {to} IS NULL",
            quote_ident(table.name),
            quote_ident("surrogate_key"),
            to = quote_ident("valid_to"),
        );
        let changed = self
            .conn
            .execute(&sql, params![to_micros(&at), surrogate_key.to_string()])?;
        Ok(changed == 1)
    }

    fn contains(&self, table: &str, surrogate_key: SurrogateKey) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
            quote_ident(table),
            quote_ident("surrogate_key")
        );
        Ok(self
            .conn
            .query_row(&sql, params![surrogate_key.to_string()], |row| row.get(0))?)
    }

    fn commit(mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> StoreResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

fn select_list(table: &TableDef) -> String {
    ENVELOPE_FIELDS
        .iter()
        .copied()
        .chain(table.columns.iter().map(|c| c.name))
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind(params: &[SqlParam]) -> Vec<SqlValue> {
    params
        .iter()
        .map(|p| match p {
            SqlParam::Null => SqlValue::Null,
            SqlParam::Integer(i) => SqlValue::Integer(*i),
            SqlParam::Real(f) => SqlValue::Real(*f),
            SqlParam::Text(s) => SqlValue::Text(s.clone()),
        })
        .collect()
}

/// Map driver failures onto structured store errors using SQLite's extended
/// result codes.
fn classify(table: &TableDef, err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.code == ErrorCode::ConstraintViolation {
            match e.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return StoreError::UniqueViolation {
                        table: table.name.to_string(),
                        constraint: SURROGATE_CONSTRAINT,
                    }
                }
                ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    return StoreError::UniqueViolation {
                        table: table.name.to_string(),
                        constraint: VERSION_CONSTRAINT,
                    }
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return StoreError::ForeignKeyViolation {
                        table: table.name.to_string(),
                        column: table
                            .reference_columns()
                            .map(|c| c.name)
                            .collect::<Vec<_>>()
                            .join(","),
                    }
                }
                _ => {}
            }
        }
    }
    StoreError::Sqlite(err)
}

/// Values in [`select_list`] order. Assumes [`StoredRow::check_columns`]
/// has passed.
fn encode_row(table: &TableDef, row: &StoredRow) -> Vec<SqlValue> {
    let env = &row.envelope;
    let mut values = vec![
        SqlValue::Text(env.surrogate_key.to_string()),
        SqlValue::Text(env.business_key.to_string()),
        SqlValue::Integer(i64::from(env.version.get())),
        SqlValue::Integer(to_micros(&env.valid_from)),
        env.valid_to
            .map_or(SqlValue::Null, |t| SqlValue::Integer(to_micros(&t))),
    ];
    for column in table.columns {
        let value = row.payload.get(column.name).unwrap_or(&Value::Null);
        values.push(match column.kind {
            ColumnKind::Text | ColumnKind::Uuid => value
                .as_str()
                .map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string())),
            ColumnKind::Integer => value.as_i64().map_or(SqlValue::Null, SqlValue::Integer),
            ColumnKind::Real => value.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        });
    }
    values
}

fn decode_row(table: &TableDef, values: Vec<SqlValue>) -> StoreResult<StoredRow> {
    let mut values = values.into_iter();
    let mut next = || values.next().unwrap_or(SqlValue::Null);

    let surrogate_key: SurrogateKey = text(next())?.parse()?;
    let business_key = BusinessKey::new(text(next())?)?;
    let version = decode_version(integer(next())?)?;
    let valid_from = from_micros(integer(next())?)?;
    let valid_to = match next() {
        SqlValue::Null => None,
        other => Some(from_micros(integer(other)?)?),
    };

    let mut payload = Payload::new();
    for column in table.columns {
        let raw = next();
        let value = match (column.kind, raw) {
            (_, SqlValue::Null) => Value::Null,
            (ColumnKind::Text | ColumnKind::Uuid, SqlValue::Text(s)) => Value::String(s),
            (ColumnKind::Integer, SqlValue::Integer(i)) => Value::from(i),
            (ColumnKind::Real, SqlValue::Real(f)) => Value::from(f),
            (ColumnKind::Real, SqlValue::Integer(i)) => Value::from(i as f64),
            (kind, other) => {
                return Err(StoreError::BadColumn {
                    table: table.name.to_string(),
                    column: column.name.to_string(),
                    reason: format!("stored {other:?} is not {kind:?}"),
                })
            }
        };
        payload.insert(column.name.to_string(), value);
    }

    Ok(StoredRow::new(
        Envelope {
            surrogate_key,
            business_key,
            version,
            valid_from,
            valid_to,
        },
        payload,
    ))
}

fn text(value: SqlValue) -> Result<String, TypeError> {
    match value {
        SqlValue::Text(s) => Ok(s),
        other => Err(TypeError::Payload(format!("expected text, found {other:?}"))),
    }
}

fn integer(value: SqlValue) -> Result<i64, TypeError> {
    match value {
        SqlValue::Integer(i) => Ok(i),
        other => Err(TypeError::Payload(format!("expected integer, found {other:?}"))),
    }
}

fn decode_version(raw: i64) -> StoreResult<Version> {
    let raw = u32::try_from(raw).map_err(|_| TypeError::ZeroVersion)?;
    Ok(Version::new(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use scd_query::scope;
    use scd_types::Column;

    const JOB_COLUMNS: &[Column] = &[Column::text("title"), Column::real("rate")];
    const JOBS: TableDef = TableDef::new("jobs", JOB_COLUMNS);
    const LOG_COLUMNS: &[Column] = &[
        Column::integer("duration"),
        Column::reference("job_uid", "jobs"),
    ];
    const LOGS: TableDef = TableDef::new("timelogs", LOG_COLUMNS);

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::microseconds(secs * 1_000_001)
    }

    fn job(key: &str, version: u32, rate: f64) -> StoredRow {
        let mut env = Envelope::first(BusinessKey::new(key).unwrap(), t(version as i64));
        env.version = Version::new(version).unwrap();
        let mut payload = Payload::new();
        payload.insert("title".into(), Value::from("Engineer"));
        payload.insert("rate".into(), Value::from(rate));
        StoredRow::new(env, payload)
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.apply_schema(&[JOBS, LOGS]).unwrap();
        store
    }

    #[test]
    fn insert_and_select_round_trip() {
        let store = store();
        let row = job("job-1", 1, 50.0);
        let mut tx = store.begin().unwrap();
        tx.insert(&JOBS, &row).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let rows = tx.select(&JOBS, &Query::new()).unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let store = store();
        store.apply_schema(&[JOBS, LOGS]).unwrap();
    }

    #[test]
    fn unique_violation_is_classified() {
        let store = store();
        let mut tx = store.begin().unwrap();
        tx.insert(&JOBS, &job("job-1", 1, 50.0)).unwrap();
        let err = tx.insert(&JOBS, &job("job-1", 1, 60.0)).unwrap_err();
        assert!(err.is_version_conflict(), "{err}");

        let dup = job("job-2", 1, 50.0);
        tx.insert(&JOBS, &dup).unwrap();
        let mut again = job("job-3", 1, 50.0);
        again.envelope.surrogate_key = dup.envelope.surrogate_key;
        let err = tx.insert(&JOBS, &again).unwrap_err();
        assert!(err.is_unique_violation() && !err.is_version_conflict(), "{err}");
    }

    #[test]
    fn foreign_key_is_enforced() {
        let store = store();
        let mut payload = Payload::new();
        payload.insert("duration".into(), Value::from(3600));
        payload.insert(
            "job_uid".into(),
            Value::from(SurrogateKey::generate().to_string()),
        );
        let log = StoredRow::new(Envelope::first(BusinessKey::new("tl-1").unwrap(), t(0)), payload);
        let mut tx = store.begin().unwrap();
        let err = tx.insert(&LOGS, &log).unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }), "{err}");
    }

    #[test]
    fn close_if_open_is_conditional() {
        let store = store();
        let row = job("job-1", 1, 50.0);
        let mut tx = store.begin().unwrap();
        tx.insert(&JOBS, &row).unwrap();
        assert!(tx.close_if_open(&JOBS, row.envelope.surrogate_key, t(5)).unwrap());
        assert!(!tx.close_if_open(&JOBS, row.envelope.surrogate_key, t(6)).unwrap());
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let rows = tx.select(&JOBS, &Query::new().with(scope::historical())).unwrap();
        assert_eq!(rows[0].envelope.valid_to, Some(t(5)));
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = store();
        {
            let mut tx = store.begin().unwrap();
            tx.insert(&JOBS, &job("job-1", 1, 50.0)).unwrap();
        }
        let tx = store.begin().unwrap();
        assert_eq!(tx.count(&JOBS, &Query::new()).unwrap(), 0);
    }

    #[test]
    fn scopes_render_against_sqlite() {
        let store = store();
        let mut tx = store.begin().unwrap();
        let v1 = job("job-1", 1, 50.0);
        let v2 = job("job-1", 2, 60.0);
        tx.insert(&JOBS, &v1).unwrap();
        tx.insert(&JOBS, &v2).unwrap();
        tx.close_if_open(&JOBS, v1.envelope.surrogate_key, t(2)).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let key = BusinessKey::new("job-1").unwrap();
        assert_eq!(tx.max_version(&JOBS, &key).unwrap(), Version::new(2).ok());
        let latest = tx
            .select(&JOBS, &Query::new().scoped([scope::by_business_key(key.clone()), scope::latest()]))
            .unwrap();
        assert_eq!(latest[0].payload["rate"], 60.0);
        let as_of = tx
            .select(&JOBS, &Query::new().scoped([scope::by_business_key(key), scope::as_of(t(1))]))
            .unwrap();
        assert_eq!(as_of[0].envelope.version.get(), 1);
        let desc = tx
            .select(&JOBS, &Query::new().scoped([scope::order_by_version(true), scope::limit(1)]))
            .unwrap();
        assert_eq!(desc.len(), 1);
        assert_eq!(desc[0].envelope.version.get(), 2);
        assert!(tx.contains("jobs", v2.envelope.surrogate_key).unwrap());
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scd.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.apply_schema(&[JOBS]).unwrap();
            let mut tx = store.begin().unwrap();
            tx.insert(&JOBS, &job("job-1", 1, 50.0)).unwrap();
            tx.commit().unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let tx = store.begin().unwrap();
        assert_eq!(tx.count(&JOBS, &Query::new()).unwrap(), 1);
    }
}
