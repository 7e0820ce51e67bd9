use super::{ExecutionOutcome, ExecutorFailure, StatementExecutor};
use crate::mutation::{SqlValue, StatementKind, StatementPlan};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{ffi, params_from_iter, Connection};
use serde_json::{Map, Value};
use std::path::PathBuf;

// Not exported by every libsqlite3-sys release.
const SQLITE_CONSTRAINT_DATATYPE: i32 = 3091;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::from(rusqlite::types::Null),
            SqlValue::Text(value) => ToSqlOutput::from(value.as_str()),
            SqlValue::Integer(value) => ToSqlOutput::from(*value),
            SqlValue::Decimal(value) => ToSqlOutput::from(*value),
            SqlValue::Boolean(value) => ToSqlOutput::from(i64::from(*value)),
            SqlValue::Date(_) | SqlValue::DateTime(_) => ToSqlOutput::from(self.to_string()),
        })
    }
}

/// Opens a connection per statement; the database file is the only shared
/// state.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    db_path: PathBuf,
}

impl SqliteExecutor {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn connect(&self) -> Result<Connection, ExecutorFailure> {
        let conn = Connection::open(&self.db_path).map_err(failure_from_sqlite)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(failure_from_sqlite)?;
        Ok(conn)
    }
}

impl StatementExecutor for SqliteExecutor {
    fn execute(&self, plan: &StatementPlan) -> Result<ExecutionOutcome, ExecutorFailure> {
        let conn = self.connect()?;
        let sql = plan.sql();
        let params = plan.parameters();
        let mut stmt = conn.prepare(&sql).map_err(failure_from_sqlite)?;

        if plan.kind() != StatementKind::Select {
            let rows_affected = stmt
                .execute(params_from_iter(params))
                .map_err(failure_from_sqlite)?;
            let last_insert_id =
                (plan.kind() == StatementKind::Insert).then(|| conn.last_insert_rowid());
            return Ok(ExecutionOutcome {
                rows: Vec::new(),
                rows_affected,
                last_insert_id,
            });
        }

        let names = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = stmt
            .query(params_from_iter(params))
            .map_err(failure_from_sqlite)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(failure_from_sqlite)? {
            let mut record = Map::new();
            for (index, name) in names.iter().enumerate() {
                let value = row.get_ref(index).map_err(failure_from_sqlite)?;
                record.insert(name.clone(), json_from_sqlite(value));
            }
            out.push(record);
        }
        Ok(ExecutionOutcome {
            rows_affected: out.len(),
            rows: out,
            last_insert_id: None,
        })
    }
}

fn json_from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::from(value),
        ValueRef::Real(value) => serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

pub(crate) fn failure_from_sqlite(err: rusqlite::Error) -> ExecutorFailure {
    match &err {
        rusqlite::Error::SqliteFailure(inner, message) => {
            let detail = message.clone().unwrap_or_else(|| err.to_string());
            ExecutorFailure::new(extended_code_name(inner.extended_code), detail)
        }
        _ => ExecutorFailure::new(None, err.to_string()),
    }
}

fn extended_code_name(code: i32) -> Option<&'static str> {
    Some(match code {
        ffi::SQLITE_CONSTRAINT_NOTNULL => "SQLITE_CONSTRAINT_NOTNULL",
        ffi::SQLITE_CONSTRAINT_CHECK => "SQLITE_CONSTRAINT_CHECK",
        ffi::SQLITE_CONSTRAINT_UNIQUE => "SQLITE_CONSTRAINT_UNIQUE",
        ffi::SQLITE_CONSTRAINT_PRIMARYKEY => "SQLITE_CONSTRAINT_PRIMARYKEY",
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => "SQLITE_CONSTRAINT_FOREIGNKEY",
        SQLITE_CONSTRAINT_DATATYPE => "SQLITE_CONSTRAINT_DATATYPE",
        ffi::SQLITE_MISMATCH => "SQLITE_MISMATCH",
        ffi::SQLITE_CONSTRAINT => "SQLITE_CONSTRAINT",
        _ => return None,
    })
}
