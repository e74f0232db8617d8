//! SQLite cache store for persistent storage.
//!
//! The file is self-describing: a `columns` table records the semantic
//! type of every derived column and the id of the build that computed
//! it (NULL for columns nobody has built), and the `cache` table holds one row per
//! photo with a SQL column per derived column. Unset values are NULL.
//!
//! Saving writes a complete new database next to the target and renames
//! it into place, so a crash mid-write leaves the previous snapshot
//! intact.

use super::{CacheKey, CacheRow, CacheStore, CacheTable, ColumnType, Value};
use crate::error::CacheError;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;

const META_TABLE: &str = "columns";
const DATA_TABLE: &str = "cache";

/// SQLite-backed persistent store
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create a store for the database at `path` (the file may not exist yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
        }
    }

    fn corrupted(&self, reason: impl ToString) -> CacheError {
        CacheError::Corrupted {
            path: self.db_path.clone(),
            reason: reason.to_string(),
        }
    }

    fn persist_failed(&self, source: std::io::Error) -> CacheError {
        CacheError::PersistFailed {
            path: self.db_path.clone(),
            source,
        }
    }

    /// Read the declared schema and build ids, and check the data table
    /// really has every declared column
    fn read_schema(&self, conn: &Connection) -> Result<DeclaredColumns, CacheError> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT name, kind, build FROM {} ORDER BY name",
                META_TABLE
            ))
            .map_err(|e| self.corrupted(e))?;
        let declared = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|e| self.corrupted(e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.corrupted(e))?;

        let mut schema = BTreeMap::new();
        let mut builds = BTreeMap::new();
        for (name, kind, build) in declared {
            let column_type = ColumnType::parse(&kind)
                .ok_or_else(|| self.corrupted(format!("unknown type '{}' for '{}'", kind, name)))?;
            if let Some(build) = build {
                builds.insert(name.clone(), build);
            }
            schema.insert(name, column_type);
        }

        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", DATA_TABLE))
            .map_err(|e| self.corrupted(e))?;
        let present: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| self.corrupted(e))?
            .collect::<Result<_, _>>()
            .map_err(|e| self.corrupted(e))?;

        let required = [super::PATH_COLUMN, super::CHECKED_TIME_COLUMN];
        for column in required.iter().copied().chain(schema.keys().map(String::as_str)) {
            if !present.contains(column) {
                return Err(self.corrupted(format!("missing column '{}'", column)));
            }
        }

        Ok((schema, builds))
    }
}

type DeclaredColumns = (BTreeMap<String, ColumnType>, BTreeMap<String, String>);

impl CacheStore for SqliteStore {
    fn load(&self) -> Result<Option<CacheTable>, CacheError> {
        if !self.db_path.exists() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(&self.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| CacheError::OpenFailed {
                path: self.db_path.clone(),
                reason: e.to_string(),
            })?;

        let (schema, builds) = self.read_schema(&conn)?;
        let columns: Vec<(&String, &ColumnType)> = schema.iter().collect();

        let select = format!(
            "SELECT {}, {}{} FROM {}",
            super::PATH_COLUMN,
            super::CHECKED_TIME_COLUMN,
            columns
                .iter()
                .map(|(name, _)| format!(", {}", quote_ident(name)))
                .collect::<String>(),
            DATA_TABLE
        );

        let mut stmt = conn.prepare(&select).map_err(|e| self.corrupted(e))?;
        let mut rows = stmt.query([]).map_err(|e| self.corrupted(e))?;
        let mut table_rows = BTreeMap::new();

        // Rows are streamed one at a time rather than collected by SQLite
        while let Some(row) = rows.next().map_err(|e| self.corrupted(e))? {
            let key: String = row.get(0).map_err(|e| self.corrupted(e))?;
            let checked: i64 = row.get(1).map_err(|e| self.corrupted(e))?;
            let mut cache_row = CacheRow::new(from_nanos(checked));

            for (offset, (name, column_type)) in columns.iter().enumerate() {
                let raw = row.get_ref(offset + 2).map_err(|e| self.corrupted(e))?;
                let decoded = decode(**column_type, raw)
                    .map_err(|reason| self.corrupted(format!("{} in '{}' for {}", reason, name, key)))?;
                if let Some(value) = decoded {
                    cache_row.set(name.as_str(), value);
                }
            }

            table_rows.insert(CacheKey::new(key), cache_row);
        }

        tracing::debug!(
            path = %self.db_path.display(),
            rows = table_rows.len(),
            columns = schema.len(),
            "Loaded cache"
        );

        Ok(Some(CacheTable {
            schema,
            builds,
            rows: table_rows,
        }))
    }

    fn save(&self, table: &CacheTable) -> Result<(), CacheError> {
        let dir = match self.db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.persist_failed(e))?;

        let temp = tempfile::Builder::new()
            .prefix(".photo-sieve-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| self.persist_failed(e))?
            .into_temp_path();

        {
            let mut conn = Connection::open(&temp).map_err(|e| CacheError::OpenFailed {
                path: temp.to_path_buf(),
                reason: e.to_string(),
            })?;
            write_table(&mut conn, table)?;
            conn.close()
                .map_err(|(_, e)| CacheError::QueryFailed(e.to_string()))?;
        }

        temp.persist(&self.db_path)
            .map_err(|e| self.persist_failed(e.error))?;

        tracing::debug!(
            path = %self.db_path.display(),
            rows = table.rows.len(),
            "Saved cache"
        );
        Ok(())
    }

    fn disk_size(&self) -> u64 {
        fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0)
    }
}

fn write_table(conn: &mut Connection, table: &CacheTable) -> Result<(), CacheError> {
    let query_failed = |e: rusqlite::Error| CacheError::QueryFailed(e.to_string());

    conn.execute_batch("PRAGMA journal_mode=OFF;")
        .map_err(query_failed)?;

    conn.execute(
        &format!(
            "CREATE TABLE {} (name TEXT PRIMARY KEY, kind TEXT NOT NULL, build TEXT)",
            META_TABLE
        ),
        [],
    )
    .map_err(query_failed)?;

    let column_defs: String = table
        .schema
        .iter()
        .map(|(name, column_type)| format!(", {} {}", quote_ident(name), sql_type(*column_type)))
        .collect();
    conn.execute(
        &format!(
            "CREATE TABLE {} ({} TEXT PRIMARY KEY, {} INTEGER NOT NULL{})",
            DATA_TABLE,
            super::PATH_COLUMN,
            super::CHECKED_TIME_COLUMN,
            column_defs
        ),
        [],
    )
    .map_err(query_failed)?;

    let tx = conn.transaction().map_err(query_failed)?;
    {
        let mut meta = tx
            .prepare(&format!(
                "INSERT INTO {} (name, kind, build) VALUES (?, ?, ?)",
                META_TABLE
            ))
            .map_err(query_failed)?;
        for (name, column_type) in &table.schema {
            meta.execute(params![name, column_type.as_str(), table.builds.get(name)])
                .map_err(query_failed)?;
        }

        let placeholders = vec!["?"; table.schema.len() + 2].join(", ");
        let mut insert = tx
            .prepare(&format!("INSERT INTO {} VALUES ({})", DATA_TABLE, placeholders))
            .map_err(query_failed)?;

        for (key, row) in &table.rows {
            let checked = row
                .checked_time()
                .ok_or_else(|| CacheError::SerializationFailed(format!("{} has no checked_time", key)))?;

            let mut values = Vec::with_capacity(table.schema.len() + 2);
            values.push(SqlValue::Text(key.as_str().to_string()));
            values.push(SqlValue::Integer(to_nanos(checked)?));
            for name in table.schema.keys() {
                values.push(match row.get(name) {
                    Some(value) => encode(value)?,
                    None => SqlValue::Null,
                });
            }

            insert
                .execute(params_from_iter(values.iter()))
                .map_err(query_failed)?;
        }
    }
    tx.commit().map_err(query_failed)?;

    Ok(())
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer | ColumnType::Timestamp => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text | ColumnType::IntPair => "TEXT",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_nanos(time: DateTime<Utc>) -> Result<i64, CacheError> {
    time.timestamp_nanos_opt().ok_or_else(|| {
        CacheError::SerializationFailed(format!("timestamp {} out of range", time))
    })
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

fn encode(value: &Value) -> Result<SqlValue, CacheError> {
    Ok(match value {
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Timestamp(v) => SqlValue::Integer(to_nanos(*v)?),
        Value::IntPair(a, b) => SqlValue::Text(
            serde_json::to_string(&(a, b))
                .map_err(|e| CacheError::SerializationFailed(e.to_string()))?,
        ),
    })
}

fn decode(column_type: ColumnType, raw: ValueRef<'_>) -> Result<Option<Value>, String> {
    let value = match (column_type, raw) {
        (_, ValueRef::Null) => return Ok(None),
        (ColumnType::Integer, ValueRef::Integer(v)) => Value::Integer(v),
        (ColumnType::Float, ValueRef::Real(v)) => Value::Float(v),
        (ColumnType::Float, ValueRef::Integer(v)) => Value::Float(v as f64),
        (ColumnType::Text, ValueRef::Text(bytes)) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| e.to_string())?
                .to_string(),
        ),
        (ColumnType::Timestamp, ValueRef::Integer(v)) => Value::Timestamp(from_nanos(v)),
        (ColumnType::IntPair, ValueRef::Text(bytes)) => {
            let (a, b): (i64, i64) = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
            Value::IntPair(a, b)
        }
        (expected, other) => {
            return Err(format!(
                "expected {} but found {:?}",
                expected,
                other.data_type()
            ))
        }
    };
    Ok(Some(value))
}
