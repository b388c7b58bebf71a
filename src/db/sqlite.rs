//! Embedded SQLite backend.
//!
//! Tables are created `STRICT` so that a value that cannot be stored in its
//! declared type fails the insert instead of being kept as text.

use std::path::{Path, PathBuf};

use rusqlite::{
    ffi,
    types::{ToSql, ToSqlOutput, ValueRef},
    Connection, ErrorCode,
};
use tracing::{debug, trace};

use super::{quote_ident, Row, Store, StoreError, StoreErrorKind, StoreResult, Value};
use crate::schema::{ColumnType, TableSchema};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Int(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

pub struct SqliteStore {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    conn: Connection,
    savepoints: usize,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| {
            StoreError::new(
                StoreErrorKind::Backend,
                format!("failed to open {}: {}", path.display(), e),
            )
        })?;
        Ok(Self {
            db_path: Some(path),
            conn,
            savepoints: 0,
        })
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::new(
                StoreErrorKind::Backend,
                format!("failed to create in-memory database: {}", e),
            )
        })?;
        Ok(Self {
            db_path: None,
            conn,
            savepoints: 0,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Direct access for read-side queries (reports, tests).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn batch(&self, sql: &str) -> StoreResult<()> {
        trace!(sql, "execute batch");
        self.conn.execute_batch(sql).map_err(|e| map_err(None, e))
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> StoreResult<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let sql = insert_sql(table, first.len());
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| map_err(Some(table), e))?;
        for row in rows {
            stmt.execute(rusqlite::params_from_iter(row.iter()))
                .map_err(|e| map_err(Some(table), e))?;
        }
        Ok(())
    }
}

fn map_err(table: Option<&str>, err: rusqlite::Error) -> StoreError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            match f.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    StoreErrorKind::DuplicateKey
                }
                _ => StoreErrorKind::Constraint,
            }
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.starts_with("no such table") => {
            StoreErrorKind::MissingTable
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("values were supplied") => {
            StoreErrorKind::Arity
        }
        rusqlite::Error::InvalidParameterCount(_, _) => StoreErrorKind::Arity,
        _ => StoreErrorKind::Backend,
    };
    let out = StoreError::new(kind, err.to_string());
    match table {
        Some(t) => out.on_table(t),
        None => out,
    }
}

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Varchar(_) | ColumnType::Text => "TEXT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Double | ColumnType::Numeric => "REAL",
    }
}

/// DDL for `schema`: drop, create (strict), then indexes.
pub fn create_table_sql(schema: &TableSchema) -> String {
    let table = quote_ident(&schema.name);
    let mut defs: Vec<String> = schema
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(&c.name), sql_type(c.ty));
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if let ColumnType::Varchar(n) = c.ty {
                def.push_str(&format!(
                    " CHECK (length({}) <= {})",
                    quote_ident(&c.name),
                    n
                ));
            }
            def
        })
        .collect();
    if !schema.primary_key.is_empty() {
        let pk: Vec<String> = schema.primary_key.iter().map(|c| quote_ident(c)).collect();
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    let mut sql = format!(
        "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} (\n    {}\n) STRICT;\n",
        defs.join(",\n    ")
    );
    for idx in &schema.indexes {
        let cols: Vec<String> = idx.columns.iter().map(|c| quote_ident(c)).collect();
        sql.push_str(&format!(
            "CREATE {}INDEX {} ON {table} ({});\n",
            if idx.unique { "UNIQUE " } else { "" },
            quote_ident(&idx.name),
            cols.join(", ")
        ));
    }
    sql
}

fn insert_sql(table: &str, width: usize) -> String {
    let params: Vec<String> = (1..=width).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(table),
        params.join(", ")
    )
}

impl Store for SqliteStore {
    fn create_or_replace_table(&mut self, schema: &TableSchema) -> StoreResult<()> {
        debug!(table = %schema.name, columns = schema.width(), "create or replace table");
        self.batch(&create_table_sql(schema))
            .map_err(|e| e.on_table(&schema.name))
    }

    fn drop_table(&mut self, name: &str) -> StoreResult<()> {
        self.batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(name)))
    }

    fn bulk_load(&mut self, table: &str, rows: &[Row]) -> StoreResult<usize> {
        self.batch("SAVEPOINT bulk_load;")?;
        match self.insert_rows(table, rows) {
            Ok(()) => {
                self.batch("RELEASE bulk_load;")?;
                Ok(rows.len())
            }
            Err(err) => {
                self.batch("ROLLBACK TO bulk_load; RELEASE bulk_load;")?;
                Err(err)
            }
        }
    }

    fn insert(&mut self, table: &str, row: &[Value]) -> StoreResult<()> {
        let sql = insert_sql(table, row.len());
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| map_err(Some(table), e))?;
        stmt.execute(rusqlite::params_from_iter(row.iter()))
            .map(|_| ())
            .map_err(|e| map_err(Some(table), e))
    }

    fn run_query(&mut self, sql: &str) -> StoreResult<()> {
        self.batch(sql)
    }

    fn begin(&mut self) -> StoreResult<()> {
        if !self.conn.is_autocommit() {
            return Err(StoreError::new(
                StoreErrorKind::Transaction,
                "transaction already open",
            ));
        }
        self.batch("BEGIN;")
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.batch("COMMIT;")
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.savepoints = 0;
        self.batch("ROLLBACK;")
    }

    fn open_savepoint(&mut self) -> StoreResult<()> {
        self.savepoints += 1;
        self.batch(&format!("SAVEPOINT sp_{};", self.savepoints))
    }

    fn release_savepoint(&mut self) -> StoreResult<()> {
        if self.savepoints == 0 {
            return Err(StoreError::new(StoreErrorKind::Transaction, "no open savepoint"));
        }
        let name = format!("sp_{}", self.savepoints);
        self.savepoints -= 1;
        self.batch(&format!("RELEASE {};", name))
    }

    fn rollback_savepoint(&mut self) -> StoreResult<()> {
        if self.savepoints == 0 {
            return Err(StoreError::new(StoreErrorKind::Transaction, "no open savepoint"));
        }
        let name = format!("sp_{}", self.savepoints);
        self.savepoints -= 1;
        self.batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
    }
}
