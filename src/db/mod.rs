//! Persistence port consumed by the importer.
//!
//! The import pipeline never talks to a database directly; it drives a
//! [`Store`], which offers exactly the capabilities the loaders need:
//! destructive table creation, bulk batches, single-row inserts,
//! transactions with nested savepoints, and raw statements.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: an in-memory fake with primary-key and unique-index
//!   enforcement, used for deterministic tests
//! - [`SqliteStore`]: an embedded SQLite database (strict tables)

use std::fmt;

use tracing::warn;

use crate::schema::TableSchema;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A single cell handed to the store.
///
/// Census values arrive as text; the store coerces them into the declared
/// column type. `Int` is only produced for the `.` sentinel and for values
/// the store itself coerced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One positional row, in the destination table's column order.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Primary key or unique index violation.
    DuplicateKey,
    /// Any other constraint: not-null, type mismatch.
    Constraint,
    MissingTable,
    /// Row width does not match the table.
    Arity,
    /// Unbalanced begin/commit/savepoint calls.
    Transaction,
    Backend,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub table: Option<String>,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            table: None,
            message: message.into(),
        }
    }

    pub fn on_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.kind == StoreErrorKind::DuplicateKey
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Capability set the importer needs from a relational database.
pub trait Store {
    /// Drop `schema.name` if it exists, then create it with its primary key
    /// and indexes.
    fn create_or_replace_table(&mut self, schema: &TableSchema) -> StoreResult<()>;

    fn drop_table(&mut self, name: &str) -> StoreResult<()>;

    /// Load `rows` as one atomic batch. Either every row lands or none do.
    fn bulk_load(&mut self, table: &str, rows: &[Row]) -> StoreResult<usize>;

    fn insert(&mut self, table: &str, row: &[Value]) -> StoreResult<()>;

    /// Execute a statement that returns no rows.
    fn run_query(&mut self, sql: &str) -> StoreResult<()>;

    fn begin(&mut self) -> StoreResult<()>;
    fn commit(&mut self) -> StoreResult<()>;
    fn rollback(&mut self) -> StoreResult<()>;

    fn open_savepoint(&mut self) -> StoreResult<()>;
    fn release_savepoint(&mut self) -> StoreResult<()>;
    /// Roll back to the innermost savepoint and discard it.
    fn rollback_savepoint(&mut self) -> StoreResult<()>;

    /// Run `f` inside a transaction; commit on `Ok`, roll back on `Err`.
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = self.rollback() {
                    warn!(error = %rb, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Run `f` inside a nested savepoint; on `Err` only the work done by `f`
    /// is undone and the enclosing transaction stays usable.
    fn savepoint<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.open_savepoint()?;
        match f(self) {
            Ok(value) => {
                self.release_savepoint()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = self.rollback_savepoint() {
                    warn!(error = %rb, "savepoint rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Double-quote an identifier. Census column ids contain dots (`B01001.0001`).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("B01001.0001"), "\"B01001.0001\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from("ca"), Value::Text("ca".into()));
        assert_eq!(Value::from(Some(-2_i64)), Value::Int(-2));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::Text(" 42".into()).as_int(), Some(42));
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
