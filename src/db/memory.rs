//! In-memory [`Store`] for tests.
//!
//! Enforces what the loaders depend on: primary keys, unique indexes,
//! not-null columns, integer/double coercion, atomic bulk batches and
//! snapshot-based transactions with nested savepoints. Every transaction and
//! savepoint clones all tables, so it is only meant for small fixtures. Raw
//! statements are only recorded, never interpreted.

use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use super::{Row, Store, StoreError, StoreErrorKind, StoreResult, Value};
use crate::schema::{ColumnType, TableSchema};

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Row>,
    /// One key set per constraint: primary key first, then unique indexes.
    constraints: Vec<(Vec<usize>, HashSet<Vec<Value>>)>,
}

impl MemTable {
    fn new(schema: &TableSchema) -> StoreResult<Self> {
        let resolve = |cols: &[String]| -> StoreResult<Vec<usize>> {
            cols.iter()
                .map(|c| {
                    schema.position(c).ok_or_else(|| {
                        StoreError::new(
                            StoreErrorKind::Backend,
                            format!("constraint column `{}` not in table", c),
                        )
                        .on_table(&schema.name)
                    })
                })
                .collect()
        };

        let mut constraints = Vec::new();
        if !schema.primary_key.is_empty() {
            constraints.push((resolve(&schema.primary_key)?, HashSet::new()));
        }
        for idx in schema.indexes.iter().filter(|i| i.unique) {
            constraints.push((resolve(&idx.columns)?, HashSet::new()));
        }

        Ok(Self {
            schema: schema.clone(),
            rows: Vec::new(),
            constraints,
        })
    }

    fn coerce(&self, row: &[Value]) -> StoreResult<Row> {
        let table = &self.schema.name;
        if row.len() != self.schema.width() {
            return Err(StoreError::new(
                StoreErrorKind::Arity,
                format!(
                    "table has {} columns but {} values were supplied",
                    self.schema.width(),
                    row.len()
                ),
            )
            .on_table(table));
        }

        let mut out = Vec::with_capacity(row.len());
        for (col, value) in self.schema.columns.iter().zip(row) {
            let value = match (col.ty, value) {
                (_, Value::Null) if !col.nullable => {
                    return Err(StoreError::new(
                        StoreErrorKind::Constraint,
                        format!("null value in column `{}`", col.name),
                    )
                    .on_table(table));
                }
                (ColumnType::Integer, Value::Text(s)) => {
                    let parsed = s.trim().parse::<i64>().map_err(|_| {
                        StoreError::new(
                            StoreErrorKind::Constraint,
                            format!("invalid integer `{}` for column `{}`", s, col.name),
                        )
                        .on_table(table)
                    })?;
                    Value::Int(parsed)
                }
                (ColumnType::Double | ColumnType::Numeric, Value::Text(s))
                    if s.trim().parse::<f64>().is_err() =>
                {
                    return Err(StoreError::new(
                        StoreErrorKind::Constraint,
                        format!("invalid number `{}` for column `{}`", s, col.name),
                    )
                    .on_table(table));
                }
                (_, v) => v.clone(),
            };
            out.push(value);
        }
        Ok(out)
    }

    fn push(&mut self, row: &[Value]) -> StoreResult<()> {
        let row = self.coerce(row)?;

        let mut keys = Vec::with_capacity(self.constraints.len());
        for (positions, seen) in &self.constraints {
            let key: Vec<Value> = positions.iter().map(|&i| row[i].clone()).collect();
            // NULLs never collide in a unique index
            let has_null = key.iter().any(Value::is_null);
            if !has_null && seen.contains(&key) {
                return Err(StoreError::new(
                    StoreErrorKind::DuplicateKey,
                    format!("duplicate key value {:?}", key),
                )
                .on_table(&self.schema.name));
            }
            keys.push((key, has_null));
        }

        for ((_, seen), (key, has_null)) in self.constraints.iter_mut().zip(keys) {
            if !has_null {
                seen.insert(key);
            }
        }
        self.rows.push(row);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Transaction,
    Savepoint,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemTable>,
    frames: Vec<(Frame, BTreeMap<String, MemTable>)>,
    queries: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of `table` in insertion order, as stored (after coercion).
    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(|t| t.rows.as_slice())
    }

    pub fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table).map(|t| &t.schema)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Statements passed to [`Store::run_query`], in order.
    pub fn executed_queries(&self) -> &[String] {
        &self.queries
    }

    pub fn in_transaction(&self) -> bool {
        !self.frames.is_empty()
    }

    fn table_mut(&mut self, table: &str) -> StoreResult<&mut MemTable> {
        self.tables.get_mut(table).ok_or_else(|| {
            StoreError::new(StoreErrorKind::MissingTable, "no such table").on_table(table)
        })
    }

    fn pop_frame(&mut self, expected: Frame) -> StoreResult<BTreeMap<String, MemTable>> {
        let found = match self.frames.pop() {
            Some((frame, snapshot)) if frame == expected => return Ok(snapshot),
            Some(frame) => {
                let kind = frame.0;
                self.frames.push(frame);
                Some(kind)
            }
            None => None,
        };
        Err(StoreError::new(
            StoreErrorKind::Transaction,
            format!("expected open {:?}, found {:?}", expected, found),
        ))
    }
}

impl Store for MemoryStore {
    fn create_or_replace_table(&mut self, schema: &TableSchema) -> StoreResult<()> {
        let table = MemTable::new(schema)?;
        trace!(table = %schema.name, columns = schema.width(), "create table");
        self.tables.insert(schema.name.clone(), table);
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> StoreResult<()> {
        self.tables.remove(name);
        Ok(())
    }

    fn bulk_load(&mut self, table: &str, rows: &[Row]) -> StoreResult<usize> {
        let mut staged = self.table_mut(table)?.clone();
        for row in rows {
            staged.push(row)?;
        }
        self.tables.insert(table.to_string(), staged);
        Ok(rows.len())
    }

    fn insert(&mut self, table: &str, row: &[Value]) -> StoreResult<()> {
        self.table_mut(table)?.push(row)
    }

    fn run_query(&mut self, sql: &str) -> StoreResult<()> {
        self.queries.push(sql.to_string());
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<()> {
        if self.frames.iter().any(|(f, _)| *f == Frame::Transaction) {
            return Err(StoreError::new(
                StoreErrorKind::Transaction,
                "transaction already open",
            ));
        }
        self.frames.push((Frame::Transaction, self.tables.clone()));
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.pop_frame(Frame::Transaction).map(|_| ())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.tables = self.pop_frame(Frame::Transaction)?;
        Ok(())
    }

    fn open_savepoint(&mut self) -> StoreResult<()> {
        self.frames.push((Frame::Savepoint, self.tables.clone()));
        Ok(())
    }

    fn release_savepoint(&mut self) -> StoreResult<()> {
        self.pop_frame(Frame::Savepoint).map(|_| ())
    }

    fn rollback_savepoint(&mut self) -> StoreResult<()> {
        self.tables = self.pop_frame(Frame::Savepoint)?;
        Ok(())
    }
}
