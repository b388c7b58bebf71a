// src/schema/types.rs

/// Physical column type of a destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Character data with a declared maximum width.
    Varchar(u16),
    /// Unbounded character data (titles).
    Text,
    Integer,
    Double,
    /// Exact or fractional number (lookup line numbers such as `0.5`).
    Numeric,
}

/// A single column definition of a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Full structure of a destination table: columns in load order, primary
/// key, secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn index(mut self, column: &str, unique: bool) -> Self {
        self.indexes.push(IndexSchema {
            name: format!("{}_{}_idx", self.name, column),
            columns: vec![column.to_string()],
            unique,
        });
        self
    }

    /// Position of `name` in the load order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Same structure under another name (indexes are renamed along).
    pub fn renamed(&self, name: &str) -> Self {
        let mut out = self.clone();
        out.indexes = self
            .indexes
            .iter()
            .map(|idx| IndexSchema {
                name: idx.name.replacen(&self.name, name, 1),
                ..idx.clone()
            })
            .collect();
        out.name = name.to_string();
        out
    }
}
