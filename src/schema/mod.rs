pub mod derive;
pub mod types;

pub use derive::{
    derive_table_schema, identifier_columns, is_decimal_table, SchemaDeriver, DECIMAL_TABLES,
    IDENTIFIER_COLUMNS,
};
pub use types::{ColumnSchema, ColumnType, IndexSchema, TableSchema};
