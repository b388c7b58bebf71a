//! Census table metadata from the sequence/table lookup file.
//!
//! Every lookup row is one of three things: a table header (start position
//! and cell count within a sequence), a column detail (a line number), or a
//! universe description. [`LookupMetadataStore`] classifies the rows once and
//! answers the questions the loaders ask: which column range a table occupies
//! in a given sequence file, and which physical columns a table has.

pub mod persist;
pub mod store;
pub mod types;

pub use persist::{COLUMN_LOOKUP_TABLE, LOOKUP_TABLE};
pub use store::{LookupMetadataStore, TableHeader};
pub use types::{
    ColumnDefinition, LineNumber, LookupRole, LookupRow, SequenceFilter, TableDefinition,
    TableFilter, TableRange,
};
