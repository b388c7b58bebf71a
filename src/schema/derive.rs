use tracing::{debug, info};

use super::{ColumnSchema, ColumnType, TableSchema};
use crate::{
    db::Store,
    decode::FileKind,
    error::{ImportError, ImportResult},
    lookup::{LookupMetadataStore, TableDefinition, TableFilter},
};

/// Leading fields of every sequence row, in file order.
pub const IDENTIFIER_COLUMNS: [&str; 6] =
    ["fileid", "filetype", "stusab", "chariter", "seq", "logrecno"];

/// Tables whose values are fractional (medians, ratios, indexes).
pub const DECIMAL_TABLES: &[&str] = &[
    "B01002", "B01002A", "B01002B", "B01002C", "B01002D", "B01002E", "B01002F", "B01002G",
    "B01002H", "B01002I", "B05004", "B06002", "B07002", "B07402", "B08103", "B08503", "B12007",
    "B19082", "B19083", "B23013", "B23020", "B25010", "B25018", "B25021", "B25071", "B25092",
    "B98011", "B98012", "B98021", "B98022", "B98031", "B98032",
];

pub fn is_decimal_table(table_id: &str) -> bool {
    DECIMAL_TABLES.contains(&table_id)
}

pub fn identifier_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("fileid", ColumnType::Varchar(6)),
        ColumnSchema::new("filetype", ColumnType::Varchar(6)),
        ColumnSchema::new("stusab", ColumnType::Varchar(2)).not_null(),
        ColumnSchema::new("chariter", ColumnType::Varchar(3)),
        ColumnSchema::new("seq", ColumnType::Varchar(4)),
        ColumnSchema::new("logrecno", ColumnType::Integer).not_null(),
    ]
}

/// Destination table for `def`: identifier columns, then one numeric column
/// per definition column, keyed by (stusab, logrecno).
pub fn derive_table_schema(def: &TableDefinition, kind: FileKind) -> TableSchema {
    let ty = if is_decimal_table(&def.table_id) {
        ColumnType::Double
    } else {
        ColumnType::Integer
    };

    let mut schema = TableSchema::new(kind.table_name(&def.table_id));
    for col in identifier_columns() {
        schema = schema.column(col);
    }
    for col in &def.columns {
        schema = schema.column(ColumnSchema::new(col.id.clone(), ty));
    }
    schema.primary_key(["stusab", "logrecno"])
}

/// Builds destination tables from lookup metadata.
pub struct SchemaDeriver<'a> {
    lookup: &'a LookupMetadataStore,
    filter: TableFilter,
}

impl<'a> SchemaDeriver<'a> {
    pub fn new(lookup: &'a LookupMetadataStore, filter: TableFilter) -> Self {
        Self { lookup, filter }
    }

    pub fn derive(&self, kind: FileKind) -> Vec<TableSchema> {
        self.lookup
            .tables(&self.filter)
            .iter()
            .map(|def| derive_table_schema(def, kind))
            .collect()
    }

    /// Drop and recreate every table of `kind`. Existing rows are lost.
    pub fn create_tables<S: Store>(&self, store: &mut S, kind: FileKind) -> ImportResult<usize> {
        let schemas = self.derive(kind);
        for schema in &schemas {
            debug!(table = %schema.name, columns = schema.width(), "creating table");
            store
                .create_or_replace_table(schema)
                .map_err(|e| ImportError::from_store(&schema.name, e))?;
        }
        info!(%kind, tables = schemas.len(), "destination tables created");
        Ok(schemas.len())
    }

    pub fn create_estimate_tables<S: Store>(&self, store: &mut S) -> ImportResult<usize> {
        self.create_tables(store, FileKind::Estimate)
    }

    pub fn create_margin_tables<S: Store>(&self, store: &mut S) -> ImportResult<usize> {
        self.create_tables(store, FileKind::Margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{MemoryStore, Value},
        lookup::{store::tests::sample_lookup, ColumnDefinition, LineNumber},
    };
    use anyhow::Result;

    fn b01001() -> TableDefinition {
        TableDefinition {
            table_id: "B01001".into(),
            columns: vec![
                ColumnDefinition::new("B01001", LineNumber::whole(1), Some("Total".into())),
                ColumnDefinition::new("B01001", LineNumber::whole(2), Some("Male".into())),
            ],
        }
    }

    #[test]
    fn integer_table_with_identifier_columns() {
        let schema = derive_table_schema(&b01001(), FileKind::Estimate);
        assert_eq!(schema.name, "B01001");
        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "fileid",
                "filetype",
                "stusab",
                "chariter",
                "seq",
                "logrecno",
                "B01001.0001",
                "B01001.0002"
            ]
        );
        assert_eq!(schema.columns[6].ty, ColumnType::Integer);
        assert_eq!(schema.columns[2].ty, ColumnType::Varchar(2));
        assert!(!schema.columns[2].nullable);
        assert!(!schema.columns[5].nullable);
        assert!(schema.columns[0].nullable);
        assert_eq!(schema.primary_key, vec!["stusab", "logrecno"]);
    }

    #[test]
    fn decimal_tables_use_doubles() {
        let def = TableDefinition {
            table_id: "B19083".into(),
            columns: vec![ColumnDefinition::new("B19083", LineNumber::whole(1), None)],
        };
        let schema = derive_table_schema(&def, FileKind::Estimate);
        assert_eq!(schema.columns[6].ty, ColumnType::Double);
        assert!(is_decimal_table("B01002I"));
        assert!(!is_decimal_table("B01001"));
    }

    #[test]
    fn margin_twin_differs_only_in_name() {
        let est = derive_table_schema(&b01001(), FileKind::Estimate);
        let moe = derive_table_schema(&b01001(), FileKind::Margin);
        assert_eq!(moe.name, "B01001_moe");
        assert_eq!(moe.columns, est.columns);
        assert_eq!(moe.primary_key, est.primary_key);
    }

    #[test]
    fn rerunning_yields_identical_structure() -> Result<()> {
        let lookup = LookupMetadataStore::from_reader(sample_lookup().as_bytes())?;
        let deriver = SchemaDeriver::new(&lookup, TableFilter::All);
        let mut store = MemoryStore::new();

        assert_eq!(deriver.create_estimate_tables(&mut store)?, 3);
        let first: Vec<_> = ["B01001", "B01002", "B02001"]
            .iter()
            .map(|t| store.schema(t).cloned())
            .collect();

        store.insert(
            "B01001",
            &[
                Value::Null,
                Value::Null,
                "ca".into(),
                Value::Null,
                Value::Null,
                "1".into(),
                "10".into(),
                "5".into(),
            ],
        )?;

        deriver.create_estimate_tables(&mut store)?;
        let second: Vec<_> = ["B01001", "B01002", "B02001"]
            .iter()
            .map(|t| store.schema(t).cloned())
            .collect();
        assert_eq!(first, second);
        // structure is kept, data is not
        assert_eq!(store.rows("B01001").map(|r| r.len()), Some(0));

        assert_eq!(
            store.schema("B01002").map(|s| s.columns[6].ty),
            Some(ColumnType::Double)
        );
        Ok(())
    }

    #[test]
    fn margin_tables_are_created_separately() -> Result<()> {
        let lookup = LookupMetadataStore::from_reader(sample_lookup().as_bytes())?;
        let deriver = SchemaDeriver::new(&lookup, TableFilter::only(["B01001"]));
        let mut store = MemoryStore::new();
        deriver.create_margin_tables(&mut store)?;
        assert_eq!(store.table_names(), vec!["B01001_moe"]);
        Ok(())
    }
}
