// src/lookup/persist.rs
//
// Staging (`census_lookup`) and derived (`census_column_lookup`) relations.
// Both are dropped and rebuilt from the in-memory metadata on every run.

use tracing::info;

use super::store::LookupMetadataStore;
use crate::{
    db::{Row, Store, Value},
    error::{ImportError, ImportResult},
    schema::{ColumnSchema, ColumnType, TableSchema},
};

pub const LOOKUP_TABLE: &str = "census_lookup";
pub const COLUMN_LOOKUP_TABLE: &str = "census_column_lookup";

pub fn lookup_schema() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(LOOKUP_TABLE)
        .column(ColumnSchema::new("id", Integer).not_null())
        .column(ColumnSchema::new("file_id", Varchar(10)))
        .column(ColumnSchema::new("table_id", Varchar(10)))
        .column(ColumnSchema::new("sequence_no", Integer))
        .column(ColumnSchema::new("line_no", Numeric))
        .column(ColumnSchema::new("start_pos", Integer))
        .column(ColumnSchema::new("cells_in_table", Varchar(30)))
        .column(ColumnSchema::new("cells_in_sequence", Integer))
        .column(ColumnSchema::new("table_title", Text))
        .column(ColumnSchema::new("subject_area", Text))
        .primary_key(["id"])
}

pub fn column_lookup_schema() -> TableSchema {
    use ColumnType::*;
    TableSchema::new(COLUMN_LOOKUP_TABLE)
        .column(ColumnSchema::new("id", Integer).not_null())
        .column(ColumnSchema::new("file_id", Varchar(10)))
        .column(ColumnSchema::new("table_id", Varchar(10)))
        .column(ColumnSchema::new("sequence_no", Integer))
        .column(ColumnSchema::new("column_id", Varchar(20)))
        .column(ColumnSchema::new("line_no", Integer))
        .column(ColumnSchema::new("start_pos", Integer))
        .column(ColumnSchema::new("cells_in_table", Integer))
        .column(ColumnSchema::new("column_title", Text))
        .column(ColumnSchema::new("topic", Text))
        .column(ColumnSchema::new("table_universe", Text))
        .column(ColumnSchema::new("subject_area", Text))
        .primary_key(["id"])
        .index("table_id", false)
        .index("sequence_no", false)
}

fn int(v: Option<u32>) -> Value {
    v.map(i64::from).into()
}

impl LookupMetadataStore {
    /// Raw rows with a 1-based surrogate id, in file order.
    pub fn staging_rows(&self) -> Vec<Row> {
        self.rows()
            .iter()
            .enumerate()
            .map(|(idx, r)| {
                vec![
                    Value::Int(idx as i64 + 1),
                    r.file_id.clone().into(),
                    r.table_id.clone().into(),
                    Value::Int(i64::from(r.sequence_no)),
                    r.line_no.map(|l| l.to_string()).into(),
                    int(r.start_position),
                    r.cells_in_table.clone().into(),
                    int(r.cells_in_sequence),
                    r.title.clone().into(),
                    r.subject_area.clone().into(),
                ]
            })
            .collect()
    }

    /// One row per integer detail line that has a header, ordered by
    /// sequence, table and line. The id is the detail row's staging id.
    pub fn column_lookup_rows(&self) -> Vec<Row> {
        let mut out = Vec::new();
        // details are keyed by (table, sequence); reorder to (sequence, table)
        let mut keyed: Vec<_> = self.details().collect();
        keyed.sort_by(|(a, _), (b, _)| (a.1, &a.0).cmp(&(b.1, &b.0)));

        for ((table, seq), lines) in keyed {
            let Some(header) = self.header(table, *seq) else {
                continue;
            };
            for d in lines {
                let Some(line) = d.line_no.as_integer() else {
                    continue;
                };
                let row = &self.rows()[d.row];
                out.push(vec![
                    Value::Int(d.row as i64 + 1),
                    row.file_id.clone().into(),
                    table.clone().into(),
                    Value::Int(i64::from(*seq)),
                    Value::Text(format!("{}.{}", table, d.line_no.column_suffix())),
                    Value::Int(i64::from(line)),
                    Value::Int(i64::from(header.start_position)),
                    int(header.cells),
                    row.title.clone().into(),
                    header.title.clone().into(),
                    self.universe(table).map(String::from).into(),
                    row.subject_area.clone().into(),
                ]);
            }
        }
        out
    }

    /// Rebuild both lookup relations in one transaction.
    pub fn persist<S: Store>(&self, store: &mut S) -> ImportResult<()> {
        let staging = self.staging_rows();
        let columns = self.column_lookup_rows();

        store.transaction(|s| -> ImportResult<()> {
            for (schema, rows) in [(lookup_schema(), &staging), (column_lookup_schema(), &columns)] {
                s.create_or_replace_table(&schema)
                    .map_err(|e| ImportError::from_store(&schema.name, e))?;
                s.bulk_load(&schema.name, rows)
                    .map_err(|e| ImportError::from_store(&schema.name, e))?;
                info!(table = %schema.name, rows = rows.len(), "lookup relation rebuilt");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryStore, lookup::store::tests::sample_lookup};
    use anyhow::Result;

    #[test]
    fn staging_keeps_every_non_blank_row() -> Result<()> {
        let lookup = LookupMetadataStore::from_reader(sample_lookup().as_bytes())?;
        let rows = lookup.staging_rows();
        assert_eq!(rows.len(), 13);
        assert_eq!(rows[0][0], Value::Int(1));
        assert_eq!(rows[0][2], Value::from("B01001"));
        assert_eq!(rows[0][4], Value::Null);
        assert_eq!(rows[4][4], Value::from("2.5"));
        assert_eq!(rows[0][6], Value::from("2 CELLS"));
        Ok(())
    }

    #[test]
    fn column_lookup_joins_header_and_universe() -> Result<()> {
        let lookup = LookupMetadataStore::from_reader(sample_lookup().as_bytes())?;
        let rows = lookup.column_lookup_rows();
        // 2 + 3 + 1 integer detail lines
        assert_eq!(rows.len(), 6);

        let male = &rows[1];
        assert_eq!(male[2], Value::from("B01001"));
        assert_eq!(male[4], Value::from("B01001.0002"));
        assert_eq!(male[5], Value::Int(2));
        assert_eq!(male[6], Value::Int(7));
        assert_eq!(male[7], Value::Int(2));
        assert_eq!(male[8], Value::from("Male:"));
        assert_eq!(male[9], Value::from("SEX BY AGE"));
        assert_eq!(male[10], Value::from("Total population"));

        // ordered by sequence: B02001 (sequence 3) comes last
        assert_eq!(rows[5][2], Value::from("B02001"));
        Ok(())
    }

    #[test]
    fn persist_rebuilds_both_relations() -> Result<()> {
        let lookup = LookupMetadataStore::from_reader(sample_lookup().as_bytes())?;
        let mut store = MemoryStore::new();
        lookup.persist(&mut store)?;
        lookup.persist(&mut store)?;

        assert_eq!(store.rows(LOOKUP_TABLE).map(|r| r.len()), Some(13));
        assert_eq!(store.rows(COLUMN_LOOKUP_TABLE).map(|r| r.len()), Some(6));
        assert!(!store.in_transaction());
        Ok(())
    }
}
