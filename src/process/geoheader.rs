// src/process/geoheader.rs
//
// Fixed-width geography files into the wide `geoheader` table.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::{
    utils::{clean_cell, decode_latin1},
    write_rows, LoadOptions, TableOutcome,
};
use crate::{
    db::{quote_ident, Row, Store},
    decode::{FieldSpec, RecordLayout, Width},
    error::{ImportError, ImportResult},
    schema::{ColumnSchema, ColumnType, TableSchema},
};

pub const GEOHEADER_TABLE: &str = "geoheader";

pub const GEOHEADER_LAYOUT: RecordLayout = RecordLayout::new(&[
    FieldSpec::fixed("fileid", 6),
    FieldSpec::fixed("stusab", 2),
    FieldSpec::fixed("sumlevel", 3),
    FieldSpec::fixed("component", 2),
    FieldSpec::fixed("logrecno", 7),
    FieldSpec::fixed("us", 1),
    FieldSpec::fixed("region", 1),
    FieldSpec::fixed("division", 1),
    FieldSpec::fixed("statece", 2),
    FieldSpec::fixed("state", 2),
    FieldSpec::fixed("county", 3),
    FieldSpec::fixed("cousub", 5),
    FieldSpec::fixed("place", 5),
    FieldSpec::fixed("tract", 6),
    FieldSpec::fixed("blkgrp", 1),
    FieldSpec::fixed("concit", 5),
    FieldSpec::fixed("aianhh", 4),
    FieldSpec::fixed("aianhhfp", 5),
    FieldSpec::fixed("aihhtli", 1),
    FieldSpec::fixed("aitsce", 3),
    FieldSpec::fixed("aits", 5),
    FieldSpec::fixed("anrc", 5),
    FieldSpec::fixed("cbsa", 5),
    FieldSpec::fixed("csa", 3),
    FieldSpec::fixed("metdiv", 5),
    FieldSpec::fixed("macc", 1),
    FieldSpec::fixed("memi", 1),
    FieldSpec::fixed("necta", 5),
    FieldSpec::fixed("cnecta", 3),
    FieldSpec::fixed("nectadiv", 5),
    FieldSpec::fixed("ua", 5),
    FieldSpec::fixed("blank1", 5),
    FieldSpec::fixed("cdcurr", 2),
    FieldSpec::fixed("sldu", 3),
    FieldSpec::fixed("sldl", 3),
    FieldSpec::fixed("blank2", 6),
    FieldSpec::fixed("blank3", 3),
    FieldSpec::fixed("blank4", 5),
    FieldSpec::fixed("submcd", 5),
    FieldSpec::fixed("sdelm", 5),
    FieldSpec::fixed("sdsec", 5),
    FieldSpec::fixed("sduni", 5),
    FieldSpec::fixed("ur", 1),
    FieldSpec::fixed("pci", 1),
    FieldSpec::fixed("blank5", 6),
    FieldSpec::fixed("blank6", 5),
    FieldSpec::fixed("puma5", 5),
    FieldSpec::fixed("blank7", 5),
    FieldSpec::fixed("geoid", 40),
    FieldSpec::fixed("name", 200),
    FieldSpec::fixed("bttr", 6),
    FieldSpec::fixed("btbg", 1),
    FieldSpec::fixed("blank8", 43),
]);

const INTEGER_FIELDS: [&str; 2] = ["sumlevel", "logrecno"];

pub fn geoheader_schema() -> TableSchema {
    let mut schema = TableSchema::new(GEOHEADER_TABLE);
    for field in GEOHEADER_LAYOUT.fields() {
        let ty = match field.width {
            _ if INTEGER_FIELDS.contains(&field.name) => ColumnType::Integer,
            Width::Fixed(n) => ColumnType::Varchar(n as u16),
            Width::Rest => ColumnType::Text,
        };
        let mut col = ColumnSchema::new(field.name, ty);
        if matches!(field.name, "stusab" | "logrecno") {
            col = col.not_null();
        }
        schema = schema.column(col);
    }
    schema
        .primary_key(["stusab", "logrecno"])
        .index("geoid", true)
}

/// Statements run once after every geography file is in: add and index the
/// TIGER join key, lowercase the state code, and fill the key with the part
/// of `geoid` after its `US` delimiter (empty when there is none).
pub fn post_process_sql() -> Vec<String> {
    let table = quote_ident(GEOHEADER_TABLE);
    let after_us = r#"substr("geoid", instr("geoid", 'US') + 2)"#;
    vec![
        format!("ALTER TABLE {table} ADD COLUMN \"geoid_tiger\" TEXT;"),
        format!(
            "CREATE INDEX {} ON {table} (\"geoid_tiger\");",
            quote_ident(&format!("{}_geoid_tiger_idx", GEOHEADER_TABLE))
        ),
        format!(
            "UPDATE {table} SET \"stusab\" = lower(\"stusab\"), \"geoid_tiger\" = CASE \
             WHEN instr(\"geoid\", 'US') = 0 THEN '' \
             WHEN instr({after_us}, 'US') = 0 THEN {after_us} \
             ELSE substr({after_us}, 1, instr({after_us}, 'US') - 1) END;"
        ),
    ]
}

/// Slice one geography line, trim every field and normalize it.
pub fn parse_geography_line(line: &[u8]) -> ImportResult<Row> {
    Ok(GEOHEADER_LAYOUT
        .decode_bytes(line)?
        .into_iter()
        .map(|raw| clean_cell(decode_latin1(raw).trim()))
        .collect())
}

pub fn parse_geography_file(path: &Path) -> ImportResult<Vec<Row>> {
    let bytes = fs::read(path).map_err(|e| ImportError::io(path, e))?;
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(parse_geography_line)
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeoheaderReport {
    pub files: usize,
    pub rows: usize,
    /// Files whose bulk load was skipped under `SkipDuplicates`.
    pub skipped_files: usize,
}

pub struct GeoheaderLoader {
    options: LoadOptions,
}

impl GeoheaderLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    /// Recreate `geoheader`, load `files` in path order (one transaction
    /// each), then post-process once.
    pub fn load<S: Store>(&self, store: &mut S, files: &[PathBuf]) -> ImportResult<GeoheaderReport> {
        store
            .create_or_replace_table(&geoheader_schema())
            .map_err(|e| ImportError::from_store(GEOHEADER_TABLE, e))?;

        let mut files = files.to_vec();
        files.sort();

        let mut report = GeoheaderReport::default();
        for path in &files {
            info!(path = %path.display(), "processing geoheader");
            let rows = parse_geography_file(path)?;
            let outcome = store.transaction(|s| write_rows(s, GEOHEADER_TABLE, &rows, &self.options))?;
            match outcome {
                TableOutcome::Loaded { rows, .. } => report.rows += rows,
                TableOutcome::Skipped { .. } => report.skipped_files += 1,
            }
            report.files += 1;
        }

        for sql in post_process_sql() {
            debug!(%sql, "geoheader post-processing");
            store
                .run_query(&sql)
                .map_err(|e| ImportError::from_store(GEOHEADER_TABLE, e))?;
        }
        info!(files = report.files, rows = report.rows, "geoheader loaded");
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        config::{LoadStrategy, Tolerance},
        db::{MemoryStore, Value},
    };
    use anyhow::Result;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// A geography line with `values` placed in their fields, blanks elsewhere.
    pub(crate) fn geo_line(values: &[(&str, &str)]) -> String {
        let values: HashMap<&str, &str> = values.iter().copied().collect();
        GEOHEADER_LAYOUT
            .fields()
            .iter()
            .map(|f| {
                let Width::Fixed(width) = f.width else {
                    unreachable!("geoheader fields are fixed")
                };
                format!("{:<width$}", values.get(f.name).copied().unwrap_or(""))
            })
            .collect()
    }

    fn ca(logrecno: &str, geoid: &str, name: &str) -> String {
        geo_line(&[
            ("fileid", "ACSSF"),
            ("stusab", "CA"),
            ("sumlevel", "040"),
            ("component", "00"),
            ("logrecno", logrecno),
            ("state", "06"),
            ("geoid", geoid),
            ("name", name),
        ])
    }

    #[test]
    fn layout_has_53_fields() {
        assert_eq!(GEOHEADER_LAYOUT.len(), 53);
        assert_eq!(GEOHEADER_LAYOUT.fixed_width(), 468);
        assert_eq!(geoheader_schema().width(), 53);
    }

    #[test]
    fn schema_types_and_keys() {
        let schema = geoheader_schema();
        let col = |name: &str| schema.columns[schema.position(name).expect(name)].clone();
        assert_eq!(col("sumlevel").ty, ColumnType::Integer);
        assert_eq!(col("logrecno").ty, ColumnType::Integer);
        assert_eq!(col("name").ty, ColumnType::Varchar(200));
        assert!(!col("stusab").nullable);
        assert!(!col("logrecno").nullable);
        assert_eq!(schema.primary_key, vec!["stusab", "logrecno"]);
        assert!(schema.indexes.iter().any(|i| i.columns == ["geoid"] && i.unique));
    }

    #[test]
    fn parses_a_line() -> Result<()> {
        let line = ca("0000001", "04000US06", "California");
        let row = parse_geography_line(line.as_bytes())?;
        let schema = geoheader_schema();
        let at = |name: &str| row[schema.position(name).expect(name)].clone();

        assert_eq!(row.len(), 53);
        assert_eq!(at("stusab"), Value::from("CA"));
        assert_eq!(at("logrecno"), Value::from("0000001"));
        assert_eq!(at("geoid"), Value::from("04000US06"));
        assert_eq!(at("name"), Value::from("California"));
        assert_eq!(at("county"), Value::Null);
        Ok(())
    }

    #[test]
    fn right_trimmed_lines_still_parse() -> Result<()> {
        let line = ca("0000002", "04000US06", "California");
        let row = parse_geography_line(line.trim_end().as_bytes())?;
        assert_eq!(row.len(), 53);
        assert_eq!(row[52], Value::Null);
        Ok(())
    }

    #[test]
    fn loads_files_in_order_and_post_processes() -> Result<()> {
        let dir = TempDir::new()?;
        let b = dir.path().join("g20115ca.txt");
        let a = dir.path().join("g20115ak.txt");
        fs::write(
            &b,
            format!(
                "{}\r\n{}\r\n\r\n",
                ca("0000001", "04000US06", "California"),
                ca("0000002", "05000US06001", "Alameda County")
            ),
        )?;
        fs::write(&a, format!("{}\n", ca("0000001", "04000US02", "Alaska").replacen("CA", "AK", 1)))?;

        let mut store = MemoryStore::new();
        let report = GeoheaderLoader::new(LoadOptions::default()).load(&mut store, &[b, a])?;
        assert_eq!(report.files, 2);
        assert_eq!(report.rows, 3);

        let rows = store.rows(GEOHEADER_TABLE).expect("table");
        // ak sorts first
        assert_eq!(rows[0][1], Value::from("AK"));
        assert_eq!(store.executed_queries(), post_process_sql().as_slice());
        Ok(())
    }

    #[test]
    fn duplicate_geoid_handling_follows_strategy() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("g20115ca.txt");
        fs::write(
            &path,
            format!(
                "{}\n{}\n",
                ca("0000001", "04000US06", "California"),
                ca("0000002", "04000US06", "Duplicate geoid")
            ),
        )?;
        let files = vec![path];

        let mut store = MemoryStore::new();
        let loader = GeoheaderLoader::new(LoadOptions::default());
        assert!(matches!(
            loader.load(&mut store, &files),
            Err(ImportError::Load { .. })
        ));

        let loader =
            GeoheaderLoader::new(LoadOptions::new(LoadStrategy::RowByRow, Tolerance::SkipDuplicates));
        let report = loader.load(&mut store, &files)?;
        assert_eq!(report.rows, 1);
        assert_eq!(store.rows(GEOHEADER_TABLE).map(|r| r.len()), Some(1));
        Ok(())
    }

    #[test]
    fn tiger_key_sql_splits_on_us() {
        let sql = post_process_sql();
        assert_eq!(sql.len(), 3);
        assert!(sql[0].contains("ADD COLUMN \"geoid_tiger\""));
        assert!(sql[1].contains("\"geoheader_geoid_tiger_idx\""));
        assert!(sql[2].contains("lower(\"stusab\")"));
    }
}
