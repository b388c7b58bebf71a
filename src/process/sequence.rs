// src/process/sequence.rs
use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use csv::{ByteRecord, ReaderBuilder};
use tracing::{debug, error, info};

use super::{
    persist_rows,
    utils::{clean_cell, decode_latin1},
    LoadOptions, TableOutcome,
};
use crate::{
    db::{Row, Store},
    decode::{parse_sequence_filename, SequenceFileDescriptor},
    error::{ImportError, ImportResult},
    lookup::{LookupMetadataStore, TableFilter, TableRange},
    schema::IDENTIFIER_COLUMNS,
};

/// How far a sequence file got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadPhase {
    Pending,
    Parsed,
    RangesResolved,
    Extracted,
    Loaded,
    Failed,
}

#[derive(Debug)]
pub struct LoadFailure {
    /// Last phase completed before the error.
    pub after: LoadPhase,
    pub error: ImportError,
}

#[derive(Debug)]
pub struct SequenceLoadReport {
    pub path: PathBuf,
    pub descriptor: Option<SequenceFileDescriptor>,
    pub phase: LoadPhase,
    /// Outcome per destination table.
    pub tables: BTreeMap<String, TableOutcome>,
    pub failure: Option<LoadFailure>,
}

impl SequenceLoadReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            descriptor: None,
            phase: LoadPhase::Pending,
            tables: BTreeMap::new(),
            failure: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase == LoadPhase::Failed
    }

    pub fn rows_loaded(&self) -> usize {
        self.tables.values().map(TableOutcome::rows).sum()
    }

    /// Turn a failed report into its error.
    pub fn into_result(self) -> ImportResult<Self> {
        match self.failure {
            Some(f) => Err(f.error),
            None => Ok(self),
        }
    }
}

/// Loads sequence data files into their census tables.
pub struct SequenceFileLoader<'a> {
    lookup: &'a LookupMetadataStore,
    options: LoadOptions,
    tables: TableFilter,
}

impl<'a> SequenceFileLoader<'a> {
    pub fn new(lookup: &'a LookupMetadataStore, options: LoadOptions, tables: TableFilter) -> Self {
        Self {
            lookup,
            options,
            tables,
        }
    }

    /// Column ranges of the requested tables present in this file.
    pub fn resolve(
        &self,
        file: &SequenceFileDescriptor,
    ) -> ImportResult<BTreeMap<String, TableRange>> {
        self.lookup.table_ranges(file.sequence_no(), &self.tables)
    }

    /// Split every row of a sequence file into one row per table: the
    /// identifier fields followed by that table's range. Exact duplicate
    /// rows are dropped (first occurrence kept) and tables without rows are
    /// omitted.
    pub fn extract<R: Read>(
        reader: R,
        ranges: &BTreeMap<String, TableRange>,
    ) -> ImportResult<BTreeMap<String, Vec<Row>>> {
        let ids = IDENTIFIER_COLUMNS.len();
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut tables: BTreeMap<&str, (Vec<Row>, HashSet<Row>)> = ranges
            .keys()
            .map(|k| (k.as_str(), (Vec::new(), HashSet::new())))
            .collect();

        let mut record = ByteRecord::new();
        while rdr.read_byte_record(&mut record)? {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let fields: Vec<String> = record.iter().map(decode_latin1).collect();
            if fields.len() < ids {
                return Err(ImportError::format(
                    format!("sequence line {}", line),
                    format!("expected at least {} identifier fields, found {}", ids, fields.len()),
                ));
            }

            for (table, range) in ranges {
                if fields.len() <= range.stop {
                    return Err(ImportError::format(
                        format!("sequence line {}", line),
                        format!(
                            "{} fields, table {} needs columns {}",
                            fields.len(),
                            table,
                            range
                        ),
                    ));
                }
                let row: Row = fields[..ids]
                    .iter()
                    .chain(&fields[range.start..=range.stop])
                    .map(|f| clean_cell(f))
                    .collect();

                if let Some((rows, seen)) = tables.get_mut(table.as_str()) {
                    if seen.insert(row.clone()) {
                        rows.push(row);
                    }
                }
            }
        }

        Ok(tables
            .into_iter()
            .filter(|(_, (rows, _))| !rows.is_empty())
            .map(|(table, (rows, _))| (table.to_string(), rows))
            .collect())
    }

    /// Load one sequence file. Failures are logged and carried in the report.
    #[tracing::instrument(level = "info", skip(self, store, path), fields(path = %path.as_ref().display()))]
    pub fn load<S: Store>(&self, store: &mut S, path: impl AsRef<Path>) -> SequenceLoadReport {
        let path = path.as_ref();
        let mut report = SequenceLoadReport::new(path);
        if let Err(error) = self.run(store, path, &mut report) {
            error!(phase = ?report.phase, error = %error, "sequence file failed");
            report.failure = Some(LoadFailure {
                after: report.phase,
                error,
            });
            report.phase = LoadPhase::Failed;
        }
        report
    }

    fn run<S: Store>(
        &self,
        store: &mut S,
        path: &Path,
        report: &mut SequenceLoadReport,
    ) -> ImportResult<()> {
        info!(path = %path.display(), "loading sequence file");
        let file = parse_sequence_filename(path)?;
        report.descriptor = Some(file.clone());
        report.phase = LoadPhase::Parsed;
        debug!(
            kind = %file.kind,
            state = %file.state,
            sequence = %file.sequence_code(),
            "sequence file name parsed"
        );

        let ranges = self.resolve(&file)?;
        report.phase = LoadPhase::RangesResolved;
        if ranges.is_empty() {
            info!("no requested tables in this sequence");
            return Ok(());
        }

        let reader = File::open(path).map_err(|e| ImportError::io(path, e))?;
        let tables = Self::extract(BufReader::new(reader), &ranges)?;
        report.phase = LoadPhase::Extracted;

        for (table_id, rows) in &tables {
            let table = file.table_name(table_id);
            let outcome = persist_rows(store, &table, rows, &self.options)?;
            report.tables.insert(table, outcome);
        }
        report.phase = LoadPhase::Loaded;
        info!(tables = report.tables.len(), rows = report.rows_loaded(), "sequence file loaded");
        Ok(())
    }
}
