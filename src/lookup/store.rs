// src/lookup/store.rs
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use csv::{ByteRecord, ReaderBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::types::{
    ColumnDefinition, LineNumber, LookupRole, LookupRow, SequenceFilter, TableDefinition,
    TableFilter, TableRange,
};
use crate::{
    error::{ImportError, ImportResult},
    process::utils::decode_latin1,
};

static UNIVERSE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Universe:\s+").expect("invalid regex"));

/// Header information of one table within one sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    pub table_id: String,
    pub sequence_no: u32,
    /// 1-based position of the table's first value in a sequence row.
    pub start_position: u32,
    pub cells: Option<u32>,
    /// The table's topic, e.g. `SEX BY AGE`.
    pub title: Option<String>,
    pub subject_area: Option<String>,
}

/// A detail row resolved against its position in the raw rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DetailRef {
    pub line_no: LineNumber,
    /// Index into the raw rows.
    pub row: usize,
}

type TableKey = (String, u32);

/// Table and column metadata of one census release, built once per run and
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct LookupMetadataStore {
    rows: Vec<LookupRow>,
    headers: BTreeMap<TableKey, TableHeader>,
    details: BTreeMap<TableKey, Vec<DetailRef>>,
    universes: BTreeMap<String, String>,
    /// (table, sequence) pairs with detail rows but no header row.
    orphans: BTreeSet<TableKey>,
}

impl LookupMetadataStore {
    /// Read a lookup file (header line, comma delimited, Latin-1).
    #[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ImportError::io(path, e))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> ImportResult<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        let mut record = ByteRecord::new();
        while rdr.read_byte_record(&mut record)? {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            if let Some(row) = parse_record(&record, line)? {
                rows.push(row);
            }
        }
        Ok(Self::from_rows(rows))
    }

    /// Classify `rows` and build the per-table indexes.
    pub fn from_rows(rows: Vec<LookupRow>) -> Self {
        let mut store = Self::default();
        for (idx, row) in rows.iter().enumerate() {
            let key = (row.table_id.clone(), row.sequence_no);
            match row.classify() {
                LookupRole::Header {
                    start_position,
                    cells,
                } => {
                    if cells.is_none() {
                        warn!(
                            table = %row.table_id,
                            cells = ?row.cells_in_table,
                            "cells in table is not a number"
                        );
                    }
                    store.headers.insert(
                        key,
                        TableHeader {
                            table_id: row.table_id.clone(),
                            sequence_no: row.sequence_no,
                            start_position,
                            cells,
                            title: row.title.clone(),
                            subject_area: row.subject_area.clone(),
                        },
                    );
                }
                LookupRole::Detail { line_no } => {
                    store
                        .details
                        .entry(key)
                        .or_default()
                        .push(DetailRef { line_no, row: idx });
                }
                LookupRole::Universe => {
                    if let Some(title) = &row.title {
                        store
                            .universes
                            .entry(row.table_id.clone())
                            .or_insert_with(|| UNIVERSE_LABEL.replace(title, "").into_owned());
                    }
                }
            }
        }

        for key in store.details.keys() {
            if !store.headers.contains_key(key) {
                warn!(table = %key.0, sequence = key.1, "detail rows without a header row");
                store.orphans.insert(key.clone());
            }
        }
        for lines in store.details.values_mut() {
            lines.sort_by_key(|d| d.line_no);
        }

        store.rows = rows;
        info!(
            rows = store.rows.len(),
            tables = store.headers.len(),
            orphans = store.orphans.len(),
            "lookup metadata loaded"
        );
        store
    }

    /// Raw rows in file order.
    pub fn rows(&self) -> &[LookupRow] {
        &self.rows
    }

    pub fn header(&self, table_id: &str, sequence_no: u32) -> Option<&TableHeader> {
        self.headers.get(&(table_id.to_string(), sequence_no))
    }

    pub fn headers(&self) -> impl Iterator<Item = &TableHeader> {
        self.headers.values()
    }

    /// Universe description with the `Universe:` label removed.
    pub fn universe(&self, table_id: &str) -> Option<&str> {
        self.universes.get(table_id).map(String::as_str)
    }

    pub(crate) fn details(&self) -> impl Iterator<Item = (&TableKey, &[DetailRef])> {
        self.details.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Column ranges of every table active in `sequence_no`.
    ///
    /// `stop = start + max(line) - 1`. Fails when a requested table has
    /// detail rows in this sequence but no header, has lines in more than one
    /// sequence or not numbered from 1, or when two ranges overlap.
    pub fn table_ranges(
        &self,
        sequence_no: u32,
        filter: &TableFilter,
    ) -> ImportResult<BTreeMap<String, TableRange>> {
        if let Some((table, _)) = self
            .orphans
            .iter()
            .find(|(t, s)| *s == sequence_no && filter.matches(t))
        {
            return Err(ImportError::inconsistent(
                table.clone(),
                format!("detail rows in sequence {} but no header row", sequence_no),
            ));
        }

        let mut ranges = BTreeMap::new();
        for ((table, seq), header) in &self.headers {
            if *seq != sequence_no || !filter.matches(table) {
                continue;
            }
            let lines: Vec<u32> = self
                .details
                .get(&(table.clone(), *seq))
                .into_iter()
                .flatten()
                .filter_map(|d| d.line_no.as_integer())
                .collect();
            let (Some(first), Some(last)) = (lines.iter().min(), lines.iter().max()) else {
                debug!(table = %table, sequence = seq, "header without integer lines, skipped");
                continue;
            };
            let spanned = self.integer_sequences(table);
            if spanned.len() > 1 {
                return Err(ImportError::inconsistent(
                    table.clone(),
                    format!("lines span sequences {:?}; split tables cannot be loaded", spanned),
                ));
            }
            if *first != 1 {
                return Err(ImportError::inconsistent(
                    table.clone(),
                    format!("lines start at {} in sequence {}, expected 1", first, seq),
                ));
            }
            if header.start_position == 0 {
                return Err(ImportError::inconsistent(
                    table.clone(),
                    "start position must be at least 1",
                ));
            }

            let start = header.start_position as usize - 1;
            let stop = start + *last as usize - 1;
            ranges.insert(
                table.clone(),
                TableRange {
                    table_id: table.clone(),
                    sequence_no,
                    start,
                    stop,
                },
            );
        }

        let mut by_start: Vec<&TableRange> = ranges.values().collect();
        by_start.sort_by_key(|r| r.start);
        for pair in by_start.windows(2) {
            if pair[0].overlaps(pair[1]) {
                return Err(ImportError::inconsistent(
                    pair[1].table_id.clone(),
                    format!(
                        "range {} overlaps {} ({}) in sequence {}",
                        pair[1], pair[0].table_id, pair[0], sequence_no
                    ),
                ));
            }
        }
        Ok(ranges)
    }

    /// Sequences in which `table_id` has integer detail lines.
    fn integer_sequences(&self, table_id: &str) -> BTreeSet<u32> {
        self.details
            .iter()
            .filter(|((table, _), lines)| {
                table == table_id && lines.iter().any(|d| d.line_no.is_integer())
            })
            .map(|((_, seq), _)| *seq)
            .collect()
    }

    /// Physical columns of `table_id`: integer lines only, ordered by line
    /// number, each line once even when the table spans several sequences.
    pub fn columns_for(&self, table_id: &str) -> Vec<ColumnDefinition> {
        let mut columns: BTreeMap<LineNumber, ColumnDefinition> = BTreeMap::new();
        for ((table, _), lines) in &self.details {
            if table != table_id {
                continue;
            }
            for d in lines.iter().filter(|d| d.line_no.is_integer()) {
                columns.entry(d.line_no).or_insert_with(|| {
                    ColumnDefinition::new(table_id, d.line_no, self.rows[d.row].title.clone())
                });
            }
        }
        columns.into_values().collect()
    }

    /// Tables that have detail rows, optionally within one sequence.
    pub fn table_names(&self, sequence: SequenceFilter) -> BTreeSet<String> {
        self.details
            .keys()
            .filter(|(_, seq)| sequence.matches(*seq))
            .map(|(table, _)| table.clone())
            .collect()
    }

    /// Definitions of every table that has a header row.
    pub fn tables(&self, filter: &TableFilter) -> Vec<TableDefinition> {
        let ids: BTreeSet<&String> = self
            .headers
            .keys()
            .map(|(table, _)| table)
            .filter(|t| filter.matches(t))
            .collect();
        ids.into_iter()
            .map(|table_id| TableDefinition {
                table_id: table_id.clone(),
                columns: self.columns_for(table_id),
            })
            .collect()
    }
}

/// Lookup file columns, in order.
const FILE_ID: usize = 0;
const TABLE_ID: usize = 1;
const SEQUENCE: usize = 2;
const LINE_NO: usize = 3;
const START_POS: usize = 4;
const CELLS_IN_TABLE: usize = 5;
const CELLS_IN_SEQUENCE: usize = 6;
const TITLE: usize = 7;
const SUBJECT_AREA: usize = 8;

/// Turn one raw record into a [`LookupRow`]. Blank records yield `None`.
fn parse_record(record: &ByteRecord, line: u64) -> ImportResult<Option<LookupRow>> {
    let fields: Vec<Option<String>> = record
        .iter()
        .map(|raw| {
            let value = decode_latin1(raw);
            let value = value.trim();
            match value {
                "" | "." => None,
                v => Some(v.to_string()),
            }
        })
        .collect();
    if fields.iter().all(Option::is_none) {
        return Ok(None);
    }

    let text = |i: usize| fields.get(i).cloned().flatten();
    let number = |i: usize, name: &str| -> ImportResult<Option<u32>> {
        text(i)
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    ImportError::format(
                        format!("lookup line {}", line),
                        format!("{} `{}` is not a number", name, v),
                    )
                })
            })
            .transpose()
    };

    let table_id = text(TABLE_ID).ok_or_else(|| {
        ImportError::format(format!("lookup line {}", line), "missing table id")
    })?;
    let sequence_no = number(SEQUENCE, "sequence number")?.ok_or_else(|| {
        ImportError::format(format!("lookup line {}", line), "missing sequence number")
    })?;
    let line_no = text(LINE_NO)
        .map(|v| {
            LineNumber::parse(&v).ok_or_else(|| {
                ImportError::format(
                    format!("lookup line {}", line),
                    format!("line number `{}` is not a number", v),
                )
            })
        })
        .transpose()?;

    Ok(Some(LookupRow {
        file_id: text(FILE_ID),
        table_id,
        sequence_no,
        line_no,
        start_position: number(START_POS, "start position")?,
        cells_in_table: text(CELLS_IN_TABLE),
        cells_in_sequence: number(CELLS_IN_SEQUENCE, "cells in sequence")?,
        title: text(TITLE),
        subject_area: text(SUBJECT_AREA),
    }))
}
