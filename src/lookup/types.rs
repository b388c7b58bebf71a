// src/lookup/types.rs

use std::{collections::BTreeSet, fmt};

use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing ` CELLS` label (and whatever follows it) of a cells-in-table value.
static CELLS_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r" *CELLS*.*$").expect("invalid regex"));

/// A lookup line number, kept in tenths so sub-part rows such as `0.5` stay
/// exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineNumber(u32);

impl LineNumber {
    pub fn whole(n: u32) -> Self {
        Self(n * 10)
    }

    pub fn from_tenths(tenths: u32) -> Self {
        Self(tenths)
    }

    /// Parse `"1"`, `"12.5"`, `".5"` or `"3.0"`. Precision beyond tenths is
    /// rejected unless the extra digits are zero.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (int, frac) = raw.split_once('.').unwrap_or((raw, ""));
        if int.is_empty() && frac.is_empty() {
            return None;
        }
        if !int.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let whole: u32 = if int.is_empty() { 0 } else { int.parse().ok()? };
        let mut digits = frac.bytes();
        let tenth = digits.next().map(|b| u32::from(b - b'0')).unwrap_or(0);
        if !digits.all(|b| b == b'0') {
            return None;
        }
        whole.checked_mul(10)?.checked_add(tenth).map(Self)
    }

    pub fn tenths(self) -> u32 {
        self.0
    }

    pub fn is_integer(self) -> bool {
        self.0 % 10 == 0
    }

    /// The integral line, if this is not a sub-part row.
    pub fn as_integer(self) -> Option<u32> {
        self.is_integer().then_some(self.0 / 10)
    }

    /// Zero-padded suffix used in column ids: `1` → `0001`, `0.5` → `0000.5`.
    pub fn column_suffix(self) -> String {
        match self.0 % 10 {
            0 => format!("{:04}", self.0 / 10),
            t => format!("{:04}.{}", self.0 / 10, t),
        }
    }
}

impl fmt::Display for LineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 % 10 {
            0 => write!(f, "{}", self.0 / 10),
            t => write!(f, "{}.{}", self.0 / 10, t),
        }
    }
}

/// One record of the lookup file, placeholders already replaced by `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRow {
    pub file_id: Option<String>,
    pub table_id: String,
    pub sequence_no: u32,
    pub line_no: Option<LineNumber>,
    pub start_position: Option<u32>,
    pub cells_in_table: Option<String>,
    pub cells_in_sequence: Option<u32>,
    pub title: Option<String>,
    pub subject_area: Option<String>,
}

/// What a lookup row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupRole {
    /// Table header: where the table starts in its sequence and how many
    /// cells it has (`None` when the count is not a number).
    Header { start_position: u32, cells: Option<u32> },
    /// One column (or sub-part) of a table.
    Detail { line_no: LineNumber },
    /// Documentation only, e.g. `Universe:  Total population`.
    Universe,
}

impl LookupRow {
    pub fn classify(&self) -> LookupRole {
        match (self.line_no, self.start_position, &self.cells_in_table) {
            (Some(line_no), _, _) => LookupRole::Detail { line_no },
            (None, Some(start_position), Some(cells)) => LookupRole::Header {
                start_position,
                cells: parse_cells(cells),
            },
            _ => LookupRole::Universe,
        }
    }
}

/// `"2 CELLS"` → 2.
pub fn parse_cells(raw: &str) -> Option<u32> {
    CELLS_LABEL.replace(raw.trim(), "").trim().parse().ok()
}

/// Inclusive, 0-based column range of one table inside a decoded sequence row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRange {
    pub table_id: String,
    pub sequence_no: u32,
    pub start: usize,
    pub stop: usize,
}

impl TableRange {
    pub fn width(&self) -> usize {
        self.stop - self.start + 1
    }

    pub fn overlaps(&self, other: &TableRange) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }
}

impl fmt::Display for TableRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.stop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// `<table id>.<padded line>`, e.g. `B01001.0002`.
    pub id: String,
    pub title: Option<String>,
    pub table_id: String,
    pub line_no: LineNumber,
}

impl ColumnDefinition {
    pub fn new(table_id: &str, line_no: LineNumber, title: Option<String>) -> Self {
        Self {
            id: format!("{}.{}", table_id, line_no.column_suffix()),
            title,
            table_id: table_id.to_string(),
            line_no,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub table_id: String,
    pub columns: Vec<ColumnDefinition>,
}

/// Which census tables an operation applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TableFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl TableFilter {
    pub fn only<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(tables.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, table_id: &str) -> bool {
        match self {
            TableFilter::All => true,
            TableFilter::Only(set) => set.contains(table_id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SequenceFilter {
    #[default]
    All,
    Only(u32),
}

impl SequenceFilter {
    pub fn matches(self, sequence_no: u32) -> bool {
        match self {
            SequenceFilter::All => true,
            SequenceFilter::Only(seq) => seq == sequence_no,
        }
    }
}
