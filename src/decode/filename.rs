// src/decode/filename.rs

use std::{
    fmt,
    path::{Path, PathBuf},
};

use super::{CharClass, FieldSpec, RecordLayout};
use crate::error::{ImportError, ImportResult};

/// `<kind><year:4><period:1><state:word><sequence:4><iteration:3>`, the
/// `.txt` extension removed.
const SEQUENCE_NAME: RecordLayout = RecordLayout::new(&[
    FieldSpec::one_of("kind", "em"),
    FieldSpec::digits("year", 4),
    FieldSpec::digits("period", 1),
    FieldSpec::rest("state", CharClass::Word),
    FieldSpec::digits("sequence", 4),
    FieldSpec::digits("iteration", 3),
]);

const EXTENSION: &str = ".txt";

/// Whether a sequence file carries estimates or their margins of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Estimate,
    Margin,
}

impl FileKind {
    pub fn code(self) -> char {
        match self {
            FileKind::Estimate => 'e',
            FileKind::Margin => 'm',
        }
    }

    /// Suffix appended to a census table id to form the destination table.
    pub fn table_suffix(self) -> &'static str {
        match self {
            FileKind::Estimate => "",
            FileKind::Margin => "_moe",
        }
    }

    pub fn table_name(self, table_id: &str) -> String {
        format!("{}{}", table_id, self.table_suffix())
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Estimate => write!(f, "estimate"),
            FileKind::Margin => write!(f, "margin"),
        }
    }
}

/// Identity of one sequence data file, decoded from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFileDescriptor {
    pub kind: FileKind,
    pub year: u16,
    pub period: u8,
    pub state: String,
    pub sequence: u16,
    pub iteration: u16,
    pub path: PathBuf,
}

impl SequenceFileDescriptor {
    /// Sequence number as written in file names and lookup rows (`0002`).
    pub fn sequence_code(&self) -> String {
        format!("{:04}", self.sequence)
    }

    pub fn sequence_no(&self) -> u32 {
        u32::from(self.sequence)
    }

    /// Canonical file name, the inverse of [`parse_sequence_filename`].
    pub fn file_name(&self) -> String {
        format!(
            "{}{:04}{}{}{:04}{:03}{}",
            self.kind.code(),
            self.year,
            self.period,
            self.state,
            self.sequence,
            self.iteration,
            EXTENSION
        )
    }

    pub fn table_name(&self, table_id: &str) -> String {
        self.kind.table_name(table_id)
    }
}

/// Decode a sequence file path such as `…/e20115ca0002000.txt`.
pub fn parse_sequence_filename(path: impl AsRef<Path>) -> ImportResult<SequenceFileDescriptor> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ImportError::format(path.display().to_string(), "no file name"))?;

    let stem = name.strip_suffix(EXTENSION).ok_or_else(|| {
        ImportError::format(
            name,
            "could not interpret file name, expected a census sequence file (*.txt)",
        )
    })?;

    let fields = SEQUENCE_NAME.decode_str(stem).map_err(|e| match e {
        ImportError::Format { reason, .. } => ImportError::format(name, reason),
        other => other,
    })?;
    let number = |i: usize| -> ImportResult<u16> {
        fields[i]
            .parse()
            .map_err(|_| ImportError::format(name, format!("bad {}", SEQUENCE_NAME.fields()[i].name)))
    };

    Ok(SequenceFileDescriptor {
        kind: if fields[0] == "m" {
            FileKind::Margin
        } else {
            FileKind::Estimate
        },
        year: number(1)?,
        period: fields[2]
            .parse()
            .map_err(|_| ImportError::format(name, "bad period"))?,
        state: fields[3].to_string(),
        sequence: number(4)?,
        iteration: number(5)?,
        path: path.to_path_buf(),
    })
}
