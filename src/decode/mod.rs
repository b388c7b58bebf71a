//! Declarative fixed-record decoding.
//!
//! Sequence file names and geography lines are both a run of fields with
//! known widths. A [`RecordLayout`] describes those fields once; the same
//! decoder then slices either a file name (exact fit, one variable-width
//! field allowed) or a fixed-width text line (lenient about short lines).

use crate::error::{ImportError, ImportResult};

pub mod filename;

pub use filename::{parse_sequence_filename, FileKind, SequenceFileDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Fixed(usize),
    /// Everything between the leading and trailing fixed fields.
    Rest,
}

/// Characters a field may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Any,
    Digit,
    /// ASCII letters, digits and underscore.
    Word,
    OneOf(&'static str),
}

impl CharClass {
    fn accepts(self, b: u8) -> bool {
        match self {
            CharClass::Any => true,
            CharClass::Digit => b.is_ascii_digit(),
            CharClass::Word => b.is_ascii_alphanumeric() || b == b'_',
            CharClass::OneOf(set) => set.as_bytes().contains(&b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub width: Width,
    pub class: CharClass,
}

impl FieldSpec {
    pub const fn fixed(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width: Width::Fixed(width),
            class: CharClass::Any,
        }
    }

    pub const fn digits(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width: Width::Fixed(width),
            class: CharClass::Digit,
        }
    }

    pub const fn one_of(name: &'static str, chars: &'static str) -> Self {
        Self {
            name,
            width: Width::Fixed(1),
            class: CharClass::OneOf(chars),
        }
    }

    pub const fn rest(name: &'static str, class: CharClass) -> Self {
        Self {
            name,
            width: Width::Rest,
            class,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    fields: &'static [FieldSpec],
}

impl RecordLayout {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sum of all fixed widths.
    pub fn fixed_width(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f.width {
                Width::Fixed(n) => n,
                Width::Rest => 0,
            })
            .sum()
    }

    /// Byte span of every field for an input of `len` bytes.
    ///
    /// `exact` demands the input fit the layout precisely; otherwise a short
    /// input yields truncated or empty trailing fields and extra bytes past
    /// the last field are ignored.
    fn spans(&self, len: usize, exact: bool) -> Result<Vec<(usize, usize)>, String> {
        let rest_at = self.fields.iter().position(|f| f.width == Width::Rest);
        let fixed = self.fixed_width();

        let rest_width = match rest_at {
            Some(_) if len <= fixed => {
                return Err(format!(
                    "expected more than {} characters, found {}",
                    fixed, len
                ))
            }
            Some(_) => len - fixed,
            None if exact && len != fixed => {
                return Err(format!("expected {} characters, found {}", fixed, len))
            }
            None => 0,
        };

        let mut spans = Vec::with_capacity(self.fields.len());
        let mut offset = 0;
        for field in self.fields {
            let width = match field.width {
                Width::Fixed(n) => n,
                Width::Rest => rest_width,
            };
            let start = offset.min(len);
            let end = (offset + width).min(len);
            spans.push((start, end));
            offset += width;
        }
        Ok(spans)
    }

    fn check(&self, input: &[u8], spans: &[(usize, usize)]) -> Result<(), String> {
        for (field, &(start, end)) in self.fields.iter().zip(spans) {
            if let Some(bad) = input[start..end].iter().find(|b| !field.class.accepts(**b)) {
                return Err(format!(
                    "field `{}` contains unexpected character {:?}",
                    field.name, *bad as char
                ));
            }
        }
        Ok(())
    }

    /// Decode `input`, which must match the layout exactly.
    pub fn decode_str<'a>(&self, input: &'a str) -> ImportResult<Vec<&'a str>> {
        let bytes = input.as_bytes();
        let spans = self
            .spans(bytes.len(), true)
            .and_then(|spans| self.check(bytes, &spans).map(|_| spans))
            .map_err(|reason| ImportError::format(input, reason))?;

        spans
            .into_iter()
            .map(|(start, end)| {
                input
                    .get(start..end)
                    .ok_or_else(|| ImportError::format(input, "field splits a character"))
            })
            .collect()
    }

    /// Slice one fixed-width line into raw field bytes. A trailing line
    /// terminator is ignored.
    pub fn decode_bytes<'a>(&self, line: &'a [u8]) -> ImportResult<Vec<&'a [u8]>> {
        let line = trim_line_end(line);
        let spans = self
            .spans(line.len(), false)
            .and_then(|spans| self.check(line, &spans).map(|_| spans))
            .map_err(|reason| {
                ImportError::format(String::from_utf8_lossy(line).into_owned(), reason)
            })?;
        Ok(spans.into_iter().map(|(s, e)| &line[s..e]).collect())
    }
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}
