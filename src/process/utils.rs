use encoding_rs::WINDOWS_1252;

use crate::db::{Row, Value};

/// Census "not applicable" marker stored in place of a literal `.`.
pub const NOT_APPLICABLE: i64 = -2;

/// Normalize one raw census cell:
///  - `""` becomes NULL
///  - `"."` becomes the numeric sentinel −2
///  - anything else passes through unchanged
pub fn clean_cell(raw: &str) -> Value {
    match raw {
        "" => Value::Null,
        "." => Value::Int(NOT_APPLICABLE),
        other => Value::Text(other.to_string()),
    }
}

pub fn clean_row<'a, I>(fields: I) -> Row
where
    I: IntoIterator<Item = &'a str>,
{
    fields.into_iter().map(clean_cell).collect()
}

/// Census files are Latin-1; decode through Windows-1252, its superset.
pub fn decode_latin1(bytes: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_normalized() {
        assert_eq!(clean_cell(""), Value::Null);
        assert_eq!(clean_cell("."), Value::Int(-2));
        assert_eq!(clean_cell("0"), Value::Text("0".into()));
        // only the exact sentinel is replaced
        assert_eq!(clean_cell(".."), Value::Text("..".into()));
        assert_eq!(clean_cell(" "), Value::Text(" ".into()));
        assert_eq!(clean_cell("-2"), Value::Text("-2".into()));
    }

    #[test]
    fn rows_keep_their_width() {
        let row = clean_row(["ACSSF", "", ".", "42"]);
        assert_eq!(
            row,
            vec![
                Value::Text("ACSSF".into()),
                Value::Null,
                Value::Int(-2),
                Value::Text("42".into()),
            ]
        );
    }

    #[test]
    fn latin1_bytes_decode() {
        assert_eq!(decode_latin1(b"Espa\xf1ola"), "Española");
        assert_eq!(decode_latin1(b"plain"), "plain");
    }
}
