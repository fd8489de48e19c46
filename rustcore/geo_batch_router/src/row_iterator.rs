//! Row Iterator (C3, `spec.md` §4.3).
//!
//! Reads the stored upload lazily, one row at a time, so a multi-gigabyte
//! file never lives fully in memory — the same streaming discipline the
//! result writer (C5) applies on the way out. Honors the separator,
//! encoding, and decimal mark recorded on the `UploadDescriptor` at
//! upload time.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use encoding_rs::{UTF_8, WINDOWS_1252};
use indexmap::IndexMap;

use crate::model::upload::{DecimalMark, DetectedEncoding, UploadDescriptor};

#[derive(Debug, Clone)]
pub struct Row {
    pub index: usize,
    pub fields: IndexMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RowIteratorError {
    #[error("failed to read upload file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Decodes the whole file up front (uploads are sniffed, never assumed to
/// be valid UTF-8) and hands back a `csv::Reader` over the decoded text,
/// alongside the header row.
pub struct RowIterator {
    reader: csv::Reader<std::io::Cursor<String>>,
    header: StringRecord,
    decimal_mark: DecimalMark,
    next_index: usize,
}

impl RowIterator {
    pub fn open(path: &Path, descriptor: &UploadDescriptor) -> Result<Self, RowIteratorError> {
        let raw = std::fs::read(path)?;
        let decoder = match descriptor.encoding {
            DetectedEncoding::Utf8 => UTF_8,
            DetectedEncoding::Latin1 => WINDOWS_1252,
        };
        let text = decoder.decode(&raw).0.into_owned();

        let mut reader = ReaderBuilder::new()
            .delimiter(descriptor.separator)
            .has_headers(true)
            .flexible(true)
            .from_reader(std::io::Cursor::new(text));
        let header = reader.headers()?.clone();

        Ok(Self {
            reader,
            header,
            decimal_mark: descriptor.decimal_mark,
            next_index: 0,
        })
    }

    /// Returns the next row, normalizing every field's decimal mark to `.`
    /// (`spec.md` §4.3). An empty or column-count-mismatched line still
    /// yields a `Row` — callers treat missing required columns as a
    /// per-row `MalformedRow` failure rather than a file-level error, so a
    /// single bad line cannot abort the whole upload.
    pub fn next_row(&mut self) -> Option<Result<Row, RowIteratorError>> {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => return None,
            Ok(true) => {}
            Err(e) => return Some(Err(e.into())),
        }

        let index = self.next_index;
        self.next_index += 1;

        let mut fields = IndexMap::with_capacity(self.header.len());
        for (i, name) in self.header.iter().enumerate() {
            let raw = record.get(i).unwrap_or("");
            fields.insert(name.to_string(), normalize_decimal(raw, self.decimal_mark));
        }

        Some(Ok(Row { index, fields }))
    }
}

impl Iterator for RowIterator {
    type Item = Result<Row, RowIteratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }
}

/// Rewrites a `1234,56`-style field to `1234.56` when the upload's decimal
/// mark is a comma and the field looks numeric; left untouched otherwise
/// so free-text columns (addresses, names) are never mangled.
fn normalize_decimal(raw: &str, decimal_mark: DecimalMark) -> String {
    if decimal_mark != DecimalMark::Comma {
        return raw.to_string();
    }
    let mut parts = raw.trim().splitn(2, ',');
    match (parts.next(), parts.next()) {
        (Some(whole), Some(frac))
            if whole.chars().all(|c| c.is_ascii_digit() || c == '-')
                && !frac.is_empty()
                && frac.chars().all(|c| c.is_ascii_digit()) =>
        {
            format!("{whole}.{frac}")
        }
        _ => raw.to_string(),
    }
}

/// Parses a field already normalized to `.` as a coordinate component,
/// yielding `None` for anything that is not a finite number (`spec.md`
/// §4.3, §8 malformed-row edge case).
pub fn parse_coordinate(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::upload::DetectedEncoding;

    fn write_descriptor(separator: u8, decimal_mark: DecimalMark) -> UploadDescriptor {
        UploadDescriptor {
            file_id: "test".into(),
            original_name: "test.csv".into(),
            byte_size: 0,
            encoding: DetectedEncoding::Utf8,
            separator,
            decimal_mark,
            columns: vec![],
            row_count: 0,
        }
    }

    #[test]
    fn iterates_rows_in_order_with_stable_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
        let descriptor = write_descriptor(b',', DecimalMark::Dot);

        let rows: Vec<_> = RowIterator::open(&path, &descriptor)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[1].index, 1);
        assert_eq!(rows[0].fields.get("a").unwrap(), "1");
    }

    #[test]
    fn normalizes_comma_decimal_marks_when_separator_is_semicolon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "lat;lon\n48,85;2,35\n").unwrap();
        let descriptor = write_descriptor(b';', DecimalMark::Comma);

        let row = RowIterator::open(&path, &descriptor).unwrap().next().unwrap().unwrap();

        assert_eq!(row.fields.get("lat").unwrap(), "48.85");
        assert_eq!(row.fields.get("lon").unwrap(), "2.35");
    }

    #[test]
    fn free_text_fields_with_commas_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        std::fs::write(&path, "name;lat\n\"Doe, John\";48,85\n").unwrap();
        let descriptor = write_descriptor(b';', DecimalMark::Comma);

        let row = RowIterator::open(&path, &descriptor).unwrap().next().unwrap().unwrap();

        assert_eq!(row.fields.get("name").unwrap(), "Doe, John");
        assert_eq!(row.fields.get("lat").unwrap(), "48.85");
    }

    #[test]
    fn parse_coordinate_rejects_non_numeric_and_non_finite() {
        assert_eq!(parse_coordinate("48.85"), Some(48.85));
        assert_eq!(parse_coordinate("not-a-number"), None);
        assert_eq!(parse_coordinate("NaN"), None);
        assert_eq!(parse_coordinate(""), None);
    }
}
