//! Upload Store (`spec.md` §1 non-goal seam, §3 `UploadDescriptor`).
//!
//! Persists an uploaded tabular file to `UPLOAD_DIR` and produces a
//! best-effort `UploadDescriptor` by sniffing its separator, character
//! encoding, and decimal mark. `spec.md` explicitly scopes upload
//! handling and format sniffing out as a non-goal; this module is the
//! minimal stand-in the rest of the engine needs to have something
//! concrete to consume, not a production-grade sniffer (see
//! `SPEC_FULL.md` §9). Grounded on the teacher pack's ingestion server
//! (`other_examples` sinyalist backend) for the "stream multipart bytes
//! to a named file, then inspect it" shape.

use std::path::PathBuf;

use encoding_rs::{UTF_8, WINDOWS_1252};
use uuid::Uuid;

use crate::error::ApiError;
use crate::model::upload::{DecimalMark, DetectedEncoding, UploadDescriptor};

const SNIFF_WINDOW_BYTES: usize = 64 * 1024;
const CANDIDATE_SEPARATORS: [u8; 3] = [b',', b';', b'\t'];

pub struct UploadStore {
    upload_dir: PathBuf,
}

impl UploadStore {
    pub fn new(upload_dir: PathBuf) -> Self {
        Self { upload_dir }
    }

    pub fn path_for(&self, file_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{file_id}.csv"))
    }

    /// Writes `bytes` under a fresh file id and returns the descriptor that
    /// the rest of the engine treats as opaque (`spec.md` §3).
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<UploadDescriptor, ApiError> {
        let file_id = Uuid::new_v4().to_string();
        let path = self.path_for(&file_id);

        tokio::fs::write(&path, bytes).await?;

        let window = &bytes[..bytes.len().min(SNIFF_WINDOW_BYTES)];
        let encoding = sniff_encoding(window);
        let decoded = decode(window, encoding);
        let separator = sniff_separator(&decoded);
        let decimal_mark = sniff_decimal_mark(&decoded, separator);
        let columns = sniff_columns(&decoded, separator);
        let row_count = count_data_rows(&decoded);

        Ok(UploadDescriptor {
            file_id,
            original_name: original_name.to_string(),
            byte_size: bytes.len() as u64,
            encoding,
            separator,
            decimal_mark,
            columns,
            row_count,
        })
    }

    pub fn resolve(&self, file_id: &str) -> Result<PathBuf, ApiError> {
        let path = self.path_for(file_id);
        if !path.exists() {
            return Err(ApiError::NotFound(format!("upload {file_id}")));
        }
        Ok(path)
    }
}

fn sniff_encoding(window: &[u8]) -> DetectedEncoding {
    match std::str::from_utf8(window) {
        Ok(_) => DetectedEncoding::Utf8,
        Err(_) => DetectedEncoding::Latin1,
    }
}

fn decode(window: &[u8], encoding: DetectedEncoding) -> String {
    let decoder = match encoding {
        DetectedEncoding::Utf8 => UTF_8,
        DetectedEncoding::Latin1 => WINDOWS_1252,
    };
    decoder.decode(window).0.into_owned()
}

/// Picks whichever candidate separator appears most consistently across the
/// sniff window's first lines. Falls back to comma when nothing is
/// conclusive.
fn sniff_separator(text: &str) -> u8 {
    let sample_lines: Vec<&str> = text.lines().take(5).collect();
    if sample_lines.is_empty() {
        return b',';
    }

    CANDIDATE_SEPARATORS
        .into_iter()
        .max_by_key(|sep| {
            let counts: Vec<usize> = sample_lines
                .iter()
                .map(|line| line.bytes().filter(|b| b == sep).count())
                .collect();
            let first = counts[0];
            if first > 0 && counts.iter().all(|c| *c == first) {
                first
            } else {
                0
            }
        })
        .unwrap_or(b',')
}

/// A decimal mark of `,` only makes sense when the field separator is not
/// itself a comma (`spec.md` §9 design note on decimal-mark sniffing).
fn sniff_decimal_mark(text: &str, separator: u8) -> DecimalMark {
    if separator == b',' {
        return DecimalMark::Dot;
    }
    let looks_comma_decimal = text
        .lines()
        .skip(1)
        .take(10)
        .any(|line| line.split(separator as char).any(|field| is_comma_decimal(field)));
    if looks_comma_decimal {
        DecimalMark::Comma
    } else {
        DecimalMark::Dot
    }
}

fn is_comma_decimal(field: &str) -> bool {
    let field = field.trim();
    let mut parts = field.splitn(2, ',');
    match (parts.next(), parts.next()) {
        (Some(whole), Some(frac)) => {
            !frac.is_empty()
                && whole.chars().all(|c| c.is_ascii_digit() || c == '-')
                && frac.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn sniff_columns(text: &str, separator: u8) -> Vec<String> {
    text.lines()
        .next()
        .map(|header| header.split(separator as char).map(|c| c.trim().to_string()).collect())
        .unwrap_or_default()
}

fn count_data_rows(text: &str) -> usize {
    text.lines().skip(1).filter(|line| !line.trim().is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_sniffs_a_comma_separated_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf());
        let bytes = b"origin_lat,origin_lon,dest_lat,dest_lon\n48.85,2.35,48.87,2.29\n";

        let descriptor = store.store("trips.csv", bytes).await.unwrap();

        assert_eq!(descriptor.separator, b',');
        assert_eq!(descriptor.encoding, DetectedEncoding::Utf8);
        assert_eq!(descriptor.columns, vec!["origin_lat", "origin_lon", "dest_lat", "dest_lon"]);
        assert_eq!(descriptor.row_count, 1);
        assert!(store.resolve(&descriptor.file_id).is_ok());
    }

    #[tokio::test]
    async fn sniffs_semicolon_separator_and_comma_decimal_mark() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf());
        let bytes = "lat;lon\n48,85;2,35\n48,87;2,29\n".as_bytes();

        let descriptor = store.store("trips_fr.csv", bytes).await.unwrap();

        assert_eq!(descriptor.separator, b';');
        assert_eq!(descriptor.decimal_mark, DecimalMark::Comma);
        assert_eq!(descriptor.row_count, 2);
    }

    #[tokio::test]
    async fn unresolved_file_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().to_path_buf());
        assert!(store.resolve("does-not-exist").is_err());
    }
}
