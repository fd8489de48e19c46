//! Upload Descriptor (`spec.md` §3). The upload endpoint and its
//! type/encoding sniffing are an explicit non-goal of `spec.md` §1; this
//! type is the opaque contract the engine consumes, produced by the
//! minimal stand-in sniffer in `crate::upload_store`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectedEncoding {
    Utf8,
    Latin1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecimalMark {
    Dot,
    Comma,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDescriptor {
    pub file_id: String,
    pub original_name: String,
    pub byte_size: u64,
    pub encoding: DetectedEncoding,
    pub separator: u8,
    pub decimal_mark: DecimalMark,
    pub columns: Vec<String>,
    pub row_count: usize,
}

impl UploadDescriptor {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}
