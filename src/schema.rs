//! Response payloads.
//!
//! `ProcessResponse` is the canonical (v1) schema. `LegacyScanResponse` keeps
//! the field names older mobile clients read from `/prescription/scan`.

use serde::{Deserialize, Serialize};

use crate::fields::{self, PrescriptionFields};
use crate::pipeline::ScanOutput;

pub const SCHEMA_VERSION: u32 = 1;

/// Canonical scan result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessResponse {
    pub schema_version: u32,
    /// OCR text exactly as recognized (not lower-cased).
    pub raw_text: String,
    pub extracted: PrescriptionFields,
    pub pages: usize,
}

impl From<ScanOutput> for ProcessResponse {
    fn from(output: ScanOutput) -> Self {
        let extracted = fields::extract_fields(&output.text);
        Self {
            schema_version: SCHEMA_VERSION,
            raw_text: output.text,
            extracted,
            pages: output.pages,
        }
    }
}

/// Legacy Portuguese-keyed result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyScanResponse {
    pub texto: String,
    pub paginas: usize,
    pub medicamento: String,
}

impl From<ScanOutput> for LegacyScanResponse {
    fn from(output: ScanOutput) -> Self {
        let medicamento = fields::medicine_name_fallback(&output.text);
        Self {
            texto: output.text,
            paginas: output.pages,
            medicamento,
        }
    }
}
