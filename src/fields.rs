//! Heuristic prescription field extraction from OCR text.
//!
//! Pure functions, no async. Lines are assigned to fields by substring
//! containment; a line may land in several fields and the last matching
//! line of the document wins for each field.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Partial drug-name stems that mark a line as naming the medicine.
const MEDICINE_STEMS: &[&str] = &["adol", "ben-u-ron", "aspirina", "ibuprof", "paracet"];

const DOSAGE_UNITS: &[&str] = &["mg", "ml"];

const DURATION_KEYWORDS: &[&str] = &["até", "durante"];

/// UTF-8 text that was decoded as Latin-1 somewhere upstream, lower-cased
/// (`Ã` lower-cases to `ã`). Only the Portuguese accented vowels are repaired.
const MOJIBAKE: &[(&str, &str)] = &[
    ("ã¡", "á"),
    ("ã¢", "â"),
    ("ã£", "ã"),
    ("ã§", "ç"),
    ("ã©", "é"),
    ("ãª", "ê"),
    ("ã\u{AD}", "í"),
    ("ã³", "ó"),
    ("ã´", "ô"),
    ("ãµ", "õ"),
    ("ãº", "ú"),
];

/// Fields recognised in a prescription. Unmatched fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionFields {
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub until_when: String,
}

/// Scan `text` line by line and assign lines to fields.
///
/// The input is lower-cased and normalised before matching; returned field
/// values are the normalised, trimmed lines. The caller keeps the original
/// text untouched.
pub fn extract_fields(text: &str) -> PrescriptionFields {
    let normalized = normalize(text);
    let mut fields = PrescriptionFields::default();

    for line in normalized.split('\n').map(str::trim) {
        if DOSAGE_UNITS.iter().any(|unit| line.contains(unit)) {
            fields.dosage = line.to_string();
        }

        // Plain containment, not whole words: "demo" style false positives are expected.
        if line.contains("de") && line.contains("em") {
            fields.frequency = line.to_string();
        }

        if DURATION_KEYWORDS.iter().any(|kw| line.contains(kw)) {
            fields.until_when = line.to_string();
        }

        if MEDICINE_STEMS.iter().any(|stem| line.contains(stem)) {
            fields.medicine_name = line.to_string();
        }
    }

    fields
}

/// Pick a medicine name without a keyword table.
///
/// Candidates are trimmed lines longer than three characters. The first one
/// that is mostly alphabetic (over half its characters, at least four letters)
/// wins; otherwise the first candidate; otherwise an empty string.
pub fn medicine_name_fallback(text: &str) -> String {
    let candidates: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > 3)
        .collect();

    candidates
        .iter()
        .find(|line| is_mostly_alphabetic(line))
        .or_else(|| candidates.first())
        .map(|line| line.to_string())
        .unwrap_or_default()
}

fn is_mostly_alphabetic(line: &str) -> bool {
    let total = line.chars().count();
    let alpha = line.chars().filter(|c| c.is_alphabetic()).count();
    alpha >= 4 && alpha * 2 > total
}

/// Lower-case, compose combining accents (NFC) and undo Latin-1 mojibake.
fn normalize(text: &str) -> String {
    let mut out: String = text.to_lowercase().nfc().collect();
    if out.contains('ã') {
        for (broken, fixed) in MOJIBAKE {
            if out.contains(broken) {
                out = out.replace(broken, fixed);
            }
        }
    }
    out
}
