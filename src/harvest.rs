//! Pulling roll numbers out of OCR'd notice boards and gazettes.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

pub const ROLL_DIGITS: usize = 6;

#[derive(Debug, Default, Deserialize)]
struct OcrDocument {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    pages: Vec<OcrPage>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrPage {
    #[serde(default)]
    markdown: String,
}

/// Every standalone six-digit number in `text`, in order of appearance.
/// Digits glued to letters or to longer digit runs do not count.
pub fn harvest_rolls(text: &str) -> Vec<u64> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| word.len() == ROLL_DIGITS && word.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|word| word.parse().ok())
        .collect()
}

/// Harvest from an OCR result: its top-level `markdown` and every page's.
pub fn harvest_ocr_json(json: &str) -> Result<Vec<u64>> {
    let doc: OcrDocument = serde_json::from_str(json)?;
    let mut rolls = harvest_rolls(&doc.markdown);
    for page in &doc.pages {
        rolls.extend(harvest_rolls(&page.markdown));
    }
    Ok(rolls)
}

/// `.json` files are read as OCR results, anything else as plain text.
pub fn harvest_file(path: impl AsRef<Path>) -> Result<Vec<u64>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        harvest_ocr_json(&content)
    } else {
        Ok(harvest_rolls(&content))
    }
}
