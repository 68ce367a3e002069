//! Reading and writing result collections: the JSON export, a CSV table with
//! one student per row, and a flat CSV with one subject per row.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};
use crate::record::{StudentRecord, SubjectRecord};

pub const ROLL_COLUMNS: [&str; 2] = ["roll_number", "Roll No"];
const SUBJECTS_COLUMN: &str = "Subjects";
const TABLE_HEADERS: [&str; 6] = [
    "Roll No",
    "Student Name",
    "Student Type",
    "Grand Total",
    "Status",
    SUBJECTS_COLUMN,
];
const FLAT_HEADERS: [&str; 13] = [
    "Roll No",
    "Student Name",
    "Student Type",
    "Grand Total",
    "Status",
    "Subject",
    "Theory-I",
    "Theory-II",
    "Practical",
    "Total",
    "Percentile Marks",
    "Relative Grade",
    "Remarks",
];

pub fn to_json(records: &[StudentRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn from_json(json: &str) -> Result<Vec<StudentRecord>> {
    let records: Vec<StudentRecord> = serde_json::from_str(json)?;
    Ok(keep_valid(records))
}

pub fn write_json(records: &[StudentRecord], path: impl AsRef<Path>) -> Result<()> {
    fs::write(path, to_json(records)?)?;
    Ok(())
}

/// Load a collection from a `.json` export or a `.csv` table.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<StudentRecord>> {
    let path = path.as_ref();
    if is_csv(path) {
        read_table(fs::File::open(path)?)
    } else {
        from_json(&fs::read_to_string(path)?)
    }
}

/// One student per row; the `Subjects` cell holds the subjects as JSON.
pub fn write_table<W: Write>(records: &[StudentRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(TABLE_HEADERS)?;
    for r in records {
        let subjects = serde_json::to_string(&r.subjects)?;
        wtr.write_record([
            r.roll_no.as_str(),
            r.student_name.as_str(),
            r.student_type.as_str(),
            r.grand_total.as_str(),
            r.status.as_str(),
            subjects.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a table written by [`write_table`] or an equivalent spreadsheet
/// export. The roll number column may be `Roll No` or `roll_number`.
///
/// `Subjects` cells must hold JSON. Rows whose cell does not parse, such as
/// lists dumped with single quotes, are skipped with a warning.
pub fn read_table<R: Read>(reader: R) -> Result<Vec<StudentRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let roll_col = ROLL_COLUMNS
        .iter()
        .find_map(|c| column(*c))
        .ok_or(ScrapeError::MissingRollColumn)?;
    let subjects_col = column(SUBJECTS_COLUMN).ok_or(ScrapeError::MissingSubjectsColumn)?;
    let name_col = column("Student Name");
    let type_col = column("Student Type");
    let total_col = column("Grand Total");
    let status_col = column("Status");

    let mut records = vec![];
    for (idx, row) in rdr.records().enumerate() {
        let row = row?;
        let cell = |col: Option<usize>| {
            col.and_then(|c| row.get(c))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        let subjects_cell = cell(Some(subjects_col));
        let subjects: Vec<SubjectRecord> = if subjects_cell.is_empty() {
            vec![]
        } else {
            match serde_json::from_str(&subjects_cell) {
                Ok(subjects) => subjects,
                Err(e) => {
                    warn!(row = idx + 1, error = %e, "skipping row with unreadable Subjects");
                    continue;
                }
            }
        };

        records.push(StudentRecord {
            roll_no: normalize_roll(&cell(Some(roll_col))),
            student_name: cell(name_col),
            student_type: cell(type_col),
            grand_total: cell(total_col),
            status: cell(status_col),
            subjects,
        });
    }
    Ok(keep_valid(records))
}

/// One subject per row with the student's fields repeated.
pub fn write_flat<W: Write>(records: &[StudentRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(FLAT_HEADERS)?;
    for r in records {
        for s in &r.subjects {
            wtr.write_record([
                r.roll_no.as_str(),
                r.student_name.as_str(),
                r.student_type.as_str(),
                r.grand_total.as_str(),
                r.status.as_str(),
                s.subject.as_str(),
                s.theory_i.as_str(),
                s.theory_ii.as_str(),
                s.practical.as_str(),
                s.total.as_str(),
                s.percentile_marks.as_deref().unwrap_or_default(),
                s.relative_grade.as_deref().unwrap_or_default(),
                s.remarks.as_deref().unwrap_or_default(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Roll numbers listed in an uploaded `.csv` or `.json` table, in row order.
pub fn roll_ids_from_table(path: impl AsRef<Path>) -> Result<Vec<u64>> {
    let path = path.as_ref();
    if is_csv(path) {
        roll_ids_from_csv(fs::File::open(path)?)
    } else {
        roll_ids_from_json(&fs::read_to_string(path)?)
    }
}

pub fn roll_ids_from_csv<R: Read>(reader: R) -> Result<Vec<u64>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let col = ROLL_COLUMNS
        .iter()
        .find_map(|c| headers.iter().position(|h| h.trim() == *c))
        .ok_or(ScrapeError::MissingRollColumn)?;

    let mut rolls = vec![];
    for (idx, row) in rdr.records().enumerate() {
        let row = row?;
        let raw = row.get(col).unwrap_or_default();
        rolls.push(parse_roll(raw).ok_or_else(|| bad_roll(idx, raw))?);
    }
    Ok(rolls)
}

pub fn roll_ids_from_json(json: &str) -> Result<Vec<u64>> {
    let rows: Vec<serde_json::Map<String, Value>> = serde_json::from_str(json)?;
    let Some(key) = ROLL_COLUMNS
        .iter()
        .find(|c| rows.iter().any(|row| row.contains_key(**c)))
    else {
        return Err(ScrapeError::MissingRollColumn);
    };

    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let raw = match row.get(*key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            parse_roll(&raw).ok_or_else(|| bad_roll(idx, &raw))
        })
        .collect()
}

fn keep_valid(records: Vec<StudentRecord>) -> Vec<StudentRecord> {
    let total = records.len();
    let valid = records
        .into_iter()
        .filter(StudentRecord::is_valid)
        .collect::<Vec<_>>();
    if valid.len() < total {
        debug!(dropped = total - valid.len(), "dropped records without a roll number");
    }
    valid
}

// Spreadsheets like to turn 103683 into 103683.0.
fn normalize_roll(raw: &str) -> String {
    match raw.strip_suffix(".0") {
        Some(int) if !int.is_empty() && int.bytes().all(|b| b.is_ascii_digit()) => int.to_string(),
        _ => raw.to_string(),
    }
}

fn parse_roll(raw: &str) -> Option<u64> {
    normalize_roll(raw.trim()).parse().ok()
}

fn bad_roll(idx: usize, raw: &str) -> ScrapeError {
    ScrapeError::BadRow {
        row: idx + 1,
        reason: format!("roll number '{raw}' is not an integer"),
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}
