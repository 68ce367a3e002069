//! Turning a result detail page into a [`StudentRecord`].
//!
//! The page has no key/value structure: a field is a text fragment starting
//! with its label ("ROLL NO", "STATUS", ...) and the value is whatever element
//! comes next in document order. That lookup, and reading the first table, is
//! behind [`MarkupTree`] so a different page layout only needs a new tree.

use html5ever::tree_builder::TreeSink;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::error::{Result, ScrapeError};
use crate::record::{StudentRecord, SubjectRecord};

pub const ROLL_NO: &str = "ROLL NO";
pub const STUDENT_NAME: &str = "STUDENT NAME";
pub const STUDENT_TYPE: &str = "STUDENT TYPE";
pub const GRAND_TOTAL: &str = "GRAND TOTAL";
pub const STATUS: &str = "STATUS";

const SUBJECT: &str = "SUBJECT";
const THEORY_I: &str = "THEORY-I";
const THEORY_II: &str = "THEORY-II";
const PRACTICAL: &str = "PRACTICAL";
const TOTAL: &str = "TOTAL";
const PERCENTILE_MARKS: &str = "PERCENTILE MARKS";
const RELATIVE_GRADE: &str = "RELATIVE GRADE";
const REMARKS: &str = "REMARKS";

/// The first table of a page: header cells of its first row, data cells of the rest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The two things the extractor needs from a parsed page.
pub trait MarkupTree {
    /// Text of the first element after the first text fragment that starts
    /// with `label` (case-insensitive). `None` when no fragment matches.
    fn value_after_label(&self, label: &str) -> Option<String>;

    /// The first table in the document, if any.
    fn first_table(&self) -> Option<RawTable>;
}

/// [`MarkupTree`] over an html5ever document, with scripts and styles removed.
pub struct HtmlTree {
    html: Html,
    table: Selector,
    row: Selector,
    header_cell: Selector,
    data_cell: Selector,
}

impl HtmlTree {
    pub fn parse(markup: &str) -> Result<Self> {
        let mut html = Html::parse_document(markup);

        let hidden = selector("script, style, noscript, template")?;
        let ids = html.select(&hidden).map(|el| el.id()).collect::<Vec<_>>();
        for id in ids {
            html.remove_from_parent(&id);
        }

        Ok(Self {
            html,
            table: selector("table")?,
            row: selector("tr")?,
            header_cell: selector("th")?,
            data_cell: selector("td")?,
        })
    }

    fn cell_texts(&self, row: ElementRef, cell: &Selector) -> Vec<String> {
        row.select(cell).map(|c| element_text(&c)).collect()
    }
}

impl MarkupTree for HtmlTree {
    fn value_after_label(&self, label: &str) -> Option<String> {
        let label = label.to_lowercase();
        let mut nodes = self.html.tree.root().descendants();
        nodes.by_ref().find(|node| match node.value() {
            Node::Text(text) => text.trim_start().to_lowercase().starts_with(&label),
            _ => false,
        })?;
        nodes.find_map(ElementRef::wrap).map(|el| element_text(&el))
    }

    fn first_table(&self) -> Option<RawTable> {
        let table = self.html.select(&self.table).next()?;
        let mut rows = table.select(&self.row);
        let Some(first) = rows.next() else {
            return Some(RawTable::default());
        };
        Some(RawTable {
            headers: self.cell_texts(first, &self.header_cell),
            rows: rows.map(|row| self.cell_texts(row, &self.data_cell)).collect(),
        })
    }
}

/// Parse one result page.
pub fn extract(markup: &str) -> Result<StudentRecord> {
    let tree = HtmlTree::parse(markup)?;
    Ok(extract_from(&tree))
}

/// Build a record from any tree. Missing labels give empty fields and a
/// missing table gives no subjects; neither is an error.
pub fn extract_from(tree: &impl MarkupTree) -> StudentRecord {
    let field = |label: &str| tree.value_after_label(label).unwrap_or_default();

    StudentRecord {
        roll_no: field(ROLL_NO),
        student_name: field(STUDENT_NAME),
        student_type: field(STUDENT_TYPE),
        grand_total: field(GRAND_TOTAL),
        status: field(STATUS),
        subjects: tree.first_table().map(parse_subjects).unwrap_or_default(),
    }
}

fn parse_subjects(table: RawTable) -> Vec<SubjectRecord> {
    let headers = table
        .headers
        .iter()
        .map(|h| h.trim().to_uppercase())
        .collect::<Vec<_>>();
    let has_percentile = headers.iter().any(|h| h == PERCENTILE_MARKS);

    let mut subjects = vec![];
    for (idx, cells) in table.rows.into_iter().enumerate() {
        if cells.len() != headers.len() {
            debug!(
                row = idx + 1,
                cells = cells.len(),
                headers = headers.len(),
                "skipping table row with mismatched cell count"
            );
            continue;
        }

        let get = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .map(|i| cells[i].clone())
                .unwrap_or_default()
        };
        let optional = |name: &str| {
            let value = get(name);
            (has_percentile && !value.is_empty()).then_some(value)
        };

        let subject = get(SUBJECT);
        if subject.is_empty() {
            continue;
        }
        subjects.push(SubjectRecord {
            subject,
            theory_i: get(THEORY_I),
            theory_ii: get(THEORY_II),
            practical: get(PRACTICAL),
            total: get(TOTAL),
            percentile_marks: optional(PERCENTILE_MARKS),
            relative_grade: optional(RELATIVE_GRADE),
            remarks: optional(REMARKS),
        });
    }
    subjects
}

fn element_text(el: &ElementRef) -> String {
    el.text().map(str::trim).collect()
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|_| ScrapeError::Selector(s.to_string()))
}
