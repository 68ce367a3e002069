use serde::{Deserialize, Deserializer, Serialize};

/// One student's result, as read from a result detail page.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(rename = "Roll No", default, deserialize_with = "lenient_string")]
    pub roll_no: String,
    #[serde(rename = "Student Name", default, deserialize_with = "lenient_string")]
    pub student_name: String,
    #[serde(rename = "Student Type", default, deserialize_with = "lenient_string")]
    pub student_type: String,
    #[serde(rename = "Grand Total", default, deserialize_with = "lenient_string")]
    pub grand_total: String,
    #[serde(rename = "Status", default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(rename = "Subjects", default)]
    pub subjects: Vec<SubjectRecord>,
}

/// One row of the subject table.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    #[serde(rename = "Subject", default, deserialize_with = "lenient_string")]
    pub subject: String,
    #[serde(rename = "Theory-I", default, deserialize_with = "lenient_string")]
    pub theory_i: String,
    #[serde(rename = "Theory-II", default, deserialize_with = "lenient_string")]
    pub theory_ii: String,
    #[serde(rename = "Practical", default, deserialize_with = "lenient_string")]
    pub practical: String,
    #[serde(rename = "Total", default, deserialize_with = "lenient_string")]
    pub total: String,
    #[serde(
        rename = "Percentile Marks",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub percentile_marks: Option<String>,
    #[serde(
        rename = "Relative Grade",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub relative_grade: Option<String>,
    #[serde(rename = "Remarks", default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl StudentRecord {
    /// A record is kept only when the page actually named a roll number.
    pub fn is_valid(&self) -> bool {
        !self.roll_no.is_empty()
    }

    /// Nothing at all was recognized on the page.
    pub fn is_blank(&self) -> bool {
        self.roll_no.is_empty()
            && self.student_name.is_empty()
            && self.student_type.is_empty()
            && self.grand_total.is_empty()
            && self.status.is_empty()
            && self.subjects.is_empty()
    }
}

impl SubjectRecord {
    /// The subject total as an integer score, if it is one.
    pub fn score(&self) -> Option<i64> {
        self.total.trim().parse().ok()
    }
}

/// Accepts strings, numbers and null; exports from spreadsheet tools are not
/// consistent about which one a roll number or a mark comes back as.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Str(s)) => s,
        Some(Raw::Int(n)) => n.to_string(),
        Some(Raw::Float(f)) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
        Some(Raw::Float(f)) => f.to_string(),
        None => String::new(),
    })
}
