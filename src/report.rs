use askama::Template;

use crate::aggregate::{AggregateReport, StatusCount, SubjectSpread, PASS, RE_APPEAR};
use crate::error::Result;

#[derive(Debug)]
pub struct BucketRow {
    pub subject: String,
    pub counts: Vec<usize>,
}

#[derive(Debug)]
pub struct AverageRow {
    pub rank: usize,
    pub subject: String,
    pub average: String,
}

#[derive(Debug)]
pub struct SpreadRow {
    pub subject: String,
    pub count: usize,
    pub mean: String,
    pub min: i64,
    pub q1: String,
    pub median: String,
    pub q3: String,
    pub max: i64,
}

#[derive(Debug)]
pub struct GroupSection {
    pub name: String,
    pub rows: Vec<SpreadRow>,
}

#[derive(Debug, Template)]
#[template(path = "report.md.j2", escape = "none")]
pub struct MarkdownReport {
    pub total_students: usize,
    pub passed: usize,
    pub reappear: usize,
    pub pass_percent: String,
    pub reappear_percent: String,
    pub other_statuses: Vec<StatusCount>,
    pub bucket_labels: Vec<String>,
    pub rows: Vec<BucketRow>,
    pub averages: Vec<AverageRow>,
    pub group: Option<GroupSection>,
    pub insights: Vec<String>,
}

impl MarkdownReport {
    pub fn new(report: &AggregateReport) -> Self {
        let overview = report.overview();
        Self {
            total_students: overview.total_students,
            passed: overview.passed,
            reappear: overview.reappear,
            pass_percent: format!("{:.1}", overview.pass_percent),
            reappear_percent: format!("{:.1}", overview.reappear_percent),
            other_statuses: report
                .status_counts
                .iter()
                .filter(|s| s.label != PASS && s.label != RE_APPEAR)
                .cloned()
                .collect(),
            bucket_labels: report.bucket_labels.clone(),
            rows: report
                .bucket_counts
                .iter()
                .map(|b| BucketRow {
                    subject: b.subject.clone(),
                    counts: b.counts.clone(),
                })
                .collect(),
            averages: report
                .subject_averages
                .iter()
                .enumerate()
                .map(|(i, a)| AverageRow {
                    rank: i + 1,
                    subject: a.subject.clone(),
                    average: format!("{:.1}", a.average),
                })
                .collect(),
            group: None,
            insights: insights(report),
        }
    }

    /// Add a box-plot style table for one subject group.
    pub fn with_group(mut self, name: &str, spreads: &[SubjectSpread]) -> Self {
        self.group = Some(GroupSection {
            name: name.to_string(),
            rows: spreads
                .iter()
                .map(|s| SpreadRow {
                    subject: s.subject.clone(),
                    count: s.count,
                    mean: format!("{:.1}", s.mean),
                    min: s.min,
                    q1: format!("{:.1}", s.q1),
                    median: format!("{:.1}", s.median),
                    q3: format!("{:.1}", s.q3),
                    max: s.max,
                })
                .collect(),
        });
        self
    }

    pub fn to_markdown(&self) -> Result<String> {
        Ok(self.render()?)
    }
}

fn insights(report: &AggregateReport) -> Vec<String> {
    let mut out = vec![];

    let top = report
        .subject_averages
        .iter()
        .take(2)
        .map(|a| format!("**{}**", title_case(&a.subject)))
        .collect::<Vec<_>>();
    if !top.is_empty() {
        out.push(format!(
            "Subjects like {} have the highest average scores.",
            top.join(" and ")
        ));
    }

    let lowest = report.bucket_labels.len().saturating_sub(1);
    let mut failing = report
        .bucket_counts
        .iter()
        .filter(|b| b.counts.get(lowest).is_some_and(|&c| c > 0))
        .collect::<Vec<_>>();
    failing.sort_by(|a, b| b.counts[lowest].cmp(&a.counts[lowest]));
    if !failing.is_empty() {
        let names = failing
            .iter()
            .take(3)
            .map(|b| format!("**{}** ({})", title_case(&b.subject), b.counts[lowest]))
            .collect::<Vec<_>>();
        out.push(format!(
            "Most scores below 40: {}, indicating difficulty or low performance.",
            names.join(", ")
        ));
    }

    let overview = report.overview();
    if overview.total_students > 0 {
        out.push(format!(
            "Overall, **{:.1}%** of students passed while **{:.1}%** need to reappear.",
            overview.pass_percent, overview.reappear_percent
        ));
    }
    out
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, AggregateOptions};
    use crate::record::{StudentRecord, SubjectRecord};

    fn student(status: &str, marks: &[(&str, &str)]) -> StudentRecord {
        StudentRecord {
            roll_no: "1".into(),
            status: status.into(),
            subjects: marks
                .iter()
                .map(|(subject, total)| SubjectRecord {
                    subject: subject.to_string(),
                    total: total.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn report() -> AggregateReport {
        let records = vec![
            student("PASS", &[("GENERAL SCIENCE", "96"), ("MATHEMATICS", "35")]),
            student("PASS", &[("GENERAL SCIENCE", "88"), ("MATHEMATICS", "71")]),
            student("RE-APPEAR", &[("EDUCATION", "91"), ("MATHEMATICS", "12")]),
            student("WITHHELD", &[]),
        ];
        aggregate(&records, AggregateOptions::default())
    }

    #[test]
    fn render_report_should_work() {
        let md = MarkdownReport::new(&report()).to_markdown().unwrap();

        assert!(md.starts_with("# Examination Report Summary"));
        assert!(md.contains("- **Pass**: 2 students"));
        assert!(md.contains("- **Reappear**: 1 students"));
        assert!(md.contains("- **WITHHELD**: 1 students"));
        assert!(md.contains("- **Pass Percentage**: 50.0%"));
        assert!(md.contains("| Subject | 95+ | 90-94 | 85-89 |"));
        assert!(md.contains("| GENERAL SCIENCE | 1 | 0 | 1 | 0 | 0 | 0 | 0 | 0 | 0 | 0 |"));
        assert!(md.contains("| MATHEMATICS | 0 | 0 | 0 | 0 | 0 | 1 | 0 | 0 | 0 | 2 |"));
        assert!(md.contains("| 1 | GENERAL SCIENCE | 92.0 |"));
        assert!(md.contains("Subjects like **General Science** and **Education**"));
        assert!(md.contains("**Mathematics** (2)"));
        assert!(!md.contains("Subject Group"));
    }

    #[test]
    fn render_group_should_work() {
        let report = report();
        let spreads = report.group_spread(&["MATHEMATICS", "GENERAL SCIENCE", "ISLAMIAT"]);
        let md = MarkdownReport::new(&report)
            .with_group("Math, General Science, Islamiat, Elective", &spreads)
            .to_markdown()
            .unwrap();

        assert!(md.contains("## Subject Group: Math, General Science, Islamiat, Elective"));
        assert!(md.contains("| GENERAL SCIENCE | 2 | 92.0 | 88 | 90.0 | 92.0 | 94.0 | 96 |"));
        assert!(md.contains("| MATHEMATICS | 3 | 39.3 | 12 | 23.5 | 35.0 | 53.0 | 71 |"));
    }

    #[test]
    fn title_case_should_work() {
        assert_eq!(title_case("FOOD AND  NUTRITION"), "Food And Nutrition");
        assert_eq!(title_case(""), "");
    }
}
