//! Pass/fail tallies, score buckets and subject averages over a set of results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::record::StudentRecord;

pub const PASS: &str = "PASS";
pub const RE_APPEAR: &str = "RE-APPEAR";

/// Predefined subject groups for side-by-side comparison.
pub const SUBJECT_GROUPS: &[(&str, &[&str])] = &[
    (
        "Math, Physics, Chemistry, Biology",
        &["MATHEMATICS", "PHYSICS", "CHEMISTRY", "BIOLOGY"],
    ),
    (
        "Math, Physics, Chemistry, CS",
        &["MATHEMATICS", "PHYSICS", "CHEMISTRY", "COMPUTER SCIENCE"],
    ),
    (
        "Math, General Science, Islamiat, Elective",
        &["MATHEMATICS", "GENERAL SCIENCE", "ISLAMIAT", "ELECTIVE"],
    ),
    (
        "Math, General Science, Physical Education",
        &["MATHEMATICS", "GENERAL SCIENCE", "PHYSICAL EDUCATION"],
    ),
    (
        "Math, General Science, Food and Nutrition",
        &["MATHEMATICS", "GENERAL SCIENCE", "FOOD AND NUTRITION"],
    ),
    (
        "Math, General Science, Clothing and Textile",
        &["MATHEMATICS", "GENERAL SCIENCE", "CLOTHING AND TEXTILE"],
    ),
];

/// A score interval `[min, next bucket's min)`; the last bucket has no lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub label: &'static str,
    pub min: Option<i64>,
}

const FINE: &[Bucket] = &[
    Bucket { label: "95+", min: Some(95) },
    Bucket { label: "90-94", min: Some(90) },
    Bucket { label: "85-89", min: Some(85) },
    Bucket { label: "80-84", min: Some(80) },
    Bucket { label: "75-79", min: Some(75) },
    Bucket { label: "70-74", min: Some(70) },
    Bucket { label: "60-69", min: Some(60) },
    Bucket { label: "50-59", min: Some(50) },
    Bucket { label: "40-49", min: Some(40) },
    Bucket { label: "<40", min: None },
];

const COARSE: &[Bucket] = &[
    Bucket { label: "90+", min: Some(90) },
    Bucket { label: "80-89", min: Some(80) },
    Bucket { label: "70-79", min: Some(70) },
    Bucket { label: "60-69", min: Some(60) },
    Bucket { label: "50-59", min: Some(50) },
    Bucket { label: "40-49", min: Some(40) },
    Bucket { label: "<40", min: None },
];

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BucketScheme {
    /// Five-point bands above 70, ten-point bands below.
    #[default]
    Fine,
    /// Ten-point bands throughout.
    Coarse,
}

impl BucketScheme {
    /// Buckets from the highest threshold down.
    pub fn buckets(self) -> &'static [Bucket] {
        match self {
            Self::Fine => FINE,
            Self::Coarse => COARSE,
        }
    }

    pub fn labels(self) -> Vec<&'static str> {
        self.buckets().iter().map(|b| b.label).collect()
    }

    /// Index of the first bucket, highest threshold first, that `score` falls in.
    pub fn classify(self, score: i64) -> usize {
        let buckets = self.buckets();
        buckets
            .iter()
            .position(|b| b.min.map_or(true, |min| score >= min))
            .unwrap_or(buckets.len() - 1)
    }

    pub fn label_for(self, score: i64) -> &'static str {
        self.buckets()[self.classify(score)].label
    }
}

/// What to do with a status that is neither PASS nor RE-APPEAR.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UnknownStatus {
    /// Tally it under its own label; its first occurrence counts as 1.
    #[default]
    Count,
    /// Leave it out of the tally and list it separately.
    Ignore,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOptions {
    pub scheme: BucketScheme,
    pub unknown_status: UnknownStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub label: String,
    pub count: usize,
}

/// Bucket counts of one subject, aligned with [`AggregateReport::bucket_labels`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectBuckets {
    pub subject: String,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub subject: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectScores {
    pub subject: String,
    pub scores: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_students: usize,
    pub passed: usize,
    pub reappear: usize,
    pub pass_percent: f64,
    pub reappear_percent: f64,
}

/// Box-plot style summary of one subject's scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectSpread {
    pub subject: String,
    pub count: usize,
    pub mean: f64,
    pub min: i64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub scheme: BucketScheme,
    /// PASS and RE-APPEAR first, other labels in order of first sight.
    pub status_counts: Vec<StatusCount>,
    /// Labels left out under [`UnknownStatus::Ignore`].
    pub ignored_statuses: Vec<StatusCount>,
    pub bucket_labels: Vec<String>,
    /// Subjects in order of first sight; only subjects with a numeric score.
    pub bucket_counts: Vec<SubjectBuckets>,
    /// Highest average first; ties keep order of first sight.
    pub subject_averages: Vec<SubjectAverage>,
    pub subject_scores: Vec<SubjectScores>,
}

/// Recompute every statistic from `records`.
pub fn aggregate(records: &[StudentRecord], options: AggregateOptions) -> AggregateReport {
    let scheme = options.scheme;
    let mut statuses = Tally::with_labels(&[PASS, RE_APPEAR]);
    let mut ignored = Tally::default();
    let mut subject_index: HashMap<&str, usize> = HashMap::new();
    let mut scores: Vec<SubjectScores> = vec![];
    let mut buckets: Vec<SubjectBuckets> = vec![];

    for record in records {
        let status = normalize_status(&record.status);
        match options.unknown_status {
            UnknownStatus::Ignore if !statuses.contains(&status) => ignored.add(status),
            _ => statuses.add(status),
        }

        for subject in &record.subjects {
            let Some(score) = subject.score() else {
                continue;
            };
            let idx = *subject_index
                .entry(subject.subject.as_str())
                .or_insert_with(|| {
                    scores.push(SubjectScores {
                        subject: subject.subject.clone(),
                        scores: vec![],
                    });
                    buckets.push(SubjectBuckets {
                        subject: subject.subject.clone(),
                        counts: vec![0; scheme.buckets().len()],
                    });
                    scores.len() - 1
                });
            scores[idx].scores.push(score);
            buckets[idx].counts[scheme.classify(score)] += 1;
        }
    }

    let mut subject_averages = scores
        .iter()
        .map(|s| SubjectAverage {
            subject: s.subject.clone(),
            average: mean(&s.scores),
        })
        .collect::<Vec<_>>();
    // `sort_by` is stable, so equal averages keep discovery order.
    subject_averages.sort_by(|a, b| b.average.total_cmp(&a.average));

    AggregateReport {
        scheme,
        status_counts: statuses.into_counts(),
        ignored_statuses: ignored.into_counts(),
        bucket_labels: scheme.labels().into_iter().map(String::from).collect(),
        bucket_counts: buckets,
        subject_averages,
        subject_scores: scores,
    }
}

/// Trimmed, upper-cased status; an empty status counts as RE-APPEAR.
pub fn normalize_status(status: &str) -> String {
    let status = status.trim().to_uppercase();
    if status.is_empty() {
        RE_APPEAR.to_string()
    } else {
        status
    }
}

impl AggregateReport {
    pub fn status_count(&self, label: &str) -> usize {
        self.status_counts
            .iter()
            .find(|s| s.label == label)
            .map_or(0, |s| s.count)
    }

    pub fn bucket_count(&self, subject: &str, bucket: &str) -> Option<usize> {
        let col = self.bucket_labels.iter().position(|l| l == bucket)?;
        self.bucket_counts
            .iter()
            .find(|b| b.subject == subject)
            .map(|b| b.counts[col])
    }

    pub fn average(&self, subject: &str) -> Option<f64> {
        self.subject_averages
            .iter()
            .find(|a| a.subject == subject)
            .map(|a| a.average)
    }

    pub fn scores(&self, subject: &str) -> Option<&[i64]> {
        self.subject_scores
            .iter()
            .find(|s| s.subject == subject)
            .map(|s| s.scores.as_slice())
    }

    pub fn overview(&self) -> Overview {
        let total_students = self.status_counts.iter().map(|s| s.count).sum::<usize>();
        let passed = self.status_count(PASS);
        let reappear = self.status_count(RE_APPEAR);
        Overview {
            total_students,
            passed,
            reappear,
            pass_percent: percent(passed, total_students),
            reappear_percent: percent(reappear, total_students),
        }
    }

    /// Spread of each subject in `group` that has scores, highest mean first.
    pub fn group_spread(&self, group: &[&str]) -> Vec<SubjectSpread> {
        let mut spreads = group
            .iter()
            .filter_map(|subject| self.scores(subject).map(|s| spread(subject, s)))
            .collect::<Vec<_>>();
        spreads.sort_by(|a, b| b.mean.total_cmp(&a.mean));
        spreads
    }
}

/// Look up a predefined subject group by name, ignoring case.
pub fn subject_group(name: &str) -> Option<&'static [&'static str]> {
    SUBJECT_GROUPS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, subjects)| *subjects)
}

#[derive(Default)]
struct Tally {
    counts: Vec<StatusCount>,
}

impl Tally {
    fn with_labels(labels: &[&str]) -> Self {
        Self {
            counts: labels
                .iter()
                .map(|l| StatusCount {
                    label: l.to_string(),
                    count: 0,
                })
                .collect(),
        }
    }

    fn contains(&self, label: &str) -> bool {
        self.counts.iter().any(|s| s.label == label)
    }

    fn add(&mut self, label: String) {
        match self.counts.iter_mut().find(|s| s.label == label) {
            Some(entry) => entry.count += 1,
            None => self.counts.push(StatusCount { label, count: 1 }),
        }
    }

    fn into_counts(self) -> Vec<StatusCount> {
        self.counts
    }
}

fn spread(subject: &str, scores: &[i64]) -> SubjectSpread {
    let mut sorted = scores.to_vec();
    sorted.sort_unstable();
    SubjectSpread {
        subject: subject.to_string(),
        count: sorted.len(),
        mean: mean(&sorted),
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    }
}

// Linear interpolation between closest ranks; `sorted` is non-empty.
fn quantile(sorted: &[i64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] as f64 + (sorted[hi] - sorted[lo]) as f64 * frac
}

fn mean(scores: &[i64]) -> f64 {
    scores.iter().sum::<i64>() as f64 / scores.len() as f64
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}
