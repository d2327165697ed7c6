use std::collections::BTreeMap;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

pub const DEFAULT_SUBJECTS: [&str; 5] = ["physics", "maths", "english", "chemistry", "computer"];

/// Ordered list of subject names shared by every record in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SubjectSet {
    names: Vec<String>,
}

impl SubjectSet {
    pub fn new<I, S>(names: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if name.is_empty() {
                bail!("subject names must not be blank");
            }
            if normalized.contains(&name) {
                bail!("subject '{}' is listed twice", name);
            }
            normalized.push(name);
        }

        if normalized.is_empty() {
            bail!("at least one subject is required");
        }

        Ok(Self { names: normalized })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Result<usize, AnalyticsError> {
        let wanted = name.trim().to_lowercase();
        self.names
            .iter()
            .position(|subject| *subject == wanted)
            .ok_or(AnalyticsError::UnknownSubject(wanted))
    }

    /// Comma separated display names, e.g. "Physics, Maths and English".
    pub fn display_list(&self) -> String {
        let labels: Vec<String> = self.iter().map(display_name).collect();
        match labels.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
            Some((last, _)) => last.clone(),
            None => String::new(),
        }
    }
}

impl Default for SubjectSet {
    fn default() -> Self {
        Self {
            names: DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn display_name(subject: &str) -> String {
    let mut chars = subject.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One student's marks for both exams plus the averages derived from them.
/// Built once through [`StudentRecord::new`] and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    id: u32,
    exam1: Vec<f64>,
    exam2: Vec<f64>,
    exam1_avg: f64,
    exam2_avg: f64,
    improvement: f64,
}

impl StudentRecord {
    pub fn new(
        id: u32,
        subjects: &SubjectSet,
        exam1: Vec<f64>,
        exam2: Vec<f64>,
    ) -> Result<Self, AnalyticsError> {
        if id == 0 {
            return Err(AnalyticsError::InvalidRecord {
                id,
                reason: "student ids start at 1".to_string(),
            });
        }

        for marks in [&exam1, &exam2] {
            if marks.len() != subjects.len() {
                return Err(AnalyticsError::SubjectMismatch {
                    expected: subjects.len(),
                    found: marks.len(),
                });
            }
        }

        for (exam, marks) in [("exam 1", &exam1), ("exam 2", &exam2)] {
            for (subject, score) in subjects.iter().zip(marks.iter()) {
                if !score.is_finite() || !(0.0..=100.0).contains(score) {
                    return Err(AnalyticsError::InvalidRecord {
                        id,
                        reason: format!("{} {} mark {} is outside 0-100", exam, subject, score),
                    });
                }
            }
        }

        let exam1_avg = mean(&exam1);
        let exam2_avg = mean(&exam2);

        Ok(Self {
            id,
            exam1,
            exam2,
            exam1_avg,
            exam2_avg,
            improvement: exam2_avg - exam1_avg,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn exam1(&self) -> &[f64] {
        &self.exam1
    }

    pub fn exam2(&self) -> &[f64] {
        &self.exam2
    }

    pub fn exam1_avg(&self) -> f64 {
        self.exam1_avg
    }

    pub fn exam2_avg(&self) -> f64 {
        self.exam2_avg
    }

    pub fn improvement(&self) -> f64 {
        self.improvement
    }

    pub fn subject_count(&self) -> usize {
        self.exam1.len()
    }

    /// Change between the two exams for the subject at `index`.
    pub fn subject_change(&self, index: usize) -> f64 {
        self.exam2[index] - self.exam1[index]
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Payload of `GET /student_marks_data/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentMarks {
    pub exam1: BTreeMap<String, f64>,
    pub exam2: BTreeMap<String, f64>,
}

impl StudentMarks {
    pub fn into_record(self, id: u32, subjects: &SubjectSet) -> Result<StudentRecord, AnalyticsError> {
        let exam1 = ordered_marks(&self.exam1, subjects)?;
        let exam2 = ordered_marks(&self.exam2, subjects)?;
        StudentRecord::new(id, subjects, exam1, exam2)
    }
}

fn ordered_marks(
    marks: &BTreeMap<String, f64>,
    subjects: &SubjectSet,
) -> Result<Vec<f64>, AnalyticsError> {
    let mut ordered = vec![None; subjects.len()];
    for (name, score) in marks {
        let index = subjects.index_of(name)?;
        ordered[index] = Some(*score);
    }

    let found = ordered.iter().filter(|slot| slot.is_some()).count();
    ordered
        .into_iter()
        .collect::<Option<Vec<f64>>>()
        .ok_or(AnalyticsError::SubjectMismatch {
            expected: subjects.len(),
            found,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Excellent,
    Good,
    Satisfactory,
    NeedsImprovement,
    Poor,
}

impl ScoreBand {
    pub const ALL: [ScoreBand; 5] = [
        ScoreBand::Excellent,
        ScoreBand::Good,
        ScoreBand::Satisfactory,
        ScoreBand::NeedsImprovement,
        ScoreBand::Poor,
    ];

    /// Bands are half-open `[lower, next)` except Excellent, which is closed at 100.
    pub fn for_score(score: f64) -> ScoreBand {
        if score >= 90.0 {
            ScoreBand::Excellent
        } else if score >= 80.0 {
            ScoreBand::Good
        } else if score >= 70.0 {
            ScoreBand::Satisfactory
        } else if score >= 60.0 {
            ScoreBand::NeedsImprovement
        } else {
            ScoreBand::Poor
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreBand::Excellent => "Excellent (90-100%)",
            ScoreBand::Good => "Good (80-89%)",
            ScoreBand::Satisfactory => "Satisfactory (70-79%)",
            ScoreBand::NeedsImprovement => "Needs Improvement (60-69%)",
            ScoreBand::Poor => "Poor (<60%)",
        }
    }

    pub fn grade_label(self) -> &'static str {
        match self {
            ScoreBand::Excellent => "A (90-100%)",
            ScoreBand::Good => "B (80-89%)",
            ScoreBand::Satisfactory => "C (70-79%)",
            ScoreBand::NeedsImprovement => "D (60-69%)",
            ScoreBand::Poor => "F (<60%)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCount {
    pub band: ScoreBand,
    pub count: usize,
}

/// Per-subject averages for both exams and the mean per-student change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectTrend {
    pub subject: String,
    pub exam1_avg: f64,
    pub exam2_avg: f64,
    pub improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub subjects: SubjectSet,
    pub total_students: usize,
    pub avg_improvement: f64,
    pub top_performer_count: usize,
    pub needs_attention_count: usize,
    pub distribution: Vec<BandCount>,
    pub per_subject_improvement: Vec<SubjectTrend>,
    pub ranked_students: Vec<StudentRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Trend,
    Subject,
    Distribution,
    Risk,
    Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightStatement {
    pub category: InsightCategory,
    pub message: String,
}
