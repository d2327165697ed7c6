use std::collections::HashSet;

use crate::error::AnalyticsError;
use crate::models::{
    AggregateReport, BandCount, ScoreBand, StudentRecord, SubjectSet, SubjectTrend,
};

// Policy thresholds.
pub const TOP_PERFORMER_MIN: f64 = 80.0;
pub const LOW_SCORE_MAX: f64 = 60.0;
pub const DECLINE_FLAG: f64 = -5.0;
pub const IMPROVING_MIN: f64 = 2.0;

pub fn aggregate(
    records: &[StudentRecord],
    subjects: &SubjectSet,
) -> Result<AggregateReport, AnalyticsError> {
    if records.is_empty() {
        return Err(AnalyticsError::EmptyBatch);
    }

    if let Some(record) = records
        .iter()
        .find(|record| record.subject_count() != subjects.len())
    {
        return Err(AnalyticsError::SubjectMismatch {
            expected: subjects.len(),
            found: record.subject_count(),
        });
    }

    let mut seen = HashSet::with_capacity(records.len());
    if let Some(record) = records.iter().find(|record| !seen.insert(record.id())) {
        return Err(AnalyticsError::InvalidRecord {
            id: record.id(),
            reason: "student id appears more than once in the batch".to_string(),
        });
    }

    let total = records.len() as f64;
    let avg_improvement = records.iter().map(StudentRecord::improvement).sum::<f64>() / total;
    let top_performer_count = records.iter().filter(|r| is_top_performer(r)).count();
    let needs_attention_count = records.iter().filter(|r| needs_attention(r)).count();

    let mut distribution: Vec<BandCount> = ScoreBand::ALL
        .iter()
        .map(|&band| BandCount { band, count: 0 })
        .collect();
    for record in records {
        let band = ScoreBand::for_score(record.exam2_avg());
        if let Some(slot) = distribution.iter_mut().find(|slot| slot.band == band) {
            slot.count += 1;
        }
    }

    let per_subject_improvement = subjects
        .iter()
        .enumerate()
        .map(|(index, subject)| SubjectTrend {
            subject: subject.to_string(),
            exam1_avg: records.iter().map(|r| r.exam1()[index]).sum::<f64>() / total,
            exam2_avg: records.iter().map(|r| r.exam2()[index]).sum::<f64>() / total,
            improvement: records.iter().map(|r| r.subject_change(index)).sum::<f64>() / total,
        })
        .collect();

    Ok(AggregateReport {
        subjects: subjects.clone(),
        total_students: records.len(),
        avg_improvement,
        top_performer_count,
        needs_attention_count,
        distribution,
        per_subject_improvement,
        ranked_students: rank_by_exam2(records),
    })
}

pub fn is_top_performer(record: &StudentRecord) -> bool {
    record.exam2_avg() >= TOP_PERFORMER_MIN
}

pub fn needs_attention(record: &StudentRecord) -> bool {
    record.exam2_avg() < LOW_SCORE_MAX || record.improvement() < DECLINE_FLAG
}

/// Descending by exam 2 average. `sort_by` is stable, so equal averages keep
/// their batch order.
pub fn rank_by_exam2(records: &[StudentRecord]) -> Vec<StudentRecord> {
    let mut ranked = records.to_vec();
    ranked.sort_by(|a, b| {
        b.exam2_avg()
            .partial_cmp(&a.exam2_avg())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

impl AggregateReport {
    pub fn percent(&self, count: usize) -> f64 {
        count as f64 / self.total_students as f64 * 100.0
    }

    pub fn top(&self, n: usize) -> &[StudentRecord] {
        &self.ranked_students[..n.min(self.ranked_students.len())]
    }

    /// At-risk students, weakest exam 2 average first. The ranking already
    /// holds ties in batch order and the ascending sort is stable.
    pub fn at_risk(&self) -> Vec<&StudentRecord> {
        let mut flagged: Vec<&StudentRecord> = self
            .ranked_students
            .iter()
            .filter(|record| needs_attention(record))
            .collect();
        flagged.sort_by(|a, b| {
            a.exam2_avg()
                .partial_cmp(&b.exam2_avg())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        flagged
    }

    pub fn improving_count(&self) -> usize {
        self.ranked_students
            .iter()
            .filter(|record| record.improvement() > IMPROVING_MIN)
            .count()
    }

    /// Subject with the largest mean improvement; the earlier subject wins ties.
    pub fn best_subject(&self) -> Option<&SubjectTrend> {
        self.per_subject_improvement
            .iter()
            .fold(None, |best: Option<&SubjectTrend>, trend| match best {
                Some(current) if current.improvement >= trend.improvement => Some(current),
                _ => Some(trend),
            })
    }

    pub fn subject_trend(&self, subject: &str) -> Result<&SubjectTrend, AnalyticsError> {
        let index = self.subjects.index_of(subject)?;
        Ok(&self.per_subject_improvement[index])
    }
}
