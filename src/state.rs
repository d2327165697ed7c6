use crate::aggregate::aggregate;
use crate::error::AnalyticsError;
use crate::models::{AggregateReport, StudentRecord, SubjectSet};

#[derive(Debug, Clone)]
struct LoadedBatch {
    records: Vec<StudentRecord>,
    report: AggregateReport,
}

/// Everything the insight and query stages read. A load replaces the batch
/// and its report together; nothing is patched in place.
#[derive(Debug, Clone)]
pub struct AnalyticsState {
    subjects: SubjectSet,
    batch: Option<LoadedBatch>,
}

impl AnalyticsState {
    pub fn new(subjects: SubjectSet) -> Self {
        Self {
            subjects,
            batch: None,
        }
    }

    /// Recomputes the report for `records`. On error the previous batch stays.
    pub fn load(
        &mut self,
        subjects: SubjectSet,
        records: Vec<StudentRecord>,
    ) -> Result<&AggregateReport, AnalyticsError> {
        let report = aggregate(&records, &subjects)?;
        self.subjects = subjects;
        let batch = self.batch.insert(LoadedBatch { records, report });
        Ok(&batch.report)
    }

    pub fn subjects(&self) -> &SubjectSet {
        &self.subjects
    }

    pub fn report(&self) -> Option<&AggregateReport> {
        self.batch.as_ref().map(|batch| &batch.report)
    }

    pub fn records(&self) -> Option<&[StudentRecord]> {
        self.batch.as_ref().map(|batch| batch.records.as_slice())
    }

    pub fn require_report(&self) -> Result<&AggregateReport, AnalyticsError> {
        self.report().ok_or(AnalyticsError::DataNotReady)
    }

    pub fn find(&self, id: u32) -> Option<&StudentRecord> {
        self.records()?.iter().find(|record| record.id() == id)
    }
}
