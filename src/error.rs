use std::fmt;

/// Errors raised by the analytics core. All of them are recoverable: callers
/// turn them into a user-facing message instead of aborting.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    /// Aggregation was asked to summarise zero records.
    EmptyBatch,
    /// A subject name that is not part of the active subject set.
    UnknownSubject(String),
    /// Insights or answers were requested before any batch was loaded.
    DataNotReady,
    /// A record failed validation when it was built.
    InvalidRecord { id: u32, reason: String },
    /// A record carries a different number of subjects than the batch.
    SubjectMismatch { expected: usize, found: usize },
}

impl AnalyticsError {
    pub fn user_message(&self) -> String {
        match self {
            AnalyticsError::EmptyBatch => {
                "No student records were found, so there is nothing to analyse yet.".to_string()
            }
            AnalyticsError::UnknownSubject(name) => {
                format!("'{name}' is not one of the subjects in this batch.")
            }
            AnalyticsError::DataNotReady => {
                "Analytics data isn't available yet. Please upload exam data and generate predictions first."
                    .to_string()
            }
            AnalyticsError::InvalidRecord { id, reason } => {
                format!("Student {id} has invalid marks: {reason}.")
            }
            AnalyticsError::SubjectMismatch { expected, found } => format!(
                "Expected marks for {expected} subjects but found {found}; every record must cover the same subjects."
            ),
        }
    }
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsError::EmptyBatch => write!(f, "empty batch: aggregation needs at least one record"),
            AnalyticsError::UnknownSubject(name) => write!(f, "unknown subject: {}", name),
            AnalyticsError::DataNotReady => write!(f, "data not ready: no batch has been loaded"),
            AnalyticsError::InvalidRecord { id, reason } => {
                write!(f, "invalid record for student {}: {}", id, reason)
            }
            AnalyticsError::SubjectMismatch { expected, found } => write!(
                f,
                "subject mismatch: expected {} subjects, found {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for AnalyticsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_name_the_problem() {
        assert!(AnalyticsError::UnknownSubject("biology".to_string())
            .user_message()
            .contains("biology"));
        assert!(AnalyticsError::DataNotReady
            .user_message()
            .contains("isn't available yet"));
    }

    #[test]
    fn converts_into_anyhow() {
        let err: anyhow::Error = AnalyticsError::EmptyBatch.into();
        assert_eq!(
            err.to_string(),
            "empty batch: aggregation needs at least one record"
        );
    }
}
