use crate::models::{
    display_name, AggregateReport, InsightCategory, InsightStatement, StudentRecord, SubjectSet,
};

pub const TREND_THRESHOLD: f64 = 2.0;
pub const SUBJECT_THRESHOLD: f64 = 5.0;

const CLOSING_RECOMMENDATION: &str = "Recommendation: Focus on personalized learning plans for struggling students and maintain current strategies for top performers.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Positive,
    Negative,
    Stable,
}

impl Trend {
    pub fn classify(improvement: f64) -> Trend {
        if improvement > TREND_THRESHOLD {
            Trend::Positive
        } else if improvement < -TREND_THRESHOLD {
            Trend::Negative
        } else {
            Trend::Stable
        }
    }
}

/// Signed percentage with one decimal, e.g. `+3.2%` or `-0.4%`.
pub fn signed_percent(value: f64) -> String {
    format!("{:+.1}%", value)
}

pub fn students_label(count: usize) -> String {
    if count == 1 {
        "1 student".to_string()
    } else {
        format!("{} students", count)
    }
}

/// Rule-ordered insights for a batch. The emission order is stable so the
/// output can be compared line by line between runs.
pub fn generate_insights(report: &AggregateReport) -> Vec<InsightStatement> {
    let mut insights = Vec::new();

    let change = signed_percent(report.avg_improvement);
    let overall = match Trend::classify(report.avg_improvement) {
        Trend::Positive => format!(
            "Positive Trend: Students are showing an average improvement of {} across all subjects.",
            change
        ),
        Trend::Negative => format!(
            "Attention Needed: There's an average decline of {:.1}% in performance.",
            report.avg_improvement.abs()
        ),
        Trend::Stable => format!(
            "Stable Performance: Overall performance is relatively stable ({} average change).",
            change
        ),
    };
    insights.push(statement(InsightCategory::Trend, overall));

    for trend in &report.per_subject_improvement {
        if let Some(message) = subject_message(&trend.subject, trend.improvement) {
            insights.push(statement(InsightCategory::Subject, message));
        }
    }

    insights.push(statement(
        InsightCategory::Distribution,
        format!(
            "Top Performers: {} ({:.1}%) are expected to score above 80%.",
            students_label(report.top_performer_count),
            report.percent(report.top_performer_count)
        ),
    ));

    if report.needs_attention_count > 0 {
        insights.push(statement(
            InsightCategory::Risk,
            format!(
                "Intervention Needed: {} ({:.1}%) may need additional support.",
                students_label(report.needs_attention_count),
                report.percent(report.needs_attention_count)
            ),
        ));
    }

    insights.push(statement(
        InsightCategory::Recommendation,
        CLOSING_RECOMMENDATION.to_string(),
    ));

    insights
}

/// Insights for a single student: the overall change first, then every
/// subject that moved by more than the subject threshold.
pub fn student_insights(record: &StudentRecord, subjects: &SubjectSet) -> Vec<InsightStatement> {
    let change = signed_percent(record.improvement());
    let overall = match Trend::classify(record.improvement()) {
        Trend::Positive => format!("Overall positive trend! Average improvement: {}", change),
        Trend::Negative => format!("Needs attention. Average decline: {}", change),
        Trend::Stable => format!("Stable performance expected. Average change: {}", change),
    };

    let mut insights = vec![statement(InsightCategory::Trend, overall)];
    for (index, subject) in subjects.iter().enumerate() {
        let difference = record.subject_change(index);
        let message = if difference > SUBJECT_THRESHOLD {
            format!("Strong improvement predicted in {} ({})", subject, signed_percent(difference))
        } else if difference < -SUBJECT_THRESHOLD {
            format!("Attention needed in {} ({})", subject, signed_percent(difference))
        } else {
            continue;
        };
        insights.push(statement(InsightCategory::Subject, message));
    }

    insights
}

fn subject_message(subject: &str, improvement: f64) -> Option<String> {
    if improvement > SUBJECT_THRESHOLD {
        Some(format!(
            "{}: Strong improvement expected ({}).",
            display_name(subject),
            signed_percent(improvement)
        ))
    } else if improvement < -SUBJECT_THRESHOLD {
        Some(format!(
            "{}: Needs attention ({}).",
            display_name(subject),
            signed_percent(improvement)
        ))
    } else {
        None
    }
}

fn statement(category: InsightCategory, message: String) -> InsightStatement {
    InsightStatement { category, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;

    fn subjects() -> SubjectSet {
        SubjectSet::new(["physics", "maths", "english"]).unwrap()
    }

    fn record(id: u32, exam1: [f64; 3], exam2: [f64; 3]) -> StudentRecord {
        StudentRecord::new(id, &subjects(), exam1.to_vec(), exam2.to_vec()).unwrap()
    }

    fn categories(insights: &[InsightStatement]) -> Vec<InsightCategory> {
        insights.iter().map(|i| i.category).collect()
    }

    #[test]
    fn classifies_trend_with_strict_thresholds() {
        assert_eq!(Trend::classify(2.1), Trend::Positive);
        assert_eq!(Trend::classify(2.0), Trend::Stable);
        assert_eq!(Trend::classify(-2.0), Trend::Stable);
        assert_eq!(Trend::classify(-1.33), Trend::Stable);
        assert_eq!(Trend::classify(-2.5), Trend::Negative);
    }

    #[test]
    fn sample_batch_reads_as_stable_with_one_intervention() {
        let batch = vec![
            record(1, [92.0, 92.0, 92.0], [95.0, 95.0, 95.0]),
            record(2, [63.0, 63.0, 63.0], [55.0, 55.0, 55.0]),
            record(3, [71.0, 71.0, 71.0], [72.0, 72.0, 72.0]),
        ];
        let report = aggregate(&batch, &subjects()).unwrap();
        let insights = generate_insights(&report);

        assert_eq!(
            categories(&insights),
            vec![
                InsightCategory::Trend,
                InsightCategory::Distribution,
                InsightCategory::Risk,
                InsightCategory::Recommendation,
            ]
        );
        assert!(insights[0].message.starts_with("Stable Performance"));
        assert!(insights[0].message.contains("-1.3%"));
        assert_eq!(
            insights[1].message,
            "Top Performers: 1 student (33.3%) are expected to score above 80%."
        );
        assert!(insights[2].message.contains("1 student (33.3%)"));
    }

    #[test]
    fn subject_statements_follow_subject_order_and_skip_the_middle() {
        // physics +10, maths exactly +5, english -10
        let batch = vec![
            record(1, [50.0, 50.0, 80.0], [60.0, 55.0, 70.0]),
            record(2, [60.0, 60.0, 70.0], [70.0, 65.0, 60.0]),
        ];
        let report = aggregate(&batch, &subjects()).unwrap();
        let insights = generate_insights(&report);
        let subject_lines: Vec<&str> = insights
            .iter()
            .filter(|i| i.category == InsightCategory::Subject)
            .map(|i| i.message.as_str())
            .collect();

        assert_eq!(
            subject_lines,
            vec![
                "Physics: Strong improvement expected (+10.0%).",
                "English: Needs attention (-10.0%).",
            ]
        );
        assert_eq!(insights[1].category, InsightCategory::Subject);
    }

    #[test]
    fn omits_intervention_when_nobody_needs_attention() {
        let batch = vec![
            record(1, [80.0, 80.0, 80.0], [90.0, 90.0, 90.0]),
            record(2, [70.0, 70.0, 70.0], [75.0, 75.0, 75.0]),
        ];
        let report = aggregate(&batch, &subjects()).unwrap();
        let insights = generate_insights(&report);

        assert!(insights[0].message.starts_with("Positive Trend"));
        assert!(insights.iter().all(|i| i.category != InsightCategory::Risk));
        let trend_count = insights.iter().filter(|i| i.category == InsightCategory::Trend).count();
        let closing_count = insights
            .iter()
            .filter(|i| i.category == InsightCategory::Recommendation)
            .count();
        assert_eq!(trend_count, 1);
        assert_eq!(closing_count, 1);
        assert_eq!(insights.last().map(|i| i.category), Some(InsightCategory::Recommendation));
    }

    #[test]
    fn top_performer_statement_is_emitted_even_at_zero() {
        let batch = vec![record(1, [50.0, 50.0, 50.0], [40.0, 40.0, 40.0])];
        let report = aggregate(&batch, &subjects()).unwrap();
        let insights = generate_insights(&report);

        assert_eq!(
            insights[0].message,
            "Attention Needed: There's an average decline of 10.0% in performance."
        );
        assert!(insights
            .iter()
            .any(|i| i.message == "Top Performers: 0 students (0.0%) are expected to score above 80%."));
    }

    #[test]
    fn student_insights_lead_with_overall_change() {
        let student = record(9, [60.0, 70.0, 80.0], [75.0, 70.0, 70.0]);
        let insights = student_insights(&student, &subjects());

        assert_eq!(insights.len(), 3);
        assert_eq!(insights[0].message, "Stable performance expected. Average change: +1.7%");
        assert_eq!(insights[1].message, "Strong improvement predicted in physics (+15.0%)");
        assert_eq!(insights[2].message, "Attention needed in english (-10.0%)");
    }

    #[test]
    fn formats_signed_percentages() {
        assert_eq!(signed_percent(3.14159), "+3.1%");
        assert_eq!(signed_percent(-8.0), "-8.0%");
        assert_eq!(signed_percent(0.0), "+0.0%");
    }
}
