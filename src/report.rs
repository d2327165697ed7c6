use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::insights::{signed_percent, student_insights};
use crate::models::{display_name, AggregateReport, InsightStatement, StudentRecord, SubjectSet};

pub const RANKING_ROWS: usize = 10;

#[derive(Serialize)]
pub struct ReportJson<'a> {
    pub generated_at: DateTime<Utc>,
    pub report: &'a AggregateReport,
    pub insights: &'a [InsightStatement],
}

pub fn render_summary(report: &AggregateReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "- Total students: {}", report.total_students);
    let _ = writeln!(
        output,
        "- Average improvement: {}",
        signed_percent(report.avg_improvement)
    );
    let _ = writeln!(
        output,
        "- Top performers (80%+): {} ({:.1}%)",
        report.top_performer_count,
        report.percent(report.top_performer_count)
    );
    let _ = writeln!(
        output,
        "- Needs attention: {} ({:.1}%)",
        report.needs_attention_count,
        report.percent(report.needs_attention_count)
    );
    output
}

pub fn build_report(
    report: &AggregateReport,
    insights: &[InsightStatement],
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Performance Analytics Report");
    let _ = writeln!(
        output,
        "Generated {} for {} students across {}",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.total_students,
        report.subjects.display_list()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    output.push_str(&render_summary(report));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance Distribution");
    for slot in &report.distribution {
        let _ = writeln!(output, "- {}: {}", slot.band.label(), slot.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");
    for slot in &report.distribution {
        let _ = writeln!(
            output,
            "- {}: {} ({:.1}%)",
            slot.band.grade_label(),
            slot.count,
            report.percent(slot.count)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Comparison");
    let _ = writeln!(output, "| Subject | Exam 1 Avg | Exam 2 Avg (Predicted) | Improvement |");
    let _ = writeln!(output, "|---|---|---|---|");
    for trend in &report.per_subject_improvement {
        let _ = writeln!(
            output,
            "| {} | {:.1}% | {:.1}% | {} |",
            display_name(&trend.subject),
            trend.exam1_avg,
            trend.exam2_avg,
            signed_percent(trend.improvement)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance Rankings");
    let _ = writeln!(output, "| Rank | Student | Predicted Avg | Change |");
    let _ = writeln!(output, "|---|---|---|---|");
    for (index, record) in report.top(RANKING_ROWS).iter().enumerate() {
        let _ = writeln!(
            output,
            "| {} | Student {} | {:.1}% | {} |",
            index + 1,
            record.id(),
            record.exam2_avg(),
            signed_percent(record.improvement())
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Insights");
    for insight in insights {
        let _ = writeln!(output, "- {}", insight.message);
    }

    output
}

/// Marks table and insights for one student.
pub fn build_student_report(record: &StudentRecord, subjects: &SubjectSet) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student {} Performance", record.id());
    let _ = writeln!(output);
    let _ = writeln!(output, "| Subject | Exam 1 | Exam 2 (Predicted) | Change |");
    let _ = writeln!(output, "|---|---|---|---|");
    for (index, subject) in subjects.iter().enumerate() {
        let _ = writeln!(
            output,
            "| {} | {:.1} | {:.1} | {} |",
            display_name(subject),
            record.exam1()[index],
            record.exam2()[index],
            signed_percent(record.subject_change(index))
        );
    }
    let _ = writeln!(
        output,
        "| Average | {:.1} | {:.1} | {} |",
        record.exam1_avg(),
        record.exam2_avg(),
        signed_percent(record.improvement())
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Insights");
    for insight in student_insights(record, subjects) {
        let _ = writeln!(output, "- {}", insight.message);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::insights::generate_insights;
    use chrono::TimeZone;

    fn subjects() -> SubjectSet {
        SubjectSet::new(["physics", "maths"]).unwrap()
    }

    fn sample_report() -> AggregateReport {
        let records: Vec<StudentRecord> = (1..=12)
            .map(|id| {
                let exam2 = 40.0 + id as f64 * 5.0;
                StudentRecord::new(id, &subjects(), vec![60.0, 60.0], vec![exam2, exam2]).unwrap()
            })
            .collect();
        aggregate(&records, &subjects()).unwrap()
    }

    #[test]
    fn report_contains_every_section() {
        let report = sample_report();
        let insights = generate_insights(&report);
        let generated_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let text = build_report(&report, &insights, generated_at);

        assert!(text.contains("Generated 2026-03-01 09:30 UTC for 12 students across Physics and Maths"));
        for heading in [
            "## Summary",
            "## Performance Distribution",
            "## Grade Distribution",
            "## Subject Comparison",
            "## Performance Rankings",
            "## Insights",
        ] {
            assert!(text.contains(heading), "missing {heading}");
        }
        assert!(text.contains("- Excellent (90-100%): 3"));
        assert!(text.contains("- F (<60%): 3 (25.0%)"));
        assert!(text.contains("| Physics | 60.0% | 72.5% | +12.5% |"));
    }

    #[test]
    fn rankings_stop_at_ten_rows() {
        let report = sample_report();
        let text = build_report(&report, &[], Utc::now());
        let rows = text
            .lines()
            .filter(|line| line.contains("| Student ") && !line.starts_with("| Rank"))
            .count();
        assert_eq!(rows, RANKING_ROWS);
        assert!(text.contains("| 1 | Student 12 | 100.0% | +40.0% |"));
    }

    #[test]
    fn student_report_lists_subjects_and_insights() {
        let record = StudentRecord::new(5, &subjects(), vec![60.0, 80.0], vec![70.0, 80.0]).unwrap();
        let text = build_student_report(&record, &subjects());
        assert!(text.starts_with("# Student 5 Performance"));
        assert!(text.contains("| Physics | 60.0 | 70.0 | +10.0% |"));
        assert!(text.contains("| Average | 70.0 | 75.0 | +5.0% |"));
        assert!(text.contains("- Overall positive trend! Average improvement: +5.0%"));
        assert!(text.contains("- Strong improvement predicted in physics (+10.0%)"));
    }

    #[test]
    fn json_view_serializes_report_and_insights() {
        let report = sample_report();
        let insights = generate_insights(&report);
        let view = ReportJson {
            generated_at: Utc::now(),
            report: &report,
            insights: &insights,
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["report"]["total_students"], 12);
        assert_eq!(value["report"]["distribution"][0]["band"], "excellent");
        assert_eq!(value["insights"][0]["category"], "trend");
        assert_eq!(value["report"]["subjects"][1], "maths");
    }
}
