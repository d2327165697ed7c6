use std::fmt::Write;

use rand::Rng;

use crate::error::AnalyticsError;
use crate::insights::{signed_percent, students_label, Trend, SUBJECT_THRESHOLD};
use crate::models::{display_name, StudentRecord, SubjectSet, DEFAULT_SUBJECTS};
use crate::state::AnalyticsState;

pub const TOP_LIMIT: usize = 5;
pub const AT_RISK_LIMIT: usize = 5;

/// Subject names recognized in a query besides the defaults, so a question
/// about a subject the batch does not cover still gets a subject answer.
const OTHER_SUBJECTS: &[&str] = &["biology", "history", "geography", "economics"];

/// Shortest shared prefix that still counts as naming a subject.
const SUBJECT_STEM: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    StudentLookup,
    Summary,
    Subject,
    TopPerformers,
    Struggling,
    Improvement,
    Recommendation,
    Help,
    Greeting,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub intent: Intent,
    pub text: String,
}

/// A subject named in a query, inside or outside the loaded batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectMention<'a> {
    Active(&'a str),
    Outside(String),
}

/// A lower-cased query with its word tokens and first run of digits.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    words: Vec<String>,
    number: Option<String>,
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim().to_lowercase();
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect();
        let number = text
            .split(|c: char| !c.is_ascii_digit())
            .find(|digits| !digits.is_empty())
            .map(str::to_string);

        Self { text, words, number }
    }

    fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.text.contains(needle))
    }

    fn has_word(&self, candidates: &[&str]) -> bool {
        self.words
            .iter()
            .any(|word| candidates.contains(&word.as_str()))
    }

    /// First subject of `subjects` the query names.
    pub fn subject<'a>(&self, subjects: &'a SubjectSet) -> Option<&'a str> {
        subjects.iter().find(|subject| self.names(subject))
    }

    /// Like [`Query::subject`], but falls back to subject names outside the
    /// active set.
    pub fn subject_mention<'a>(&self, subjects: &'a SubjectSet) -> Option<SubjectMention<'a>> {
        if let Some(subject) = self.subject(subjects) {
            return Some(SubjectMention::Active(subject));
        }
        DEFAULT_SUBJECTS
            .iter()
            .chain(OTHER_SUBJECTS)
            .find(|known| self.names(known))
            .map(|known| SubjectMention::Outside(known.to_string()))
    }

    fn names(&self, subject: &str) -> bool {
        self.words.iter().any(|word| names_subject(word, subject))
    }
}

/// A word names a subject when it is the subject, a prefix of it ("math" for
/// "maths"), extends it, or shares its first four letters ("mathematics").
fn names_subject(word: &str, subject: &str) -> bool {
    word == subject
        || (word.len() >= SUBJECT_STEM && subject.starts_with(word))
        || word.starts_with(subject)
        || subject
            .get(..SUBJECT_STEM)
            .is_some_and(|stem| word.starts_with(stem))
}

struct Rule {
    intent: Intent,
    matches: fn(&Query, &SubjectSet) -> bool,
}

// Evaluated top to bottom; the first match wins even when later keyword
// lists overlap ("help" is claimed by Struggling before Help).
const RULES: &[Rule] = &[
    Rule {
        intent: Intent::StudentLookup,
        matches: |q, _| q.mentions(&["student"]) && q.number.is_some(),
    },
    Rule {
        intent: Intent::Summary,
        matches: |q, _| q.mentions(&["analytics", "summary", "overview"]),
    },
    Rule {
        intent: Intent::Subject,
        matches: |q, subjects| {
            q.mentions(&["subject"]) || q.subject_mention(subjects).is_some()
        },
    },
    Rule {
        intent: Intent::TopPerformers,
        matches: |q, _| q.mentions(&["top", "best", "highest"]),
    },
    Rule {
        intent: Intent::Struggling,
        matches: |q, _| {
            q.mentions(&["struggling", "attention", "help", "support", "bottom", "worst"])
        },
    },
    Rule {
        intent: Intent::Improvement,
        matches: |q, _| q.mentions(&["improve", "progress", "better"]),
    },
    Rule {
        intent: Intent::Recommendation,
        matches: |q, _| q.mentions(&["recommend", "suggest", "advice"]),
    },
    Rule {
        intent: Intent::Help,
        matches: |q, _| q.mentions(&["help", "how", "use"]),
    },
    Rule {
        intent: Intent::Greeting,
        matches: |q, _| q.has_word(&["hello", "hi", "hey"]),
    },
];

pub fn classify(query: &Query, subjects: &SubjectSet) -> Intent {
    RULES
        .iter()
        .find(|rule| (rule.matches)(query, subjects))
        .map(|rule| rule.intent)
        .unwrap_or(Intent::Fallback)
}

pub fn respond<R: Rng>(raw: &str, state: &AnalyticsState, rng: &mut R) -> Response {
    let query = Query::parse(raw);
    let intent = classify(&query, state.subjects());
    tracing::debug!(?intent, query = %query.text, "dispatching query");

    let text = match intent {
        Intent::StudentLookup => student_response(&query, state),
        Intent::Summary => summary_response(state),
        Intent::Subject => subject_response(&query, state),
        Intent::TopPerformers => top_performers_response(state),
        Intent::Struggling => struggling_response(state),
        Intent::Improvement => improvement_response(state),
        Intent::Recommendation => pick(RECOMMENDATIONS, rng).to_string(),
        Intent::Help => HELP.to_string(),
        Intent::Greeting => GREETING.to_string(),
        Intent::Fallback => pick(FALLBACKS, rng).to_string(),
    };

    Response { intent, text }
}

fn pick<'a, R: Rng>(templates: &[&'a str], rng: &mut R) -> &'a str {
    templates[rng.gen_range(0..templates.len())]
}

fn student_response(query: &Query, state: &AnalyticsState) -> String {
    let digits = query.number.as_deref().unwrap_or_default();
    if state.records().is_none() {
        return "I don't have student data available yet. Please upload exam data and generate predictions first, then I can provide detailed student performance insights!".to_string();
    }

    let Some(record) = digits.parse::<u32>().ok().and_then(|id| state.find(id)) else {
        return format!(
            "I couldn't find Student {} in the current batch. Check the student number and try again.",
            digits
        );
    };

    let id = record.id();
    let mut output = String::new();
    let _ = writeln!(output, "Student {} Performance Analysis:", id);
    let _ = writeln!(output);
    let _ = writeln!(output, "- Exam 1 Average: {:.1}%", record.exam1_avg());
    let _ = writeln!(output, "- Predicted Exam 2 Average: {:.1}%", record.exam2_avg());
    let _ = writeln!(output, "- Expected Change: {}", signed_percent(record.improvement()));
    let _ = writeln!(output);

    if record.improvement() > SUBJECT_THRESHOLD {
        let _ = write!(
            output,
            "Great news! Student {} is expected to show significant improvement!",
            id
        );
    } else if record.improvement() < -SUBJECT_THRESHOLD {
        let _ = write!(
            output,
            "Attention needed: Student {} may need additional support to maintain performance.",
            id
        );
    } else {
        let _ = write!(
            output,
            "Stable performance: Student {} is expected to maintain consistent results.",
            id
        );
    }

    output
}

fn summary_response(state: &AnalyticsState) -> String {
    let report = match state.require_report() {
        Ok(report) => report,
        Err(err) => return err.user_message(),
    };

    let mut output = String::new();
    let _ = writeln!(output, "Analytics Summary:");
    let _ = writeln!(output);
    let _ = writeln!(output, "- Total Students: {}", report.total_students);
    let _ = writeln!(
        output,
        "- Average Improvement: {}",
        signed_percent(report.avg_improvement)
    );
    let _ = writeln!(
        output,
        "- Top Performers (80%+): {}",
        students_label(report.top_performer_count)
    );
    let _ = writeln!(
        output,
        "- Need Attention: {}",
        students_label(report.needs_attention_count)
    );
    let _ = writeln!(output);

    let sentence = match Trend::classify(report.avg_improvement) {
        Trend::Positive => "Overall trend is positive with good improvement across the board!",
        Trend::Negative => "There's a concerning decline in performance that needs attention.",
        Trend::Stable => "Performance is stable with minimal change expected.",
    };
    output.push_str(sentence);
    output
}

fn subject_response(query: &Query, state: &AnalyticsState) -> String {
    let subject = match query.subject_mention(state.subjects()) {
        Some(SubjectMention::Active(subject)) => subject,
        Some(SubjectMention::Outside(name)) => {
            return AnalyticsError::UnknownSubject(name).user_message();
        }
        None => {
            return format!(
                "Subject Analysis: I can provide detailed analysis for {}. Which specific subject would you like me to analyze?",
                state.subjects().display_list()
            );
        }
    };

    let report = match state.require_report() {
        Ok(report) => report,
        Err(err) => return err.user_message(),
    };
    let trend = match report.subject_trend(subject) {
        Ok(trend) => trend,
        Err(err) => return err.user_message(),
    };

    let name = display_name(subject);
    let mut output = String::new();
    let _ = writeln!(output, "{} Analysis:", name);
    let _ = writeln!(output);
    let _ = writeln!(output, "- Exam 1 Average: {:.1}%", trend.exam1_avg);
    let _ = writeln!(output, "- Predicted Exam 2 Average: {:.1}%", trend.exam2_avg);
    let _ = writeln!(
        output,
        "- Expected Improvement: {}",
        signed_percent(trend.improvement)
    );
    let _ = writeln!(output);

    if trend.improvement > SUBJECT_THRESHOLD {
        let _ = write!(output, "{} shows strong improvement trends!", name);
    } else if trend.improvement < -SUBJECT_THRESHOLD {
        let _ = write!(output, "{} needs focused attention and intervention.", name);
    } else {
        let _ = write!(output, "{} performance is relatively stable.", name);
    }

    output
}

fn top_performers_response(state: &AnalyticsState) -> String {
    let Some(report) = state.report() else {
        return "I need analytics data to identify top performers. Please complete the prediction process first!".to_string();
    };

    let top = report.top(TOP_LIMIT);
    let mut output = String::new();
    let _ = writeln!(output, "Top {} Performing Students:", top.len());
    let _ = writeln!(output);
    for (index, record) in top.iter().enumerate() {
        let _ = writeln!(output, "{}. {}", index + 1, student_line(record));
    }
    let _ = writeln!(output);
    output.push_str("These students are excelling and can serve as peer mentors!");
    output
}

fn struggling_response(state: &AnalyticsState) -> String {
    let Some(report) = state.report() else {
        return "I need analytics data to identify struggling students. Please complete the prediction process first!".to_string();
    };

    let at_risk = report.at_risk();
    if at_risk.is_empty() {
        return "Great news! No students appear to be struggling significantly. Everyone is performing well!".to_string();
    }

    let mut output = String::new();
    let _ = writeln!(output, "Students Needing Attention:");
    let _ = writeln!(output);
    for record in at_risk.iter().take(AT_RISK_LIMIT) {
        let _ = writeln!(output, "- {}", student_line(record));
    }
    let _ = writeln!(output);
    output.push_str("Recommendations: Consider personalized tutoring, additional practice materials, or one-on-one support sessions.");
    output
}

fn improvement_response(state: &AnalyticsState) -> String {
    let Some(report) = state.report() else {
        return "Upload your data first, and I'll provide detailed improvement insights!".to_string();
    };

    let mut output = String::new();
    let _ = writeln!(output, "Improvement Insights:");
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "- Overall Improvement: {}",
        signed_percent(report.avg_improvement)
    );
    let _ = writeln!(
        output,
        "- Students Improving: {} out of {}",
        report.improving_count(),
        report.total_students
    );
    if let Some(best) = report.best_subject() {
        let _ = writeln!(output);
        let _ = write!(
            output,
            "Best Improving Subject: {} ({})",
            display_name(&best.subject),
            signed_percent(best.improvement)
        );
    }
    output.trim_end().to_string()
}

fn student_line(record: &StudentRecord) -> String {
    format!(
        "Student {}: {:.1}% ({})",
        record.id(),
        record.exam2_avg(),
        signed_percent(record.improvement())
    )
}

const RECOMMENDATIONS: &[&str] = &[
    "Data-Driven Recommendations:\n\n- Focus on personalized learning paths for struggling students\n- Implement peer tutoring with top performers\n- Create subject-specific intervention programs\n- Use predictive insights for early intervention\n- Regular progress monitoring and feedback sessions",
    "Strategic Recommendations:\n\n- Identify at-risk students early using the exam 2 predictions\n- Develop targeted study groups for challenging subjects\n- Implement adaptive learning technologies\n- Create mentorship programs\n- Use analytics to optimize teaching methods",
    "Performance Enhancement Tips:\n\n- Regular assessment and feedback cycles\n- Subject-specific skill development programs\n- Use of interactive learning tools\n- Parent-teacher collaboration for struggling students\n- Celebrate improvements to boost motivation",
];

const HELP: &str = "How I Can Help:\n\n- Student Queries: \"How is Student 123 performing?\"\n- Analytics: \"Show me the analytics summary\"\n- Subject Analysis: \"How is math performing?\"\n- Top Performers: \"Who are the top students?\"\n- Struggling Students: \"Which students need help?\"\n- Improvement: \"Which subject is improving most?\"\n- Recommendations: \"What do you recommend?\"\n\nJust ask me anything about your student performance data!";

const GREETING: &str = "Hello! I'm here to help you analyze student performance data. I can provide insights about individual students, analytics summaries, subject comparisons, and recommendations. What would you like to know?";

const FALLBACKS: &[&str] = &[
    "I'm here to help with student performance analysis! Try asking about specific students, analytics summaries, or recommendations.",
    "Hmm, I'm not sure about that. You can ask me about student performance, analytics data, top performers, or struggling students!",
    "Let me help you with student analytics! Ask me about performance trends, specific students, or recommendations for improvement.",
    "I specialize in student performance insights! Try queries like \"Show analytics summary\" or \"How is Student 123 doing?\"",
];
