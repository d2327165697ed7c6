use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use rand::Rng;

use crate::models::{SubjectSet, DEFAULT_SUBJECTS};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_STUDENTS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Random marks generated locally, for demos
    Synthetic,
    /// A CSV export with `id`, `exam1_<subject>` and `exam2_<subject>` columns
    Csv,
    /// Marks fetched from the prediction backend
    Live,
}

/// Global options shared by every subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Where student records come from
    #[arg(long, value_enum, default_value_t = SourceKind::Synthetic, env = "EXAM_INSIGHTS_SOURCE", global = true)]
    pub source: SourceKind,

    /// CSV file to read when --source csv
    #[arg(long, env = "EXAM_INSIGHTS_CSV", global = true)]
    pub csv: Option<PathBuf>,

    /// Number of students to generate or fetch
    #[arg(long, default_value_t = DEFAULT_STUDENTS, global = true)]
    pub students: u32,

    /// Seed for reproducible synthetic batches
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Comma separated subject list for synthetic and live sources
    #[arg(long, value_delimiter = ',', global = true)]
    pub subjects: Vec<String>,

    /// Prediction backend base URL
    #[arg(long, default_value = DEFAULT_BACKEND_URL, env = "EXAM_INSIGHTS_BACKEND_URL", global = true)]
    pub backend_url: String,

    /// HTTP timeout for backend calls, in seconds
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout_secs: u64,

    /// Answer chat queries immediately instead of pausing 1-3 seconds
    #[arg(long, env = "EXAM_INSIGHTS_NO_DELAY", global = true)]
    pub no_delay: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceKind,
    pub csv: Option<PathBuf>,
    pub students: u32,
    pub seed: Option<u64>,
    pub subjects: SubjectSet,
    pub backend_url: String,
    pub timeout: Duration,
    pub delay: Option<DelayRange>,
}

impl ConfigArgs {
    pub fn into_config(self) -> anyhow::Result<Config> {
        if self.source == SourceKind::Csv && self.csv.is_none() {
            bail!("--source csv needs a file passed with --csv");
        }
        if self.students == 0 {
            bail!("--students must be at least 1");
        }

        let subjects = if self.subjects.is_empty() {
            SubjectSet::new(DEFAULT_SUBJECTS)
        } else {
            SubjectSet::new(&self.subjects)
        }
        .context("invalid --subjects")?;

        Ok(Config {
            source: self.source,
            csv: self.csv,
            students: self.students,
            seed: self.seed,
            subjects,
            backend_url: self.backend_url,
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            delay: if self.no_delay {
                None
            } else {
                Some(DelayRange::default())
            },
        })
    }
}

/// Cosmetic pause before a chat answer is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }
}

impl DelayRange {
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = (self.max.as_millis() as u64).max(min);
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    fn parse(args: &[&str]) -> anyhow::Result<Config> {
        let mut argv = vec!["exam-insights"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv)?.config.into_config()
    }

    #[test]
    fn defaults_to_synthetic_with_default_subjects() {
        let config = parse(&["--no-delay"]).unwrap();
        assert_eq!(config.source, SourceKind::Synthetic);
        assert_eq!(config.students, DEFAULT_STUDENTS);
        assert_eq!(config.subjects, SubjectSet::default());
        assert_eq!(config.delay, None);
    }

    #[test]
    fn csv_source_requires_a_path() {
        assert!(parse(&["--source", "csv"]).is_err());
        let config = parse(&["--source", "csv", "--csv", "marks.csv"]).unwrap();
        assert_eq!(config.csv, Some(PathBuf::from("marks.csv")));
    }

    #[test]
    fn parses_subject_list() {
        let config = parse(&["--subjects", "Biology,History"]).unwrap();
        assert_eq!(config.subjects.iter().collect::<Vec<_>>(), vec!["biology", "history"]);
        assert!(parse(&["--subjects", "art,art"]).is_err());
    }

    #[test]
    fn delay_samples_stay_in_range() {
        let range = DelayRange::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let delay = range.sample(&mut rng);
            assert!(delay >= range.min && delay <= range.max);
        }
    }
}
