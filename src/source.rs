use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{BackendClient, RequestFailed};
use crate::config::{Config, SourceKind};
use crate::error::AnalyticsError;
use crate::models::{StudentRecord, SubjectSet};

/// Largest swing between the two exams in a synthetic batch, in marks.
const SYNTHETIC_MAX_CHANGE: f64 = 15.0;

/// Records for one prediction run together with the subjects they cover.
#[derive(Debug, Clone)]
pub struct Batch {
    pub subjects: SubjectSet,
    pub records: Vec<StudentRecord>,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Batch>;
}

pub fn from_config(config: &Config) -> Result<Box<dyn DataSource>> {
    let source: Box<dyn DataSource> = match config.source {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(
            config.students,
            config.subjects.clone(),
            config.seed,
        )),
        SourceKind::Csv => {
            let path = config
                .csv
                .clone()
                .context("--source csv needs a file passed with --csv")?;
            Box::new(CsvSource::new(path))
        }
        SourceKind::Live => Box::new(LiveSource::new(
            BackendClient::new(&config.backend_url, config.timeout)?,
            config.students,
            config.subjects.clone(),
        )),
    };
    Ok(source)
}

pub struct SyntheticSource {
    students: u32,
    subjects: SubjectSet,
    seed: Option<u64>,
}

impl SyntheticSource {
    pub fn new(students: u32, subjects: SubjectSet, seed: Option<u64>) -> Self {
        Self {
            students,
            subjects,
            seed,
        }
    }

    pub fn generate(&self) -> Result<Batch> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut records = Vec::with_capacity(self.students as usize);
        for id in 1..=self.students {
            let mut exam1 = Vec::with_capacity(self.subjects.len());
            let mut exam2 = Vec::with_capacity(self.subjects.len());
            for _ in self.subjects.iter() {
                let first: f64 = rng.gen_range(0.0..100.0);
                let change: f64 = rng.gen_range(-SYNTHETIC_MAX_CHANGE..SYNTHETIC_MAX_CHANGE);
                exam1.push(first);
                exam2.push((first + change).clamp(0.0, 100.0));
            }
            records.push(StudentRecord::new(id, &self.subjects, exam1, exam2)?);
        }

        Ok(Batch {
            subjects: self.subjects.clone(),
            records,
        })
    }
}

#[async_trait]
impl DataSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn load(&self) -> Result<Batch> {
        let batch = self.generate()?;
        tracing::info!(
            students = batch.records.len(),
            seed = ?self.seed,
            "generated synthetic batch"
        );
        Ok(batch)
    }
}

pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DataSource for CsvSource {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn load(&self) -> Result<Batch> {
        let reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let batch = read_batch(reader)
            .with_context(|| format!("failed to read records from {}", self.path.display()))?;
        tracing::info!(
            students = batch.records.len(),
            path = %self.path.display(),
            "loaded csv batch"
        );
        Ok(batch)
    }
}

/// Reads `id, exam1_<subject>..., exam2_<subject>...` rows. The subject set
/// is the exam 1 columns in header order.
pub fn read_batch<R: Read>(mut reader: csv::Reader<R>) -> Result<Batch> {
    let headers = reader.headers()?.clone();

    let id_column = headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case("id"))
        .context("missing `id` column")?;

    let exam1_columns: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter_map(|(index, header)| subject_column(header, "exam1_").map(|s| (index, s)))
        .collect();
    let subjects = SubjectSet::new(exam1_columns.iter().map(|(_, subject)| *subject))
        .context("no usable exam1_<subject> columns")?;

    let mut exam2_slots: Vec<Option<usize>> = vec![None; subjects.len()];
    for (index, header) in headers.iter().enumerate() {
        if let Some(subject) = subject_column(header, "exam2_") {
            let position = subjects.index_of(subject)?;
            if exam2_slots[position].replace(index).is_some() {
                bail!("duplicate exam2_{} column", subject);
            }
        }
    }
    let found = exam2_slots.iter().filter(|slot| slot.is_some()).count();
    let exam2_columns: Vec<usize> = exam2_slots
        .into_iter()
        .collect::<Option<Vec<usize>>>()
        .ok_or(AnalyticsError::SubjectMismatch {
            expected: subjects.len(),
            found,
        })?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for (row_index, row) in reader.records().enumerate() {
        let row = row?;
        let line = row_index + 2;
        let id: u32 = field(&row, id_column, line)?
            .parse()
            .with_context(|| format!("line {}: invalid student id", line))?;
        if !seen.insert(id) {
            bail!("line {}: student {} appears more than once", line, id);
        }

        let exam1 = exam1_columns
            .iter()
            .map(|(column, _)| mark(&row, *column, line))
            .collect::<Result<Vec<f64>>>()?;
        let exam2 = exam2_columns
            .iter()
            .map(|column| mark(&row, *column, line))
            .collect::<Result<Vec<f64>>>()?;

        let record = StudentRecord::new(id, &subjects, exam1, exam2)
            .with_context(|| format!("line {}", line))?;
        records.push(record);
    }

    Ok(Batch { subjects, records })
}

fn subject_column<'a>(header: &'a str, prefix: &str) -> Option<&'a str> {
    let header = header.trim();
    let lowered = header.to_ascii_lowercase();
    if lowered.starts_with(prefix) && header.len() > prefix.len() {
        Some(&header[prefix.len()..])
    } else {
        None
    }
}

fn field<'r>(row: &'r csv::StringRecord, column: usize, line: usize) -> Result<&'r str> {
    row.get(column)
        .map(str::trim)
        .with_context(|| format!("line {}: missing column {}", line, column + 1))
}

fn mark(row: &csv::StringRecord, column: usize, line: usize) -> Result<f64> {
    let raw = field(row, column, line)?;
    raw.parse::<f64>()
        .with_context(|| format!("line {}: `{}` is not a mark", line, raw))
}

pub struct LiveSource {
    client: BackendClient,
    students: u32,
    subjects: SubjectSet,
}

impl LiveSource {
    pub fn new(client: BackendClient, students: u32, subjects: SubjectSet) -> Self {
        Self {
            client,
            students,
            subjects,
        }
    }
}

#[async_trait]
impl DataSource for LiveSource {
    fn name(&self) -> &'static str {
        "live"
    }

    /// Fetches students `1..=students`. Students the backend answers with an
    /// error status are skipped. Transport failures and marks that do not fit
    /// the subject set abort the load.
    async fn load(&self) -> Result<Batch> {
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for id in 1..=self.students {
            let marks = match self.client.student_marks(id).await {
                Ok(marks) => marks,
                Err(err) if err.downcast_ref::<RequestFailed>().is_some() => {
                    tracing::warn!(student = id, error = %err, "skipping student");
                    skipped += 1;
                    continue;
                }
                Err(err) => return Err(err.context(format!("failed to fetch student {}", id))),
            };
            records.push(
                marks
                    .into_record(id, &self.subjects)
                    .with_context(|| format!("student {} from {}", id, self.client.base_url()))?,
            );
        }

        tracing::info!(
            students = records.len(),
            skipped,
            backend = self.client.base_url(),
            "fetched live batch"
        );

        Ok(Batch {
            subjects: self.subjects.clone(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_reader(data: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(data.as_bytes())
    }

    #[test]
    fn synthetic_batches_are_reproducible_with_a_seed() {
        let source = SyntheticSource::new(25, SubjectSet::default(), Some(42));
        let first = source.generate().unwrap();
        let second = source.generate().unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.records.len(), 25);
        assert_eq!(first.records[0].id(), 1);
    }

    #[test]
    fn synthetic_marks_stay_in_range_and_close() {
        let source = SyntheticSource::new(200, SubjectSet::default(), Some(3));
        let batch = source.generate().unwrap();
        for record in &batch.records {
            for index in 0..batch.subjects.len() {
                let change = record.subject_change(index);
                assert!((0.0..=100.0).contains(&record.exam2()[index]));
                assert!(change.abs() <= SYNTHETIC_MAX_CHANGE + 1e-9);
            }
        }
    }

    #[tokio::test]
    async fn synthetic_source_loads_through_the_trait() {
        let source: Box<dyn DataSource> =
            Box::new(SyntheticSource::new(3, SubjectSet::default(), Some(1)));
        assert_eq!(source.name(), "synthetic");
        assert_eq!(source.load().await.unwrap().records.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_the_live_load() {
        let client = BackendClient::new("http://127.0.0.1:9", std::time::Duration::from_secs(1)).unwrap();
        let source = LiveSource::new(client, 3, SubjectSet::default());
        let err = source.load().await.unwrap_err();
        assert!(err.to_string().contains("failed to fetch student 1"));
        assert!(err.downcast_ref::<RequestFailed>().is_none());
    }

    #[test]
    fn reads_subjects_from_exam1_columns() {
        let data = "id,exam1_physics,exam1_maths,exam2_maths,exam2_physics\n\
                    1,60,70,80,65\n\
                    2,50,55,45,52\n";
        let batch = read_batch(csv_reader(data)).unwrap();
        assert_eq!(batch.subjects.iter().collect::<Vec<_>>(), vec!["physics", "maths"]);
        assert_eq!(batch.records[0].exam1(), &[60.0, 70.0]);
        assert_eq!(batch.records[0].exam2(), &[65.0, 80.0]);
        assert_eq!(batch.records[1].id(), 2);
    }

    #[test]
    fn exam2_column_for_unknown_subject_is_rejected() {
        let data = "id,exam1_physics,exam2_physics,exam2_art\n1,60,70,80\n";
        let err = read_batch(csv_reader(data)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalyticsError>(),
            Some(&AnalyticsError::UnknownSubject("art".to_string()))
        );
    }

    #[test]
    fn missing_exam2_column_is_a_mismatch() {
        let data = "id,exam1_physics,exam1_maths,exam2_physics\n1,60,70,80\n";
        let err = read_batch(csv_reader(data)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalyticsError>(),
            Some(&AnalyticsError::SubjectMismatch { expected: 2, found: 1 })
        );
    }

    #[test]
    fn repeated_exam2_column_is_rejected() {
        let data = "id,exam1_physics,exam2_physics,exam2_physics\n1,60,70,75\n";
        let err = read_batch(csv_reader(data)).unwrap_err();
        assert!(err.to_string().contains("duplicate exam2_physics column"));
    }

    #[test]
    fn bad_rows_report_their_line() {
        let data = "id,exam1_physics,exam2_physics\n1,60,70\n2,abc,70\n";
        let err = read_batch(csv_reader(data)).unwrap_err();
        assert!(err.to_string().contains("line 3"));

        let data = "id,exam1_physics,exam2_physics\n1,60,70\n1,50,70\n";
        let err = read_batch(csv_reader(data)).unwrap_err();
        assert!(err.to_string().contains("appears more than once"));
    }

    #[test]
    fn header_only_file_yields_an_empty_batch() {
        let batch = read_batch(csv_reader("id,exam1_physics,exam2_physics\n")).unwrap();
        assert!(batch.records.is_empty());
    }
}
