use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod backend;
mod config;
mod error;
mod insights;
mod models;
mod report;
mod responder;
mod source;
mod state;

use backend::BackendClient;
use config::{Config, ConfigArgs, SourceKind};
use error::AnalyticsError;
use state::AnalyticsState;

#[derive(Parser)]
#[command(name = "exam-insights")]
#[command(about = "Exam analytics, insights and a query assistant for student performance predictions", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload first exam marks to the prediction backend
    UploadExam1 {
        #[arg(long)]
        file: PathBuf,
    },
    /// Train the backend prediction models
    Train,
    /// Upload a file and predict second exam marks
    Predict {
        #[arg(long)]
        file: PathBuf,
    },
    /// Show one student's marks and insights
    Student { id: u32 },
    /// Print the headline statistics for the batch
    Summary,
    /// Print the ordered insight statements for the batch
    Insights,
    /// Generate a full analytics report
    Report {
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
    },
    /// Ask the assistant a single question
    Ask {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Chat with the assistant until `quit`
    Chat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.into_config()?;

    match run(cli.command, &config).await {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<AnalyticsError>() {
            Some(analytics) => {
                tracing::debug!(error = %err, "analytics error");
                eprintln!("{}", analytics.user_message());
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}

async fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::UploadExam1 { file } => {
            let client = backend_client(config)?;
            let outcome = client.upload_exam1(&file).await?;
            println!("{}", outcome.message);
            println!("Records uploaded: {}", outcome.records.unwrap_or(0));
        }
        Commands::Train => {
            let client = backend_client(config)?;
            let outcome = client.train_models().await?;
            println!("{}", outcome.message);
        }
        Commands::Predict { file } => {
            let client = backend_client(config)?;
            let outcome = client.predict_exam2(&file).await?;
            println!("{}", outcome.message);
            println!("Predictions generated: {}", outcome.records.unwrap_or(0));
        }
        Commands::Student { id } => {
            let (record, subjects) = if config.source == SourceKind::Live {
                let client = backend_client(config)?;
                let marks = client.student_marks(id).await?;
                (marks.into_record(id, &config.subjects)?, config.subjects.clone())
            } else {
                let state = load_state(config).await?;
                let record = state
                    .find(id)
                    .cloned()
                    .with_context(|| format!("Student {} is not in the current batch", id))?;
                (record, state.subjects().clone())
            };
            print!("{}", report::build_student_report(&record, &subjects));
        }
        Commands::Summary => {
            let state = load_state(config).await?;
            print!("{}", report::render_summary(state.require_report()?));
        }
        Commands::Insights => {
            let state = load_state(config).await?;
            for insight in insights::generate_insights(state.require_report()?) {
                println!("- {}", insight.message);
            }
        }
        Commands::Report { out, format } => {
            let state = load_state(config).await?;
            let summary = state.require_report()?;
            let statements = insights::generate_insights(summary);
            let generated_at = chrono::Utc::now();

            let rendered = match format {
                ReportFormat::Markdown => report::build_report(summary, &statements, generated_at),
                ReportFormat::Json => serde_json::to_string_pretty(&report::ReportJson {
                    generated_at,
                    report: summary,
                    insights: &statements,
                })?,
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{}", rendered),
            }
        }
        Commands::Ask { query } => {
            let state = load_state_or_empty(config).await;
            let mut rng = rand::thread_rng();
            answer(&query.join(" "), &state, config, &mut rng).await;
        }
        Commands::Chat => {
            let state = load_state_or_empty(config).await;
            let mut rng = rand::thread_rng();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            println!("Ask about students, subjects or the batch. Type `quit` to leave.");
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                    break;
                }
                answer(line, &state, config, &mut rng).await;
            }
        }
    }

    Ok(())
}

fn backend_client(config: &Config) -> anyhow::Result<BackendClient> {
    BackendClient::new(&config.backend_url, config.timeout)
}

async fn load_state(config: &Config) -> anyhow::Result<AnalyticsState> {
    let source = source::from_config(config)?;
    tracing::info!(source = source.name(), "loading student records");
    let batch = source.load().await?;

    let mut state = AnalyticsState::new(batch.subjects.clone());
    state.load(batch.subjects, batch.records)?;
    Ok(state)
}

/// The assistant still answers without data, so a failed load only warns.
async fn load_state_or_empty(config: &Config) -> AnalyticsState {
    match load_state(config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(error = %err, "no analytics data loaded");
            AnalyticsState::new(config.subjects.clone())
        }
    }
}

async fn answer(query: &str, state: &AnalyticsState, config: &Config, rng: &mut impl rand::Rng) {
    let response = responder::respond(query, state, rng);
    tracing::debug!(intent = ?response.intent, "answered query");
    if let Some(delay) = config.delay {
        tokio::time::sleep(delay.sample(rng)).await;
    }
    println!("{}", response.text);
    println!();
}
