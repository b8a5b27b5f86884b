mod aws;
mod config;

use anyhow::Context;
use aws::AwsCli;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use common::{enumerate_jobs, BatchService, JobSpec, JobStatus, SubmissionResult, Submitter};
use config::{Config, LoggingConfig, Overrides};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Job queue, overrides the config file
    #[arg(long, global = true)]
    queue: Option<String>,
    /// Job definition, overrides the config file
    #[arg(long, global = true)]
    job_definition: Option<String>,
    #[arg(long, global = true)]
    region: Option<String>,
    #[arg(long, global = true)]
    profile: Option<String>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit every run of the given experiments
    Submit {
        /// Experiment family, used as job name prefix and config directory
        tag: String,
        /// Repetitions per experiment and run type
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
        #[arg(required = true)]
        experiments: Vec<String>,
        /// Run type to submit, may be repeated (default from config)
        #[arg(long = "run-type")]
        run_types: Vec<String>,
        /// Print the jobs without contacting the batch service
        #[arg(long)]
        dry_run: bool,
    },
    /// Submit a single named job
    SubmitOne {
        job_name: String,
        /// Make target passed as TARGET
        #[arg(long, requires = "tag")]
        target: Option<String>,
        /// Tag passed as TAG
        #[arg(long, requires = "target")]
        tag: Option<String>,
        /// Config fragment passed as CONFIG
        #[arg(long)]
        config_path: Option<String>,
        /// Command override, used when no target is given
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// List jobs in the queue
    List {
        /// Status to list, may be repeated (default: all active statuses)
        #[arg(long)]
        status: Vec<JobStatus>,
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Show active job definitions
    Definitions {
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// Write pipeline makefile fragments for experiments
    Init {
        tag: String,
        #[arg(required = true)]
        experiments: Vec<String>,
        /// Directory the <tag>/ folder is created in
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Overwrite existing fragments
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.merge_overrides(Overrides {
        job_queue: cli.queue,
        job_definition: cli.job_definition,
        region: cli.region,
        profile: cli.profile,
    });
    setup_logging(&config.logging, cli.verbose)?;

    let submitter = Submitter::new(AwsCli::from_config(&config.batch), config.batch.target());

    match cli.command {
        Commands::Submit { tag, count, experiments, run_types, dry_run } => {
            let run_types = if run_types.is_empty() { config.run_types.clone() } else { run_types };
            submit_experiments(&submitter, &tag, count, &experiments, &run_types, dry_run).await
        },
        Commands::SubmitOne { job_name, target, tag, config_path, command } => {
            let mut spec = JobSpec::named(job_name);
            if let (Some(target), Some(tag)) = (target, tag) {
                spec = spec.with_target(target, tag);
            }
            if let Some(path) = config_path {
                spec = spec.with_config_path(path);
            }
            if !command.is_empty() {
                spec = spec.with_command(command);
            }
            submit_and_report(&submitter, std::slice::from_ref(&spec)).await
        },
        Commands::List { status, format } => {
            let statuses = if status.is_empty() { JobStatus::ACTIVE.to_vec() } else { status };
            let queue = &submitter.target().job_queue;
            let mut jobs = Vec::new();
            for status in statuses {
                let listed = submitter
                    .backend()
                    .list_jobs(queue, status)
                    .await
                    .with_context(|| format!("Failed to list {} jobs in {}", status, queue))?;
                jobs.extend(listed);
            }
            let rows = jobs
                .iter()
                .map(|job| {
                    vec![
                        job.job_name.clone(),
                        job.status.map(|s| s.to_string()).unwrap_or_default(),
                        job.job_id.clone(),
                    ]
                })
                .collect();
            emit(format, &["Name", "Status", "Job ID"], rows, &jobs)?;
            Ok(true)
        },
        Commands::Definitions { format } => {
            let definitions = submitter
                .definitions()
                .await
                .context("Failed to describe job definitions")?;
            let rows = definitions
                .iter()
                .map(|def| {
                    vec![
                        def.name.clone(),
                        def.revision.to_string(),
                        def.status.clone().unwrap_or_default(),
                        def.image.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            emit(format, &["Name", "Revision", "Status", "Image"], rows, &definitions)?;
            Ok(true)
        },
        Commands::Init { tag, experiments, dir, force } => {
            let written = common::write_fragments(&dir, &tag, &experiments, &config.pipeline, force)?;
            println!("Wrote {} of {} fragment(s)", written.len(), experiments.len());
            Ok(true)
        },
    }
}

/// Enumerates the runs of `experiments` and submits them, or only prints
/// them when `dry_run` is set.
async fn submit_experiments<B: BatchService>(
    submitter: &Submitter<B>,
    tag: &str,
    count: u32,
    experiments: &[String],
    run_types: &[String],
    dry_run: bool,
) -> anyhow::Result<bool> {
    let specs = enumerate_jobs(tag, count, experiments, run_types)
        .with_context(|| format!("Cannot enumerate jobs for tag {}", tag))?;
    log::info!(
        "{} job(s) for tag {} on queue {}",
        specs.len(),
        tag,
        submitter.target().job_queue
    );

    if dry_run {
        print_plan(&specs);
        return Ok(true);
    }
    submit_and_report(submitter, &specs).await
}

async fn submit_and_report<B: BatchService>(submitter: &Submitter<B>, specs: &[JobSpec]) -> anyhow::Result<bool> {
    let report = submitter.submit_all(specs).await;

    let mut table = Table::new();
    table.set_header(vec!["Job", "Result"]);
    for (name, outcome) in &report.outcomes {
        let result = match outcome {
            Ok(SubmissionResult::Submitted(job)) => format!("submitted ({})", job.job_id),
            Ok(SubmissionResult::AlreadySubmitted) => "already submitted".to_string(),
            Err(e) => format!("error: {}", e),
        };
        table.add_row(vec![name.clone(), result]);
    }
    println!("{table}");
    println!(
        "{} submitted, {} skipped, {} failed",
        report.submitted(),
        report.skipped(),
        report.failed()
    );
    Ok(report.is_success())
}

fn print_plan(specs: &[JobSpec]) {
    let mut table = Table::new();
    table.set_header(vec!["Job", "Target", "Tag", "Config", "Run"]);
    for spec in specs {
        table.add_row(vec![
            spec.job_name.clone(),
            spec.target_action.clone().unwrap_or_default(),
            spec.tag.clone().unwrap_or_default(),
            spec.config_path.clone().unwrap_or_default(),
            spec.run_index.map(|i| i.to_string()).unwrap_or_default(),
        ]);
    }
    println!("{table}");
}

fn emit<T: Serialize>(format: Format, headers: &[&str], rows: Vec<Vec<String>>, items: &[T]) -> anyhow::Result<()> {
    match format {
        Format::Table => {
            let mut table = Table::new();
            table.set_header(headers.to_vec());
            for row in rows {
                table.add_row(row);
            }
            println!("{table}");
        },
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(headers)?;
            for row in rows {
                writer.write_record(&row)?;
            }
            writer.flush()?;
        },
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        },
    }
    Ok(())
}

fn setup_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        config.level.parse().unwrap_or(log::LevelFilter::Info)
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    let log_file = std::env::var(common::LOG_ENV)
        .ok()
        .map(PathBuf::from)
        .or_else(|| config.output.clone());
    if let Some(path) = log_file {
        dispatch = dispatch.chain(
            fern::log_file(&path).with_context(|| format!("Failed to open log file: {:?}", path))?,
        );
    }

    dispatch.apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "flowbatch", "--queue", "q", "submit", "cllnormal", "10", "cllnormal", "other", "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.queue.as_deref(), Some("q"));
        match cli.command {
            Commands::Submit { tag, count, experiments, dry_run, run_types } => {
                assert_eq!(tag, "cllnormal");
                assert_eq!(count, 10);
                assert_eq!(experiments, vec!["cllnormal", "other"]);
                assert!(dry_run);
                assert!(run_types.is_empty());
            },
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_submit_rejects_zero_count_and_missing_experiments() {
        assert!(Cli::try_parse_from(["flowbatch", "submit", "t", "0", "e"]).is_err());
        assert!(Cli::try_parse_from(["flowbatch", "submit", "t", "3"]).is_err());
    }

    #[test]
    fn test_submit_one_target_requires_tag() {
        assert!(Cli::try_parse_from(["flowbatch", "submit-one", "job", "--target", "run"]).is_err());
        let cli = Cli::try_parse_from(["flowbatch", "submit-one", "job", "--", "make", "all"]).unwrap();
        match cli.command {
            Commands::SubmitOne { command, target, .. } => {
                assert_eq!(command, vec!["make", "all"]);
                assert!(target.is_none());
            },
            _ => panic!("expected submit-one"),
        }
    }

    #[test]
    fn test_list_status_parsing() {
        let cli = Cli::try_parse_from(["flowbatch", "list", "--status", "running", "--status", "FAILED"]).unwrap();
        match cli.command {
            Commands::List { status, .. } => assert_eq!(status, vec![JobStatus::Running, JobStatus::Failed]),
            _ => panic!("expected list"),
        }
    }

    /// Records calls; submissions named in `reject` fail, nothing is active.
    #[derive(Default)]
    struct RecordingBatch {
        reject: Vec<String>,
        list_calls: std::sync::Mutex<usize>,
        submitted: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl BatchService for RecordingBatch {
        async fn list_jobs(&self, _job_queue: &str, _status: JobStatus) -> Result<Vec<common::JobSummary>, common::BatchError> {
            *self.list_calls.lock().unwrap() += 1;
            Ok(Vec::new())
        }

        async fn describe_job_definitions(&self, _status: &str) -> Result<Vec<common::JobDefinition>, common::BatchError> {
            Ok(Vec::new())
        }

        async fn submit_job(&self, request: &common::SubmitJobRequest) -> Result<common::SubmittedJob, common::BatchError> {
            if self.reject.contains(&request.job_name) {
                return Err(common::BatchError::Remote {
                    operation: "submit-job",
                    status: "exit status: 254".to_string(),
                    stderr: "ClientException: job queue is not VALID".to_string(),
                });
            }
            self.submitted.lock().unwrap().push(request.job_name.clone());
            Ok(common::SubmittedJob {
                job_id: format!("id-{}", request.job_name),
                job_name: request.job_name.clone(),
                job_arn: None,
            })
        }
    }

    fn submitter(backend: RecordingBatch) -> Submitter<RecordingBatch> {
        Submitter::new(backend, config::Config::default().batch.target())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failed_submission_reports_failure() {
        let submitter = submitter(RecordingBatch {
            reject: strings(&["t_b_run_1"]),
            ..Default::default()
        });

        let ok = submit_experiments(&submitter, "t", 1, &strings(&["a", "b", "c"]), &strings(&["run"]), false)
            .await
            .unwrap();

        assert!(!ok);
        assert_eq!(*submitter.backend().submitted.lock().unwrap(), strings(&["t_a_run_1", "t_c_run_1"]));
    }

    #[tokio::test]
    async fn test_all_submitted_reports_success() {
        let submitter = submitter(RecordingBatch::default());
        let ok = submit_experiments(&submitter, "t", 2, &strings(&["a"]), &strings(&["run"]), false)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(submitter.backend().submitted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_remote_calls() {
        let submitter = submitter(RecordingBatch::default());
        let ok = submit_experiments(&submitter, "t", 3, &strings(&["a", "b"]), &strings(&["run"]), true)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(*submitter.backend().list_calls.lock().unwrap(), 0);
        assert!(submitter.backend().submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_run_type_is_an_error() {
        let submitter = submitter(RecordingBatch::default());
        let result = submit_experiments(&submitter, "t", 1, &strings(&["a"]), &strings(&["x_run"]), false).await;
        assert!(result.is_err());
        assert_eq!(*submitter.backend().list_calls.lock().unwrap(), 0);
    }
}
