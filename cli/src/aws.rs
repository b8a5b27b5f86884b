//! `BatchService` backed by the `aws batch` command-line client.

use async_trait::async_trait;
use common::{
    BatchError, BatchService, ContainerOverrides, JobDefinition, JobStatus, JobSummary,
    SubmitJobRequest, SubmittedJob,
};
use serde::Deserialize;
use tokio::process::Command;

use crate::config::BatchConfig;

pub struct AwsCli {
    program: String,
    region: Option<String>,
    profile: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListJobsOutput {
    #[serde(default)]
    job_summary_list: Vec<AwsJobSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwsJobSummary {
    job_id: String,
    job_name: String,
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeJobDefinitionsOutput {
    #[serde(default)]
    job_definitions: Vec<AwsJobDefinition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AwsJobDefinition {
    job_definition_name: String,
    job_definition_arn: String,
    revision: u32,
    status: Option<String>,
    container_properties: Option<ContainerProperties>,
}

#[derive(Deserialize)]
struct ContainerProperties {
    image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobOutput {
    job_id: String,
    job_name: String,
    job_arn: Option<String>,
}

fn decode<'a, T: Deserialize<'a>>(operation: &'static str, bytes: &'a [u8]) -> Result<T, BatchError> {
    serde_json::from_slice(bytes).map_err(|source| BatchError::Decode { operation, source })
}

fn decode_list_jobs(bytes: &[u8]) -> Result<Vec<JobSummary>, BatchError> {
    let output: ListJobsOutput = decode("list-jobs", bytes)?;
    Ok(output
        .job_summary_list
        .into_iter()
        .map(|job| JobSummary {
            job_id: job.job_id,
            job_name: job.job_name,
            status: job.status.and_then(|s| s.parse().ok()),
        })
        .collect())
}

fn decode_job_definitions(bytes: &[u8]) -> Result<Vec<JobDefinition>, BatchError> {
    let output: DescribeJobDefinitionsOutput = decode("describe-job-definitions", bytes)?;
    Ok(output
        .job_definitions
        .into_iter()
        .map(|def| JobDefinition {
            name: def.job_definition_name,
            revision: def.revision,
            arn: def.job_definition_arn,
            status: def.status,
            image: def.container_properties.and_then(|c| c.image),
        })
        .collect())
}

fn decode_submit_job(bytes: &[u8]) -> Result<SubmittedJob, BatchError> {
    let output: SubmitJobOutput = decode("submit-job", bytes)?;
    Ok(SubmittedJob {
        job_id: output.job_id,
        job_name: output.job_name,
        job_arn: output.job_arn,
    })
}

/// JSON accepted by `--container-overrides`, `None` when nothing is overridden.
fn container_overrides_json(overrides: &ContainerOverrides) -> Option<String> {
    match overrides {
        ContainerOverrides::None => None,
        ContainerOverrides::Command(command) => {
            Some(serde_json::json!({ "command": command }).to_string())
        }
        ContainerOverrides::Environment { .. } => {
            let environment: Vec<_> = overrides
                .environment()
                .into_iter()
                .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
                .collect();
            Some(serde_json::json!({ "environment": environment }).to_string())
        }
    }
}

impl AwsCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            region: None,
            profile: None,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            region: config.region.clone(),
            profile: config.profile.clone(),
            ..Self::new(config.aws_bin.clone())
        }
    }

    fn command_args(&self, operation: &str, args: Vec<String>) -> Vec<String> {
        let mut all = Vec::with_capacity(args.len() + 7);
        if let Some(ref region) = self.region {
            all.push("--region".to_string());
            all.push(region.clone());
        }
        if let Some(ref profile) = self.profile {
            all.push("--profile".to_string());
            all.push(profile.clone());
        }
        all.push("batch".to_string());
        all.push(operation.to_string());
        all.extend(args);
        all.push("--output".to_string());
        all.push("json".to_string());
        all
    }

    fn list_jobs_args(&self, job_queue: &str, status: JobStatus) -> Vec<String> {
        self.command_args(
            "list-jobs",
            vec![
                "--job-queue".to_string(),
                job_queue.to_string(),
                "--job-status".to_string(),
                status.to_string(),
            ],
        )
    }

    fn describe_job_definitions_args(&self, status: &str) -> Vec<String> {
        self.command_args(
            "describe-job-definitions",
            vec!["--status".to_string(), status.to_string()],
        )
    }

    fn submit_job_args(&self, request: &SubmitJobRequest) -> Vec<String> {
        let mut args = vec![
            "--job-name".to_string(),
            request.job_name.clone(),
            "--job-queue".to_string(),
            request.job_queue.clone(),
            "--job-definition".to_string(),
            request.job_definition.clone(),
        ];
        if let Some(overrides) = container_overrides_json(&request.overrides) {
            args.push("--container-overrides".to_string());
            args.push(overrides);
        }
        self.command_args("submit-job", args)
    }

    async fn run(&self, operation: &'static str, args: Vec<String>) -> Result<Vec<u8>, BatchError> {
        log::debug!("Running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|source| BatchError::Spawn {
                program: self.program.clone(),
                operation,
                source,
            })?;

        if !output.status.success() {
            return Err(BatchError::Remote {
                operation,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl BatchService for AwsCli {
    async fn list_jobs(&self, job_queue: &str, status: JobStatus) -> Result<Vec<JobSummary>, BatchError> {
        let stdout = self.run("list-jobs", self.list_jobs_args(job_queue, status)).await?;
        decode_list_jobs(&stdout)
    }

    async fn describe_job_definitions(&self, status: &str) -> Result<Vec<JobDefinition>, BatchError> {
        let stdout = self
            .run("describe-job-definitions", self.describe_job_definitions_args(status))
            .await?;
        decode_job_definitions(&stdout)
    }

    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmittedJob, BatchError> {
        let stdout = self.run("submit-job", self.submit_job_args(request)).await?;
        decode_submit_job(&stdout)
    }
}
