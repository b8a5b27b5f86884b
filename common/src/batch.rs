use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BatchError;
use crate::job::{ContainerOverrides, JobStatus};

/// Queue and job definition every submission goes to.
///
/// Resolved once at startup and handed to the submitter by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTarget {
    pub job_queue: String,
    pub job_definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub job_name: String,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub revision: u32,
    pub arn: String,
    pub status: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: String,
    pub job_name: String,
    pub job_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitJobRequest {
    pub job_name: String,
    pub job_queue: String,
    pub job_definition: String,
    pub overrides: ContainerOverrides,
}

/// The remote batch service as seen by the submitter.
#[async_trait]
pub trait BatchService: Send + Sync {
    async fn list_jobs(&self, job_queue: &str, status: JobStatus) -> Result<Vec<JobSummary>, BatchError>;

    async fn describe_job_definitions(&self, status: &str) -> Result<Vec<JobDefinition>, BatchError>;

    async fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmittedJob, BatchError>;
}
