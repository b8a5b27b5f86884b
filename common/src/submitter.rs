use std::collections::HashSet;

use crate::batch::{BatchService, BatchTarget, JobDefinition, SubmitJobRequest, SubmittedJob};
use crate::error::{BatchError, SubmitError};
use crate::job::{JobSpec, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Submitted(SubmittedJob),
    /// A job with the same name is still active, nothing was sent.
    AlreadySubmitted,
}

/// Outcome of submitting a batch of specs, in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, Result<SubmissionResult, SubmitError>)>,
}

impl BatchReport {
    pub fn submitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, r)| matches!(r, Ok(SubmissionResult::Submitted(_))))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, r)| matches!(r, Ok(SubmissionResult::AlreadySubmitted)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Submits job specs unless a job with the same name is already active.
///
/// Each decision is made against a fresh listing of the queue. Two processes
/// submitting the same name at the same time can both pass the check; that
/// race is not guarded against.
pub struct Submitter<B> {
    backend: B,
    target: BatchTarget,
}

impl<B: BatchService> Submitter<B> {
    pub fn new(backend: B, target: BatchTarget) -> Self {
        Self { backend, target }
    }

    pub fn target(&self) -> &BatchTarget {
        &self.target
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Names of all jobs in the queue with an active status.
    pub async fn active_job_names(&self) -> Result<HashSet<String>, BatchError> {
        let mut names = HashSet::new();
        for status in JobStatus::ACTIVE {
            let jobs = self.backend.list_jobs(&self.target.job_queue, status).await?;
            log::debug!("{} {} job(s) in {}", jobs.len(), status, self.target.job_queue);
            names.extend(jobs.into_iter().map(|job| job.job_name));
        }
        Ok(names)
    }

    pub async fn submit(&self, spec: &JobSpec) -> Result<SubmissionResult, SubmitError> {
        spec.validate().map_err(SubmitError::MalformedSpec)?;

        let active = self.active_job_names().await?;
        if active.contains(&spec.job_name) {
            log::info!("Job {} already submitted, skipping", spec.job_name);
            return Ok(SubmissionResult::AlreadySubmitted);
        }

        let request = SubmitJobRequest {
            job_name: spec.job_name.clone(),
            job_queue: self.target.job_queue.clone(),
            job_definition: self.target.job_definition.clone(),
            overrides: spec.overrides(),
        };
        let submitted = self.backend.submit_job(&request).await?;
        log::info!("Submitted job {} (id: {})", submitted.job_name, submitted.job_id);
        Ok(SubmissionResult::Submitted(submitted))
    }

    /// Submits specs one after another. A failing spec is recorded and the
    /// rest still go out.
    pub async fn submit_all<'a, I>(&self, specs: I) -> BatchReport
    where
        I: IntoIterator<Item = &'a JobSpec>,
    {
        let mut report = BatchReport::default();
        for spec in specs {
            let result = self.submit(spec).await;
            if let Err(ref e) = result {
                log::error!("Failed to submit job {}: {}", spec.job_name, e);
            }
            report.outcomes.push((spec.job_name.clone(), result));
        }
        report
    }

    pub async fn definitions(&self) -> Result<Vec<JobDefinition>, BatchError> {
        self.backend.describe_job_definitions("ACTIVE").await
    }
}
