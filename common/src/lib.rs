pub mod batch;
pub mod enumerate;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod submitter;

pub use batch::{BatchService, BatchTarget, JobDefinition, JobSummary, SubmitJobRequest, SubmittedJob};
pub use enumerate::{enumerate_jobs, DEFAULT_RUN_TYPES};
pub use error::{BatchError, EnumerateError, SubmitError};
pub use job::{ContainerOverrides, JobSpec, JobStatus};
pub use pipeline::{write_fragments, PipelineVars};
pub use submitter::{BatchReport, SubmissionResult, Submitter};

pub const DEFAULT_JOB_QUEUE: &str = "flowcat-queue";
pub const DEFAULT_JOB_DEFINITION: &str = "flowcat-job";
pub const DEFAULT_AWS_BIN: &str = "aws";

// Config lookup order: --config, $FLOWBATCH_CONFIG, ./flowbatch.yaml
pub const CONFIG_ENV: &str = "FLOWBATCH_CONFIG";
pub const LOG_ENV: &str = "FLOWBATCH_LOG";
pub const LOCAL_CONFIG_PATH: &str = "flowbatch.yaml";
