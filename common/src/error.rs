use thiserror::Error;

/// Failure talking to the batch service. Never retried.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to run {program} for {operation}: {source}")]
    Spawn {
        program: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed ({status}): {stderr}")]
    Remote {
        operation: &'static str,
        status: String,
        stderr: String,
    },

    #[error("could not decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("malformed job spec: {0}")]
    MalformedSpec(String),

    #[error(transparent)]
    Remote(#[from] BatchError),
}

/// Inputs that would give two distinct jobs the same name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnumerateError {
    #[error("run type {0:?} must be non-empty and must not contain '_'")]
    InvalidRunType(String),

    #[error("job name {0} would be generated more than once")]
    DuplicateJobName(String),
}
