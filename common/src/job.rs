use serde::{Deserialize, Serialize};

/// Maximum length of a job name accepted by the batch service.
pub const MAX_JOB_NAME_LEN: usize = 128;

pub const ENV_TARGET: &str = "TARGET";
pub const ENV_TAG: &str = "TAG";
pub const ENV_CONFIG: &str = "CONFIG";

/// One job to be handed to the batch service.
///
/// Only `job_name` is required. Which of the optional fields are populated
/// decides the shape of the container overrides, see [`JobSpec::overrides`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_index: Option<u32>,
}

impl JobSpec {
    pub fn named(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            target_action: None,
            tag: None,
            command: None,
            config_path: None,
            run_index: None,
        }
    }

    pub fn with_target(mut self, target_action: impl Into<String>, tag: impl Into<String>) -> Self {
        self.target_action = Some(target_action.into());
        self.tag = Some(tag.into());
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_config_path(mut self, config_path: impl Into<String>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }

    pub fn overrides(&self) -> ContainerOverrides {
        match (&self.target_action, &self.tag, &self.command) {
            (Some(target), Some(tag), _) => ContainerOverrides::Environment {
                target: target.clone(),
                tag: tag.clone(),
                config: self.config_path.clone(),
            },
            (_, _, Some(command)) if !command.is_empty() => {
                ContainerOverrides::Command(command.clone())
            }
            _ => ContainerOverrides::None,
        }
    }

    /// Checks the job name against the batch service naming rules.
    pub fn validate(&self) -> Result<(), String> {
        let name = &self.job_name;
        let mut chars = name.chars();
        match chars.next() {
            None => return Err("job name is empty".to_string()),
            Some(c) if !c.is_ascii_alphanumeric() => {
                return Err(format!("job name {:?} must start with a letter or digit", name));
            }
            Some(_) => {}
        }
        if name.len() > MAX_JOB_NAME_LEN {
            return Err(format!(
                "job name {:?} is longer than {} characters",
                name, MAX_JOB_NAME_LEN
            ));
        }
        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')) {
            return Err(format!("job name {:?} contains invalid character {:?}", name, bad));
        }
        Ok(())
    }
}

/// Per-submission overrides of the job definition's container settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerOverrides {
    None,
    Command(Vec<String>),
    /// Sent as `TARGET` and `TAG`, plus `CONFIG` when the spec names a
    /// makefile fragment so the container can find it.
    Environment {
        target: String,
        tag: String,
        config: Option<String>,
    },
}

impl ContainerOverrides {
    /// Environment pairs in the order they are sent.
    pub fn environment(&self) -> Vec<(&'static str, &str)> {
        match self {
            ContainerOverrides::Environment { target, tag, config } => {
                let mut env = vec![(ENV_TARGET, target.as_str()), (ENV_TAG, tag.as_str())];
                if let Some(config) = config {
                    env.push((ENV_CONFIG, config.as_str()));
                }
                env
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Statuses in which a job still occupies the queue.
    pub const ACTIVE: [JobStatus; 5] = [
        JobStatus::Submitted,
        JobStatus::Pending,
        JobStatus::Runnable,
        JobStatus::Starting,
        JobStatus::Running,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Pending => "PENDING",
            JobStatus::Runnable => "RUNNABLE",
            JobStatus::Starting => "STARTING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(JobStatus::Submitted),
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNABLE" => Ok(JobStatus::Runnable),
            "STARTING" => Ok(JobStatus::Starting),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCEEDED" => Ok(JobStatus::Succeeded),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_environment_when_target_and_tag() {
        let spec = JobSpec::named("a_b_run_1")
            .with_target("run", "a")
            .with_config_path("a/b.mk");
        let overrides = spec.overrides();
        assert_eq!(
            overrides.environment(),
            vec![("TARGET", "run"), ("TAG", "a"), ("CONFIG", "a/b.mk")]
        );
    }

    #[test]
    fn test_overrides_command_without_target() {
        let spec = JobSpec::named("adhoc").with_command(vec!["make".into(), "all".into()]);
        assert_eq!(
            spec.overrides(),
            ContainerOverrides::Command(vec!["make".into(), "all".into()])
        );
    }

    #[test]
    fn test_target_wins_over_command() {
        let spec = JobSpec::named("x")
            .with_command(vec!["echo".into()])
            .with_target("run", "t");
        assert!(matches!(spec.overrides(), ContainerOverrides::Environment { .. }));
    }

    #[test]
    fn test_overrides_none_for_bare_name() {
        assert_eq!(JobSpec::named("x").overrides(), ContainerOverrides::None);

        // Half a target/tag pair is not enough for environment overrides
        let mut spec = JobSpec::named("x");
        spec.tag = Some("t".into());
        assert_eq!(spec.overrides(), ContainerOverrides::None);
    }

    #[test]
    fn test_validate_job_names() {
        assert!(JobSpec::named("cllnormal_cllnormal_run_1").validate().is_ok());
        assert!(JobSpec::named("a-b").validate().is_ok());
        assert!(JobSpec::named("").validate().is_err());
        assert!(JobSpec::named("_leading").validate().is_err());
        assert!(JobSpec::named("has space").validate().is_err());
        assert!(JobSpec::named("a".repeat(129)).validate().is_err());
        assert!(JobSpec::named("a".repeat(128)).validate().is_ok());
    }

    #[test]
    fn test_status_parse_and_active() {
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert!("bogus".parse::<JobStatus>().is_err());
        assert!(JobStatus::Runnable.is_active());
        assert!(!JobStatus::Succeeded.is_active());
        assert!(!JobStatus::Failed.is_active());
    }
}
