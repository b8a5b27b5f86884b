use anyhow::{Context, Result};
use common::{BatchTarget, PipelineVars};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_job_queue")]
    pub job_queue: String,
    #[serde(default = "default_job_definition")]
    pub job_definition: String,
    pub region: Option<String>,
    pub profile: Option<String>,
    #[serde(default = "default_aws_bin")]
    pub aws_bin: String,
}

fn default_job_queue() -> String { common::DEFAULT_JOB_QUEUE.to_string() }
fn default_job_definition() -> String { common::DEFAULT_JOB_DEFINITION.to_string() }
fn default_aws_bin() -> String { common::DEFAULT_AWS_BIN.to_string() }

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            job_queue: default_job_queue(),
            job_definition: default_job_definition(),
            region: None,
            profile: None,
            aws_bin: default_aws_bin(),
        }
    }
}

impl BatchConfig {
    pub fn target(&self) -> BatchTarget {
        BatchTarget {
            job_queue: self.job_queue.clone(),
            job_definition: self.job_definition.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

fn default_run_types() -> Vec<String> {
    common::DEFAULT_RUN_TYPES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_run_types")]
    pub run_types: Vec<String>,
    #[serde(default)]
    pub pipeline: PipelineVars,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
            run_types: default_run_types(),
            pipeline: PipelineVars::default(),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub job_queue: Option<String>,
    pub job_definition: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl Config {
    /// Parses a `.yaml`/`.yml` or `.toml` file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !matches!(ext, "yaml" | "yml" | "toml") {
            anyhow::bail!("Unsupported config file format {:?}. Use .yaml, .yml, or .toml", path);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let parsed: Result<Config> = if ext == "toml" {
            toml::from_str(&content).map_err(anyhow::Error::from)
        } else {
            serde_yaml::from_str(&content).map_err(anyhow::Error::from)
        };
        parsed.with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Resolve the config file to use: explicit path, then `$FLOWBATCH_CONFIG`,
    /// then `./flowbatch.yaml`. Falls back to defaults when none exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(
            explicit,
            std::env::var_os(common::CONFIG_ENV).map(PathBuf::from),
            Path::new(common::LOCAL_CONFIG_PATH),
        )
    }

    fn load_from(explicit: Option<&Path>, from_env: Option<PathBuf>, local: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = from_env {
            return Self::from_file(&path);
        }
        if local.exists() {
            return Self::from_file(local);
        }
        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn merge_overrides(&mut self, overrides: Overrides) {
        if let Some(queue) = overrides.job_queue {
            self.batch.job_queue = queue;
        }
        if let Some(definition) = overrides.job_definition {
            self.batch.job_definition = definition;
        }
        if overrides.region.is_some() {
            self.batch.region = overrides.region;
        }
        if overrides.profile.is_some() {
            self.batch.profile = overrides.profile;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.batch.job_queue, "flowcat-queue");
        assert_eq!(config.batch.job_definition, "flowcat-job");
        assert_eq!(config.batch.aws_bin, "aws");
        assert_eq!(config.run_types, vec!["run"]);
        assert_eq!(config.pipeline, PipelineVars::default());
    }

    #[test]
    fn test_yaml_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowbatch.yaml");
        fs::write(
            &path,
            "batch:\n  job_queue: gpu-queue\n  region: eu-central-1\npipeline:\n  num: 10\n  plot: false\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.batch.job_queue, "gpu-queue");
        assert_eq!(config.batch.job_definition, "flowcat-job");
        assert_eq!(config.batch.region.as_deref(), Some("eu-central-1"));
        assert_eq!(config.pipeline.num, 10);
        assert!(!config.pipeline.plot);
        assert_eq!(config.pipeline.upsampling_num, 800);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowbatch.toml");
        fs::write(
            &path,
            "run_types = [\"run\", \"report\"]\n\n[batch]\njob_definition = \"flowcat-job:7\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.run_types, vec!["run", "report"]);
        assert_eq!(config.batch.job_definition, "flowcat-job:7");
        assert_eq!(config.batch.job_queue, "flowcat-queue");
    }

    #[test]
    fn test_unknown_extension() {
        assert!(Config::from_file(Path::new("flowbatch.ini")).is_err());
    }

    #[test]
    fn test_merge_overrides() {
        let mut config = Config::default();
        config.batch.region = Some("us-east-1".to_string());
        config.merge_overrides(Overrides {
            job_queue: Some("other".to_string()),
            profile: Some("lab".to_string()),
            ..Default::default()
        });
        assert_eq!(config.batch.job_queue, "other");
        assert_eq!(config.batch.job_definition, "flowcat-job");
        assert_eq!(config.batch.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.batch.profile.as_deref(), Some("lab"));
        assert_eq!(config.batch.target().job_queue, "other");
    }

    #[test]
    fn test_lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.toml");
        let from_env = dir.path().join("env.yaml");
        let local = dir.path().join("flowbatch.yaml");
        fs::write(&explicit, "[batch]\njob_queue = \"explicit\"\n").unwrap();
        fs::write(&from_env, "batch:\n  job_queue: env\n").unwrap();
        fs::write(&local, "batch:\n  job_queue: local\n").unwrap();

        let config = Config::load_from(Some(&explicit), Some(from_env.clone()), &local).unwrap();
        assert_eq!(config.batch.job_queue, "explicit");

        let config = Config::load_from(None, Some(from_env.clone()), &local).unwrap();
        assert_eq!(config.batch.job_queue, "env");

        let config = Config::load_from(None, None, &local).unwrap();
        assert_eq!(config.batch.job_queue, "local");

        let missing = dir.path().join("missing.yaml");
        let config = Config::load_from(None, None, &missing).unwrap();
        assert_eq!(config.batch.job_queue, "flowcat-queue");

        // A named file that does not exist is an error, not a silent default
        assert!(Config::load_from(None, Some(missing), &local).is_err());
    }
}
