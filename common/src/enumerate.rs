use std::collections::HashSet;

use crate::error::EnumerateError;
use crate::job::JobSpec;

/// Run types submitted for every experiment unless configured otherwise.
pub const DEFAULT_RUN_TYPES: &[&str] = &["run"];

pub const NAME_DELIMITER: &str = "_";

pub fn job_name(tag: &str, experiment: &str, run_type: &str, run_index: u32) -> String {
    [tag, experiment, run_type, &run_index.to_string()].join(NAME_DELIMITER)
}

pub fn config_path(tag: &str, experiment: &str) -> String {
    format!("{}/{}.mk", tag, experiment)
}

/// Expands experiments x run types x repetitions into job specs.
///
/// Experiments form the outer loop, run types the middle one and the 1-based
/// run index the inner one. A `repeats` of zero produces nothing.
///
/// Run types may not contain the delimiter, so the last two name segments
/// always decode to run type and index. Repeated experiments are still
/// caught by the duplicate name check.
pub fn enumerate_jobs<S, R>(
    tag: &str,
    repeats: u32,
    experiments: &[S],
    run_types: &[R],
) -> Result<Vec<JobSpec>, EnumerateError>
where
    S: AsRef<str>,
    R: AsRef<str>,
{
    if let Some(bad) = run_types
        .iter()
        .map(|rt| rt.as_ref())
        .find(|rt| rt.is_empty() || rt.contains(NAME_DELIMITER))
    {
        return Err(EnumerateError::InvalidRunType(bad.to_string()));
    }

    let mut specs = Vec::with_capacity(experiments.len() * run_types.len() * repeats as usize);
    let mut seen = HashSet::new();
    for experiment in experiments {
        let experiment = experiment.as_ref();
        for run_type in run_types {
            let run_type = run_type.as_ref();
            for run_index in 1..=repeats {
                let name = job_name(tag, experiment, run_type, run_index);
                if !seen.insert(name.clone()) {
                    return Err(EnumerateError::DuplicateJobName(name));
                }
                specs.push(JobSpec {
                    job_name: name,
                    target_action: Some(run_type.to_string()),
                    tag: Some(tag.to_string()),
                    command: None,
                    config_path: Some(config_path(tag, experiment)),
                    run_index: Some(run_index),
                });
            }
        }
    }
    Ok(specs)
}
