//! Build variables handed through to the downstream pipeline stages.
//!
//! The values are opaque to the submitter. They are written out as makefile
//! fragments (`<tag>/<experiment>.mk`) which the job container includes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::enumerate::config_path;

pub const PLOT_FLAG: &str = "--plot";
pub const REFNORMAL_FLAG: &str = "--refnormal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineVars {
    pub method: String,
    pub premethod: String,
    pub transmethod: String,
    pub tubes: String,
    pub num: u32,
    pub upsampling_num: u32,
    pub groups: String,
    pub plot: bool,
    pub refnormal: bool,
}

impl Default for PipelineVars {
    fn default() -> Self {
        Self {
            method: "normal".to_string(),
            premethod: "normal".to_string(),
            transmethod: "normal".to_string(),
            tubes: "1;2".to_string(),
            num: 5,
            upsampling_num: 800,
            groups: String::new(),
            plot: true,
            refnormal: true,
        }
    }
}

fn flag(enabled: bool, value: &str) -> &str {
    if enabled {
        value
    } else {
        ""
    }
}

impl PipelineVars {
    /// Variables as `(KEY, value)` pairs in file order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("METHOD", self.method.clone()),
            ("PREMETHOD", self.premethod.clone()),
            ("TRANSMETHOD", self.transmethod.clone()),
            ("TUBES", format!("\"{}\"", self.tubes)),
            ("NUM", self.num.to_string()),
            ("UPSAMPLING_NUM", self.upsampling_num.to_string()),
            ("GROUPS", self.groups.clone()),
            ("PLOT", flag(self.plot, PLOT_FLAG).to_string()),
            ("REFNORMAL", flag(self.refnormal, REFNORMAL_FLAG).to_string()),
        ]
    }

    pub fn to_makefile(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.entries() {
            if value.is_empty() {
                out.push_str(&format!("{} =\n", key));
            } else {
                out.push_str(&format!("{} = {}\n", key, value));
            }
        }
        out
    }

    /// Reads a fragment written by [`PipelineVars::to_makefile`] or by hand.
    ///
    /// Accepts `=`, `:=` and `?=` assignments and trailing `#` comments.
    /// `+=` is rejected. Unknown keys are ignored and missing ones keep
    /// their defaults.
    pub fn from_makefile(text: &str) -> Result<Self> {
        let mut vars = PipelineVars::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split_once('#').map_or(line, |(code, _)| code).trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.ends_with('+') {
                anyhow::bail!("line {}: appending with += is not supported", lineno + 1);
            }
            let key = key.trim_end_matches([':', '?']).trim();
            let value = value.trim().trim_matches('"');
            match key {
                "METHOD" => vars.method = value.to_string(),
                "PREMETHOD" => vars.premethod = value.to_string(),
                "TRANSMETHOD" => vars.transmethod = value.to_string(),
                "TUBES" => vars.tubes = value.to_string(),
                "NUM" => {
                    vars.num = value
                        .parse()
                        .with_context(|| format!("line {}: invalid NUM {:?}", lineno + 1, value))?
                }
                "UPSAMPLING_NUM" => {
                    vars.upsampling_num = value.parse().with_context(|| {
                        format!("line {}: invalid UPSAMPLING_NUM {:?}", lineno + 1, value)
                    })?
                }
                "GROUPS" => vars.groups = value.to_string(),
                "PLOT" => vars.plot = !value.is_empty(),
                "REFNORMAL" => vars.refnormal = !value.is_empty(),
                _ => log::debug!("Ignoring unknown pipeline variable {}", key),
            }
        }
        Ok(vars)
    }
}

/// Writes `<root>/<tag>/<experiment>.mk` for each experiment.
///
/// Existing files are left alone unless `force` is set. Returns the paths that
/// were written.
pub fn write_fragments<S: AsRef<str>>(
    root: &Path,
    tag: &str,
    experiments: &[S],
    vars: &PipelineVars,
    force: bool,
) -> Result<Vec<PathBuf>> {
    let dir = root.join(tag);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {:?}", dir))?;

    let content = vars.to_makefile();
    let mut written = Vec::new();
    for experiment in experiments {
        let path = root.join(config_path(tag, experiment.as_ref()));
        if path.exists() && !force {
            log::warn!("{:?} exists, not overwriting", path);
            continue;
        }
        fs::write(&path, &content).with_context(|| format!("Failed to write {:?}", path))?;
        log::info!("Wrote {:?}", path);
        written.push(path);
    }
    Ok(written)
}
