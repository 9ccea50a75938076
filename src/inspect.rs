//! Model inspection
//!
//! Runs a small Python helper with the project's interpreter. The helper
//! imports `env.py` with alembic's context stubbed out and reports which
//! SQLAlchemy tables autogenerate will see and which declared models it
//! will miss.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{Config, STRATA_DIR};
use crate::error::{ParseError, Result};
use crate::runner::{OutputLog, ProcessRunner};

const INSPECTOR_PY: &str = include_str!("../resources/inspector.py");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReport {
    #[serde(default)]
    pub visible_models: Vec<String>,
    #[serde(default)]
    pub hidden_models: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ModelReport {
    pub fn is_clean(&self) -> bool {
        self.hidden_models.is_empty() && self.errors.is_empty()
    }
}

/// Pick the JSON report out of the helper's stdout. Imported project code
/// may print its own noise first, so the last JSON object line wins.
pub fn parse_report(stdout: &str) -> std::result::Result<ModelReport, ParseError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .ok_or_else(|| ParseError::new("inspector", "no JSON report in output"))?;
    serde_json::from_str(line).map_err(|e| ParseError::new("inspector", format!("{} - raw: {}", e, line)))
}

/// Write the helper under `.strata/` and run it against the project's config
pub fn inspect_models(config: &Config, root: &Path, log: OutputLog) -> Result<ModelReport> {
    let script = root.join(STRATA_DIR).join("inspector.py");
    if let Some(parent) = script.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&script, INSPECTOR_PY)?;

    let runner = ProcessRunner::new(root, log).env("STRATA_WORKSPACE", root.to_string_lossy());
    let argv = vec![
        config.python_path.clone(),
        script.to_string_lossy().into_owned(),
        "-c".to_string(),
        config.config_file.to_string_lossy().into_owned(),
    ];
    let stdout = runner.run(&argv)?;
    let report = parse_report(&stdout)?;
    tracing::info!(
        visible = report.visible_models.len(),
        hidden = report.hidden_models.len(),
        errors = report.errors.len(),
        "model inspection finished"
    );
    Ok(report)
}
