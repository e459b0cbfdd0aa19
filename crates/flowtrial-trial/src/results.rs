//! Trial result records and their persistence.
//!
//! Files are write-once JSON documents:
//!
//! ```text
//! trials/
//!   triage-octo-agents.20261019-142530-1.json
//!   label-octo-agents.20261019-142530-1.json
//!   combined-octo-agents.20261019-142530-1.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;
use crate::artifacts::ClassifiedArtifacts;

/// Outcome of one workflow in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTrialResult {
    pub workflow_name: String,
    pub run_id: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_url: String,
    pub safe_outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agentic_run_info: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_artifacts: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowTrialResult {
    /// Build a result from classified artifacts.
    pub fn new(
        workflow_name: impl Into<String>,
        run_id: u64,
        run_url: impl Into<String>,
        artifacts: ClassifiedArtifacts,
    ) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            run_id,
            run_url: run_url.into(),
            safe_outputs: artifacts.safe_outputs,
            agentic_run_info: artifacts.agentic_run_info,
            additional_artifacts: artifacts.additional_artifacts,
            timestamp: Utc::now(),
        }
    }
}

/// All workflows of one cycle, when more than one ran together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedTrialResult {
    pub workflow_names: Vec<String>,
    pub results: Vec<WorkflowTrialResult>,
    pub timestamp: DateTime<Utc>,
}

impl CombinedTrialResult {
    pub fn new(results: Vec<WorkflowTrialResult>) -> Self {
        Self {
            workflow_names: results.iter().map(|r| r.workflow_name.clone()).collect(),
            results,
            timestamp: Utc::now(),
        }
    }
}

/// Make a repository slug safe for use in a file name.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Identifier for one cycle: start time plus the 1-based cycle number.
pub fn cycle_id(started: DateTime<Utc>, cycle: u32) -> String {
    format!("{}-{}", started.format("%Y%m%d-%H%M%S"), cycle)
}

/// `<workflow>-<label>.<cycle>.json`
pub fn result_file_name(workflow: &str, label: &str, cycle_id: &str) -> String {
    format!("{}-{}.{}.json", workflow, sanitize_label(label), cycle_id)
}

/// `combined-<label>.<cycle>.json`
pub fn combined_file_name(label: &str, cycle_id: &str) -> String {
    result_file_name("combined", label, cycle_id)
}

/// Write `value` as pretty JSON to `dir/file_name`, creating `dir`.
pub async fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    tokio::fs::write(&path, json).await?;
    tracing::info!(path = %path.display(), "Wrote trial result");
    Ok(path)
}
