//! Run artifact classification.
//!
//! Downloaded artifacts are bucketed by file name:
//!
//! - `agent_output.json` → safe outputs (parsed)
//! - `aw_info.json` → run metadata (parsed)
//! - any other `.json` → additional artifacts (parsed)
//! - any other text file → additional artifacts (raw text)
//!
//! A file counts as text when its first [`SNIFF_LEN`] bytes hold no NUL.
//! Invalid UTF-8 in a text file is replaced, not rejected.
//!
//! A file that fails to parse is logged and left out; it never aborts
//! classification of the rest.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};
use walkdir::WalkDir;

/// File holding the agent's structured safe outputs.
pub const AGENT_OUTPUT_FILE: &str = "agent_output.json";

/// File holding run metadata written by the engine.
pub const RUN_INFO_FILE: &str = "aw_info.json";

/// Bytes inspected for NULs when deciding whether a file is text.
pub const SNIFF_LEN: usize = 8 * 1024;

/// Artifacts of one run, bucketed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedArtifacts {
    /// Parsed agent output; empty when absent.
    pub safe_outputs: Map<String, Value>,
    /// Parsed run metadata.
    pub agentic_run_info: Option<Value>,
    /// Everything else, keyed by path relative to the artifact directory.
    pub additional_artifacts: BTreeMap<String, Value>,
}

/// Walk `dir` and classify every file in it.
pub fn classify_artifacts(dir: &Path) -> ClassifiedArtifacts {
    let mut classified = ClassifiedArtifacts::default();

    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let rel = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let file_name = entry.file_name().to_string_lossy();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if extension == "json" {
            let Some(value) = read_json(path) else {
                continue;
            };
            if file_name == AGENT_OUTPUT_FILE && classified.safe_outputs.is_empty() {
                match value {
                    Value::Object(map) => classified.safe_outputs = map,
                    other => {
                        classified.additional_artifacts.insert(rel, other);
                    }
                }
            } else if file_name == RUN_INFO_FILE && classified.agentic_run_info.is_none() {
                classified.agentic_run_info = Some(value);
            } else {
                classified.additional_artifacts.insert(rel, value);
            }
        } else {
            match std::fs::read(path) {
                Ok(bytes) => match as_text(&bytes) {
                    Some(text) => {
                        classified
                            .additional_artifacts
                            .insert(rel, Value::String(text));
                    }
                    None => tracing::debug!(path = %rel, "Skipping binary artifact"),
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Unreadable artifact"),
            }
        }
    }

    tracing::debug!(
        dir = %dir.display(),
        safe_outputs = !classified.safe_outputs.is_empty(),
        run_info = classified.agentic_run_info.is_some(),
        additional = classified.additional_artifacts.len(),
        "Classified artifacts"
    );
    classified
}

fn as_text(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head.contains(&0) {
        return None;
    }
    Some(String::from_utf8_lossy(bytes).into_owned())
}

fn read_json(path: &Path) -> Option<Value> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable artifact");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping artifact that is not valid JSON");
            None
        }
    }
}

/// Whether a directory exists and contains at least one entry.
pub fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
