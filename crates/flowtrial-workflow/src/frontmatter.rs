//! Workflow document frontmatter.
//!
//! A workflow document is markdown with an optional YAML header between
//! `---` delimiters. Only a handful of header fields matter here; the rest
//! is the compiler's business.

use serde_yaml::Value;

use crate::{Result, WorkflowError};

/// Metadata derived from a workflow document header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowMetadata {
    /// `description`, empty when absent.
    pub description: String,
    /// `engine` as a string, or the `id` of an engine map.
    pub engine: Option<String>,
    /// Whether the `on` trigger declares `workflow_dispatch`.
    pub has_workflow_dispatch: bool,
    /// Paths listed under `imports`.
    pub imports: Vec<String>,
}

/// Split a document into `(frontmatter, body)`.
///
/// Returns `None` when the document does not start with a `---` line or
/// the header is never closed.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let trimmed = content.trim_start_matches('\u{feff}');
    let after_open = trimmed
        .strip_prefix("---\n")
        .or_else(|| trimmed.strip_prefix("---\r\n"))?;

    // The closing delimiter is a line holding exactly `---`
    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let header = after_open[..offset].trim_end_matches(['\r', '\n']);
            return Some((header, &after_open[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Derive metadata from a document. Documents without a header yield
/// defaults; a header that is not valid YAML is an error.
pub fn parse_metadata(path: &str, content: &str) -> Result<WorkflowMetadata> {
    let Some((header, _)) = split_frontmatter(content) else {
        return Ok(WorkflowMetadata::default());
    };
    if header.trim().is_empty() {
        return Ok(WorkflowMetadata::default());
    }

    let value: Value = serde_yaml::from_str(header).map_err(|e| WorkflowError::Frontmatter {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let Value::Mapping(map) = value else {
        return Err(WorkflowError::Frontmatter {
            path: path.to_string(),
            message: "frontmatter must be a mapping".to_string(),
        });
    };

    let description = map
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let engine = match map.get("engine") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Mapping(m)) => m.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };

    // YAML 1.1 readers turn a bare `on` key into `true`
    let trigger = map.get("on").or_else(|| map.get(Value::Bool(true)));
    let has_workflow_dispatch = trigger.is_some_and(declares_dispatch);

    let imports = match map.get("imports") {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Mapping(m) => m.get("path").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };

    Ok(WorkflowMetadata {
        description,
        engine,
        has_workflow_dispatch,
        imports,
    })
}

fn declares_dispatch(trigger: &Value) -> bool {
    const DISPATCH: &str = "workflow_dispatch";
    match trigger {
        Value::String(s) => s.trim() == DISPATCH,
        Value::Sequence(items) => items.iter().any(|v| v.as_str() == Some(DISPATCH)),
        Value::Mapping(m) => m.contains_key(DISPATCH),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frontmatter() {
        let doc = "---\non: push\n---\n# Title\nbody\n";
        let (header, body) = split_frontmatter(doc).unwrap();
        assert_eq!(header, "on: push");
        assert_eq!(body, "# Title\nbody\n");
    }

    #[test]
    fn test_split_without_frontmatter() {
        assert!(split_frontmatter("# Just markdown\n").is_none());
        assert!(split_frontmatter("---\nunterminated: true\n").is_none());
    }

    #[test]
    fn test_empty_header() {
        let (header, body) = split_frontmatter("---\n---\nbody").unwrap();
        assert_eq!(header, "");
        assert_eq!(body, "body");
    }

    #[test]
    fn test_horizontal_rule_does_not_close_header() {
        let doc = "---\nnote: |\n  above\n----\n  below\non: push\n---  \nbody\n";
        let (header, body) = split_frontmatter(doc).unwrap();
        assert_eq!(header, "note: |\n  above\n----\n  below\non: push");
        assert_eq!(body, "body\n");
        assert!(split_frontmatter("---\non: push\n----\nbody\n").is_none());
    }

    #[test]
    fn test_metadata_full() {
        let doc = r#"---
description: |
  Triage new issues
on:
  issues:
    types: [opened]
  workflow_dispatch:
engine:
  id: claude
  model: sonnet
imports:
  - shared/tools.md
---
Do things.
"#;
        let meta = parse_metadata("triage.md", doc).unwrap();
        assert_eq!(meta.description, "Triage new issues");
        assert_eq!(meta.engine.as_deref(), Some("claude"));
        assert!(meta.has_workflow_dispatch);
        assert_eq!(meta.imports, vec!["shared/tools.md".to_string()]);
    }

    #[test]
    fn test_dispatch_forms() {
        let cases = [
            ("on: workflow_dispatch", true),
            ("on: [push, workflow_dispatch]", true),
            ("on:\n  workflow_dispatch: {}", true),
            ("on: push", false),
            ("on:\n  schedule:\n    - cron: '0 0 * * *'", false),
            ("description: none", false),
        ];
        for (header, expected) in cases {
            let doc = format!("---\n{}\n---\nbody\n", header);
            let meta = parse_metadata("w.md", &doc).unwrap();
            assert_eq!(meta.has_workflow_dispatch, expected, "{header}");
        }
    }

    #[test]
    fn test_engine_string() {
        let meta = parse_metadata("w.md", "---\nengine: codex\n---\n").unwrap();
        assert_eq!(meta.engine.as_deref(), Some("codex"));
    }

    #[test]
    fn test_missing_fields_default() {
        let meta = parse_metadata("w.md", "no header at all").unwrap();
        assert_eq!(meta, WorkflowMetadata::default());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let err = parse_metadata("w.md", "---\non: [unclosed\n---\n").unwrap_err();
        assert!(matches!(err, WorkflowError::Frontmatter { .. }));
    }
}
