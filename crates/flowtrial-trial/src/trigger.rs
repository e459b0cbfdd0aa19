//! Trigger context: the issue or pull request a run should act on.

use url::Url;

use crate::{Result, TrialError};

/// A single workflow dispatch input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInput {
    pub name: String,
    pub value: String,
}

/// Turn `#123`, `123`, or an issue/pull request URL into a dispatch input.
pub fn parse_trigger_context(reference: &str) -> Result<TriggerInput> {
    let reference = reference.trim();
    let invalid = || {
        TrialError::Options(format!(
            "trigger context '{}' is not an issue/pull request URL or #number",
            reference
        ))
    };

    let number = reference.strip_prefix('#').unwrap_or(reference);
    if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
        return Ok(TriggerInput {
            name: "issue_number".to_string(),
            value: number.to_string(),
        });
    }

    let url = Url::parse(reference).map_err(|_| invalid())?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        [_, _, kind, number, ..] if number.chars().all(|c| c.is_ascii_digit()) => {
            let name = match *kind {
                "issues" => "issue_number",
                "pull" | "pulls" => "pull_request_number",
                _ => return Err(invalid()),
            };
            Ok(TriggerInput {
                name: name.to_string(),
                value: number.to_string(),
            })
        }
        _ => Err(invalid()),
    }
}
