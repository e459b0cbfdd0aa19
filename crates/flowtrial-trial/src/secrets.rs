//! Engine secrets in the sandbox.

use std::collections::BTreeSet;

use flowtrial_host::HostingService;

/// Engine used when a workflow names none.
pub const DEFAULT_ENGINE: &str = "copilot";

/// Secret an engine reads its credential from.
pub fn engine_secret(engine: &str) -> Option<&'static str> {
    match engine {
        "claude" => Some("ANTHROPIC_API_KEY"),
        "codex" => Some("OPENAI_API_KEY"),
        "copilot" => Some("COPILOT_GITHUB_TOKEN"),
        _ => None,
    }
}

/// Source of secret values, normally the process environment.
pub trait SecretSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads secret values from environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Make sure every engine's secret exists in `repo`.
///
/// Missing secrets are set from `source`. Nothing here is fatal: problems
/// are logged and the names actually set are returned.
pub async fn ensure_engine_secrets(
    host: &dyn HostingService,
    repo: &str,
    engines: &BTreeSet<String>,
    source: &dyn SecretSource,
) -> Vec<String> {
    let existing: BTreeSet<String> = match host.list_secrets(repo).await {
        Ok(names) => names.into_iter().collect(),
        Err(e) => {
            tracing::warn!(repo, error = %e, "Could not list sandbox secrets");
            BTreeSet::new()
        }
    };

    let mut set = Vec::new();
    for engine in engines {
        let Some(name) = engine_secret(engine) else {
            tracing::warn!(engine = %engine, "Unknown engine, no secret to configure");
            continue;
        };
        if existing.contains(name) {
            tracing::debug!(repo, secret = name, "Secret already present");
            continue;
        }
        let Some(value) = source.get(name) else {
            tracing::warn!(
                repo,
                secret = name,
                "Secret missing in sandbox and not set in the environment; the run may fail"
            );
            continue;
        };
        match host.set_secret(repo, name, &value).await {
            Ok(()) => {
                tracing::info!(repo, secret = name, "Configured engine secret");
                set.push(name.to_string());
            }
            Err(e) => tracing::warn!(repo, secret = name, error = %e, "Could not set secret"),
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use flowtrial_host::MockHost;

    struct MapSecrets(HashMap<&'static str, &'static str>);

    impl SecretSource for MapSecrets {
        fn get(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|v| v.to_string())
        }
    }

    fn engines(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_engine_secret_names() {
        assert_eq!(engine_secret("claude"), Some("ANTHROPIC_API_KEY"));
        assert_eq!(engine_secret("codex"), Some("OPENAI_API_KEY"));
        assert_eq!(engine_secret(DEFAULT_ENGINE), Some("COPILOT_GITHUB_TOKEN"));
        assert_eq!(engine_secret("custom"), None);
    }

    #[tokio::test]
    async fn test_sets_only_missing_secrets() {
        let host = MockHost::new()
            .with_repo("me/box")
            .with_secret("me/box", "OPENAI_API_KEY");
        let source = MapSecrets(HashMap::from([
            ("ANTHROPIC_API_KEY", "sk-a"),
            ("OPENAI_API_KEY", "sk-o"),
        ]));

        let set = ensure_engine_secrets(
            &host,
            "me/box",
            &engines(&["claude", "codex", "copilot"]),
            &source,
        )
        .await;
        // codex already present, copilot has no value in the source
        assert_eq!(set, vec!["ANTHROPIC_API_KEY".to_string()]);
        assert_eq!(host.call_count("set_secret"), 1);
    }

    #[tokio::test]
    async fn test_failures_are_soft() {
        let host = MockHost::new()
            .with_repo("me/box")
            .fail_on("list_secrets")
            .fail_on("set_secret");
        let source = MapSecrets(HashMap::from([("ANTHROPIC_API_KEY", "sk-a")]));
        let set = ensure_engine_secrets(&host, "me/box", &engines(&["claude"]), &source).await;
        assert!(set.is_empty());
    }
}
