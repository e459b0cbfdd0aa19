//! Waiting for a dispatched run.
//!
//! The wait blocks the caller: first until a run triggered by the dispatch
//! appears, then until that run reaches a terminal state. Both phases share
//! one deadline, and each polls at least once, with a final poll at the
//! deadline itself.

use std::time::Duration;

use chrono::{DateTime, Utc};
use flowtrial_host::{HostingService, WorkflowRun};
use tokio::time::{Instant, sleep};

use crate::{Result, TrialError};

/// Where and how long to wait.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// What was known about a workflow's runs when it was dispatched.
#[derive(Debug, Clone, Copy)]
pub struct Dispatched {
    /// Latest run seen before dispatching.
    pub previous_run: Option<u64>,
    /// When the dispatch was sent.
    pub at: DateTime<Utc>,
}

impl Dispatched {
    /// Record a dispatch sent now.
    pub fn now(previous_run: Option<u64>) -> Self {
        Self {
            previous_run,
            at: Utc::now(),
        }
    }

    /// Whether `run` can be the one this dispatch created.
    ///
    /// Hosts report creation time in whole seconds, so the comparison is
    /// made at that resolution. Runs without a creation time are accepted.
    pub fn created(&self, run: &WorkflowRun) -> bool {
        if Some(run.id) == self.previous_run {
            return false;
        }
        run.created_at
            .is_none_or(|created| created.timestamp() >= self.at.timestamp())
    }
}

/// Sleep one interval, or until the deadline if that comes first. Returns
/// `false` once the deadline has passed.
async fn next_poll(deadline: Instant, interval: Duration) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    sleep(interval.min(deadline - now)).await;
    true
}

/// Wait for the run created by `dispatched` to finish.
pub async fn wait_for_run(
    host: &dyn HostingService,
    repo: &str,
    workflow_file: &str,
    dispatched: Dispatched,
    settings: PollSettings,
) -> Result<WorkflowRun> {
    let started = Instant::now();
    let deadline = started + settings.timeout;

    let run_id = loop {
        match host.latest_run(repo, workflow_file).await? {
            Some(run) if dispatched.created(&run) => {
                tracing::info!(workflow = workflow_file, run_id = run.id, url = %run.url, "Run started");
                break run.id;
            }
            Some(run) => {
                tracing::debug!(run_id = run.id, "Latest run predates the dispatch");
            }
            None => {}
        }
        if !next_poll(deadline, settings.interval).await {
            return Err(TrialError::Dispatch {
                workflow: workflow_file.to_string(),
                repo: repo.to_string(),
                message: format!("no run appeared within {:?}", started.elapsed()),
            });
        }
    };

    loop {
        let run = host.run_status(repo, run_id).await?;
        if run.is_terminal() {
            tracing::info!(
                workflow = workflow_file,
                run_id,
                conclusion = ?run.conclusion,
                elapsed = ?started.elapsed(),
                "Run finished"
            );
            return Ok(run);
        }
        tracing::debug!(run_id, status = ?run.status, "Run still in progress");
        if !next_poll(deadline, settings.interval).await {
            return Err(TrialError::Timeout {
                run_id,
                waited: started.elapsed(),
            });
        }
    }
}
