//! High-level pipeline: synchronize → analyze → verify, one repository at a time.
//!
//! # Responsibilities
//! - Walks the provider's repository list in order, strictly sequentially
//! - Keeps [`PipelineProgress`] current before any work on a repository starts
//! - Isolates failures: a repository that fails to synchronize or analyze is logged
//!   with its diagnostic and skipped, and the run moves on. There are no retries.
//! - Verification is advisory and never fails a repository
//! - Stops cooperatively between repositories when the cancellation token fires
//!
//! # Navigation
//! - Main entrypoint: [`Pipeline::run`]
//! - Output: [`PipelineReport`], whose `succeeded` list is what the upload stage consumes

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contract::{Analyzer, IdentityVerifier, WorkingCopySynchronizer};
use crate::progress::PipelineProgress;
use crate::repository::{Layout, RemoteUrl, RepositoryDescriptor};

/// Where a repository is in its per-run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Synchronizing,
    Analyzing,
    Verifying,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Synchronizing => "synchronizing",
            Stage::Analyzing => "analyzing",
            Stage::Verifying => "verifying",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Credentials used to build clone URLs for every repository of the run.
#[derive(Clone)]
pub struct CloneCredentials {
    pub host: String,
    pub token: String,
}

impl CloneCredentials {
    pub fn remote_for(&self, repo: &RepositoryDescriptor) -> RemoteUrl {
        RemoteUrl::with_token(&self.host, &repo.full_name, &self.token)
    }
}

impl fmt::Debug for CloneCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneCredentials")
            .field("host", &self.host)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FailedRepository {
    pub repo: RepositoryDescriptor,
    /// Stage the repository was in when it failed.
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Repositories that reached [`Stage::Done`], in processing order.
    pub succeeded: Vec<RepositoryDescriptor>,
    pub failed: Vec<FailedRepository>,
    /// Set when the run stopped early on cancellation.
    pub cancelled: bool,
}

pub struct Pipeline<S, A, V> {
    synchronizer: S,
    analyzer: A,
    verifier: V,
    layout: Layout,
    credentials: CloneCredentials,
    progress: Arc<PipelineProgress>,
}

impl<S, A, V> Pipeline<S, A, V>
where
    S: WorkingCopySynchronizer,
    A: Analyzer,
    V: IdentityVerifier,
{
    pub fn new(
        synchronizer: S,
        analyzer: A,
        verifier: V,
        layout: Layout,
        credentials: CloneCredentials,
    ) -> Self {
        Self {
            synchronizer,
            analyzer,
            verifier,
            layout,
            credentials,
            progress: Arc::new(PipelineProgress::new()),
        }
    }

    /// Handle for observers; counters are only ever written by [`Pipeline::run`].
    pub fn progress(&self) -> Arc<PipelineProgress> {
        Arc::clone(&self.progress)
    }

    pub async fn run(
        &self,
        repos: &[RepositoryDescriptor],
        cancel: &CancellationToken,
    ) -> PipelineReport {
        info!(total = repos.len(), "[PIPELINE] Starting");
        self.progress.reset(repos.len());
        let mut report = PipelineReport::default();

        for repo in repos {
            if cancel.is_cancelled() {
                warn!(
                    processed = self.progress.processed(),
                    total = repos.len(),
                    "[PIPELINE] Cancelled, not starting further repositories"
                );
                report.cancelled = true;
                break;
            }
            self.progress.begin(repo);
            info!(
                repo = %repo.full_name,
                progress = %format!("{}/{}", self.progress.processed(), repos.len()),
                "[PIPELINE] Processing"
            );

            match self.process_one(repo).await {
                Ok(()) => report.succeeded.push(repo.clone()),
                Err(failure) => report.failed.push(failure),
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "[PIPELINE] Finished"
        );
        report
    }

    async fn process_one(&self, repo: &RepositoryDescriptor) -> Result<(), FailedRepository> {
        let mut stage = Stage::Pending;
        let working_copy = self.layout.working_copy_path(repo);

        advance(repo, &mut stage, Stage::Synchronizing);
        let remote = self.credentials.remote_for(repo);
        match self
            .synchronizer
            .ensure_synchronized(&remote, &working_copy)
            .await
        {
            Ok(outcome) => debug!(repo = %repo.full_name, ?outcome, "Working copy ready"),
            Err(e) => {
                error!(repo = %repo.full_name, error = %e, "Couldn't clone/update repo, skipping");
                return Err(fail(repo, stage, e.to_string()));
            }
        }

        advance(repo, &mut stage, Stage::Analyzing);
        let archive = match self.analyzer.analyze(&working_copy, repo).await {
            Ok(archive) => archive,
            Err(e) => {
                error!(repo = %repo.full_name, error = %e, "Couldn't process repo, skipping");
                return Err(fail(repo, stage, e.to_string()));
            }
        };

        advance(repo, &mut stage, Stage::Verifying);
        let matched = self.verifier.verify(&archive, repo);
        debug!(repo = %repo.full_name, matched, "Identity check finished");

        advance(repo, &mut stage, Stage::Done);
        Ok(())
    }
}

fn advance(repo: &RepositoryDescriptor, stage: &mut Stage, next: Stage) {
    debug!(repo = %repo.full_name, from = %stage, to = %next, "Stage transition");
    *stage = next;
}

fn fail(repo: &RepositoryDescriptor, stage: Stage, reason: String) -> FailedRepository {
    debug!(repo = %repo.full_name, from = %stage, to = %Stage::Failed, "Stage transition");
    FailedRepository {
        repo: repo.clone(),
        stage,
        reason,
    }
}
