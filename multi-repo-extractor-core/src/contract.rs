#![allow(unused)]

//! # contract: the seams of the pipeline
//!
//! Every stage the orchestrator drives sits behind one trait defined here, together
//! with the outcome and error types crossing that seam:
//!
//! - [`Provider`]: lists the operator's repositories.
//! - [`WorkingCopySynchronizer`]: clones or fast-forwards a local mirror.
//! - [`Analyzer`]: runs the external analysis tool and files its archive.
//! - [`IdentityVerifier`]: advisory authorship check on an archive.
//! - [`Uploader`]: ships archives and the aggregated token map.
//!
//! ## Mocking & Testing
//! All traits are annotated for `mockall`; the mocks are exported behind the
//! `test-export-mocks` feature so integration tests and the CLI crate can use them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use thiserror::Error;

use crate::repository::{RemoteUrl, RepositoryDescriptor};

/// Fatal errors while listing repositories. Without a list there is no work.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication rejected by {provider} (HTTP {status})")]
    Authentication { provider: &'static str, status: u16 },
    #[error("request to {provider} failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
    #[error("could not decode {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// All repositories reachable with the configured credentials and visibility,
    /// in provider order.
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>, ProviderError>;
}

/// Expected steady-state conditions when updating an existing working copy.
/// Both leave the tree as it is and count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenignUpdate {
    AlreadyUpToDate,
    /// Upstream moved but the worktree has local modifications; nothing is touched.
    LocalChanges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Updated,
    Unchanged(BenignUpdate),
}

/// Repository-scoped synchronization failure.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("clone failed: {0}")]
    Clone(String),
    #[error("could not open existing working copy: {0}")]
    Open(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("local branch has diverged from upstream, cannot fast-forward")]
    Diverged,
    #[error("update failed: {0}")]
    Update(String),
    #[error("synchronization task aborted: {0}")]
    Aborted(String),
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WorkingCopySynchronizer: Send + Sync {
    /// Clone `remote` into `local_path` if absent, otherwise fast-forward it.
    async fn ensure_synchronized(
        &self,
        remote: &RemoteUrl,
        local_path: &Path,
    ) -> Result<SyncOutcome, SyncError>;
}

/// Repository-scoped analysis failure.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("could not start analyzer {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Non-zero exit. Carries the tool's own stderr, which is the useful diagnostic.
    #[error("{stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("could not remove leftover archive {path}: {source}")]
    StaleArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("analysis ran but the archive could not be moved to {target}: {source}")]
    Relocate {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyse the working copy of `repo` and return the path of its filed result archive.
    async fn analyze(
        &self,
        working_copy: &Path,
        repo: &RepositoryDescriptor,
    ) -> Result<PathBuf, AnalyzeError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait IdentityVerifier: Send + Sync {
    /// `true` if any commit in the archive was authored by one of the operator's emails.
    /// Never fails; unreadable archives count as no match.
    fn verify(&self, archive: &Path, repo: &RepositoryDescriptor) -> bool;
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload request failed: {0}")]
    Transport(String),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("could not decode upload response: {0}")]
    Decode(String),
}

/// Token returned for one uploaded archive, paired with the repository name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UploadedRepository {
    pub token: String,
    #[serde(rename = "reponame")]
    pub repo_name: String,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload one result archive, returning its token.
    async fn upload_archive(&self, archive: &Path) -> Result<String, UploadError>;

    /// Register the per-repository tokens as one batch, returning the batch token.
    async fn upload_results(&self, results: &[UploadedRepository]) -> Result<String, UploadError>;
}
