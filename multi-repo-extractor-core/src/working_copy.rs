//! Local mirrors of remote repositories.
//!
//! A working copy is either [`WorkingCopyState::Absent`] (cloned) or
//! [`WorkingCopyState::Present`] (fast-forwarded from `origin`). Presence of the path is
//! the only signal; a half-finished clone from an earlier run counts as present.
//!
//! Updating classifies the library's structured results rather than its error text:
//! "nothing to merge" and "worktree has local changes" are the two [`BenignUpdate`]s.

use std::path::Path;

use async_trait::async_trait;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, FetchOptions, RemoteCallbacks, Repository, Status, StatusOptions};
use tracing::{debug, info};

use crate::contract::{BenignUpdate, SyncError, SyncOutcome, WorkingCopySynchronizer};
use crate::repository::RemoteUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingCopyState {
    Absent,
    Present,
}

impl WorkingCopyState {
    pub fn probe(path: &Path) -> Self {
        if path.exists() {
            WorkingCopyState::Present
        } else {
            WorkingCopyState::Absent
        }
    }
}

/// Synchronizer backed by libgit2. Each call runs on tokio's blocking pool.
#[derive(Debug, Default, Clone)]
pub struct GitSynchronizer;

impl GitSynchronizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkingCopySynchronizer for GitSynchronizer {
    async fn ensure_synchronized(
        &self,
        remote: &RemoteUrl,
        local_path: &Path,
    ) -> Result<SyncOutcome, SyncError> {
        let remote = remote.clone();
        let local_path = local_path.to_path_buf();
        tokio::task::spawn_blocking(move || synchronize_blocking(&remote, &local_path))
            .await
            .map_err(|e| SyncError::Aborted(e.to_string()))?
    }
}

/// Blocking clone-or-update. Exposed for callers that are not on a runtime.
pub fn synchronize_blocking(remote: &RemoteUrl, local_path: &Path) -> Result<SyncOutcome, SyncError> {
    match WorkingCopyState::probe(local_path) {
        WorkingCopyState::Absent => {
            info!(remote = %remote, path = %local_path.display(), "Cloning");
            clone(remote, local_path)?;
            Ok(SyncOutcome::Cloned)
        }
        WorkingCopyState::Present => {
            info!(path = %local_path.display(), "Pulling latest changes");
            update(remote, local_path)
        }
    }
}

fn fetch_options(remote: &RemoteUrl) -> FetchOptions<'static> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some((user, token)) = remote.credentials() {
        let (user, token) = (user.to_string(), token.to_string());
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext(&user, &token)
        });
    }
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

fn clone(remote: &RemoteUrl, local_path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = local_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::Clone(e.to_string()))?;
    }
    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options(remote));
    builder
        .clone(&remote.expose(), local_path)
        .map_err(|e| SyncError::Clone(e.message().to_string()))?;
    Ok(())
}

fn update(remote: &RemoteUrl, local_path: &Path) -> Result<SyncOutcome, SyncError> {
    let repo = Repository::open(local_path).map_err(|e| SyncError::Open(e.message().to_string()))?;

    let head = repo.head().map_err(|e| SyncError::Open(e.message().to_string()))?;
    let branch = head
        .shorthand()
        .ok_or_else(|| SyncError::Open("HEAD is not a named branch".to_string()))?
        .to_string();
    let head_ref = head
        .name()
        .ok_or_else(|| SyncError::Open("HEAD reference is not valid UTF-8".to_string()))?
        .to_string();

    let mut origin = repo
        .find_remote("origin")
        .map_err(|e| SyncError::Fetch(e.message().to_string()))?;
    origin
        .fetch(&[branch.as_str()], Some(&mut fetch_options(remote)), None)
        .map_err(|e| SyncError::Fetch(e.message().to_string()))?;

    let fetch_head = repo
        .find_reference("FETCH_HEAD")
        .map_err(|e| SyncError::Fetch(e.message().to_string()))?;
    let upstream = repo
        .reference_to_annotated_commit(&fetch_head)
        .map_err(|e| SyncError::Fetch(e.message().to_string()))?;

    let (analysis, _) = repo
        .merge_analysis(&[&upstream])
        .map_err(|e| SyncError::Update(e.message().to_string()))?;

    if analysis.is_up_to_date() {
        debug!(path = %local_path.display(), "Already up to date");
        return Ok(SyncOutcome::Unchanged(BenignUpdate::AlreadyUpToDate));
    }
    if !analysis.is_fast_forward() {
        return Err(SyncError::Diverged);
    }
    if has_local_changes(&repo)? {
        debug!(path = %local_path.display(), "Worktree has local changes, leaving it untouched");
        return Ok(SyncOutcome::Unchanged(BenignUpdate::LocalChanges));
    }

    let mut reference = repo
        .find_reference(&head_ref)
        .map_err(|e| SyncError::Update(e.message().to_string()))?;
    reference
        .set_target(upstream.id(), "fast-forward")
        .map_err(|e| SyncError::Update(e.message().to_string()))?;
    repo.set_head(&head_ref)
        .map_err(|e| SyncError::Update(e.message().to_string()))?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))
        .map_err(|e| SyncError::Update(e.message().to_string()))?;

    info!(path = %local_path.display(), commit = %upstream.id(), "Fast-forwarded");
    Ok(SyncOutcome::Updated)
}

/// Modified, deleted, renamed or untracked files in the worktree. Ignored files do not count.
fn has_local_changes(repo: &Repository) -> Result<bool, SyncError> {
    let mut options = StatusOptions::new();
    options.include_untracked(true).include_ignored(false);
    let statuses = repo
        .statuses(Some(&mut options))
        .map_err(|e| SyncError::Update(e.message().to_string()))?;
    let dirty = Status::WT_NEW
        | Status::WT_MODIFIED
        | Status::WT_DELETED
        | Status::WT_RENAMED
        | Status::WT_TYPECHANGE
        | Status::INDEX_NEW
        | Status::INDEX_MODIFIED
        | Status::INDEX_DELETED
        | Status::INDEX_RENAMED
        | Status::INDEX_TYPECHANGE;
    Ok(statuses.iter().any(|entry| entry.status().intersects(dirty)))
}

