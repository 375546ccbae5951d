//! Run progress, written by the orchestrator and readable from anywhere else.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::repository::RepositoryDescriptor;

/// Counters for the current pipeline run. Share it as `Arc<PipelineProgress>`.
#[derive(Debug, Default)]
pub struct PipelineProgress {
    total: AtomicUsize,
    processed: AtomicUsize,
    current: Mutex<Option<RepositoryDescriptor>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
    pub current: Option<RepositoryDescriptor>,
}

impl ProgressSnapshot {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }
}

impl PipelineProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.total().saturating_sub(self.processed())
    }

    pub fn current(&self) -> Option<RepositoryDescriptor> {
        self.current
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total(),
            processed: self.processed(),
            current: self.current(),
        }
    }

    pub(crate) fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.processed.store(0, Ordering::SeqCst);
        self.set_current(None);
    }

    /// Marks `repo` as in flight and counts it as processed.
    pub(crate) fn begin(&self, repo: &RepositoryDescriptor) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.set_current(Some(repo.clone()));
    }

    fn set_current(&self, repo: Option<RepositoryDescriptor>) {
        let mut guard = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = repo;
    }
}
