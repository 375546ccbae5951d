//! Advisory check that an analysis actually saw the operator's commits.
//!
//! The analyzer writes author emails as MD5 hex digests. The operator's emails are hashed
//! the same way once at startup, so matching is plain string equality. Nothing here can
//! exclude a repository from upload: every failure is logged and reads as "no match".

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::contract::IdentityVerifier;
use crate::repository::RepositoryDescriptor;

/// MD5 hex digest of `s`, exactly as given.
pub fn hash_email(s: &str) -> String {
    format!("{:x}", Md5::digest(s.as_bytes()))
}

/// Hashed operator emails.
#[derive(Debug, Clone, Default)]
pub struct HashedIdentitySet {
    hashes: HashSet<String>,
}

impl HashedIdentitySet {
    pub fn from_emails<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hashes: emails.into_iter().map(|e| hash_email(e.as_ref())).collect(),
        }
    }

    /// `hashed` must already be a digest, as found in a result archive.
    pub fn contains(&self, hashed: &str) -> bool {
        self.hashes.contains(hashed)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// The record inside a result archive, as far as this program reads it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultArchive {
    pub repo_name: String,
    pub local_usernames: Vec<String>,
    pub remotes: Remotes,
    pub primary_remote_url: String,
    pub number_of_branches: u32,
    pub number_of_tags: u32,
    pub commits: Vec<CommitRecord>,
    #[serde(rename = "emails_v2")]
    pub emails_v2: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Remotes {
    pub origin: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitRecord {
    pub author_name: String,
    /// MD5 hex digest of the author email.
    pub author_email: String,
    pub created_at: String,
    pub commit_hash: String,
    pub is_merge: bool,
    pub parents: Vec<String>,
    pub changed_files: Vec<ChangedFile>,
    pub is_duplicated: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangedFile {
    pub file_name: String,
    pub language: String,
    pub insertions: u64,
    pub deletions: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveReadError {
    #[error("could not open archive: {0}")]
    Open(#[from] std::io::Error),
    #[error("not a readable zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive holds no JSON entry")]
    NoJsonEntry,
    #[error("JSON entry is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResultArchive {
    /// Decodes the first entry, in archive order, whose name contains `.json`.
    pub fn read(path: &Path) -> Result<Self, ArchiveReadError> {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if !entry.name().contains(".json") {
                continue;
            }
            debug!(entry = entry.name(), "Reading result entry");
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            return Ok(serde_json::from_slice(&contents)?);
        }
        Err(ArchiveReadError::NoJsonEntry)
    }

    pub fn authored_by_any(&self, identities: &HashedIdentitySet) -> bool {
        self.commits
            .iter()
            .any(|commit| identities.contains(&commit.author_email))
    }
}

/// Verifier over result archives on disk.
pub struct ArchiveIdentityVerifier {
    identities: HashedIdentitySet,
    emails: Vec<String>,
}

impl ArchiveIdentityVerifier {
    pub fn new(emails: Vec<String>) -> Self {
        Self {
            identities: HashedIdentitySet::from_emails(&emails),
            emails,
        }
    }
}

impl IdentityVerifier for ArchiveIdentityVerifier {
    fn verify(&self, archive: &Path, repo: &RepositoryDescriptor) -> bool {
        debug!(repo = %repo.full_name, "Checking emails");
        let result = match ResultArchive::read(archive) {
            Ok(result) => result,
            Err(e) => {
                warn!(repo = %repo.full_name, archive = %archive.display(), error = %e, "Couldn't read result archive");
                return false;
            }
        };
        let matched = result.authored_by_any(&self.identities);
        if !matched {
            warn!(
                repo = %repo.full_name,
                emails = %self.emails.join(","),
                "None of the provided emails found in repository"
            );
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_stable_and_case_sensitive() {
        assert_eq!(hash_email("dev@example.com"), hash_email("dev@example.com"));
        assert_ne!(hash_email("Dev@example.com"), hash_email("dev@example.com"));
        assert_eq!(hash_email(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn identity_set_matches_hashed_values_only() {
        let set = HashedIdentitySet::from_emails(["a@x.io", "b@x.io"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&hash_email("a@x.io")));
        assert!(!set.contains("a@x.io"));
    }

    #[test]
    fn missing_fields_decode_to_defaults() {
        let record: ResultArchive =
            serde_json::from_str(r#"{"repoName":"b","commits":[{"authorEmail":"h"}]}"#).unwrap();
        assert_eq!(record.repo_name, "b");
        assert_eq!(record.commits.len(), 1);
        assert_eq!(record.commits[0].author_email, "h");
        assert!(record.commits[0].parents.is_empty());
    }
}
