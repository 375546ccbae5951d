//! Invocation of the external repo_info_extractor tool.
//!
//! The tool resolves its own files relative to the directory it is installed in, so
//! the subprocess is started with that directory as its working directory. The process
//! working directory of this program is never changed.
//!
//! The tool always drops its output at the same path inside its install directory,
//! which is why invocations must not overlap.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::contract::{AnalyzeError, Analyzer};
use crate::repository::{Layout, RepositoryDescriptor};

/// Entry script of the headless, dockerised analyzer.
pub const ANALYZER_SCRIPT: &str = "run-docker-headless.sh";
/// Archive the analyzer leaves in its install directory after a successful run.
pub const ANALYZER_ARTIFACT: &str = "repo_data.json.zip";
/// Upstream location of the analyzer, cloned on first use.
pub const ANALYZER_REPOSITORY_URL: &str = "https://github.com/codersrank-org/repo_info_extractor";

pub struct ExternalAnalyzer {
    install_dir: PathBuf,
    emails: Vec<String>,
    layout: Layout,
}

impl ExternalAnalyzer {
    /// A relative `install_dir` is resolved against the current directory here, since the
    /// child process starts inside it.
    pub fn new(install_dir: impl Into<PathBuf>, emails: Vec<String>, layout: Layout) -> Self {
        Self {
            install_dir: absolutize(install_dir.into()),
            emails,
            layout,
        }
    }

    pub fn script_path(&self) -> PathBuf {
        self.install_dir.join(ANALYZER_SCRIPT)
    }

    fn artifact_path(&self) -> PathBuf {
        self.install_dir.join(ANALYZER_ARTIFACT)
    }

    fn email_arg(&self) -> String {
        format!("--email={}", self.emails.join(","))
    }

    async fn remove_stale_artifact(&self) -> Result<(), AnalyzeError> {
        let artifact = self.artifact_path();
        match tokio::fs::remove_file(&artifact).await {
            Ok(()) => {
                debug!(path = %artifact.display(), "Removed leftover analyzer archive");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AnalyzeError::StaleArtifact {
                path: artifact,
                source,
            }),
        }
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

#[async_trait]
impl Analyzer for ExternalAnalyzer {
    async fn analyze(
        &self,
        working_copy: &Path,
        repo: &RepositoryDescriptor,
    ) -> Result<PathBuf, AnalyzeError> {
        let script = self.script_path();
        info!(repo = %repo.full_name, script = %script.display(), "Running analyzer");
        self.remove_stale_artifact().await?;

        let output = Command::new(&script)
            .arg(working_copy)
            .arg(self.email_arg())
            .arg("--skip_upload")
            .arg("--headless")
            .current_dir(&self.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| AnalyzeError::Spawn {
                script: script.clone(),
                source,
            })?;

        debug!(
            repo = %repo.full_name,
            stdout = %String::from_utf8_lossy(&output.stdout),
            "Analyzer output"
        );

        if !output.status.success() {
            return Err(AnalyzeError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let target = self.layout.archive_path(repo);
        tokio::fs::rename(self.artifact_path(), &target)
            .await
            .map_err(|source| AnalyzeError::Relocate {
                target: target.clone(),
                source,
            })?;
        debug!(repo = %repo.full_name, archive = %target.display(), "Archive filed");
        Ok(target)
    }
}
