//!
//! This module implements the CLI interface for multi_repo_extractor: flag parsing and the
//! top-level `run` that wires configuration, the core pipeline and the upload client
//! together.
//!
//! All pipeline logic (providers, working copies, analysis, verification) lives in the
//! [`multi-repo-extractor-core`] crate. This module is strictly glue.
//!
//! ## How To Use
//! - From the command line: `multi_repo_extractor --emails me@example.com --token ...`
//! - Programmatically / in tests: build a [`Cli`] and call [`run`].
//!
//! [`multi-repo-extractor-core`]: ../../multi-repo-extractor-core/
use anyhow::{Context, Result};
use clap::Parser;
use multi_repo_extractor_core::analyzer::{ExternalAnalyzer, ANALYZER_REPOSITORY_URL};
use multi_repo_extractor_core::contract::WorkingCopySynchronizer;
use multi_repo_extractor_core::pipeline::{CloneCredentials, Pipeline};
use multi_repo_extractor_core::provider::build_provider;
use multi_repo_extractor_core::repository::{Layout, RemoteUrl};
use multi_repo_extractor_core::upload::upload_all;
use multi_repo_extractor_core::verify::ArchiveIdentityVerifier;
use multi_repo_extractor_core::working_copy::GitSynchronizer;
use tokio_util::sync::CancellationToken;

use crate::browser;
use crate::config::{AnalyzerSource, Config};
use crate::update::{UpdateChecker, UpdateOutcome};
use crate::upload::CodersRankClient;

/// Analyse all your GitHub or Bitbucket repositories and publish the results to CodersRank.
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "multi_repo_extractor",
    version,
    about = "Discover, analyse and upload all of your repositories to CodersRank"
)]
pub struct Cli {
    /// Provider for repos. Only github.com and bitbucket.org are supported.
    #[clap(long, default_value = "github.com")]
    pub provider: String,

    /// Username for a Bitbucket Cloud account. Required with bitbucket.org.
    #[clap(long)]
    pub username: Option<String>,

    /// Token for accessing repositories. Falls back to the TOKEN environment variable.
    #[clap(long)]
    pub token: Option<String>,

    /// Emails used in your commits, comma separated (e.g. "one@mail.com,two@mail.com").
    #[clap(long)]
    pub emails: Option<String>,

    /// Which repositories to process: all, public or private.
    #[clap(long = "repo-visibility", alias = "repo_visibility", default_value = "private")]
    pub repo_visibility: String,

    /// Do not check for a newer release before running.
    #[clap(long)]
    pub skip_update_check: bool,

    /// Print the results URL instead of offering to open it in a browser.
    #[clap(long)]
    pub no_browser: bool,

    /// Override the provider API base URL.
    #[clap(long, hide = true)]
    pub provider_api_url: Option<String>,
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("Starting multi_repo_extractor");

    let config = Config::from_cli(&cli)?;

    if !config.skip_update_check {
        if let UpdateOutcome::Downloaded(path) = UpdateChecker::new(config.app_root.clone()).check().await {
            tracing::info!(path = %path.display(), "New version downloaded. Please run the program again.");
            return Ok(());
        }
    }

    let layout = Layout::new(config.app_root.clone());
    layout
        .ensure_dirs()
        .context("Couldn't create working directories")?;

    let synchronizer = GitSynchronizer::new();
    bootstrap_analyzer(&synchronizer, &config.analyzer).await?;

    let provider = build_provider(&config.provider)?;
    let repos = provider
        .list_repositories()
        .await
        .context("Couldn't get the list of repositories")?;
    tracing::info!(count = repos.len(), "Repositories found");

    let pipeline = Pipeline::new(
        synchronizer,
        ExternalAnalyzer::new(config.analyzer.dir().clone(), config.emails.clone(), layout.clone()),
        ArchiveIdentityVerifier::new(config.emails.clone()),
        layout.clone(),
        CloneCredentials {
            host: config.provider.kind.clone_host().to_string(),
            token: config.provider.token.clone(),
        },
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing the current repository before stopping");
            on_interrupt.cancel();
        }
    });

    let report = pipeline.run(&repos, &cancel).await;
    if report.succeeded.is_empty() {
        tracing::warn!(failed = report.failed.len(), "No repository was processed successfully, nothing to upload");
        return Ok(());
    }

    let client = CodersRankClient::new();
    let token = upload_all(&client, &layout, &report.succeeded)
        .await
        .context("Couldn't register uploaded results")?;
    if let Some(token) = token {
        browser::offer(&browser::results_url(&token), config.open_browser).await?;
    }
    Ok(())
}

/// Makes sure the analyzer is present before any repository is touched. Fatal on failure.
async fn bootstrap_analyzer<S>(synchronizer: &S, source: &AnalyzerSource) -> Result<()>
where
    S: WorkingCopySynchronizer,
{
    match source {
        AnalyzerSource::Local(dir) => {
            if !dir.is_dir() {
                anyhow::bail!("REPO_EXTRACTOR points to {}, which is not a directory", dir.display());
            }
            tracing::info!(path = %dir.display(), "Using local repo_info_extractor");
            Ok(())
        }
        AnalyzerSource::Managed(dir) => {
            let outcome = synchronizer
                .ensure_synchronized(&RemoteUrl::anonymous(ANALYZER_REPOSITORY_URL), dir)
                .await
                .context("Couldn't clone repo_info_extractor")?;
            tracing::info!(path = %dir.display(), ?outcome, "repo_info_extractor ready");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multi_repo_extractor_core::contract::{MockWorkingCopySynchronizer, SyncError, SyncOutcome};

    #[test]
    fn accepts_underscore_visibility_flag() {
        let cli = Cli::try_parse_from([
            "multi_repo_extractor",
            "--emails",
            "a@x.io",
            "--repo_visibility",
            "public",
        ])
        .unwrap();
        assert_eq!(cli.repo_visibility, "public");
        assert_eq!(cli.provider, "github.com");
        assert!(!cli.no_browser);
    }

    #[tokio::test]
    async fn analyzer_bootstrap_failure_is_fatal() {
        let mut synchronizer = MockWorkingCopySynchronizer::new();
        synchronizer
            .expect_ensure_synchronized()
            .times(1)
            .returning(|_, _| Err(SyncError::Clone("network down".into())));
        let source = AnalyzerSource::Managed(std::env::temp_dir().join("rie-bootstrap-test"));

        let err = bootstrap_analyzer(&synchronizer, &source).await.unwrap_err();
        assert!(format!("{err:#}").contains("network down"));
    }

    #[tokio::test]
    async fn managed_analyzer_is_synchronized_anonymously() {
        let mut synchronizer = MockWorkingCopySynchronizer::new();
        synchronizer
            .expect_ensure_synchronized()
            .withf(|remote, _| remote.credentials().is_none() && remote.expose() == ANALYZER_REPOSITORY_URL)
            .times(1)
            .returning(|_, _| Ok(SyncOutcome::Cloned));
        let source = AnalyzerSource::Managed(std::env::temp_dir().join("rie-bootstrap-test"));

        bootstrap_analyzer(&synchronizer, &source).await.unwrap();
    }

    #[tokio::test]
    async fn local_analyzer_must_exist() {
        let synchronizer = MockWorkingCopySynchronizer::new();
        let missing = AnalyzerSource::Local(std::env::temp_dir().join("definitely-missing-rie-dir"));
        assert!(bootstrap_analyzer(&synchronizer, &missing).await.is_err());
    }
}
