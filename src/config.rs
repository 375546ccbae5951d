//! `config` module: turns parsed command line flags plus environment into a validated [`Config`].
//!
//! Every check happens here, before any network or disk work, so an invalid combination
//! aborts the run with a clear message and nothing half-done.
//!
//! # Environment
//! - `TOKEN`: access token, used when `--token` is absent or blank.
//! - `REPO_EXTRACTOR`: path of a local analyzer install, relative to the current directory
//!   unless absolute; skips cloning the analyzer.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use multi_repo_extractor_core::provider::{ProviderConfig, ProviderKind, Visibility};
use tracing::{error, info};

use crate::cli::Cli;

/// Directory name of the analyzer checkout under the application root.
pub const ANALYZER_DIR_NAME: &str = "repo_info_extractor";

/// Values taken from the process environment.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    pub token: Option<String>,
    pub repo_extractor: Option<String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            token: std::env::var("TOKEN").ok().filter(|t| !t.trim().is_empty()),
            repo_extractor: std::env::var("REPO_EXTRACTOR").ok().filter(|p| !p.is_empty()),
        }
    }
}

/// Where the analyzer comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerSource {
    /// Cloned and kept up to date under the application root.
    Managed(PathBuf),
    /// Operator-provided install, used as is.
    Local(PathBuf),
}

impl AnalyzerSource {
    pub fn dir(&self) -> &PathBuf {
        match self {
            AnalyzerSource::Managed(dir) | AnalyzerSource::Local(dir) => dir,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub emails: Vec<String>,
    pub app_root: PathBuf,
    pub analyzer: AnalyzerSource,
    pub skip_update_check: bool,
    pub open_browser: bool,
}

impl Config {
    /// Resolves against the real environment and the current directory.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let app_root = std::env::current_dir().context("Couldn't determine the current directory")?;
        Self::resolve(cli, Environment::from_process(), app_root)
    }

    pub fn resolve(cli: &Cli, env: Environment, app_root: PathBuf) -> Result<Self> {
        let kind: ProviderKind = cli.provider.parse().map_err(|e| {
            error!(provider = %cli.provider, "Unsupported provider");
            anyhow::Error::new(e)
        })?;

        let token = match cli.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => match env.token {
                Some(token) => {
                    info!("Taking token from env.");
                    token.trim().to_string()
                }
                None => {
                    error!("No token given");
                    bail!("You need to provide a valid token (--token or the TOKEN environment variable).");
                }
            },
        };

        let username = cli
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        if kind == ProviderKind::Bitbucket && username.is_none() {
            error!("Bitbucket selected without username");
            bail!("Username is required for bitbucket.org authentication.");
        }

        let emails = parse_emails(cli.emails.as_deref().unwrap_or_default());
        if emails.is_empty() {
            error!("No emails given");
            bail!("You need to provide at least one email.");
        }

        let visibility: Visibility = cli.repo_visibility.parse().map_err(|e| {
            error!(visibility = %cli.repo_visibility, "Invalid repository visibility");
            anyhow::Error::new(e)
        })?;

        let analyzer = match env.repo_extractor {
            Some(path) => AnalyzerSource::Local(app_root.join(path)),
            None => AnalyzerSource::Managed(app_root.join(ANALYZER_DIR_NAME)),
        };

        let config = Config {
            provider: ProviderConfig {
                kind,
                username,
                token,
                visibility,
                api_base: cli.provider_api_url.clone(),
            },
            emails,
            app_root,
            analyzer,
            skip_update_check: cli.skip_update_check,
            open_browser: !cli.no_browser,
        };
        info!(
            provider = kind.name(),
            visibility = %visibility,
            emails = config.emails.len(),
            app_root = %config.app_root.display(),
            analyzer = %config.analyzer.dir().display(),
            "Configuration resolved"
        );
        Ok(config)
    }
}

/// Splits a comma separated list, trimming entries and dropping empty ones.
pub fn parse_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}
