//! Self-update check against the latest GitHub release.
//!
//! Never fatal: any failure along the way is logged and the run continues with the
//! installed version.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

pub const RELEASES_URL: &str =
    "https://api.github.com/repos/codersrank-org/multi_repo_extractor/releases/latest";
/// File name the downloaded binary is saved under.
pub const BINARY_NAME: &str = "multi_repo_extractor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn current() -> Self {
        Self {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }

    /// Parses `v1.2.3`, `1.2.3-rc.1+build` and the like. Pre-release and build parts are ignored.
    pub fn parse(name: &str) -> Result<Self> {
        let semver = Regex::new(
            r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?(?:\+[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?$",
        )?;
        let trimmed = name.trim().trim_start_matches('v');
        let caps = semver
            .captures(trimmed)
            .ok_or_else(|| anyhow!("Couldn't parse version {name:?}"))?;
        Ok(Self {
            major: caps[1].parse()?,
            minor: caps[2].parse()?,
            patch: caps[3].parse()?,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

/// Platform tag used in release asset names.
pub fn platform_tag() -> &'static str {
    match std::env::consts::OS {
        "macos" => "osx",
        other => other,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    /// A newer binary was saved at this path; the operator has to rerun.
    Downloaded(PathBuf),
    /// Newer release exists but has no asset for this platform.
    NoAsset,
    Skipped,
}

pub struct UpdateChecker {
    client: Client,
    releases_url: String,
    install_dir: PathBuf,
    current: Version,
}

impl UpdateChecker {
    pub fn new(install_dir: PathBuf) -> Self {
        Self::with_release_url(install_dir, RELEASES_URL, Version::current())
    }

    pub fn with_release_url(install_dir: PathBuf, releases_url: impl Into<String>, current: Version) -> Self {
        Self {
            client: Client::new(),
            releases_url: releases_url.into(),
            install_dir,
            current,
        }
    }

    pub async fn check(&self) -> UpdateOutcome {
        info!("Checking for new versions");
        match self.try_check().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Couldn't check for updates, skipping update");
                UpdateOutcome::Skipped
            }
        }
    }

    async fn try_check(&self) -> Result<UpdateOutcome> {
        let release: Release = self
            .client
            .get(&self.releases_url)
            .header(reqwest::header::USER_AGENT, concat!("multi-repo-extractor/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .context("Couldn't get latest release")?
            .error_for_status()?
            .json()
            .await
            .context("Couldn't decode latest release")?;

        let label = if release.name.is_empty() { &release.tag_name } else { &release.name };
        let latest = Version::parse(label)?;
        if latest <= self.current {
            info!(version = %self.current, "You already have the latest version, skipping update");
            return Ok(UpdateOutcome::UpToDate);
        }

        info!(version = %latest, "Found new version, updating");
        let Some(asset) = release.assets.iter().find(|a| a.name.contains(platform_tag())) else {
            warn!(platform = platform_tag(), "No release asset for this platform, skipping update");
            return Ok(UpdateOutcome::NoAsset);
        };
        let path = self.download(&asset.browser_download_url).await?;
        Ok(UpdateOutcome::Downloaded(path))
    }

    async fn download(&self, url: &str) -> Result<PathBuf> {
        info!(url = %url, "Downloading");
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let path = self.install_dir.join(BINARY_NAME);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Couldn't save new binary to {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;
        }
        info!(path = %path.display(), "New binary saved");
        Ok(path)
    }
}
