//! Repository listing for the supported hosting providers.
//!
//! Both variants implement [`Provider`]. Which one is used is decided once at startup
//! from the provider name ([`ProviderKind`]); unknown names never get this far.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::contract::{Provider, ProviderError};
use crate::repository::RepositoryDescriptor;

/// Which repositories to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    All,
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::All => "all",
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderConfigError {
    #[error("unsupported provider {0:?}, expected github.com or bitbucket.org")]
    Unknown(String),
    #[error("invalid repository visibility {0:?}, expected all, public or private")]
    Visibility(String),
    #[error("a username is required for bitbucket.org authentication")]
    MissingUsername,
}

impl FromStr for Visibility {
    type Err = ProviderConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Visibility::All),
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(ProviderConfigError::Visibility(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GitHub,
    Bitbucket,
}

impl ProviderKind {
    /// Name as given on the command line; also the host used for clone URLs.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github.com",
            ProviderKind::Bitbucket => "bitbucket.org",
        }
    }

    pub fn clone_host(&self) -> &'static str {
        self.name()
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "https://api.github.com",
            ProviderKind::Bitbucket => "https://api.bitbucket.org",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github.com" => Ok(ProviderKind::GitHub),
            "bitbucket.org" => Ok(ProviderKind::Bitbucket),
            other => Err(ProviderConfigError::Unknown(other.to_string())),
        }
    }
}

/// Everything needed to construct a provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub username: Option<String>,
    pub token: String,
    pub visibility: Visibility,
    /// Overrides the public API base, e.g. to point at a local test server.
    pub api_base: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("username", &self.username)
            .field("token", &"***")
            .field("visibility", &self.visibility)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Constructs the provider selected by `config.kind`.
pub fn build_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>, ProviderConfigError> {
    let api_base = config
        .api_base
        .clone()
        .unwrap_or_else(|| config.kind.default_api_base().to_string());
    let api_base = api_base.trim_end_matches('/').to_string();
    match config.kind {
        ProviderKind::GitHub => Ok(Box::new(GitHubProvider {
            client: Client::new(),
            api_base,
            token: config.token.clone(),
            visibility: config.visibility,
        })),
        ProviderKind::Bitbucket => {
            let username = config
                .username
                .clone()
                .filter(|u| !u.trim().is_empty())
                .ok_or(ProviderConfigError::MissingUsername)?;
            Ok(Box::new(BitbucketProvider {
                client: Client::new(),
                api_base,
                username,
                token: config.token.clone(),
                visibility: config.visibility,
            }))
        }
    }
}

/// Numeric or string identifier, normalized to a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(serde_json::Number),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// Token-bearer provider: `GET /user/repos?visibility=...`.
pub struct GitHubProvider {
    client: Client,
    api_base: String,
    token: String,
    visibility: Visibility,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    id: RawId,
    full_name: String,
    name: String,
}

#[async_trait]
impl Provider for GitHubProvider {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>, ProviderError> {
        const PROVIDER: &str = "github.com";
        let url = format!("{}/user/repos", self.api_base);
        info!(url = %url, visibility = %self.visibility, "Listing GitHub repositories");

        let request = self
            .client
            .get(&url)
            .query(&[("visibility", self.visibility.as_str())])
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(
                reqwest::header::USER_AGENT,
                concat!("multi-repo-extractor/", env!("CARGO_PKG_VERSION")),
            );
        let body = send(PROVIDER, request).await?;

        let repos: Vec<GitHubRepository> =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(collect_descriptors(
            PROVIDER,
            repos
                .into_iter()
                .map(|r| (r.id.into_string(), r.full_name, r.name)),
        ))
    }
}

/// Basic-auth provider: `GET /2.0/repositories?role=contributor[&q=...]`.
pub struct BitbucketProvider {
    client: Client,
    api_base: String,
    username: String,
    token: String,
    visibility: Visibility,
}

#[derive(Debug, Deserialize)]
struct BitbucketPage {
    #[serde(default)]
    values: Vec<BitbucketRepository>,
}

#[derive(Debug, Deserialize)]
struct BitbucketRepository {
    uuid: RawId,
    full_name: String,
    name: String,
}

impl BitbucketProvider {
    fn query(&self) -> Vec<(&'static str, &'static str)> {
        // Without a role Bitbucket lists every public repository it hosts.
        let mut query = vec![("role", "contributor")];
        match self.visibility {
            Visibility::Public => query.push(("q", "is_private = false")),
            Visibility::Private => query.push(("q", "is_private = true")),
            Visibility::All => {}
        }
        query
    }
}

#[async_trait]
impl Provider for BitbucketProvider {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>, ProviderError> {
        const PROVIDER: &str = "bitbucket.org";
        let url = format!("{}/2.0/repositories", self.api_base);
        info!(url = %url, visibility = %self.visibility, "Listing Bitbucket repositories");

        let request = self
            .client
            .get(&url)
            .query(&self.query())
            .basic_auth(&self.username, Some(&self.token));
        let body = send(PROVIDER, request).await?;

        let page: BitbucketPage =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(collect_descriptors(
            PROVIDER,
            page.values
                .into_iter()
                .map(|r| (r.uuid.into_string(), r.full_name, r.name)),
        ))
    }
}

async fn send(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<String, ProviderError> {
    let response = request.send().await.map_err(|e| ProviderError::Transport {
        provider,
        message: e.to_string(),
    })?;
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Authentication {
            provider,
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(ProviderError::Transport {
            provider,
            message: format!("HTTP {status}"),
        });
    }
    response.text().await.map_err(|e| ProviderError::Transport {
        provider,
        message: e.to_string(),
    })
}

/// Builds descriptors in response order, dropping unusable and duplicate entries.
fn collect_descriptors(
    provider: &'static str,
    raw: impl Iterator<Item = (String, String, String)>,
) -> Vec<RepositoryDescriptor> {
    let mut seen = HashSet::new();
    let mut descriptors = Vec::new();
    for (id, full_name, name) in raw {
        match RepositoryDescriptor::new(id, full_name.clone(), name) {
            Ok(repo) => {
                if !seen.insert(repo.id.clone()) {
                    warn!(provider, id = %repo.id, repo = %repo.full_name, "Duplicate repository id, skipping");
                    continue;
                }
                descriptors.push(repo);
            }
            Err(e) => warn!(provider, repo = %full_name, error = %e, "Skipping unusable repository"),
        }
    }
    debug!(provider, count = descriptors.len(), "Repositories listed");
    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_known_names_only() {
        assert_eq!("github.com".parse::<ProviderKind>(), Ok(ProviderKind::GitHub));
        assert_eq!("bitbucket.org".parse::<ProviderKind>(), Ok(ProviderKind::Bitbucket));
        assert_eq!(
            "gitlab.com".parse::<ProviderKind>(),
            Err(ProviderConfigError::Unknown("gitlab.com".into()))
        );
    }

    #[test]
    fn bitbucket_requires_username() {
        let config = ProviderConfig {
            kind: ProviderKind::Bitbucket,
            username: Some("  ".into()),
            token: "t".into(),
            visibility: Visibility::All,
            api_base: None,
        };
        assert_eq!(
            build_provider(&config).err(),
            Some(ProviderConfigError::MissingUsername)
        );
    }

    #[test]
    fn raw_ids_normalize_to_strings() {
        let ids: Vec<RawId> = serde_json::from_str(r#"[134240628, "{3f63-aa}"]"#).unwrap();
        let ids: Vec<String> = ids.into_iter().map(RawId::into_string).collect();
        assert_eq!(ids, vec!["134240628", "{3f63-aa}"]);
    }

    #[test]
    fn collect_descriptors_drops_duplicates_and_unsafe_names() {
        let raw = vec![
            ("1".to_string(), "a/b".to_string(), "b".to_string()),
            ("2".to_string(), "../evil".to_string(), "evil".to_string()),
            ("1".to_string(), "a/c".to_string(), "c".to_string()),
            ("3".to_string(), "a/d".to_string(), "d".to_string()),
            ("../4".to_string(), "a/e".to_string(), "e".to_string()),
        ];
        let repos = collect_descriptors("test", raw.into_iter());
        let names: Vec<&str> = repos.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["a/b", "a/d"]);
    }
}
