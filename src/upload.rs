#![doc = "CodersRank upload client: the concrete `Uploader` used by the CLI."]
//
//! # Uploader Integration (CLI <-> Core)
//!
//! Implements [`multi_repo_extractor_core::contract::Uploader`] against the CodersRank
//! gateway:
//!
//! - one multipart `POST` per result archive (form field `file`), answered with a token;
//! - one JSON `POST` registering all `{token, reponame}` pairs, answered with the batch token.
//!
//! Aggregation and per-repository failure handling live in the core's `upload` module.

use std::path::Path;

use async_trait::async_trait;
use multi_repo_extractor_core::contract::{UploadError, UploadedRepository, Uploader};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub const UPLOAD_REPO_URL: &str = "https://grpcgateway.codersrank.io/candidate/privaterepo/Upload";
pub const UPLOAD_RESULTS_URL: &str = "https://grpcgateway.codersrank.io/multi/repo/results";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct MultiUpload<'a> {
    results: &'a [UploadedRepository],
}

pub struct CodersRankClient {
    client: Client,
    upload_repo_url: String,
    upload_results_url: String,
}

impl Default for CodersRankClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CodersRankClient {
    pub fn new() -> Self {
        Self::with_urls(UPLOAD_REPO_URL, UPLOAD_RESULTS_URL)
    }

    pub fn with_urls(upload_repo_url: impl Into<String>, upload_results_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            upload_repo_url: upload_repo_url.into(),
            upload_results_url: upload_results_url.into(),
        }
    }
}

async fn read_token(response: reqwest::Response) -> Result<String, UploadError> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(UploadError::Status(status.as_u16()));
    }
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| UploadError::Decode(e.to_string()))?;
    Ok(body.token)
}

#[async_trait]
impl Uploader for CodersRankClient {
    async fn upload_archive(&self, archive: &Path) -> Result<String, UploadError> {
        let content = tokio::fs::read(archive)
            .await
            .map_err(|source| UploadError::Archive {
                path: archive.to_path_buf(),
                source,
            })?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo_data.zip".to_string());
        tracing::debug!(file = %file_name, bytes = content.len(), "Uploading archive");

        let form = Form::new().part("file", Part::bytes(content).file_name(file_name));
        let response = self
            .client
            .post(&self.upload_repo_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        read_token(response).await
    }

    async fn upload_results(&self, results: &[UploadedRepository]) -> Result<String, UploadError> {
        tracing::debug!(count = results.len(), "Registering results");
        let response = self
            .client
            .post(&self.upload_results_url)
            .json(&MultiUpload { results })
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        read_token(response).await
    }
}
