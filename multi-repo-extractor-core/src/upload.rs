//! Aggregation of per-repository archives into one upload batch.

use tracing::{error, info, warn};

use crate::contract::{UploadError, UploadedRepository, Uploader};
use crate::repository::{Layout, RepositoryDescriptor};

/// Uploads each repository's archive in order, then registers the collected tokens as one
/// batch and returns the batch token.
///
/// A failed archive upload only drops that repository. Returns `Ok(None)` when there is
/// nothing to register.
pub async fn upload_all<U>(
    uploader: &U,
    layout: &Layout,
    repos: &[RepositoryDescriptor],
) -> Result<Option<String>, UploadError>
where
    U: Uploader + ?Sized,
{
    let mut uploaded = Vec::with_capacity(repos.len());
    for repo in repos {
        info!(repo = %repo.full_name, "Uploading results");
        match uploader.upload_archive(&layout.archive_path(repo)).await {
            Ok(token) => uploaded.push(UploadedRepository {
                token,
                repo_name: repo.name.clone(),
            }),
            Err(e) => {
                error!(repo = %repo.full_name, error = %e, "Couldn't upload processed repo");
            }
        }
    }

    if uploaded.is_empty() {
        warn!("No results were uploaded, nothing to register");
        return Ok(None);
    }

    info!(count = uploaded.len(), "Registering uploaded results");
    let token = uploader.upload_results(&uploaded).await?;
    Ok(Some(token))
}
