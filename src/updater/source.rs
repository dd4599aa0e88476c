//! Release sources.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::error::UpdateError;

/// Latest published release, reduced to what the updater needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub tag_name: String,
    /// Tag with any leading `v` removed.
    pub version: String,
    pub package_url: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl ReleaseInfo {
    pub fn new(tag_name: impl Into<String>, package_url: impl Into<String>) -> Self {
        let tag_name = tag_name.into();
        Self {
            version: tag_name.trim_start_matches('v').to_string(),
            tag_name,
            package_url: package_url.into(),
            published_at: None,
        }
    }
}

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError>;
}

#[derive(Debug, Deserialize)]
struct LatestReleaseBody {
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAssetBody>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAssetBody {
    browser_download_url: Option<String>,
}

/// Reads `GET {api_base}/repos/{owner}/{repo}/releases/latest`.
pub struct GithubReleaseSource {
    client: Client,
    api_base: Url,
    owner: String,
    repo: String,
}

impl GithubReleaseSource {
    pub fn new(client: Client, api_base: Url, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            client,
            api_base,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    pub fn latest_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base.as_str().trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
        let url = self.latest_url();
        debug!(target = "purgekeeper::updater", url = %url, "requesting latest release");

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(UpdateError::Http)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpdateError::Status(status));
        }

        let body: LatestReleaseBody = response.json().await.map_err(UpdateError::Decode)?;
        let tag_name = body
            .tag_name
            .filter(|tag| !tag.is_empty())
            .ok_or(UpdateError::MissingField("tag_name"))?;
        let first = body.assets.into_iter().next().ok_or(UpdateError::NoAssets)?;
        let package_url = first
            .browser_download_url
            .filter(|url| !url.is_empty())
            .ok_or(UpdateError::EmptyDownloadUrl)?;

        let mut release = ReleaseInfo::new(tag_name, package_url);
        release.published_at = body.published_at;
        Ok(release)
    }
}
