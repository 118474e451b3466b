//! Upstream release feed and the pending-upgrade marker.

use crate::error::{Result, WardenError};
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// The latest published upstream version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag: String,
    pub commit: String,
    pub published_at: Option<String>,
}

pub trait ReleaseFeed {
    fn latest_release(&self) -> Result<Release>;
}

/// `ReleaseFeed` over a GitHub releases endpoint.
#[derive(Debug, Clone)]
pub struct HttpReleaseFeed {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpReleaseFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| WardenError::ReleaseFeed(format!("build http client: {}", err)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

// GitHub releases payload; only the fields consumed here.
#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    target_commitish: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

impl ReleaseFeed for HttpReleaseFeed {
    fn latest_release(&self) -> Result<Release> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .map_err(|err| WardenError::ReleaseFeed(format!("query {}: {}", self.url, err)))?;

        if !response.status().is_success() {
            return Err(WardenError::ReleaseFeed(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }

        let payload: GithubRelease = response
            .json()
            .map_err(|err| WardenError::ReleaseFeed(format!("decode release: {}", err)))?;
        Ok(Release {
            tag: payload.tag_name,
            commit: payload.target_commitish.unwrap_or_default(),
            published_at: payload.published_at,
        })
    }
}

/// Presence-flag artifact recording a newer upstream release. The file
/// existing is the flag; the body records what was seen and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpgrade {
    pub tag: String,
    pub commit: String,
    pub detected_at: String,
}

impl PendingUpgrade {
    pub fn new(release: &Release, now: DateTime<Utc>) -> Self {
        Self {
            tag: release.tag.clone(),
            commit: release.commit.clone(),
            detected_at: now.to_rfc3339(),
        }
    }
}

pub fn write_upgrade_marker(path: &Path, marker: &PendingUpgrade) -> Result<()> {
    let payload = serde_json::to_vec_pretty(marker)
        .map_err(|err| WardenError::json("serialize upgrade marker", err))?;
    fs::write(path, payload).map_err(|err| WardenError::io("write upgrade marker", err))
}

pub fn upgrade_marker_exists(path: &Path) -> bool {
    path.exists()
}

pub fn clear_upgrade_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WardenError::io("remove upgrade marker", err)),
    }
}
