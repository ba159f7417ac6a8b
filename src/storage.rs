//! Client for the external storage service that owns build records and
//! repository configuration.
//!
//! The client performs single attempts only; retry policy belongs to the
//! callers (the queue-refill loop re-arms on its interval, the report tasks
//! retry on a fixed delay).

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::controller::BuildStatus;
use crate::error::{ForgelineError, Result};

/// Envelope the storage API wraps every response body in.
#[derive(Debug, Deserialize)]
struct ApiData<T> {
    data: T,
}

/// A build record as the storage API returns it. Extra fields (build number,
/// author, branch) are ignored; the controller only needs these three.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageBuild {
    pub id: String,
    pub commit_hash: String,
    pub status: BuildStatus,
}

/// Repository configuration record. Both fields must be present and
/// non-empty before the controller may dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConf {
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBuildInput {
    pub build_id: String,
    pub date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishBuildInput {
    pub build_id: String,
    /// Wall-clock duration in milliseconds
    pub duration: i64,
    pub success: bool,
    pub build_log: String,
}

#[derive(Debug, Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    base_url: String,
}

impl StorageClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        request_timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_token}"))
            .map_err(|_| ForgelineError::Config("API token contains invalid characters".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch one page of build records.
    pub async fn build_list(&self, offset: u32, limit: u32) -> Result<Vec<StorageBuild>> {
        let url = format!("{}/build/list", self.base_url);
        let body: ApiData<Vec<StorageBuild>> = self
            .http
            .get(&url)
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.data)
    }

    /// Fetch the repository configuration record, if one exists.
    pub async fn get_conf(&self) -> Result<Option<StorageConf>> {
        let url = format!("{}/conf", self.base_url);
        let body: ApiData<Option<StorageConf>> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.data)
    }

    /// Record that a build started executing.
    pub async fn build_start(&self, input: &StartBuildInput) -> Result<()> {
        let url = format!("{}/build/start", self.base_url);
        self.http
            .post(&url)
            .json(input)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Record the final status, duration and log of a build.
    pub async fn build_finish(&self, input: &FinishBuildInput) -> Result<()> {
        let url = format!("{}/build/finish", self.base_url);
        self.http
            .post(&url)
            .json(input)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
