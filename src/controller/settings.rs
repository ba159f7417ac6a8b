use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::ForgelineError;
use crate::storage::StorageClient;

/// Repository configuration required to dispatch a build. Treated as
/// immutable for the duration of a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub repo_name: String,
    pub build_command: String,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    /// The storage record exists but lacks a repository name or build
    /// command; the caller must not dispatch and should requeue.
    #[error("repository settings not configured")]
    NotConfigured,

    /// Network or HTTP failure talking to storage; transient, re-attempted
    /// on the next scheduler pass.
    #[error("settings fetch failed: {0}")]
    Transport(#[source] ForgelineError),
}

/// Fetches repository settings from storage, caching the last good value.
///
/// The provider performs single attempts only; it never loops retries. The
/// cache is purely informational (surfaced by the status API); every
/// dispatch refreshes from storage.
#[derive(Clone)]
pub struct SettingsProvider {
    storage: StorageClient,
    cached: Arc<RwLock<Option<Settings>>>,
}

impl SettingsProvider {
    pub fn new(storage: StorageClient) -> Self {
        Self {
            storage,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Refresh settings from storage. Distinguishes a missing/incomplete
    /// record (`NotConfigured`) from a failed call (`Transport`).
    pub async fn fetch(&self) -> Result<Settings, SettingsError> {
        let conf = self
            .storage
            .get_conf()
            .await
            .map_err(SettingsError::Transport)?;

        let settings = conf
            .and_then(|record| {
                match (record.repo_name, record.build_command) {
                    (Some(repo_name), Some(build_command))
                        if !repo_name.is_empty() && !build_command.is_empty() =>
                    {
                        Some(Settings {
                            repo_name,
                            build_command,
                        })
                    }
                    _ => None,
                }
            })
            .ok_or(SettingsError::NotConfigured)?;

        *self.cached.write().await = Some(settings.clone());
        Ok(settings)
    }

    /// Last successfully fetched settings, if any.
    pub async fn last_known(&self) -> Option<Settings> {
        self.cached.read().await.clone()
    }
}
