//! Wire contract between the controller, its agents, and operators.
//!
//! All request bodies use camelCase field names; both sides of every call
//! live in this crate, but the shapes also match what external tooling posts.

use serde::{Deserialize, Serialize};

use crate::controller::BuildStatus;

/// Controller -> agent: `POST /build`. The agent acknowledges receipt
/// immediately and executes asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub build_id: String,
    pub repo_name: String,
    pub commit_hash: String,
    pub build_command: String,
}

/// Agent -> controller: `POST /notify-agent`. Registers or refreshes the
/// agent under its advertised address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyAgentRequest {
    pub host: String,
    pub port: u16,
}

/// Agent -> controller: `POST /notify-build-result`. The only way the
/// controller learns that a build finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResultRequest {
    pub build_id: String,
    pub status: BuildStatus,
    pub log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOk {
    pub status: String,
}

impl StatusOk {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}
