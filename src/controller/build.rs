use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Waiting,
    InProgress,
    Fail,
    Canceled,
    Success,
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Waiting => write!(f, "waiting"),
            BuildStatus::InProgress => write!(f, "in progress"),
            BuildStatus::Fail => write!(f, "fail"),
            BuildStatus::Canceled => write!(f, "canceled"),
            BuildStatus::Success => write!(f, "success"),
        }
    }
}

/// A build as the controller tracks it. The identifier is assigned by the
/// storage service; the controller never mints one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: String,
    pub commit_hash: String,
    pub status: BuildStatus,
}

impl Build {
    pub fn new(id: impl Into<String>, commit_hash: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            commit_hash: commit_hash.into(),
            status: BuildStatus::Waiting,
        }
    }
}
