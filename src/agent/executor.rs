use std::path::PathBuf;

use tokio::process::Command;

use crate::controller::BuildStatus;
use crate::protocol::DispatchRequest;

const GIT_REMOTE_BASE: &str = "https://github.com/";

/// Outcome of one build: final status plus the captured output that goes
/// back to the controller as the build log.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub status: BuildStatus,
    pub log: String,
}

/// Executes builds in a local workspace directory: wipe, clone, checkout,
/// then run the configured build command via the shell.
#[derive(Debug, Clone)]
pub struct BuildExecutor {
    workdir: PathBuf,
}

impl BuildExecutor {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub async fn execute(&self, request: &DispatchRequest) -> BuildOutcome {
        tracing::info!(
            build_id = %request.build_id,
            repo = %request.repo_name,
            commit = %request.commit_hash,
            "starting build"
        );

        if let Err(log) = self
            .prepare_checkout(&request.repo_name, &request.commit_hash)
            .await
        {
            tracing::error!(build_id = %request.build_id, "checkout failed");
            return BuildOutcome {
                status: BuildStatus::Fail,
                log,
            };
        }

        self.run_build_command(&request.build_id, &request.build_command)
            .await
    }

    /// Wipe the workspace, clone the repository and check out the commit.
    /// Returns the failing step's output on error.
    async fn prepare_checkout(&self, repo_name: &str, commit_hash: &str) -> Result<(), String> {
        if let Err(err) = tokio::fs::remove_dir_all(&self.workdir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("failed to clear workspace: {err}"));
            }
        }

        let remote = format!("{GIT_REMOTE_BASE}{repo_name}");
        tracing::info!(repo = %repo_name, "cloning repository");
        let mut clone = Command::new("git");
        clone
            .arg("clone")
            .arg(&remote)
            .arg(&self.workdir)
            // never hang on a credential prompt; this process has no tty
            .env("GIT_TERMINAL_PROMPT", "0");
        run_step("git clone", &mut clone).await?;

        tracing::info!(commit = %commit_hash, "checking out commit");
        let mut checkout = Command::new("git");
        checkout
            .arg("checkout")
            .arg(commit_hash)
            .current_dir(&self.workdir);
        run_step("git checkout", &mut checkout).await?;

        Ok(())
    }

    async fn run_build_command(&self, build_id: &str, build_command: &str) -> BuildOutcome {
        tracing::info!(build_id, command = build_command, "running build command");

        let result = Command::new("sh")
            .arg("-c")
            .arg(build_command)
            .current_dir(&self.workdir)
            .output()
            .await;

        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();

                if output.status.success() {
                    tracing::info!(build_id, "build finished");
                    BuildOutcome {
                        status: BuildStatus::Success,
                        log: stdout,
                    }
                } else {
                    tracing::warn!(
                        build_id,
                        exit_code = ?output.status.code(),
                        "build finished with errors"
                    );
                    BuildOutcome {
                        status: BuildStatus::Fail,
                        log: format!("{stdout}{stderr}"),
                    }
                }
            }
            Err(err) => {
                tracing::error!(build_id, error = %err, "failed to spawn build command");
                BuildOutcome {
                    status: BuildStatus::Fail,
                    log: format!("failed to spawn build command: {err}"),
                }
            }
        }
    }
}

async fn run_step(step: &str, command: &mut Command) -> Result<(), String> {
    let output = command
        .output()
        .await
        .map_err(|err| format!("{step} failed to spawn: {err}"))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{step} failed: {stderr}"))
    }
}
