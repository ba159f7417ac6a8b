//! Build timing and result reporting to the storage service.
//!
//! Start and finish notifications must reach storage eventually or external
//! duration tracking desynchronizes, so both are posted from spawned tasks
//! that retry indefinitely on a fixed delay. The scheduler loop is never
//! blocked by a slow or unreachable storage service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::controller::build::BuildStatus;
use crate::controller::Controller;
use crate::storage::{FinishBuildInput, StartBuildInput};

/// Start/finish timestamp pair for one in-flight build.
#[derive(Debug, Clone, Copy)]
pub struct BuildTimer {
    pub start: DateTime<Utc>,
    pub finish: Option<DateTime<Utc>>,
}

/// Timer records keyed by build id, written twice (start, finish) and read
/// once before disposal.
#[derive(Debug, Default)]
pub struct BuildTimers {
    timers: HashMap<String, BuildTimer>,
}

impl BuildTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start timestamp for a build that was just dispatched.
    pub fn start(&mut self, build_id: &str, at: DateTime<Utc>) {
        self.timers.insert(
            build_id.to_string(),
            BuildTimer {
                start: at,
                finish: None,
            },
        );
    }

    /// Stamp the finish timestamp and return the duration in milliseconds,
    /// or None if no start was ever recorded for this build.
    pub fn finish(&mut self, build_id: &str, at: DateTime<Utc>) -> Option<i64> {
        let timer = self.timers.get_mut(build_id)?;
        timer.finish = Some(at);
        Some((at - timer.start).num_milliseconds())
    }

    /// Discard a record once its finish report reached storage.
    pub fn remove(&mut self, build_id: &str) -> Option<BuildTimer> {
        self.timers.remove(build_id)
    }

    pub fn get(&self, build_id: &str) -> Option<&BuildTimer> {
        self.timers.get(build_id)
    }

    pub fn contains(&self, build_id: &str) -> bool {
        self.timers.contains_key(build_id)
    }
}

impl Controller {
    /// Notify storage that a build started. Fire-and-forget with its own
    /// retry timer; the timer record itself was already written by the
    /// caller, so the scheduler observes the start immediately.
    pub(crate) fn spawn_report_start(&self, build_id: String, started_at: DateTime<Utc>) {
        let storage = self.storage.clone();
        let delay = self.config.report_retry_delay;

        tokio::spawn(async move {
            let input = StartBuildInput {
                build_id: build_id.clone(),
                date_time: started_at,
            };
            loop {
                match storage.build_start(&input).await {
                    Ok(()) => {
                        tracing::debug!(build_id = %build_id, "start report delivered");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(
                            build_id = %build_id,
                            error = %err,
                            delay = ?delay,
                            "start report failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });
    }

    /// Notify storage of the final status, duration and log. The timer
    /// record is discarded only after the report is delivered.
    pub(crate) fn spawn_report_finish(
        &self,
        build_id: String,
        status: BuildStatus,
        log: String,
        duration_ms: i64,
    ) {
        let storage = self.storage.clone();
        let timers = self.timers.clone();
        let delay = self.config.report_retry_delay;

        tokio::spawn(async move {
            let input = FinishBuildInput {
                build_id: build_id.clone(),
                duration: duration_ms,
                success: status == BuildStatus::Success,
                build_log: log,
            };
            loop {
                match storage.build_finish(&input).await {
                    Ok(()) => {
                        timers.write().await.remove(&build_id);
                        tracing::debug!(build_id = %build_id, "finish report delivered");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(
                            build_id = %build_id,
                            error = %err,
                            delay = ?delay,
                            "finish report failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });
    }
}
