use std::collections::VecDeque;

use crate::controller::build::Build;

/// FIFO queue of builds waiting for an agent, deduplicated by build id.
///
/// The queue is the sole owner of pending builds: a build leaves through
/// `dequeue_front` and comes back only through `requeue`. There is no
/// priority scheme.
#[derive(Debug, Default)]
pub struct BuildQueue {
    builds: VecDeque<Build>,
}

impl BuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a build. Inserting an id that is already queued is a no-op;
    /// returns whether the build was actually added.
    pub fn enqueue(&mut self, build: Build) -> bool {
        if self.contains(&build.id) {
            return false;
        }
        self.builds.push_back(build);
        true
    }

    /// Reinsert a build after a failed dispatch or a lost agent. Goes to the
    /// back of the queue and deduplicates like `enqueue`.
    pub fn requeue(&mut self, build: Build) -> bool {
        if self.contains(&build.id) {
            tracing::debug!(build_id = %build.id, "build already queued, requeue skipped");
            return false;
        }
        self.builds.push_back(build);
        true
    }

    /// Remove and return the head of the queue.
    pub fn dequeue_front(&mut self) -> Option<Build> {
        self.builds.pop_front()
    }

    pub fn contains(&self, build_id: &str) -> bool {
        self.builds.iter().any(|b| b.id == build_id)
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }

    /// Clone of the current queue contents, in dispatch order.
    pub fn snapshot(&self) -> Vec<Build> {
        self.builds.iter().cloned().collect()
    }
}
