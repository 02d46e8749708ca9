use tokio::task::JoinHandle;

use super::ExecutionGroup;
use crate::channel::ChannelId;
use crate::error::{Result, RingError};
use crate::types::Rank;

/// Handle to the execution groups started by one `Communicator::launch`.
///
/// Each group runs on its own blocking thread. Dropping the handle detaches
/// the groups; use the communicator's abort token to stop them.
pub struct LaunchHandle {
    rank: Rank,
    groups: Vec<(ChannelId, JoinHandle<Result<()>>)>,
}

impl LaunchHandle {
    /// Start every group. Must be called from within a tokio runtime.
    pub(crate) fn spawn(rank: Rank, groups: Vec<ExecutionGroup>) -> Self {
        let groups = groups
            .into_iter()
            .map(|group| {
                let channel = group.channel_id();
                (channel, tokio::task::spawn_blocking(move || group.run()))
            })
            .collect();
        Self { rank, groups }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Number of execution groups started.
    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Check if every group has finished (non-blocking).
    pub fn is_finished(&self) -> bool {
        self.groups.iter().all(|(_, h)| h.is_finished())
    }

    /// Wait for every group and return the first error, if any.
    pub async fn wait(self) -> Result<()> {
        let mut first_err = None;
        for (channel, handle) in self.groups {
            let result = handle.await.unwrap_or_else(|e| {
                Err(RingError::ExecutionFailed {
                    channel,
                    reason: format!("execution group panicked: {e}"),
                })
            });
            if let Err(e) = result
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Launches of several ranks, waited on together.
#[derive(Default)]
pub struct LaunchGroup {
    handles: Vec<LaunchHandle>,
}

impl LaunchGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: LaunchHandle) {
        self.handles.push(handle);
    }

    /// Wait for every launch. All are awaited regardless of errors; the
    /// first error, in push order, is returned.
    pub async fn wait_all(self) -> Result<()> {
        let mut first_err = None;
        for h in self.handles {
            if let Err(e) = h.wait().await
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl FromIterator<LaunchHandle> for LaunchGroup {
    fn from_iter<I: IntoIterator<Item = LaunchHandle>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}
