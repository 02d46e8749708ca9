//! Ring views handed to the engine by the topology collaborator.

use std::collections::HashSet;

use crate::error::{Result, RingError};
use crate::types::Rank;

/// One rank's view of a channel's ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    /// Rank this rank receives from.
    pub prev: Rank,
    /// Rank this rank sends to.
    pub next: Rank,
    /// Ranks in ring order starting at this rank: `user_ranks[0]` is self,
    /// `user_ranks[1]` is `next`, `user_ranks[n - 1]` is `prev`.
    pub user_ranks: Vec<Rank>,
    /// Position of this rank in the global ring order.
    pub index: usize,
}

impl Ring {
    /// Build `rank`'s view from the global ring order of channel `channel`.
    ///
    /// `order` lists every rank exactly once; data flows from `order[i]` to
    /// `order[i + 1]` and wraps around.
    pub fn from_order(channel: u32, rank: Rank, order: &[Rank]) -> Result<Self> {
        validate_order(channel, order)?;
        let n = order.len();
        let index = order
            .iter()
            .position(|&r| r == rank)
            .ok_or_else(|| RingError::ring(channel, format!("rank {rank} is not in the ring")))?;

        let user_ranks: Vec<Rank> = (0..n).map(|i| order[(index + i) % n]).collect();
        let ring = Self {
            prev: user_ranks[n - 1],
            next: user_ranks[1 % n],
            user_ranks,
            index,
        };
        ring.check_consistent(channel, order)?;
        Ok(ring)
    }

    /// Number of ranks in the ring.
    pub fn n_ranks(&self) -> usize {
        self.user_ranks.len()
    }

    /// This rank.
    pub fn rank(&self) -> Rank {
        self.user_ranks[0]
    }

    /// Ring position `pos` hops downstream of this rank.
    pub fn downstream(&self, pos: usize) -> Rank {
        self.user_ranks[pos % self.user_ranks.len()]
    }

    fn check_consistent(&self, channel: u32, order: &[Rank]) -> Result<()> {
        let n = order.len();
        if order[(self.index + n - 1) % n] != self.prev || order[(self.index + 1) % n] != self.next
        {
            return Err(RingError::ring(
                channel,
                format!(
                    "prev/next ({}, {}) disagree with the ring order",
                    self.prev, self.next
                ),
            ));
        }
        Ok(())
    }
}

/// Check that `order` is a permutation of `0..order.len()`.
pub fn validate_order(channel: u32, order: &[Rank]) -> Result<()> {
    if order.is_empty() {
        return Err(RingError::ring(channel, "empty ring"));
    }
    let n = order.len();
    let mut seen = HashSet::with_capacity(n);
    for &r in order {
        if r as usize >= n {
            return Err(RingError::ring(
                channel,
                format!("rank {r} out of range for {n} ranks"),
            ));
        }
        if !seen.insert(r) {
            return Err(RingError::ring(channel, format!("rank {r} appears twice")));
        }
    }
    Ok(())
}

/// `n_channels` copies of the identity ring `0 -> 1 -> ... -> n-1 -> 0`.
pub fn default_rings(n_ranks: u32, n_channels: usize) -> Vec<Vec<Rank>> {
    let order: Vec<Rank> = (0..n_ranks).collect();
    vec![order; n_channels]
}
