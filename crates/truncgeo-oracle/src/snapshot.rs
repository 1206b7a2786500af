//! Export and import of a pool's full state.

use serde::{Deserialize, Serialize};
use truncgeo_types::{CapState, PoolId, TruncationPolicy, WriterId};

use crate::observation::Observation;
use crate::ring::RingState;

/// Everything needed to rebuild one pool: ring metadata and slots, the cached
/// policy, controller state, and the write-path bookkeeping.
///
/// `observations` holds slots `0..ring.cardinality` in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pool: PoolId,
    pub writer: WriterId,
    pub ring: RingState,
    pub observations: Vec<Observation>,
    pub policy: TruncationPolicy,
    pub cap: CapState,
    /// Liquidity reported by the most recent write.
    pub liquidity: u128,
    /// Full-width time of the most recent write.
    pub last_write_at: u64,
}

/// Serializable summary of a pool, without the observation slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub pool: PoolId,
    pub ring: RingState,
    pub policy: TruncationPolicy,
    pub cap: CapState,
    pub latest_tick: i32,
    pub latest_timestamp: u32,
}

impl PoolSnapshot {
    /// Summary of this snapshot, if it holds the newest observation.
    pub fn summary(&self) -> Option<PoolSummary> {
        let latest = self.observations.get(usize::from(self.ring.write_index))?;
        Some(PoolSummary {
            pool: self.pool,
            ring: self.ring,
            policy: self.policy,
            cap: self.cap,
            latest_tick: latest.tick,
            latest_timestamp: latest.timestamp,
        })
    }
}
