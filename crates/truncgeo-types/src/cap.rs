//! Live state of a pool's adaptive movement cap.

use serde::{Deserialize, Serialize};

/// Controller state for one pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapState {
    /// The live per-write movement limit, in ticks.
    pub current_cap: u32,
    /// Unix time of the last retune evaluation.
    pub last_retune: u64,
    /// When set, retunes are skipped; the frequency estimate keeps updating.
    pub auto_tune_paused: bool,
    /// Decayed estimate of the truncated-write frequency, in ppm.
    pub cap_frequency_ppm: u64,
    /// Unix time the frequency estimate was last decayed.
    pub last_frequency_update: u64,
}

impl CapState {
    /// Fresh state for a pool seeded at `now` with the given starting cap.
    pub fn seeded(current_cap: u32, now: u64) -> Self {
        Self {
            current_cap,
            last_retune: now,
            auto_tune_paused: false,
            cap_frequency_ppm: 0,
            last_frequency_update: now,
        }
    }
}
