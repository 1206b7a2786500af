//! Synthetic tick streams and cap-event tracking.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use truncgeo_types::{TruncationPolicy, MAX_TICK, MIN_TICK};

use crate::config::ScenarioKind;

/// Deterministic source of raw ticks for one scenario.
#[derive(Debug)]
pub struct TickStream {
    kind: ScenarioKind,
    rng: StdRng,
    /// Largest move a calm step may make; strictly below the minimum cap.
    calm_range: i32,
}

impl TickStream {
    pub fn new(kind: ScenarioKind, seed: u64, policy: &TruncationPolicy) -> Self {
        let calm_range = i32::try_from(policy.min_cap / 2).unwrap_or(i32::MAX);
        Self {
            kind,
            rng: StdRng::seed_from_u64(seed),
            calm_range,
        }
    }

    /// Next raw tick given the last applied one.
    ///
    /// Volatile steps swing between the two halves of the tick range, so every
    /// move is at least half the range. Calm steps wander by at most
    /// `min_cap / 2`.
    pub fn next_tick(&mut self, last_applied: i32) -> i32 {
        match self.kind {
            ScenarioKind::Volatile => {
                let magnitude = self.rng.gen_range(MAX_TICK / 2..=MAX_TICK);
                if last_applied >= 0 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            ScenarioKind::Calm => {
                let delta = if self.calm_range == 0 {
                    0
                } else {
                    self.rng.gen_range(-self.calm_range..=self.calm_range)
                };
                last_applied.saturating_add(delta).clamp(MIN_TICK, MAX_TICK)
            }
        }
    }
}

/// Edge detector for runs of truncated writes.
#[derive(Debug, Default)]
pub struct CapTracker {
    in_cap: bool,
    events: u32,
    capped_writes: u32,
}

impl CapTracker {
    /// Record one write's outcome, logging the start and end of each run of
    /// truncated writes.
    pub fn observe(&mut self, step: u32, capped: bool, cap: u32) {
        if capped {
            self.capped_writes += 1;
        }
        if capped && !self.in_cap {
            self.events += 1;
            tracing::info!(step, cap, ">> CAP event START");
        } else if !capped && self.in_cap {
            tracing::info!(step, cap, ">> CAP event END");
        }
        self.in_cap = capped;
    }

    /// Number of distinct runs of truncated writes.
    pub fn events(&self) -> u32 {
        self.events
    }

    /// Total truncated writes seen.
    pub fn capped_writes(&self) -> u32 {
        self.capped_writes
    }
}
