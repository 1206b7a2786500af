//! Per-pool truncation policy.
//!
//! The policy bounds the adaptive movement cap and parameterizes the feedback
//! loop that tunes it. It is supplied by an external registry and cached per
//! pool; validation lives with the oracle so the hard bounds can be configured.

use serde::{Deserialize, Serialize};

/// Default lower bound on the movement cap, in ticks.
pub const DEFAULT_MIN_CAP: u32 = 10;

/// Default upper bound on the movement cap, in ticks.
pub const DEFAULT_MAX_CAP: u32 = 4_000;

/// Default starting cap, in ticks.
pub const DEFAULT_CAP: u32 = 50;

/// Default maximum relative change per retune (2%).
pub const DEFAULT_STEP_PPM: u32 = 20_000;

/// Default target fraction of truncated writes (5%).
pub const DEFAULT_BUDGET_PPM: u32 = 50_000;

/// Default truncation-frequency decay window (one day).
pub const DEFAULT_DECAY_WINDOW_SECS: u32 = 86_400;

/// Default minimum spacing between retunes (ten minutes).
pub const DEFAULT_UPDATE_INTERVAL_SECS: u32 = 600;

/// Bounds and tuning parameters for one pool's movement cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationPolicy {
    /// Lowest value the cap may be tuned down to.
    #[serde(default = "default_min_cap")]
    pub min_cap: u32,
    /// Highest value the cap may be tuned up to.
    #[serde(default = "default_max_cap")]
    pub max_cap: u32,
    /// Cap installed when the pool is enabled.
    #[serde(default = "default_cap")]
    pub default_cap: u32,
    /// Maximum fractional change to the cap per retune, in ppm.
    #[serde(default = "default_step_ppm")]
    pub step_ppm: u32,
    /// Target fraction of writes allowed to be truncated, in ppm.
    #[serde(default = "default_budget_ppm")]
    pub budget_ppm: u32,
    /// Window over which truncation frequency is estimated.
    #[serde(default = "default_decay_window")]
    pub decay_window_secs: u32,
    /// Minimum spacing between retune evaluations.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u32,
}

fn default_min_cap() -> u32 {
    DEFAULT_MIN_CAP
}

fn default_max_cap() -> u32 {
    DEFAULT_MAX_CAP
}

fn default_cap() -> u32 {
    DEFAULT_CAP
}

fn default_step_ppm() -> u32 {
    DEFAULT_STEP_PPM
}

fn default_budget_ppm() -> u32 {
    DEFAULT_BUDGET_PPM
}

fn default_decay_window() -> u32 {
    DEFAULT_DECAY_WINDOW_SECS
}

fn default_update_interval() -> u32 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self {
            min_cap: DEFAULT_MIN_CAP,
            max_cap: DEFAULT_MAX_CAP,
            default_cap: DEFAULT_CAP,
            step_ppm: DEFAULT_STEP_PPM,
            budget_ppm: DEFAULT_BUDGET_PPM,
            decay_window_secs: DEFAULT_DECAY_WINDOW_SECS,
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
        }
    }
}

impl TruncationPolicy {
    /// Clamp a cap value into `[min_cap, max_cap]`.
    pub fn clamp_cap(&self, cap: u32) -> u32 {
        cap.max(self.min_cap).min(self.max_cap)
    }
}
