//! Adaptive movement-cap controller.
//!
//! Tracks a decayed estimate of how often writes are truncated and nudges the
//! cap toward the point where that frequency matches the policy budget.
//!
//! ## Frequency estimate
//!
//! On every write, with `Δt` the time since the previous update:
//!
//! ```text
//! w    = min(Δt, decay_window) * 1e6 / decay_window
//! freq = freq * (1e6 - w) / 1e6 + (capped ? w : 0)
//! ```
//!
//! ## Retune
//!
//! At most once per `update_interval_secs`, and never while paused, the cap
//! moves by `max(1, cap * step_ppm / 1e6)`: up when `freq` exceeds the budget
//! by more than the deadband, down when it falls short by more than the
//! deadband. The result is clamped to `[min_cap, max_cap]`.

use truncgeo_types::{CapState, TruncationPolicy, PPM};

/// Outcome of a retune evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetuneOutcome {
    /// Auto-tuning is paused; nothing was evaluated.
    Paused,
    /// The update interval has not elapsed since the last evaluation.
    TooSoon {
        /// Earliest time the next evaluation can run.
        next_eligible: u64,
    },
    /// Evaluated; frequency is within the deadband of the budget or the cap
    /// is already at the relevant bound.
    Unchanged,
    /// Cap raised.
    Raised { from: u32, to: u32 },
    /// Cap lowered.
    Lowered { from: u32, to: u32 },
}

/// Per-pool cap controller.
#[derive(Debug, Clone)]
pub struct CapController {
    state: CapState,
    deadband_ppm: u32,
}

impl CapController {
    /// A controller starting at `cap` with its clocks set to `now`.
    pub fn new(cap: u32, now: u64, deadband_ppm: u32) -> Self {
        Self {
            state: CapState::seeded(cap, now),
            deadband_ppm,
        }
    }

    /// Resume from persisted state.
    pub fn from_state(state: CapState, deadband_ppm: u32) -> Self {
        Self {
            state,
            deadband_ppm,
        }
    }

    /// Fold one write into the frequency estimate.
    pub fn on_write(&mut self, now: u64, capped: bool, policy: &TruncationPolicy) {
        let window = u64::from(policy.decay_window_secs.max(1));
        let ppm = u64::from(PPM);
        let elapsed = now.saturating_sub(self.state.last_frequency_update);
        let weight = elapsed.min(window) * ppm / window;

        let decayed = self.state.cap_frequency_ppm.min(ppm) * (ppm - weight) / ppm;
        let freq = if capped { decayed + weight } else { decayed };
        self.state.cap_frequency_ppm = freq.min(ppm);
        self.state.last_frequency_update = now;

        tracing::trace!(
            freq_ppm = self.state.cap_frequency_ppm,
            weight,
            capped,
            "cap frequency updated"
        );
    }

    /// Retune the cap if the controller is eligible at `now`.
    pub fn maybe_retune(&mut self, now: u64, policy: &TruncationPolicy) -> RetuneOutcome {
        if self.state.auto_tune_paused {
            return RetuneOutcome::Paused;
        }
        let next_eligible = self
            .state
            .last_retune
            .saturating_add(u64::from(policy.update_interval_secs));
        if now < next_eligible {
            return RetuneOutcome::TooSoon { next_eligible };
        }
        self.state.last_retune = now;

        let cap = self.state.current_cap;
        let step = if policy.step_ppm == 0 {
            0
        } else {
            let scaled = u64::from(cap) * u64::from(policy.step_ppm) / u64::from(PPM);
            u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
        };

        let freq = self.state.cap_frequency_ppm;
        let budget = u64::from(policy.budget_ppm);
        let deadband = u64::from(self.deadband_ppm);

        let target = if freq > budget + deadband {
            cap.saturating_add(step).min(policy.max_cap)
        } else if freq + deadband < budget {
            cap.saturating_sub(step).max(policy.min_cap)
        } else {
            cap
        };

        self.state.current_cap = target;
        if target > cap {
            tracing::debug!(from = cap, to = target, freq_ppm = freq, "cap raised");
            RetuneOutcome::Raised {
                from: cap,
                to: target,
            }
        } else if target < cap {
            tracing::debug!(from = cap, to = target, freq_ppm = freq, "cap lowered");
            RetuneOutcome::Lowered {
                from: cap,
                to: target,
            }
        } else {
            RetuneOutcome::Unchanged
        }
    }

    /// Pause or resume auto-tuning.
    pub fn set_paused(&mut self, paused: bool) {
        if paused {
            tracing::warn!("cap controller: auto-tune paused");
        } else {
            tracing::info!("cap controller: auto-tune resumed");
        }
        self.state.auto_tune_paused = paused;
    }

    /// Bring the cap inside a (possibly new) policy's bounds.
    ///
    /// Returns the previous cap if it had to move.
    pub fn clamp_to(&mut self, policy: &TruncationPolicy) -> Option<u32> {
        let cap = self.state.current_cap;
        let clamped = policy.clamp_cap(cap);
        if clamped == cap {
            return None;
        }
        self.state.current_cap = clamped;
        Some(cap)
    }

    /// The live cap.
    pub fn current_cap(&self) -> u32 {
        self.state.current_cap
    }

    /// The decayed truncation frequency, in ppm.
    pub fn frequency_ppm(&self) -> u64 {
        self.state.cap_frequency_ppm
    }

    /// Whether auto-tuning is paused.
    pub fn is_paused(&self) -> bool {
        self.state.auto_tune_paused
    }

    /// Full controller state for persistence.
    pub fn state(&self) -> CapState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TruncationPolicy {
        TruncationPolicy {
            min_cap: 10,
            max_cap: 1_000,
            default_cap: 100,
            step_ppm: 100_000,
            budget_ppm: 100_000,
            decay_window_secs: 600,
            update_interval_secs: 60,
        }
    }

    #[test]
    fn test_frequency_weights_by_elapsed_time() {
        let p = policy();
        let mut c = CapController::new(100, 0, 0);
        c.on_write(60, true, &p);
        // 60 / 600 of the window.
        assert_eq!(c.frequency_ppm(), 100_000);

        c.on_write(120, false, &p);
        assert_eq!(c.frequency_ppm(), 90_000);
    }

    #[test]
    fn test_frequency_saturates_after_full_window() {
        let p = policy();
        let mut c = CapController::new(100, 0, 0);
        c.on_write(10_000, true, &p);
        assert_eq!(c.frequency_ppm(), u64::from(PPM));
        c.on_write(20_000, false, &p);
        assert_eq!(c.frequency_ppm(), 0);
    }

    #[test]
    fn test_frequency_above_ceiling_is_bounded() {
        let p = policy();
        let mut state = CapState::seeded(100, 0);
        state.cap_frequency_ppm = u64::MAX;
        let mut c = CapController::from_state(state, 0);
        c.on_write(60, false, &p);
        assert_eq!(c.frequency_ppm(), 900_000);
    }

    #[test]
    fn test_same_second_write_does_not_move_frequency() {
        let p = policy();
        let mut c = CapController::new(100, 0, 0);
        c.on_write(60, true, &p);
        let before = c.frequency_ppm();
        c.on_write(60, true, &p);
        assert_eq!(c.frequency_ppm(), before);
    }

    #[test]
    fn test_retune_rate_limited() {
        let p = policy();
        let mut c = CapController::new(100, 0, 0);
        assert_eq!(
            c.maybe_retune(59, &p),
            RetuneOutcome::TooSoon { next_eligible: 60 }
        );
        // Zero frequency is below budget: lower.
        assert_eq!(
            c.maybe_retune(60, &p),
            RetuneOutcome::Lowered { from: 100, to: 90 }
        );
        assert!(matches!(
            c.maybe_retune(61, &p),
            RetuneOutcome::TooSoon { next_eligible: 120 }
        ));
    }

    #[test]
    fn test_paused_skips_without_stamping() {
        let p = policy();
        let mut c = CapController::new(100, 0, 0);
        c.set_paused(true);
        assert_eq!(c.maybe_retune(1_000, &p), RetuneOutcome::Paused);
        assert_eq!(c.state().last_retune, 0);

        // Frequency keeps updating while paused.
        c.on_write(60, true, &p);
        assert!(c.frequency_ppm() > 0);

        c.set_paused(false);
        assert_eq!(c.maybe_retune(1_000, &p), RetuneOutcome::Unchanged);
        assert_eq!(c.state().last_retune, 1_000);
    }

    #[test]
    fn test_constant_truncation_drives_cap_to_max() {
        let p = policy();
        let mut c = CapController::new(100, 0, 0);
        for step in 1..=400u64 {
            let now = step * 60;
            c.on_write(now, true, &p);
            c.maybe_retune(now, &p);
        }
        assert_eq!(c.current_cap(), p.max_cap);
    }

    #[test]
    fn test_no_truncation_drives_cap_to_min() {
        let p = policy();
        let mut c = CapController::new(100, 0, 0);
        for step in 1..=100u64 {
            let now = step * 60;
            c.on_write(now, false, &p);
            c.maybe_retune(now, &p);
        }
        assert_eq!(c.current_cap(), p.min_cap);
    }

    #[test]
    fn test_step_at_least_one() {
        let p = TruncationPolicy {
            step_ppm: 1,
            ..policy()
        };
        let mut c = CapController::new(50, 0, 0);
        assert_eq!(
            c.maybe_retune(60, &p),
            RetuneOutcome::Lowered { from: 50, to: 49 }
        );
    }

    #[test]
    fn test_zero_step_never_moves() {
        let p = TruncationPolicy {
            step_ppm: 0,
            ..policy()
        };
        let mut c = CapController::new(50, 0, 0);
        assert_eq!(c.maybe_retune(60, &p), RetuneOutcome::Unchanged);
    }

    #[test]
    fn test_deadband_holds_cap() {
        let p = policy();
        let mut c = CapController::new(100, 0, 50_000);
        c.on_write(60, true, &p);
        // freq 100_000 == budget: inside the deadband either way.
        assert_eq!(c.maybe_retune(60, &p), RetuneOutcome::Unchanged);
    }

    #[test]
    fn test_clamp_to_new_bounds() {
        let mut c = CapController::new(100, 0, 0);
        let narrow = TruncationPolicy {
            min_cap: 10,
            max_cap: 40,
            default_cap: 20,
            ..policy()
        };
        assert_eq!(c.clamp_to(&narrow), Some(100));
        assert_eq!(c.current_cap(), 40);
        assert_eq!(c.clamp_to(&narrow), None);
    }
}
