//! Policy validation and the policy source.
//!
//! Policies are pulled from a [`PolicySource`] when a pool is enabled or its
//! policy is refreshed, validated against the configured [`PolicyBounds`], and
//! cached on the pool. Validation never runs on the write path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use truncgeo_types::{PoolId, TruncationPolicy, MAX_TICK_MOVE, PPM};

use crate::{OracleError, Result};

/// Default lower bound on the decay window (one minute).
pub const DEFAULT_MIN_DECAY_WINDOW_SECS: u32 = 60;

/// Default upper bound on the decay window (one day).
pub const DEFAULT_MAX_DECAY_WINDOW_SECS: u32 = 86_400;

/// Default lower bound on the retune interval (one minute).
pub const DEFAULT_MIN_UPDATE_INTERVAL_SECS: u32 = 60;

/// Default upper bound on the retune interval (one day).
pub const DEFAULT_MAX_UPDATE_INTERVAL_SECS: u32 = 86_400;

/// Hard bounds on the time parameters of any accepted policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBounds {
    #[serde(default = "default_min_decay_window")]
    pub min_decay_window_secs: u32,
    #[serde(default = "default_max_decay_window")]
    pub max_decay_window_secs: u32,
    #[serde(default = "default_min_update_interval")]
    pub min_update_interval_secs: u32,
    #[serde(default = "default_max_update_interval")]
    pub max_update_interval_secs: u32,
}

fn default_min_decay_window() -> u32 {
    DEFAULT_MIN_DECAY_WINDOW_SECS
}

fn default_max_decay_window() -> u32 {
    DEFAULT_MAX_DECAY_WINDOW_SECS
}

fn default_min_update_interval() -> u32 {
    DEFAULT_MIN_UPDATE_INTERVAL_SECS
}

fn default_max_update_interval() -> u32 {
    DEFAULT_MAX_UPDATE_INTERVAL_SECS
}

impl Default for PolicyBounds {
    fn default() -> Self {
        Self {
            min_decay_window_secs: DEFAULT_MIN_DECAY_WINDOW_SECS,
            max_decay_window_secs: DEFAULT_MAX_DECAY_WINDOW_SECS,
            min_update_interval_secs: DEFAULT_MIN_UPDATE_INTERVAL_SECS,
            max_update_interval_secs: DEFAULT_MAX_UPDATE_INTERVAL_SECS,
        }
    }
}

fn invalid(reason: impl Into<String>) -> OracleError {
    OracleError::InvalidPolicy {
        reason: reason.into(),
    }
}

/// Check a policy against the structural rules and the configured bounds.
///
/// # Errors
///
/// - [`OracleError::InvalidPolicy`] naming the first violated constraint
pub fn validate(policy: &TruncationPolicy, bounds: &PolicyBounds) -> Result<()> {
    if policy.min_cap == 0 || policy.max_cap == 0 {
        return Err(invalid("cap bounds must be non-zero"));
    }
    if policy.min_cap > policy.max_cap {
        return Err(invalid(format!(
            "min_cap {} exceeds max_cap {}",
            policy.min_cap, policy.max_cap
        )));
    }
    if policy.max_cap > MAX_TICK_MOVE {
        return Err(invalid(format!(
            "max_cap {} exceeds the tick range ({MAX_TICK_MOVE})",
            policy.max_cap
        )));
    }
    if !(policy.min_cap..=policy.max_cap).contains(&policy.default_cap) {
        return Err(invalid(format!(
            "default_cap {} outside [{}, {}]",
            policy.default_cap, policy.min_cap, policy.max_cap
        )));
    }
    if policy.step_ppm > PPM {
        return Err(invalid(format!("step_ppm {} exceeds {PPM}", policy.step_ppm)));
    }
    if policy.budget_ppm > PPM {
        return Err(invalid(format!(
            "budget_ppm {} exceeds {PPM}",
            policy.budget_ppm
        )));
    }
    if !(bounds.min_decay_window_secs..=bounds.max_decay_window_secs)
        .contains(&policy.decay_window_secs)
    {
        return Err(invalid(format!(
            "decay_window_secs {} outside [{}, {}]",
            policy.decay_window_secs, bounds.min_decay_window_secs, bounds.max_decay_window_secs
        )));
    }
    if !(bounds.min_update_interval_secs..=bounds.max_update_interval_secs)
        .contains(&policy.update_interval_secs)
    {
        return Err(invalid(format!(
            "update_interval_secs {} outside [{}, {}]",
            policy.update_interval_secs,
            bounds.min_update_interval_secs,
            bounds.max_update_interval_secs
        )));
    }
    Ok(())
}

/// Supplies the truncation policy for a pool.
///
/// Implemented by whatever registry owns pool configuration. The oracle pulls
/// from it only on enable and explicit refresh.
pub trait PolicySource {
    /// The current policy for `pool`.
    fn policy_for(&self, pool: &PoolId) -> Result<TruncationPolicy>;
}

/// In-memory policy source: a default policy with per-pool overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    default: Option<TruncationPolicy>,
    overrides: HashMap<PoolId, TruncationPolicy>,
}

impl StaticPolicySource {
    /// A source that answers every pool with `policy`.
    pub fn new(policy: TruncationPolicy) -> Self {
        Self {
            default: Some(policy),
            overrides: HashMap::new(),
        }
    }

    /// A source with no default; only pools set explicitly resolve.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Install or replace the policy for one pool.
    pub fn set(&mut self, pool: PoolId, policy: TruncationPolicy) {
        tracing::debug!(%pool, "policy source: override set");
        self.overrides.insert(pool, policy);
    }
}

impl PolicySource for StaticPolicySource {
    fn policy_for(&self, pool: &PoolId) -> Result<TruncationPolicy> {
        self.overrides
            .get(pool)
            .copied()
            .or(self.default)
            .ok_or(OracleError::PolicyUnavailable { pool: *pool })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> PolicyBounds {
        PolicyBounds::default()
    }

    #[test]
    fn test_default_policy_is_valid() {
        validate(&TruncationPolicy::default(), &bounds()).expect("default policy");
    }

    #[test]
    fn test_rejects_zero_and_inverted_caps() {
        let zero = TruncationPolicy {
            min_cap: 0,
            ..TruncationPolicy::default()
        };
        assert!(matches!(
            validate(&zero, &bounds()),
            Err(OracleError::InvalidPolicy { .. })
        ));

        let inverted = TruncationPolicy {
            min_cap: 500,
            max_cap: 100,
            default_cap: 100,
            ..TruncationPolicy::default()
        };
        let err = validate(&inverted, &bounds()).expect_err("inverted");
        assert!(err.to_string().contains("min_cap 500"));
    }

    #[test]
    fn test_rejects_default_cap_outside_bounds() {
        let p = TruncationPolicy {
            default_cap: 5_000,
            ..TruncationPolicy::default()
        };
        assert!(validate(&p, &bounds()).is_err());
    }

    #[test]
    fn test_rejects_max_cap_beyond_tick_range() {
        let p = TruncationPolicy {
            max_cap: MAX_TICK_MOVE + 1,
            ..TruncationPolicy::default()
        };
        assert!(validate(&p, &bounds()).is_err());
    }

    #[test]
    fn test_rejects_ppm_over_one() {
        let step = TruncationPolicy {
            step_ppm: PPM + 1,
            ..TruncationPolicy::default()
        };
        assert!(validate(&step, &bounds()).is_err());

        let budget = TruncationPolicy {
            budget_ppm: PPM + 1,
            ..TruncationPolicy::default()
        };
        assert!(validate(&budget, &bounds()).is_err());

        let zero_step = TruncationPolicy {
            step_ppm: 0,
            ..TruncationPolicy::default()
        };
        validate(&zero_step, &bounds()).expect("zero step is allowed");
    }

    #[test]
    fn test_time_bounds_are_configurable() {
        let p = TruncationPolicy {
            decay_window_secs: 30,
            update_interval_secs: 10,
            ..TruncationPolicy::default()
        };
        assert!(validate(&p, &bounds()).is_err());

        let loose = PolicyBounds {
            min_decay_window_secs: 1,
            min_update_interval_secs: 1,
            ..PolicyBounds::default()
        };
        validate(&p, &loose).expect("loose bounds");
    }

    #[test]
    fn test_static_source_overrides() {
        let pool_a = PoolId::derive(b"a");
        let pool_b = PoolId::derive(b"b");
        let mut source = StaticPolicySource::new(TruncationPolicy::default());
        let custom = TruncationPolicy {
            max_cap: 900,
            ..TruncationPolicy::default()
        };
        source.set(pool_a, custom);

        assert_eq!(source.policy_for(&pool_a).expect("a").max_cap, 900);
        assert_eq!(
            source.policy_for(&pool_b).expect("b"),
            TruncationPolicy::default()
        );
    }

    #[test]
    fn test_empty_source_is_unavailable() {
        let source = StaticPolicySource::empty();
        let err = source
            .policy_for(&PoolId::derive(b"missing"))
            .expect_err("no policy");
        assert!(matches!(err, OracleError::PolicyUnavailable { .. }));
    }
}
