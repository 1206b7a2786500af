//! Library configuration.
//!
//! Embedders typically nest this under an `[oracle]` table in their own TOML
//! config. Every field has a default.

use serde::{Deserialize, Serialize};
use truncgeo_types::TruncationPolicy;

use crate::policy::PolicyBounds;

/// Oracle-wide settings shared by every pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Hard bounds applied when validating any policy.
    #[serde(default)]
    pub policy_bounds: PolicyBounds,
    /// Tolerance around the budget inside which retunes leave the cap alone.
    #[serde(default)]
    pub retune_deadband_ppm: u32,
    /// Policy served to pools with no explicit entry in the policy source.
    #[serde(default)]
    pub default_policy: TruncationPolicy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            policy_bounds: PolicyBounds::default(),
            retune_deadband_ppm: 0,
            default_policy: TruncationPolicy::default(),
        }
    }
}

impl OracleConfig {
    /// Validate the default policy against the configured bounds.
    pub fn validate(&self) -> crate::Result<()> {
        crate::policy::validate(&self.default_policy, &self.policy_bounds)
    }
}
