//! # truncgeo-types
//!
//! Shared domain types used across the truncgeo workspace: pool and writer
//! identifiers, the per-pool truncation policy, the controller's cap state, and
//! the numeric bounds every crate agrees on.

pub mod cap;
pub mod ids;
pub mod policy;

pub use cap::CapState;
pub use ids::{PoolId, WriterId};
pub use policy::TruncationPolicy;

/// Lowest representable tick.
pub const MIN_TICK: i32 = -887_272;

/// Highest representable tick.
pub const MAX_TICK: i32 = 887_272;

/// Largest movement between two valid ticks.
pub const MAX_TICK_MOVE: u32 = 1_774_544;

/// Parts-per-million denominator (1_000_000 = 100%).
pub const PPM: u32 = 1_000_000;

/// Hard ceiling on the number of ring slots per pool.
pub const MAX_CARDINALITY: u16 = 1024;

/// Ring slots are allocated in pages of this many observations.
pub const OBSERVATION_PAGE_SIZE: usize = 512;

/// Error types for parsing shared types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Identifier was not valid hex.
    #[error("invalid hex identifier: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Identifier decoded to the wrong number of bytes.
    #[error("identifier must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required byte length.
        expected: usize,
        /// Decoded byte length.
        actual: usize,
    },
}

/// Returns `true` if `tick` lies within `[MIN_TICK, MAX_TICK]`.
pub fn tick_in_range(tick: i32) -> bool {
    (MIN_TICK..=MAX_TICK).contains(&tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_range() {
        assert!(tick_in_range(0));
        assert!(tick_in_range(MIN_TICK));
        assert!(tick_in_range(MAX_TICK));
        assert!(!tick_in_range(MIN_TICK - 1));
        assert!(!tick_in_range(MAX_TICK + 1));
    }

    #[test]
    fn test_max_move_spans_range() {
        assert_eq!(MAX_TICK_MOVE as i64, MAX_TICK as i64 - MIN_TICK as i64);
    }

    #[test]
    fn test_cardinality_is_whole_pages() {
        assert_eq!(MAX_CARDINALITY as usize % OBSERVATION_PAGE_SIZE, 0);
    }
}
