//! Observation record and cumulative accumulation.
//!
//! An observation stores two running sums since genesis:
//!
//! ```text
//! tick_cumulative             += tick * Δt                 (56-bit, signed)
//! seconds_per_liquidity_x128  += (Δt << 128) / max(L, 1)   (160-bit, Q128)
//! ```
//!
//! where `tick` is the tick in effect over the elapsed interval (the tick
//! stored in the previous observation) and `L` is the liquidity reported with
//! the write that closes the interval. Both sums use wrapping arithmetic at
//! their stored width; averages are always taken from differences.
//!
//! ## Headroom
//!
//! Over one full 32-bit timestamp cycle (2^32 s) the tick sum moves at most
//! `887272 * 2^32 < 2^52` and the liquidity sum at most `2^32 * 2^128 = 2^160`
//! (at `L = 1`), so neither width can alias within the retention horizon.

use primitive_types::U256;

/// Bit width of the stored tick accumulator.
pub const TICK_CUMULATIVE_BITS: u32 = 56;

/// Bit width of the stored liquidity accumulator.
pub const LIQUIDITY_CUMULATIVE_BITS: usize = 160;

/// Mask selecting the low 160 bits of a `U256`.
pub fn liquidity_mask() -> U256 {
    (U256::one() << LIQUIDITY_CUMULATIVE_BITS) - U256::one()
}

/// Reduce a tick accumulator to its 56-bit two's-complement value.
pub fn wrap_tick_cumulative(value: i64) -> i64 {
    let shift = 64 - TICK_CUMULATIVE_BITS;
    (value << shift) >> shift
}

/// Wrapping difference `end - start` of two tick accumulators.
pub fn tick_cumulative_delta(end: i64, start: i64) -> i64 {
    wrap_tick_cumulative(end.wrapping_sub(start))
}

/// Wrapping difference `end - start` of two liquidity accumulators.
pub fn liquidity_cumulative_delta(end: U256, start: U256) -> U256 {
    end.overflowing_sub(start).0 & liquidity_mask()
}

/// `(elapsed << 128) / max(liquidity, 1)`.
pub fn seconds_per_liquidity_x128(elapsed: u32, liquidity: u128) -> U256 {
    (U256::from(elapsed) << 128usize) / U256::from(liquidity.max(1))
}

/// One slot of the observation log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// Block time of the observation, wrapped to 32 bits.
    pub timestamp: u32,
    /// Applied (post-truncation) tick in effect from `timestamp` onward.
    pub tick: i32,
    /// Running sum of `tick * Δt`.
    pub tick_cumulative: i64,
    /// Running sum of `(Δt << 128) / liquidity`.
    pub seconds_per_liquidity_x128: U256,
    /// False only for never-written slots.
    pub initialized: bool,
}

/// Cumulative values sampled at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cumulatives {
    /// Tick accumulator at the sampled instant.
    pub tick_cumulative: i64,
    /// Liquidity accumulator at the sampled instant.
    pub seconds_per_liquidity_x128: U256,
}

impl Observation {
    /// The genesis observation of a pool.
    pub fn seed(timestamp: u32, tick: i32) -> Self {
        Self {
            timestamp,
            tick,
            tick_cumulative: 0,
            seconds_per_liquidity_x128: U256::zero(),
            initialized: true,
        }
    }

    /// Advance to `timestamp`: accumulate this observation's tick and the
    /// given liquidity over the elapsed interval, and carry `next_tick` as
    /// the tick in effect from `timestamp` onward.
    pub fn transform(&self, timestamp: u32, next_tick: i32, liquidity: u128) -> Self {
        let elapsed = timestamp.wrapping_sub(self.timestamp);
        let tick_cumulative = self
            .tick_cumulative
            .wrapping_add(i64::from(self.tick) * i64::from(elapsed));
        let spl = (self.seconds_per_liquidity_x128
            + seconds_per_liquidity_x128(elapsed, liquidity))
            & liquidity_mask();

        Self {
            timestamp,
            tick: next_tick,
            tick_cumulative: wrap_tick_cumulative(tick_cumulative),
            seconds_per_liquidity_x128: spl,
            initialized: true,
        }
    }

    /// The cumulative values recorded by this observation.
    pub fn cumulatives(&self) -> Cumulatives {
        Cumulatives {
            tick_cumulative: self.tick_cumulative,
            seconds_per_liquidity_x128: self.seconds_per_liquidity_x128,
        }
    }
}
