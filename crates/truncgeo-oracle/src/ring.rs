//! Paged circular observation log.
//!
//! Slots live in fixed pages of [`OBSERVATION_PAGE_SIZE`] observations that
//! are allocated the first time the ring grows into them; existing slots
//! never move. Growth is lazy: [`ObservationLog::grow`] only raises
//! `cardinality_next`, and `append` extends `cardinality` one slot at a time
//! when the write index reaches the current boundary. Every slot below
//! `cardinality` is therefore initialized.
//!
//! Timestamps are 32-bit and wrap; all ordering goes through [`lte`], which
//! compares relative to the query time.

use serde::{Deserialize, Serialize};
use truncgeo_types::{MAX_CARDINALITY, OBSERVATION_PAGE_SIZE};

use crate::observation::{
    liquidity_cumulative_delta, tick_cumulative_delta, wrap_tick_cumulative, Cumulatives,
    Observation,
};
use crate::{OracleError, Result};

type Page = Box<[Observation; OBSERVATION_PAGE_SIZE]>;

/// Ring metadata for one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingState {
    /// Slot holding the newest observation.
    pub write_index: u16,
    /// Number of slots in use.
    pub cardinality: u16,
    /// Capacity the ring will grow into as appends reach the boundary.
    pub cardinality_next: u16,
}

/// Result of an append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Appended {
    /// Slot written.
    pub index: u16,
    /// True if the write landed in the same second as the newest slot and
    /// was folded into it.
    pub merged: bool,
    /// True if this append extended the ring by one slot.
    pub grew: bool,
}

/// Wrap-aware `a <= b` for timestamps no later than `time`.
///
/// Any timestamp greater than `time` is taken to be from the previous 2^32
/// cycle.
pub fn lte(time: u32, a: u32, b: u32) -> bool {
    if a <= time && b <= time {
        return a <= b;
    }
    let wrap = 1u64 << 32;
    let a_adjusted = if a > time { u64::from(a) } else { u64::from(a) + wrap };
    let b_adjusted = if b > time { u64::from(b) } else { u64::from(b) + wrap };
    a_adjusted <= b_adjusted
}

/// Circular observation log for one pool.
#[derive(Clone, Debug, Default)]
pub struct ObservationLog {
    pages: Vec<Page>,
    state: RingState,
}

impl ObservationLog {
    /// Create an empty, uninitialized log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed slot 0 with the genesis observation.
    pub fn initialize(&mut self, timestamp: u32, tick: i32) -> RingState {
        self.pages.clear();
        self.ensure_page(0);
        *self.slot_mut(0) = Observation::seed(timestamp, tick);
        self.state = RingState {
            write_index: 0,
            cardinality: 1,
            cardinality_next: 1,
        };
        self.state
    }

    /// Rebuild a log from persisted parts, checking the ring invariants.
    ///
    /// `observations` must hold exactly `ring.cardinality` slots in index
    /// order.
    pub fn from_parts(ring: RingState, observations: &[Observation]) -> Result<Self> {
        if ring.cardinality == 0 {
            return Err(OracleError::CorruptLog("cardinality is zero".to_string()));
        }
        if ring.write_index >= ring.cardinality {
            return Err(OracleError::CorruptLog(format!(
                "write index {} outside cardinality {}",
                ring.write_index, ring.cardinality
            )));
        }
        if ring.cardinality_next < ring.cardinality || ring.cardinality_next > MAX_CARDINALITY {
            return Err(OracleError::CorruptLog(format!(
                "cardinality_next {} outside [{}, {MAX_CARDINALITY}]",
                ring.cardinality_next, ring.cardinality
            )));
        }
        if observations.len() != usize::from(ring.cardinality) {
            return Err(OracleError::CorruptLog(format!(
                "expected {} observations, got {}",
                ring.cardinality,
                observations.len()
            )));
        }
        if observations.iter().any(|o| !o.initialized) {
            return Err(OracleError::CorruptLog(
                "uninitialized slot below cardinality".to_string(),
            ));
        }

        let mut log = Self::new();
        log.ensure_page(ring.cardinality - 1);
        for (index, obs) in (0u16..).zip(observations) {
            *log.slot_mut(index) = *obs;
        }
        log.state = ring;

        // Timestamps must increase from the oldest slot to the newest.
        let newest = log.slot(ring.write_index).timestamp;
        let mut previous: Option<u32> = None;
        for offset in 1..=ring.cardinality {
            let index = (ring.write_index + offset) % ring.cardinality;
            let ts = log.slot(index).timestamp;
            if let Some(prev) = previous {
                if ts == prev || !lte(newest, prev, ts) {
                    return Err(OracleError::CorruptLog(format!(
                        "timestamps not increasing at slot {index}"
                    )));
                }
            }
            previous = Some(ts);
        }

        Ok(log)
    }

    /// Current ring metadata.
    pub fn state(&self) -> RingState {
        self.state
    }

    /// Whether the log has been seeded.
    pub fn is_initialized(&self) -> bool {
        self.state.cardinality > 0
    }

    /// The newest observation.
    pub fn latest(&self) -> Result<&Observation> {
        if !self.is_initialized() {
            return Err(OracleError::CardinalityExhausted);
        }
        Ok(self.slot(self.state.write_index))
    }

    /// The oldest retained observation.
    pub fn oldest(&self) -> Result<&Observation> {
        if !self.is_initialized() {
            return Err(OracleError::CardinalityExhausted);
        }
        let next = (self.state.write_index + 1) % self.state.cardinality;
        let candidate = self.slot(next);
        if candidate.initialized {
            Ok(candidate)
        } else {
            Ok(self.slot(0))
        }
    }

    /// Slots `0..cardinality` in index order.
    pub fn observations(&self) -> impl Iterator<Item = &Observation> + '_ {
        (0..self.state.cardinality).map(move |i| self.slot(i))
    }

    /// Record `tick` at `timestamp`, accumulating the previous tick and
    /// `liquidity` over the elapsed interval.
    ///
    /// A write in the same second as the newest observation replaces that
    /// slot's tick without touching the cumulatives.
    ///
    /// # Errors
    ///
    /// - [`OracleError::CardinalityExhausted`] if the log was never initialized
    pub fn append(&mut self, timestamp: u32, tick: i32, liquidity: u128) -> Result<Appended> {
        let last = *self.latest()?;
        let RingState {
            write_index,
            cardinality,
            cardinality_next,
        } = self.state;

        if last.timestamp == timestamp {
            self.slot_mut(write_index).tick = tick;
            return Ok(Appended {
                index: write_index,
                merged: true,
                grew: false,
            });
        }

        let grew = write_index + 1 == cardinality && cardinality < cardinality_next;
        let cardinality = if grew {
            self.ensure_page(cardinality);
            cardinality + 1
        } else {
            cardinality
        };

        let index = (write_index + 1) % cardinality;
        *self.slot_mut(index) = last.transform(timestamp, tick, liquidity);
        self.state.write_index = index;
        self.state.cardinality = cardinality;

        Ok(Appended {
            index,
            merged: false,
            grew,
        })
    }

    /// Raise the capacity the ring will grow into, up to [`MAX_CARDINALITY`].
    ///
    /// Returns the resulting `cardinality_next`. Never shrinks.
    ///
    /// # Errors
    ///
    /// - [`OracleError::CardinalityExhausted`] if the log was never initialized
    pub fn grow(&mut self, cardinality_next: u16) -> Result<u16> {
        if !self.is_initialized() {
            return Err(OracleError::CardinalityExhausted);
        }
        let target = cardinality_next.min(MAX_CARDINALITY);
        if target > self.state.cardinality_next {
            self.state.cardinality_next = target;
        }
        Ok(self.state.cardinality_next)
    }

    /// Cumulative values `seconds_ago` seconds before `now`.
    ///
    /// Exact at stored observations, linearly interpolated between them, and
    /// extrapolated from the newest observation (its tick and the given
    /// `liquidity`) when the target is at or after it.
    ///
    /// # Errors
    ///
    /// - [`OracleError::TargetPredatesOldestObservation`] if the target is
    ///   older than the oldest retained observation
    /// - [`OracleError::CardinalityExhausted`] if the log was never initialized
    pub fn observe_single(&self, now: u32, seconds_ago: u32, liquidity: u128) -> Result<Cumulatives> {
        if seconds_ago == 0 {
            let last = self.latest()?;
            if last.timestamp == now {
                return Ok(last.cumulatives());
            }
            return Ok(last.transform(now, last.tick, liquidity).cumulatives());
        }

        let target = now.wrapping_sub(seconds_ago);
        let (before, after) = self.surrounding(now, target, liquidity)?;

        if target == before.timestamp {
            return Ok(before.cumulatives());
        }
        if target == after.timestamp {
            return Ok(after.cumulatives());
        }

        let span = after.timestamp.wrapping_sub(before.timestamp);
        let into = target.wrapping_sub(before.timestamp);

        let tick_delta = tick_cumulative_delta(after.tick_cumulative, before.tick_cumulative);
        let tick_step = i128::from(tick_delta) * i128::from(into) / i128::from(span);
        // |tick_step| <= |tick_delta| < 2^55, so the narrowing is lossless.
        let tick_cumulative =
            wrap_tick_cumulative(before.tick_cumulative.wrapping_add(tick_step as i64));

        let spl_delta = liquidity_cumulative_delta(
            after.seconds_per_liquidity_x128,
            before.seconds_per_liquidity_x128,
        );
        let spl_step = spl_delta * crate::U256::from(into) / crate::U256::from(span);
        let seconds_per_liquidity_x128 = (before.seconds_per_liquidity_x128 + spl_step)
            & crate::observation::liquidity_mask();

        Ok(Cumulatives {
            tick_cumulative,
            seconds_per_liquidity_x128,
        })
    }

    /// [`observe_single`](Self::observe_single) for each entry of `seconds_agos`.
    pub fn observe(&self, now: u32, seconds_agos: &[u32], liquidity: u128) -> Result<Vec<Cumulatives>> {
        seconds_agos
            .iter()
            .map(|&ago| self.observe_single(now, ago, liquidity))
            .collect()
    }

    /// Observations at-or-before and at-or-after `target`.
    fn surrounding(&self, now: u32, target: u32, liquidity: u128) -> Result<(Observation, Observation)> {
        let newest = *self.latest()?;
        if lte(now, newest.timestamp, target) {
            if newest.timestamp == target {
                return Ok((newest, newest));
            }
            return Ok((newest, newest.transform(target, newest.tick, liquidity)));
        }

        let oldest = *self.oldest()?;
        if !lte(now, oldest.timestamp, target) {
            return Err(OracleError::TargetPredatesOldestObservation {
                target,
                oldest: oldest.timestamp,
            });
        }

        self.binary_search(now, target)
    }

    /// Binary search over the unrolled ring `[oldest, newest]`.
    ///
    /// Caller guarantees `oldest <= target < newest`.
    fn binary_search(&self, now: u32, target: u32) -> Result<(Observation, Observation)> {
        let cardinality = usize::from(self.state.cardinality);
        let mut lo = (usize::from(self.state.write_index) + 1) % cardinality;
        let mut hi = lo + cardinality - 1;

        while lo <= hi {
            let mid = (lo + hi) / 2;
            let before = *self.slot((mid % cardinality) as u16);
            if !before.initialized {
                lo = mid + 1;
                continue;
            }
            let after = *self.slot(((mid + 1) % cardinality) as u16);

            let target_at_or_after = lte(now, before.timestamp, target);
            if target_at_or_after && lte(now, target, after.timestamp) {
                return Ok((before, after));
            }
            if target_at_or_after {
                lo = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                hi = mid - 1;
            }
        }

        Err(OracleError::CorruptLog(format!(
            "no observations bracket timestamp {target}"
        )))
    }

    fn ensure_page(&mut self, index: u16) {
        let needed = usize::from(index) / OBSERVATION_PAGE_SIZE + 1;
        while self.pages.len() < needed {
            self.pages
                .push(Box::new([Observation::default(); OBSERVATION_PAGE_SIZE]));
        }
    }

    fn slot(&self, index: u16) -> &Observation {
        let index = usize::from(index);
        &self.pages[index / OBSERVATION_PAGE_SIZE][index % OBSERVATION_PAGE_SIZE]
    }

    fn slot_mut(&mut self, index: u16) -> &mut Observation {
        let index = usize::from(index);
        &mut self.pages[index / OBSERVATION_PAGE_SIZE][index % OBSERVATION_PAGE_SIZE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::U256;

    const LIQ: u128 = 1_000_000_000_000_000_000;

    fn seeded(timestamp: u32, tick: i32) -> ObservationLog {
        let mut log = ObservationLog::new();
        log.initialize(timestamp, tick);
        log
    }

    #[test]
    fn test_initialize() {
        let log = seeded(5, 3);
        let state = log.state();
        assert_eq!(state.cardinality, 1);
        assert_eq!(state.cardinality_next, 1);
        assert_eq!(state.write_index, 0);
        let latest = log.latest().expect("latest");
        assert_eq!(latest.timestamp, 5);
        assert_eq!(latest.tick, 3);
    }

    #[test]
    fn test_append_before_initialize_fails() {
        let mut log = ObservationLog::new();
        let err = log.append(1, 0, LIQ).expect_err("uninitialized");
        assert!(matches!(err, OracleError::CardinalityExhausted));
        assert!(matches!(
            log.grow(10),
            Err(OracleError::CardinalityExhausted)
        ));
    }

    #[test]
    fn test_single_slot_overwrites() {
        let mut log = seeded(0, 0);
        log.append(1, 5, LIQ).expect("append");
        log.append(2, 10, LIQ).expect("append");
        let state = log.state();
        assert_eq!(state.cardinality, 1);
        assert_eq!(state.write_index, 0);
        let latest = log.latest().expect("latest");
        assert_eq!(latest.timestamp, 2);
        assert_eq!(latest.tick_cumulative, 5);
    }

    #[test]
    fn test_same_second_merges() {
        let mut log = seeded(0, 0);
        log.grow(4).expect("grow");
        log.append(1, 5, LIQ).expect("append");
        let merged = log.append(1, 8, LIQ).expect("merge");
        assert!(merged.merged);
        assert_eq!(log.state().cardinality, 2);
        let latest = log.latest().expect("latest");
        assert_eq!(latest.tick, 8);
        assert_eq!(latest.tick_cumulative, 0);

        log.append(3, 8, LIQ).expect("append");
        // The merged tick (8) is what accumulates afterwards.
        assert_eq!(log.latest().expect("latest").tick_cumulative, 16);
    }

    #[test]
    fn test_lazy_growth_one_slot_per_append() {
        let mut log = seeded(0, 0);
        assert_eq!(log.grow(3).expect("grow"), 3);
        assert_eq!(log.state().cardinality, 1);

        let first = log.append(1, 1, LIQ).expect("append");
        assert!(first.grew);
        assert_eq!(log.state().cardinality, 2);
        log.append(2, 1, LIQ).expect("append");
        assert_eq!(log.state().cardinality, 3);

        let wrapped = log.append(3, 1, LIQ).expect("append");
        assert!(!wrapped.grew);
        assert_eq!(wrapped.index, 0);
        assert_eq!(log.state().cardinality, 3);
    }

    #[test]
    fn test_grow_is_monotonic_and_capped() {
        let mut log = seeded(0, 0);
        assert_eq!(log.grow(10).expect("grow"), 10);
        assert_eq!(log.grow(5).expect("grow"), 10);
        assert_eq!(log.grow(u16::MAX).expect("grow"), MAX_CARDINALITY);
    }

    #[test]
    fn test_growth_crosses_page_boundary() {
        let mut log = seeded(0, 0);
        log.grow(MAX_CARDINALITY).expect("grow");
        for t in 1..=600u32 {
            log.append(t, 1, LIQ).expect("append");
        }
        let state = log.state();
        assert_eq!(state.cardinality, 601);
        assert_eq!(state.write_index, 600);
        assert_eq!(log.latest().expect("latest").timestamp, 600);
        assert_eq!(log.pages.len(), 2);
    }

    #[test]
    fn test_observe_predates_single_observation() {
        let log = seeded(100, 0);
        let err = log.observe_single(100, 1, LIQ).expect_err("too old");
        assert!(matches!(
            err,
            OracleError::TargetPredatesOldestObservation { target: 99, oldest: 100 }
        ));
    }

    #[test]
    fn test_observe_now_extrapolates() {
        let log = seeded(0, 4);
        let c = log.observe_single(10, 0, 1).expect("observe");
        assert_eq!(c.tick_cumulative, 40);
        assert_eq!(c.seconds_per_liquidity_x128, U256::from(10u32) << 128usize);

        // A target after the newest observation also extrapolates.
        let c = log.observe_single(10, 4, 1).expect("observe");
        assert_eq!(c.tick_cumulative, 24);
    }

    #[test]
    fn test_observe_exact_at_knots() {
        let mut log = seeded(0, 0);
        log.grow(8).expect("grow");
        log.append(10, 5, LIQ).expect("append");
        log.append(20, -3, LIQ).expect("append");
        log.append(30, 2, LIQ).expect("append");

        for obs in log.observations() {
            let ago = 40 - obs.timestamp;
            let c = log.observe_single(40, ago, LIQ).expect("observe");
            assert_eq!(c, obs.cumulatives());
        }
    }

    #[test]
    fn test_observe_interpolates() {
        let mut log = seeded(0, 0);
        log.grow(4).expect("grow");
        log.append(10, 5, LIQ).expect("append");
        log.append(20, 5, LIQ).expect("append");
        // Between t=10 (cum 0) and t=20 (cum 50): tick 5 held throughout.
        let c = log.observe_single(20, 6, LIQ).expect("observe");
        assert_eq!(c.tick_cumulative, 20);
    }

    #[test]
    fn test_observe_after_ring_wraps() {
        let mut log = seeded(0, 0);
        log.grow(3).expect("grow");
        for t in 1..=10u32 {
            log.append(t * 10, 1, LIQ).expect("append");
        }
        // Retained: t = 80, 90, 100.
        assert_eq!(log.oldest().expect("oldest").timestamp, 80);
        log.observe_single(100, 20, LIQ).expect("at oldest");
        log.observe_single(100, 15, LIQ).expect("inside");
        let err = log.observe_single(100, 21, LIQ).expect_err("before oldest");
        assert!(matches!(
            err,
            OracleError::TargetPredatesOldestObservation { .. }
        ));
    }

    #[test]
    fn test_observe_across_timestamp_wrap() {
        let start = u32::MAX - 15;
        let mut log = seeded(start, 2);
        log.grow(4).expect("grow");
        log.append(start.wrapping_add(10), 2, LIQ).expect("append");
        log.append(start.wrapping_add(20), 2, LIQ).expect("append");
        let now = start.wrapping_add(20);
        let c = log.observe_single(now, 15, LIQ).expect("observe");
        assert_eq!(c.tick_cumulative, 10);
    }

    #[test]
    fn test_observe_many() {
        let mut log = seeded(0, 1);
        log.grow(2).expect("grow");
        log.append(10, 1, LIQ).expect("append");
        let out = log.observe(10, &[10, 5, 0], LIQ).expect("observe");
        let ticks: Vec<i64> = out.iter().map(|c| c.tick_cumulative).collect();
        assert_eq!(ticks, vec![0, 5, 10]);
    }

    #[test]
    fn test_lte_wraps() {
        assert!(lte(10, 5, 8));
        assert!(!lte(10, 8, 5));
        // 4_000_000_000 is from the previous cycle, so it precedes 5.
        assert!(lte(10, 4_000_000_000, 5));
        assert!(!lte(10, 5, 4_000_000_000));
    }

    #[test]
    fn test_from_parts_roundtrip() {
        let mut log = seeded(0, 0);
        log.grow(3).expect("grow");
        for t in 1..=5u32 {
            log.append(t, t as i32, LIQ).expect("append");
        }
        let slots: Vec<Observation> = log.observations().copied().collect();
        let rebuilt = ObservationLog::from_parts(log.state(), &slots).expect("rebuild");
        assert_eq!(rebuilt.state(), log.state());
        assert_eq!(rebuilt.latest().expect("latest"), log.latest().expect("latest"));
    }

    #[test]
    fn test_from_parts_rejects_bad_ring() {
        let slots = [Observation::seed(1, 0)];
        let bad_index = RingState {
            write_index: 1,
            cardinality: 1,
            cardinality_next: 1,
        };
        assert!(matches!(
            ObservationLog::from_parts(bad_index, &slots),
            Err(OracleError::CorruptLog(_))
        ));

        let two = [Observation::seed(5, 0), Observation::seed(5, 0)];
        let ring = RingState {
            write_index: 1,
            cardinality: 2,
            cardinality_next: 2,
        };
        assert!(matches!(
            ObservationLog::from_parts(ring, &two),
            Err(OracleError::CorruptLog(_))
        ));
    }
}
