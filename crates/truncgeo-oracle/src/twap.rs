//! Time-weighted averages from cumulative samples.
//!
//! Given the cumulatives at `now - window` and `now`:
//!
//! ```text
//! mean_tick                = floor(Δtick_cumulative / window)
//! harmonic_mean_liquidity  = (window << 128) / Δseconds_per_liquidity_x128
//! ```
//!
//! The tick mean rounds toward negative infinity so a negative average never
//! reads one tick high. The liquidity mean is computed in 256 bits and
//! saturates at `u128::MAX`.

use primitive_types::U256;

use crate::observation::{liquidity_cumulative_delta, tick_cumulative_delta, Cumulatives};
use crate::ring::ObservationLog;
use crate::{OracleError, Result};

/// Averages over one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Consultation {
    /// Arithmetic-mean tick, rounded toward negative infinity.
    pub mean_tick: i32,
    /// Harmonic-mean liquidity.
    pub harmonic_mean_liquidity: u128,
}

/// Arithmetic-mean tick between two samples `window` seconds apart.
///
/// # Errors
///
/// - [`OracleError::ZeroWindow`] if `window` is zero
///
/// # Examples
///
/// ```
/// use truncgeo_oracle::twap::arithmetic_mean_tick;
///
/// // Cumulative fell by 7 over 2 seconds: -3.5 rounds down to -4.
/// assert_eq!(arithmetic_mean_tick(0, -7, 2).ok(), Some(-4));
/// ```
pub fn arithmetic_mean_tick(start: i64, end: i64, window: u32) -> Result<i32> {
    if window == 0 {
        return Err(OracleError::ZeroWindow);
    }
    let delta = tick_cumulative_delta(end, start);
    let mean = delta.div_euclid(i64::from(window));
    i32::try_from(mean)
        .map_err(|_| OracleError::CorruptLog(format!("mean tick {mean} out of range")))
}

/// Harmonic-mean liquidity between two samples `window` seconds apart.
///
/// # Errors
///
/// - [`OracleError::ZeroWindow`] if `window` is zero
pub fn harmonic_mean_liquidity(start: U256, end: U256, window: u32) -> Result<u128> {
    if window == 0 {
        return Err(OracleError::ZeroWindow);
    }
    let delta = liquidity_cumulative_delta(end, start);
    if delta.is_zero() {
        return Ok(u128::MAX);
    }
    let mean = (U256::from(window) << 128usize) / delta;
    if mean.bits() > 128 {
        Ok(u128::MAX)
    } else {
        Ok(mean.low_u128())
    }
}

/// Both averages from a pair of samples.
pub fn from_cumulatives(start: &Cumulatives, end: &Cumulatives, window: u32) -> Result<Consultation> {
    Ok(Consultation {
        mean_tick: arithmetic_mean_tick(start.tick_cumulative, end.tick_cumulative, window)?,
        harmonic_mean_liquidity: harmonic_mean_liquidity(
            start.seconds_per_liquidity_x128,
            end.seconds_per_liquidity_x128,
            window,
        )?,
    })
}

/// Averages over the `window` seconds ending at `now`.
///
/// # Errors
///
/// - [`OracleError::ZeroWindow`] if `window` is zero
/// - [`OracleError::TargetPredatesOldestObservation`] if the window reaches
///   past retained history
pub fn consult(log: &ObservationLog, now: u32, window: u32, liquidity: u128) -> Result<Consultation> {
    if window == 0 {
        return Err(OracleError::ZeroWindow);
    }
    let samples = log.observe(now, &[window, 0], liquidity)?;
    match samples.as_slice() {
        [start, end] => from_cumulatives(start, end, window),
        _ => Err(OracleError::CorruptLog("expected two samples".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_tick_rounds_down() {
        assert_eq!(arithmetic_mean_tick(0, 7, 2).expect("mean"), 3);
        assert_eq!(arithmetic_mean_tick(0, -7, 2).expect("mean"), -4);
        assert_eq!(arithmetic_mean_tick(0, -8, 2).expect("mean"), -4);
    }

    #[test]
    fn test_zero_window() {
        assert!(matches!(
            arithmetic_mean_tick(0, 0, 0),
            Err(OracleError::ZeroWindow)
        ));
        assert!(matches!(
            harmonic_mean_liquidity(U256::zero(), U256::one(), 0),
            Err(OracleError::ZeroWindow)
        ));
        let log = ObservationLog::new();
        assert!(matches!(
            consult(&log, 10, 0, 1),
            Err(OracleError::ZeroWindow)
        ));
    }

    #[test]
    fn test_harmonic_mean_of_constant_liquidity() {
        let liquidity = 5_000u128;
        let mut log = ObservationLog::new();
        log.initialize(0, 0);
        log.grow(4).expect("grow");
        log.append(100, 0, liquidity).expect("append");
        let c = consult(&log, 100, 100, liquidity).expect("consult");
        // Floor division in the accumulator can lose at most one unit.
        assert!(c.harmonic_mean_liquidity >= liquidity);
        assert!(c.harmonic_mean_liquidity <= liquidity + 1);
    }

    #[test]
    fn test_harmonic_mean_weights_low_liquidity() {
        let mut log = ObservationLog::new();
        log.initialize(0, 0);
        log.grow(4).expect("grow");
        log.append(10, 0, 100).expect("append");
        log.append(20, 0, 10_000).expect("append");
        let c = consult(&log, 20, 20, 10_000).expect("consult");
        // 2 / (1/100 + 1/10000) ~= 198.
        assert!((197..=199).contains(&c.harmonic_mean_liquidity));
    }

    #[test]
    fn test_consult_mean_tick() {
        let mut log = ObservationLog::new();
        log.initialize(0, -10);
        log.grow(4).expect("grow");
        log.append(10, 20, 1).expect("append");
        // -10 for 10 s, then 20 for 10 s.
        let c = consult(&log, 20, 20, 1).expect("consult");
        assert_eq!(c.mean_tick, 5);
    }

    #[test]
    fn test_consult_beyond_history() {
        let mut log = ObservationLog::new();
        log.initialize(100, 0);
        let err = consult(&log, 110, 20, 1).expect_err("too far back");
        assert!(matches!(
            err,
            OracleError::TargetPredatesOldestObservation { .. }
        ));
    }
}
