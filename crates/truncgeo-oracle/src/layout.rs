//! Fixed-width big-endian record codec for the persisted log.
//!
//! ## Observation record (35 bytes)
//!
//! ```text
//! offset  width  field
//!      0      4  timestamp                   u32
//!      4      3  tick                        i24 (two's complement)
//!      7      7  tick_cumulative             i56 (two's complement)
//!     14     20  seconds_per_liquidity_x128  u160
//!     34      1  initialized                 0x00 | 0x01
//! ```
//!
//! ## Ring record (6 bytes)
//!
//! ```text
//! write_index u16 | cardinality u16 | cardinality_next u16
//! ```

use primitive_types::U256;

use crate::observation::{liquidity_mask, wrap_tick_cumulative, Observation};
use crate::ring::RingState;
use crate::{OracleError, Result};

/// Encoded length of one observation.
pub const OBSERVATION_RECORD_LEN: usize = 35;

/// Encoded length of the ring metadata.
pub const RING_RECORD_LEN: usize = 6;

const TICK_LEN: usize = 3;
const TICK_CUMULATIVE_LEN: usize = 7;
const LIQUIDITY_LEN: usize = 20;

/// Encode one observation.
///
/// Fields wider than their stored width are truncated to it; callers keep
/// ticks inside the valid range and cumulatives wrapped.
pub fn encode_observation(obs: &Observation) -> [u8; OBSERVATION_RECORD_LEN] {
    let mut out = [0u8; OBSERVATION_RECORD_LEN];
    out[0..4].copy_from_slice(&obs.timestamp.to_be_bytes());
    out[4..7].copy_from_slice(&obs.tick.to_be_bytes()[4 - TICK_LEN..]);
    out[7..14].copy_from_slice(&obs.tick_cumulative.to_be_bytes()[8 - TICK_CUMULATIVE_LEN..]);

    let mut wide = [0u8; 32];
    (obs.seconds_per_liquidity_x128 & liquidity_mask()).to_big_endian(&mut wide);
    out[14..34].copy_from_slice(&wide[32 - LIQUIDITY_LEN..]);

    out[34] = u8::from(obs.initialized);
    out
}

/// Decode one observation.
///
/// # Errors
///
/// - [`OracleError::Layout`] on a wrong length or an initialized flag other
///   than 0 or 1
pub fn decode_observation(bytes: &[u8]) -> Result<Observation> {
    if bytes.len() != OBSERVATION_RECORD_LEN {
        return Err(OracleError::Layout(format!(
            "observation record must be {OBSERVATION_RECORD_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut ts = [0u8; 4];
    ts.copy_from_slice(&bytes[0..4]);
    let timestamp = u32::from_be_bytes(ts);

    let mut tick_bytes = [0u8; 4];
    tick_bytes[1..].copy_from_slice(&bytes[4..7]);
    // Sign-extend from 24 bits.
    let tick = i32::from_be_bytes(tick_bytes) << 8 >> 8;

    let mut cum_bytes = [0u8; 8];
    cum_bytes[1..].copy_from_slice(&bytes[7..14]);
    let tick_cumulative = wrap_tick_cumulative(i64::from_be_bytes(cum_bytes));

    let seconds_per_liquidity_x128 = U256::from_big_endian(&bytes[14..34]);

    let initialized = match bytes[34] {
        0 => false,
        1 => true,
        other => {
            return Err(OracleError::Layout(format!(
                "initialized flag must be 0 or 1, got {other}"
            )))
        }
    };

    Ok(Observation {
        timestamp,
        tick,
        tick_cumulative,
        seconds_per_liquidity_x128,
        initialized,
    })
}

/// Encode ring metadata.
pub fn encode_ring(ring: &RingState) -> [u8; RING_RECORD_LEN] {
    let mut out = [0u8; RING_RECORD_LEN];
    out[0..2].copy_from_slice(&ring.write_index.to_be_bytes());
    out[2..4].copy_from_slice(&ring.cardinality.to_be_bytes());
    out[4..6].copy_from_slice(&ring.cardinality_next.to_be_bytes());
    out
}

/// Decode ring metadata.
///
/// Only the width is checked here; ring invariants are enforced by
/// [`ObservationLog::from_parts`](crate::ring::ObservationLog::from_parts).
pub fn decode_ring(bytes: &[u8]) -> Result<RingState> {
    if bytes.len() != RING_RECORD_LEN {
        return Err(OracleError::Layout(format!(
            "ring record must be {RING_RECORD_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let field = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
    Ok(RingState {
        write_index: field(0),
        cardinality: field(2),
        cardinality_next: field(4),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use truncgeo_types::{MAX_TICK, MIN_TICK};

    #[test]
    fn test_observation_field_offsets() {
        let obs = Observation {
            timestamp: 0x0102_0304,
            tick: -2,
            tick_cumulative: 0x10,
            seconds_per_liquidity_x128: U256::from(0xABu32),
            initialized: true,
        };
        let bytes = encode_observation(&obs);
        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..7], &[0xFF, 0xFF, 0xFE]);
        assert_eq!(&bytes[7..14], &[0, 0, 0, 0, 0, 0, 0x10]);
        assert_eq!(bytes[33], 0xAB);
        assert_eq!(bytes[34], 1);
    }

    #[test]
    fn test_observation_extremes_decode() {
        let obs = Observation {
            timestamp: u32::MAX,
            tick: MIN_TICK,
            tick_cumulative: -(1i64 << 55),
            seconds_per_liquidity_x128: liquidity_mask(),
            initialized: true,
        };
        let decoded = decode_observation(&encode_observation(&obs)).expect("decode");
        assert_eq!(decoded, obs);

        let high = Observation { tick: MAX_TICK, tick_cumulative: (1i64 << 55) - 1, ..obs };
        assert_eq!(decode_observation(&encode_observation(&high)).expect("decode"), high);
    }

    #[test]
    fn test_uninitialized_slot_encodes_zero() {
        let bytes = encode_observation(&Observation::default());
        assert_eq!(bytes, [0u8; OBSERVATION_RECORD_LEN]);
        let decoded = decode_observation(&bytes).expect("decode");
        assert!(!decoded.initialized);
    }

    #[test]
    fn test_observation_rejects_bad_input() {
        let err = decode_observation(&[0u8; 34]).expect_err("short");
        assert!(matches!(err, OracleError::Layout(_)));

        let mut bytes = encode_observation(&Observation::seed(1, 1));
        bytes[34] = 2;
        let err = decode_observation(&bytes).expect_err("bad flag");
        assert!(matches!(err, OracleError::Layout(_)));
    }

    #[test]
    fn test_ring_record() {
        let ring = RingState {
            write_index: 0x0102,
            cardinality: 0x0304,
            cardinality_next: 0x0400,
        };
        let bytes = encode_ring(&ring);
        assert_eq!(bytes, [1, 2, 3, 4, 4, 0]);
        assert_eq!(decode_ring(&bytes).expect("decode"), ring);
        assert!(matches!(decode_ring(&bytes[..5]), Err(OracleError::Layout(_))));
    }
}
