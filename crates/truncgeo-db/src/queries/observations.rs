//! Ring metadata and observation slot queries.

use rusqlite::{params, Connection};
use truncgeo_oracle::layout::{decode_observation, decode_ring, encode_observation, encode_ring};
use truncgeo_oracle::{Observation, RingState};
use truncgeo_types::PoolId;

use crate::{not_found, DbError, Result};

/// Store the ring record for a pool.
pub fn save_ring(conn: &Connection, pool: &PoolId, ring: &RingState) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ring_state (pool_id, record) VALUES (?1, ?2)",
        params![pool.as_bytes().as_slice(), encode_ring(ring).as_slice()],
    )?;
    Ok(())
}

/// Load the ring record for a pool.
pub fn load_ring(conn: &Connection, pool: &PoolId) -> Result<RingState> {
    let record: Vec<u8> = conn
        .query_row(
            "SELECT record FROM ring_state WHERE pool_id = ?1",
            [pool.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .map_err(not_found(|| format!("ring state for pool {pool}")))?;
    Ok(decode_ring(&record)?)
}

/// Store one slot.
pub fn save(conn: &Connection, pool: &PoolId, slot: u16, obs: &Observation) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO observations (pool_id, slot, record) VALUES (?1, ?2, ?3)",
        params![
            pool.as_bytes().as_slice(),
            slot,
            encode_observation(obs).as_slice()
        ],
    )?;
    Ok(())
}

/// Replace every stored slot of a pool with `observations`, in index order.
pub fn replace_all(conn: &Connection, pool: &PoolId, observations: &[Observation]) -> Result<()> {
    conn.execute(
        "DELETE FROM observations WHERE pool_id = ?1",
        [pool.as_bytes().as_slice()],
    )?;
    for (slot, obs) in (0u16..).zip(observations) {
        save(conn, pool, slot, obs)?;
    }
    Ok(())
}

/// Load all stored slots of a pool in index order.
///
/// Fails if the stored slots are not contiguous from zero.
pub fn load_all(conn: &Connection, pool: &PoolId) -> Result<Vec<Observation>> {
    let mut stmt = conn
        .prepare("SELECT slot, record FROM observations WHERE pool_id = ?1 ORDER BY slot")?;
    let rows = stmt.query_map([pool.as_bytes().as_slice()], |row| {
        Ok((row.get::<_, u16>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (slot, record) = row?;
        if usize::from(slot) != out.len() {
            return Err(DbError::Serialization(format!(
                "pool {pool}: missing slot {}",
                out.len()
            )));
        }
        out.push(decode_observation(&record)?);
    }
    Ok(out)
}
