//! Cap controller state queries.

use rusqlite::{params, Connection};
use truncgeo_types::{CapState, PoolId};

use crate::{not_found, Result};

/// Store the controller state for a pool.
pub fn save(conn: &Connection, pool: &PoolId, cap: &CapState) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO cap_state
            (pool_id, current_cap, last_retune, auto_tune_paused,
             cap_frequency_ppm, last_frequency_update)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            pool.as_bytes().as_slice(),
            cap.current_cap,
            cap.last_retune,
            cap.auto_tune_paused,
            cap.cap_frequency_ppm,
            cap.last_frequency_update,
        ],
    )?;
    Ok(())
}

/// Load the controller state for a pool.
pub fn load(conn: &Connection, pool: &PoolId) -> Result<CapState> {
    conn.query_row(
        "SELECT current_cap, last_retune, auto_tune_paused,
                cap_frequency_ppm, last_frequency_update
         FROM cap_state WHERE pool_id = ?1",
        [pool.as_bytes().as_slice()],
        |row| {
            Ok(CapState {
                current_cap: row.get(0)?,
                last_retune: row.get(1)?,
                auto_tune_paused: row.get(2)?,
                cap_frequency_ppm: row.get(3)?,
                last_frequency_update: row.get(4)?,
            })
        },
    )
    .map_err(not_found(|| format!("cap state for pool {pool}")))
}
