//! Cached truncation policy queries.

use rusqlite::{params, Connection};
use truncgeo_types::{PoolId, TruncationPolicy};

use crate::{not_found, Result};

/// Store the cached policy for a pool.
pub fn save(conn: &Connection, pool: &PoolId, policy: &TruncationPolicy) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO policies
            (pool_id, min_cap, max_cap, default_cap, step_ppm, budget_ppm,
             decay_window_secs, update_interval_secs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            pool.as_bytes().as_slice(),
            policy.min_cap,
            policy.max_cap,
            policy.default_cap,
            policy.step_ppm,
            policy.budget_ppm,
            policy.decay_window_secs,
            policy.update_interval_secs,
        ],
    )?;
    Ok(())
}

/// Load the cached policy for a pool.
pub fn load(conn: &Connection, pool: &PoolId) -> Result<TruncationPolicy> {
    conn.query_row(
        "SELECT min_cap, max_cap, default_cap, step_ppm, budget_ppm,
                decay_window_secs, update_interval_secs
         FROM policies WHERE pool_id = ?1",
        [pool.as_bytes().as_slice()],
        |row| {
            Ok(TruncationPolicy {
                min_cap: row.get(0)?,
                max_cap: row.get(1)?,
                default_cap: row.get(2)?,
                step_ppm: row.get(3)?,
                budget_ppm: row.get(4)?,
                decay_window_secs: row.get(5)?,
                update_interval_secs: row.get(6)?,
            })
        },
    )
    .map_err(not_found(|| format!("policy for pool {pool}")))
}
