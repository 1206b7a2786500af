//! Pool rows and whole-pool snapshot persistence.

use rusqlite::{params, Connection};
use truncgeo_oracle::PoolSnapshot;
use truncgeo_types::{PoolId, WriterId};

use crate::queries::{caps, observations, policies};
use crate::{not_found, DbError, Result};

/// Write-path bookkeeping stored per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRow {
    pub pool: PoolId,
    pub writer: WriterId,
    pub last_write_at: u64,
    pub liquidity: u128,
}

pub(crate) fn decode_pool_id(bytes: &[u8]) -> Result<PoolId> {
    PoolId::try_from_slice(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode_liquidity(bytes: &[u8]) -> Result<u128> {
    let arr: [u8; 16] = bytes.try_into().map_err(|_| {
        DbError::Serialization(format!("liquidity must be 16 bytes, got {}", bytes.len()))
    })?;
    Ok(u128::from_be_bytes(arr))
}

/// Insert or update a pool row.
pub fn upsert(conn: &Connection, row: &PoolRow) -> Result<()> {
    conn.execute(
        "INSERT INTO pools (pool_id, writer_id, last_write_at, liquidity, updated_at)
         VALUES (?1, ?2, ?3, ?4, CAST(strftime('%s', 'now') AS INTEGER))
         ON CONFLICT(pool_id) DO UPDATE SET
            writer_id = excluded.writer_id,
            last_write_at = excluded.last_write_at,
            liquidity = excluded.liquidity,
            updated_at = excluded.updated_at",
        params![
            row.pool.as_bytes().as_slice(),
            row.writer.as_bytes().as_slice(),
            row.last_write_at,
            row.liquidity.to_be_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

/// Get a pool row.
pub fn get(conn: &Connection, pool: &PoolId) -> Result<PoolRow> {
    let (writer, last_write_at, liquidity): (Vec<u8>, u64, Vec<u8>) = conn
        .query_row(
            "SELECT writer_id, last_write_at, liquidity FROM pools WHERE pool_id = ?1",
            [pool.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(not_found(|| format!("pool {pool}")))?;

    Ok(PoolRow {
        pool: *pool,
        writer: WriterId::try_from_slice(&writer)
            .map_err(|e| DbError::Serialization(e.to_string()))?,
        last_write_at,
        liquidity: decode_liquidity(&liquidity)?,
    })
}

/// All saved pools, in identifier order.
pub fn list(conn: &Connection) -> Result<Vec<PoolId>> {
    let mut stmt = conn.prepare("SELECT pool_id FROM pools ORDER BY pool_id")?;
    let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
    let mut pools = Vec::new();
    for row in rows {
        pools.push(decode_pool_id(&row?)?);
    }
    Ok(pools)
}

/// Delete a pool and, by cascade, all of its state.
pub fn delete(conn: &Connection, pool: &PoolId) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM pools WHERE pool_id = ?1",
        [pool.as_bytes().as_slice()],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(format!("pool {pool}")));
    }
    Ok(())
}

/// Persist a full pool snapshot in one transaction.
pub fn save_snapshot(conn: &Connection, snapshot: &PoolSnapshot) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    upsert(
        &tx,
        &PoolRow {
            pool: snapshot.pool,
            writer: snapshot.writer,
            last_write_at: snapshot.last_write_at,
            liquidity: snapshot.liquidity,
        },
    )?;
    observations::save_ring(&tx, &snapshot.pool, &snapshot.ring)?;
    observations::replace_all(&tx, &snapshot.pool, &snapshot.observations)?;
    policies::save(&tx, &snapshot.pool, &snapshot.policy)?;
    caps::save(&tx, &snapshot.pool, &snapshot.cap)?;
    tx.commit()?;

    tracing::debug!(
        pool = %snapshot.pool,
        slots = snapshot.observations.len(),
        "pool snapshot saved"
    );
    Ok(())
}

/// Load a full pool snapshot.
///
/// The snapshot is returned as stored; ring and cap invariants are checked
/// when it is restored into a service.
pub fn load_snapshot(conn: &Connection, pool: &PoolId) -> Result<PoolSnapshot> {
    let row = get(conn, pool)?;
    let ring = observations::load_ring(conn, pool)?;
    let observations = observations::load_all(conn, pool)?;
    if observations.len() != usize::from(ring.cardinality) {
        return Err(DbError::Serialization(format!(
            "pool {pool}: ring cardinality {} but {} stored observations",
            ring.cardinality,
            observations.len()
        )));
    }

    Ok(PoolSnapshot {
        pool: *pool,
        writer: row.writer,
        ring,
        observations,
        policy: policies::load(conn, pool)?,
        cap: caps::load(conn, pool)?,
        liquidity: row.liquidity,
        last_write_at: row.last_write_at,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use truncgeo_oracle::{OracleService, StaticPolicySource};
    use truncgeo_types::TruncationPolicy;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    /// A live service with one pool that has wrapped its ring.
    pub(crate) fn sample_service() -> (OracleService, PoolId) {
        let pool = PoolId::derive(b"db-pool");
        let writer = WriterId::derive(b"db-writer");
        let mut svc = OracleService::new(StaticPolicySource::new(TruncationPolicy::default()));
        svc.enable(pool, writer, 1_000, 0).expect("enable");
        svc.grow(pool, 4).expect("grow");
        for i in 1..=6u64 {
            svc.write(writer, pool, 1_000 + i * 15, (i as i32) * 20, 5_000_000)
                .expect("write");
        }
        (svc, pool)
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let conn = test_db();
        let (svc, pool) = sample_service();
        let snap = svc.snapshot(pool).expect("snapshot");

        save_snapshot(&conn, &snap).expect("save");
        let loaded = load_snapshot(&conn, &pool).expect("load");
        assert_eq!(loaded, snap);
    }

    #[test]
    fn test_save_twice_replaces() {
        let conn = test_db();
        let (mut svc, pool) = sample_service();
        save_snapshot(&conn, &svc.snapshot(pool).expect("snapshot")).expect("save");

        let writer = WriterId::derive(b"db-writer");
        svc.write(writer, pool, 2_000, 140, 7).expect("write");
        let snap = svc.snapshot(pool).expect("snapshot");
        save_snapshot(&conn, &snap).expect("save again");

        assert_eq!(load_snapshot(&conn, &pool).expect("load"), snap);
        assert_eq!(list(&conn).expect("list"), vec![pool]);
    }

    #[test]
    fn test_missing_pool() {
        let conn = test_db();
        let pool = PoolId::derive(b"nope");
        assert!(matches!(get(&conn, &pool), Err(DbError::NotFound(_))));
        assert!(matches!(
            load_snapshot(&conn, &pool),
            Err(DbError::NotFound(_))
        ));
        assert!(matches!(delete(&conn, &pool), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_delete_cascades() {
        let conn = test_db();
        let (svc, pool) = sample_service();
        save_snapshot(&conn, &svc.snapshot(pool).expect("snapshot")).expect("save");
        delete(&conn, &pool).expect("delete");

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(remaining, 0);
        assert!(list(&conn).expect("list").is_empty());
    }

    #[test]
    fn test_large_liquidity_survives() {
        let conn = test_db();
        let row = PoolRow {
            pool: PoolId::derive(b"big"),
            writer: WriterId::derive(b"w"),
            last_write_at: 42,
            liquidity: u128::MAX,
        };
        upsert(&conn, &row).expect("upsert");
        assert_eq!(get(&conn, &row.pool).expect("get"), row);
    }
}
