//! Scenario runner: one writer task feeding the oracle, one reader task
//! consulting it concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use truncgeo_oracle::{OracleError, OracleService, SharedOracle};
use truncgeo_types::{PoolId, WriterId};

use crate::config::{ScenarioKind, SimConfig};
use crate::scenario::{CapTracker, TickStream};

/// Outcome of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub scenario: ScenarioKind,
    pub pool: String,
    pub steps: u32,
    pub capped_writes: u32,
    pub cap_events: u32,
    pub initial_cap: u32,
    pub final_cap: u32,
    pub min_cap: u32,
    pub max_cap: u32,
    pub final_frequency_ppm: u64,
    pub final_tick: i32,
    pub cardinality: u16,
    /// Mean tick over the configured window at the end of the run, if the
    /// retained history covers it.
    pub mean_tick: Option<i32>,
    pub harmonic_mean_liquidity: Option<String>,
    pub reader_consults: u64,
    pub reader_misses: u64,
    pub persisted_to: Option<String>,
}

#[derive(Debug, Default)]
struct ReaderStats {
    consults: u64,
    misses: u64,
}

/// Run the configured scenario to completion.
pub async fn run(config: &SimConfig) -> anyhow::Result<Report> {
    let scenario = &config.scenario;
    let pool = PoolId::derive(scenario.pool.as_bytes());
    let writer = WriterId::derive(scenario.writer.as_bytes());
    let liquidity = u128::from(scenario.liquidity);

    let mut service = OracleService::from_config(config.oracle.clone());
    service.enable(pool, writer, scenario.start_time, 0)?;
    service.grow(pool, scenario.cardinality)?;
    let policy = service.policy(pool)?;
    let initial_cap = service.current_cap(pool)?;

    info!(
        %pool,
        kind = ?scenario.kind,
        steps = scenario.steps,
        initial_cap,
        deadband_ppm = service.config().retune_deadband_ppm,
        "simulation starting"
    );
    let oracle = SharedOracle::new(service);

    let clock = Arc::new(AtomicU64::new(scenario.start_time));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let reader = {
        let oracle = oracle.clone();
        let clock = Arc::clone(&clock);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let window = scenario.twap_window_secs;
        let interval = Duration::from_millis(scenario.reader_interval_ms.max(1));
        tokio::spawn(async move {
            let mut stats = ReaderStats::default();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        // The clock is read under the lock so it is never older
                        // than the last write.
                        let result = oracle.read(|svc| {
                            svc.consult(pool, clock.load(Ordering::SeqCst), window)
                        });
                        match result {
                            Ok(c) => {
                                stats.consults += 1;
                                debug!(mean_tick = c.mean_tick, "reader consulted");
                            }
                            Err(OracleError::TargetPredatesOldestObservation { .. }) => {
                                stats.misses += 1;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
            Ok(stats)
        })
    };

    let mut stream = TickStream::new(scenario.kind, scenario.seed, &policy);
    let mut tracker = CapTracker::default();
    let mut now = scenario.start_time;
    for step in 0..scenario.steps {
        now += scenario.step_seconds;
        clock.store(now, Ordering::SeqCst);

        let (last_tick, _) = oracle.read(|svc| svc.latest_observation(pool))?;
        let raw = stream.next_tick(last_tick);
        let capped = oracle.write(writer, pool, now, raw, liquidity)?;
        let cap = oracle.current_cap(pool)?;
        tracker.observe(step, capped, cap);

        tokio::task::yield_now().await;
    }

    let _ = shutdown_tx.send(());
    let stats = reader.await??;

    let final_consult = match oracle.consult(pool, now, scenario.twap_window_secs) {
        Ok(c) => Some(c),
        Err(OracleError::TargetPredatesOldestObservation { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let snapshot = oracle.snapshot(pool)?;

    let persisted_to = match config.db_path() {
        Some(path) => {
            let conn = truncgeo_db::open(&path)?;
            truncgeo_db::queries::pools::save_snapshot(&conn, &snapshot)?;
            info!(path = %path.display(), "pool persisted");
            Some(path.display().to_string())
        }
        None => None,
    };

    let final_tick = snapshot
        .summary()
        .map(|s| s.latest_tick)
        .unwrap_or_default();

    let report = Report {
        scenario: scenario.kind,
        pool: pool.to_string(),
        steps: scenario.steps,
        capped_writes: tracker.capped_writes(),
        cap_events: tracker.events(),
        initial_cap,
        final_cap: snapshot.cap.current_cap,
        min_cap: policy.min_cap,
        max_cap: policy.max_cap,
        final_frequency_ppm: snapshot.cap.cap_frequency_ppm,
        final_tick,
        cardinality: snapshot.ring.cardinality,
        mean_tick: final_consult.map(|c| c.mean_tick),
        harmonic_mean_liquidity: final_consult.map(|c| c.harmonic_mean_liquidity.to_string()),
        reader_consults: stats.consults,
        reader_misses: stats.misses,
        persisted_to,
    };

    info!(
        final_cap = report.final_cap,
        cap_events = report.cap_events,
        capped_writes = report.capped_writes,
        "simulation finished"
    );
    Ok(report)
}
