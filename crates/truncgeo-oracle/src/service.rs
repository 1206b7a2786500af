//! Per-pool oracle service.
//!
//! [`OracleService`] owns one [`PoolOracle`] per enabled pool: the observation
//! log, the cap controller, the cached policy, and the registered writer. It
//! is the only place where writes are authorized, truncated, appended, and fed
//! to the controller, in that order. A write that fails validation leaves no
//! trace.
//!
//! Times enter as full-width unix seconds. The log stores them wrapped to 32
//! bits; ordering checks use the full-width value of the last write.

use std::collections::HashMap;

use truncgeo_types::{tick_in_range, CapState, PoolId, TruncationPolicy, WriterId, PPM};

use crate::config::OracleConfig;
use crate::controller::{CapController, RetuneOutcome};
use crate::observation::Cumulatives;
use crate::policy::{validate, PolicySource, StaticPolicySource};
use crate::ring::{ObservationLog, RingState};
use crate::snapshot::PoolSnapshot;
use crate::twap::{self, Consultation};
use crate::{OracleError, Result};

/// Low 32 bits of a unix time, as stored in observations.
pub fn wrap_time(now: u64) -> u32 {
    (now & u64::from(u32::MAX)) as u32
}

/// Longest gap after the last write that still maps to a distinct 32-bit
/// timestamp.
pub const MAX_GAP_SECS: u64 = u32::MAX as u64;

/// Clamp `raw` to within `cap` ticks of `last`.
///
/// Returns the applied tick and whether clamping occurred.
pub fn truncate_tick(last: i32, raw: i32, cap: u32) -> (i32, bool) {
    let delta = i64::from(raw) - i64::from(last);
    let cap = i64::from(cap);
    if delta.abs() <= cap {
        return (raw, false);
    }
    let applied = i64::from(last) + delta.signum() * cap;
    // Lies strictly between `last` and `raw`, both valid ticks.
    (applied as i32, true)
}

/// State of one enabled pool.
#[derive(Debug, Clone)]
pub struct PoolOracle {
    writer: WriterId,
    log: ObservationLog,
    controller: CapController,
    policy: TruncationPolicy,
    last_write_at: u64,
    liquidity: u128,
}

impl PoolOracle {
    fn check_read_time(&self, now: u64) -> Result<u32> {
        if now < self.last_write_at || now - self.last_write_at > MAX_GAP_SECS {
            return Err(OracleError::NonMonotonicTimestamp {
                new: now,
                last: self.last_write_at,
            });
        }
        Ok(wrap_time(now))
    }
}

/// Oracle for many independent pools.
#[derive(Debug)]
pub struct OracleService<P = StaticPolicySource> {
    config: OracleConfig,
    source: P,
    pools: HashMap<PoolId, PoolOracle>,
}

impl OracleService<StaticPolicySource> {
    /// A service whose policy source answers every pool with the configured
    /// default policy.
    pub fn from_config(config: OracleConfig) -> Self {
        let source = StaticPolicySource::new(config.default_policy);
        Self::with_config(config, source)
    }
}

impl<P: PolicySource> OracleService<P> {
    /// A service with the default configuration.
    pub fn new(source: P) -> Self {
        Self::with_config(OracleConfig::default(), source)
    }

    /// A service with an explicit configuration and policy source.
    pub fn with_config(config: OracleConfig, source: P) -> Self {
        Self {
            config,
            source,
            pools: HashMap::new(),
        }
    }

    fn pool(&self, pool: &PoolId) -> Result<&PoolOracle> {
        self.pools.get(pool).ok_or(OracleError::NotEnabled(*pool))
    }

    fn pool_mut(&mut self, pool: &PoolId) -> Result<&mut PoolOracle> {
        self.pools.get_mut(pool).ok_or(OracleError::NotEnabled(*pool))
    }

    fn load_policy(&self, pool: &PoolId) -> Result<TruncationPolicy> {
        let policy = self.source.policy_for(pool)?;
        validate(&policy, &self.config.policy_bounds)?;
        Ok(policy)
    }

    /// Start tracking `pool`: seed the log with `initial_tick` at `now`,
    /// install the default cap, and register `writer`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::AlreadyEnabled`] if the pool is already tracked
    /// - [`OracleError::TickOutOfRange`] if `initial_tick` is invalid
    /// - [`OracleError::PolicyUnavailable`] / [`OracleError::InvalidPolicy`]
    ///   if no acceptable policy can be loaded
    pub fn enable(&mut self, pool: PoolId, writer: WriterId, now: u64, initial_tick: i32) -> Result<()> {
        if self.pools.contains_key(&pool) {
            return Err(OracleError::AlreadyEnabled(pool));
        }
        if !tick_in_range(initial_tick) {
            return Err(OracleError::TickOutOfRange(initial_tick));
        }
        let policy = self.load_policy(&pool)?;

        let mut log = ObservationLog::new();
        log.initialize(wrap_time(now), initial_tick);
        let controller =
            CapController::new(policy.default_cap, now, self.config.retune_deadband_ppm);

        tracing::info!(
            %pool,
            %writer,
            tick = initial_tick,
            cap = policy.default_cap,
            "pool enabled"
        );

        self.pools.insert(
            pool,
            PoolOracle {
                writer,
                log,
                controller,
                policy,
                last_write_at: now,
                liquidity: 0,
            },
        );
        Ok(())
    }

    /// Record a new tick for `pool`, clamped to the live cap.
    ///
    /// Returns `true` if the tick was truncated.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NotEnabled`] if the pool is not tracked
    /// - [`OracleError::UnauthorizedWriter`] if `caller` is not the pool's writer
    /// - [`OracleError::TickOutOfRange`] if `tick` is invalid
    /// - [`OracleError::NonMonotonicTimestamp`] if `now` precedes the last write
    ///   or is more than [`MAX_GAP_SECS`] after it
    pub fn write(&mut self, caller: WriterId, pool: PoolId, now: u64, tick: i32, liquidity: u128) -> Result<bool> {
        let state = self.pool_mut(&pool)?;
        if caller != state.writer {
            tracing::warn!(%pool, %caller, "write rejected: unauthorized writer");
            return Err(OracleError::UnauthorizedWriter { pool, caller });
        }
        if !tick_in_range(tick) {
            tracing::warn!(%pool, tick, "write rejected: tick out of range");
            return Err(OracleError::TickOutOfRange(tick));
        }
        if now < state.last_write_at {
            tracing::warn!(%pool, now, last = state.last_write_at, "write rejected: time went backwards");
            return Err(OracleError::NonMonotonicTimestamp {
                new: now,
                last: state.last_write_at,
            });
        }
        if now - state.last_write_at > MAX_GAP_SECS {
            tracing::warn!(%pool, now, last = state.last_write_at, "write rejected: gap wraps the 32-bit clock");
            return Err(OracleError::NonMonotonicTimestamp {
                new: now,
                last: state.last_write_at,
            });
        }

        let last_tick = state.log.latest()?.tick;
        let (applied, capped) = truncate_tick(last_tick, tick, state.controller.current_cap());
        let appended = state.log.append(wrap_time(now), applied, liquidity)?;
        state.last_write_at = now;
        state.liquidity = liquidity;

        tracing::debug!(
            %pool,
            raw = tick,
            applied,
            capped,
            merged = appended.merged,
            slot = appended.index,
            "observation written"
        );

        let policy = state.policy;
        state.controller.on_write(now, capped, &policy);
        if let RetuneOutcome::Raised { from, to } | RetuneOutcome::Lowered { from, to } =
            state.controller.maybe_retune(now, &policy)
        {
            tracing::info!(%pool, from, to, "cap retuned");
        }

        Ok(capped)
    }

    /// Raise the ring capacity `pool` will grow into.
    ///
    /// Returns the resulting capacity target.
    pub fn grow(&mut self, pool: PoolId, cardinality_next: u16) -> Result<u16> {
        let state = self.pool_mut(&pool)?;
        let before = state.log.state().cardinality_next;
        let after = state.log.grow(cardinality_next)?;
        if after != before {
            tracing::info!(%pool, from = before, to = after, "observation ring grown");
        }
        Ok(after)
    }

    /// Cumulatives at each `seconds_ago` before `now`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NotEnabled`] if the pool is not tracked
    /// - [`OracleError::NonMonotonicTimestamp`] if `now` precedes the last write
    ///   or is more than [`MAX_GAP_SECS`] after it
    /// - [`OracleError::TargetPredatesOldestObservation`] if any target is
    ///   older than retained history
    pub fn observe(&self, pool: PoolId, now: u64, seconds_agos: &[u32]) -> Result<Vec<Cumulatives>> {
        let state = self.pool(&pool)?;
        let now = state.check_read_time(now)?;
        state.log.observe(now, seconds_agos, state.liquidity)
    }

    /// Mean tick and harmonic-mean liquidity over the `window` seconds ending
    /// at `now`.
    pub fn consult(&self, pool: PoolId, now: u64, window: u32) -> Result<Consultation> {
        let state = self.pool(&pool)?;
        let now = state.check_read_time(now)?;
        twap::consult(&state.log, now, window, state.liquidity)
    }

    /// Tick and timestamp of the newest observation.
    pub fn latest_observation(&self, pool: PoolId) -> Result<(i32, u32)> {
        let latest = self.pool(&pool)?.log.latest()?;
        Ok((latest.tick, latest.timestamp))
    }

    /// The live movement cap for `pool`.
    pub fn current_cap(&self, pool: PoolId) -> Result<u32> {
        Ok(self.pool(&pool)?.controller.current_cap())
    }

    /// Whether `pool` has been enabled or restored.
    pub fn is_enabled(&self, pool: PoolId) -> bool {
        self.pools.contains_key(&pool)
    }

    /// Re-pull and re-validate the pool's policy, then bring the live cap
    /// inside the new bounds.
    ///
    /// On error the previously cached policy stays in place.
    pub fn refresh_policy(&mut self, pool: PoolId) -> Result<TruncationPolicy> {
        self.pool(&pool)?;
        let policy = self.load_policy(&pool)?;
        let state = self.pool_mut(&pool)?;
        state.policy = policy;
        if let Some(previous) = state.controller.clamp_to(&policy) {
            tracing::warn!(
                %pool,
                from = previous,
                to = state.controller.current_cap(),
                "cap clamped into refreshed policy bounds"
            );
        }
        tracing::info!(%pool, min_cap = policy.min_cap, max_cap = policy.max_cap, "policy refreshed");
        Ok(policy)
    }

    /// Pause or resume cap retuning; a no-op if already in that state.
    pub fn set_auto_tune_paused(&mut self, pool: PoolId, paused: bool) -> Result<()> {
        let state = self.pool_mut(&pool)?;
        if state.controller.is_paused() == paused {
            return Ok(());
        }
        state.controller.set_paused(paused);
        tracing::info!(%pool, paused, "auto-tune toggled");
        Ok(())
    }

    /// The cached policy for `pool`.
    pub fn policy(&self, pool: PoolId) -> Result<TruncationPolicy> {
        Ok(self.pool(&pool)?.policy)
    }

    /// Controller state: cap, frequency, clocks and pause flag.
    pub fn cap_state(&self, pool: PoolId) -> Result<CapState> {
        Ok(self.pool(&pool)?.controller.state())
    }

    /// Ring metadata for `pool`.
    pub fn ring_state(&self, pool: PoolId) -> Result<RingState> {
        Ok(self.pool(&pool)?.log.state())
    }

    /// Enabled pools, in identifier order.
    pub fn pools(&self) -> Vec<PoolId> {
        let mut pools: Vec<PoolId> = self.pools.keys().copied().collect();
        pools.sort();
        pools
    }

    /// The library configuration this service was built with.
    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Mutable access to the policy source, e.g. to install overrides.
    pub fn policy_source_mut(&mut self) -> &mut P {
        &mut self.source
    }

    /// Export a pool's full state.
    pub fn snapshot(&self, pool: PoolId) -> Result<PoolSnapshot> {
        let state = self.pool(&pool)?;
        Ok(PoolSnapshot {
            pool,
            writer: state.writer,
            ring: state.log.state(),
            observations: state.log.observations().copied().collect(),
            policy: state.policy,
            cap: state.controller.state(),
            liquidity: state.liquidity,
            last_write_at: state.last_write_at,
        })
    }

    /// Re-install a pool from a snapshot.
    ///
    /// The snapshot's cached policy is re-validated against this service's
    /// bounds; the policy source is not consulted.
    ///
    /// # Errors
    ///
    /// - [`OracleError::AlreadyEnabled`] if the pool is already tracked
    /// - [`OracleError::InvalidPolicy`] if the cached policy no longer validates
    /// - [`OracleError::CorruptLog`] if the ring or cap state is inconsistent
    pub fn restore(&mut self, snapshot: PoolSnapshot) -> Result<()> {
        let pool = snapshot.pool;
        if self.pools.contains_key(&pool) {
            return Err(OracleError::AlreadyEnabled(pool));
        }
        validate(&snapshot.policy, &self.config.policy_bounds)?;
        let log = ObservationLog::from_parts(snapshot.ring, &snapshot.observations)?;

        let cap = snapshot.cap.current_cap;
        if snapshot.policy.clamp_cap(cap) != cap {
            return Err(OracleError::CorruptLog(format!(
                "cap {cap} outside policy bounds [{}, {}]",
                snapshot.policy.min_cap, snapshot.policy.max_cap
            )));
        }
        if snapshot.cap.cap_frequency_ppm > u64::from(PPM) {
            return Err(OracleError::CorruptLog(format!(
                "cap frequency {} exceeds {PPM} ppm",
                snapshot.cap.cap_frequency_ppm
            )));
        }
        if snapshot.cap.last_retune > snapshot.last_write_at
            || snapshot.cap.last_frequency_update > snapshot.last_write_at
        {
            return Err(OracleError::CorruptLog(format!(
                "controller clock ahead of last write at {}",
                snapshot.last_write_at
            )));
        }
        let latest = log.latest()?;
        if latest.timestamp != wrap_time(snapshot.last_write_at) {
            return Err(OracleError::CorruptLog(format!(
                "last write at {} does not match newest observation {}",
                snapshot.last_write_at, latest.timestamp
            )));
        }
        if !tick_in_range(latest.tick) {
            return Err(OracleError::CorruptLog(format!(
                "newest tick {} out of range",
                latest.tick
            )));
        }

        tracing::info!(
            %pool,
            cardinality = snapshot.ring.cardinality,
            cap,
            "pool restored"
        );

        self.pools.insert(
            pool,
            PoolOracle {
                writer: snapshot.writer,
                log,
                controller: CapController::from_state(
                    snapshot.cap,
                    self.config.retune_deadband_ppm,
                ),
                policy: snapshot.policy,
                last_write_at: snapshot.last_write_at,
                liquidity: snapshot.liquidity,
            },
        );
        Ok(())
    }
}
