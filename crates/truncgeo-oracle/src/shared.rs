//! Lock-guarded oracle handle.
//!
//! Writers take the write lock for the whole mutation; readers take the read
//! lock, so every read sees one consistent state and readers never block each
//! other. A panic while the lock is held surfaces as
//! [`OracleError::LockPoisoned`] on every later access.

use std::sync::{Arc, RwLock};

use truncgeo_types::{PoolId, WriterId};

use crate::observation::Cumulatives;
use crate::policy::{PolicySource, StaticPolicySource};
use crate::service::OracleService;
use crate::snapshot::PoolSnapshot;
use crate::twap::Consultation;
use crate::{OracleError, Result};

/// Cloneable handle to an [`OracleService`] shared across tasks.
#[derive(Debug)]
pub struct SharedOracle<P = StaticPolicySource> {
    inner: Arc<RwLock<OracleService<P>>>,
}

impl<P> Clone for SharedOracle<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: PolicySource> SharedOracle<P> {
    /// Wrap a service for sharing across tasks.
    pub fn new(service: OracleService<P>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(service)),
        }
    }

    /// Run `f` under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&OracleService<P>) -> Result<T>) -> Result<T> {
        let guard = self.inner.read().map_err(|_| OracleError::LockPoisoned)?;
        f(&guard)
    }

    /// Run `f` under the write lock.
    pub fn update<T>(&self, f: impl FnOnce(&mut OracleService<P>) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.write().map_err(|_| OracleError::LockPoisoned)?;
        f(&mut guard)
    }

    /// [`OracleService::write`] under the write lock.
    pub fn write(&self, caller: WriterId, pool: PoolId, now: u64, tick: i32, liquidity: u128) -> Result<bool> {
        self.update(|svc| svc.write(caller, pool, now, tick, liquidity))
    }

    /// [`OracleService::observe`] under the read lock.
    pub fn observe(&self, pool: PoolId, now: u64, seconds_agos: &[u32]) -> Result<Vec<Cumulatives>> {
        self.read(|svc| svc.observe(pool, now, seconds_agos))
    }

    /// [`OracleService::consult`] under the read lock.
    pub fn consult(&self, pool: PoolId, now: u64, window: u32) -> Result<Consultation> {
        self.read(|svc| svc.consult(pool, now, window))
    }

    /// [`OracleService::current_cap`] under the read lock.
    pub fn current_cap(&self, pool: PoolId) -> Result<u32> {
        self.read(|svc| svc.current_cap(pool))
    }

    /// [`OracleService::snapshot`] under the read lock.
    pub fn snapshot(&self, pool: PoolId) -> Result<PoolSnapshot> {
        self.read(|svc| svc.snapshot(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use truncgeo_types::TruncationPolicy;

    fn shared() -> (SharedOracle, PoolId, WriterId) {
        let pool = PoolId::derive(b"shared");
        let writer = WriterId::derive(b"w");
        let mut svc = OracleService::new(StaticPolicySource::new(TruncationPolicy::default()));
        svc.enable(pool, writer, 0, 0).expect("enable");
        svc.grow(pool, 64).expect("grow");
        (SharedOracle::new(svc), pool, writer)
    }

    #[test]
    fn test_concurrent_readers_see_consistent_state() {
        let (oracle, pool, writer) = shared();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let oracle = oracle.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let cap = oracle.current_cap(pool).expect("cap");
                        assert!(cap >= 10);
                    }
                })
            })
            .collect();

        for t in 1..=40u64 {
            oracle.write(writer, pool, t, (t as i32) % 7, 1_000).expect("write");
        }
        for r in readers {
            r.join().expect("reader");
        }
        assert_eq!(oracle.snapshot(pool).expect("snapshot").last_write_at, 40);
    }

    #[test]
    fn test_poisoned_lock_reports_error() {
        let (oracle, pool, _) = shared();
        let poisoner = oracle.clone();
        let _ = thread::spawn(move || {
            let _ = poisoner.update(|_| -> Result<()> {
                std::panic::panic_any("poison");
            });
        })
        .join();
        assert!(matches!(
            oracle.current_cap(pool),
            Err(OracleError::LockPoisoned)
        ));
    }
}
