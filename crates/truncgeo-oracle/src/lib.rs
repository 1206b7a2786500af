//! # truncgeo-oracle
//!
//! Truncated geometric oracle: a per-pool observation log with an adaptive
//! movement cap.
//!
//! Every write from a pool's authorized writer is clamped to the pool's
//! current cap, appended to a circular observation log, and fed to a
//! frequency-budgeted controller that retunes the cap. Readers query
//! time-weighted averages over the retained history.
//!
//! ## Modules
//!
//! - [`observation`]: Observation record and cumulative accumulation
//! - [`ring`]: Paged circular observation log with wrap-aware search
//! - [`layout`]: Fixed-width record codec for the persisted log
//! - [`policy`]: Policy validation and the policy source seam
//! - [`controller`]: Adaptive cap controller
//! - [`twap`]: Mean tick and harmonic-mean liquidity from cumulatives
//! - [`service`]: Per-pool service over enable, write, query and retune
//! - [`shared`]: Lock-guarded handle for one writer and many readers
//! - [`snapshot`]: Export/import of a pool's full state
//! - [`config`]: Library configuration

pub mod config;
pub mod controller;
pub mod layout;
pub mod observation;
pub mod policy;
pub mod ring;
pub mod service;
pub mod shared;
pub mod snapshot;
pub mod twap;

pub use config::OracleConfig;
pub use controller::{CapController, RetuneOutcome};
pub use observation::{Cumulatives, Observation};
pub use policy::{PolicyBounds, PolicySource, StaticPolicySource};
pub use ring::{ObservationLog, RingState};
pub use service::OracleService;
pub use shared::SharedOracle;
pub use snapshot::PoolSnapshot;
pub use twap::Consultation;

pub use primitive_types::U256;

use truncgeo_types::{PoolId, WriterId};

/// Error types for oracle operations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The truncation policy failed validation.
    #[error("invalid truncation policy: {reason}")]
    InvalidPolicy {
        /// Which constraint was violated.
        reason: String,
    },

    /// The policy source could not supply a policy for the pool.
    #[error("no policy available for pool {pool}")]
    PolicyUnavailable {
        /// The pool whose policy was requested.
        pool: PoolId,
    },

    /// Operation requires an enabled pool.
    #[error("pool {0} is not enabled")]
    NotEnabled(PoolId),

    /// The pool has already been enabled.
    #[error("pool {0} is already enabled")]
    AlreadyEnabled(PoolId),

    /// The query reaches further back than the retained history.
    #[error("target timestamp {target} predates oldest observation {oldest}")]
    TargetPredatesOldestObservation {
        /// Requested timestamp (32-bit wrapped).
        target: u32,
        /// Oldest retained timestamp (32-bit wrapped).
        oldest: u32,
    },

    /// Averages need a non-empty window.
    #[error("averaging window must be non-zero")]
    ZeroWindow,

    /// Caller is not the pool's registered writer.
    #[error("writer {caller} is not authorized for pool {pool}")]
    UnauthorizedWriter {
        /// The pool being written.
        pool: PoolId,
        /// The rejected caller.
        caller: WriterId,
    },

    /// Tick outside the representable range.
    #[error("tick {0} is outside the valid tick range")]
    TickOutOfRange(i32),

    /// Timestamp went backwards relative to the newest observation.
    #[error("non-monotonic timestamp: {new} < {last}")]
    NonMonotonicTimestamp {
        /// The offending timestamp.
        new: u64,
        /// The newest accepted timestamp.
        last: u64,
    },

    /// The log has no initialized slot to append after.
    #[error("observation log has no initialized slots")]
    CardinalityExhausted,

    /// A persisted record could not be decoded.
    #[error("malformed record: {0}")]
    Layout(String),

    /// Restored state violates a log or cap invariant.
    #[error("corrupt oracle state: {0}")]
    CorruptLog(String),

    /// A thread panicked while holding the oracle lock.
    #[error("oracle state lock poisoned")]
    LockPoisoned,
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
