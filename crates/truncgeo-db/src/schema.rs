//! SQL schema definitions.
//!
//! Observation and ring records are stored as the oracle's fixed-width
//! big-endian encodings so the on-disk log is byte-compatible with
//! [`truncgeo_oracle::layout`].

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Pools
-- ============================================================

CREATE TABLE IF NOT EXISTS pools (
    pool_id BLOB PRIMARY KEY CHECK (length(pool_id) = 32),
    writer_id BLOB NOT NULL CHECK (length(writer_id) = 32),
    last_write_at INTEGER NOT NULL,
    liquidity BLOB NOT NULL CHECK (length(liquidity) = 16),
    updated_at INTEGER NOT NULL
);

-- ============================================================
-- Observation log
-- ============================================================

CREATE TABLE IF NOT EXISTS ring_state (
    pool_id BLOB PRIMARY KEY REFERENCES pools(pool_id) ON DELETE CASCADE,
    record BLOB NOT NULL CHECK (length(record) = 6)
);

CREATE TABLE IF NOT EXISTS observations (
    pool_id BLOB NOT NULL REFERENCES pools(pool_id) ON DELETE CASCADE,
    slot INTEGER NOT NULL CHECK (slot >= 0 AND slot < 1024),
    record BLOB NOT NULL CHECK (length(record) = 35),
    PRIMARY KEY (pool_id, slot)
);

-- ============================================================
-- Policy cache & controller
-- ============================================================

CREATE TABLE IF NOT EXISTS policies (
    pool_id BLOB PRIMARY KEY REFERENCES pools(pool_id) ON DELETE CASCADE,
    min_cap INTEGER NOT NULL,
    max_cap INTEGER NOT NULL,
    default_cap INTEGER NOT NULL,
    step_ppm INTEGER NOT NULL,
    budget_ppm INTEGER NOT NULL,
    decay_window_secs INTEGER NOT NULL,
    update_interval_secs INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cap_state (
    pool_id BLOB PRIMARY KEY REFERENCES pools(pool_id) ON DELETE CASCADE,
    current_cap INTEGER NOT NULL,
    last_retune INTEGER NOT NULL,
    auto_tune_paused INTEGER NOT NULL DEFAULT 0,
    cap_frequency_ppm INTEGER NOT NULL DEFAULT 0,
    last_frequency_update INTEGER NOT NULL
);
"#;
