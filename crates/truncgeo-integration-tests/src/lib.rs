//! Integration test crate for the truncated geometric oracle.
//!
//! This crate has no library code. It only contains integration tests that
//! exercise the oracle end to end across the workspace crates: write-path
//! scenarios, controller convergence, persistence round-trips, and property
//! tests over the observation log and cap.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p truncgeo-integration-tests
//! ```
