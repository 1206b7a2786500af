//! Database query functions organized by table.

pub mod caps;
pub mod observations;
pub mod policies;
pub mod pools;
