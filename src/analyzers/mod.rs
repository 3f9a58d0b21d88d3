//! Station incident extraction, aggregation and ranking.
//!
//! This module turns the reconstructed status history into per-station
//! incident durations, reduces them to monthly and per-incident averages,
//! ranks stations worst first, and drives the full statistics job.

pub mod aggregate;
pub mod analyzer;
pub mod incidents;
pub mod types;
pub mod utility;
