//! # Scan Orchestration
//!
//! Ties the detection pipeline together: fetch snapshots, classify them,
//! persist new events, monitor open ones and publish stats.
//!
//! ## Module Organization
//!
//! - **cycle**: one scan-analyze-update pass for a profile
//! - **scheduler**: the per-profile interval loop

pub mod cycle;
pub mod scheduler;

pub use cycle::{CycleReport, ProfileScanner};
pub use scheduler::profile_scan_task;
