//! # Pump Event Tracking
//!
//! Durable state for detected pumps and the logic that drives each event
//! through its lifecycle:
//!
//! - **Detection** opens a TrackedEvent (one open event per profile/symbol).
//! - **Monitoring** folds each cycle's prices into the open events, recording
//!   retrace milestones against the pre-pump reference price.
//! - **Closing** happens once, when the monitoring deadline passes, assigning
//!   a success / partial / failed outcome.
//! - **Statistics** are recomputed on demand from the stored rows.
//!
//! ## Module Organization
//!
//! - `event` - TrackedEvent entity, states and outcomes
//! - `store` - TrackingStore trait and its SQLite implementation
//! - `monitor` - reversal monitoring, deadline closes, restart recovery
//! - `stats` - pure aggregation over stored events

pub mod event;
pub mod monitor;
pub mod stats;
pub mod store;

pub use event::{EventOutcome, EventState, TrackedEvent};
pub use monitor::{
    apply_price, close, recover_open_events, run_monitor_pass, Milestone, MonitorSummary,
    RecoveryReport,
};
pub use stats::{summarize, symbol_history, AggregateStats, Performer, SymbolStats};
pub use store::{run_schema_migrations, SqliteTrackingStore, StoreError, TrackingStore};
