//! Overseer: an independent process that watches the hub state, repairs
//! stuck tasks, and keeps persisted logs bounded.

pub mod checks;
mod monitor;
mod state;

pub use checks::{ActivityStatus, HealthSummary, Issue, StuckRun};
pub use monitor::{CycleReport, Overseer};
pub use state::{
    ActionKind, LogKind, OverseerAction, OverseerLog, OverseerLogEntry, OverseerState,
    OverseerStatus,
};
