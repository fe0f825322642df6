//! Check-in compliance engine.
//!
//! - [`classifier`]: per-period status buckets and outstanding-period reports
//! - [`reconciler`]: directory vs. roster diff and application
//! - [`vacation_lookup`]: vacation ledger queries
//! - [`engine`]: the [`CheckinEngine`] facade tying stores, directory and limits together

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
mod guard;
pub mod reconciler;
pub mod vacation_lookup;

pub use classifier::{
    Classification, IndeterminateRef, OutstandingReport, PastDue, PeriodSelector,
};
pub use config::EngineConfig;
pub use engine::CheckinEngine;
pub use error::{EngineError, EngineResult};
pub use reconciler::{
    compute_roster_diff, EntityError, ReconcileOutcome, ReconciliationResult, RosterDiff,
    RosterGuard, RosterLocks,
};
pub use vacation_lookup::VacationLedger;
