//! Onboarding phase tracking.
//!
//! [`record`] holds the persisted per-user state, [`machine`] the pure
//! transitions over it, and [`action`] the effects those transitions
//! request.

pub mod action;
pub mod machine;
pub mod record;

pub use action::{Action, LogEntry};
pub use machine::{Evaluation, PhaseMachine, ResyncOutcome, due_warning};
pub use record::{Phase, PhaseRecord, PhaseStatus, WarningKey, parse_timestamp};
