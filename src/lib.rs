//! `TimeBomb` - onboarding deadline tracker for Discord communities
//!
//! New members get a timed first phase; completing it starts a second,
//! longer phase. A periodic sweep warns members as deadlines approach and
//! jails them when a deadline passes. Moderators work through an HTTP
//! admin API, which also receives membership and role events.

pub mod api;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod messages;
pub mod observability;
pub mod phase;
pub mod platform;
pub mod store;
pub mod sweep;
pub mod tracker;
