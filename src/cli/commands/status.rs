//! `status` and `list`: read-only views of the data file.
//!
//! Both read the snapshot on disk and never contact Discord, so they work
//! while the bot is running or stopped.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use super::load_config;
use crate::api::TimerView;
use crate::cli::args::{ListArgs, OutputFormat, StatusArgs};
use crate::error::{PhaseError, TimeBombError};
use crate::messages::format_deadline;
use crate::store::TimerStore;

/// Prints one member's timers.
///
/// # Errors
///
/// Returns [`PhaseError::NotTracked`] when the member has no record, or a
/// config/store error if either cannot be loaded.
pub fn status(args: &StatusArgs) -> Result<(), TimeBombError> {
    let config = load_config(&args.config.config)?;
    let store = TimerStore::load(&config.data_file)?;
    let record = store
        .get(args.user)
        .cloned()
        .ok_or(PhaseError::NotTracked(args.user))?;

    let view = TimerView::new(args.user, record, Utc::now());
    match args.format {
        OutputFormat::Human => print!("{}", render(&view)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
    }
    Ok(())
}

/// Prints every tracked member.
///
/// # Errors
///
/// Returns a config or store error if either cannot be loaded.
pub fn list(args: &ListArgs) -> Result<(), TimeBombError> {
    let config = load_config(&args.config.config)?;
    let store = TimerStore::load(&config.data_file)?;
    let now = Utc::now();
    let views: Vec<TimerView> = store
        .iter()
        .map(|(user, record)| TimerView::new(user, record.clone(), now))
        .collect();

    match args.format {
        OutputFormat::Human => {
            if views.is_empty() {
                println!("No active timers.");
            }
            for view in &views {
                print!("{}", render(view));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&views)?),
    }
    Ok(())
}

fn render(view: &TimerView) -> String {
    let record = &view.record;
    let mut out = format!("{} [{}]\n", view.user_id, view.status);
    let _ = writeln!(out, "  joined   {}", format_deadline(record.join_time));
    if let Some(deadline) = record.phase1_deadline {
        out.push_str(&phase_line(
            1,
            deadline,
            view.phase1_remaining.as_deref(),
            record.phase1_failed,
        ));
    }
    if let Some(deadline) = record.phase2_deadline.filter(|_| record.phase2_active) {
        out.push_str(&phase_line(
            2,
            deadline,
            view.phase2_remaining.as_deref(),
            record.phase2_failed,
        ));
    }
    if !record.warnings_sent.is_empty() {
        let keys: Vec<&str> = record.warnings_sent.keys().map(|k| k.as_str()).collect();
        let _ = writeln!(out, "  warned   {}", keys.join(", "));
    }
    out
}

fn phase_line(n: u8, deadline: DateTime<Utc>, remaining: Option<&str>, failed: bool) -> String {
    let state = if failed {
        "jailed".to_string()
    } else {
        remaining.map_or_else(|| "expired".to_string(), |left| format!("{left} left"))
    };
    format!("  phase {n}  {} ({state})\n", format_deadline(deadline))
}
