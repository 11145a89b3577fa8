//! `sweep`: one tick from the command line.

use std::sync::Arc;

use chrono::Utc;

use super::{discord, load_config};
use crate::cli::args::{OutputFormat, SweepArgs};
use crate::error::TimeBombError;
use crate::platform::{Platform, PlatformCall, RecordingPlatform};
use crate::store::TimerStore;
use crate::sweep::{self, SweepReport};
use crate::tracker::Tracker;

/// Runs one sweep tick.
///
/// With `--dry-run` nothing is sent and the data file is left as is; the
/// platform calls that would have been made are printed instead.
///
/// # Errors
///
/// Returns a config or store error if either cannot be loaded, or a usage
/// error if no token is available for a real sweep.
pub async fn run(args: &SweepArgs) -> Result<(), TimeBombError> {
    let config = load_config(&args.config.config)?;
    let store = TimerStore::load(&config.data_file)?.into_shared();
    let now = Utc::now();

    let recorder = Arc::new(RecordingPlatform::new());
    let platform: Arc<dyn Platform> = if args.dry_run {
        Arc::clone(&recorder) as Arc<dyn Platform>
    } else {
        discord(&args.discord, config.guild_id)?
    };
    let tracker = Tracker::new(store, platform, config);

    let report = if args.dry_run {
        sweep::preview(&tracker, now).await
    } else {
        sweep::run_once(&tracker, now).await
    };

    print_report(&report, args.format, args.dry_run.then(|| recorder.calls()))?;
    Ok(())
}

fn print_report(
    report: &SweepReport,
    format: OutputFormat,
    planned: Option<Vec<PlatformCall>>,
) -> Result<(), TimeBombError> {
    match format {
        OutputFormat::Human => {
            println!(
                "evaluated {}, warnings {}, jails {}, errors {}, dispatch failures {}",
                report.evaluated,
                report.warnings,
                report.jails,
                report.errors,
                report.dispatch_failures
            );
            for call in planned.unwrap_or_default() {
                println!("  would {}", describe(&call));
            }
        }
        OutputFormat::Json => {
            let mut value = serde_json::to_value(report)?;
            if let Some(calls) = planned {
                value["planned"] = calls.iter().map(describe).collect();
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn describe(call: &PlatformCall) -> String {
    match call {
        PlatformCall::DirectMessage { user, title } => format!("message {user}: {title}"),
        PlatformCall::AddRole { user, role } => format!("add role {role} to {user}"),
        PlatformCall::RemoveRole { user, role } => format!("remove role {role} from {user}"),
        PlatformCall::Log { channel, title } => format!("log to {channel}: {title}"),
    }
}
