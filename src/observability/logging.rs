//! Logging initialization.
//!
//! All output goes to stderr through `tracing-subscriber`, either as
//! human-readable lines or as newline-delimited JSON for log shippers.
//! `TIMEBOMB_LOG_LEVEL` (an `EnvFilter` directive such as
//! `timebomb=debug,reqwest=warn`) overrides the `-v` count.

use std::io::IsTerminal;

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable holding a filter directive.
pub const LOG_LEVEL_ENV: &str = "TIMEBOMB_LOG_LEVEL";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

/// Maps the `-v` count to a directive, starting from `floor`.
///
/// The daemon runs with an `info` floor so joins, warnings and jails are
/// visible without flags; one-shot commands start at `warn`.
#[must_use]
pub const fn verbosity_to_directive(floor: u8, verbosity: u8) -> &'static str {
    match floor.saturating_add(verbosity) {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber.
///
/// Uses `try_init()`, so a second call (tests, repeated CLI dispatch) is a
/// no-op.
pub fn init_logging(format: LogFormat, floor: u8, verbosity: u8, color: ColorChoice) {
    let directive = verbosity_to_directive(floor, verbosity);
    let filter =
        EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new(directive));

    let show_target = floor.saturating_add(verbosity) >= 2;

    match format {
        LogFormat::Human => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(use_ansi(color))
                .with_target(show_target)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(false)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

fn use_ansi(color: ColorChoice) -> bool {
    match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_from_zero_floor() {
        assert_eq!(verbosity_to_directive(0, 0), "warn");
        assert_eq!(verbosity_to_directive(0, 1), "info");
        assert_eq!(verbosity_to_directive(0, 2), "debug");
        assert_eq!(verbosity_to_directive(0, 3), "trace");
    }

    #[test]
    fn test_daemon_floor_is_info() {
        assert_eq!(verbosity_to_directive(1, 0), "info");
        assert_eq!(verbosity_to_directive(1, 1), "debug");
    }

    #[test]
    fn test_directive_saturates() {
        assert_eq!(verbosity_to_directive(255, 255), "trace");
    }

    #[test]
    fn test_never_color_disables_ansi() {
        assert!(!use_ansi(ColorChoice::Never));
        assert!(use_ansi(ColorChoice::Always));
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LogFormat::Human, 0, 0, ColorChoice::Never);
        init_logging(LogFormat::Json, 1, 2, ColorChoice::Never);
    }
}
