//! CLI argument definitions.
//!
//! All Clap derive structs for `timebomb` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::ids::UserId;
use crate::observability::LogFormat;

/// Default configuration path when neither `--config` nor
/// `TIMEBOMB_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "timebomb.yaml";

// ============================================================================
// Root CLI
// ============================================================================

/// Onboarding deadline tracker for Discord communities.
#[derive(Parser, Debug)]
#[command(name = "timebomb", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace for `run`; one step less
    /// verbose for the other commands).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "TIMEBOMB_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(
        long,
        default_value = "human",
        global = true,
        env = "TIMEBOMB_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
}

// ============================================================================
// Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bot: periodic sweep plus the admin API and event ingress.
    Run(RunArgs),

    /// Run a single sweep tick and exit.
    Sweep(SweepArgs),

    /// Show one member's timers from the data file.
    Status(StatusArgs),

    /// List every tracked member from the data file.
    List(ListArgs),

    /// Validate configuration files without starting the bot.
    Validate(ValidateArgs),
}

/// Configuration file selection shared by every command that needs one.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the YAML configuration file.
    #[arg(
        short,
        long,
        env = "TIMEBOMB_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,
}

/// Discord connection settings.
#[derive(Args, Debug, Clone)]
pub struct DiscordArgs {
    /// Bot token.
    #[arg(long = "token", env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Discord REST API root.
    #[arg(long, env = "DISCORD_API_BASE", hide = true)]
    pub api_base: Option<String>,
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Discord connection.
    #[command(flatten)]
    pub discord: DiscordArgs,

    /// Bind the admin API on `[host:]port`.
    #[arg(long, default_value = "127.0.0.1:8080", env = "TIMEBOMB_BIND")]
    pub bind: String,

    /// Bearer token required by the admin API.
    #[arg(long, env = "TIMEBOMB_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Expose Prometheus metrics on this port.
    #[arg(long, env = "TIMEBOMB_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for `sweep`.
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Configuration file.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Discord connection.
    #[command(flatten)]
    pub discord: DiscordArgs,

    /// Evaluate without contacting Discord or writing the data file.
    #[arg(long)]
    pub dry_run: bool,

    /// Output format for the sweep report.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Configuration file.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// The member's user id.
    pub user: UserId,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Configuration file.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["timebomb", "run", "--config", "bot.yaml"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config.config, PathBuf::from("bot.yaml"));
        assert_eq!(args.bind, "127.0.0.1:8080");
        assert!(args.metrics_port.is_none());
    }

    #[test]
    fn test_status_parses_user_id() {
        let cli = Cli::try_parse_from(["timebomb", "status", "1198697252374462564"]).unwrap();
        let Commands::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert_eq!(args.user, UserId::new(1_198_697_252_374_462_564));
        assert_eq!(args.format, OutputFormat::Human);
    }

    #[test]
    fn test_status_rejects_bad_user_id() {
        assert!(Cli::try_parse_from(["timebomb", "status", "alice"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "timebomb",
            "list",
            "-vv",
            "--log-format",
            "json",
            "--color",
            "never",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.color, ColorChoice::Never);
    }

    #[test]
    fn test_validate_requires_files() {
        assert!(Cli::try_parse_from(["timebomb", "validate"]).is_err());
    }

    #[test]
    fn test_help_output() {
        let err = Cli::try_parse_from(["timebomb", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_output() {
        let err = Cli::try_parse_from(["timebomb", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
