//! CLI command dispatch and handlers.
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod run;
pub mod status;
pub mod sweep;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, DiscordArgs};
use crate::config::{BotConfig, ConfigLoader};
use crate::error::TimeBombError;
use crate::ids::GuildId;
use crate::platform::{DiscordClient, Platform};

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// `cancel` fires on the first SIGINT or SIGTERM; only `run` waits on it.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), TimeBombError> {
    match cli.command {
        Commands::Run(args) => run::run(&args, cancel).await,
        Commands::Sweep(args) => sweep::run(&args).await,
        Commands::Status(args) => status::status(&args),
        Commands::List(args) => status::list(&args),
        Commands::Validate(args) => validate::run(&args),
    }
}

/// Loads and validates the configuration, logging any warnings.
pub(crate) fn load_config(path: &Path) -> Result<Arc<BotConfig>, TimeBombError> {
    tracing::info!(config = %path.display(), "loading configuration");
    let load_result = ConfigLoader::new().load(path)?;

    for warning in &load_result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }

    Ok(load_result.config)
}

/// Builds the Discord REST client from `--token` / `DISCORD_TOKEN`.
pub(crate) fn discord(
    args: &DiscordArgs,
    guild: GuildId,
) -> Result<Arc<dyn Platform>, TimeBombError> {
    let token = args
        .token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            TimeBombError::Usage("a bot token is required (--token or DISCORD_TOKEN)".to_string())
        })?;

    let client = match args.api_base.as_deref() {
        Some(base) => DiscordClient::with_base_url(token, guild, base)?,
        None => DiscordClient::new(token, guild)?,
    };
    Ok(Arc::new(client))
}
