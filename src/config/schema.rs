//! Configuration schema.
//!
//! The file is YAML; the bot's historical `config.json` is valid YAML and
//! loads unchanged.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{ChannelId, GuildId, RoleId};
use crate::phase::Phase;

/// Default location of the persisted timer snapshot.
pub const DEFAULT_DATA_FILE: &str = "/data/persistent_user_data.json";

/// Period between sweeps when none is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(8 * 3600);

/// Longest accepted timer length (100 years). Deadlines are computed as
/// `now + length` and must stay inside chrono's range.
pub const MAX_TIMER_LENGTH: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Top-level bot configuration. Loaded once at startup and frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// The community the bot moderates.
    pub guild_id: GuildId,

    /// Channel receiving moderation log lines.
    #[serde(alias = "log_channel_id")]
    pub log_channel: ChannelId,

    /// Roles that drive and reflect phase progress.
    pub roles: RoleConfig,

    /// Phase lengths and sweep cadence.
    #[serde(default)]
    pub timers: TimerConfig,

    /// Path of the JSON snapshot holding all tracked records.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

/// Role identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    /// Granted by moderators when phase 1 requirements are met.
    pub first_success: RoleId,
    /// Granted by moderators when phase 2 requirements are met.
    pub second_success: RoleId,
    /// Applied when the phase 1 deadline passes.
    pub first_jail: RoleId,
    /// Applied when the phase 2 deadline passes.
    pub second_jail: RoleId,
    /// Entry role given to fresh members; treated like "no roles" by resync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starter: Option<RoleId>,
}

impl RoleConfig {
    /// Jail role for the given phase.
    #[must_use]
    pub const fn jail(&self, phase: Phase) -> RoleId {
        match phase {
            Phase::First => self.first_jail,
            Phase::Second => self.second_jail,
        }
    }

    /// Maps a jail role back to its phase.
    #[must_use]
    pub fn jail_phase(&self, role: RoleId) -> Option<Phase> {
        if role == self.first_jail {
            Some(Phase::First)
        } else if role == self.second_jail {
            Some(Phase::Second)
        } else {
            None
        }
    }
}

/// Phase lengths and sweep cadence, written as humantime durations
/// (`3d`, `14d`, `8h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimerConfig {
    /// Length of phase 1.
    #[serde(
        default = "default_first_phase",
        deserialize_with = "de_duration",
        serialize_with = "ser_duration"
    )]
    pub first_phase: Duration,

    /// Length of phase 2.
    #[serde(
        default = "default_second_phase",
        deserialize_with = "de_duration",
        serialize_with = "ser_duration"
    )]
    pub second_phase: Duration,

    /// Period between sweeps.
    #[serde(
        default = "default_sweep_interval",
        deserialize_with = "de_duration",
        serialize_with = "ser_duration"
    )]
    pub sweep_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            first_phase: default_first_phase(),
            second_phase: default_second_phase(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_data_file() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FILE)
}

const fn default_first_phase() -> Duration {
    Duration::from_secs(3 * 24 * 3600)
}

const fn default_second_phase() -> Duration {
    Duration::from_secs(14 * 24 * 3600)
}

const fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn ser_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_JSON: &str = r#"{
        "guild_id": 1111,
        "log_channel": 2222,
        "roles": {
            "first_success": 11,
            "second_success": 12,
            "first_jail": 13,
            "second_jail": 14
        }
    }"#;

    #[test]
    fn test_legacy_json_config_parses_as_yaml() {
        let config: BotConfig = serde_yaml::from_str(LEGACY_JSON).unwrap();
        assert_eq!(config.guild_id, GuildId::new(1111));
        assert_eq!(config.log_channel, ChannelId::new(2222));
        assert_eq!(config.roles.second_jail, RoleId::new(14));
        assert!(config.roles.starter.is_none());
        assert_eq!(config.timers, TimerConfig::default());
        assert_eq!(config.data_file, PathBuf::from(DEFAULT_DATA_FILE));
    }

    #[test]
    fn test_timer_durations() {
        let yaml = r"
guild_id: 1
log_channel: 2
roles: { first_success: 3, second_success: 4, first_jail: 5, second_jail: 6, starter: 7 }
timers:
  first_phase: 2d
  sweep_interval: 30m
";
        let config: BotConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timers.first_phase, Duration::from_secs(2 * 86_400));
        assert_eq!(config.timers.second_phase, default_second_phase());
        assert_eq!(config.timers.sweep_interval, Duration::from_secs(1800));
        assert_eq!(config.roles.starter, Some(RoleId::new(7)));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let yaml = r"
guild_id: 1
log_channel: 2
roles: { first_success: 3, second_success: 4, first_jail: 5, second_jail: 6 }
timers: { first_phase: soon }
";
        assert!(serde_yaml::from_str::<BotConfig>(yaml).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r"
guild_id: 1
log_channel: 2
roles: { first_success: 3, second_success: 4, first_jail: 5, second_jail: 6 }
prefix: '/'
";
        assert!(serde_yaml::from_str::<BotConfig>(yaml).is_err());
    }

    #[test]
    fn test_jail_role_lookup() {
        let config: BotConfig = serde_yaml::from_str(LEGACY_JSON).unwrap();
        assert_eq!(config.roles.jail(Phase::First), RoleId::new(13));
        assert_eq!(config.roles.jail_phase(RoleId::new(14)), Some(Phase::Second));
        assert_eq!(config.roles.jail_phase(RoleId::new(11)), None);
    }
}
