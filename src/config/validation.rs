//! Configuration validation
//!
//! Semantic checks on a deserialized [`BotConfig`]. Validation collects ALL
//! issues rather than stopping at the first, so one run reports everything
//! wrong with a file.

use std::time::Duration;

use crate::config::schema::{BotConfig, DEFAULT_SWEEP_INTERVAL, MAX_TIMER_LENGTH};
use crate::error::{Severity, ValidationIssue};

/// Longest lead time of any warning (the 7-day window opens at 7.5 days).
const LONGEST_WARNING_LEAD: Duration = Duration::from_secs(180 * 3600);

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns the result.
    pub fn validate(&mut self, config: &BotConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_ids(config);
        self.validate_roles(config);
        self.validate_timers(config);

        if config.data_file.as_os_str().is_empty() {
            self.add_error("data_file", "Data file path cannot be empty");
        }

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Checks
    // ========================================================================

    fn validate_ids(&mut self, config: &BotConfig) {
        if config.guild_id.get() == 0 {
            self.add_error("guild_id", "Guild id must be non-zero");
        }
        if config.log_channel.get() == 0 {
            self.add_error("log_channel", "Log channel id must be non-zero");
        }
    }

    fn validate_roles(&mut self, config: &BotConfig) {
        let roles = &config.roles;
        let mut named = vec![
            ("roles.first_success", roles.first_success),
            ("roles.second_success", roles.second_success),
            ("roles.first_jail", roles.first_jail),
            ("roles.second_jail", roles.second_jail),
        ];
        if let Some(starter) = roles.starter {
            named.push(("roles.starter", starter));
        }

        for (i, (path, role)) in named.iter().enumerate() {
            if role.get() == 0 {
                self.add_error(path, "Role id must be non-zero");
                continue;
            }
            if let Some((first, _)) = named[..i].iter().find(|(_, other)| other == role) {
                self.add_error(path, &format!("Role id {role} is already used by {first}"));
            }
        }
    }

    fn validate_timers(&mut self, config: &BotConfig) {
        let timers = &config.timers;
        for (path, value) in [
            ("timers.first_phase", timers.first_phase),
            ("timers.second_phase", timers.second_phase),
            ("timers.sweep_interval", timers.sweep_interval),
        ] {
            if value.is_zero() {
                self.add_error(path, "Duration must be non-zero");
            } else if value > MAX_TIMER_LENGTH {
                self.add_error(path, "Duration must not exceed 100 years");
            }
        }

        if timers.sweep_interval > DEFAULT_SWEEP_INTERVAL {
            self.add_warning(
                "timers.sweep_interval",
                &format!(
                    "Sweep interval {} is longer than the default {}; \
                     more warning windows will be skipped",
                    humantime::format_duration(timers.sweep_interval),
                    humantime::format_duration(DEFAULT_SWEEP_INTERVAL)
                ),
            );
        }

        if timers.second_phase < LONGEST_WARNING_LEAD {
            self.add_warning(
                "timers.second_phase",
                "Second phase is shorter than 7.5 days; the 7-day warning is sent immediately",
            );
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}
