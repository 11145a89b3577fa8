//! Error types for `TimeBomb`
//!
//! Every fallible subsystem has its own `thiserror` enum; they roll up into
//! [`TimeBombError`], which maps each failure class to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::ids::UserId;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `TimeBomb` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (missing file, invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (data file unreadable, bind failure)
    pub const IO_ERROR: i32 = 3;

    /// Platform error (Discord API unreachable, unauthorized)
    pub const PLATFORM_ERROR: i32 = 4;

    /// Phase state machine error (malformed record, untracked user)
    pub const PHASE_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `TimeBomb` operations.
///
/// This enum aggregates all domain-specific errors and provides
/// a unified interface for error handling and exit code mapping.
#[derive(Debug, Error)]
pub enum TimeBombError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persistence store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Chat platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Phase state machine error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TimeBombError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => ExitCode::CONFIG_ERROR,
            Self::Store(_) | Self::Io(_) => ExitCode::IO_ERROR,
            Self::Platform(_) => ExitCode::PLATFORM_ERROR,
            Self::Phase(_) => ExitCode::PHASE_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Json(_) => ExitCode::ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
///
/// Any of these is fatal: the bot refuses to start without a complete
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", format_issues(errors))]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set ({location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Message supplied with the `${VAR:?message}` reference
        location: String,
    },
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "roles.first_jail")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Store Errors
// ============================================================================

/// Persistence store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the data file failed
    #[error("data file I/O error at {path}: {source}")]
    Io {
        /// Path to the data file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The data file does not contain a valid snapshot
    #[error("corrupt data file {path}: {source}")]
    Corrupt {
        /// Path to the data file
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Platform Errors
// ============================================================================

/// Chat platform errors.
///
/// `Forbidden` is the expected outcome of messaging a user who has closed
/// their DMs and is never treated as a failure worth retrying.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform refused the operation (DMs closed, missing permission)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The target user, role or channel does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The platform asked us to back off
    #[error("rate limited (retry after {retry_after_secs:.1}s)")]
    RateLimited {
        /// Seconds the platform asked us to wait
        retry_after_secs: f64,
    },

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Connection or protocol failure
    #[error("network error: {0}")]
    Network(String),
}

impl PlatformError {
    /// Returns `true` for the expected "user has DMs disabled" outcome.
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

// ============================================================================
// Phase Errors
// ============================================================================

/// Phase state machine errors.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// A record violates the shape invariants and cannot be evaluated
    #[error("malformed record for user {user}: {reason}")]
    MalformedRecord {
        /// Owner of the record
        user: UserId,
        /// What is wrong with it
        reason: String,
    },

    /// The user has no record
    #[error("user {0} has no active timers")]
    NotTracked(UserId),

    /// Phase number outside 1..=2
    #[error("invalid phase {0}: expected 1 or 2")]
    InvalidPhase(u8),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `TimeBomb` operations.
pub type Result<T> = std::result::Result<T, TimeBombError>;

// ============================================================================
// Tests
// ============================================================================
