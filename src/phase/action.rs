//! Side effects requested by the phase state machine.
//!
//! The machine never talks to the platform; it returns [`Action`]s and the
//! dispatcher turns them into direct messages, role changes and log-channel
//! posts.

use chrono::{DateTime, Utc};

use crate::ids::UserId;

use super::record::{Phase, WarningKey};

/// An observable effect to apply after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Greet a new member and explain the phase 1 requirements.
    Welcome {
        /// Member to greet.
        user: UserId,
        /// Phase 1 deadline.
        deadline: DateTime<Utc>,
    },

    /// Remind a member that a deadline is approaching.
    Warn {
        /// Member to remind.
        user: UserId,
        /// Which window fired.
        key: WarningKey,
        /// The deadline being warned about.
        deadline: DateTime<Utc>,
    },

    /// Assign the phase's jail role and send the failure notice.
    Jail {
        /// Member to jail.
        user: UserId,
        /// Phase that was failed.
        phase: Phase,
    },

    /// Send the failure notice only; a moderator already assigned the role.
    JailNotice {
        /// Member that was jailed.
        user: UserId,
        /// Phase the jail role belongs to.
        phase: Phase,
    },

    /// Remove the jail role and announce the fresh deadline.
    Release {
        /// Member to release.
        user: UserId,
        /// Phase being re-armed.
        phase: Phase,
        /// New deadline.
        deadline: DateTime<Utc>,
    },

    /// Announce phase 1 completion and the phase 2 requirements.
    StartPhase2 {
        /// Member advancing.
        user: UserId,
        /// Phase 2 deadline.
        deadline: DateTime<Utc>,
    },

    /// Announce completion of both phases.
    Congratulate {
        /// Member who finished.
        user: UserId,
    },

    /// Append a line to the moderation log channel.
    Log(LogEntry),
}

impl Action {
    /// The member this action concerns.
    #[must_use]
    pub const fn user(&self) -> UserId {
        match self {
            Self::Welcome { user, .. }
            | Self::Warn { user, .. }
            | Self::Jail { user, .. }
            | Self::JailNotice { user, .. }
            | Self::Release { user, .. }
            | Self::StartPhase2 { user, .. }
            | Self::Congratulate { user } => *user,
            Self::Log(entry) => entry.user(),
        }
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Warn { .. } => "warn",
            Self::Jail { .. } => "jail",
            Self::JailNotice { .. } => "jail_notice",
            Self::Release { .. } => "release",
            Self::StartPhase2 { .. } => "start_phase2",
            Self::Congratulate { .. } => "congratulate",
            Self::Log(_) => "log",
        }
    }
}

/// A moderation log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Phase 1 assigned to a new member.
    Joined {
        /// The member.
        user: UserId,
        /// Phase 1 deadline.
        deadline: DateTime<Utc>,
    },
    /// A tracked member left the community.
    Departed {
        /// The member.
        user: UserId,
    },
    /// A phase deadline passed, or a moderator jailed the member.
    Jailed {
        /// The member.
        user: UserId,
        /// Phase failed.
        phase: Phase,
    },
    /// A jailed member was given another chance.
    Released {
        /// The member.
        user: UserId,
        /// Phase re-armed.
        phase: Phase,
    },
    /// Phase 1 completed, phase 2 started.
    AdvancedToPhase2 {
        /// The member.
        user: UserId,
    },
    /// Both phases completed.
    Completed {
        /// The member.
        user: UserId,
    },
}

impl LogEntry {
    /// The member this entry concerns.
    #[must_use]
    pub const fn user(&self) -> UserId {
        match self {
            Self::Joined { user, .. }
            | Self::Departed { user }
            | Self::Jailed { user, .. }
            | Self::Released { user, .. }
            | Self::AdvancedToPhase2 { user }
            | Self::Completed { user } => *user,
        }
    }
}
