//! Rendering of member notices and moderation log lines.
//!
//! Every outgoing message is a Discord embed. The texts live here so the
//! dispatcher only decides *who* receives *what*.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::ids::UserId;
use crate::phase::{LogEntry, Phase, WarningKey};

// ============================================================================
// Embed
// ============================================================================

/// Embed accent colors.
pub mod color {
    /// Informational notices.
    pub const BLUE: u32 = 0x3498_DB;
    /// Success.
    pub const GREEN: u32 = 0x2ECC_71;
    /// Early warnings.
    pub const YELLOW: u32 = 0xFEE7_5C;
    /// Urgent warnings.
    pub const ORANGE: u32 = 0xE67E_22;
    /// Failures and departures.
    pub const RED: u32 = 0xE74C_3C;
    /// Completion.
    pub const GOLD: u32 = 0xF1C4_0F;
}

/// A rich message as accepted by the Discord REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    /// Heading line.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Accent color (`0xRRGGBB`).
    pub color: u32,
    /// Name/value pairs shown under the body.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    /// Small print at the bottom.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

/// One name/value pair of an [`Embed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    /// Field label.
    pub name: String,
    /// Field content.
    pub value: String,
    /// Render side by side with neighbouring inline fields.
    pub inline: bool,
}

/// Footer of an [`Embed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    /// Footer text.
    pub text: String,
}

impl Embed {
    fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            fields: Vec::new(),
            footer: None,
        }
    }

    fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }

    fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }
}

// ============================================================================
// Time formatting
// ============================================================================

/// Formats a remaining duration as `"2d 4h"`, `"3h 12m"` or `"45m"`.
///
/// Returns `None` for durations that are zero or negative.
#[must_use]
pub fn format_remaining(left: Duration) -> Option<String> {
    if left <= Duration::zero() {
        return None;
    }
    let days = left.num_days();
    let hours = left.num_hours() % 24;
    let minutes = left.num_minutes() % 60;

    Some(if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    })
}

/// Formats a deadline for display in embeds.
#[must_use]
pub fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn mention(user: UserId) -> String {
    format!("<@{user}>")
}

fn days(length: Duration) -> String {
    let n = length.num_days();
    if n == 1 {
        "1 day".to_string()
    } else if n > 1 {
        format!("{n} days")
    } else {
        format_remaining(length).unwrap_or_else(|| "0m".to_string())
    }
}

// ============================================================================
// Requirements
// ============================================================================

const PHASE1_REQUIREMENTS: &str = "1️⃣ Create an Instagram account following our course rules\n\
     2️⃣ Verify your account by opening a ticket\n\
     3️⃣ Introduce yourself in general chat";

const PHASE2_REQUIREMENTS: &str = "1️⃣ Get three posts approved\n\
     2️⃣ Send at least 10 messages in general chat\n\
     3️⃣ Spend at least 30 minutes in voice calls";

const fn requirements(phase: Phase) -> &'static str {
    match phase {
        Phase::First => PHASE1_REQUIREMENTS,
        Phase::Second => PHASE2_REQUIREMENTS,
    }
}

const fn ordinal(phase: Phase) -> &'static str {
    match phase {
        Phase::First => "First",
        Phase::Second => "Second",
    }
}

// ============================================================================
// Member notices
// ============================================================================

/// Greeting for a new member entering phase 1.
#[must_use]
pub fn welcome(started: DateTime<Utc>, deadline: DateTime<Utc>) -> Embed {
    let length = days(deadline - started);
    Embed::new(
        "🎯 Welcome to Your First TimeBomb!",
        format!(
            "Welcome to our community! You're now on your first TimeBomb challenge.\n\n\
             ⏰ You have {length} to complete these requirements:\n\n\
             {PHASE1_REQUIREMENTS}\n\n\
             ⚠️ Important: Failing to complete these requirements within {length} \
             will result in being moved to jail until requirements are met."
        ),
        color::BLUE,
    )
    .footer(format!("Time started: {}", format_deadline(started)))
}

/// Reminder that a deadline is approaching.
#[must_use]
pub fn warning(key: WarningKey, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Embed {
    let (label, lead, accent) = match key {
        WarningKey::First24h => ("24 Hours", "You have 24 hours left", color::YELLOW),
        WarningKey::First12h => ("12 Hours", "⚠️ URGENT: Only 12 hours left", color::ORANGE),
        WarningKey::Second7d => ("7 Days", "You have 7 days left", color::YELLOW),
        WarningKey::Second3d => ("3 Days", "⚠️ Only 3 days left", color::ORANGE),
        WarningKey::Second24h => ("24 Hours", "⚠️ URGENT: Only 24 hours left", color::RED),
    };
    let phase = key.phase();
    let remaining = format_remaining(deadline - now).unwrap_or_else(|| "0m".to_string());

    Embed::new(
        format!("⚠️ {} Challenge - {label} Remaining", ordinal(phase)),
        format!(
            "{lead} to complete your {} challenge!\n\nRequirements:\n{}\n\n\
             ⚠️ If you don't complete these in time, you'll be moved to jail!",
            ordinal(phase).to_lowercase(),
            requirements(phase),
        ),
        accent,
    )
    .field("Time Remaining", remaining)
    .field("Deadline", format_deadline(deadline))
}

/// Failure notice sent when a member is jailed, by the sweep or by hand.
#[must_use]
pub fn jailed(phase: Phase) -> Embed {
    Embed::new(
        format!("⚠️ {} Challenge Failed", ordinal(phase)),
        format!(
            "You've been placed in jail for not completing the {} phase requirements in time.\n\n\
             To get out of jail:\n\
             1️⃣ Contact an admin\n\
             2️⃣ Explain why you couldn't complete the tasks\n\
             3️⃣ Show that you're ready to complete them\n\n\
             An admin will review your case and may give you another chance.",
            ordinal(phase).to_lowercase()
        ),
        color::RED,
    )
}

/// Notice that a jailed member was given another chance.
#[must_use]
pub fn released(phase: Phase, deadline: DateTime<Utc>) -> Embed {
    Embed::new(
        "🔓 Released from Jail",
        format!(
            "You've been given another chance. Make sure to complete the requirements this time!\n\n\
             {}",
            requirements(phase)
        ),
        color::GREEN,
    )
    .field("New Deadline", format_deadline(deadline))
}

/// Phase 1 completed, phase 2 started.
#[must_use]
pub fn phase2_started(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Embed {
    let length = days(deadline - now);
    Embed::new(
        "🎯 First Challenge Complete & Second Challenge Started!",
        format!(
            "🎉 Congratulations! You've completed the first challenge!\n\n\
             🚀 Your second challenge has now begun:\n\n\
             You have {length} to complete:\n\
             {PHASE2_REQUIREMENTS}\n\n\
             ⚠️ Important: Failing to complete these requirements within {length} \
             will result in being moved to jail until requirements are met."
        ),
        color::GREEN,
    )
    .field("Deadline", format_deadline(deadline))
}

/// Both phases completed.
#[must_use]
pub fn congratulations() -> Embed {
    Embed::new(
        "🎉 Congratulations - All Challenges Complete!",
        "You've successfully completed all challenges!\n\
         Welcome to the full community! 🌟\n\n\
         You are now a full member with access to all features.",
        color::GOLD,
    )
}

// ============================================================================
// Log lines
// ============================================================================

/// Moderation log embed for an entry.
#[must_use]
pub fn log_line(entry: &LogEntry) -> Embed {
    match entry {
        LogEntry::Joined { user, deadline } => Embed::new(
            "TimeBomb Assigned",
            format!("First TimeBomb assigned to {}", mention(*user)),
            color::BLUE,
        )
        .field("End Time", format_deadline(*deadline)),
        LogEntry::Departed { user } => Embed::new(
            "Member Left During TimeBomb",
            format!("{} left the server during their TimeBomb period", mention(*user)),
            color::RED,
        ),
        LogEntry::Jailed { user, phase } => Embed::new(
            "TimeBomb Failed",
            format!("{} has been jailed for phase {phase}", mention(*user)),
            color::RED,
        ),
        LogEntry::Released { user, phase } => Embed::new(
            "User Released from Jail",
            format!("{} has been released from phase {phase} jail", mention(*user)),
            color::GREEN,
        ),
        LogEntry::AdvancedToPhase2 { user } => Embed::new(
            "First Phase Completed",
            format!("{} has completed the first TimeBomb phase", mention(*user)),
            color::GREEN,
        ),
        LogEntry::Completed { user } => Embed::new(
            "All Phases Completed",
            format!("{} has completed all TimeBomb phases", mention(*user)),
            color::GOLD,
        ),
    }
}
