//! Per-user phase record and its on-disk shape.
//!
//! Field names on disk follow the bot's historical data file
//! (`first_bomb_end`, `second_bomb_active`, ...) so existing snapshots load
//! unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PhaseError;

// ============================================================================
// Phase
// ============================================================================

/// One of the two sequential onboarding stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Phase {
    /// The 3-day introduction stage.
    First,
    /// The 14-day participation stage.
    Second,
}

impl Phase {
    /// Returns the 1-based phase number.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

impl TryFrom<u8> for Phase {
    type Error = PhaseError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            other => Err(PhaseError::InvalidPhase(other)),
        }
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase.number()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

// ============================================================================
// WarningKey
// ============================================================================

/// Identifies one warning window. A key present in
/// [`PhaseRecord::warnings_sent`] means that warning is never sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WarningKey {
    /// Phase 1, roughly 24 hours left.
    #[serde(rename = "first_24h")]
    First24h,
    /// Phase 1, roughly 12 hours left.
    #[serde(rename = "first_12h")]
    First12h,
    /// Phase 2, roughly 7 days left.
    #[serde(rename = "second_7d")]
    Second7d,
    /// Phase 2, roughly 3 days left.
    #[serde(rename = "second_3d")]
    Second3d,
    /// Phase 2, roughly 24 hours left.
    #[serde(rename = "second_24h")]
    Second24h,
}

impl WarningKey {
    /// The phase this warning belongs to.
    #[must_use]
    pub const fn phase(self) -> Phase {
        match self {
            Self::First24h | Self::First12h => Phase::First,
            Self::Second7d | Self::Second3d | Self::Second24h => Phase::Second,
        }
    }

    /// The key as written to the data file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::First24h => "first_24h",
            Self::First12h => "first_12h",
            Self::Second7d => "second_7d",
            Self::Second3d => "second_3d",
            Self::Second24h => "second_24h",
        }
    }
}

impl fmt::Display for WarningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PhaseRecord
// ============================================================================

/// Tracked onboarding state for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// When tracking started. Never mutated after creation.
    #[serde(rename = "join_date", deserialize_with = "lenient_timestamp")]
    pub join_time: DateTime<Utc>,

    /// Phase 1 deadline, present while phase 1 is live.
    #[serde(
        rename = "first_bomb_end",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_optional_timestamp"
    )]
    pub phase1_deadline: Option<DateTime<Utc>>,

    /// Set once when the phase 1 deadline passes.
    #[serde(rename = "first_bomb_failed", default, skip_serializing_if = "is_false")]
    pub phase1_failed: bool,

    /// Whether phase 2 has started.
    #[serde(rename = "second_bomb_active", default)]
    pub phase2_active: bool,

    /// Phase 2 deadline, present while phase 2 is live.
    #[serde(
        rename = "second_bomb_end",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_optional_timestamp"
    )]
    pub phase2_deadline: Option<DateTime<Utc>>,

    /// Set once when the phase 2 deadline passes.
    #[serde(rename = "second_bomb_failed", default, skip_serializing_if = "is_false")]
    pub phase2_failed: bool,

    /// Warnings already delivered (or attempted), with the time they fired.
    #[serde(default, deserialize_with = "lenient_timestamp_map")]
    pub warnings_sent: BTreeMap<WarningKey, DateTime<Utc>>,
}

/// The live state of a record, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    /// Phase 1 running.
    Phase1Active,
    /// Phase 1 deadline passed; user is jailed.
    Phase1Failed,
    /// Phase 2 running.
    Phase2Active,
    /// Phase 2 deadline passed; user is jailed.
    Phase2Failed,
    /// Record retained but no phase is live (timers removed by an admin).
    Idle,
}

impl PhaseStatus {
    /// Stable label for display and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Phase1Active => "phase1_active",
            Self::Phase1Failed => "phase1_failed",
            Self::Phase2Active => "phase2_active",
            Self::Phase2Failed => "phase2_failed",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PhaseRecord {
    /// A fresh phase 1 record starting at `now`.
    #[must_use]
    pub fn phase1(now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            join_time: now,
            phase1_deadline: Some(now + length),
            phase1_failed: false,
            phase2_active: false,
            phase2_deadline: None,
            phase2_failed: false,
            warnings_sent: BTreeMap::new(),
        }
    }

    /// A fresh phase 2 record starting at `now`, with no phase 1 fields.
    #[must_use]
    pub fn phase2(now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            join_time: now,
            phase1_deadline: None,
            phase1_failed: false,
            phase2_active: true,
            phase2_deadline: Some(now + length),
            phase2_failed: false,
            warnings_sent: BTreeMap::new(),
        }
    }

    /// Derives the live phase. Phase 2 takes precedence when both deadline
    /// fields are present.
    #[must_use]
    pub const fn status(&self) -> PhaseStatus {
        if self.phase2_active {
            if self.phase2_failed {
                PhaseStatus::Phase2Failed
            } else {
                PhaseStatus::Phase2Active
            }
        } else if self.phase1_deadline.is_some() {
            if self.phase1_failed {
                PhaseStatus::Phase1Failed
            } else {
                PhaseStatus::Phase1Active
            }
        } else {
            PhaseStatus::Idle
        }
    }

    /// Deadline of the given phase, if that phase is armed.
    #[must_use]
    pub const fn deadline(&self, phase: Phase) -> Option<DateTime<Utc>> {
        match phase {
            Phase::First => self.phase1_deadline,
            Phase::Second => {
                if self.phase2_active {
                    self.phase2_deadline
                } else {
                    None
                }
            }
        }
    }

    /// Whether the given phase has been marked failed.
    #[must_use]
    pub const fn failed(&self, phase: Phase) -> bool {
        match phase {
            Phase::First => self.phase1_failed,
            Phase::Second => self.phase2_failed,
        }
    }

    /// Time left on the given phase, `None` when unarmed or already expired.
    #[must_use]
    pub fn remaining(&self, phase: Phase, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline(phase)
            .map(|deadline| deadline - now)
            .filter(|left| *left > Duration::zero())
    }

    /// Whether the warning has already been recorded.
    #[must_use]
    pub fn warned(&self, key: WarningKey) -> bool {
        self.warnings_sent.contains_key(&key)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

// ============================================================================
// Lenient timestamp parsing
// ============================================================================

/// Parses RFC 3339, falling back to the naive ISO-8601 form
/// (`2024-05-01T12:00:00.123456`) interpreted as UTC.
///
/// # Errors
///
/// Returns the RFC 3339 parse error when neither form matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|err| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| err)
        })
}

struct LenientTimestamp(DateTime<Utc>);

impl<'de> Deserialize<'de> for LenientTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .map(LenientTimestamp)
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    LenientTimestamp::deserialize(d).map(|t| t.0)
}

fn lenient_optional_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Option::<LenientTimestamp>::deserialize(d).map(|t| t.map(|t| t.0))
}

fn lenient_timestamp_map<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<WarningKey, DateTime<Utc>>, D::Error> {
    BTreeMap::<WarningKey, LenientTimestamp>::deserialize(d)
        .map(|m| m.into_iter().map(|(k, v)| (k, v.0)).collect())
}
