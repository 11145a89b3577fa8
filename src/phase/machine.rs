//! Phase state machine.
//!
//! Every function here is pure: it takes a record (or its absence) and the
//! current time, and returns the next record together with the [`Action`]s
//! the caller must apply. Nothing in this module performs I/O, so the whole
//! lifecycle is testable without a platform connection.
//!
//! # Lifecycle
//!
//! ```text
//! join ─► Phase1Active ──deadline──► Phase1Failed ──release──► Phase1Active
//!              │
//!              └─first success role─► Phase2Active ──deadline──► Phase2Failed
//!                                         │                           │
//!                                         │◄──────────release─────────┘
//!                                         └─second success role─► (record deleted)
//! ```

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::schema::{MAX_TIMER_LENGTH, RoleConfig, TimerConfig};
use crate::error::PhaseError;
use crate::ids::UserId;
use crate::platform::Member;

use super::action::{Action, LogEntry};
use super::record::{Phase, PhaseRecord, WarningKey};

// ============================================================================
// Warning windows
// ============================================================================

/// A warning fires while the hours left on the deadline fall inside
/// `[min_hours, max_hours]` and its key is still unset.
#[derive(Debug, Clone, Copy)]
struct Window {
    key: WarningKey,
    min_hours: f64,
    max_hours: f64,
}

impl Window {
    const fn hours(key: WarningKey, min_hours: f64, max_hours: f64) -> Self {
        Self {
            key,
            min_hours,
            max_hours,
        }
    }

    const fn days(key: WarningKey, min_days: f64, max_days: f64) -> Self {
        Self::hours(key, min_days * 24.0, max_days * 24.0)
    }

    fn contains(&self, hours_left: f64) -> bool {
        (self.min_hours..=self.max_hours).contains(&hours_left)
    }
}

/// Phase 1 windows in priority order.
const PHASE1_WINDOWS: [Window; 2] = [
    Window::hours(WarningKey::First24h, 23.0, 25.0),
    Window::hours(WarningKey::First12h, 11.0, 13.0),
];

/// Phase 2 windows in priority order.
const PHASE2_WINDOWS: [Window; 3] = [
    Window::days(WarningKey::Second7d, 6.5, 7.5),
    Window::days(WarningKey::Second3d, 2.5, 3.5),
    Window::hours(WarningKey::Second24h, 23.0, 25.0),
];

fn capped(length: std::time::Duration) -> Duration {
    Duration::from_std(length.min(MAX_TIMER_LENGTH)).unwrap_or(Duration::zero())
}

#[allow(clippy::cast_precision_loss)]
fn hours_left(deadline: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (deadline - now).num_milliseconds() as f64 / 3_600_000.0
}

/// Returns the first window (in priority order) that contains the time left
/// and has not fired yet. Only one warning per phase per evaluation.
#[must_use]
pub fn due_warning(
    record: &PhaseRecord,
    phase: Phase,
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<WarningKey> {
    let windows: &[Window] = match phase {
        Phase::First => &PHASE1_WINDOWS,
        Phase::Second => &PHASE2_WINDOWS,
    };
    let left = hours_left(deadline, now);
    windows
        .iter()
        .find(|w| w.contains(left) && !record.warned(w.key))
        .map(|w| w.key)
}

// ============================================================================
// Evaluation
// ============================================================================

/// Result of a state machine step: the next record and the effects to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The record after the step.
    pub record: PhaseRecord,
    /// Effects to apply, in order.
    pub actions: Vec<Action>,
}

impl Evaluation {
    fn unchanged(record: &PhaseRecord) -> Self {
        Self {
            record: record.clone(),
            actions: Vec::new(),
        }
    }

    /// Whether the step changed the record.
    #[must_use]
    pub fn changed_from(&self, before: &PhaseRecord) -> bool {
        self.record != *before
    }
}

/// What resync decided for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// Store this record, replacing any existing one.
    Track(PhaseRecord),
    /// The member is done; drop any record.
    Untrack,
    /// Leave whatever is stored as is.
    Keep,
}

// ============================================================================
// PhaseMachine
// ============================================================================

/// Phase state machine parameterized by the configured phase lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMachine {
    first_phase: Duration,
    second_phase: Duration,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new(&TimerConfig::default())
    }
}

impl PhaseMachine {
    /// Builds a machine from the timer configuration.
    ///
    /// Lengths are capped at [`MAX_TIMER_LENGTH`], the same bound
    /// validation enforces, so `now + length` cannot overflow.
    #[must_use]
    pub fn new(timers: &TimerConfig) -> Self {
        Self {
            first_phase: capped(timers.first_phase),
            second_phase: capped(timers.second_phase),
        }
    }

    /// Length of the given phase.
    #[must_use]
    pub const fn length(&self, phase: Phase) -> Duration {
        match phase {
            Phase::First => self.first_phase,
            Phase::Second => self.second_phase,
        }
    }

    /// Periodic evaluation of one record.
    ///
    /// For each live, non-failed phase: record at most one due warning, then
    /// mark the phase failed and request a jail if the deadline has passed.
    /// An overdue deadline is handled the same however late the sweep runs,
    /// and windows skipped while the sweep was not running are never
    /// backfilled.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::MalformedRecord`] when phase 2 is active without
    /// a deadline.
    pub fn evaluate(
        &self,
        user: UserId,
        record: &PhaseRecord,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, PhaseError> {
        if record.phase2_active && record.phase2_deadline.is_none() {
            return Err(PhaseError::MalformedRecord {
                user,
                reason: "phase 2 active without a deadline".to_string(),
            });
        }

        let mut next = record.clone();
        let mut actions = Vec::new();

        for phase in [Phase::First, Phase::Second] {
            let Some(deadline) = next.deadline(phase) else {
                continue;
            };
            if next.failed(phase) {
                continue;
            }

            if let Some(key) = due_warning(&next, phase, deadline, now) {
                // Recorded before delivery: a failed DM is not retried.
                next.warnings_sent.insert(key, now);
                actions.push(Action::Warn {
                    user,
                    key,
                    deadline,
                });
            }

            if now > deadline {
                debug!(%user, %phase, %deadline, "deadline exceeded");
                match phase {
                    Phase::First => next.phase1_failed = true,
                    Phase::Second => next.phase2_failed = true,
                }
                actions.push(Action::Jail { user, phase });
                actions.push(Action::Log(LogEntry::Jailed { user, phase }));
            }
        }

        Ok(Evaluation {
            record: next,
            actions,
        })
    }

    /// A new member joined: start phase 1.
    #[must_use]
    pub fn join(&self, user: UserId, now: DateTime<Utc>) -> Evaluation {
        let record = PhaseRecord::phase1(now, self.first_phase);
        let deadline = now + self.first_phase;
        Evaluation {
            record,
            actions: vec![
                Action::Welcome { user, deadline },
                Action::Log(LogEntry::Joined { user, deadline }),
            ],
        }
    }

    /// The first-success role was granted: close phase 1 and start phase 2.
    ///
    /// Phase 1 warning keys are kept for audit. A member already in phase 2
    /// is left untouched; an untracked member gets a fresh phase 2 record.
    #[must_use]
    pub fn advance_to_phase2(
        &self,
        user: UserId,
        existing: Option<&PhaseRecord>,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let deadline = now + self.second_phase;
        let record = match existing {
            Some(record) if record.phase2_active => return Evaluation::unchanged(record),
            Some(record) => {
                let mut next = record.clone();
                next.phase1_deadline = None;
                next.phase1_failed = false;
                next.phase2_active = true;
                next.phase2_deadline = Some(deadline);
                next.phase2_failed = false;
                next
            }
            None => PhaseRecord::phase2(now, self.second_phase),
        };

        Evaluation {
            record,
            actions: vec![
                Action::StartPhase2 { user, deadline },
                Action::Log(LogEntry::AdvancedToPhase2 { user }),
            ],
        }
    }

    /// The second-success role was granted. The caller deletes the record.
    ///
    /// Untracked members produce no actions.
    #[must_use]
    pub fn complete(&self, user: UserId, existing: Option<&PhaseRecord>) -> Vec<Action> {
        existing.map_or_else(Vec::new, |_| {
            vec![
                Action::Congratulate { user },
                Action::Log(LogEntry::Completed { user }),
            ]
        })
    }

    /// A tracked member left. The caller deletes the record.
    #[must_use]
    pub fn depart(&self, user: UserId, existing: Option<&PhaseRecord>) -> Vec<Action> {
        existing.map_or_else(Vec::new, |_| vec![Action::Log(LogEntry::Departed { user })])
    }

    /// Release a jailed member: re-arm the phase with a fresh deadline.
    ///
    /// Warning keys are kept. A phase that is not failed is left untouched.
    #[must_use]
    pub fn release(
        &self,
        user: UserId,
        record: &PhaseRecord,
        phase: Phase,
        now: DateTime<Utc>,
    ) -> Evaluation {
        if !record.failed(phase) {
            return Evaluation::unchanged(record);
        }

        let deadline = now + self.length(phase);
        let mut next = record.clone();
        match phase {
            Phase::First => {
                next.phase1_deadline = Some(deadline);
                next.phase1_failed = false;
            }
            Phase::Second => {
                next.phase2_active = true;
                next.phase2_deadline = Some(deadline);
                next.phase2_failed = false;
            }
        }

        Evaluation {
            record: next,
            actions: vec![
                Action::Release {
                    user,
                    phase,
                    deadline,
                },
                Action::Log(LogEntry::Released { user, phase }),
            ],
        }
    }

    /// A moderator applied a jail role by hand.
    ///
    /// Marks the phase failed so the sweep does not jail again. When the
    /// phase is already failed (the sweep applied the role) or not armed,
    /// nothing happens.
    #[must_use]
    pub fn manual_jail(&self, user: UserId, record: &PhaseRecord, phase: Phase) -> Evaluation {
        if record.deadline(phase).is_none() || record.failed(phase) {
            return Evaluation::unchanged(record);
        }

        let mut next = record.clone();
        match phase {
            Phase::First => next.phase1_failed = true,
            Phase::Second => next.phase2_failed = true,
        }

        Evaluation {
            record: next,
            actions: vec![
                Action::JailNotice { user, phase },
                Action::Log(LogEntry::Jailed { user, phase }),
            ],
        }
    }

    /// Admin removal of one phase's timer. The record itself is retained.
    #[must_use]
    pub fn remove_timer(&self, record: &PhaseRecord, phase: Phase) -> PhaseRecord {
        let mut next = record.clone();
        match phase {
            Phase::First => {
                next.phase1_deadline = None;
                next.phase1_failed = false;
            }
            Phase::Second => {
                next.phase2_active = false;
                next.phase2_deadline = None;
                next.phase2_failed = false;
            }
        }
        next
    }

    /// Decides a member's record from their current roles.
    ///
    /// - bots are kept as they are (never tracked by join either)
    /// - second-success holders are done
    /// - jail-role holders are kept as they are
    /// - first-success holders get a fresh phase 2 with no phase 1 fields
    /// - everyone else gets a fresh phase 1
    ///
    /// Re-armed records keep the original join time and start with an empty
    /// warning history.
    #[must_use]
    pub fn resync(
        &self,
        member: &Member,
        existing: Option<&PhaseRecord>,
        roles: &RoleConfig,
        now: DateTime<Utc>,
    ) -> ResyncOutcome {
        if member.bot {
            return ResyncOutcome::Keep;
        }
        if member.has_role(roles.second_success) {
            return ResyncOutcome::Untrack;
        }
        if member.has_role(roles.first_jail) || member.has_role(roles.second_jail) {
            return ResyncOutcome::Keep;
        }

        let mut record = if member.has_role(roles.first_success) {
            PhaseRecord::phase2(now, self.second_phase)
        } else {
            PhaseRecord::phase1(now, self.first_phase)
        };
        if let Some(previous) = existing {
            record.join_time = previous.join_time;
        }
        ResyncOutcome::Track(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RoleId;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn user() -> UserId {
        UserId::new(1001)
    }

    fn machine() -> PhaseMachine {
        PhaseMachine::default()
    }

    fn roles() -> RoleConfig {
        RoleConfig {
            first_success: RoleId::new(11),
            second_success: RoleId::new(12),
            first_jail: RoleId::new(13),
            second_jail: RoleId::new(14),
            starter: Some(RoleId::new(15)),
        }
    }

    fn member(id: u64, roles: &[u64]) -> Member {
        Member {
            user: UserId::new(id),
            roles: roles.iter().copied().map(RoleId::new).collect(),
            bot: false,
        }
    }

    fn phase1_with_left(left: Duration) -> (PhaseRecord, DateTime<Utc>) {
        let record = PhaseRecord::phase1(t0(), Duration::days(3));
        let now = record.phase1_deadline.unwrap() - left;
        (record, now)
    }

    fn phase2_with_left(left: Duration) -> (PhaseRecord, DateTime<Utc>) {
        let record = PhaseRecord::phase2(t0(), Duration::days(14));
        let now = record.phase2_deadline.unwrap() - left;
        (record, now)
    }

    fn warnings(actions: &[Action]) -> Vec<WarningKey> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Warn { key, .. } => Some(*key),
                _ => None,
            })
            .collect()
    }

    fn jails(actions: &[Action]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, Action::Jail { .. }))
            .count()
    }

    // ------------------------------------------------------------------
    // Deadlines
    // ------------------------------------------------------------------

    #[test]
    fn test_phase1_overdue_jails_once() {
        let (record, _) = phase1_with_left(Duration::zero());
        let now = record.phase1_deadline.unwrap() + Duration::seconds(1);

        let first = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(jails(&first.actions), 1);
        assert!(first.actions.contains(&Action::Jail {
            user: user(),
            phase: Phase::First
        }));
        assert!(first.record.phase1_failed);

        let second = machine().evaluate(user(), &first.record, now).unwrap();
        assert!(second.actions.is_empty());
        assert_eq!(second.record, first.record);
    }

    #[test]
    fn test_deadline_exactly_now_is_not_overdue() {
        let (record, now) = phase1_with_left(Duration::zero());
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(jails(&eval.actions), 0);
        assert!(!eval.record.phase1_failed);
    }

    #[test]
    fn test_long_overdue_same_as_barely_overdue() {
        let (record, _) = phase1_with_left(Duration::zero());
        let now = record.phase1_deadline.unwrap() + Duration::days(30);
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(jails(&eval.actions), 1);
        assert!(warnings(&eval.actions).is_empty());
    }

    #[test]
    fn test_phase2_overdue_jails() {
        let (record, _) = phase2_with_left(Duration::zero());
        let now = record.phase2_deadline.unwrap() + Duration::hours(1);
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert!(eval.actions.contains(&Action::Jail {
            user: user(),
            phase: Phase::Second
        }));
        assert!(eval.actions.contains(&Action::Log(LogEntry::Jailed {
            user: user(),
            phase: Phase::Second
        })));
        assert!(eval.record.phase2_failed);
    }

    #[test]
    fn test_failed_phase_gets_no_warnings() {
        let (mut record, now) = phase1_with_left(Duration::hours(24));
        record.phase1_failed = true;
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert!(eval.actions.is_empty());
    }

    #[test]
    fn test_malformed_phase2_record() {
        let mut record = PhaseRecord::phase2(t0(), Duration::days(14));
        record.phase2_deadline = None;
        let err = machine().evaluate(user(), &record, t0()).unwrap_err();
        assert!(matches!(err, PhaseError::MalformedRecord { .. }));
    }

    #[test]
    fn test_idle_record_produces_nothing() {
        let record = machine().remove_timer(
            &PhaseRecord::phase1(t0(), Duration::days(3)),
            Phase::First,
        );
        let eval = machine()
            .evaluate(user(), &record, t0() + Duration::days(10))
            .unwrap();
        assert!(eval.actions.is_empty());
    }

    // ------------------------------------------------------------------
    // Warnings
    // ------------------------------------------------------------------

    #[test]
    fn test_first_24h_warning() {
        let (record, now) = phase1_with_left(Duration::hours(24));
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(warnings(&eval.actions), vec![WarningKey::First24h]);
        assert_eq!(eval.record.warnings_sent[&WarningKey::First24h], now);
    }

    #[test]
    fn test_first_12h_warning() {
        let (record, now) = phase1_with_left(Duration::hours(12));
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(warnings(&eval.actions), vec![WarningKey::First12h]);
    }

    #[test]
    fn test_no_warning_between_windows() {
        let (record, now) = phase1_with_left(Duration::hours(18));
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert!(eval.actions.is_empty());
    }

    #[test]
    fn test_warning_not_resent() {
        let (record, now) = phase1_with_left(Duration::hours(24));
        let first = machine().evaluate(user(), &record, now).unwrap();
        let second = machine().evaluate(user(), &first.record, now).unwrap();
        assert!(warnings(&second.actions).is_empty());
        assert_eq!(second.record.warnings_sent, first.record.warnings_sent);
    }

    #[test]
    fn test_phase2_windows() {
        for (left, expected) in [
            (Duration::days(7), WarningKey::Second7d),
            (Duration::days(3), WarningKey::Second3d),
            (Duration::hours(24), WarningKey::Second24h),
        ] {
            let (record, now) = phase2_with_left(left);
            let eval = machine().evaluate(user(), &record, now).unwrap();
            assert_eq!(warnings(&eval.actions), vec![expected], "left = {left}");
        }
    }

    #[test]
    fn test_window_boundaries_inclusive() {
        let (record, now) = phase2_with_left(Duration::hours(180));
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(warnings(&eval.actions), vec![WarningKey::Second7d]);

        let (record, now) = phase2_with_left(Duration::hours(156));
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(warnings(&eval.actions), vec![WarningKey::Second7d]);

        let (record, now) = phase1_with_left(Duration::hours(23));
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(warnings(&eval.actions), vec![WarningKey::First24h]);
    }

    #[test]
    fn test_skipped_window_not_backfilled() {
        // Sweep never ran during the 7d window; at 3d only 3d fires.
        let (record, now) = phase2_with_left(Duration::days(3));
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(warnings(&eval.actions), vec![WarningKey::Second3d]);
        assert!(!eval.record.warned(WarningKey::Second7d));
    }

    #[test]
    fn test_warning_then_jail_same_tick_never_both_for_phase() {
        // A deadline in the past is outside every window.
        let (record, _) = phase1_with_left(Duration::zero());
        let now = record.phase1_deadline.unwrap() + Duration::minutes(1);
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert!(warnings(&eval.actions).is_empty());
        assert_eq!(jails(&eval.actions), 1);
    }

    #[test]
    fn test_both_deadlines_present_during_transition() {
        let mut record = PhaseRecord::phase1(t0(), Duration::days(3));
        record.phase2_active = true;
        record.phase2_deadline = Some(t0() + Duration::days(14));
        let now = t0() + Duration::days(3) + Duration::hours(1);
        let eval = machine().evaluate(user(), &record, now).unwrap();
        assert_eq!(jails(&eval.actions), 1);
        assert!(eval.record.phase1_failed);
        assert!(!eval.record.phase2_failed);
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_idempotent_at_fixed_time(minutes_left in -10_000i64..30_000) {
            let record = PhaseRecord::phase2(t0(), Duration::days(14));
            let now = record.phase2_deadline.unwrap() - Duration::minutes(minutes_left);
            let first = machine().evaluate(user(), &record, now).unwrap();
            let second = machine().evaluate(user(), &first.record, now).unwrap();
            prop_assert!(second.actions.is_empty());
            prop_assert_eq!(second.record, first.record);
        }

        #[test]
        fn prop_at_most_one_warning_per_phase(minutes_left in -100i64..5_000) {
            let (record, now) = phase1_with_left(Duration::minutes(minutes_left));
            let eval = machine().evaluate(user(), &record, now).unwrap();
            prop_assert!(warnings(&eval.actions).len() <= 1);
        }
    }

    // ------------------------------------------------------------------
    // External transitions
    // ------------------------------------------------------------------

    #[test]
    fn test_join_starts_phase1() {
        let eval = machine().join(user(), t0());
        assert_eq!(eval.record.phase1_deadline, Some(t0() + Duration::days(3)));
        assert_eq!(eval.actions.len(), 2);
        assert!(matches!(eval.actions[0], Action::Welcome { .. }));
    }

    #[test]
    fn test_oversized_lengths_are_capped() {
        let timers = TimerConfig {
            first_phase: std::time::Duration::from_secs(9_467_280_000_000),
            second_phase: std::time::Duration::MAX,
            ..TimerConfig::default()
        };
        let machine = PhaseMachine::new(&timers);
        let cap = Duration::from_std(MAX_TIMER_LENGTH).unwrap();
        assert_eq!(machine.length(Phase::First), cap);

        let eval = machine.join(user(), t0());
        assert_eq!(eval.record.phase1_deadline, Some(t0() + cap));
        let eval = machine.advance_to_phase2(user(), Some(&eval.record), t0());
        assert_eq!(eval.record.phase2_deadline, Some(t0() + cap));
    }

    #[test]
    fn test_advance_keeps_phase1_warnings() {
        let (record, now) = phase1_with_left(Duration::hours(24));
        let warned = machine().evaluate(user(), &record, now).unwrap().record;
        let eval = machine().advance_to_phase2(user(), Some(&warned), now);
        assert!(eval.record.phase1_deadline.is_none());
        assert!(eval.record.phase2_active);
        assert_eq!(eval.record.phase2_deadline, Some(now + Duration::days(14)));
        assert!(eval.record.warned(WarningKey::First24h));
        assert_eq!(eval.record.join_time, record.join_time);
        assert!(eval.actions.contains(&Action::StartPhase2 {
            user: user(),
            deadline: now + Duration::days(14)
        }));
    }

    #[test]
    fn test_advance_clears_phase1_failure() {
        let mut record = PhaseRecord::phase1(t0(), Duration::days(3));
        record.phase1_failed = true;
        let eval = machine().advance_to_phase2(user(), Some(&record), t0());
        assert!(!eval.record.phase1_failed);
    }

    #[test]
    fn test_advance_untracked_creates_phase2() {
        let eval = machine().advance_to_phase2(user(), None, t0());
        assert_eq!(eval.record, PhaseRecord::phase2(t0(), Duration::days(14)));
    }

    #[test]
    fn test_advance_already_phase2_is_noop() {
        let record = PhaseRecord::phase2(t0(), Duration::days(14));
        let eval = machine().advance_to_phase2(user(), Some(&record), t0() + Duration::days(1));
        assert!(eval.actions.is_empty());
        assert_eq!(eval.record, record);
    }

    #[test]
    fn test_complete_emits_congratulate_once() {
        let record = PhaseRecord::phase2(t0(), Duration::days(14));
        let actions = machine().complete(user(), Some(&record));
        let congratulations = actions
            .iter()
            .filter(|a| matches!(a, Action::Congratulate { .. }))
            .count();
        assert_eq!(congratulations, 1);
        assert!(machine().complete(user(), None).is_empty());
    }

    #[test]
    fn test_depart() {
        let record = PhaseRecord::phase1(t0(), Duration::days(3));
        assert_eq!(
            machine().depart(user(), Some(&record)),
            vec![Action::Log(LogEntry::Departed { user: user() })]
        );
        assert!(machine().depart(user(), None).is_empty());
    }

    #[test]
    fn test_release_phase1() {
        let mut record = PhaseRecord::phase1(t0(), Duration::days(3));
        record.phase1_failed = true;
        record.warnings_sent.insert(WarningKey::First24h, t0());
        let now = t0() + Duration::days(5);
        let eval = machine().release(user(), &record, Phase::First, now);
        assert!(!eval.record.phase1_failed);
        assert_eq!(eval.record.phase1_deadline, Some(now + Duration::days(3)));
        assert!(eval.record.warned(WarningKey::First24h));
        assert!(matches!(
            eval.actions[0],
            Action::Release {
                phase: Phase::First,
                ..
            }
        ));
    }

    #[test]
    fn test_release_phase2() {
        let mut record = PhaseRecord::phase2(t0(), Duration::days(14));
        record.phase2_failed = true;
        let now = t0() + Duration::days(20);
        let eval = machine().release(user(), &record, Phase::Second, now);
        assert!(!eval.record.phase2_failed);
        assert_eq!(eval.record.phase2_deadline, Some(now + Duration::days(14)));
    }

    #[test]
    fn test_release_not_failed_is_noop() {
        let record = PhaseRecord::phase1(t0(), Duration::days(3));
        let eval = machine().release(user(), &record, Phase::First, t0());
        assert!(eval.actions.is_empty());
        assert!(!eval.changed_from(&record));
    }

    #[test]
    fn test_manual_jail_marks_failed() {
        let record = PhaseRecord::phase1(t0(), Duration::days(3));
        let eval = machine().manual_jail(user(), &record, Phase::First);
        assert!(eval.record.phase1_failed);
        assert_eq!(
            eval.actions[0],
            Action::JailNotice {
                user: user(),
                phase: Phase::First
            }
        );

        let again = machine().manual_jail(user(), &eval.record, Phase::First);
        assert!(again.actions.is_empty());
    }

    #[test]
    fn test_manual_jail_unarmed_phase_is_noop() {
        let record = PhaseRecord::phase1(t0(), Duration::days(3));
        let eval = machine().manual_jail(user(), &record, Phase::Second);
        assert!(eval.actions.is_empty());
    }

    #[test]
    fn test_remove_timer() {
        let mut record = PhaseRecord::phase1(t0(), Duration::days(3));
        record.phase1_failed = true;
        let removed = machine().remove_timer(&record, Phase::First);
        assert!(removed.phase1_deadline.is_none());
        assert!(!removed.phase1_failed);

        let mut record = PhaseRecord::phase2(t0(), Duration::days(14));
        record.phase2_failed = true;
        let removed = machine().remove_timer(&record, Phase::Second);
        assert!(!removed.phase2_active);
        assert!(removed.phase2_deadline.is_none());
        assert!(!removed.phase2_failed);
    }

    #[test]
    fn test_custom_phase_lengths() {
        let machine = PhaseMachine::new(&TimerConfig {
            first_phase: std::time::Duration::from_secs(3600),
            ..TimerConfig::default()
        });
        let eval = machine.join(user(), t0());
        assert_eq!(eval.record.phase1_deadline, Some(t0() + Duration::hours(1)));
    }

    // ------------------------------------------------------------------
    // Resync
    // ------------------------------------------------------------------

    #[test]
    fn test_resync_scenario() {
        let now = t0();
        let a = member(1, &[]);
        let b = member(2, &[11]);
        let c = member(3, &[99]);

        for m in [&a, &c] {
            let ResyncOutcome::Track(record) = machine().resync(m, None, &roles(), now) else {
                panic!("expected phase 1 record");
            };
            assert_eq!(record.phase1_deadline, Some(now + Duration::days(3)));
            assert!(!record.phase2_active);
        }

        let ResyncOutcome::Track(record) = machine().resync(&b, None, &roles(), now) else {
            panic!("expected phase 2 record");
        };
        assert!(record.phase2_active);
        assert_eq!(record.phase2_deadline, Some(now + Duration::days(14)));
        assert!(record.phase1_deadline.is_none());
        assert!(!record.phase1_failed);
    }

    #[test]
    fn test_resync_starter_role_is_phase1() {
        let outcome = machine().resync(&member(1, &[15]), None, &roles(), t0());
        assert_eq!(
            outcome,
            ResyncOutcome::Track(PhaseRecord::phase1(t0(), Duration::days(3)))
        );
    }

    #[test]
    fn test_resync_completed_and_jailed() {
        assert_eq!(
            machine().resync(&member(1, &[11, 12]), None, &roles(), t0()),
            ResyncOutcome::Untrack
        );
        assert_eq!(
            machine().resync(&member(1, &[13]), None, &roles(), t0()),
            ResyncOutcome::Keep
        );
    }

    #[test]
    fn test_resync_skips_bots() {
        let mut bot = member(1, &[]);
        bot.bot = true;
        assert_eq!(
            machine().resync(&bot, None, &roles(), t0()),
            ResyncOutcome::Keep
        );
    }

    #[test]
    fn test_resync_keeps_join_time_and_resets_warnings() {
        let mut existing = PhaseRecord::phase1(t0(), Duration::days(3));
        existing.warnings_sent.insert(WarningKey::First24h, t0());
        let later = t0() + Duration::days(10);
        let ResyncOutcome::Track(record) =
            machine().resync(&member(1, &[]), Some(&existing), &roles(), later)
        else {
            panic!("expected record");
        };
        assert_eq!(record.join_time, t0());
        assert!(record.warnings_sent.is_empty());
        assert_eq!(record.phase1_deadline, Some(later + Duration::days(3)));
    }
}
