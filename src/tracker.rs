//! Event handlers and admin operations over the shared timer store.
//!
//! Every operation follows the same shape: lock the store, run the phase
//! machine, write the result back, save, unlock, then dispatch the
//! resulting actions. The store guard is never held across a platform
//! call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{PhaseError, PlatformError};
use crate::ids::{GuildId, RoleId, UserId};
use crate::observability::metrics;
use crate::phase::{Action, Evaluation, Phase, PhaseMachine, PhaseRecord, ResyncOutcome};
use crate::platform::{Member, Platform};
use crate::store::{SharedStore, TimerStore};

// ============================================================================
// Events
// ============================================================================

/// A membership or role change delivered by the platform.
///
/// Wire shape (`POST /events`):
///
/// ```json
/// {"type": "role_added", "user_id": "1234", "role_id": "5678"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// A member joined the guild.
    MemberJoin {
        /// The new member.
        user_id: UserId,
        /// Whether the account is a bot.
        #[serde(default)]
        bot: bool,
        /// Guild the event came from, when the sender includes it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guild_id: Option<GuildId>,
    },
    /// A member left the guild.
    MemberRemove {
        /// The departed member.
        user_id: UserId,
        /// Guild the event came from, when the sender includes it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guild_id: Option<GuildId>,
    },
    /// A role was granted.
    RoleAdded {
        /// The member.
        user_id: UserId,
        /// The role granted.
        role_id: RoleId,
        /// Guild the event came from, when the sender includes it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guild_id: Option<GuildId>,
    },
    /// A role was taken away.
    RoleRemoved {
        /// The member.
        user_id: UserId,
        /// The role removed.
        role_id: RoleId,
        /// Guild the event came from, when the sender includes it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guild_id: Option<GuildId>,
    },
}

impl PlatformEvent {
    /// The member the event concerns.
    #[must_use]
    pub const fn user(&self) -> UserId {
        match self {
            Self::MemberJoin { user_id, .. }
            | Self::MemberRemove { user_id, .. }
            | Self::RoleAdded { user_id, .. }
            | Self::RoleRemoved { user_id, .. } => *user_id,
        }
    }

    /// Fixed label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MemberJoin { .. } => "member_join",
            Self::MemberRemove { .. } => "member_remove",
            Self::RoleAdded { .. } => "role_added",
            Self::RoleRemoved { .. } => "role_removed",
        }
    }

    const fn guild(&self) -> Option<GuildId> {
        match self {
            Self::MemberJoin { guild_id, .. }
            | Self::MemberRemove { guild_id, .. }
            | Self::RoleAdded { guild_id, .. }
            | Self::RoleRemoved { guild_id, .. } => *guild_id,
        }
    }
}

/// Tally of one resync or reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Members listed by the platform.
    pub members: usize,
    /// Bot accounts skipped.
    pub bots: usize,
    /// Members given a fresh record.
    pub tracked: usize,
    /// Completed members whose record was dropped.
    pub untracked: usize,
    /// Jailed members left as they were.
    pub kept: usize,
}

// ============================================================================
// Tracker
// ============================================================================

/// Owns the store handle, the platform and the configuration.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct Tracker {
    store: SharedStore,
    platform: Arc<dyn Platform>,
    dispatcher: Dispatcher,
    config: Arc<BotConfig>,
    machine: PhaseMachine,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("guild_id", &self.config.guild_id)
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Creates a tracker over `store`.
    #[must_use]
    pub fn new(store: SharedStore, platform: Arc<dyn Platform>, config: Arc<BotConfig>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&platform), Arc::clone(&config));
        let machine = PhaseMachine::new(&config.timers);
        Self {
            store,
            platform,
            dispatcher,
            config,
            machine,
        }
    }

    /// The shared store handle.
    #[must_use]
    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The dispatcher used for every action.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The phase machine built from the configured timers.
    #[must_use]
    pub const fn machine(&self) -> &PhaseMachine {
        &self.machine
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------------

    /// Routes a platform event to its handler.
    ///
    /// Events for another guild are ignored.
    pub async fn handle_event(&self, event: &PlatformEvent, now: DateTime<Utc>) -> DispatchOutcome {
        metrics::record_event(event.kind());
        if let Some(guild) = event.guild()
            && guild != self.config.guild_id
        {
            debug!(%guild, event = event.kind(), "ignoring event for another guild");
            return DispatchOutcome::default();
        }

        match *event {
            PlatformEvent::MemberJoin { user_id, bot, .. } => {
                self.member_join(user_id, bot, now).await
            }
            PlatformEvent::MemberRemove { user_id, .. } => self.member_remove(user_id, now).await,
            PlatformEvent::RoleAdded {
                user_id, role_id, ..
            } => self.role_added(user_id, role_id, now).await,
            PlatformEvent::RoleRemoved {
                user_id, role_id, ..
            } => self.role_removed(user_id, role_id, now).await,
        }
    }

    /// A member joined: start phase 1. Bots are never tracked.
    ///
    /// A member who rejoins gets a fresh record.
    pub async fn member_join(
        &self,
        user: UserId,
        bot: bool,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        if bot {
            debug!(%user, "not tracking bot account");
            return DispatchOutcome::default();
        }

        let step = self.machine.join(user, now);
        {
            let mut store = self.store.lock().await;
            store.insert(user, step.record);
            persist(&store);
        }
        info!(%user, "phase 1 started");
        self.dispatcher.apply(&step.actions, now).await
    }

    /// A member left: drop their record.
    pub async fn member_remove(&self, user: UserId, now: DateTime<Utc>) -> DispatchOutcome {
        let actions = {
            let mut store = self.store.lock().await;
            let Some(existing) = store.remove(user) else {
                return DispatchOutcome::default();
            };
            persist(&store);
            self.machine.depart(user, Some(&existing))
        };
        info!(%user, "tracked member left");
        self.dispatcher.apply(&actions, now).await
    }

    /// A role was granted.
    ///
    /// - first success: phase 1 done, phase 2 starts
    /// - second success: onboarding complete, the record is dropped
    /// - a jail role: a moderator jailed the member by hand
    ///
    /// Other roles are ignored.
    pub async fn role_added(
        &self,
        user: UserId,
        role: RoleId,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let roles = &self.config.roles;
        let actions = if role == roles.first_success {
            let mut store = self.store.lock().await;
            let step = self.machine.advance_to_phase2(user, store.get(user), now);
            if !step.actions.is_empty() {
                info!(%user, "phase 2 started");
            }
            commit(&mut store, user, step)
        } else if role == roles.second_success {
            let mut store = self.store.lock().await;
            let actions = self.machine.complete(user, store.get(user));
            if store.remove(user).is_some() {
                info!(%user, "onboarding complete");
                persist(&store);
            }
            actions
        } else if let Some(phase) = roles.jail_phase(role) {
            let mut store = self.store.lock().await;
            match store.get(user) {
                Some(record) => {
                    let step = self.machine.manual_jail(user, record, phase);
                    commit(&mut store, user, step)
                }
                None => Vec::new(),
            }
        } else {
            return DispatchOutcome::default();
        };

        self.dispatcher.apply(&actions, now).await
    }

    /// A role was taken away.
    ///
    /// Removing a jail role from a member whose phase is failed releases
    /// them, the same as the admin release. Our own release removes the
    /// role too; by then the phase is re-armed and the event is a no-op.
    pub async fn role_removed(
        &self,
        user: UserId,
        role: RoleId,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let Some(phase) = self.config.roles.jail_phase(role) else {
            return DispatchOutcome::default();
        };

        let actions = {
            let mut store = self.store.lock().await;
            match store.get(user) {
                Some(record) => {
                    let step = self.machine.release(user, record, phase, now);
                    commit(&mut store, user, step)
                }
                None => Vec::new(),
            }
        };
        if !actions.is_empty() {
            info!(%user, %phase, "jail role removed by a moderator, phase re-armed");
        }

        self.dispatcher.apply(&actions, now).await
    }

    // ------------------------------------------------------------------------
    // Admin operations
    // ------------------------------------------------------------------------

    /// The record for `user`, if tracked.
    pub async fn status(&self, user: UserId) -> Option<PhaseRecord> {
        self.store.lock().await.get(user).cloned()
    }

    /// Every tracked record, ordered by user id.
    pub async fn list(&self) -> Vec<(UserId, PhaseRecord)> {
        self.store
            .lock()
            .await
            .iter()
            .map(|(user, record)| (user, record.clone()))
            .collect()
    }

    /// Clears one phase's timer. The record itself is kept.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotTracked`] when `user` has no record.
    pub async fn remove_timer(
        &self,
        user: UserId,
        phase: Phase,
    ) -> Result<PhaseRecord, PhaseError> {
        let mut store = self.store.lock().await;
        let record = store.get(user).ok_or(PhaseError::NotTracked(user))?;
        let next = self.machine.remove_timer(record, phase);
        store.insert(user, next.clone());
        persist(&store);
        info!(%user, %phase, "timer removed");
        Ok(next)
    }

    /// Releases a jailed member: removes the jail role and re-arms the phase.
    ///
    /// Returns the new deadline, or `None` when that phase was not failed.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::NotTracked`] when `user` has no record.
    pub async fn release(
        &self,
        user: UserId,
        phase: Phase,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, PhaseError> {
        let (deadline, actions) = {
            let mut store = self.store.lock().await;
            let record = store.get(user).ok_or(PhaseError::NotTracked(user))?;
            let step = self.machine.release(user, record, phase, now);
            let released = !step.actions.is_empty();
            let deadline = released.then(|| step.record.deadline(phase)).flatten();
            (deadline, commit(&mut store, user, step))
        };

        if deadline.is_some() {
            info!(%user, %phase, "member released");
        }
        self.dispatcher.apply(&actions, now).await;
        Ok(deadline)
    }

    /// Rebuilds records from every member's current roles.
    ///
    /// # Errors
    ///
    /// Returns the platform error when the member listing fails; the store
    /// is left untouched in that case.
    pub async fn resync(&self, now: DateTime<Utc>) -> Result<ResyncReport, PlatformError> {
        let members = self.platform.list_members().await?;
        let mut store = self.store.lock().await;
        let report = self.resync_members(&mut store, &members, now);
        persist(&store);
        info!(
            members = report.members,
            tracked = report.tracked,
            untracked = report.untracked,
            kept = report.kept,
            "resync complete"
        );
        Ok(report)
    }

    /// Drops every record, then resyncs.
    ///
    /// # Errors
    ///
    /// Returns the platform error when the member listing fails; the store
    /// is left untouched in that case.
    pub async fn reset(&self, now: DateTime<Utc>) -> Result<ResyncReport, PlatformError> {
        let members = self.platform.list_members().await?;
        let mut store = self.store.lock().await;
        let dropped = store.len();
        store.clear();
        let report = self.resync_members(&mut store, &members, now);
        persist(&store);
        warn!(dropped, tracked = report.tracked, "timer store reset");
        Ok(report)
    }

    fn resync_members(
        &self,
        store: &mut TimerStore,
        members: &[Member],
        now: DateTime<Utc>,
    ) -> ResyncReport {
        let mut report = ResyncReport {
            members: members.len(),
            ..ResyncReport::default()
        };
        for member in members {
            if member.bot {
                report.bots += 1;
                continue;
            }
            let outcome = self
                .machine
                .resync(member, store.get(member.user), &self.config.roles, now);
            match outcome {
                ResyncOutcome::Track(record) => {
                    store.insert(member.user, record);
                    report.tracked += 1;
                }
                ResyncOutcome::Untrack => {
                    store.remove(member.user);
                    report.untracked += 1;
                }
                ResyncOutcome::Keep => report.kept += 1,
            }
        }
        report
    }
}

/// Writes a step's record back, saving when it changed.
fn commit(store: &mut TimerStore, user: UserId, step: Evaluation) -> Vec<Action> {
    let changed = store
        .get(user)
        .is_none_or(|before| step.changed_from(before));
    if changed {
        store.insert(user, step.record);
        persist(store);
    }
    step.actions
}

/// Saves the snapshot, logging failures. In-memory state stays
/// authoritative until the next successful save.
pub(crate) fn persist(store: &TimerStore) {
    if let Err(e) = store.save() {
        error!(path = %store.path().display(), error = %e, "failed to save timer store");
    }
    metrics::set_tracked_users(store.len());
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::Tracker;
    use crate::config::{BotConfig, RoleConfig, TimerConfig};
    use crate::ids::{ChannelId, GuildId, RoleId};
    use crate::platform::{Member, Platform, RecordingPlatform};
    use crate::store::TimerStore;

    pub const FIRST_SUCCESS: RoleId = RoleId::new(11);
    pub const SECOND_SUCCESS: RoleId = RoleId::new(12);
    pub const FIRST_JAIL: RoleId = RoleId::new(13);
    pub const SECOND_JAIL: RoleId = RoleId::new(14);
    pub const STARTER: RoleId = RoleId::new(15);

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    pub fn config(dir: &Path) -> Arc<BotConfig> {
        Arc::new(BotConfig {
            guild_id: GuildId::new(1),
            log_channel: ChannelId::new(2),
            roles: RoleConfig {
                first_success: FIRST_SUCCESS,
                second_success: SECOND_SUCCESS,
                first_jail: FIRST_JAIL,
                second_jail: SECOND_JAIL,
                starter: Some(STARTER),
            },
            timers: TimerConfig::default(),
            data_file: dir.join("timers.json"),
        })
    }

    pub fn tracker_with(dir: &Path, members: Vec<Member>) -> (Arc<RecordingPlatform>, Tracker) {
        let config = config(dir);
        let platform = Arc::new(RecordingPlatform::with_members(members));
        let store = TimerStore::empty(config.data_file.clone()).into_shared();
        let tracker = Tracker::new(store, Arc::clone(&platform) as Arc<dyn Platform>, config);
        (platform, tracker)
    }

    pub fn tracker(dir: &Path) -> (Arc<RecordingPlatform>, Tracker) {
        tracker_with(dir, Vec::new())
    }
}
