//! Applies [`Action`]s to the platform.
//!
//! Each action is independent: a failure is logged and counted, and the
//! remaining actions still run. Nothing is retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::error::PlatformError;
use crate::ids::UserId;
use crate::messages;
use crate::observability::metrics;
use crate::phase::Action;
use crate::platform::Platform;

/// Tally of one [`Dispatcher::apply`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    /// Platform calls made.
    pub attempted: usize,
    /// Calls that failed for a reason other than closed DMs.
    pub failed: usize,
    /// Direct messages refused because the user closed their DMs.
    pub forbidden: usize,
}

impl DispatchOutcome {
    pub(crate) const fn merge(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.failed += other.failed;
        self.forbidden += other.forbidden;
    }
}

/// Turns actions into direct messages, role changes and log posts.
#[derive(Clone)]
pub struct Dispatcher {
    platform: Arc<dyn Platform>,
    config: Arc<BotConfig>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("log_channel", &self.config.log_channel)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, config: Arc<BotConfig>) -> Self {
        Self { platform, config }
    }

    /// Applies `actions` in order. `now` is the time the actions were
    /// decided at and is used for rendering only.
    pub async fn apply(&self, actions: &[Action], now: DateTime<Utc>) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for action in actions {
            outcome.merge(self.apply_one(action, now).await);
        }
        outcome
    }

    async fn apply_one(&self, action: &Action, now: DateTime<Utc>) -> DispatchOutcome {
        let user = action.user();
        let kind = action.kind();
        debug!(%user, action = kind, "dispatching");

        let results: Vec<(Call, Result<(), PlatformError>)> = match action {
            Action::Welcome { deadline, .. } => {
                vec![self.dm(user, &messages::welcome(now, *deadline)).await]
            }
            Action::Warn { key, deadline, .. } => {
                metrics::record_warning(*key);
                info!(%user, warning = %key, "sending deadline warning");
                vec![self.dm(user, &messages::warning(*key, *deadline, now)).await]
            }
            Action::Jail { phase, .. } => {
                metrics::record_jail(*phase);
                info!(%user, %phase, "jailing member");
                let role = self.config.roles.jail(*phase);
                vec![
                    (Call::Role, self.platform.add_role(user, role).await),
                    self.dm(user, &messages::jailed(*phase)).await,
                ]
            }
            Action::JailNotice { phase, .. } => {
                vec![self.dm(user, &messages::jailed(*phase)).await]
            }
            Action::Release { phase, deadline, .. } => {
                info!(%user, %phase, "releasing member");
                let role = self.config.roles.jail(*phase);
                vec![
                    (Call::Role, self.platform.remove_role(user, role).await),
                    self.dm(user, &messages::released(*phase, *deadline)).await,
                ]
            }
            Action::StartPhase2 { deadline, .. } => {
                vec![self.dm(user, &messages::phase2_started(now, *deadline)).await]
            }
            Action::Congratulate { .. } => {
                vec![self.dm(user, &messages::congratulations()).await]
            }
            Action::Log(entry) => {
                let posted = self
                    .platform
                    .post_log(self.config.log_channel, &messages::log_line(entry))
                    .await;
                vec![(Call::Log, posted)]
            }
        };

        let mut outcome = DispatchOutcome {
            attempted: results.len(),
            ..DispatchOutcome::default()
        };
        for (call, result) in results {
            match result {
                Ok(()) => {}
                // Only a closed DM inbox is expected; a 403 anywhere else
                // means the bot lacks a permission.
                Err(e) if call == Call::DirectMessage && e.is_forbidden() => {
                    outcome.forbidden += 1;
                    warn!(%user, action = kind, "could not message user, DMs closed");
                }
                Err(e) => {
                    outcome.failed += 1;
                    metrics::record_dispatch_failure(kind);
                    warn!(
                        %user,
                        action = kind,
                        call = call.as_str(),
                        error = %e,
                        "platform call failed"
                    );
                }
            }
        }
        outcome
    }

    async fn dm(
        &self,
        user: UserId,
        embed: &messages::Embed,
    ) -> (Call, Result<(), PlatformError>) {
        (
            Call::DirectMessage,
            self.platform.send_direct_message(user, embed).await,
        )
    }
}

/// Which platform call a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    DirectMessage,
    Role,
    Log,
}

impl Call {
    const fn as_str(self) -> &'static str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::Role => "role",
            Self::Log => "log",
        }
    }
}
