//! In-memory platform.
//!
//! Records every call instead of performing it. Used by `sweep --dry-run`
//! and throughout the tests; individual users can be configured to refuse
//! direct messages.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Member, Platform};
use crate::error::PlatformError;
use crate::ids::{ChannelId, RoleId, UserId};
use crate::messages::Embed;

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// A direct message, identified by its embed title.
    DirectMessage {
        /// Recipient.
        user: UserId,
        /// Embed title.
        title: String,
    },
    /// A role assignment.
    AddRole {
        /// Member.
        user: UserId,
        /// Role assigned.
        role: RoleId,
    },
    /// A role removal.
    RemoveRole {
        /// Member.
        user: UserId,
        /// Role removed.
        role: RoleId,
    },
    /// A log-channel post, identified by its embed title.
    Log {
        /// Channel.
        channel: ChannelId,
        /// Embed title.
        title: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<PlatformCall>,
    members: Vec<Member>,
    closed_dms: HashSet<UserId>,
    failing_roles: bool,
    forbidden_roles: bool,
}

/// A [`Platform`] that records calls and never touches the network.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    // std::sync::Mutex: held only for short synchronous updates, never across .await.
    inner: Mutex<Inner>,
}

impl RecordingPlatform {
    /// An empty recorder with no members.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose `list_members` returns `members`.
    #[must_use]
    pub fn with_members(members: Vec<Member>) -> Self {
        let platform = Self::default();
        platform.lock().members = members;
        platform
    }

    /// Makes direct messages to `user` fail with `Forbidden`.
    pub fn close_dms(&self, user: UserId) {
        self.lock().closed_dms.insert(user);
    }

    /// Makes every role change fail.
    pub fn fail_role_changes(&self) {
        self.lock().failing_roles = true;
    }

    /// Makes every role change fail with `Forbidden`, as Discord answers a
    /// bot without Manage Roles.
    pub fn forbid_role_changes(&self) {
        self.lock().forbidden_roles = true;
    }

    /// Snapshot of the calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls concerning `user`, excluding log posts.
    #[must_use]
    pub fn calls_for(&self, user: UserId) -> Vec<PlatformCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| match call {
                PlatformCall::DirectMessage { user: u, .. }
                | PlatformCall::AddRole { user: u, .. }
                | PlatformCall::RemoveRole { user: u, .. } => *u == user,
                PlatformCall::Log { .. } => false,
            })
            .cloned()
            .collect()
    }

    /// Titles of the log-channel posts recorded so far.
    #[must_use]
    pub fn log_titles(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Log { title, .. } => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-record; keep going.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn send_direct_message(
        &self,
        user: UserId,
        message: &Embed,
    ) -> Result<(), PlatformError> {
        let mut inner = self.lock();
        if inner.closed_dms.contains(&user) {
            return Err(PlatformError::Forbidden(format!(
                "user {user} does not accept direct messages"
            )));
        }
        inner.calls.push(PlatformCall::DirectMessage {
            user,
            title: message.title.clone(),
        });
        Ok(())
    }

    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        let mut inner = self.lock();
        if let Some(e) = inner.role_change_error() {
            return Err(e);
        }
        inner.calls.push(PlatformCall::AddRole { user, role });
        Ok(())
    }

    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        let mut inner = self.lock();
        if let Some(e) = inner.role_change_error() {
            return Err(e);
        }
        inner.calls.push(PlatformCall::RemoveRole { user, role });
        Ok(())
    }

    async fn post_log(&self, channel: ChannelId, message: &Embed) -> Result<(), PlatformError> {
        self.lock().calls.push(PlatformCall::Log {
            channel,
            title: message.title.clone(),
        });
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<Member>, PlatformError> {
        Ok(self.lock().members.clone())
    }
}

impl Inner {
    fn role_change_error(&self) -> Option<PlatformError> {
        if self.forbidden_roles {
            Some(PlatformError::Forbidden("Missing Permissions".to_string()))
        } else if self.failing_roles {
            Some(PlatformError::Http {
                status: 500,
                body: "role change rejected".to_string(),
            })
        } else {
            None
        }
    }
}
