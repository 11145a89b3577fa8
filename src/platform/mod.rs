//! Chat platform seam.
//!
//! Everything observable the bot does goes through [`Platform`]: direct
//! messages, role changes, log-channel posts and the member listing used by
//! resync. [`DiscordClient`] talks to the Discord REST API;
//! [`RecordingPlatform`] records calls in memory for dry runs and tests.

pub mod discord;
pub mod recording;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::ids::{ChannelId, RoleId, UserId};
use crate::messages::Embed;

pub use discord::DiscordClient;
pub use recording::{PlatformCall, RecordingPlatform};

/// A guild member as seen by resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The member's user id.
    pub user: UserId,
    /// Roles currently assigned.
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// Whether the account is a bot.
    #[serde(default)]
    pub bot: bool,
}

impl Member {
    /// Whether the member holds `role`.
    #[must_use]
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// Outbound operations against the chat platform.
///
/// Calls are best effort: the caller logs failures and moves on, nothing is
/// retried.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Sends a direct message to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`] when the user does not accept
    /// direct messages, or another variant on transport failure.
    async fn send_direct_message(&self, user: UserId, message: &Embed)
    -> Result<(), PlatformError>;

    /// Assigns `role` to `user`.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the platform rejects the change.
    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    /// Removes `role` from `user`.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the platform rejects the change.
    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    /// Posts a message to a channel.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the post fails.
    async fn post_log(&self, channel: ChannelId, message: &Embed) -> Result<(), PlatformError>;

    /// Lists every member of the configured guild.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if any page cannot be fetched.
    async fn list_members(&self) -> Result<Vec<Member>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_deserializes_with_defaults() {
        let member: Member = serde_json::from_str(r#"{"user": "12"}"#).unwrap();
        assert_eq!(member.user, UserId::new(12));
        assert!(member.roles.is_empty());
        assert!(!member.bot);
    }

    #[test]
    fn test_has_role() {
        let member = Member {
            user: UserId::new(1),
            roles: vec![RoleId::new(3), RoleId::new(4)],
            bot: false,
        };
        assert!(member.has_role(RoleId::new(4)));
        assert!(!member.has_role(RoleId::new(5)));
    }
}
