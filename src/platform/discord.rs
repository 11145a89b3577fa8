//! Discord REST API client (v10).
//!
//! Only the handful of endpoints the bot needs: DM channel creation,
//! channel messages, member role changes and the paginated member list.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, redirect};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Member, Platform};
use crate::error::PlatformError;
use crate::ids::{ChannelId, GuildId, RoleId, UserId};
use crate::messages::Embed;

/// Production API root.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Members fetched per page (the API maximum).
const MEMBER_PAGE_SIZE: usize = 1000;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest error body kept in [`PlatformError::Http`].
const MAX_ERROR_BODY: usize = 512;

/// Discord REST client bound to one guild.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base: String,
    token: String,
    guild: GuildId,
}

impl DiscordClient {
    /// Creates a client against the production API.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Network`] if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, guild: GuildId) -> Result<Self, PlatformError> {
        Self::with_base_url(token, guild, DEFAULT_API_BASE)
    }

    /// Creates a client against an alternative API root.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Network`] if the HTTP client cannot be built.
    pub fn with_base_url(
        token: impl Into<String>,
        guild: GuildId,
        base: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(
                "DiscordBot (https://github.com/timebomb-bot/timebomb, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;

        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            guild,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, PlatformError> {
        let url = format!("{}{path}", self.base);
        debug!(%method, %url, "discord request");

        let mut req = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    async fn open_dm_channel(&self, user: UserId) -> Result<ChannelId, PlatformError> {
        #[derive(Deserialize)]
        struct DmChannel {
            id: ChannelId,
        }

        let response = self
            .request(
                Method::POST,
                "/users/@me/channels",
                Some(json!({ "recipient_id": user })),
            )
            .await?;
        let channel: DmChannel = response.json().await?;
        Ok(channel.id)
    }

    async fn create_message(&self, channel: ChannelId, embed: &Embed) -> Result<(), PlatformError> {
        self.request(
            Method::POST,
            &format!("/channels/{channel}/messages"),
            Some(json!({ "embeds": [embed] })),
        )
        .await?;
        Ok(())
    }

    fn member_role_path(&self, user: UserId, role: RoleId) -> String {
        format!("/guilds/{}/members/{user}/roles/{role}", self.guild)
    }
}

#[async_trait]
impl Platform for DiscordClient {
    async fn send_direct_message(
        &self,
        user: UserId,
        message: &Embed,
    ) -> Result<(), PlatformError> {
        let channel = self.open_dm_channel(user).await?;
        self.create_message(channel, message).await
    }

    async fn add_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.request(Method::PUT, &self.member_role_path(user, role), None)
            .await?;
        Ok(())
    }

    async fn remove_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.request(Method::DELETE, &self.member_role_path(user, role), None)
            .await?;
        Ok(())
    }

    async fn post_log(&self, channel: ChannelId, message: &Embed) -> Result<(), PlatformError> {
        self.create_message(channel, message).await
    }

    async fn list_members(&self) -> Result<Vec<Member>, PlatformError> {
        let mut members = Vec::new();
        let mut after = UserId::new(0);

        loop {
            let path = format!(
                "/guilds/{}/members?limit={MEMBER_PAGE_SIZE}&after={after}",
                self.guild
            );
            let page: Vec<GuildMember> =
                self.request(Method::GET, &path, None).await?.json().await?;
            let full_page = page.len() == MEMBER_PAGE_SIZE;

            for raw in page {
                after = after.max(raw.user.id);
                members.push(Member::from(raw));
            }

            if !full_page {
                break;
            }
        }

        debug!(count = members.len(), "listed guild members");
        Ok(members)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GuildMember {
    user: GuildUser,
    #[serde(default)]
    roles: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
struct GuildUser {
    id: UserId,
    #[serde(default)]
    bot: bool,
}

impl From<GuildMember> for Member {
    fn from(raw: GuildMember) -> Self {
        Self {
            user: raw.user.id,
            roles: raw.roles,
            bot: raw.user.bot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Maps a non-success response to a [`PlatformError`].
fn error_for_status(status: StatusCode, body: &str) -> PlatformError {
    match status {
        StatusCode::FORBIDDEN => PlatformError::Forbidden(truncate(body)),
        StatusCode::NOT_FOUND => PlatformError::NotFound(truncate(body)),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            retry_after_secs: serde_json::from_str::<RateLimitBody>(body)
                .map_or(0.0, |b| b.retry_after),
        },
        other => PlatformError::Http {
            status: other.as_u16(),
            body: truncate(body),
        },
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
