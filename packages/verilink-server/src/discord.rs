//! Discord chat platform client.
//!
//! Grants and revokes the verified role and posts channel messages through
//! the Discord REST API with a bot token.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use verilink_core::ports::RoleDirectory;
use verilink_core::{Error, Result};

/// Posting plain messages into a chat channel.
#[async_trait]
pub trait ChannelMessenger: Send + Sync {
    /// Post `text` into `channel_id`.
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

/// REST client for the Discord API.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: String,
    bot_token: Option<String>,
}

impl DiscordClient {
    /// Create a client for the API at `base_url` (e.g. `https://discord.com/api/v10`).
    pub fn new(base_url: &str, bot_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
        }
    }

    fn role_url(&self, guild_id: &str, user_id: &str, role_id: &str) -> String {
        format!(
            "{}/guilds/{}/members/{}/roles/{}",
            self.base_url, guild_id, user_id, role_id
        )
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.base_url, channel_id)
    }

    fn authorization(&self) -> Result<String> {
        self.bot_token
            .as_deref()
            .map(|token| format!("Bot {}", token))
            .ok_or_else(|| Error::NotConfigured("chat bot token".into()))
    }

    async fn change_role(
        &self,
        method: Method,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<()> {
        let response = self
            .http
            .request(method.clone(), self.role_url(guild_id, user_id, role_id))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .send()
            .await
            .map_err(|e| Error::RoleDirectory(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RoleDirectory(format!(
                "{} role returned {}: {}",
                method, status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl RoleDirectory for DiscordClient {
    async fn grant_role(&self, community_id: &str, chat_id: &str, role_id: &str) -> Result<()> {
        self.change_role(Method::PUT, community_id, chat_id, role_id)
            .await?;
        tracing::info!(community_id, chat_id, "Verified role granted");
        Ok(())
    }

    async fn revoke_role(&self, community_id: &str, chat_id: &str, role_id: &str) -> Result<()> {
        self.change_role(Method::DELETE, community_id, chat_id, role_id)
            .await?;
        tracing::info!(community_id, chat_id, "Verified role revoked");
        Ok(())
    }
}

#[async_trait]
impl ChannelMessenger for DiscordClient {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<()> {
        let response = self
            .http
            .post(self.messages_url(channel_id))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .json(&CreateMessage { content: text })
            .send()
            .await
            .map_err(|e| Error::ChatPlatform(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::ChatPlatform(format!(
                "Channel message returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = DiscordClient::new("https://discord.com/api/v10/", None);
        assert_eq!(
            client.role_url("g1", "u1", "r1"),
            "https://discord.com/api/v10/guilds/g1/members/u1/roles/r1"
        );
        assert_eq!(
            client.messages_url("c1"),
            "https://discord.com/api/v10/channels/c1/messages"
        );
    }

    #[test]
    fn test_authorization_uses_bot_scheme() {
        let client = DiscordClient::new("https://discord.com/api/v10", Some("abc".into()));
        assert_eq!(client.authorization().unwrap(), "Bot abc");
    }

    #[tokio::test]
    async fn test_missing_token_is_not_configured() {
        let client = DiscordClient::new("http://127.0.0.1:9", None);

        let err = client.grant_role("g1", "u1", "r1").await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));

        let err = client.post_message("c1", "hi").await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }
}
