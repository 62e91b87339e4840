//! # Collaborator Ports
//!
//! Traits for the external systems the linking engine talks to. The core
//! never reaches a platform client directly; implementations are supplied
//! to [`LinkingFacade`](crate::linking::LinkingFacade) at construction.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────────┐
//! │  LinkingFacade   │────►│ CommunityDirectory   │  config lookup (read-only)
//! │                  │────►│ RoleDirectory        │  grant / revoke
//! │                  │────►│ ContentPlatform      │  profile lookup, DMs
//! └──────────────────┘     └──────────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::linking::{CommunityConfig, ContentAccount};

/// Read-only lookup of per-community configuration.
#[async_trait]
pub trait CommunityDirectory: Send + Sync {
    /// Get the configuration for a community, if any exists.
    async fn get_config(&self, community_id: &str) -> Result<Option<CommunityConfig>>;
}

/// Role grant and revoke on the chat platform.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Give `role_id` to the chat user in the community.
    async fn grant_role(&self, community_id: &str, chat_id: &str, role_id: &str) -> Result<()>;

    /// Take `role_id` away from the chat user in the community.
    async fn revoke_role(&self, community_id: &str, chat_id: &str, role_id: &str) -> Result<()>;
}

/// Content platform client.
#[async_trait]
pub trait ContentPlatform: Send + Sync {
    /// Resolve a username to an account. `Ok(None)` when no such user exists.
    async fn lookup_identity(&self, username: &str) -> Result<Option<ContentAccount>>;

    /// Send a private message to an account.
    async fn send_direct_message(&self, account_id: i64, text: &str) -> Result<()>;
}
