//! Linking records.
//!
//! Types for verification codes, link records and community configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An identity on the content platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentAccount {
    /// Platform-specific numeric account ID.
    pub id: i64,
    /// Account name (the `/u/<name>` part of the profile URL).
    pub name: String,
}

impl ContentAccount {
    /// Create a content account reference.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A one-time code bound to a content-platform identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    /// The numeric code value. Unique among unconsumed codes.
    pub code: u32,
    /// The content identity the code was issued for.
    pub owner: ContentAccount,
    /// Chat identity that requested the code, when known.
    pub requested_by: Option<String>,
    /// Set exactly once; a consumed code never matches again.
    pub consumed: bool,
    /// When the code was issued.
    pub issued_at: DateTime<Utc>,
    /// When the code was consumed.
    pub consumed_at: Option<DateTime<Utc>>,
}

impl VerificationCode {
    /// Create a fresh, unconsumed code record.
    pub fn new(code: u32, owner: ContentAccount, requested_by: Option<String>) -> Self {
        Self {
            code,
            owner,
            requested_by,
            consumed: false,
            issued_at: Utc::now(),
            consumed_at: None,
        }
    }
}

/// A link between a content identity and a chat identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Record ID (UUID v4).
    pub id: String,
    /// The content identity owning this link.
    pub content: ContentAccount,
    /// The chat-platform user ID.
    pub chat_id: String,
    /// When the link was created.
    pub linked_at: DateTime<Utc>,
    /// When the link was removed. `None` while active.
    pub removed_at: Option<DateTime<Utc>>,
}

impl Connection {
    /// Create a new active link record.
    pub fn new(content: ContentAccount, chat_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            chat_id: chat_id.into(),
            linked_at: Utc::now(),
            removed_at: None,
        }
    }

    /// Whether the link is still active.
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}

/// Per-community configuration consumed by the facade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Role granted to linked members. Required for linking.
    #[serde(default)]
    pub verified_role_id: Option<String>,
    /// Channel where newly screened members are greeted.
    #[serde(default)]
    pub welcome_channel_id: Option<String>,
}

/// A chat member's screening state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberTransition {
    /// The chat-platform user ID.
    pub chat_id: String,
    /// Whether the member is a bot account.
    #[serde(default)]
    pub is_bot: bool,
    /// Pending flag before the update.
    pub was_pending: bool,
    /// Pending flag after the update.
    pub is_pending: bool,
}

impl MemberTransition {
    /// Whether this update means a human member just passed screening.
    pub fn passed_screening(&self) -> bool {
        !self.is_bot && self.was_pending && !self.is_pending
    }
}

/// A welcome message to post after a member passes screening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeNotice {
    /// Channel to post into.
    pub channel_id: String,
    /// The member being welcomed.
    pub chat_id: String,
    /// Message body.
    pub text: String,
}
