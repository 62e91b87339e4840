//! # Linking Facade
//!
//! The only entry point the command layer calls. Orchestrates the two
//! linking protocols and unlinking, and talks to the collaborators.
//!
//! ## Protocols
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Interactive protocol                                                   │
//! │  ────────────────────                                                   │
//! │  start_interactive_link ──► lookup profile ──► ConfirmationSession     │
//! │                                                      │                  │
//! │  complete_session ◄──────────────────────────────────┘                  │
//! │     Accepted ──► codes.issue ──► content.send_direct_message           │
//! │     Denied   ──► acknowledge                                            │
//! │     Expired  ──► "no answer"                                            │
//! │                                                                         │
//! │  Code protocol (the only path that creates links)                       │
//! │  ─────────────                                                          │
//! │  link_by_code ──► verify(peek) ──► owner name check ──► registry.create│
//! │               ──► verify(commit) ──► roles.grant_role                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expected conditions come back as outcome variants; `Err` means something
//! unexpected happened (collaborator unreachable, storage failure).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::ports::{CommunityDirectory, ContentPlatform, RoleDirectory};

use super::codes::VerificationCodeService;
use super::registry::ConnectionRegistry;
use super::session::{ConfirmationSession, InteractionBus, SessionState};
use super::types::{CommunityConfig, Connection, ContentAccount, MemberTransition, WelcomeNotice};

/// Default confirmation window (30 seconds).
pub const DEFAULT_CONFIRMATION_WINDOW: Duration = Duration::from_secs(30);

/// Tunables for the facade.
#[derive(Debug, Clone)]
pub struct LinkingSettings {
    /// How long an interactive confirmation stays open.
    pub confirmation_window: Duration,
    /// Public base URL; when set, code messages include a `/verify/{code}` link.
    pub public_url: Option<String>,
}

impl Default for LinkingSettings {
    fn default() -> Self {
        Self {
            confirmation_window: DEFAULT_CONFIRMATION_WINDOW,
            public_url: None,
        }
    }
}

/// The external systems the facade depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Community configuration lookup.
    pub communities: Arc<dyn CommunityDirectory>,
    /// Role grant/revoke.
    pub roles: Arc<dyn RoleDirectory>,
    /// Content platform client.
    pub content: Arc<dyn ContentPlatform>,
}

/// Result of the code protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkOutcome {
    /// Link created and role granted.
    Linked {
        /// The new link.
        connection: Connection,
    },
    /// Code absent, already consumed, or issued for someone else.
    CodeNotFound,
    /// The content identity already has an active link. The code was not consumed.
    AlreadyLinked,
    /// The community has no verified role configured.
    NotConfigured,
    /// Link created but the role grant failed.
    PartialFailure {
        /// The new link.
        connection: Connection,
        /// What went wrong downstream.
        reason: String,
    },
}

/// Result of unlinking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnlinkOutcome {
    /// Link removed and role revoked.
    Unlinked {
        /// The removed link.
        connection: Connection,
    },
    /// The chat identity has no active link.
    NotFound,
    /// The community has no verified role configured.
    NotConfigured,
    /// Link removed but the role revoke failed. Not rolled back.
    PartialFailure {
        /// The removed link.
        connection: Connection,
        /// What went wrong downstream.
        reason: String,
    },
}

/// Result of starting the interactive protocol.
#[derive(Debug)]
pub enum InteractiveStart {
    /// A session is open and waiting for the subject.
    Started(ConfirmationSession),
    /// The username does not exist on the content platform.
    UnknownAccount,
    /// The community has no verified role configured.
    NotConfigured,
}

/// What the subject is told once a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionNotice {
    /// A code was issued and delivered out of band.
    CodeSent,
    /// The subject declined.
    Acknowledged,
    /// Nobody answered in time.
    NoAnswer,
    /// Accepted, but issuing or delivering the code failed.
    Failed,
}

impl SessionNotice {
    /// User-facing text for the notice.
    pub fn message(&self) -> &'static str {
        match self {
            SessionNotice::CodeSent => {
                "Ok, I sent you a direct message with a verification code!"
            }
            SessionNotice::Acknowledged => "Ok!",
            SessionNotice::NoAnswer => "You did not answer in time!",
            SessionNotice::Failed => "Something went wrong! Are you already verified?",
        }
    }
}

/// Terminal report of an interactive session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Session ID.
    pub session_id: String,
    /// Chat user the session was scoped to.
    pub subject: String,
    /// Content identity that was being confirmed.
    pub candidate: ContentAccount,
    /// Terminal state. Stays `Accepted` even if delivery failed.
    pub state: SessionState,
    /// What to tell the subject.
    pub notice: SessionNotice,
}

/// Orchestrates linking and unlinking.
#[derive(Clone)]
pub struct LinkingFacade {
    registry: Arc<dyn ConnectionRegistry>,
    codes: VerificationCodeService,
    collaborators: Collaborators,
    bus: InteractionBus,
    settings: LinkingSettings,
}

impl LinkingFacade {
    /// Create a facade from its parts.
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        codes: VerificationCodeService,
        collaborators: Collaborators,
        bus: InteractionBus,
        settings: LinkingSettings,
    ) -> Self {
        Self {
            registry,
            codes,
            collaborators,
            bus,
            settings,
        }
    }

    /// The bus sessions listen on. The chat layer publishes button presses here.
    pub fn bus(&self) -> &InteractionBus {
        &self.bus
    }

    /// Active settings.
    pub fn settings(&self) -> &LinkingSettings {
        &self.settings
    }

    /// Verified role of a community, or `None` if it is not configured.
    async fn verified_role(&self, community_id: &str) -> Result<Option<String>> {
        let config = self.collaborators.communities.get_config(community_id).await?;
        Ok(config.and_then(|c| c.verified_role_id))
    }

    // ========================================================================
    // CODE PROTOCOL
    // ========================================================================

    /// Link `chat_id` to the content identity a code was issued for.
    ///
    /// `candidate_username` must equal the code owner's name exactly; a
    /// mismatch looks the same as an unknown code.
    pub async fn link_by_code(
        &self,
        community_id: &str,
        chat_id: &str,
        candidate_username: &str,
        code: &str,
    ) -> Result<LinkOutcome> {
        let Some(role_id) = self.verified_role(community_id).await? else {
            return Ok(LinkOutcome::NotConfigured);
        };

        let Ok(code) = code.trim().parse::<u32>() else {
            return Ok(LinkOutcome::CodeNotFound);
        };

        let matches = self.codes.verify(code, false)?;
        let Some(record) = matches.into_iter().next() else {
            return Ok(LinkOutcome::CodeNotFound);
        };
        if record.owner.name != candidate_username {
            tracing::debug!(chat_id, "Code owner does not match the supplied username");
            return Ok(LinkOutcome::CodeNotFound);
        }

        let connection = match self.registry.create(&record.owner, chat_id) {
            Ok(connection) => connection,
            Err(Error::AlreadyLinked) => return Ok(LinkOutcome::AlreadyLinked),
            Err(e) => return Err(e),
        };

        if self.codes.verify(code, true)?.is_empty() {
            tracing::warn!(
                chat_id,
                owner = record.owner.name.as_str(),
                "Code was consumed concurrently after the link was created"
            );
        }

        tracing::info!(
            chat_id,
            content = connection.content.name.as_str(),
            community_id,
            "Accounts linked"
        );

        match self
            .collaborators
            .roles
            .grant_role(community_id, chat_id, &role_id)
            .await
        {
            Ok(()) => Ok(LinkOutcome::Linked { connection }),
            Err(e) => {
                tracing::warn!(chat_id, community_id, error = %e, "Linked but role grant failed");
                Ok(LinkOutcome::PartialFailure {
                    connection,
                    reason: e.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // INTERACTIVE PROTOCOL
    // ========================================================================

    /// Open a confirmation session asking `chat_id` whether `candidate_username`
    /// is theirs. `message_id` identifies the prompt carrying the buttons.
    pub async fn start_interactive_link(
        &self,
        community_id: &str,
        chat_id: &str,
        chat_tag: &str,
        candidate_username: &str,
        message_id: &str,
    ) -> Result<InteractiveStart> {
        if self.verified_role(community_id).await?.is_none() {
            return Ok(InteractiveStart::NotConfigured);
        }

        let Some(candidate) = self
            .collaborators
            .content
            .lookup_identity(candidate_username)
            .await?
        else {
            return Ok(InteractiveStart::UnknownAccount);
        };

        let session = ConfirmationSession::open(
            &self.bus,
            chat_id,
            chat_tag,
            candidate,
            message_id,
            self.settings.confirmation_window,
        );
        tracing::info!(
            session = session.id(),
            chat_id,
            candidate = candidate_username,
            "Confirmation session opened"
        );

        Ok(InteractiveStart::Started(session))
    }

    /// Drive a session to its terminal state and run that state's trigger.
    ///
    /// On `Accepted` a code is issued for the candidate and sent out of band.
    /// No link is created here; the recipient finishes with the code protocol.
    pub async fn complete_session(&self, mut session: ConfirmationSession) -> SessionReport {
        let state = session.wait().await;

        let notice = match state {
            SessionState::Accepted => match self.deliver_code(&session).await {
                Ok(()) => SessionNotice::CodeSent,
                Err(e) => {
                    tracing::warn!(session = session.id(), error = %e, "Accepted but code delivery failed");
                    SessionNotice::Failed
                }
            },
            SessionState::Denied => SessionNotice::Acknowledged,
            SessionState::Expired | SessionState::Open => SessionNotice::NoAnswer,
        };

        SessionReport {
            session_id: session.id().to_string(),
            subject: session.subject().to_string(),
            candidate: session.candidate().clone(),
            state,
            notice,
        }
    }

    async fn deliver_code(&self, session: &ConfirmationSession) -> Result<()> {
        let candidate = session.candidate();
        let code = self.codes.issue(candidate, Some(session.subject()))?;
        let text = code_message(
            &candidate.name,
            code,
            session.subject_tag(),
            self.settings.public_url.as_deref(),
        );
        self.collaborators
            .content
            .send_direct_message(candidate.id, &text)
            .await
    }

    // ========================================================================
    // UNLINK
    // ========================================================================

    /// Remove the active link of `chat_id` and revoke the verified role.
    ///
    /// A failed revoke does not restore the link.
    pub async fn unlink(&self, community_id: &str, chat_id: &str) -> Result<UnlinkOutcome> {
        let Some(role_id) = self.verified_role(community_id).await? else {
            return Ok(UnlinkOutcome::NotConfigured);
        };

        let connection = match self.registry.remove(None, Some(chat_id)) {
            Ok(connection) => connection,
            Err(Error::LinkNotFound) => return Ok(UnlinkOutcome::NotFound),
            Err(e) => return Err(e),
        };
        tracing::info!(
            chat_id,
            content = connection.content.name.as_str(),
            community_id,
            "Accounts unlinked"
        );

        match self
            .collaborators
            .roles
            .revoke_role(community_id, chat_id, &role_id)
            .await
        {
            Ok(()) => Ok(UnlinkOutcome::Unlinked { connection }),
            Err(e) => {
                tracing::warn!(chat_id, community_id, error = %e, "Unlinked but role revoke failed");
                Ok(UnlinkOutcome::PartialFailure {
                    connection,
                    reason: e.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // QUERIES & WELCOME
    // ========================================================================

    /// Active link of a chat identity.
    pub fn linked_account(&self, chat_id: &str) -> Result<Option<Connection>> {
        self.registry.find_by_chat_identity(chat_id)
    }

    /// Active link of a content identity.
    pub fn linked_chat(&self, content_id: i64) -> Result<Option<Connection>> {
        self.registry.find_by_content_identity(content_id)
    }

    /// Welcome prompt for a member who just passed screening.
    ///
    /// `None` unless the community has both a verified role and a welcome
    /// channel configured.
    pub async fn welcome_for(
        &self,
        community_id: &str,
        transition: &MemberTransition,
    ) -> Result<Option<WelcomeNotice>> {
        if !transition.passed_screening() {
            return Ok(None);
        }

        let config = self
            .collaborators
            .communities
            .get_config(community_id)
            .await?
            .unwrap_or_default();

        let CommunityConfig {
            verified_role_id: Some(_),
            welcome_channel_id: Some(channel_id),
        } = config
        else {
            return Ok(None);
        };

        Ok(Some(WelcomeNotice {
            channel_id,
            chat_id: transition.chat_id.clone(),
            text: "Welcome! Please verify yourself with `/verify` and link your account. Have fun!"
                .to_string(),
        }))
    }
}

/// Body of the out-of-band message carrying a code.
pub fn code_message(
    candidate_name: &str,
    code: u32,
    requester_tag: &str,
    public_url: Option<&str>,
) -> String {
    let mut steps = format!(
        "1. Executing the verify command in chat like this: `/verify userid:{candidate_name} code:{code}`"
    );
    if let Some(url) = public_url {
        steps.push_str(&format!(
            "\n2. Following this link: {}/verify/{code}",
            url.trim_end_matches('/')
        ));
    }

    format!(
        "Hello {candidate_name}!\n\n\
         If you requested a verification message from chat, then verify yourself with:\n\n\
         {steps}\n\n\
         This is to verify that you are the owner of the chat account `{requester_tag}`!\n\
         If you did not request this verification, please ignore this message!\n\n\
         This message is automated! Please don't reply to this message!"
    )
}
