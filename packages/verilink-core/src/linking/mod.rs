//! # Linking Module
//!
//! Binds a content-platform identity to a chat-platform identity, proven by
//! a one-time code delivered out of band.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           LINKING ENGINE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                        LinkingFacade                             │  │
//! │  │   link_by_code · start_interactive_link · complete_session      │  │
//! │  │   unlink · linked_account · welcome_for                         │  │
//! │  └───────┬──────────────────┬──────────────────────┬───────────────┘  │
//! │          │                  │                      │                   │
//! │          ▼                  ▼                      ▼                   │
//! │  ┌───────────────┐  ┌─────────────────────┐  ┌──────────────────────┐ │
//! │  │ Connection    │  │ VerificationCode    │  │ ConfirmationSession  │ │
//! │  │ Registry      │  │ Service             │  │ (+ InteractionBus)   │ │
//! │  │ one active    │  │ issue / verify      │  │ Open → Accepted,     │ │
//! │  │ link per      │  │ single-use codes    │  │ Denied or Expired    │ │
//! │  │ content id    │  │                     │  │                      │ │
//! │  └───────────────┘  └─────────────────────┘  └──────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Links are only ever created by the code protocol. The interactive
//! protocol just gets a code into the candidate's inbox.

mod codes;
mod facade;
mod registry;
mod session;
mod types;

pub use codes::{
    CodeSource, CodeStore, FixedCodeSource, RandomCodeSource, VerificationCodeService, CODE_MAX,
    CODE_MIN, MAX_ISSUE_ATTEMPTS,
};
pub use facade::{
    code_message, Collaborators, InteractiveStart, LinkOutcome, LinkingFacade, LinkingSettings,
    SessionNotice, SessionReport, UnlinkOutcome, DEFAULT_CONFIRMATION_WINDOW,
};
pub use registry::ConnectionRegistry;
pub use session::{
    ConfirmationSession, InteractionBus, InteractionEvent, Response, SessionState,
    DEFAULT_BUS_CAPACITY,
};
pub use types::{
    CommunityConfig, Connection, ContentAccount, MemberTransition, VerificationCode, WelcomeNotice,
};
