//! # Confirmation Session
//!
//! A single-use, single-responder yes/no exchange bounded by a deadline.
//!
//! ## State Machine
//!
//! ```text
//!                    accept from subject
//!              ┌──────────────────────────► Accepted
//!              │
//!    Open ─────┼──── deny from subject ────► Denied
//!              │
//!              └──── deadline elapsed ─────► Expired
//!
//!   All three are terminal. Events from anyone other than the subject, or
//!   for another message, are dropped without effect.
//! ```
//!
//! Responses arrive over the [`InteractionBus`]. The session subscribes when it
//! is opened, so a press that lands before [`ConfirmationSession::wait`] starts
//! is still seen. If a response and the deadline are ready at the same time,
//! the response wins.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::types::ContentAccount;

/// Default capacity of the interaction bus.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Lifecycle state of a [`ConfirmationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for the subject or the deadline.
    Open,
    /// The subject confirmed in time.
    Accepted,
    /// The subject declined in time.
    Denied,
    /// Nobody answered before the deadline.
    Expired,
}

impl SessionState {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Open)
    }
}

/// A button press on the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    /// "Yes, this is me!"
    Accept,
    /// "No, this is not me!"
    Deny,
}

/// A response event tagged with who pressed and on which message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Chat user who pressed the button.
    pub responder_id: String,
    /// Message carrying the buttons.
    pub message_id: String,
    /// Which button.
    pub response: Response,
}

/// Fan-out channel carrying interaction events to open sessions.
#[derive(Clone)]
pub struct InteractionBus {
    tx: broadcast::Sender<InteractionEvent>,
}

impl InteractionBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns how many sessions were listening.
    pub fn publish(&self, event: InteractionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<InteractionEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InteractionBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// An interactive confirmation scoped to one subject and one message.
#[derive(Debug)]
pub struct ConfirmationSession {
    id: String,
    subject: String,
    subject_tag: String,
    candidate: ContentAccount,
    message_id: String,
    deadline: Instant,
    state: SessionState,
    events: Option<broadcast::Receiver<InteractionEvent>>,
}

impl ConfirmationSession {
    /// Open a session that listens on `bus` for `window` from now.
    pub fn open(
        bus: &InteractionBus,
        subject: &str,
        subject_tag: &str,
        candidate: ContentAccount,
        message_id: &str,
        window: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            subject_tag: subject_tag.to_string(),
            candidate,
            message_id: message_id.to_string(),
            deadline: Instant::now() + window,
            state: SessionState::Open,
            events: Some(bus.subscribe()),
        }
    }

    /// Session ID (UUID v4).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Chat user whose answer counts.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Display tag of the subject (used in the out-of-band message).
    pub fn subject_tag(&self) -> &str {
        &self.subject_tag
    }

    /// Content identity being confirmed.
    pub fn candidate(&self) -> &ContentAccount {
        &self.candidate
    }

    /// Message carrying the prompt.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Absolute expiry instant.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feed one event into the state machine.
    ///
    /// Returns `true` if it caused the (single) transition out of `Open`.
    pub fn offer(&mut self, event: &InteractionEvent) -> bool {
        if self.state.is_terminal() {
            tracing::debug!(session = self.id.as_str(), "Ignoring response to a closed session");
            return false;
        }
        if event.responder_id != self.subject || event.message_id != self.message_id {
            tracing::debug!(
                session = self.id.as_str(),
                responder = event.responder_id.as_str(),
                "Ignoring response from outside the session scope"
            );
            return false;
        }

        self.state = match event.response {
            Response::Accept => SessionState::Accepted,
            Response::Deny => SessionState::Denied,
        };
        tracing::info!(session = self.id.as_str(), state = ?self.state, "Confirmation answered");
        true
    }

    /// Close the session as unanswered. No effect once terminal.
    pub fn expire(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Expired;
        tracing::info!(session = self.id.as_str(), "Confirmation expired without an answer");
        true
    }

    /// Wait for the first valid response or the deadline, whichever comes first.
    ///
    /// The bus subscription is dropped on return.
    pub async fn wait(&mut self) -> SessionState {
        let mut events = self.events.take();
        let deadline = tokio::time::sleep_until(self.deadline);
        tokio::pin!(deadline);

        while !self.state.is_terminal() {
            tokio::select! {
                biased;

                received = recv(&mut events) => match received {
                    Ok(event) => {
                        self.offer(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(session = self.id.as_str(), skipped, "Interaction bus lagged");
                    }
                    Err(RecvError::Closed) => {
                        events = None;
                    }
                },

                _ = &mut deadline => {
                    self.expire();
                }
            }
        }

        self.state
    }
}

/// Receive from an optional subscription; pends forever once it is gone.
async fn recv(
    events: &mut Option<broadcast::Receiver<InteractionEvent>>,
) -> std::result::Result<InteractionEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
