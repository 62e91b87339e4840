//! Server state management.
//!
//! Holds the linking facade, the community store and the reports of
//! interactive sessions. All maps are concurrent (DashMap).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use verilink_core::linking::{ConfirmationSession, LinkingFacade, SessionReport};

use crate::community::CommunityStore;
use crate::discord::ChannelMessenger;

/// Default confirmation window in seconds.
const DEFAULT_CONFIRMATION_WINDOW_SECS: u64 = 30;

/// Default time a finished session report stays pollable (10 minutes).
const DEFAULT_REPORT_TTL_SECS: i64 = 600;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub confirmation_window_secs: u64,
    pub report_ttl_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            confirmation_window_secs: DEFAULT_CONFIRMATION_WINDOW_SECS,
            report_ttl_secs: DEFAULT_REPORT_TTL_SECS,
        }
    }
}

impl ServerConfig {
    /// Confirmation window as a duration.
    pub fn confirmation_window(&self) -> Duration {
        Duration::from_secs(self.confirmation_window_secs)
    }
}

/// Tracking entry for an interactive session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    /// Chat user the session is scoped to.
    pub subject: String,
    /// When the session was opened.
    pub opened_at: DateTime<Utc>,
    /// Terminal report, once the session has ended.
    pub report: Option<SessionReport>,
    /// When the report was stored.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Linking engine.
    pub facade: LinkingFacade,

    /// Community configuration (also the facade's CommunityDirectory).
    pub communities: CommunityStore,

    /// Posts welcome messages into chat channels.
    pub messenger: Arc<dyn ChannelMessenger>,

    /// Session ID → tracking entry.
    /// Finished entries are evicted by `cleanup_expired` after the report TTL.
    pub sessions: Arc<DashMap<String, SessionEntry>>,

    /// Server configuration.
    pub config: ServerConfig,
}

impl AppState {
    /// Create a new state.
    pub fn new(
        facade: LinkingFacade,
        communities: CommunityStore,
        messenger: Arc<dyn ChannelMessenger>,
        config: ServerConfig,
    ) -> Self {
        Self {
            facade,
            communities,
            messenger,
            sessions: Arc::new(DashMap::new()),
            config,
        }
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    /// Track a freshly opened session and drive it to completion in the
    /// background. Returns the session ID.
    pub fn track_session(&self, session: ConfirmationSession) -> String {
        let session_id = session.id().to_string();
        self.sessions.insert(
            session_id.clone(),
            SessionEntry {
                subject: session.subject().to_string(),
                opened_at: Utc::now(),
                report: None,
                finished_at: None,
            },
        );

        let state = self.clone();
        tokio::spawn(async move {
            let report = state.facade.complete_session(session).await;
            state.finish_session(report);
        });

        session_id
    }

    /// Store the terminal report of a session.
    pub fn finish_session(&self, report: SessionReport) {
        tracing::info!(
            session = report.session_id.as_str(),
            state = ?report.state,
            notice = ?report.notice,
            "Session finished"
        );
        if let Some(mut entry) = self.sessions.get_mut(&report.session_id) {
            entry.report = Some(report);
            entry.finished_at = Some(Utc::now());
        }
    }

    /// Current tracking entry of a session.
    pub fn session(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    // ── Cleanup ───────────────────────────────────────────────────────────

    /// Evict finished session reports older than the report TTL.
    pub fn cleanup_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.report_ttl_secs);
        let before = self.sessions.len();

        self.sessions
            .retain(|_, entry| entry.finished_at.map_or(true, |at| at > cutoff));

        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::info!(evicted, "Cleaned up finished session reports");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_state;
    use verilink_core::linking::{ContentAccount, SessionNotice, SessionState};

    fn report(session_id: &str) -> SessionReport {
        SessionReport {
            session_id: session_id.to_string(),
            subject: "chat-1".to_string(),
            candidate: ContentAccount::new(7, "nimrod"),
            state: SessionState::Expired,
            notice: SessionNotice::NoAnswer,
        }
    }

    fn entry(finished_at: Option<DateTime<Utc>>) -> SessionEntry {
        SessionEntry {
            subject: "chat-1".to_string(),
            opened_at: Utc::now(),
            report: None,
            finished_at,
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.confirmation_window(), Duration::from_secs(30));
        assert_eq!(config.report_ttl_secs, 600);
    }

    #[tokio::test]
    async fn test_finish_session_stores_report() {
        let harness = test_state();
        harness.state.sessions.insert("s-1".into(), entry(None));

        harness.state.finish_session(report("s-1"));

        let stored = harness.state.session("s-1").unwrap();
        assert_eq!(stored.report.unwrap().notice, SessionNotice::NoAnswer);
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_only_stale_reports() {
        let harness = test_state();
        let state = &harness.state;
        let stale = Utc::now() - chrono::Duration::seconds(state.config.report_ttl_secs + 5);

        state.sessions.insert("open".into(), entry(None));
        state.sessions.insert("fresh".into(), entry(Some(Utc::now())));
        state.sessions.insert("stale".into(), entry(Some(stale)));

        state.cleanup_expired();

        assert!(state.session("open").is_some());
        assert!(state.session("fresh").is_some());
        assert!(state.session("stale").is_none());
    }
}
