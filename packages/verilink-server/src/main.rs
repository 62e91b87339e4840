//! Verilink Server
//!
//! HTTP command surface for the linking engine. A chat bot (or any other
//! front end) forwards its slash commands and button presses here.
//!
//! 1. **Code linking**: `POST /link/code` consumes a one-time code and links
//!    the chat user to the content account the code was issued for.
//!
//! 2. **Interactive linking**: `POST /link/interactive` asks the chat user to
//!    confirm a content account; on "yes" a code is sent to that account's
//!    inbox. Button presses arrive on `POST /interactions`.
//!
//! 3. **Unlinking** and link lookup, community configuration and the
//!    welcome prompt after membership screening.

mod api;
mod community;
mod discord;
mod lemmy;
mod state;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use verilink_core::linking::{
    CodeStore, Collaborators, ConnectionRegistry, InteractionBus, LinkingFacade, LinkingSettings,
    VerificationCodeService,
};
use verilink_core::storage::{Database, MemoryStore};

use community::CommunityStore;
use discord::DiscordClient;
use lemmy::LemmyClient;
use state::{AppState, ServerConfig};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "verilink-server", version, about = "Account linking server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "VERILINK_PORT")]
    port: u16,

    /// SQLite database file. In-memory stores when unset.
    #[arg(long, env = "VERILINK_DATABASE")]
    database: Option<String>,

    /// Directory for persisted community configuration.
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Public base URL; adds a `/verify/{code}` link to code messages.
    #[arg(long, env = "PUBLIC_URL")]
    public_url: Option<String>,

    /// Content platform (Lemmy) base URL
    #[arg(long, default_value = "http://localhost:8536", env = "CONTENT_API_URL")]
    content_api_url: String,

    /// Content platform bot account token
    #[arg(long, env = "CONTENT_API_TOKEN")]
    content_api_token: Option<String>,

    /// Chat platform (Discord) API base URL
    #[arg(long, default_value = "https://discord.com/api/v10", env = "CHAT_API_URL")]
    chat_api_url: String,

    /// Chat platform bot token
    #[arg(long, env = "CHAT_BOT_TOKEN")]
    chat_bot_token: Option<String>,

    /// How long an interactive confirmation stays open, in seconds
    #[arg(long, default_value_t = 30, env = "CONFIRMATION_WINDOW_SECS")]
    confirmation_window_secs: u64,

    /// How long finished session reports stay pollable, in seconds
    #[arg(long, default_value_t = 600, env = "REPORT_TTL_SECS")]
    report_ttl_secs: i64,

    /// Cleanup interval in seconds
    #[arg(long, default_value_t = 60, env = "CLEANUP_INTERVAL_SECS")]
    cleanup_interval_secs: u64,
}

/// Registry and code store backed by the same storage.
fn open_storage(
    database: Option<&str>,
) -> verilink_core::Result<(Arc<dyn ConnectionRegistry>, Arc<dyn CodeStore>)> {
    match database {
        Some(path) => {
            let db = Arc::new(Database::open(Some(path))?);
            tracing::info!(path, "Using SQLite storage");
            let registry: Arc<dyn ConnectionRegistry> = db.clone();
            let codes: Arc<dyn CodeStore> = db;
            Ok((registry, codes))
        }
        None => {
            tracing::info!("No database configured, links and codes kept in memory only");
            let store = Arc::new(MemoryStore::new());
            let registry: Arc<dyn ConnectionRegistry> = store.clone();
            let codes: Arc<dyn CodeStore> = store;
            Ok((registry, codes))
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "verilink_server=info,verilink_core=info,tower_http=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig {
        port: args.port,
        confirmation_window_secs: args.confirmation_window_secs,
        report_ttl_secs: args.report_ttl_secs,
    };

    let (registry, code_store) = open_storage(args.database.as_deref())?;

    let communities = CommunityStore::new(args.data_dir);
    communities.load_from_disk();

    let discord = Arc::new(DiscordClient::new(&args.chat_api_url, args.chat_bot_token));
    if args.content_api_token.is_none() {
        tracing::warn!("CONTENT_API_TOKEN not set, verification codes cannot be delivered");
    }
    let lemmy = Arc::new(LemmyClient::new(
        &args.content_api_url,
        args.content_api_token,
    ));

    let facade = LinkingFacade::new(
        registry,
        VerificationCodeService::with_random_codes(code_store),
        Collaborators {
            communities: Arc::new(communities.clone()),
            roles: discord.clone(),
            content: lemmy,
        },
        InteractionBus::default(),
        LinkingSettings {
            confirmation_window: config.confirmation_window(),
            public_url: args.public_url,
        },
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(facade, communities, discord, config);

    // Spawn periodic cleanup task
    let cleanup_state = state.clone();
    let cleanup_interval = args.cleanup_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup_interval));
        loop {
            interval.tick().await;
            cleanup_state.cleanup_expired();
        }
    });

    let app = api::router(state);

    tracing::info!("Verilink server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use verilink_core::linking::ContentAccount;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["verilink-server"]).unwrap();
        assert_eq!(args.confirmation_window_secs, 30);
        assert_eq!(args.report_ttl_secs, 600);
        assert_eq!(args.content_api_url, "http://localhost:8536");
        assert_eq!(args.chat_api_url, "https://discord.com/api/v10");
    }

    #[test]
    fn test_args_override() {
        let args = Args::try_parse_from([
            "verilink-server",
            "--port",
            "9000",
            "--public-url",
            "https://verify.example",
            "--confirmation-window-secs",
            "45",
        ])
        .unwrap();
        assert_eq!(args.port, 9000);
        assert_eq!(args.public_url.as_deref(), Some("https://verify.example"));
        assert_eq!(args.confirmation_window_secs, 45);
    }

    #[test]
    fn test_sqlite_storage_shares_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.db");
        let (registry, codes) = open_storage(path.to_str()).unwrap();

        registry
            .create(&ContentAccount::new(7, "nimrod"), "chat-1")
            .unwrap();
        assert!(codes
            .insert_if_free(&verilink_core::linking::VerificationCode::new(
                123456,
                ContentAccount::new(7, "nimrod"),
                None,
            ))
            .unwrap());

        let reopened = Database::open(path.to_str()).unwrap();
        assert!(reopened.find_by_content_identity(7).unwrap().is_some());
        assert_eq!(reopened.find_outstanding(123456).unwrap().len(), 1);
    }
}
