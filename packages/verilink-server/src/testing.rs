//! Recording fakes for the external platforms, shared by the handler tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use verilink_core::linking::{
    Collaborators, CommunityConfig, ContentAccount, FixedCodeSource, InteractionBus,
    LinkingFacade, LinkingSettings, VerificationCodeService,
};
use verilink_core::ports::{ContentPlatform, RoleDirectory};
use verilink_core::storage::MemoryStore;
use verilink_core::Result;

use crate::community::CommunityStore;
use crate::discord::ChannelMessenger;
use crate::state::{AppState, ServerConfig};

pub const GUILD: &str = "guild-1";

#[derive(Default)]
pub struct FakeRoles {
    pub grants: Mutex<Vec<String>>,
    pub revokes: Mutex<Vec<String>>,
}

#[async_trait]
impl RoleDirectory for FakeRoles {
    async fn grant_role(&self, _community: &str, chat_id: &str, _role: &str) -> Result<()> {
        self.grants.lock().push(chat_id.to_string());
        Ok(())
    }

    async fn revoke_role(&self, _community: &str, chat_id: &str, _role: &str) -> Result<()> {
        self.revokes.lock().push(chat_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeContent {
    pub sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl ContentPlatform for FakeContent {
    async fn lookup_identity(&self, username: &str) -> Result<Option<ContentAccount>> {
        Ok((username == "nimrod").then(|| ContentAccount::new(7, "nimrod")))
    }

    async fn send_direct_message(&self, account_id: i64, text: &str) -> Result<()> {
        self.sent.lock().push((account_id, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    pub posted: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChannelMessenger for FakeMessenger {
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<()> {
        self.posted
            .lock()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub codes: VerificationCodeService,
    pub roles: Arc<FakeRoles>,
    pub content: Arc<FakeContent>,
    pub messenger: Arc<FakeMessenger>,
}

/// In-memory state with `GUILD` configured and the first code fixed to 482193.
pub fn test_state() -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let codes = VerificationCodeService::new(store.clone(), Arc::new(FixedCodeSource::new([482193])));

    let communities = CommunityStore::new(None);
    communities
        .set(
            GUILD,
            CommunityConfig {
                verified_role_id: Some("role-verified".into()),
                welcome_channel_id: Some("welcome".into()),
            },
        )
        .unwrap();

    let roles = Arc::new(FakeRoles::default());
    let content = Arc::new(FakeContent::default());
    let messenger = Arc::new(FakeMessenger::default());

    let facade = LinkingFacade::new(
        store,
        codes.clone(),
        Collaborators {
            communities: Arc::new(communities.clone()),
            roles: roles.clone(),
            content: content.clone(),
        },
        InteractionBus::default(),
        LinkingSettings::default(),
    );

    TestHarness {
        state: AppState::new(facade, communities, messenger.clone(), ServerConfig::default()),
        codes,
        roles,
        content,
        messenger,
    }
}
