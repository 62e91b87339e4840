//! Community configuration store.
//!
//! Uses DashMap for concurrent access. Persists the per-community
//! configuration to `communities.json` when `data_dir` is configured.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use verilink_core::linking::CommunityConfig;
use verilink_core::ports::CommunityDirectory;
use verilink_core::{Error, Result};

/// On-disk persistence format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedData {
    communities: HashMap<String, CommunityConfig>,
}

/// Store for community configuration.
#[derive(Clone, Default)]
pub struct CommunityStore {
    /// Community ID → configuration.
    configs: Arc<DashMap<String, CommunityConfig>>,

    /// Directory for persistence. None = in-memory only.
    data_dir: Option<PathBuf>,
}

impl CommunityStore {
    /// Create a store, persisting under `data_dir` when given.
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            configs: Arc::new(DashMap::new()),
            data_dir,
        }
    }

    fn data_file_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("communities.json"))
    }

    /// Load configuration from disk.
    ///
    /// Called once at startup. If the file doesn't exist or is corrupt,
    /// logs a warning and starts with an empty store.
    pub fn load_from_disk(&self) -> usize {
        let path = match self.data_file_path() {
            Some(p) => p,
            None => {
                tracing::info!("No data_dir configured, community config kept in memory only");
                return 0;
            }
        };

        if !path.exists() {
            tracing::info!(path = %path.display(), "No existing community file, starting fresh");
            return 0;
        }

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to read community file, starting fresh");
                return 0;
            }
        };

        match serde_json::from_str::<PersistedData>(&contents) {
            Ok(data) => {
                let count = data.communities.len();
                for (id, config) in data.communities {
                    self.configs.insert(id, config);
                }
                tracing::info!(communities = count, path = %path.display(), "Community config loaded from disk");
                count
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to parse community file, starting fresh");
                0
            }
        }
    }

    /// Write all configuration to disk.
    ///
    /// Uses atomic write (write to temp file, then rename).
    fn persist_to_disk(&self) -> Result<()> {
        let Some(path) = self.data_file_path() else {
            return Ok(());
        };

        let data = PersistedData {
            communities: self
                .configs
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&data)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Internal(format!("Failed to create data directory: {}", e))
            })?;
        }

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)
            .map_err(|e| Error::Internal(format!("Failed to write community file: {}", e)))?;
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(Error::Internal(format!(
                "Failed to rename temp file to communities.json: {}",
                e
            )));
        }

        tracing::debug!(path = %path.display(), "Community config persisted");
        Ok(())
    }

    /// Set the configuration of a community, replacing any previous one.
    pub fn set(&self, community_id: &str, config: CommunityConfig) -> Result<()> {
        self.configs.insert(community_id.to_string(), config);
        tracing::info!(community_id, "Community configured");
        self.persist_to_disk()
    }

    /// Configuration of a community.
    pub fn get(&self, community_id: &str) -> Option<CommunityConfig> {
        self.configs.get(community_id).map(|c| c.value().clone())
    }
}

#[async_trait]
impl CommunityDirectory for CommunityStore {
    async fn get_config(&self, community_id: &str) -> Result<Option<CommunityConfig>> {
        Ok(self.get(community_id))
    }
}
