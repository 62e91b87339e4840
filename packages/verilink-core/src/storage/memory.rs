//! In-memory backend.
//!
//! Uses DashMap for concurrent access. Live rows are keyed so that the
//! entry API gives an atomic check-then-insert; retired rows are archived.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::linking::{
    CodeStore, Connection, ConnectionRegistry, ContentAccount, VerificationCode,
};

/// Connections and codes held in memory.
///
/// Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// content_id → active connection.
    active: Arc<DashMap<i64, Connection>>,

    /// Removed connections, oldest first.
    removed: Arc<Mutex<Vec<Connection>>>,

    /// code value → unconsumed code.
    outstanding: Arc<DashMap<u32, VerificationCode>>,

    /// Consumed codes, oldest first.
    consumed: Arc<Mutex<Vec<VerificationCode>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removed connections, oldest first.
    pub fn removed_connections(&self) -> Vec<Connection> {
        self.removed.lock().clone()
    }

    /// Consumed codes, oldest first.
    pub fn consumed_codes(&self) -> Vec<VerificationCode> {
        self.consumed.lock().clone()
    }
}

fn matches_keys(connection: &Connection, content_id: Option<i64>, chat_id: Option<&str>) -> bool {
    content_id.map_or(true, |id| connection.content.id == id)
        && chat_id.map_or(true, |id| connection.chat_id == id)
}

impl ConnectionRegistry for MemoryStore {
    fn create(&self, content: &ContentAccount, chat_id: &str) -> Result<Connection> {
        match self.active.entry(content.id) {
            Entry::Occupied(_) => Err(Error::AlreadyLinked),
            Entry::Vacant(slot) => {
                let record = Connection::new(content.clone(), chat_id);
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    fn remove(&self, content_id: Option<i64>, chat_id: Option<&str>) -> Result<Connection> {
        if content_id.is_none() && chat_id.is_none() {
            return Err(Error::MissingKey);
        }

        // Collect keys first; removing while iterating would deadlock on the shard.
        let keys: Vec<i64> = match content_id {
            Some(id) => vec![id],
            None => self
                .active
                .iter()
                .filter(|entry| matches_keys(entry.value(), content_id, chat_id))
                .map(|entry| *entry.key())
                .collect(),
        };

        let now = Utc::now();
        let mut removed: Vec<Connection> = keys
            .into_iter()
            .filter_map(|key| {
                self.active
                    .remove_if(&key, |_, c| matches_keys(c, content_id, chat_id))
            })
            .map(|(_, connection)| Connection {
                removed_at: Some(now),
                ..connection
            })
            .collect();

        if removed.is_empty() {
            return Err(Error::LinkNotFound);
        }

        removed.sort_by_key(|c| c.linked_at);
        let latest = removed[removed.len() - 1].clone();
        self.removed.lock().extend(removed);

        Ok(latest)
    }

    fn find_by_content_identity(&self, content_id: i64) -> Result<Option<Connection>> {
        Ok(self.active.get(&content_id).map(|c| c.value().clone()))
    }

    fn find_by_chat_identity(&self, chat_id: &str) -> Result<Option<Connection>> {
        Ok(self
            .active
            .iter()
            .filter(|entry| entry.chat_id == chat_id)
            .max_by_key(|entry| entry.linked_at)
            .map(|entry| entry.value().clone()))
    }
}

impl CodeStore for MemoryStore {
    fn insert_if_free(&self, record: &VerificationCode) -> Result<bool> {
        match self.outstanding.entry(record.code) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    fn find_outstanding(&self, code: u32) -> Result<Vec<VerificationCode>> {
        Ok(self
            .outstanding
            .get(&code)
            .map(|c| vec![c.value().clone()])
            .unwrap_or_default())
    }

    fn consume(&self, code: u32) -> Result<Vec<VerificationCode>> {
        let Some((_, record)) = self.outstanding.remove(&code) else {
            return Ok(Vec::new());
        };

        let record = VerificationCode {
            consumed: true,
            consumed_at: Some(Utc::now()),
            ..record
        };
        self.consumed.lock().push(record.clone());

        Ok(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_links_are_archived() {
        let store = MemoryStore::new();
        store.create(&ContentAccount::new(7, "nimrod"), "chat-1").unwrap();
        store.remove(None, Some("chat-1")).unwrap();

        let archived = store.removed_connections();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].removed_at.is_some());
    }

    #[test]
    fn test_consumed_codes_are_archived() {
        let store = MemoryStore::new();
        let record = VerificationCode::new(482193, ContentAccount::new(7, "nimrod"), None);
        assert!(store.insert_if_free(&record).unwrap());
        assert!(!store.insert_if_free(&record).unwrap());

        store.consume(482193).unwrap();
        let archived = store.consumed_codes();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].consumed);

        // The value is free again.
        assert!(store.insert_if_free(&record).unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.create(&ContentAccount::new(1, "a"), "chat-1").unwrap();
        assert!(other.find_by_content_identity(1).unwrap().is_some());
    }
}
