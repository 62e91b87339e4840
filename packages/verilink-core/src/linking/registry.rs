//! # Connection Registry
//!
//! Durable store of identity links. Enforces at most one active link per
//! content identity; pure data access, no external calls.
//!
//! Backends: [`MemoryStore`](crate::storage::MemoryStore) and
//! [`Database`](crate::storage::Database).

use crate::error::Result;

use super::types::{Connection, ContentAccount};

/// Store of [`Connection`] records.
pub trait ConnectionRegistry: Send + Sync {
    /// Insert a new active link.
    ///
    /// Fails with [`Error::AlreadyLinked`](crate::Error::AlreadyLinked) when an
    /// active link already exists for `content.id`; the existing record is left
    /// untouched. The check and the insert are a single atomic step.
    fn create(&self, content: &ContentAccount, chat_id: &str) -> Result<Connection>;

    /// Remove the active link(s) matching every supplied key.
    ///
    /// At least one key is required ([`Error::MissingKey`](crate::Error::MissingKey)).
    /// Returns the most recent removed record, or
    /// [`Error::LinkNotFound`](crate::Error::LinkNotFound) when nothing matched.
    fn remove(&self, content_id: Option<i64>, chat_id: Option<&str>) -> Result<Connection>;

    /// Active link for a content identity.
    fn find_by_content_identity(&self, content_id: i64) -> Result<Option<Connection>>;

    /// Latest active link for a chat identity.
    fn find_by_chat_identity(&self, chat_id: &str) -> Result<Option<Connection>>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::storage::{Database, MemoryStore};

    fn backends() -> Vec<(&'static str, Arc<dyn ConnectionRegistry>)> {
        vec![
            ("memory", Arc::new(MemoryStore::new())),
            ("sqlite", Arc::new(Database::open(None).unwrap())),
        ]
    }

    fn nimrod() -> ContentAccount {
        ContentAccount::new(7, "nimrod")
    }

    #[test]
    fn test_second_create_is_rejected_and_first_kept() {
        for (name, registry) in backends() {
            let first = registry.create(&nimrod(), "chat-a").unwrap();

            let err = registry.create(&nimrod(), "chat-b").unwrap_err();
            assert!(matches!(err, Error::AlreadyLinked), "{name}: {err:?}");

            let active = registry.find_by_content_identity(7).unwrap().unwrap();
            assert_eq!(active, first, "{name}");
        }
    }

    #[test]
    fn test_remove_by_either_key() {
        for (name, registry) in backends() {
            registry.create(&nimrod(), "chat-a").unwrap();
            let removed = registry.remove(Some(7), None).unwrap();
            assert_eq!(removed.chat_id, "chat-a", "{name}");
            assert!(!removed.is_active(), "{name}");

            registry.create(&nimrod(), "chat-b").unwrap();
            let removed = registry.remove(None, Some("chat-b")).unwrap();
            assert_eq!(removed.content.id, 7, "{name}");

            assert!(registry.find_by_content_identity(7).unwrap().is_none(), "{name}");
        }
    }

    #[test]
    fn test_remove_without_match_is_not_found() {
        for (name, registry) in backends() {
            let err = registry.remove(None, Some("nobody")).unwrap_err();
            assert!(matches!(err, Error::LinkNotFound), "{name}: {err:?}");
        }
    }

    #[test]
    fn test_remove_requires_a_key() {
        for (name, registry) in backends() {
            let err = registry.remove(None, None).unwrap_err();
            assert!(matches!(err, Error::MissingKey), "{name}: {err:?}");
        }
    }

    #[test]
    fn test_remove_with_both_keys_must_match_both() {
        for (name, registry) in backends() {
            registry.create(&nimrod(), "chat-a").unwrap();

            let err = registry.remove(Some(7), Some("chat-z")).unwrap_err();
            assert!(matches!(err, Error::LinkNotFound), "{name}");

            assert!(registry.remove(Some(7), Some("chat-a")).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_relink_after_removal() {
        for (name, registry) in backends() {
            registry.create(&nimrod(), "chat-a").unwrap();
            registry.remove(None, Some("chat-a")).unwrap();

            let again = registry.create(&nimrod(), "chat-a").unwrap();
            assert!(again.is_active(), "{name}");
        }
    }

    #[test]
    fn test_chat_identity_may_hold_several_links() {
        for (name, registry) in backends() {
            registry.create(&ContentAccount::new(1, "alice"), "chat-a").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
            let latest = registry.create(&ContentAccount::new(2, "bob"), "chat-a").unwrap();

            let found = registry.find_by_chat_identity("chat-a").unwrap().unwrap();
            assert_eq!(found.id, latest.id, "{name}");

            // Removing by chat identity clears every active link it holds.
            registry.remove(None, Some("chat-a")).unwrap();
            assert!(registry.find_by_chat_identity("chat-a").unwrap().is_none(), "{name}");
            assert!(registry.find_by_content_identity(1).unwrap().is_none(), "{name}");
        }
    }

    #[test]
    fn test_concurrent_creates_admit_exactly_one() {
        for (name, registry) in backends() {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let registry = Arc::clone(&registry);
                    std::thread::spawn(move || {
                        registry.create(&ContentAccount::new(42, "racer"), &format!("chat-{i}"))
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|r| r.is_ok())
                .count();
            assert_eq!(wins, 1, "{name}");
        }
    }
}
