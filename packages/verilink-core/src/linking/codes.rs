//! # Verification Codes
//!
//! Issues, stores and consumes one-time numeric codes bound to a content
//! identity.
//!
//! ## Two-step consumption
//!
//! ```text
//!   verify(code, false) ──► owner check by caller ──► registry.create ──► verify(code, true)
//!        (peek)                                                            (commit, atomic)
//! ```
//!
//! A code is the sole lookup key during consumption, so its value must be
//! unique among all outstanding codes, not just the owner's.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;

use crate::error::{Error, Result};

use super::types::{ContentAccount, VerificationCode};

/// Smallest code value (six digits).
pub const CODE_MIN: u32 = 100_000;

/// One past the largest code value.
pub const CODE_MAX: u32 = 1_000_000;

/// How many draws `issue` makes before giving up on a free value.
pub const MAX_ISSUE_ATTEMPTS: usize = 64;

/// Storage for [`VerificationCode`] records.
pub trait CodeStore: Send + Sync {
    /// Insert `record` unless an unconsumed code with the same value exists.
    ///
    /// Returns `false` on collision. Check and insert are one atomic step.
    fn insert_if_free(&self, record: &VerificationCode) -> Result<bool>;

    /// Unconsumed records with this value.
    fn find_outstanding(&self, code: u32) -> Result<Vec<VerificationCode>>;

    /// Atomically mark the unconsumed records with this value as consumed and
    /// return them. Of two concurrent callers only one gets a non-empty result.
    fn consume(&self, code: u32) -> Result<Vec<VerificationCode>>;
}

/// Source of candidate code values.
pub trait CodeSource: Send + Sync {
    /// Draw the next candidate value.
    fn next_code(&self) -> u32;
}

/// Uniformly random six-digit codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn next_code(&self) -> u32 {
        rand::thread_rng().gen_range(CODE_MIN..CODE_MAX)
    }
}

/// Replays a fixed list of values, then falls back to random ones.
///
/// Useful wherever a predictable code is needed (tests, demos).
#[derive(Debug, Default)]
pub struct FixedCodeSource {
    queue: Mutex<VecDeque<u32>>,
}

impl FixedCodeSource {
    /// Create a source that yields `codes` in order.
    pub fn new(codes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: Mutex::new(codes.into_iter().collect()),
        }
    }
}

impl CodeSource for FixedCodeSource {
    fn next_code(&self) -> u32 {
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| RandomCodeSource.next_code())
    }
}

/// Issues and consumes verification codes.
#[derive(Clone)]
pub struct VerificationCodeService {
    store: Arc<dyn CodeStore>,
    source: Arc<dyn CodeSource>,
}

impl VerificationCodeService {
    /// Create a service over `store`, drawing values from `source`.
    pub fn new(store: Arc<dyn CodeStore>, source: Arc<dyn CodeSource>) -> Self {
        Self { store, source }
    }

    /// Create a service with random codes.
    pub fn with_random_codes(store: Arc<dyn CodeStore>) -> Self {
        Self::new(store, Arc::new(RandomCodeSource))
    }

    /// Issue a new code for `owner`.
    ///
    /// Draws values until one is free system-wide, up to
    /// [`MAX_ISSUE_ATTEMPTS`] times.
    pub fn issue(&self, owner: &ContentAccount, requested_by: Option<&str>) -> Result<u32> {
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let code = self.source.next_code();
            let record =
                VerificationCode::new(code, owner.clone(), requested_by.map(str::to_string));

            if self.store.insert_if_free(&record)? {
                tracing::info!(
                    owner = owner.name.as_str(),
                    requested_by = requested_by.unwrap_or("-"),
                    "Verification code issued"
                );
                return Ok(code);
            }
            tracing::debug!("Code value collided with an outstanding code, drawing again");
        }

        Err(Error::CodeSpaceExhausted)
    }

    /// Look up unconsumed records for `code`.
    ///
    /// With `mark_consumed` the matches are consumed as part of the lookup.
    /// An empty result means "invalid or already used" and is not an error.
    pub fn verify(&self, code: u32, mark_consumed: bool) -> Result<Vec<VerificationCode>> {
        if !mark_consumed {
            return self.store.find_outstanding(code);
        }

        let consumed = self.store.consume(code)?;
        if let Some(record) = consumed.first() {
            tracing::info!(
                owner = record.owner.name.as_str(),
                at = %record.consumed_at.unwrap_or_else(Utc::now),
                "Verification code consumed"
            );
        }
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, MemoryStore};

    fn services(codes: &[u32]) -> Vec<(&'static str, VerificationCodeService)> {
        vec![
            (
                "memory",
                VerificationCodeService::new(
                    Arc::new(MemoryStore::new()),
                    Arc::new(FixedCodeSource::new(codes.to_vec())),
                ),
            ),
            (
                "sqlite",
                VerificationCodeService::new(
                    Arc::new(Database::open(None).unwrap()),
                    Arc::new(FixedCodeSource::new(codes.to_vec())),
                ),
            ),
        ]
    }

    fn bob() -> ContentAccount {
        ContentAccount::new(2, "bob")
    }

    #[test]
    fn test_random_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = RandomCodeSource.next_code();
            assert!((CODE_MIN..CODE_MAX).contains(&code));
        }
    }

    #[test]
    fn test_issue_returns_drawn_code() {
        for (name, service) in services(&[482193]) {
            let code = service.issue(&bob(), Some("chat-1")).unwrap();
            assert_eq!(code, 482193, "{name}");

            let found = service.verify(code, false).unwrap();
            assert_eq!(found.len(), 1, "{name}");
            assert_eq!(found[0].owner, bob(), "{name}");
            assert_eq!(found[0].requested_by.as_deref(), Some("chat-1"), "{name}");
            assert!(!found[0].consumed, "{name}");
        }
    }

    #[test]
    fn test_issue_skips_outstanding_values_of_other_owners() {
        for (name, service) in services(&[111111, 111111, 222222]) {
            service.issue(&bob(), None).unwrap();
            let second = service.issue(&ContentAccount::new(3, "carol"), None).unwrap();
            assert_eq!(second, 222222, "{name}");
        }
    }

    #[test]
    fn test_consumed_value_can_be_reissued() {
        for (name, service) in services(&[333333, 333333]) {
            service.issue(&bob(), None).unwrap();
            service.verify(333333, true).unwrap();

            let again = service.issue(&ContentAccount::new(3, "carol"), None).unwrap();
            assert_eq!(again, 333333, "{name}");
            let found = service.verify(333333, false).unwrap();
            assert_eq!(found[0].owner.name, "carol", "{name}");
        }
    }

    #[test]
    fn test_issue_gives_up_when_space_is_taken() {
        let values = vec![444444; MAX_ISSUE_ATTEMPTS + 1];
        for (name, service) in services(&values) {
            service.issue(&bob(), None).unwrap();
            let err = service.issue(&bob(), None).unwrap_err();
            assert!(matches!(err, Error::CodeSpaceExhausted), "{name}");
        }
    }

    #[test]
    fn test_peek_does_not_consume() {
        for (name, service) in services(&[555555]) {
            service.issue(&bob(), None).unwrap();
            assert_eq!(service.verify(555555, false).unwrap().len(), 1, "{name}");
            assert_eq!(service.verify(555555, false).unwrap().len(), 1, "{name}");
        }
    }

    #[test]
    fn test_code_is_single_use() {
        for (name, service) in services(&[666666]) {
            service.issue(&bob(), None).unwrap();

            let consumed = service.verify(666666, true).unwrap();
            assert_eq!(consumed.len(), 1, "{name}");
            assert!(consumed[0].consumed, "{name}");
            assert!(consumed[0].consumed_at.is_some(), "{name}");

            assert!(service.verify(666666, false).unwrap().is_empty(), "{name}");
            assert!(service.verify(666666, true).unwrap().is_empty(), "{name}");
        }
    }

    #[test]
    fn test_unknown_code_is_empty_not_error() {
        for (name, service) in services(&[]) {
            assert!(service.verify(123456, false).unwrap().is_empty(), "{name}");
            assert!(service.verify(123456, true).unwrap().is_empty(), "{name}");
        }
    }

    #[test]
    fn test_concurrent_consumption_has_one_winner() {
        for (name, service) in services(&[777777]) {
            service.issue(&bob(), None).unwrap();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let service = service.clone();
                    std::thread::spawn(move || service.verify(777777, true).unwrap().len())
                })
                .collect();

            let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
            assert_eq!(total, 1, "{name}");
        }
    }
}
