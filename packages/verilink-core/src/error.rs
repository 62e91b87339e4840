//! # Error Handling
//!
//! Error types for verilink core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Linking Errors (expected, returned as typed outcomes)             │
//! │  │   ├── CodeNotFound          - Absent, consumed or wrong owner       │
//! │  │   ├── AlreadyLinked         - Content identity already linked       │
//! │  │   ├── LinkNotFound          - No active link to remove              │
//! │  │   ├── NotConfigured         - Missing role or platform credentials  │
//! │  │   ├── CodeSpaceExhausted    - No free code value could be drawn     │
//! │  │   └── MissingKey            - Removal without any identity key      │
//! │  │                                                                      │
//! │  ├── Collaborator Errors                                               │
//! │  │   ├── ContentPlatform       - Content platform call failed          │
//! │  │   ├── RoleDirectory         - Role grant/revoke failed              │
//! │  │   ├── DeliveryFailed        - Out-of-band message not delivered     │
//! │  │   └── ChatPlatform          - Chat channel post failed              │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── DatabaseError         - SQLite failure                        │
//! │  │   └── SerializationError    - JSON encode/decode failure            │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      └── Internal              - Should not happen                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The facade never surfaces the linking errors through `Err`; they become
//! variants of [`LinkOutcome`](crate::linking::LinkOutcome) and friends.
//! Anything reaching a caller as `Err(Error)` is an unexpected failure.

use thiserror::Error;

/// Result type alias for verilink core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for verilink core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Linking Errors (100-199)
    // ========================================================================

    /// The code is absent, already consumed, or issued for another identity
    #[error("Code not found.")]
    CodeNotFound,

    /// The content identity already has an active link
    #[error("This account is already linked.")]
    AlreadyLinked,

    /// No active link matches the given key(s)
    #[error("No active link found.")]
    LinkNotFound,

    /// A required setting (community role, platform token) is missing
    #[error("{0} has not been configured.")]
    NotConfigured(String),

    /// Code generation kept colliding with outstanding codes
    #[error("No free verification code could be generated.")]
    CodeSpaceExhausted,

    /// A removal was requested without any key
    #[error("Either a content identity or a chat identity must be supplied.")]
    MissingKey,

    // ========================================================================
    // Collaborator Errors (200-299)
    // ========================================================================

    /// Content platform request failed
    #[error("Content platform error: {0}")]
    ContentPlatform(String),

    /// Role grant or revoke failed
    #[error("Role directory error: {0}")]
    RoleDirectory(String),

    /// Out-of-band message delivery failed
    #[error("Failed to deliver message: {0}")]
    DeliveryFailed(String),

    /// Chat platform request failed
    #[error("Chat platform error: {0}")]
    ChatPlatform(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// - 100-199: Linking
    /// - 200-299: Collaborators
    /// - 400-499: Storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Linking (100-199)
            Error::CodeNotFound => 100,
            Error::AlreadyLinked => 101,
            Error::LinkNotFound => 102,
            Error::NotConfigured(_) => 103,
            Error::CodeSpaceExhausted => 104,
            Error::MissingKey => 105,

            // Collaborators (200-299)
            Error::ContentPlatform(_) => 200,
            Error::RoleDirectory(_) => 201,
            Error::DeliveryFailed(_) => 202,
            Error::ChatPlatform(_) => 203,

            // Storage (400-499)
            Error::DatabaseError(_) => 400,
            Error::SerializationError(_) => 401,

            // Internal (900-999)
            Error::Internal(_) => 900,
        }
    }

    /// Check if this error is one of the expected linking conditions
    ///
    /// Expected conditions are reported to the user with a specific message.
    /// Everything else is unexpected and gets a generic message plus a log line.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Error::CodeNotFound
                | Error::AlreadyLinked
                | Error::LinkNotFound
                | Error::NotConfigured(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::CodeNotFound.code(), 100);
        assert_eq!(Error::AlreadyLinked.code(), 101);
        assert_eq!(Error::ContentPlatform("down".into()).code(), 200);
        assert_eq!(Error::DatabaseError("locked".into()).code(), 400);
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_expected_errors() {
        assert!(Error::CodeNotFound.is_expected());
        assert!(Error::AlreadyLinked.is_expected());
        assert!(Error::LinkNotFound.is_expected());
        assert!(Error::NotConfigured("guild".into()).is_expected());
        assert!(!Error::RoleDirectory("403".into()).is_expected());
        assert!(!Error::DatabaseError("io".into()).is_expected());
    }

    #[test]
    fn test_code_not_found_message_is_non_committal() {
        assert_eq!(Error::CodeNotFound.to_string(), "Code not found.");
    }

    #[test]
    fn test_rusqlite_conversion() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code(), 400);
    }
}
