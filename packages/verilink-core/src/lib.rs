//! # Verilink Core
//!
//! Links an account on a content platform to an account on a chat platform,
//! proven by a one-time code delivered to the content account's inbox.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         VERILINK CORE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                          linking                                  │ │
//! │  │  LinkingFacade · ConnectionRegistry · VerificationCodeService    │ │
//! │  │  ConfirmationSession · InteractionBus                            │ │
//! │  └──────────────┬───────────────────────────────────┬────────────────┘ │
//! │                 │                                   │                  │
//! │                 ▼                                   ▼                  │
//! │  ┌─────────────────────────────┐    ┌─────────────────────────────┐   │
//! │  │          storage            │    │           ports             │   │
//! │  │  MemoryStore (dashmap)      │    │  CommunityDirectory         │   │
//! │  │  Database (SQLite)          │    │  RoleDirectory              │   │
//! │  │                             │    │  ContentPlatform            │   │
//! │  └─────────────────────────────┘    └─────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`linking`] - Link lifecycle, codes and interactive confirmation
//! - [`ports`] - Traits for the external platforms
//! - [`storage`] - In-memory and SQLite backends

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod error;
pub mod linking;
pub mod ports;
pub mod storage;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use error::{Error, Result};
pub use linking::{LinkingFacade, LinkingSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
