//! # Storage Module
//!
//! Backends for connections and verification codes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE BACKENDS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────┐  ┌───────────────────────────────┐  │
//! │  │  MemoryStore (dashmap)        │  │  Database (rusqlite)          │  │
//! │  │  ─────────────────────        │  │  ───────────────────          │  │
//! │  │  active:      content → link  │  │  connections                  │  │
//! │  │  outstanding: code → record   │  │  verification_codes           │  │
//! │  │  archives for removed and     │  │  partial unique indexes on    │  │
//! │  │  consumed rows                │  │  live rows                    │  │
//! │  └───────────────────────────────┘  └───────────────────────────────┘  │
//! │                                                                         │
//! │  Both implement ConnectionRegistry + CodeStore.                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod memory;
mod schema;

pub use database::Database;
pub use memory::MemoryStore;
pub use schema::SCHEMA_VERSION;
