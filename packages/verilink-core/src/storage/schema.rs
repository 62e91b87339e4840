//! # Database Schema
//!
//! SQL schema definitions for the linking database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────┐            ┌─────────────────────┐             │
//! │  │    connections      │            │ verification_codes  │             │
//! │  ├─────────────────────┤            ├─────────────────────┤             │
//! │  │ id                  │            │ id                  │             │
//! │  │ content_id          │  unique    │ code                │  unique     │
//! │  │ content_name        │  while     │ owner_id            │  while      │
//! │  │ chat_id             │  active    │ owner_name          │  unconsumed │
//! │  │ linked_at           │            │ requested_by        │             │
//! │  │ removed_at          │            │ consumed            │             │
//! │  └─────────────────────┘            │ issued_at           │             │
//! │                                     │ consumed_at         │             │
//! │                                     └─────────────────────┘             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Removed links and consumed codes are kept as history. The partial unique
//! indexes only cover live rows.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Identity links
CREATE TABLE IF NOT EXISTS connections (
    -- UUID v4
    id TEXT PRIMARY KEY,
    -- Content platform account
    content_id INTEGER NOT NULL,
    content_name TEXT NOT NULL,
    -- Chat platform user
    chat_id TEXT NOT NULL,
    -- Unix millis
    linked_at INTEGER NOT NULL,
    -- NULL while active
    removed_at INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_active_content
    ON connections(content_id) WHERE removed_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_connections_chat ON connections(chat_id);

-- One-time codes
CREATE TABLE IF NOT EXISTS verification_codes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code INTEGER NOT NULL,
    owner_id INTEGER NOT NULL,
    owner_name TEXT NOT NULL,
    requested_by TEXT,
    consumed INTEGER NOT NULL DEFAULT 0,
    issued_at INTEGER NOT NULL,
    consumed_at INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_codes_outstanding
    ON verification_codes(code) WHERE consumed = 0;
"#;
