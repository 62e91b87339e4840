//! # Database
//!
//! SQLite backend for connections and verification codes.
//!
//! ```text
//! ┌─────────────────┐
//! │  LinkingFacade  │
//! └────────┬────────┘
//!          │  ConnectionRegistry / CodeStore
//!          ▼
//! ┌─────────────────┐
//! │    Database     │  Mutex<rusqlite::Connection>
//! │   (this file)   │  - partial unique indexes guard live rows
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │   SQLite DB     │  in-memory for tests, file for production
//! └─────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection as SqliteConnection, ErrorCode, Row};

use super::schema;
use crate::error::{Error, Result};
use crate::linking::{
    CodeStore, Connection, ConnectionRegistry, ContentAccount, VerificationCode,
};

const CONNECTION_COLUMNS: &str = "id, content_id, content_name, chat_id, linked_at, removed_at";

const CODE_COLUMNS: &str =
    "code, owner_id, owner_name, requested_by, consumed, issued_at, consumed_at";

/// The SQLite handle.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => SqliteConnection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => SqliteConnection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Database schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    /// All link records for a chat identity, removed ones included, newest first.
    pub fn connection_history(&self, chat_id: &str) -> Result<Vec<Connection>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections
             WHERE chat_id = ? ORDER BY linked_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![chat_id], connection_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Current time at the precision the schema stores.
fn stored_now() -> DateTime<Utc> {
    from_millis(to_millis(Utc::now()))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        id: row.get(0)?,
        content: ContentAccount {
            id: row.get(1)?,
            name: row.get(2)?,
        },
        chat_id: row.get(3)?,
        linked_at: from_millis(row.get(4)?),
        removed_at: row.get::<_, Option<i64>>(5)?.map(from_millis),
    })
}

fn code_from_row(row: &Row<'_>) -> rusqlite::Result<VerificationCode> {
    Ok(VerificationCode {
        code: row.get(0)?,
        owner: ContentAccount {
            id: row.get(1)?,
            name: row.get(2)?,
        },
        requested_by: row.get(3)?,
        consumed: row.get(4)?,
        issued_at: from_millis(row.get(5)?),
        consumed_at: row.get::<_, Option<i64>>(6)?.map(from_millis),
    })
}

// ============================================================================
// CONNECTION REGISTRY
// ============================================================================

impl ConnectionRegistry for Database {
    fn create(&self, content: &ContentAccount, chat_id: &str) -> Result<Connection> {
        let record = Connection {
            linked_at: stored_now(),
            ..Connection::new(content.clone(), chat_id)
        };
        let conn = self.conn.lock();

        let inserted = conn.execute(
            "INSERT INTO connections (id, content_id, content_name, chat_id, linked_at, removed_at)
             VALUES (?, ?, ?, ?, ?, NULL)",
            params![
                record.id,
                record.content.id,
                record.content.name,
                record.chat_id,
                to_millis(record.linked_at),
            ],
        );

        match inserted {
            Ok(_) => Ok(record),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyLinked),
            Err(e) => Err(Error::DatabaseError(format!("Failed to create link: {}", e))),
        }
    }

    fn remove(&self, content_id: Option<i64>, chat_id: Option<&str>) -> Result<Connection> {
        if content_id.is_none() && chat_id.is_none() {
            return Err(Error::MissingKey);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let matched = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections
                 WHERE removed_at IS NULL
                   AND (?1 IS NULL OR content_id = ?1)
                   AND (?2 IS NULL OR chat_id = ?2)
                 ORDER BY linked_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![content_id, chat_id], connection_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let Some(latest) = matched.first().cloned() else {
            return Err(Error::LinkNotFound);
        };

        let now = stored_now();
        for record in &matched {
            tx.execute(
                "UPDATE connections SET removed_at = ? WHERE id = ?",
                params![to_millis(now), record.id],
            )?;
        }
        tx.commit()?;

        Ok(Connection {
            removed_at: Some(now),
            ..latest
        })
    }

    fn find_by_content_identity(&self, content_id: i64) -> Result<Option<Connection>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections
                 WHERE content_id = ? AND removed_at IS NULL"
            ),
            params![content_id],
            connection_from_row,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get link: {}", e))),
        }
    }

    fn find_by_chat_identity(&self, chat_id: &str) -> Result<Option<Connection>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections
                 WHERE chat_id = ? AND removed_at IS NULL
                 ORDER BY linked_at DESC, rowid DESC LIMIT 1"
            ),
            params![chat_id],
            connection_from_row,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get link: {}", e))),
        }
    }
}

// ============================================================================
// CODE STORE
// ============================================================================

impl CodeStore for Database {
    fn insert_if_free(&self, record: &VerificationCode) -> Result<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO verification_codes
                (code, owner_id, owner_name, requested_by, consumed, issued_at, consumed_at)
             VALUES (?, ?, ?, ?, 0, ?, NULL)",
            params![
                record.code,
                record.owner.id,
                record.owner.name,
                record.requested_by,
                to_millis(record.issued_at),
            ],
        );

        match inserted {
            Ok(_) => Ok(true),
            Err(e) if is_constraint_violation(&e) => Ok(false),
            Err(e) => Err(Error::DatabaseError(format!("Failed to store code: {}", e))),
        }
    }

    fn find_outstanding(&self, code: u32) -> Result<Vec<VerificationCode>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CODE_COLUMNS} FROM verification_codes WHERE code = ? AND consumed = 0"
        ))?;
        let rows = stmt.query_map(params![code], code_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn consume(&self, code: u32) -> Result<Vec<VerificationCode>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let outstanding = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {CODE_COLUMNS} FROM verification_codes WHERE code = ? AND consumed = 0"
            ))?;
            let rows = stmt.query_map(params![code], code_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        if outstanding.is_empty() {
            return Ok(Vec::new());
        }

        let now = stored_now();
        let updated = tx.execute(
            "UPDATE verification_codes SET consumed = 1, consumed_at = ?
             WHERE code = ? AND consumed = 0",
            params![to_millis(now), code],
        )?;
        tx.commit()?;

        if updated == 0 {
            return Ok(Vec::new());
        }

        Ok(outstanding
            .into_iter()
            .map(|record| VerificationCode {
                consumed: true,
                consumed_at: Some(now),
                ..record
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version_is_recorded() {
        let db = Database::open(None).unwrap();
        let conn = db.conn.lock();
        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_links_and_codes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verilink.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(Some(path)).unwrap();
            db.create(&ContentAccount::new(7, "nimrod"), "chat-1").unwrap();
            db.insert_if_free(&VerificationCode::new(
                482193,
                ContentAccount::new(9, "bob"),
                Some("chat-2".into()),
            ))
            .unwrap();
        }

        let db = Database::open(Some(path)).unwrap();
        let link = db.find_by_chat_identity("chat-1").unwrap().unwrap();
        assert_eq!(link.content, ContentAccount::new(7, "nimrod"));

        let codes = db.find_outstanding(482193).unwrap();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].requested_by.as_deref(), Some("chat-2"));
    }

    #[test]
    fn test_removed_links_stay_in_history() {
        let db = Database::open(None).unwrap();
        db.create(&ContentAccount::new(7, "nimrod"), "chat-1").unwrap();
        db.remove(Some(7), None).unwrap();
        db.create(&ContentAccount::new(7, "nimrod"), "chat-1").unwrap();

        let history = db.connection_history("chat-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|c| c.is_active()).count(), 1);
    }

    #[test]
    fn test_timestamps_round_trip_at_millisecond_precision() {
        let db = Database::open(None).unwrap();
        let created = db.create(&ContentAccount::new(1, "a"), "chat-1").unwrap();
        let loaded = db.find_by_content_identity(1).unwrap().unwrap();
        assert_eq!(
            loaded.linked_at.timestamp_millis(),
            created.linked_at.timestamp_millis()
        );
    }
}
