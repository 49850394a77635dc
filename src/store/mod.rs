//! SQLite conversation log.
//!
//! Conversations and their messages live in two tables. Messages are
//! append-only and read back in insertion order.

mod schema;

use std::path::Path;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;

use crate::message::{ChatMessage, ConversationId, Role};
use crate::{Error, Result};

pub use schema::SCHEMA_VERSION;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Append-only message log keyed by conversation.
pub trait TranscriptSink: Send + Sync {
    /// Durably record `message` at the end of the conversation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write is rejected
    fn append(&self, conversation: ConversationId, message: &ChatMessage) -> Result<()>;

    /// Every message of the conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be read
    fn read_all(&self, conversation: ConversationId) -> Result<Vec<ChatMessage>>;
}

/// A conversation with its activity summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// A persisted message with its row metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    #[must_use]
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationStats {
    pub total: usize,
    pub message_count: usize,
}

/// Conversation repository
#[derive(Clone)]
pub struct ConversationStore {
    pool: DbPool,
}

impl ConversationStore {
    /// Open (or create) the database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(enable_foreign_keys);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| Error::Storage(e.to_string()))?;

        let store = Self::from_pool(pool)?;
        tracing::info!(path = %path.display(), version = SCHEMA_VERSION, "database initialized");
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be initialized
    pub fn open_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(enable_foreign_keys);
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Storage(e.to_string()))?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: DbPool) -> Result<Self> {
        let store = Self { pool };
        let conn = store.conn()?;
        schema::init(&conn)?;
        Ok(store)
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Storage(e.to_string()))
    }

    /// Start a new conversation.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn create_conversation(&self, title: &str) -> Result<ConversationId> {
        let title = match title.trim() {
            "" => "Untitled",
            t => t,
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO conversations (title, created_at) VALUES (?1, ?2)",
            rusqlite::params![title, Utc::now().to_rfc3339()],
        )?;
        let id = ConversationId(conn.last_insert_rowid());
        tracing::debug!(%id, title, "conversation created");
        Ok(id)
    }

    /// Messages of a conversation with row metadata, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails or a row holds an unknown role
    pub fn messages(&self, conversation: ConversationId) -> Result<Vec<StoredMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, role, content, created_at
             FROM messages WHERE conversation_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map([conversation.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, role, content, created_at)| {
                Ok(StoredMessage {
                    id,
                    role: role.parse().map_err(Error::Storage)?,
                    content,
                    created_at: parse_datetime(&created_at),
                })
            })
            .collect()
    }

    /// Look up one conversation.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn conversation(&self, id: ConversationId) -> Result<Option<ConversationSummary>> {
        let conn = self.conn()?;
        let summary = conn
            .query_row(
                &format!("{SUMMARY_SELECT} WHERE c.id = ?1 GROUP BY c.id"),
                [id.0],
                summary_from_row,
            )
            .optional()?;
        Ok(summary)
    }

    /// Conversations by most recent activity.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SUMMARY_SELECT} GROUP BY c.id
             ORDER BY COALESCE(MAX(m.created_at), c.created_at) DESC, c.id DESC
             LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let summaries = stmt
            .query_map([limit], summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Conversation and message totals.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn stats(&self) -> Result<ConversationStats> {
        let conn = self.conn()?;
        let (total, messages): (i64, i64) = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM conversations), (SELECT COUNT(*) FROM messages)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ConversationStats {
            total: usize::try_from(total).unwrap_or(0),
            message_count: usize::try_from(messages).unwrap_or(0),
        })
    }

    /// Delete a conversation and its messages. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete_conversation(&self, id: ConversationId) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", [id.0])?;
        if deleted > 0 {
            tracing::debug!(%id, "conversation deleted");
        }
        Ok(deleted > 0)
    }
}

impl TranscriptSink for ConversationStore {
    fn append(&self, conversation: ConversationId, message: &ChatMessage) -> Result<()> {
        let conn = self.conn()?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                [conversation.0],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(Error::Storage(format!("conversation {conversation} does not exist")));
        }

        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                conversation.0,
                message.role.as_str(),
                message.content,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn read_all(&self, conversation: ConversationId) -> Result<Vec<ChatMessage>> {
        Ok(self
            .messages(conversation)?
            .iter()
            .map(StoredMessage::to_chat)
            .collect())
    }
}

const SUMMARY_SELECT: &str = "SELECT c.id, c.title, c.created_at, COUNT(m.id), MAX(m.created_at)
     FROM conversations c LEFT JOIN messages m ON m.conversation_id = c.id";

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationSummary> {
    let count: i64 = row.get(3)?;
    Ok(ConversationSummary {
        id: ConversationId(row.get(0)?),
        title: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        message_count: usize::try_from(count).unwrap_or(0),
        last_message_at: row
            .get::<_, Option<String>>(4)?
            .as_deref()
            .map(parse_datetime),
    })
}

fn enable_foreign_keys(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ConversationStore, ConversationId) {
        let store = ConversationStore::open_memory().unwrap();
        let id = store.create_conversation("Test chat").unwrap();
        (store, id)
    }

    #[test]
    fn test_append_and_read_in_order() {
        let (store, id) = setup();

        store.append(id, &ChatMessage::user("Hello")).unwrap();
        store.append(id, &ChatMessage::assistant("Hi there!")).unwrap();
        store.append(id, &ChatMessage::system("be brief")).unwrap();

        let messages = store.read_all(id).unwrap();
        assert_eq!(
            messages,
            vec![
                ChatMessage::user("Hello"),
                ChatMessage::assistant("Hi there!"),
                ChatMessage::system("be brief"),
            ]
        );
    }

    #[test]
    fn test_empty_assistant_content_is_kept() {
        let (store, id) = setup();
        store.append(id, &ChatMessage::assistant("")).unwrap();
        assert_eq!(store.read_all(id).unwrap(), vec![ChatMessage::assistant("")]);
    }

    #[test]
    fn test_special_characters_and_large_content() {
        let (store, id) = setup();
        let tricky = "quotes ' \" ; DROP TABLE messages; -- 🚀 ünïcödé\n\ttabs";
        let large = "x".repeat(200_000);

        store.append(id, &ChatMessage::user(tricky)).unwrap();
        store.append(id, &ChatMessage::assistant(large.clone())).unwrap();

        let messages = store.read_all(id).unwrap();
        assert_eq!(messages[0].content, tricky);
        assert_eq!(messages[1].content.len(), large.len());
    }

    #[test]
    fn test_append_to_missing_conversation_is_storage_error() {
        let store = ConversationStore::open_memory().unwrap();
        let err = store
            .append(ConversationId(42), &ChatMessage::user("orphan"))
            .unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_conversations_are_isolated() {
        let (store, first) = setup();
        let second = store.create_conversation("Other").unwrap();

        store.append(first, &ChatMessage::user("one")).unwrap();
        store.append(second, &ChatMessage::user("two")).unwrap();

        assert_eq!(store.read_all(first).unwrap(), vec![ChatMessage::user("one")]);
        assert_eq!(store.read_all(second).unwrap(), vec![ChatMessage::user("two")]);
    }

    #[test]
    fn test_summaries_and_stats() {
        let (store, id) = setup();
        let idle = store.create_conversation("  ").unwrap();
        store.append(id, &ChatMessage::user("q")).unwrap();
        store.append(id, &ChatMessage::assistant("a")).unwrap();

        let summary = store.conversation(id).unwrap().unwrap();
        assert_eq!(summary.title, "Test chat");
        assert_eq!(summary.message_count, 2);
        assert!(summary.last_message_at.is_some());

        let untitled = store.conversation(idle).unwrap().unwrap();
        assert_eq!(untitled.title, "Untitled");
        assert_eq!(untitled.message_count, 0);
        assert!(untitled.last_message_at.is_none());

        assert_eq!(store.recent_conversations(10).unwrap().len(), 2);
        assert_eq!(store.recent_conversations(1).unwrap().len(), 1);
        assert_eq!(
            store.stats().unwrap(),
            ConversationStats {
                total: 2,
                message_count: 2
            }
        );
        assert!(store.conversation(ConversationId(999)).unwrap().is_none());
    }

    #[test]
    fn test_delete_cascades_to_messages() {
        let (store, id) = setup();
        store.append(id, &ChatMessage::user("bye")).unwrap();

        assert!(store.delete_conversation(id).unwrap());
        assert!(!store.delete_conversation(id).unwrap());
        assert!(store.read_all(id).unwrap().is_empty());
        assert_eq!(store.stats().unwrap(), ConversationStats::default());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/conversations.db");

        let id = {
            let store = ConversationStore::open(&path).unwrap();
            let id = store.create_conversation("Durable").unwrap();
            store.append(id, &ChatMessage::user("still here?")).unwrap();
            id
        };

        let store = ConversationStore::open(&path).unwrap();
        assert_eq!(store.read_all(id).unwrap(), vec![ChatMessage::user("still here?")]);
    }
}
