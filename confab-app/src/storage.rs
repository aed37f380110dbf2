//! Local conversation persistence (SQLite).
//!
//! Conversations hold the session parameters the core needs before
//! connecting (voice, model, system prompt); messages are a pass-through
//! transcript log with no correctness guarantees. The voice config is kept
//! as one JSON column — it travels as a unit and its shape is owned by the
//! serde types below.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-conversation voice session parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationConfig {
    pub voice_name: String,
    pub temperature: f32,
    pub model: String,
    /// ISO 639-1 language code, e.g. `en`.
    pub language: String,
    pub audio_format: String,
    pub sample_rate: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            voice_name: "Puck".into(),
            temperature: 1.0,
            model: confab_core::session::DEFAULT_MODEL.into(),
            language: "en".into(),
            audio_format: "linear16".into(),
            sample_rate: 16_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub system_prompt: String,
    pub config: ConversationConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
    pub archived: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub system_prompt: Option<String>,
    pub config: Option<ConversationConfig>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    /// `user` | `assistant` | `system`
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create data directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id            TEXT PRIMARY KEY,
                title         TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                config_json   TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                archived      INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);",
        )
        .context("initialize schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create(
        &self,
        title: &str,
        system_prompt: &str,
        config: ConversationConfig,
    ) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            system_prompt: system_prompt.to_string(),
            config,
            created_at: now,
            updated_at: now,
            message_count: 0,
            archived: false,
        };
        self.conn.lock().execute(
            "INSERT INTO conversations
                (id, title, system_prompt, config_json, created_at, updated_at, message_count, archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)",
            params![
                conversation.id,
                conversation.title,
                conversation.system_prompt,
                serde_json::to_string(&conversation.config)?,
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(conversation)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, title, system_prompt, config_json, created_at, updated_at,
                        message_count, archived
                 FROM conversations WHERE id = ?1",
                params![id],
                conversation_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All conversations, most recently updated first. Archived ones are
    /// hidden unless asked for.
    pub fn list_all(&self, include_archived: bool) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, system_prompt, config_json, created_at, updated_at,
                    message_count, archived
             FROM conversations
             WHERE archived <= ?1
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![include_archived as i64], conversation_from_row)?;
        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    /// Apply a partial update. Returns the updated record, or `None` when
    /// the id is unknown.
    pub fn update(&self, id: &str, patch: ConversationPatch) -> Result<Option<Conversation>> {
        let Some(mut conversation) = self.get_by_id(id)? else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            conversation.title = title;
        }
        if let Some(system_prompt) = patch.system_prompt {
            conversation.system_prompt = system_prompt;
        }
        if let Some(config) = patch.config {
            conversation.config = config;
        }
        if let Some(archived) = patch.archived {
            conversation.archived = archived;
        }
        conversation.updated_at = Utc::now();

        self.conn.lock().execute(
            "UPDATE conversations
             SET title = ?2, system_prompt = ?3, config_json = ?4, updated_at = ?5, archived = ?6
             WHERE id = ?1",
            params![
                id,
                conversation.title,
                conversation.system_prompt,
                serde_json::to_string(&conversation.config)?,
                conversation.updated_at.to_rfc3339(),
                conversation.archived as i64,
            ],
        )?;
        Ok(Some(conversation))
    }

    /// Delete a conversation and its messages. `true` if anything was
    /// removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        let removed = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Append one transcript line and bump the conversation's counters.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<StoredMessage> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.conversation_id,
                message.role,
                message.content,
                message.created_at.to_rfc3339(),
            ],
        )?;
        conn.execute(
            "UPDATE conversations SET message_count = message_count + 1, updated_at = ?2
             WHERE id = ?1",
            params![conversation_id, message.created_at.to_rfc3339()],
        )?;
        Ok(message)
    }

    pub fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(RawMessage {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut messages = Vec::new();
        for row in rows {
            let raw = row?;
            messages.push(StoredMessage {
                id: raw.id,
                conversation_id: raw.conversation_id,
                role: raw.role,
                content: raw.content,
                created_at: parse_timestamp(&raw.created_at)?,
            });
        }
        Ok(messages)
    }
}

struct RawMessage {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    created_at: String,
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let config_json: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        system_prompt: row.get(2)?,
        config: serde_json::from_str(&config_json).unwrap_or_default(),
        created_at: parse_timestamp(&created_at).unwrap_or_else(|_| Utc::now()),
        updated_at: parse_timestamp(&updated_at).unwrap_or_else(|_| Utc::now()),
        message_count: row.get(6)?,
        archived: row.get::<_, i64>(7)? != 0,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad timestamp {raw:?}"))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConversationStore {
        ConversationStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_then_get_round_trips_the_config() {
        let store = store();
        let config = ConversationConfig {
            voice_name: "Kore".into(),
            temperature: 0.4,
            ..ConversationConfig::default()
        };
        let created = store.create("Practice Spanish", "Habla español.", config).unwrap();

        let fetched = store.get_by_id(&created.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Practice Spanish");
        assert_eq!(fetched.system_prompt, "Habla español.");
        assert_eq!(fetched.config.voice_name, "Kore");
        assert!((fetched.config.temperature - 0.4).abs() < 1e-6);
        assert_eq!(fetched.message_count, 0);
        assert!(!fetched.archived);
    }

    #[test]
    fn get_unknown_id_is_none_not_an_error() {
        assert!(store().get_by_id("nope").unwrap().is_none());
    }

    #[test]
    fn list_hides_archived_unless_asked() {
        let store = store();
        let keep = store
            .create("keep", "p", ConversationConfig::default())
            .unwrap();
        let archive = store
            .create("archive", "p", ConversationConfig::default())
            .unwrap();
        store
            .update(
                &archive.id,
                ConversationPatch {
                    archived: Some(true),
                    ..ConversationPatch::default()
                },
            )
            .unwrap();

        let visible = store.list_all(false).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, keep.id);

        let all = store.list_all(true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn update_patches_only_provided_fields() {
        let store = store();
        let created = store
            .create("title", "prompt", ConversationConfig::default())
            .unwrap();

        let updated = store
            .update(
                &created.id,
                ConversationPatch {
                    title: Some("renamed".into()),
                    ..ConversationPatch::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.system_prompt, "prompt");
        assert!(updated.updated_at >= created.updated_at);

        assert!(store
            .update("missing", ConversationPatch::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_removes_conversation_and_messages() {
        let store = store();
        let created = store
            .create("t", "p", ConversationConfig::default())
            .unwrap();
        store
            .append_message(&created.id, "assistant", "hello")
            .unwrap();

        assert!(store.delete(&created.id).unwrap());
        assert!(store.get_by_id(&created.id).unwrap().is_none());
        assert!(store.messages(&created.id).unwrap().is_empty());
        // Second delete: nothing left to remove
        assert!(!store.delete(&created.id).unwrap());
    }

    #[test]
    fn append_message_bumps_count_and_preserves_order() {
        let store = store();
        let created = store
            .create("t", "p", ConversationConfig::default())
            .unwrap();

        store.append_message(&created.id, "user", "hi").unwrap();
        store
            .append_message(&created.id, "assistant", "hello!")
            .unwrap();

        let conversation = store.get_by_id(&created.id).unwrap().unwrap();
        assert_eq!(conversation.message_count, 2);

        let messages = store.messages(&created.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].content, "hello!");
    }
}
