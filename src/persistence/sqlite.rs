//! SQLite-backed `PersistenceStore`.
//!
//! Idempotent schema bootstrap via `CREATE TABLE IF NOT EXISTS` at
//! construction, one table per concern, timestamps stored as `i64` Unix
//! seconds.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

use crate::model::{Message, Role, Session, Summary, SummaryKind, ToolInvocation, ToolResult, Usage};
use crate::persistence::store::{PersistenceError, PersistenceStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT,
                project_root TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.into()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                author TEXT,
                content TEXT NOT NULL,
                tool_invocations TEXT NOT NULL DEFAULT '[]',
                tool_results TEXT NOT NULL DEFAULT '[]',
                prompt_tokens INTEGER NOT NULL DEFAULT 0,
                completion_tokens INTEGER NOT NULL DEFAULT 0,
                cost_estimate REAL NOT NULL DEFAULT 0.0,
                pinned INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                truncated INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.into()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at)")
            .execute(&pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.into()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                first_message_id TEXT NOT NULL,
                last_message_id TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.into()))?;

        Ok(Self { pool })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, PersistenceError> {
        let id: String = row.get("id");
        let session_id: String = row.get("session_id");
        let role: String = row.get("role");
        let author: Option<String> = row.get("author");
        let content: String = row.get("content");
        let tool_invocations_json: String = row.get("tool_invocations");
        let tool_results_json: String = row.get("tool_results");
        let prompt_tokens: i64 = row.get("prompt_tokens");
        let completion_tokens: i64 = row.get("completion_tokens");
        let cost_estimate: f64 = row.get("cost_estimate");
        let pinned: i64 = row.get("pinned");
        let created_at: i64 = row.get("created_at");
        let truncated: i64 = row.get("truncated");

        let role = match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            other => return Err(PersistenceError::Backend(anyhow::anyhow!("unknown role {other}"))),
        };
        let tool_invocations: Vec<ToolInvocation> = serde_json::from_str(&tool_invocations_json)
            .map_err(|e| PersistenceError::Backend(e.into()))?;
        let tool_results: Vec<ToolResult> = serde_json::from_str(&tool_results_json)
            .map_err(|e| PersistenceError::Backend(e.into()))?;

        Ok(Message {
            id: Uuid::parse_str(&id).map_err(|e| PersistenceError::Backend(e.into()))?,
            session_id: Uuid::parse_str(&session_id).map_err(|e| PersistenceError::Backend(e.into()))?,
            role,
            author,
            content,
            tool_invocations,
            tool_results,
            usage: Usage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: completion_tokens as u32,
                cost_estimate,
            },
            pinned: pinned != 0,
            created_at: timestamp_to_datetime(created_at),
            truncated: truncated != 0,
        })
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<Summary, PersistenceError> {
        let id: String = row.get("id");
        let session_id: String = row.get("session_id");
        let kind: String = row.get("kind");
        let content: String = row.get("content");
        let first_message_id: String = row.get("first_message_id");
        let last_message_id: String = row.get("last_message_id");
        let token_count: i64 = row.get("token_count");
        let created_at: i64 = row.get("created_at");

        let kind = match kind.as_str() {
            "incremental" => SummaryKind::Incremental,
            "full" => SummaryKind::Full,
            other => return Err(PersistenceError::Backend(anyhow::anyhow!("unknown summary kind {other}"))),
        };

        Ok(Summary {
            id: Uuid::parse_str(&id).map_err(|e| PersistenceError::Backend(e.into()))?,
            session_id: Uuid::parse_str(&session_id).map_err(|e| PersistenceError::Backend(e.into()))?,
            kind,
            content,
            first_message_id: Uuid::parse_str(&first_message_id).map_err(|e| PersistenceError::Backend(e.into()))?,
            last_message_id: Uuid::parse_str(&last_message_id).map_err(|e| PersistenceError::Backend(e.into()))?,
            token_count: token_count as u32,
            created_at: timestamp_to_datetime(created_at),
        })
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    message: &Message,
) -> Result<(), PersistenceError> {
    let tool_invocations_json =
        serde_json::to_string(&message.tool_invocations).map_err(|e| PersistenceError::Backend(e.into()))?;
    let tool_results_json =
        serde_json::to_string(&message.tool_results).map_err(|e| PersistenceError::Backend(e.into()))?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO messages
            (id, session_id, role, author, content, tool_invocations, tool_results,
             prompt_tokens, completion_tokens, cost_estimate, pinned, created_at, truncated)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(message.id.to_string())
    .bind(message.session_id.to_string())
    .bind(role_str(message.role))
    .bind(&message.author)
    .bind(&message.content)
    .bind(tool_invocations_json)
    .bind(tool_results_json)
    .bind(message.usage.prompt_tokens as i64)
    .bind(message.usage.completion_tokens as i64)
    .bind(message.usage.cost_estimate)
    .bind(message.pinned as i64)
    .bind(message.created_at.timestamp())
    .bind(message.truncated as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| PersistenceError::Backend(e.into()))?;

    Ok(())
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn create_session(
        &self,
        name: Option<String>,
        project_root: Option<String>,
    ) -> Result<Session, PersistenceError> {
        let session = Session::new(name, project_root);
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sessions (id, name, project_root, created_at, updated_at, archived, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id.to_string())
        .bind(&session.name)
        .bind(&session.project_root)
        .bind(session.created_at.timestamp())
        .bind(session.updated_at.timestamp())
        .bind(session.archived as i64)
        .bind(serde_json::to_string(&session.metadata).map_err(|e| PersistenceError::Backend(e.into()))?)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.into()))?;

        Ok(session)
    }

    async fn append_message(&self, message: &Message) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(|e| PersistenceError::Backend(e.into()))?;
        insert_message(&mut tx, message).await?;
        tx.commit().await.map_err(|e| PersistenceError::Backend(e.into()))?;
        Ok(())
    }

    async fn append_messages_batch(&self, messages: &[Message]) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(|e| PersistenceError::Backend(e.into()))?;
        for message in messages {
            insert_message(&mut tx, message).await?;
        }
        tx.commit().await.map_err(|e| PersistenceError::Backend(e.into()))?;
        Ok(())
    }

    async fn set_pin(&self, message_id: Uuid, pinned: bool) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE messages SET pinned = $1 WHERE id = $2")
            .bind(pinned as i64)
            .bind(message_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Backend(e.into()))?;
        Ok(())
    }

    async fn load_messages(
        &self,
        session_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, PersistenceError> {
        let since_ts = since.map(|d| d.timestamp()).unwrap_or(i64::MIN);
        let limit = limit.unwrap_or(i64::MAX as usize) as i64;

        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE session_id = $1 AND created_at >= $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(session_id.to_string())
        .bind(since_ts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.into()))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn search(&self, session_id: Option<Uuid>, query: &str) -> Result<Vec<Message>, PersistenceError> {
        let pattern = format!("%{}%", query);
        let rows = if let Some(session_id) = session_id {
            sqlx::query(
                r#"
                SELECT * FROM messages
                WHERE session_id = $1 AND content LIKE $2 COLLATE NOCASE
                ORDER BY created_at ASC
                "#,
            )
            .bind(session_id.to_string())
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                SELECT * FROM messages
                WHERE content LIKE $1 COLLATE NOCASE
                ORDER BY created_at ASC
                "#,
            )
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| PersistenceError::Backend(e.into()))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn add_summary(&self, summary: &Summary) -> Result<(), PersistenceError> {
        let kind = match summary.kind {
            SummaryKind::Incremental => "incremental",
            SummaryKind::Full => "full",
        };
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO summaries
                (id, session_id, kind, content, first_message_id, last_message_id, token_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(summary.id.to_string())
        .bind(summary.session_id.to_string())
        .bind(kind)
        .bind(&summary.content)
        .bind(summary.first_message_id.to_string())
        .bind(summary.last_message_id.to_string())
        .bind(summary.token_count as i64)
        .bind(summary.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.into()))?;
        Ok(())
    }

    async fn latest_summary(&self, session_id: Uuid) -> Result<Option<Summary>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM summaries
            WHERE session_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::Backend(e.into()))?;

        row.as_ref().map(Self::row_to_summary).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;

    async fn store() -> SqliteStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn create_session_round_trips() {
        let store = store().await;
        let session = store.create_session(Some("demo".to_string()), None).await.unwrap();
        assert_eq!(session.name.as_deref(), Some("demo"));
    }

    #[tokio::test]
    async fn append_and_load_preserves_order() {
        let store = store().await;
        let session = store.create_session(None, None).await.unwrap();

        let mut first = Message::new_user(session.id, "hello");
        first.created_at = Utc.timestamp_opt(1000, 0).unwrap();
        let mut second = Message::new_assistant(session.id, "claude", "hi there");
        second.created_at = Utc.timestamp_opt(1001, 0).unwrap();

        store.append_messages_batch(&[first.clone(), second.clone()]).await.unwrap();

        let loaded = store.load_messages(session.id, None, None).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "hello");
        assert_eq!(loaded[1].content, "hi there");
    }

    #[tokio::test]
    async fn append_message_is_idempotent_on_id() {
        let store = store().await;
        let session = store.create_session(None, None).await.unwrap();
        let message = Message::new_user(session.id, "hello");

        store.append_message(&message).await.unwrap();
        store.append_message(&message).await.unwrap();

        let loaded = store.load_messages(session.id, None, None).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn set_pin_updates_flag() {
        let store = store().await;
        let session = store.create_session(None, None).await.unwrap();
        let message = Message::new_user(session.id, "pin me");
        store.append_message(&message).await.unwrap();

        store.set_pin(message.id, true).await.unwrap();
        let loaded = store.load_messages(session.id, None, None).await.unwrap();
        assert!(loaded[0].pinned);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let store = store().await;
        let session = store.create_session(None, None).await.unwrap();
        store.append_message(&Message::new_user(session.id, "The Quick Brown Fox")).await.unwrap();
        store.append_message(&Message::new_user(session.id, "unrelated")).await.unwrap();

        let results = store.search(Some(session.id), "quick brown").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn latest_summary_returns_most_recent() {
        let store = store().await;
        let session = store.create_session(None, None).await.unwrap();
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();

        let older = Summary {
            id: Uuid::new_v4(),
            session_id: session.id,
            kind: SummaryKind::Incremental,
            content: "older".to_string(),
            first_message_id: m1,
            last_message_id: m1,
            token_count: 10,
            created_at: Utc.timestamp_opt(1000, 0).unwrap(),
        };
        let newer = Summary {
            id: Uuid::new_v4(),
            session_id: session.id,
            kind: SummaryKind::Incremental,
            content: "newer".to_string(),
            first_message_id: m2,
            last_message_id: m2,
            token_count: 12,
            created_at: Utc.timestamp_opt(2000, 0).unwrap(),
        };

        store.add_summary(&older).await.unwrap();
        store.add_summary(&newer).await.unwrap();

        let latest = store.latest_summary(session.id).await.unwrap().unwrap();
        assert_eq!(latest.content, "newer");
    }
}
