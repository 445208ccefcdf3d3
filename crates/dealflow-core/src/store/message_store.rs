use chrono::Utc;

use super::{parse_ts, to_ts};
use crate::db::Database;
use crate::error::DealflowError;
use crate::models::message::{Message, MessageRole};

/// Append-only chat history per run.
#[derive(Debug, Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn append(
        &self,
        run_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, DealflowError> {
        let message = Message {
            run_id: run_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let m = message.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO messages (workflow_id, role, content, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![m.run_id, m.role.as_str(), m.content, to_ts(&m.timestamp)],
                )?;
                Ok(())
            })
            .await?;
        Ok(message)
    }

    /// Messages in insertion order.
    pub async fn list_by_run(&self, run_id: &str) -> Result<Vec<Message>, DealflowError> {
        let run_id = run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT workflow_id, role, content, timestamp
                     FROM messages WHERE workflow_id = ?1 ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![run_id], |row| {
                        Ok(Message {
                            run_id: row.get(0).unwrap_or_default(),
                            role: MessageRole::from_str(&row.get::<_, String>(1).unwrap_or_default()),
                            content: row.get(2).unwrap_or_default(),
                            timestamp: parse_ts(row.get(3).ok()),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::run::Run;
    use crate::store::RunStore;

    #[tokio::test]
    async fn test_messages_keep_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        RunStore::new(db.clone())
            .create(&Run::new("run-1".to_string(), "q".to_string(), None))
            .await
            .unwrap();
        let store = MessageStore::new(db);

        store.append("run-1", MessageRole::User, "hello").await.unwrap();
        store.append("run-1", MessageRole::Assistant, "routing").await.unwrap();
        store.append("run-1", MessageRole::Assistant, "done").await.unwrap();

        let messages = store.list_by_run("run-1").await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "routing", "done"]);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_message_for_unknown_run_is_rejected() {
        let store = MessageStore::new(Database::open_in_memory().unwrap());
        assert!(store.append("ghost", MessageRole::User, "hi").await.is_err());
    }
}
