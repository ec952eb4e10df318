use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::QueuePublisher;
use crate::error::{Error, Result};

/// A message handed out by [`SqliteQueue::claim`]. It stays invisible until
/// acked, released, or its claim expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: i64,
    pub queue: String,
    pub body: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Local durable work queue. Delivery is at-least-once: a claimed message
/// that is never acked becomes visible again once its claim expires.
pub struct SqliteQueue {
    conn: Mutex<Connection>,
    claim_timeout: Duration,
}

impl SqliteQueue {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let queue = Self {
            conn: Mutex::new(conn),
            claim_timeout: Duration::from_secs(15 * 60),
        };
        queue.init_db()?;
        Ok(queue)
    }

    pub fn with_claim_timeout(self, claim_timeout: Duration) -> Self {
        Self {
            claim_timeout,
            ..self
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Queue("queue connection lock poisoned".to_string()))
    }

    fn init_db(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                body TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                visible_at INTEGER NOT NULL,
                claimed_until INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_messages_queue_visible ON messages(queue, visible_at);
            "#,
        )?;

        Ok(())
    }

    fn insert(&self, queue: &str, body: &str, delay: Duration) -> Result<()> {
        let now = Utc::now();
        let visible_at = now.timestamp_millis() + delay.as_millis() as i64;
        self.conn()?.execute(
            r#"
            INSERT INTO messages (queue, body, enqueued_at, visible_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![queue, body, now.to_rfc3339(), visible_at],
        )?;
        Ok(())
    }

    /// Claims the oldest visible message on `queue`.
    pub fn claim(&self, queue: &str) -> Result<Option<QueuedMessage>> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp_millis();

        let candidate = conn
            .query_row(
                r#"
                SELECT id, queue, body, enqueued_at FROM messages
                WHERE queue = ?1
                  AND visible_at <= ?2
                  AND (claimed_until IS NULL OR claimed_until <= ?2)
                ORDER BY id
                LIMIT 1
                "#,
                params![queue, now],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, queue, body, enqueued_at)) = candidate else {
            return Ok(None);
        };

        let claimed_until = now + self.claim_timeout.as_millis() as i64;
        let updated = conn.execute(
            r#"
            UPDATE messages SET claimed_until = ?1
            WHERE id = ?2 AND (claimed_until IS NULL OR claimed_until <= ?3)
            "#,
            params![claimed_until, id, now],
        )?;
        if updated == 0 {
            // Another process claimed it between the select and the update.
            return Ok(None);
        }

        Ok(Some(QueuedMessage {
            id,
            queue,
            body,
            enqueued_at: parse_timestamp(&enqueued_at),
        }))
    }

    /// Claims up to `limit` messages.
    pub fn claim_many(&self, queue: &str, limit: usize) -> Result<Vec<QueuedMessage>> {
        let mut claimed = Vec::with_capacity(limit);
        while claimed.len() < limit {
            match self.claim(queue)? {
                Some(message) => claimed.push(message),
                None => break,
            }
        }
        Ok(claimed)
    }

    pub fn ack(&self, id: i64) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Makes a claimed message visible again immediately.
    pub fn release(&self, id: i64) -> Result<()> {
        self.conn()?.execute(
            "UPDATE messages SET claimed_until = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Unclaimed messages on `queue`, oldest first, including delayed ones.
    pub fn pending(&self, queue: &str) -> Result<Vec<QueuedMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, queue, body, enqueued_at FROM messages
            WHERE queue = ?1 AND claimed_until IS NULL
            ORDER BY id
            "#,
        )?;

        let messages = stmt.query_map(params![queue], |row| {
            let enqueued_at: String = row.get(3)?;
            Ok(QueuedMessage {
                id: row.get(0)?,
                queue: row.get(1)?,
                body: row.get(2)?,
                enqueued_at: parse_timestamp(&enqueued_at),
            })
        })?;

        messages
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl QueuePublisher for SqliteQueue {
    async fn publish(&self, queue: &str, body: String) -> Result<()> {
        self.insert(queue, &body, Duration::ZERO)
    }

    async fn publish_delayed(&self, queue: &str, body: String, delay: Duration) -> Result<()> {
        self.insert(queue, &body, delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_ack_cycle() {
        let queue = SqliteQueue::in_memory().unwrap();
        queue.publish("discovery", "first".to_string()).await.unwrap();
        queue.publish("discovery", "second".to_string()).await.unwrap();
        queue.publish("scan", "other".to_string()).await.unwrap();

        let first = queue.claim("discovery").unwrap().unwrap();
        assert_eq!(first.body, "first");
        assert_eq!(first.queue, "discovery");

        // Claimed messages are not handed out twice.
        let second = queue.claim("discovery").unwrap().unwrap();
        assert_eq!(second.body, "second");
        assert!(queue.claim("discovery").unwrap().is_none());

        queue.ack(first.id).unwrap();
        queue.release(second.id).unwrap();

        let again = queue.claim("discovery").unwrap().unwrap();
        assert_eq!(again.id, second.id);
        assert_eq!(queue.pending("scan").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delayed_message_is_not_visible_yet() {
        let queue = SqliteQueue::in_memory().unwrap();
        queue
            .publish_delayed("discovery", "later".to_string(), Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(queue.claim("discovery").unwrap().is_none());
        assert_eq!(queue.pending("discovery").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_claim_is_redelivered() {
        let queue = SqliteQueue::in_memory()
            .unwrap()
            .with_claim_timeout(Duration::ZERO);
        queue.publish("discovery", "task".to_string()).await.unwrap();

        let first = queue.claim("discovery").unwrap().unwrap();
        let redelivered = queue.claim("discovery").unwrap().unwrap();
        assert_eq!(first.id, redelivered.id);
    }

    #[tokio::test]
    async fn test_claim_many_respects_limit() {
        let queue = SqliteQueue::in_memory().unwrap();
        for i in 0..5 {
            queue.publish("discovery", i.to_string()).await.unwrap();
        }

        let claimed = queue.claim_many("discovery", 3).unwrap();
        let bodies: Vec<_> = claimed.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["0", "1", "2"]);
        assert_eq!(queue.pending("discovery").unwrap().len(), 2);
    }
}
