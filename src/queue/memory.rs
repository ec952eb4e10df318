use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::QueuePublisher;
use crate::error::{Error, Result};
use crate::models::{DiscoveryTask, ScanTask};

#[derive(Debug, Clone)]
struct Message {
    queue: String,
    body: String,
    delay: Option<Duration>,
}

/// In-process queue for dry runs. Delays are recorded but not honored.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    messages: Mutex<VecDeque<Message>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, message: Message) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| Error::Queue("memory queue lock poisoned".to_string()))?
            .push_back(message);
        Ok(())
    }

    fn snapshot(&self, queue: &str) -> Vec<Message> {
        match self.messages.lock() {
            Ok(messages) => messages.iter().filter(|m| m.queue == queue).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Removes and returns the oldest message on `queue`.
    pub fn pop(&self, queue: &str) -> Option<String> {
        let mut messages = self.messages.lock().ok()?;
        let index = messages.iter().position(|m| m.queue == queue)?;
        messages.remove(index).map(|m| m.body)
    }

    pub fn len(&self, queue: &str) -> usize {
        self.snapshot(queue).len()
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    pub fn bodies(&self, queue: &str) -> Vec<String> {
        self.snapshot(queue).into_iter().map(|m| m.body).collect()
    }

    pub fn delays(&self, queue: &str) -> Vec<Option<Duration>> {
        self.snapshot(queue).into_iter().map(|m| m.delay).collect()
    }

    pub fn discovery_tasks(&self, queue: &str) -> Vec<DiscoveryTask> {
        self.bodies(queue)
            .iter()
            .filter_map(|body| serde_json::from_str(body).ok())
            .collect()
    }

    pub fn scan_tasks(&self, queue: &str) -> Vec<ScanTask> {
        self.bodies(queue)
            .iter()
            .filter_map(|body| serde_json::from_str(body).ok())
            .collect()
    }
}

#[async_trait]
impl QueuePublisher for MemoryQueue {
    async fn publish(&self, queue: &str, body: String) -> Result<()> {
        self.push(Message {
            queue: queue.to_string(),
            body,
            delay: None,
        })
    }

    async fn publish_delayed(&self, queue: &str, body: String, delay: Duration) -> Result<()> {
        self.push(Message {
            queue: queue.to_string(),
            body,
            delay: Some(delay),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pop_is_fifo_per_queue() {
        let queue = MemoryQueue::new();
        queue.publish("a", "1".to_string()).await.unwrap();
        queue.publish("b", "2".to_string()).await.unwrap();
        queue.publish("a", "3".to_string()).await.unwrap();

        assert_eq!(queue.len("a"), 2);
        assert_eq!(queue.pop("a").as_deref(), Some("1"));
        assert_eq!(queue.pop("a").as_deref(), Some("3"));
        assert_eq!(queue.pop("a"), None);
        assert!(!queue.is_empty("b"));
    }
}
