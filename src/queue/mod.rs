pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DiscoveryTask, ScanTask};

pub use memory::MemoryQueue;
pub use sqlite::{QueuedMessage, SqliteQueue};

/// The work queue as seen by discovery: an opaque publish call.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, queue: &str, body: String) -> Result<()>;

    /// Publish a message that should not be delivered before `delay` has
    /// passed. Backends without delayed delivery publish immediately.
    async fn publish_delayed(&self, queue: &str, body: String, delay: Duration) -> Result<()> {
        let _ = delay;
        self.publish(queue, body).await
    }
}

/// Serializes discovery and scan tasks onto their queues.
#[derive(Clone)]
pub struct TaskProducer {
    publisher: Arc<dyn QueuePublisher>,
    discovery_queue: String,
    scan_queue: String,
}

impl TaskProducer {
    pub fn new(
        publisher: Arc<dyn QueuePublisher>,
        discovery_queue: impl Into<String>,
        scan_queue: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            discovery_queue: discovery_queue.into(),
            scan_queue: scan_queue.into(),
        }
    }

    pub fn discovery_queue(&self) -> &str {
        &self.discovery_queue
    }

    pub fn scan_queue(&self) -> &str {
        &self.scan_queue
    }

    pub async fn publish_scan_tasks(&self, tasks: &[ScanTask]) -> Result<usize> {
        for task in tasks {
            let body = serde_json::to_string(task)?;
            self.publisher.publish(&self.scan_queue, body).await?;
        }
        Ok(tasks.len())
    }

    /// Seed or continuation task.
    pub async fn publish_discovery(&self, task: &DiscoveryTask) -> Result<()> {
        let body = serde_json::to_string(task)?;
        self.publisher.publish(&self.discovery_queue, body).await
    }

    /// Re-publishes `task` unchanged, delayed by the queue.
    pub async fn requeue(&self, task: &DiscoveryTask, delay: Duration) -> Result<()> {
        let body = serde_json::to_string(task)?;
        self.publisher
            .publish_delayed(&self.discovery_queue, body, delay)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Service;

    #[tokio::test]
    async fn test_producer_routes_by_queue() {
        let queue = Arc::new(MemoryQueue::new());
        let producer = TaskProducer::new(queue.clone(), "discovery", "scan");

        let task = DiscoveryTask::new(Service::GitHub, "wm-test", "batch");
        producer.publish_discovery(&task).await.unwrap();
        producer.requeue(&task, Duration::from_secs(30)).await.unwrap();

        let scan = ScanTask {
            org: "wm-test".to_string(),
            repo: "athena".to_string(),
            branch: "main".to_string(),
            service: Service::GitHub,
            plugins: vec!["eslint".to_string()],
        };
        assert_eq!(producer.publish_scan_tasks(&[scan.clone()]).await.unwrap(), 1);

        assert_eq!(queue.discovery_tasks("discovery"), vec![task.clone(), task]);
        assert_eq!(queue.scan_tasks("scan"), vec![scan]);
        assert_eq!(queue.delays("discovery"), vec![None, Some(Duration::from_secs(30))]);
    }

    #[tokio::test]
    async fn test_scan_message_field_names() {
        let queue = Arc::new(MemoryQueue::new());
        let producer = TaskProducer::new(queue.clone(), "discovery", "scan");
        let scan = ScanTask {
            org: "wm-test".to_string(),
            repo: "entertainment/mts".to_string(),
            branch: "master".to_string(),
            service: Service::GitLab,
            plugins: vec!["eslint".to_string()],
        };
        producer.publish_scan_tasks(&[scan]).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&queue.bodies("scan")[0]).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "org": "wm-test",
                "repo": "entertainment/mts",
                "branch": "master",
                "service": "gitlab",
                "plugins": ["eslint"]
            })
        );
    }
}
