use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::driver::PaginationDriver;
use crate::error::Result;
use crate::models::DiscoveryTask;
use crate::queue::{QueuedMessage, SqliteQueue};

/// Pulls discovery tasks off the local queue and runs them through the driver,
/// up to `concurrency` deliveries at a time.
pub struct Worker {
    driver: Arc<PaginationDriver>,
    queue: Arc<SqliteQueue>,
    concurrency: usize,
}

impl Worker {
    pub fn new(driver: Arc<PaginationDriver>, queue: Arc<SqliteQueue>, concurrency: usize) -> Self {
        Self {
            driver,
            queue,
            concurrency: concurrency.max(1),
        }
    }

    /// Processes one batch. Returns how many deliveries were handled.
    pub async fn run_once(&self) -> Result<usize> {
        let messages = self
            .queue
            .claim_many(self.driver.producer().discovery_queue(), self.concurrency)?;
        let count = messages.len();

        let results = join_all(messages.into_iter().map(|message| self.deliver(message))).await;
        for result in results {
            if let Err(e) = result {
                tracing::error!("Failed to settle delivery: {}", e);
            }
        }

        Ok(count)
    }

    /// Runs until the queue stays empty (`once`) or forever, idling between polls.
    pub async fn run(&self, once: bool, idle: Duration) -> Result<()> {
        loop {
            let handled = self.run_once().await?;
            if handled == 0 {
                if once {
                    return Ok(());
                }
                tokio::time::sleep(idle).await;
            }
        }
    }

    async fn deliver(&self, message: QueuedMessage) -> Result<()> {
        let task: DiscoveryTask = match serde_json::from_str(&message.body) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("Discarding malformed discovery message {}: {}", message.id, e);
                return self.queue.ack(message.id);
            }
        };

        match self.driver.run(&task).await {
            Ok(outcome) => {
                tracing::debug!("Delivery {} {}", message.id, outcome);
                self.queue.ack(message.id)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Delivery {} failed, releasing for retry: {}", message.id, e);
                self.queue.release(message.id)
            }
            Err(e) => {
                tracing::error!("Delivery {} failed: {}", message.id, e);
                self.queue.ack(message.id)
            }
        }
    }
}
