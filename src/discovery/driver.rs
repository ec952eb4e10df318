use std::sync::Arc;

use super::node_processor::NodeProcessor;
use super::session::ProviderSession;
use crate::api::errors::is_graphql_failure;
use crate::api::{
    analyze_error_response, ErrorClassification, ErrorReport, HttpResponse, HttpTransport,
};
use crate::config::DiscoveryConfig;
use crate::error::Result;
use crate::models::{DiscoveryTask, Page};
use crate::providers;
use crate::queue::TaskProducer;

/// How one delivery of a discovery task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The page was consumed. `continued` is set when a successor task was published.
    Completed { scan_tasks: usize, continued: bool },
    /// Rate limited; the same task was published again.
    Requeued,
    /// The page could not be fetched or read; the chain stops here.
    Dropped { classification: ErrorClassification },
    /// The task itself is unusable (unknown service, bad cursor, ...).
    Rejected { reason: String },
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Completed { scan_tasks, continued } => write!(
                f,
                "completed: {} scan tasks{}",
                scan_tasks,
                if *continued { ", continued" } else { "" }
            ),
            DeliveryOutcome::Requeued => write!(f, "requeued"),
            DeliveryOutcome::Dropped { classification } => {
                write!(f, "dropped ({})", classification)
            }
            DeliveryOutcome::Rejected { reason } => write!(f, "rejected: {}", reason),
        }
    }
}

/// Processes one discovery task per call: fetch a page, classify failures,
/// emit scan tasks, and publish at most one successor for the chain.
pub struct PaginationDriver {
    config: DiscoveryConfig,
    transport: Arc<dyn HttpTransport>,
    producer: TaskProducer,
}

fn describe(task: &DiscoveryTask) -> String {
    match task.repo {
        Some(ref repo) => format!("{}/{}/{}", task.service, task.org, repo),
        None => format!("{}/{}", task.service, task.org),
    }
}

impl PaginationDriver {
    pub fn new(
        config: DiscoveryConfig,
        transport: Arc<dyn HttpTransport>,
        producer: TaskProducer,
    ) -> Self {
        Self {
            config,
            transport,
            producer,
        }
    }

    pub fn producer(&self) -> &TaskProducer {
        &self.producer
    }

    /// Only queue failures are returned as errors; provider failures are
    /// logged and reported through the outcome.
    pub async fn run(&self, task: &DiscoveryTask) -> Result<DeliveryOutcome> {
        let label = describe(task);

        if task.org.trim().is_empty() {
            return Ok(reject(&label, "task has no organization".to_string()));
        }

        let service_config = match self.config.service(task.service) {
            Ok(config) => config,
            Err(e) => return Ok(reject(&label, e.to_string())),
        };
        let provider = match providers::for_service(task.service, service_config) {
            Ok(provider) => provider,
            Err(e) => return Ok(reject(&label, e.to_string())),
        };
        let session = ProviderSession::new(
            provider.as_ref(),
            self.transport.as_ref(),
            service_config.authorization(),
        );

        let query = match task.repo {
            Some(ref repo) => provider.build_branch_query(&task.org, repo, task.cursor.as_ref()),
            None => provider.build_query(&task.org, task.cursor.as_ref()),
        };
        let query = match query {
            Ok(query) => query,
            Err(e) => return Ok(reject(&label, e.to_string())),
        };
        let is_graphql = query.is_graphql();

        tracing::debug!("Fetching {} (cursor {:?})", label, task.cursor);
        let response = match session.fetch(query).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Dropping page for {}: request failed: {}", label, e);
                return Ok(DeliveryOutcome::Dropped {
                    classification: ErrorClassification::Transient,
                });
            }
        };

        if !response.is_success() || (is_graphql && is_graphql_failure(&response.body)) {
            return self.handle_error(task, &label, &response).await;
        }

        let page = match task.repo {
            Some(ref repo) => provider
                .parse_branch_page(&response)
                .map(|branches| Page::for_repository(repo, branches)),
            None => provider.parse_page(&task.org, &response),
        };
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Dropping page for {}: {}", label, e);
                return Ok(DeliveryOutcome::Dropped {
                    classification: ErrorClassification::NotFound,
                });
            }
        };

        let processed = NodeProcessor::new(&session).process(task, page.nodes).await;
        if processed.rate_limited {
            return self.requeue(task, &label).await;
        }

        let scan_tasks = self.producer.publish_scan_tasks(&processed.scan_tasks).await?;
        for continuation in &processed.continuations {
            self.producer.publish_discovery(continuation).await?;
        }

        let continued = match page.next {
            Some(next) if task.cursor.as_ref() == Some(&next) => {
                tracing::warn!("Cursor {} did not advance for {}, ending chain", next, label);
                false
            }
            Some(next) => {
                tracing::debug!("Continuing {} at cursor {}", label, next);
                self.producer.publish_discovery(&task.with_cursor(next)).await?;
                true
            }
            None => false,
        };

        tracing::info!(
            "Processed {}: {} scan tasks, {} branch continuations{}",
            label,
            scan_tasks,
            processed.continuations.len(),
            if continued { ", more pages queued" } else { "" }
        );

        Ok(DeliveryOutcome::Completed {
            scan_tasks,
            continued,
        })
    }

    async fn handle_error(
        &self,
        task: &DiscoveryTask,
        label: &str,
        response: &HttpResponse,
    ) -> Result<DeliveryOutcome> {
        match analyze_error_response(Some(response)) {
            Some(ErrorReport::RateLimited) => self.requeue(task, label).await,
            Some(report) => {
                let classification = report.classification(response.status);
                tracing::warn!(
                    "Dropping page for {} ({}, HTTP {}): {}",
                    label,
                    classification,
                    response.status,
                    report
                );
                Ok(DeliveryOutcome::Dropped { classification })
            }
            None => Ok(DeliveryOutcome::Dropped {
                classification: ErrorClassification::Unknown,
            }),
        }
    }

    // Nothing of this delivery has been published yet, so the retry starts clean.
    async fn requeue(&self, task: &DiscoveryTask, label: &str) -> Result<DeliveryOutcome> {
        tracing::warn!(
            "Rate limited on {}, requeueing in {:?}",
            label,
            self.config.requeue_delay
        );
        self.producer.requeue(task, self.config.requeue_delay).await?;
        Ok(DeliveryOutcome::Requeued)
    }
}

fn reject(label: &str, reason: String) -> DeliveryOutcome {
    tracing::error!("Rejecting discovery task {}: {}", label, reason);
    DeliveryOutcome::Rejected { reason }
}
