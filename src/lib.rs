pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod providers;
pub mod queue;

pub use config::{Config, DiscoveryConfig, ServiceConfig};
pub use discovery::{DeliveryOutcome, PaginationDriver, Worker};
pub use error::{Error, Result};
pub use queue::{MemoryQueue, QueuePublisher, SqliteQueue, TaskProducer};
