pub mod branch_resolver;
pub mod driver;
pub mod node_processor;
pub mod session;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use branch_resolver::{BranchResolver, RateLimited};
pub use driver::{DeliveryOutcome, PaginationDriver};
pub use node_processor::{NodeProcessor, ProcessedPage};
pub use session::ProviderSession;
pub use worker::Worker;
