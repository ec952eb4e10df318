pub mod repository;
pub mod task;

pub use repository::*;
pub use task::*;
