//! Published services
//!
//! Metadata describing a service to the broker, the handler seam application
//! code implements, discovery filters, and the executor task that answers
//! requests for a published service.

pub mod executor;
pub mod handler;
pub mod metadata;
pub mod search;

pub use executor::{ ExecutorState, ServiceExecutor };
pub use handler::{ ServiceError, ServiceMethod };
pub use metadata::ServiceMetadata;
pub use search::SearchStrategy;
