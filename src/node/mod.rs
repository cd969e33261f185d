//! Node runtime
//!
//! The [`Node`] façade, its configuration, and the registry of services it
//! has published.

pub mod config;
pub mod node;
pub mod registry;

pub use config::{ NodeBuilder, NodeConfig };
pub use node::Node;
pub use registry::{ PendingService, PublishedService, Registry };

#[cfg(test)]
mod tests;
