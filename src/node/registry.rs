//! Registry of locally published services
//!
//! The [`Node`](crate::Node) keeps one registry behind one mutex. Every
//! publish, unpublish and reconciliation pass takes that lock for its whole
//! duration, broker round trips included, so they never interleave.

use std::collections::{ HashMap, HashSet };
use std::sync::Arc;

use crate::service::{ ServiceExecutor, ServiceMetadata, ServiceMethod };

/// A registered service and the task serving it
pub struct PublishedService {
    pub metadata: ServiceMetadata,
    pub handler: Arc<dyn ServiceMethod>,
    pub executor: ServiceExecutor,
}

/// A service whose republication failed; retried on the next pass
pub struct PendingService {
    pub metadata: ServiceMetadata,
    pub handler: Arc<dyn ServiceMethod>,
}

#[derive(Default)]
pub struct Registry {
    services: HashMap<String, PublishedService>,
    pending: Vec<PendingService>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the broker-assigned name, returning any entry it replaces
    pub fn insert(&mut self, method: String, service: PublishedService) -> Option<PublishedService> {
        self.services.insert(method, service)
    }

    pub fn remove(&mut self, method: &str) -> Option<PublishedService> {
        self.services.remove(method)
    }

    pub fn get(&self, method: &str) -> Option<&PublishedService> {
        self.services.get(method)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.services.contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Registered names, sorted
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PublishedService)> {
        self.services.iter()
    }

    /// Registered names the broker did not report, sorted
    pub fn missing_from(&self, reported: &HashSet<String>) -> Vec<String> {
        let mut missing: Vec<String> = self.services
            .keys()
            .filter(|name| !reported.contains(*name))
            .cloned()
            .collect();
        missing.sort();
        missing
    }

    pub fn push_pending(&mut self, metadata: ServiceMetadata, handler: Arc<dyn ServiceMethod>) {
        self.pending.push(PendingService { metadata, handler });
    }

    pub fn take_pending(&mut self) -> Vec<PendingService> {
        std::mem::take(&mut self.pending)
    }

    /// Drop a pending entry by its last assigned name
    pub fn remove_pending(&mut self, method: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.metadata.method_name() != Some(method));
        self.pending.len() != before
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
