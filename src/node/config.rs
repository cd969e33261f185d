//! Node configuration and builder

use serde::{ Deserialize, Serialize };
use std::sync::Arc;
use std::time::Duration;

use crate::node::Node;
use crate::transport::ConnectionFactory;

/// Default round-trip timeout in milliseconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 1000;

/// Default reconciliation period in seconds
const DEFAULT_RECONCILE_INTERVAL: u64 = 60;

/// Configuration for a [`Node`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// Bound on every broker or peer round trip
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    /// Period of the reconciliation pass
    #[serde(with = "millis")]
    pub reconcile_interval: Duration,
    /// Whether the node runs reconciliation on its own timer
    pub auto_reconcile: bool,
    /// Broker method that registers a service
    pub register_method: String,
    /// Broker method that deletes a service
    pub delete_method: String,
    /// Broker method that lists services
    pub list_method: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT),
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL),
            auto_reconcile: true,
            register_method: "registerService".to_string(),
            delete_method: "deleteService".to_string(),
            list_method: "getServicesList".to_string(),
        }
    }
}

mod millis {
    use serde::{ Deserialize, Deserializer, Serializer };
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Builder for creating Node instances with custom configuration
pub struct NodeBuilder {
    factory: Arc<dyn ConnectionFactory>,
    config: NodeConfig,
}

impl NodeBuilder {
    /// Create a new node builder with the given connection factory
    pub fn new<F: ConnectionFactory + 'static>(factory: F) -> Self {
        Self::from_shared(Arc::new(factory))
    }

    pub fn from_shared(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            config: NodeConfig::default(),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the round-trip timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the reconciliation period
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.config.reconcile_interval = interval;
        self
    }

    /// Enable or disable the reconciliation timer
    pub fn with_auto_reconcile(mut self, auto_reconcile: bool) -> Self {
        self.config.auto_reconcile = auto_reconcile;
        self
    }

    pub fn with_register_method(mut self, method: impl Into<String>) -> Self {
        self.config.register_method = method.into();
        self
    }

    pub fn with_delete_method(mut self, method: impl Into<String>) -> Self {
        self.config.delete_method = method.into();
        self
    }

    pub fn with_list_method(mut self, method: impl Into<String>) -> Self {
        self.config.list_method = method.into();
        self
    }

    /// Build the node. Must be called inside a tokio runtime when the
    /// reconciliation timer is enabled; a zero interval leaves it off.
    pub fn build(self) -> Node {
        Node::with_config(self.factory, self.config)
    }
}
