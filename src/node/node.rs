//! The node façade
//!
//! A [`Node`] publishes local services to the broker and invokes services
//! published elsewhere. Every operation opens a fresh connection through the
//! node's [`ConnectionFactory`]; a published service keeps the connection it
//! registered on for its executor.
//!
//! Failures that are part of normal operation (no answer in time, a reply
//! that does not parse, a broker that cannot be reached) never escape as
//! errors: invocations return synthesized error responses with a null id, and
//! registration reports a boolean.

use serde_json::{ json, Value };
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{ AtomicI64, Ordering };
use tokio::sync::{ mpsc, Mutex, RwLock };
use tokio::task::JoinHandle;
use tokio::time::{ interval_at, Instant, MissedTickBehavior };
use tracing::{ debug, error, info, warn };

use crate::errors::{ Error, Result };
use crate::node::config::NodeConfig;
use crate::node::registry::{ PublishedService, Registry };
use crate::protocol::{
    BatchRequest,
    BatchResponse,
    Call,
    Id,
    Message,
    Notification,
    Outcome,
    Request,
    Response,
    RpcError,
};
use crate::service::{ SearchStrategy, ServiceExecutor, ServiceMetadata, ServiceMethod };
use crate::transport::{ ConnectionFactory, Manager };

/// Peer node of the service network
pub struct Node {
    inner: Arc<NodeInner>,
    /// Handle to the reconciliation task
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
    /// Stops the reconciliation task
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

struct NodeInner {
    factory: RwLock<Arc<dyn ConnectionFactory>>,
    registry: Mutex<Registry>,
    /// Counter for generating request ids
    next_id: AtomicI64,
    config: NodeConfig,
}

impl Node {
    /// Create a node with the default configuration.
    ///
    /// Must be called inside a tokio runtime, since the reconciliation timer
    /// is spawned here.
    pub fn new<F: ConnectionFactory + 'static>(factory: F) -> Self {
        Self::with_config(Arc::new(factory), NodeConfig::default())
    }

    /// Create a node; starts the reconciliation timer unless disabled.
    ///
    /// Must be called inside a tokio runtime when the timer is enabled. A
    /// zero reconciliation interval leaves the timer off.
    pub fn with_config(factory: Arc<dyn ConnectionFactory>, config: NodeConfig) -> Self {
        let mut auto_reconcile = config.auto_reconcile;
        if auto_reconcile && config.reconcile_interval.is_zero() {
            warn!("Reconciliation interval is zero, timer not started");
            auto_reconcile = false;
        }
        let inner = Arc::new(NodeInner {
            factory: RwLock::new(factory),
            registry: Mutex::new(Registry::new()),
            next_id: AtomicI64::new(0),
            config,
        });

        let (reconcile_task, shutdown_tx) = if auto_reconcile {
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
            (Some(spawn_reconciler(inner.clone(), shutdown_rx)), Some(shutdown_tx))
        } else {
            (None, None)
        };

        Self {
            inner,
            reconcile_task: Mutex::new(reconcile_task),
            shutdown_tx: Mutex::new(shutdown_tx),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Replace the factory used by every later operation
    pub async fn set_connection_factory<F: ConnectionFactory + 'static>(&self, factory: F) {
        *self.inner.factory.write().await = Arc::new(factory);
        info!("Connection factory replaced");
    }

    /// Register a service with the broker and start serving it.
    ///
    /// On success the broker-assigned name is stored in `metadata`. Returns
    /// `false`, with nothing registered and no task left running, if the
    /// broker refuses, does not answer in time or answers with garbage.
    pub async fn publish<H: ServiceMethod + 'static>(
        &self,
        metadata: &mut ServiceMetadata,
        handler: H
    ) -> bool {
        self.publish_shared(metadata, Arc::new(handler)).await
    }

    /// [`publish`](Self::publish) for a handler that is already shared
    pub async fn publish_shared(
        &self,
        metadata: &mut ServiceMetadata,
        handler: Arc<dyn ServiceMethod>
    ) -> bool {
        let mut registry = self.inner.registry.lock().await;
        self.inner.publish_locked(&mut registry, metadata, handler).await
    }

    /// Withdraw a service: tell the broker, stop the executor, forget it.
    ///
    /// Returns `false` if no service of that name is published here.
    pub async fn unpublish(&self, method: &str) -> bool {
        let mut registry = self.inner.registry.lock().await;
        self.inner.unpublish_locked(&mut registry, method).await
    }

    /// Call a remote method and wait for its response
    pub async fn invoke(&self, method: &str, params: Option<Value>) -> Response {
        self.inner.invoke(method, params).await
    }

    /// Send a notification; returns whether it could be sent
    pub async fn notify(&self, method: &str, params: Option<Value>) -> bool {
        self.inner.notify(method, params).await
    }

    /// Build a batch with a fresh id for every call
    pub fn build_batch<I, S>(&self, calls: I) -> BatchRequest
        where I: IntoIterator<Item = (S, Option<Value>)>, S: Into<String>
    {
        let items: Vec<Call> = calls
            .into_iter()
            .map(|(method, params)| Call::Request(Request::new(method, params, self.inner.next_id())))
            .collect();
        BatchRequest::new(items)
    }

    /// Send a batch and wait for its response.
    ///
    /// Failure yields a batch holding a single synthesized error entry with a
    /// null id. Use [`BatchResponse::correlate`] to match entries to calls.
    pub async fn send_batch(&self, batch: &BatchRequest) -> BatchResponse {
        self.inner.send_batch(batch).await
    }

    /// [`build_batch`](Self::build_batch) followed by [`send_batch`](Self::send_batch)
    pub async fn invoke_batch<I, S>(&self, calls: I) -> BatchResponse
        where I: IntoIterator<Item = (S, Option<Value>)>, S: Into<String>
    {
        let batch = self.build_batch(calls);
        self.send_batch(&batch).await
    }

    /// List services known to the broker, optionally filtered.
    ///
    /// Any failure yields an empty list.
    pub async fn discover(&self, strategy: Option<&SearchStrategy>) -> Vec<ServiceMetadata> {
        match self.inner.try_discover(strategy).await {
            Ok(services) => services,
            Err(e) => {
                warn!("Service discovery failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Republish every local service the broker no longer lists.
    ///
    /// Returns how many services were republished.
    pub async fn reconcile(&self) -> usize {
        self.inner.reconcile().await
    }

    /// Names of the services published by this node
    pub async fn running_services(&self) -> Vec<String> {
        let registry = self.inner.registry.lock().await;
        for (name, service) in registry.iter() {
            info!(method = %name, metadata = %service.metadata.to_json(), "Running service");
        }
        registry.method_names()
    }

    /// Stop the reconciliation timer, then unpublish every service
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.reconcile_task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Reconciliation task failed: {}", e);
            }
        }

        let mut registry = self.inner.registry.lock().await;
        for name in registry.method_names() {
            self.inner.unpublish_locked(&mut registry, &name).await;
        }
        let dropped = registry.take_pending().len();
        if dropped > 0 {
            debug!(dropped, "Dropped services awaiting republication");
        }
        info!("Node shut down");
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(handle) = self.reconcile_task.get_mut().take() {
            handle.abort();
        }
    }
}

fn spawn_reconciler(inner: Arc<NodeInner>, mut shutdown_rx: mpsc::Receiver<()>) -> JoinHandle<()> {
    let period = inner.config.reconcile_interval;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Received shutdown signal, stopping reconciliation");
                    break;
                }
                _ = ticker.tick() => {
                    inner.reconcile().await;
                }
            }
        }
    })
}

impl NodeInner {
    fn next_id(&self) -> Id {
        Id::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn open(&self) -> Result<Manager> {
        let factory = self.factory.read().await.clone();
        Ok(Manager::new(factory.create_connection().await?))
    }

    /// Send on `manager` and wait for a response-shaped reply
    async fn round_trip(&self, manager: &mut Manager, message: &Message) -> Result<Message> {
        manager.send(message).await?;
        manager.listen_response_timeout(self.config.request_timeout).await
    }

    async fn exchange(&self, message: &Message) -> Result<Message> {
        let mut manager = self.open().await?;
        self.round_trip(&mut manager, message).await
    }

    async fn invoke(&self, method: &str, params: Option<Value>) -> Response {
        let id = self.next_id();
        debug!(method, id = %id, "Invoking");
        let request = Message::Request(Request::new(method, params, id));
        match self.exchange(&request).await {
            Ok(Message::Response(response)) => response,
            Ok(other) => {
                warn!(method, "Expected a single response, got: {}", other);
                Response::error(Id::Null, RpcError::local_parse_error())
            }
            Err(e) => {
                warn!(method, "Invocation failed: {}", e);
                Response::error(Id::Null, e.to_rpc_error())
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> bool {
        let notification = Message::Notification(Notification::new(method, params));
        let sent = async {
            let mut manager = self.open().await?;
            manager.send(&notification).await
        };
        match sent.await {
            Ok(()) => true,
            Err(e) => {
                warn!(method, "Failed to send notification: {}", e);
                false
            }
        }
    }

    async fn send_batch(&self, batch: &BatchRequest) -> BatchResponse {
        let failed = |err: RpcError| BatchResponse::new(vec![Response::error(Id::Null, err)]);
        if batch.is_empty() {
            warn!("Refusing to send an empty batch");
            return failed(RpcError::invalid_request());
        }
        debug!(calls = batch.len(), "Invoking batch");
        match self.exchange(&Message::BatchRequest(batch.clone())).await {
            Ok(Message::BatchResponse(responses)) => responses,
            // A peer that rejects the whole batch answers with one response
            Ok(Message::Response(response)) => BatchResponse::new(vec![response]),
            Ok(other) => {
                warn!("Expected a batch response, got: {}", other);
                failed(RpcError::local_parse_error())
            }
            Err(e) => {
                warn!("Batch invocation failed: {}", e);
                failed(e.to_rpc_error())
            }
        }
    }

    async fn try_discover(&self, strategy: Option<&SearchStrategy>) -> Result<Vec<ServiceMetadata>> {
        let params = strategy.map(SearchStrategy::to_json);
        let response = self.invoke(&self.config.list_method, params).await;
        let entries = match response.outcome {
            Outcome::Result(Value::Array(entries)) => entries,
            Outcome::Result(other) => {
                return Err(Error::Other(format!("service list is not an array: {}", other)));
            }
            Outcome::Error(err) => {
                return Err(Error::Other(format!("service list unavailable: {}", err)));
            }
        };
        Ok(
            entries
                .iter()
                .filter_map(|entry| {
                    let metadata = ServiceMetadata::from_json(entry);
                    if metadata.is_none() {
                        warn!(entry = %entry, "Skipping undecodable service entry");
                    }
                    metadata
                })
                .collect()
        )
    }

    /// Registration round trip; returns the assigned name and the manager to
    /// serve on
    async fn register(&self, metadata: &ServiceMetadata) -> Result<(String, Manager)> {
        let mut manager = self.open().await?;
        let request = Message::Request(
            Request::new(&self.config.register_method, Some(metadata.to_json()), self.next_id())
        );
        let response = match self.round_trip(&mut manager, &request).await? {
            Message::Response(response) => response,
            other => {
                return Err(Error::Registration(format!("unexpected reply: {}", other)));
            }
        };
        let result = match response.outcome {
            Outcome::Result(result) => result,
            Outcome::Error(err) => {
                return Err(Error::Registration(format!("broker answered with {}", err)));
            }
        };

        let registered = result.get("serviceRegistered").and_then(Value::as_bool) == Some(true);
        match result.get("method").and_then(Value::as_str) {
            Some(method) if registered => {
                Ok((method.to_string(), Manager::new(manager.into_connection())))
            }
            _ => Err(Error::Registration(format!("service not registered: {}", result))),
        }
    }

    async fn publish_locked(
        &self,
        registry: &mut Registry,
        metadata: &mut ServiceMetadata,
        handler: Arc<dyn ServiceMethod>
    ) -> bool {
        let (method, manager) = match self.register(metadata).await {
            Ok(assigned) => assigned,
            Err(e) => {
                warn!(title = %metadata.title(), "Failed to publish service: {}", e);
                return false;
            }
        };

        metadata.set_method_name(method.clone());
        let executor = ServiceExecutor::spawn(method.clone(), manager, handler.clone());
        let service = PublishedService {
            metadata: metadata.clone(),
            handler,
            executor,
        };
        if let Some(mut previous) = registry.insert(method.clone(), service) {
            warn!(method = %method, "Broker reassigned a name in use, replacing the old service");
            previous.executor.stop().await;
        }
        info!(method = %method, title = %metadata.title(), "Service registered");
        true
    }

    async fn unpublish_locked(&self, registry: &mut Registry, method: &str) -> bool {
        let Some(mut service) = registry.remove(method) else {
            if registry.remove_pending(method) {
                info!(method, "Dropped service awaiting republication");
                return true;
            }
            warn!(method, "There is no service named {}", method);
            return false;
        };

        let params = json!({ "method": method });
        if !self.notify(&self.config.delete_method, Some(params)).await {
            warn!(method, "Broker was not told about the deletion");
        }
        service.executor.stop().await;
        info!(method, "Service deleted");
        true
    }

    async fn reconcile(&self) -> usize {
        let mut registry = self.registry.lock().await;
        if registry.is_empty() && registry.pending_len() == 0 {
            return 0;
        }

        let reported = match self.try_discover(None).await {
            Ok(services) => services,
            Err(e) => {
                warn!("Skipping reconciliation, discovery failed: {}", e);
                return 0;
            }
        };
        let reported: HashSet<String> = reported
            .iter()
            .filter_map(|metadata| metadata.method_name().map(str::to_string))
            .collect();

        let missing = registry.missing_from(&reported);
        let pending = registry.take_pending();
        if missing.is_empty() && pending.is_empty() {
            debug!("All services still registered");
            return 0;
        }

        let mut retry = Vec::new();
        for name in missing {
            if let Some(service) = registry.remove(&name) {
                let PublishedService { metadata, handler, mut executor } = service;
                info!(method = %name, "Broker lost service, republishing");
                executor.stop().await;
                retry.push((metadata, handler));
            }
        }
        retry.extend(pending.into_iter().map(|p| (p.metadata, p.handler)));

        let mut republished = 0;
        for (mut metadata, handler) in retry {
            if self.publish_locked(&mut registry, &mut metadata, handler.clone()).await {
                republished += 1;
            } else {
                registry.push_pending(metadata, handler);
            }
        }
        if registry.pending_len() > 0 {
            warn!(pending = registry.pending_len(), "Some services could not be republished");
        }
        republished
    }
}
