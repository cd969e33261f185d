//! In-memory broker used by the node tests
//!
//! Listens on the bus of a [`MemoryNetwork`]. It answers `registerService`,
//! `deleteService` and `getServicesList` itself and forwards every other call
//! to the connection that registered the method, rewriting ids on the way out
//! and restoring them on the way back. Batch members are forwarded one by one
//! and the answers reassembled into one batch response.

use serde_json::{ json, Value };
use std::collections::{ BTreeMap, HashMap };
use std::sync::Arc;
use tokio::sync::{ mpsc, Mutex };
use tokio::task::JoinHandle;

use crate::protocol::{
    BatchRequest,
    BatchResponse,
    Call,
    Id,
    Message,
    Notification,
    Request,
    Response,
    RpcError,
};
use crate::transport::{ ConnectionId, Envelope, MemoryNetwork };

struct Registered {
    connection: ConnectionId,
    metadata: Value,
}

enum Target {
    Single {
        requester: ConnectionId,
        id: Id,
    },
    Batch {
        batch: u64,
        id: Id,
    },
}

struct PendingBatch {
    requester: ConnectionId,
    outstanding: usize,
    collected: Vec<Response>,
}

struct BrokerState {
    services: BTreeMap<String, Registered>,
    in_flight: HashMap<i64, Target>,
    batches: HashMap<u64, PendingBatch>,
    next_forward_id: i64,
    next_batch: u64,
    accept_registrations: bool,
    reverse_batches: bool,
    registrations: usize,
    deletions: Vec<String>,
    service_responses: usize,
}

type Outgoing = Vec<(ConnectionId, Message)>;

impl BrokerState {
    fn new() -> Self {
        Self {
            services: BTreeMap::new(),
            in_flight: HashMap::new(),
            batches: HashMap::new(),
            next_forward_id: 1000,
            next_batch: 0,
            accept_registrations: true,
            reverse_batches: false,
            registrations: 0,
            deletions: Vec::new(),
            service_responses: 0,
        }
    }

    fn handle(&mut self, from: ConnectionId, message: Message) -> Outgoing {
        match message {
            Message::Request(req) => self.on_request(from, req),
            Message::Notification(notif) => self.on_notification(notif),
            Message::Response(resp) => self.on_response(resp),
            Message::BatchRequest(batch) => self.on_batch(from, batch),
            Message::BatchResponse(_) => Vec::new(),
        }
    }

    fn on_request(&mut self, from: ConnectionId, req: Request) -> Outgoing {
        match req.method.as_str() {
            "registerService" => {
                self.registrations += 1;
                if !self.accept_registrations {
                    return Vec::new();
                }
                let mut metadata = req.params.unwrap_or_else(|| json!({}));
                let title = metadata
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or("service")
                    .to_string();
                let name = self.unique_name(&title);
                metadata["method"] = json!(name);
                self.services.insert(name.clone(), Registered { connection: from, metadata });
                let result = json!({ "serviceRegistered": true, "method": name });
                vec![(from, Message::Response(Response::success(req.id, result)))]
            }
            "getServicesList" => {
                let list: Vec<Value> = self.services
                    .values()
                    .filter(|service| matches_filter(req.params.as_ref(), &service.metadata))
                    .map(|service| service.metadata.clone())
                    .collect();
                vec![(from, Message::Response(Response::success(req.id, Value::Array(list))))]
            }
            _ => {
                let Some(connection) = self.services.get(&req.method).map(|s| s.connection) else {
                    let reply = Response::error(req.id, RpcError::method_not_found());
                    return vec![(from, Message::Response(reply))];
                };
                let forward_id = self.forward_id(Target::Single { requester: from, id: req.id });
                let forwarded = Request::new(req.method, req.params, forward_id);
                vec![(connection, Message::Request(forwarded))]
            }
        }
    }

    fn on_notification(&mut self, notif: Notification) -> Outgoing {
        if notif.method == "deleteService" {
            let name = notif.params
                .as_ref()
                .and_then(|params| params.get("method"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(name) = name {
                self.services.remove(&name);
                self.deletions.push(name);
            }
            return Vec::new();
        }
        match self.services.get(&notif.method) {
            Some(service) => vec![(service.connection, Message::Notification(notif))],
            None => Vec::new(),
        }
    }

    fn on_response(&mut self, resp: Response) -> Outgoing {
        self.service_responses += 1;
        let Some(target) = resp.id.as_i64().and_then(|id| self.in_flight.remove(&id)) else {
            return Vec::new();
        };
        match target {
            Target::Single { requester, id } => {
                vec![(requester, Message::Response(Response { id, outcome: resp.outcome }))]
            }
            Target::Batch { batch, id } => {
                let Some(pending) = self.batches.get_mut(&batch) else {
                    return Vec::new();
                };
                pending.collected.push(Response { id, outcome: resp.outcome });
                pending.outstanding -= 1;
                if pending.outstanding > 0 {
                    return Vec::new();
                }
                match self.batches.remove(&batch) {
                    Some(done) => self.finish_batch(done),
                    None => Vec::new(),
                }
            }
        }
    }

    fn on_batch(&mut self, from: ConnectionId, batch: BatchRequest) -> Outgoing {
        let batch_id = self.next_batch;
        self.next_batch += 1;

        let mut out = Vec::new();
        let mut pending = PendingBatch {
            requester: from,
            outstanding: 0,
            collected: Vec::new(),
        };
        for call in batch.items {
            match call {
                Call::Notification(notif) => {
                    if let Some(service) = self.services.get(&notif.method) {
                        out.push((service.connection, Message::Notification(notif)));
                    }
                }
                Call::Request(req) => {
                    match self.services.get(&req.method).map(|s| s.connection) {
                        None => {
                            pending.collected.push(
                                Response::error(req.id, RpcError::method_not_found())
                            );
                        }
                        Some(connection) => {
                            let forward_id = self.forward_id(Target::Batch {
                                batch: batch_id,
                                id: req.id,
                            });
                            pending.outstanding += 1;
                            out.push((
                                connection,
                                Message::Request(Request::new(req.method, req.params, forward_id)),
                            ));
                        }
                    }
                }
            }
        }

        if pending.outstanding == 0 {
            out.extend(self.finish_batch(pending));
        } else {
            self.batches.insert(batch_id, pending);
        }
        out
    }

    fn finish_batch(&self, mut done: PendingBatch) -> Outgoing {
        if done.collected.is_empty() {
            return Vec::new();
        }
        if self.reverse_batches {
            done.collected.reverse();
        }
        vec![(done.requester, Message::BatchResponse(BatchResponse::new(done.collected)))]
    }

    fn forward_id(&mut self, target: Target) -> Id {
        let id = self.next_forward_id;
        self.next_forward_id += 1;
        self.in_flight.insert(id, target);
        Id::Number(id)
    }

    fn unique_name(&self, title: &str) -> String {
        if !self.services.contains_key(title) {
            return title.to_string();
        }
        (1..)
            .map(|n| format!("{}{}", title, n))
            .find(|candidate| !self.services.contains_key(candidate))
            .unwrap_or_else(|| title.to_string())
    }
}

fn matches_filter(filter: Option<&Value>, metadata: &Value) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    let value = &filter["value"];
    match filter.get("searchStrategy").and_then(Value::as_str) {
        Some("title") => metadata.get("title") == Some(value),
        Some("owner") => metadata.get("owner") == Some(value),
        Some("keyword") => {
            let wanted = value.as_array().cloned().unwrap_or_default();
            metadata
                .get("keywords")
                .and_then(Value::as_array)
                .is_some_and(|keywords| keywords.iter().any(|k| wanted.contains(k)))
        }
        _ => true,
    }
}

/// A running broker on its own in-memory network
pub struct Broker {
    network: MemoryNetwork,
    state: Arc<Mutex<BrokerState>>,
    task: JoinHandle<()>,
}

impl Broker {
    pub fn start() -> Self {
        let (network, bus) = MemoryNetwork::new();
        let state = Arc::new(Mutex::new(BrokerState::new()));
        let task = tokio::spawn(run(network.clone(), bus, state.clone()));
        Self { network, state, task }
    }

    /// Factory for nodes talking to this broker
    pub fn network(&self) -> MemoryNetwork {
        self.network.clone()
    }

    /// When off, registrations are counted but never answered
    pub async fn set_accept_registrations(&self, accept: bool) {
        self.state.lock().await.accept_registrations = accept;
    }

    /// Answer batches in the reverse order of completion
    pub async fn set_reverse_batches(&self, reverse: bool) {
        self.state.lock().await.reverse_batches = reverse;
    }

    /// Lose every registration, as after a broker restart
    pub async fn forget_all(&self) {
        self.state.lock().await.services.clear();
    }

    pub async fn registrations(&self) -> usize {
        self.state.lock().await.registrations
    }

    pub async fn deletions(&self) -> Vec<String> {
        self.state.lock().await.deletions.clone()
    }

    pub async fn service_names(&self) -> Vec<String> {
        self.state.lock().await.services.keys().cloned().collect()
    }

    /// Responses received from service connections
    pub async fn service_responses(&self) -> usize {
        self.state.lock().await.service_responses
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    network: MemoryNetwork,
    mut bus: mpsc::UnboundedReceiver<Envelope>,
    state: Arc<Mutex<BrokerState>>
) {
    while let Some(envelope) = bus.recv().await {
        let Ok(message) = Message::parse(&envelope.frame) else {
            continue;
        };
        let outgoing = state.lock().await.handle(envelope.from, message);
        for (to, message) in outgoing {
            network.deliver(to, message.to_string()).await;
        }
    }
}
