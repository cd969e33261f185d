//! Per-service receive loop
//!
//! Each published service owns a [`ServiceExecutor`]: a tokio task that waits
//! on the service's own [`Manager`] for request-shaped messages, runs the
//! handler for each call and answers everything that is not a notification.
//! The loop only checks for shutdown while it is waiting, so a call that has
//! reached the handler is always answered before the task ends.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{ mpsc, watch };
use tokio::task::JoinHandle;
use tracing::{ debug, error, info, warn };

use crate::errors::Error;
use crate::protocol::{ BatchRequest, BatchResponse, Call, Id, Message, Response, RpcError };
use crate::service::ServiceMethod;
use crate::transport::Manager;

/// Pause after a transport error before reading again
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Running,
    Stopping,
    Stopped,
}

/// Handle to the task serving one published method
pub struct ServiceExecutor {
    method: String,
    state: Arc<watch::Sender<ExecutorState>>,
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceExecutor {
    /// Start serving `method` on `manager`
    pub fn spawn(method: impl Into<String>, manager: Manager, handler: Arc<dyn ServiceMethod>) -> Self {
        let method = method.into();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (state, _) = watch::channel(ExecutorState::Running);
        let state = Arc::new(state);

        let handle = tokio::spawn(
            run_loop(method.clone(), manager, handler, shutdown_rx, state.clone())
        );
        info!(method = %method, "Service executor started");

        Self {
            method,
            state,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ExecutorState::Running
    }

    /// Wait until the executor reaches `wanted`
    pub async fn wait_for(&self, wanted: ExecutorState) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == wanted).await;
    }

    /// Signal the loop to stop and wait for the task to finish
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if *self.state.borrow() == ExecutorState::Running {
            self.state.send_replace(ExecutorState::Stopping);
        }
        // The loop may already be gone if its connection closed
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = handle.await {
            error!(method = %self.method, "Service executor task failed: {}", e);
        }
        self.state.send_replace(ExecutorState::Stopped);
        info!(method = %self.method, "Service executor stopped");
    }
}

impl Drop for ServiceExecutor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_loop(
    method: String,
    mut manager: Manager,
    handler: Arc<dyn ServiceMethod>,
    mut shutdown_rx: mpsc::Receiver<()>,
    state: Arc<watch::Sender<ExecutorState>>
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!(method = %method, "Received shutdown signal, stopping service loop");
                break;
            }
            result = manager.listen_request() => {
                match result {
                    Ok(message) => {
                        if let Err(e) = serve(&method, &mut manager, &handler, message).await {
                            if e.is_closed() {
                                error!(method = %method, "Connection closed while answering");
                                break;
                            }
                            warn!(method = %method, "Failed to send response: {}", e);
                        }
                    }
                    Err(Error::Parse(reason)) => {
                        debug!(method = %method, "Answering unparseable frame: {}", reason);
                        let reply = Message::Response(Response::error(Id::Null, RpcError::parse_error()));
                        if let Err(e) = manager.send(&reply).await {
                            warn!(method = %method, "Failed to send parse error: {}", e);
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        error!(method = %method, "Connection closed, service loop ends");
                        break;
                    }
                    Err(e) => {
                        error!(method = %method, "Error receiving message: {}", e);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }

    state.send_replace(ExecutorState::Stopped);
    debug!(method = %method, "Service loop terminated");
}

/// Answer one request-shaped message
async fn serve(
    method: &str,
    manager: &mut Manager,
    handler: &Arc<dyn ServiceMethod>,
    message: Message
) -> Result<(), Error> {
    match message {
        Message::Request(req) => {
            if let Some(response) = dispatch(method, handler, Call::Request(req)).await {
                manager.send(&Message::Response(response)).await?;
            }
        }
        Message::Notification(notif) => {
            dispatch(method, handler, Call::Notification(notif)).await;
        }
        Message::BatchRequest(batch) => {
            let responses = dispatch_batch(method, handler, batch).await;
            if !responses.is_empty() {
                manager.send(&Message::BatchResponse(responses)).await?;
            }
        }
        Message::Response(_) | Message::BatchResponse(_) => {
            warn!(method = %method, "Ignoring response delivered to a service");
        }
    }
    Ok(())
}

async fn dispatch_batch(
    method: &str,
    handler: &Arc<dyn ServiceMethod>,
    batch: BatchRequest
) -> BatchResponse {
    let mut responses = BatchResponse::default();
    for call in batch.items {
        if let Some(response) = dispatch(method, handler, call).await {
            responses.push(response);
        }
    }
    responses
}

/// Run the handler on one call; `None` for notifications.
///
/// The handler runs in its own task so that a panic turns into an internal
/// service error for this call instead of ending the loop.
async fn dispatch(method: &str, handler: &Arc<dyn ServiceMethod>, call: Call) -> Option<Response> {
    let id = call.id().cloned();
    let handler = handler.clone();
    let outcome = tokio::spawn(async move { handler.call(call).await }).await;

    let outcome = match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            debug!(method = %method, "Handler returned an error: {}", e);
            Err(e.to_rpc_error())
        }
        Err(e) => {
            error!(method = %method, "Handler task failed: {}", e);
            Err(RpcError::internal_service_error())
        }
    };

    let id = id?;
    Some(match outcome {
        Ok(value) => Response::success(id, value),
        Err(err) => Response::error(id, err),
    })
}
