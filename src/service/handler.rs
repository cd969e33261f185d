//! Handler seam for published services

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;

use crate::protocol::{ Call, RpcError };

/// Failure reported by a service handler
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// A deliberate error, sent to the requester as is
    #[error("{0}")]
    Rpc(RpcError),

    /// An unexpected failure; the requester sees an internal service error
    #[error("Service failed: {0}")]
    Failed(String),
}

impl ServiceError {
    pub fn wrong_parameters() -> Self {
        ServiceError::Rpc(RpcError::wrong_parameters_received())
    }

    /// Error object to answer with
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            ServiceError::Rpc(err) => err.clone(),
            ServiceError::Failed(_) => RpcError::internal_service_error(),
        }
    }
}

impl From<RpcError> for ServiceError {
    fn from(err: RpcError) -> Self {
        ServiceError::Rpc(err)
    }
}

/// The application code behind a published service
///
/// Called once per request or notification addressed to the service. The
/// returned value becomes the `result` of the response; for notifications it
/// is discarded.
#[async_trait]
pub trait ServiceMethod: Send + Sync {
    async fn call(&self, call: Call) -> Result<Value, ServiceError>;
}

#[async_trait]
impl<F, Fut> ServiceMethod for F
    where
        F: Fn(Call) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static
{
    async fn call(&self, call: Call) -> Result<Value, ServiceError> {
        (self)(call).await
    }
}
