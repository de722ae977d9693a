use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::error::GatewayError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type SyncHandlerFn = Arc<dyn Fn(Value) -> Result<Value, GatewayError> + Send + Sync>;
pub type AsyncHandlerFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, GatewayError>> + Send + Sync>;

/// A tool's callable, tagged by how it is invoked. The dispatcher branches
/// once on this tag; everything downstream sees a uniform invoke interface.
#[derive(Clone)]
pub enum Handler {
    Sync(SyncHandlerFn),
    Async(AsyncHandlerFn),
    AgentSwitch(String),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => write!(f, "Handler::Sync(..)"),
            Self::Async(_) => write!(f, "Handler::Async(..)"),
            Self::AgentSwitch(target) => write!(f, "Handler::AgentSwitch({target:?})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub handler: Handler,
}

impl ToolDefinition {
    pub fn sync(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        f: impl Fn(Value) -> Result<Value, GatewayError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            handler: Handler::Sync(Arc::new(f)),
        }
    }

    pub fn asynchronous<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, GatewayError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            handler: Handler::Async(Arc::new(move |params| Box::pin(f(params)))),
        }
    }

    /// Reshape into the realtime-provider function-tool schema used in
    /// `session.tools`.
    pub fn as_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_schema,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub id: String,
    pub system_message: String,
    pub description: String,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("agent '{0}' not found")]
    NotFound(String),
}
