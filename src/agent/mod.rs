mod registry;
mod types;

pub use registry::AgentRegistry;
pub use types::{AgentDefinition, AsyncHandlerFn, BoxFuture, Handler, RegistryError, SyncHandlerFn, ToolDefinition};
