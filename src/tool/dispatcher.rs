use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::agent::{AgentRegistry, Handler};
use crate::error::GatewayError;

/// What the dispatcher tells the bridge to send upstream.
#[derive(Debug, Clone)]
pub enum Envelope {
    SessionUpdate {
        instructions: String,
        tools: Vec<Value>,
        turn_detection: Value,
    },
    FunctionOutput {
        call_id: String,
        output: String,
    },
}

pub struct ToolDispatcher {
    registry: Arc<AgentRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<AgentRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub async fn invoke(&self, tool_name: &str, parameters: Value, call_id: &str) -> Envelope {
        let Some(tool) = self.registry.locate_tool(tool_name) else {
            let err = GatewayError::tool_not_found(tool_name);
            return Envelope::FunctionOutput {
                call_id: call_id.to_string(),
                output: serde_json::json!({ "error": err.to_string() }).to_string(),
            };
        };

        let started = std::time::Instant::now();
        let envelope = match tool.handler {
            Handler::AgentSwitch(target) => self.switch_envelope(&target),
            Handler::Sync(f) => {
                let result = tokio::time::timeout(self.timeout, async { f(parameters) }).await;
                self.function_output(call_id, tool_name, result)
            },
            Handler::Async(f) => {
                let result = tokio::time::timeout(self.timeout, f(parameters)).await;
                self.function_output(call_id, tool_name, result)
            },
        };
        tracing::debug!(
            target: "dispatcher",
            tool_name,
            call_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool dispatch complete"
        );
        envelope
    }

    fn switch_envelope(&self, target_id: &str) -> Envelope {
        // tools_for/get are only called with names already confirmed present
        // by locate_tool, so these lookups cannot fail in practice.
        let instructions = self
            .registry
            .get(target_id)
            .map(|a| a.system_message)
            .unwrap_or_default();
        let tools = self
            .registry
            .tools_for(target_id)
            .unwrap_or_default()
            .iter()
            .map(|t| t.as_schema())
            .collect();
        Envelope::SessionUpdate {
            instructions,
            tools,
            turn_detection: serde_json::json!({"type": "server_vad"}),
        }
    }

    fn function_output(
        &self,
        call_id: &str,
        tool_name: &str,
        result: Result<Result<Value, GatewayError>, tokio::time::error::Elapsed>,
    ) -> Envelope {
        let output = match result {
            Err(_elapsed) => {
                let err = GatewayError::tool_timeout(tool_name, self.timeout.as_secs());
                serde_json::to_string(&serde_json::json!({ "error": err.to_string() }))
                    .expect("serializing a string map cannot fail")
            },
            Ok(Err(e)) => serde_json::to_string(&serde_json::json!({ "error": e.to_string() }))
                .expect("serializing a string map cannot fail"),
            Ok(Ok(Value::String(s))) => s,
            Ok(Ok(other)) => serde_json::to_string(&other)
                .unwrap_or_else(|_| format!("{other:?}")),
        };
        Envelope::FunctionOutput {
            call_id: call_id.to_string(),
            output,
        }
    }
}
